//! Integration tests for clip processors and their atlas bindings

use covpath_gpu::headless::{HeadlessBackend, HeadlessProvider, RecordingSink};
use covpath_gpu::{
    DrawPathArgs, GpuCaps, Paint, PathRenderer, PathRendererConfig, RenderTargetListId,
    SurfaceOrigin,
};
use covpath_paint::{Color, FillRule, IRect, Path, PathBuilder, Rect, Transform2D};

const LIST_A: RenderTargetListId = RenderTargetListId(1);
const LIST_B: RenderTargetListId = RenderTargetListId(2);

fn renderer() -> PathRenderer<HeadlessBackend> {
    PathRenderer::create_if_supported(&GpuCaps::full(4096), PathRendererConfig::default())
        .expect("full caps are supported")
}

/// A volatile 20x20 blob at the origin
fn blob() -> Path {
    PathBuilder::new()
        .move_to(10.0, 0.0)
        .quad_to(20.0, 0.0, 20.0, 10.0)
        .quad_to(20.0, 20.0, 10.0, 20.0)
        .quad_to(0.0, 20.0, 0.0, 10.0)
        .quad_to(0.0, 0.0, 10.0, 0.0)
        .close()
        .fill_rule(FillRule::EvenOdd)
        .volatile(true)
        .build()
}

#[test]
fn test_clip_entries_are_shared_per_list() {
    let mut renderer = renderer();
    let path = blob();
    let first = renderer.make_clip_processor(LIST_A, &path, IRect::new(2, 2, 18, 18), 800, 600);
    assert!(!first.must_check_bounds());
    assert_eq!(first.fill_rule(), FillRule::EvenOdd);

    // The access union grows past the path, so later processors check bounds.
    let second = renderer.make_clip_processor(LIST_A, &path, IRect::new(15, 15, 40, 40), 800, 600);
    assert!(second.must_check_bounds());
    assert_eq!(first.path_id(), second.path_id());

    let third = renderer.make_clip_processor(LIST_A, &path, IRect::new(4, 4, 6, 6), 800, 600);
    assert!(third.must_check_bounds());
    assert_eq!(third.access_rect(), IRect::new(2, 2, 40, 40));

    renderer.make_clip_processor(LIST_B, &path, IRect::new(2, 2, 18, 18), 800, 600);
    let mut provider = HeadlessProvider::new(4096);
    let report = renderer.pre_flush(&mut provider, &[LIST_A, LIST_B]);
    assert_eq!(report.stats.clip_paths, 2);
    renderer.post_flush(&[LIST_A, LIST_B]);
}

#[test]
fn test_clip_binding_after_flush() {
    let mut renderer = renderer();
    let mut provider = HeadlessProvider::new(4096);
    let path = blob();
    renderer.make_clip_processor(LIST_A, &path, IRect::new(2, 2, 18, 18), 800, 600);
    let processor =
        renderer.make_clip_processor(LIST_A, &path, IRect::new(15, 15, 40, 40), 800, 600);
    assert!(renderer.clip_atlas_binding(&processor).is_none());

    let report = renderer.pre_flush(&mut provider, &[LIST_A]);
    assert_eq!(report.stats.total_paths, 1);
    assert_eq!(report.stats.clip_paths, 1);
    assert_eq!(report.stats.placed_paths, 1);
    // Clip masks are rendered but never drawn as instances.
    assert_eq!(report.stats.instances_written, 0);
    assert_eq!(report.atlas_tasks.len(), 1);

    // Placed scissored at (2, 2)..(20, 20): an 18x18 atlas.
    let task = &report.atlas_tasks[0];
    assert_eq!((task.width, task.height), (18, 18));

    let binding = renderer
        .clip_atlas_binding(&processor)
        .expect("clip was placed");
    assert_eq!(binding.texture.id, task.texture.id);
    let scale = 1.0 / 18.0;
    assert_eq!(binding.scale, [scale, scale]);
    assert_eq!(binding.translate, [-2.0 * scale, -2.0 * scale]);

    renderer.post_flush(&[LIST_A]);
    assert!(renderer.clip_atlas_binding(&processor).is_none());
}

#[test]
fn test_clip_binding_bottom_left_origin() {
    let mut renderer = renderer();
    let mut provider = HeadlessProvider::new(4096).with_origin(SurfaceOrigin::BottomLeft);
    let processor =
        renderer.make_clip_processor(LIST_A, &blob(), IRect::new(2, 2, 18, 18), 800, 600);

    let report = renderer.pre_flush(&mut provider, &[LIST_A]);
    assert_eq!(report.atlas_tasks[0].origin, SurfaceOrigin::BottomLeft);
    let binding = renderer
        .clip_atlas_binding(&processor)
        .expect("clip was placed");
    let scale = 1.0 / 16.0;
    assert_eq!(binding.origin, SurfaceOrigin::BottomLeft);
    assert_eq!(binding.scale, [scale, -scale]);
    assert_eq!(binding.translate, [-2.0 * scale, 1.0 - -2.0 * scale]);
    renderer.post_flush(&[LIST_A]);
}

#[test]
fn test_rejected_clip_has_no_binding() {
    let mut renderer = renderer();
    let mut provider = HeadlessProvider::new(4096);
    let processor =
        renderer.make_clip_processor(LIST_A, &blob(), IRect::new(100, 100, 120, 120), 800, 600);
    assert!(processor.must_check_bounds());

    let report = renderer.pre_flush(&mut provider, &[LIST_A]);
    assert_eq!(report.stats.skipped_paths, 1);
    assert_eq!(report.stats.placed_paths, 0);
    assert!(report.atlas_tasks.is_empty());
    assert!(renderer.clip_atlas_binding(&processor).is_none());
    renderer.post_flush(&[LIST_A]);
}

#[test]
fn test_clips_share_atlas_with_draws() {
    let mut renderer = renderer();
    let mut provider = HeadlessProvider::new(4096);
    let id = renderer.draw_path(DrawPathArgs {
        path: &Path::rect(Rect::new(100.0, 100.0, 30.0, 30.0)),
        view_matrix: &Transform2D::identity(),
        clip_bounds: IRect::from_wh(800, 600),
        paint: Paint::color(Color::RED),
    });
    renderer.record_batch(id, LIST_A);
    let processor =
        renderer.make_clip_processor(LIST_A, &blob(), IRect::new(0, 0, 20, 20), 800, 600);

    let report = renderer.pre_flush(&mut provider, &[LIST_A]);
    assert_eq!(report.stats.total_paths, 2);
    assert_eq!(report.stats.clip_paths, 1);
    assert_eq!(report.stats.instances_written, 1);
    assert_eq!(report.atlas_tasks.len(), 1);
    assert_eq!(report.atlas_tasks[0].coverage.outlines.len(), 2);

    let mut sink = RecordingSink::new();
    renderer.execute_batch(id, &mut sink);
    let binding = renderer
        .clip_atlas_binding(&processor)
        .expect("clip was placed");
    assert_eq!(sink.draws[0].atlas.id, binding.texture.id);
    renderer.post_flush(&[LIST_A]);
}

#[test]
fn test_clip_eligibility_follows_config() {
    let renderer = renderer();
    let stable = Path::rect(Rect::new(0.0, 0.0, 8.0, 8.0));
    assert!(!renderer.can_make_clip_processor(&stable));

    let cachable = PathRenderer::<HeadlessBackend>::create_if_supported(
        &GpuCaps::full(4096),
        PathRendererConfig {
            draw_cachable_paths: true,
            ..Default::default()
        },
    )
    .expect("full caps are supported");
    assert!(cachable.can_make_clip_processor(&stable));

    let conic = PathBuilder::new()
        .move_to(0.0, 0.0)
        .conic_to(8.0, 0.0, 8.0, 8.0, 0.5)
        .close()
        .volatile(true)
        .build();
    assert!(!cachable.can_make_clip_processor(&conic));
}
