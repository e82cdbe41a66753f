//! Headless Flush Demo
//!
//! Records a handful of path draws and a clip, flushes them through the CPU
//! provider and prints what the GPU would have been asked to do:
//! - atlas pages and their coverage outlines
//! - one instanced draw per (batch, atlas page) run
//!
//! Run with: RUST_LOG=debug cargo run -p covpath_gpu --example headless_flush

use covpath_gpu::headless::{HeadlessBackend, HeadlessProvider, RecordingSink};
use covpath_gpu::{
    DrawPathArgs, GpuCaps, Paint, PathRenderer, PathRendererConfig, RenderTargetListId,
};
use covpath_paint::{Color, IRect, Path, PathBuilder, Rect, Transform2D};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let caps = GpuCaps::full(4096);
    let Some(mut renderer) =
        PathRenderer::<HeadlessBackend>::create_if_supported(&caps, PathRendererConfig::default())
    else {
        tracing::error!("renderer not supported");
        return;
    };
    let mut provider = HeadlessProvider::with_caps(caps);
    let list = RenderTargetListId(1);
    let clip_bounds = IRect::from_wh(800, 600);

    let star = PathBuilder::new()
        .move_to(50.0, 0.0)
        .line_to(61.0, 35.0)
        .line_to(98.0, 35.0)
        .line_to(68.0, 57.0)
        .line_to(79.0, 91.0)
        .line_to(50.0, 70.0)
        .line_to(21.0, 91.0)
        .line_to(32.0, 57.0)
        .line_to(2.0, 35.0)
        .line_to(39.0, 35.0)
        .close()
        .build();

    let mut batches = Vec::new();
    for (i, color) in [Color::RED, Color::GREEN, Color::BLUE].into_iter().enumerate() {
        let view = Transform2D::translate(i as f32 * 120.0, 40.0);
        let id = renderer.draw_path(DrawPathArgs {
            path: &star,
            view_matrix: &view,
            clip_bounds,
            paint: Paint::color(color),
        });
        renderer.finalize_color_and_coverage(id, None);
        match batches.first() {
            Some(&first) if renderer.can_merge(first, id) => {
                renderer.merge(first, id);
            }
            _ => {
                renderer.record_batch(id, list);
                batches.push(id);
            }
        }
    }

    let clip = Path::rect(Rect::new(100.0, 100.0, 300.0, 200.0)).with_volatile(true);
    let processor = renderer.make_clip_processor(list, &clip, IRect::new(80, 80, 500, 500), 800, 600);

    let report = renderer.pre_flush(&mut provider, &[list]);
    println!("stats: {:?}", report.stats);
    for task in &report.atlas_tasks {
        println!(
            "atlas page {}: {}x{}, {} outlines",
            task.page,
            task.width,
            task.height,
            task.coverage.outlines.len()
        );
    }

    let mut sink = RecordingSink::new();
    for &id in &batches {
        renderer.execute_batch(id, &mut sink);
    }
    for draw in &sink.draws {
        println!(
            "draw: atlas {} instances {}..{}",
            draw.atlas.id,
            draw.base_instance,
            draw.base_instance + draw.instance_count
        );
    }
    if let Some(binding) = renderer.clip_atlas_binding(&processor) {
        println!(
            "clip: atlas {} scale {:?} translate {:?} check bounds {}",
            binding.texture.id,
            binding.scale,
            binding.translate,
            processor.must_check_bounds()
        );
    }

    renderer.post_flush(&[list]);
}
