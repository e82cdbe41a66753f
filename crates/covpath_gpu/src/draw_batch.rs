//! Deferred path draws
//!
//! A [`DrawBatch`] is a chain of single path draws that share a fill rule and
//! paint processing, so they can be issued as one instanced draw per atlas
//! page. Batches and their draws live in slotmap arenas owned by the renderer;
//! each batch keeps head and tail keys of its chain so merging two batches is
//! a constant-time splice.

use covpath_paint::{Color, FillRule, IRect, Path, Rect, Transform2D};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::atlas::AtlasPacker;
use crate::backend::GpuCaps;
use crate::coverage::CoverageOpsBuilder;
use crate::crop::{crop_path, PathOps, PATH_CROP_THRESHOLD};
use crate::primitives::PathInstance;
use crate::processors::{AppliedClip, ProcessorSet, SrgbFlags};
use crate::registry::RenderTargetListId;

new_key_type! {
    /// Handle to a deferred batch of path draws
    pub struct BatchId;
    pub(crate) struct DrawKey;
}

/// One path draw inside a batch
#[derive(Debug)]
pub(crate) struct SingleDraw {
    pub path: Path,
    pub view_matrix: Transform2D,
    pub clip_bounds: IRect,
    pub color: Color,
    pub next: Option<DrawKey>,
}

impl SingleDraw {
    /// Build a draw, cropping the path to `clip_bounds` if it is too big to
    /// rasterize precisely. Returns the draw and its device bounds.
    pub fn new(
        path: &Path,
        view_matrix: &Transform2D,
        clip_bounds: IRect,
        color: Color,
        path_ops: &dyn PathOps,
    ) -> (Self, Rect) {
        let dev_bounds = view_matrix.map_rect(&path.bounds());
        let (path, view_matrix, dev_bounds) =
            if dev_bounds.width().max(dev_bounds.height()) > PATH_CROP_THRESHOLD {
                // Cropping happens in device space, so the draw's matrix
                // becomes identity.
                let transformed = path.transformed(view_matrix).with_volatile(true);
                let cropped = crop_path(&transformed, &clip_bounds, path_ops);
                let bounds = cropped.bounds();
                (cropped, Transform2D::identity(), bounds)
            } else {
                (path.clone(), *view_matrix, dev_bounds)
            };
        let draw = Self {
            path,
            view_matrix,
            clip_bounds,
            color,
            next: None,
        };
        (draw, dev_bounds)
    }
}

/// A run of a batch's instances that sample the same atlas page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AtlasRun {
    pub page: usize,
    /// One past the run's last instance
    pub end_instance: u32,
}

#[derive(Debug)]
pub(crate) struct DrawBatch {
    pub fill_rule: FillRule,
    pub srgb_flags: SrgbFlags,
    pub processors: ProcessorSet,
    head: DrawKey,
    tail: DrawKey,
    /// Union of the draws' device bounds, not intersected with their clips
    pub bounds: Rect,
    pub instance_count: usize,
    pub owner: Option<RenderTargetListId>,
    finalized: bool,
    merged: bool,
    /// Set during `pre_flush`
    pub base_instance: Option<u32>,
    pub atlas_runs: SmallVec<[AtlasRun; 1]>,
}

/// Instances a batch produced during flush setup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SetupCounts {
    pub placed: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub(crate) struct DrawBatches {
    batches: SlotMap<BatchId, DrawBatch>,
    draws: SlotMap<DrawKey, SingleDraw>,
}

impl DrawBatches {
    pub fn insert(
        &mut self,
        draw: SingleDraw,
        bounds: Rect,
        fill_rule: FillRule,
        processors: ProcessorSet,
        srgb_flags: SrgbFlags,
    ) -> BatchId {
        let key = self.draws.insert(draw);
        self.batches.insert(DrawBatch {
            fill_rule,
            srgb_flags,
            processors,
            head: key,
            tail: key,
            bounds,
            instance_count: 1,
            owner: None,
            finalized: false,
            merged: false,
            base_instance: None,
            atlas_runs: SmallVec::new(),
        })
    }

    pub fn get(&self, id: BatchId) -> Option<&DrawBatch> {
        self.batches.get(id)
    }

    pub fn get_mut(&mut self, id: BatchId) -> Option<&mut DrawBatch> {
        self.batches.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Draws of a batch in chain order
    pub fn draws(&self, id: BatchId) -> impl Iterator<Item = &SingleDraw> + '_ {
        let mut cursor = self.batches.get(id).map(|b| b.head);
        std::iter::from_fn(move || {
            let draw = self.draws.get(cursor?)?;
            cursor = draw.next;
            Some(draw)
        })
    }

    /// Resolve the batch's color and whether it reads the destination.
    pub fn finalize(&mut self, id: BatchId, caps: &GpuCaps, clip: Option<&AppliedClip>) -> bool {
        let Some(batch) = self.batches.get_mut(id) else {
            return false;
        };
        assert!(!batch.finalized, "batch finalized twice");
        assert!(
            batch.instance_count == 1 && !batch.merged,
            "batch finalized after a merge"
        );
        batch.finalized = true;

        let Some(draw) = self.draws.get_mut(batch.head) else {
            return false;
        };
        let analysis = batch.processors.analyze(draw.color, caps, clip);
        if let Some(color) = analysis.overridden_color {
            draw.color = color;
        }
        analysis.requires_dst_texture
    }

    pub fn can_merge(&self, a: BatchId, b: BatchId) -> bool {
        if a == b {
            return false;
        }
        let (Some(a), Some(b)) = (self.batches.get(a), self.batches.get(b)) else {
            return false;
        };
        let owners_agree = match (a.owner, b.owner) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        };
        owners_agree
            && a.fill_rule == b.fill_rule
            && a.srgb_flags == b.srgb_flags
            && a.processors == b.processors
    }

    /// Splice `other`'s draws onto `into`. `other` is removed.
    pub fn merge(&mut self, into: BatchId, other: BatchId) -> Option<DrawBatch> {
        if !self.can_merge(into, other) {
            return None;
        }
        let removed = self.batches.remove(other)?;
        let batch = self.batches.get_mut(into)?;
        if let Some(tail) = self.draws.get_mut(batch.tail) {
            tail.next = Some(removed.head);
        }
        batch.tail = removed.tail;
        batch.bounds = batch.bounds.union(&removed.bounds);
        batch.instance_count += removed.instance_count;
        batch.merged = true;
        Some(removed)
    }

    /// Remove a batch together with its draws.
    pub fn remove(&mut self, id: BatchId) -> Option<DrawBatch> {
        let batch = self.batches.remove(id)?;
        let mut cursor = Some(batch.head);
        while let Some(key) = cursor {
            cursor = self.draws.remove(key).and_then(|d| d.next);
        }
        Some(batch)
    }

    /// Parse and place every draw of a batch, appending one instance per
    /// placed path and recording a run each time the atlas page changes.
    pub fn setup_resources(
        &mut self,
        id: BatchId,
        packer: &mut AtlasPacker,
        builder: &mut CoverageOpsBuilder,
        instances: &mut Vec<PathInstance>,
    ) -> SetupCounts {
        let mut counts = SetupCounts::default();
        let Some(batch) = self.batches.get_mut(id) else {
            return counts;
        };
        assert!(batch.base_instance.is_none(), "batch set up twice");
        batch.base_instance = Some(instances.len() as u32);

        let mut current_page: Option<usize> = None;
        let mut cursor = Some(batch.head);
        while let Some(key) = cursor {
            let Some(draw) = self.draws.get(key) else {
                break;
            };
            cursor = draw.next;

            let (dev_bounds, dev_bounds45) = builder.parse_path(&draw.view_matrix, &draw.path);
            let Some(placed) =
                packer.place_parsed_path(&draw.clip_bounds, &dev_bounds.round_out(), builder)
            else {
                counts.skipped += 1;
                continue;
            };

            if current_page != Some(placed.page) {
                if let Some(page) = current_page {
                    batch.atlas_runs.push(AtlasRun {
                        page,
                        end_instance: instances.len() as u32,
                    });
                }
                current_page = Some(placed.page);
            }

            instances.push(PathInstance::new(
                &dev_bounds,
                &dev_bounds45,
                &draw.view_matrix,
                placed.offset,
                draw.color.to_packed_rgba(),
            ));
            counts.placed += 1;
        }

        if let Some(page) = current_page {
            batch.atlas_runs.push(AtlasRun {
                page,
                end_instance: instances.len() as u32,
            });
        }
        assert_eq!(
            counts.placed + counts.skipped,
            batch.instance_count,
            "batch setup lost track of its draws"
        );
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::RectClipOps;
    use crate::processors::BlendMode;
    use covpath_paint::PathBuilder;

    fn square(x: f32, size: f32) -> Path {
        Path::rect(Rect::new(x, 0.0, size, size))
    }

    fn add(batches: &mut DrawBatches, path: &Path, color: Color) -> BatchId {
        let (draw, bounds) = SingleDraw::new(
            path,
            &Transform2D::identity(),
            IRect::from_wh(1000, 1000),
            color,
            &RectClipOps::default(),
        );
        batches.insert(
            draw,
            bounds,
            path.fill_rule(),
            ProcessorSet::simple(),
            SrgbFlags::default(),
        )
    }

    fn colors(batches: &DrawBatches, id: BatchId) -> Vec<Color> {
        batches.draws(id).map(|d| d.color).collect()
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        let b = add(&mut batches, &square(20.0, 10.0), Color::GREEN);
        let c = add(&mut batches, &square(40.0, 10.0), Color::BLUE);

        assert!(batches.merge(a, b).is_some());
        assert!(batches.merge(a, c).is_some());
        assert_eq!(colors(&batches, a), vec![Color::RED, Color::GREEN, Color::BLUE]);
        let batch = batches.get(a).expect("batch");
        assert_eq!(batch.instance_count, 3);
        assert_eq!(batch.bounds, Rect::from_ltrb(0.0, 0.0, 50.0, 10.0));
        assert!(batches.get(b).is_none());
        assert_eq!(batches.len(), 1);
    }

    #[test]
    fn test_merge_rejects_mismatch() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        let even_odd = PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(5.0, 0.0)
            .line_to(5.0, 5.0)
            .close()
            .fill_rule(FillRule::EvenOdd)
            .build();
        let b = add(&mut batches, &even_odd, Color::RED);
        assert!(!batches.can_merge(a, b));
        assert!(batches.merge(a, b).is_none());
        assert!(!batches.can_merge(a, a));

        let c = add(&mut batches, &square(0.0, 10.0), Color::RED);
        if let Some(batch) = batches.get_mut(c) {
            batch.processors = ProcessorSet::simple().with_blend(BlendMode::Plus);
        }
        assert!(!batches.can_merge(a, c));

        let d = add(&mut batches, &square(0.0, 10.0), Color::RED);
        if let Some(batch) = batches.get_mut(a) {
            batch.owner = Some(RenderTargetListId(1));
        }
        if let Some(batch) = batches.get_mut(d) {
            batch.owner = Some(RenderTargetListId(2));
        }
        assert!(!batches.can_merge(a, d));
    }

    #[test]
    fn test_remove_frees_draws() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        let b = add(&mut batches, &square(20.0, 10.0), Color::GREEN);
        batches.merge(a, b);
        assert!(batches.remove(a).is_some());
        assert_eq!(batches.draws.len(), 0);
        assert!(batches.remove(a).is_none());
    }

    #[test]
    fn test_setup_counts_skipped_draws() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        // Bigger than any 64x64 page.
        let b = add(&mut batches, &square(20.0, 100.0), Color::GREEN);
        let c = add(&mut batches, &square(140.0, 10.0), Color::BLUE);
        batches.merge(a, b);
        batches.merge(a, c);

        let mut packer = AtlasPacker::new(64, 64);
        let mut builder = CoverageOpsBuilder::new(3, 5, 15, 18);
        let mut instances = Vec::new();
        let counts = batches.setup_resources(a, &mut packer, &mut builder, &mut instances);
        assert_eq!(counts, SetupCounts { placed: 2, skipped: 1 });
        assert_eq!(instances.len(), 2);

        let batch = batches.get(a).expect("batch");
        assert_eq!(batch.base_instance, Some(0));
        let runs: Vec<(usize, u32)> = batch
            .atlas_runs
            .iter()
            .map(|run| (run.page, run.end_instance))
            .collect();
        assert_eq!(runs, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn test_oversized_draw_is_cropped() {
        let path = Path::rect(Rect::new(-100_000.0, 0.0, 200_000.0, 10.0));
        let clip = IRect::from_wh(800, 600);
        let (draw, bounds) = SingleDraw::new(
            &path,
            &Transform2D::scale(1.0, 2.0),
            clip,
            Color::RED,
            &RectClipOps::default(),
        );
        assert!(draw.view_matrix.is_identity());
        assert!(Rect::from(clip).contains_rect(&bounds));
        assert_eq!(bounds, Rect::from_ltrb(0.0, 0.0, 800.0, 20.0));
    }

    #[test]
    fn test_small_draw_keeps_matrix() {
        let m = Transform2D::translate(5.0, 5.0);
        let (draw, bounds) = SingleDraw::new(
            &square(0.0, 10.0),
            &m,
            IRect::from_wh(8, 8),
            Color::RED,
            &RectClipOps::default(),
        );
        assert_eq!(draw.view_matrix, m);
        // Bounds are not intersected with the clip.
        assert_eq!(bounds, Rect::from_ltrb(5.0, 5.0, 15.0, 15.0));
    }

    #[test]
    #[should_panic(expected = "finalized twice")]
    fn test_finalize_twice_panics() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        let caps = GpuCaps::full(4096);
        batches.finalize(a, &caps, None);
        batches.finalize(a, &caps, None);
    }

    #[test]
    fn test_finalize_applies_constant_color() {
        let mut batches = DrawBatches::default();
        let a = add(&mut batches, &square(0.0, 10.0), Color::RED);
        if let Some(batch) = batches.get_mut(a) {
            batch.processors = ProcessorSet::simple().with_constant_color(Color::BLUE);
        }
        assert!(!batches.finalize(a, &GpuCaps::full(4096), None));
        assert_eq!(colors(&batches, a), vec![Color::BLUE]);
    }
}
