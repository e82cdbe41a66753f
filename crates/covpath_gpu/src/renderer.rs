//! Coverage-counting path renderer
//!
//! Path draws are deferred: [`PathRenderer::draw_path`] only records a
//! [`BatchId`]. The caller records batches into render-target lists, merges
//! compatible neighbours, and later brackets command submission with
//! [`pre_flush`](PathRenderer::pre_flush) and
//! [`post_flush`](PathRenderer::post_flush):
//!
//! 1. `pre_flush` parses every pending path of the flushed lists, packs its
//!    coverage into shared atlas pages, writes one [`PathInstance`] per placed
//!    path and returns the atlas render tasks the caller must run first.
//! 2. [`execute_batch`](PathRenderer::execute_batch) issues one instanced draw
//!    per (batch, atlas page) run.
//! 3. `post_flush` drops the per-flush GPU resources and the flushed lists.

use covpath_paint::{IRect, Path, Rect, Transform2D};

use crate::atlas::{AtlasPacker, AtlasPage};
use crate::backend::{
    BufferKind, CommandSink, DrawCommand, FlushResourceProvider, GpuBackend, GpuCaps,
    InstancedMesh, PipelineState, PrimitiveType, StaticBufferKey, SurfaceOrigin,
};
use crate::clip_cache::{
    atlas_transform, lookup_or_create, ClipAtlasBinding, ClipPlacement, ClipProcessor,
};
use crate::config::{log_renderer_config, PathRendererConfig};
use crate::coverage::{CoverageOp, CoverageOpsBuilder};
use crate::crop::{PathOps, RectClipOps};
use crate::draw_batch::{BatchId, DrawBatches, SingleDraw};
use crate::error::FlushError;
use crate::primitives::{
    PathInstance, OCTAGON_EDGE_NORMALS, OCTAGON_INDICES, PER_INSTANCE_INDEX_COUNT,
};
use crate::processors::{AppliedClip, Paint};
use crate::registry::{PendingPathRegistry, RenderTargetListId};

/// Answer to "can this renderer draw the path?"
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CanDrawPath {
    No,
    /// Drawable, but another renderer should get first refusal
    AsBackup,
    Yes,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShapeStyle {
    #[default]
    SimpleFill,
    Stroke,
    Hairline,
}

/// Anti-aliasing mode requested for a draw
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AaType {
    None,
    #[default]
    Coverage,
    Msaa,
}

/// A path plus the styling facts that decide whether it can be drawn
#[derive(Clone, Copy, Debug)]
pub struct ShapeDescriptor<'a> {
    pub path: &'a Path,
    pub style: ShapeStyle,
    pub inverse_fill: bool,
    /// The shape has a stable key a caching renderer could use
    pub cacheable: bool,
}

impl<'a> ShapeDescriptor<'a> {
    /// A plain, non-inverse, uncached fill of `path`
    pub fn fill(path: &'a Path) -> Self {
        Self {
            path,
            style: ShapeStyle::SimpleFill,
            inverse_fill: false,
            cacheable: false,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CanDrawPathArgs<'a> {
    pub shape: ShapeDescriptor<'a>,
    pub view_matrix: &'a Transform2D,
    pub aa_type: AaType,
    /// Conservative device-space clip bounds
    pub clip_bounds: IRect,
}

#[derive(Clone, Debug)]
pub struct DrawPathArgs<'a> {
    pub path: &'a Path,
    pub view_matrix: &'a Transform2D,
    /// Conservative device-space clip bounds, already limited to the target
    pub clip_bounds: IRect,
    pub paint: Paint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlushState {
    Idle,
    Flushing,
}

/// Counts gathered by one `pre_flush`
///
/// `placed_paths + skipped_paths == total_paths`, and only draw paths write
/// instances, so `instances_written <= total_paths`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Draw paths plus clip paths
    pub total_paths: usize,
    pub clip_paths: usize,
    pub max_path_points: usize,
    pub total_points: usize,
    pub total_verbs: usize,
    pub instances_written: usize,
    pub placed_paths: usize,
    pub skipped_paths: usize,
    pub atlas_pages: usize,
}

/// An atlas page to render before any batch samples from it
#[derive(Debug)]
pub struct AtlasRenderTask<B: GpuBackend> {
    /// Page index, in creation order
    pub page: usize,
    pub texture: B::Texture,
    pub width: u32,
    pub height: u32,
    pub origin: SurfaceOrigin,
    pub coverage: CoverageOp<B>,
}

/// Outcome of [`PathRenderer::pre_flush`]
#[derive(Debug)]
pub struct FlushReport<B: GpuBackend> {
    pub atlas_tasks: Vec<AtlasRenderTask<B>>,
    pub stats: FlushStats,
    /// Set when an allocation failure made the flush draw nothing
    pub error: Option<FlushError>,
}

impl<B: GpuBackend> Default for FlushReport<B> {
    fn default() -> Self {
        Self {
            atlas_tasks: Vec::new(),
            stats: FlushStats::default(),
            error: None,
        }
    }
}

impl<B: GpuBackend> FlushReport<B> {
    pub fn is_abandoned(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug)]
struct AtlasTexture<B: GpuBackend> {
    texture: B::Texture,
    width: u32,
    height: u32,
    origin: SurfaceOrigin,
}

/// Buffers and atlases of the flush in progress. Only present when every
/// shared allocation succeeded.
#[derive(Debug)]
struct PerFlushResources<B: GpuBackend> {
    index_buffer: B::Buffer,
    vertex_buffer: B::Buffer,
    instance_buffer: B::Buffer,
    // One slot per page; None if the page drew nothing or has no texture.
    atlas_textures: Vec<Option<AtlasTexture<B>>>,
}

#[derive(Clone, Copy, Debug, Default)]
struct FlushTally {
    draw_paths: usize,
    clip_paths: usize,
    max_path_points: usize,
    total_points: usize,
    total_verbs: usize,
}

impl FlushTally {
    fn add(&mut self, path: &Path) {
        let points = path.count_points();
        self.max_path_points = self.max_path_points.max(points);
        self.total_points += points;
        self.total_verbs += path.count_verbs();
    }

    fn total_paths(&self) -> usize {
        self.draw_paths + self.clip_paths
    }
}

/// Deferred, atlas-batched coverage-counting path renderer
pub struct PathRenderer<B: GpuBackend> {
    config: PathRendererConfig,
    caps: GpuCaps,
    min_atlas_size: u32,
    max_atlas_size: u32,
    path_ops: Box<dyn PathOps>,
    state: FlushState,
    batches: DrawBatches,
    registry: PendingPathRegistry,
    per_flush: Option<PerFlushResources<B>>,
}

impl<B: GpuBackend> PathRenderer<B> {
    /// Whether a device can run the renderer at all
    pub fn is_supported(caps: &GpuCaps) -> bool {
        caps.geometry_shader_support
            && caps.integer_support
            && caps.flat_interpolation_support
            && caps.instance_attrib_support
            && caps.map_buffer_support
            && caps.alpha_half_texturable
            && caps.alpha_half_renderable
            && !caps.coverage_counting_blocklisted
    }

    /// Create a renderer, applying `COVPATH_*` environment overrides, or
    /// `None` if the device lacks a required capability.
    pub fn create_if_supported(caps: &GpuCaps, config: PathRendererConfig) -> Option<Self> {
        if !Self::is_supported(caps) {
            tracing::debug!("coverage-counting path renderer not supported: {:?}", caps);
            return None;
        }
        let config = config.with_env_overrides();
        let (min_atlas_size, max_atlas_size) =
            config.atlas_size_limits(caps.max_render_target_size);
        log_renderer_config(&config, min_atlas_size, max_atlas_size);
        Some(Self {
            config,
            caps: *caps,
            min_atlas_size,
            max_atlas_size,
            path_ops: Box::new(RectClipOps::default()),
            state: FlushState::Idle,
            batches: DrawBatches::default(),
            registry: PendingPathRegistry::default(),
            per_flush: None,
        })
    }

    /// Replace the boolean-ops collaborator used to crop oversized paths.
    pub fn with_path_ops(mut self, path_ops: Box<dyn PathOps>) -> Self {
        self.path_ops = path_ops;
        self
    }

    pub fn config(&self) -> &PathRendererConfig {
        &self.config
    }

    pub fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    pub fn is_flushing(&self) -> bool {
        self.state == FlushState::Flushing
    }

    /// Batches alive in the renderer, recorded or not
    pub fn pending_batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn can_draw_path(&self, args: &CanDrawPathArgs<'_>) -> CanDrawPath {
        let shape = &args.shape;
        if shape.cacheable && !self.config.draw_cachable_paths {
            return CanDrawPath::No;
        }
        if shape.style != ShapeStyle::SimpleFill
            || shape.inverse_fill
            || args.view_matrix.has_perspective()
            || args.aa_type != AaType::Coverage
        {
            return CanDrawPath::No;
        }
        if shape.path.conic_weight_count() > 0 {
            return CanDrawPath::No;
        }

        let dev_bounds = args.view_matrix.map_rect(&shape.path.bounds()).round_out();
        let Some(clipped) = args.clip_bounds.intersect(&dev_bounds) else {
            // Clipped away entirely; the flush will notice and draw nothing.
            return CanDrawPath::Yes;
        };
        if clipped.area() > self.config.backup_area_threshold as i64 {
            return CanDrawPath::AsBackup;
        }
        if shape.cacheable && shape.path.count_verbs() > self.config.backup_verb_threshold {
            return CanDrawPath::AsBackup;
        }
        CanDrawPath::Yes
    }

    /// Record a deferred draw. The batch does nothing until it is recorded
    /// into a render-target list and that list is flushed.
    pub fn draw_path(&mut self, args: DrawPathArgs<'_>) -> BatchId {
        assert!(!self.is_flushing(), "draw_path called while flushing");
        let (draw, bounds) = SingleDraw::new(
            args.path,
            args.view_matrix,
            args.clip_bounds,
            args.paint.color,
            self.path_ops.as_ref(),
        );
        self.batches.insert(
            draw,
            bounds,
            args.path.fill_rule(),
            args.paint.processors,
            args.paint.srgb_flags,
        )
    }

    /// Device bounds of a batch (union of its draws, not clipped)
    pub fn batch_bounds(&self, id: BatchId) -> Option<Rect> {
        self.batches.get(id).map(|b| b.bounds)
    }

    pub fn batch_instance_count(&self, id: BatchId) -> Option<usize> {
        self.batches.get(id).map(|b| b.instance_count)
    }

    /// Run the paint analysis once. Returns whether the draw needs a copy of
    /// the destination.
    pub fn finalize_color_and_coverage(
        &mut self,
        id: BatchId,
        applied_clip: Option<&AppliedClip>,
    ) -> bool {
        assert!(!self.is_flushing(), "finalizing a batch while flushing");
        self.batches.finalize(id, &self.caps, applied_clip)
    }

    pub fn can_merge(&self, a: BatchId, b: BatchId) -> bool {
        self.batches.can_merge(a, b)
    }

    /// Append `other`'s draws to `into`, which must already be recorded.
    /// On success `other` is gone.
    pub fn merge(&mut self, into: BatchId, other: BatchId) -> bool {
        assert!(!self.is_flushing(), "merging batches while flushing");
        let Some(batch) = self.batches.get(into) else {
            return false;
        };
        assert!(
            batch.owner.is_some(),
            "merging into a batch that is not recorded in a render-target list"
        );
        match self.batches.merge(into, other) {
            Some(removed) => {
                if let Some(list) = removed.owner {
                    self.registry.unrecord_batch(list, other);
                }
                true
            }
            None => false,
        }
    }

    /// Bind a batch to the render-target list it draws into.
    pub fn record_batch(&mut self, id: BatchId, list: RenderTargetListId) {
        assert!(!self.is_flushing(), "recording a batch while flushing");
        let Some(batch) = self.batches.get_mut(id) else {
            return;
        };
        assert!(
            batch.owner.is_none(),
            "batch is already recorded in a render-target list"
        );
        batch.owner = Some(list);
        self.registry.record_batch(list, id);
    }

    /// Destroy a batch, unregistering it if it was recorded.
    pub fn release_batch(&mut self, id: BatchId) {
        if let Some(batch) = self.batches.remove(id) {
            if let Some(list) = batch.owner {
                self.registry.unrecord_batch(list, id);
            }
        }
    }

    pub fn can_make_clip_processor(&self, device_space_path: &Path) -> bool {
        if !self.config.draw_cachable_paths && !device_space_path.is_volatile() {
            return false;
        }
        device_space_path.conic_weight_count() == 0
    }

    /// Get the clip processor for `device_space_path` on `list`, sharing the
    /// entry with earlier processors made for the same path.
    pub fn make_clip_processor(
        &mut self,
        list: RenderTargetListId,
        device_space_path: &Path,
        access_rect: IRect,
        rt_width: i32,
        rt_height: i32,
    ) -> ClipProcessor {
        assert!(!self.is_flushing(), "making a clip processor while flushing");
        debug_assert!(self.can_make_clip_processor(device_space_path));

        let pending = self.registry.entry(list);
        let clip = lookup_or_create(
            &mut pending.clip_paths,
            device_space_path,
            access_rect,
            rt_width,
            rt_height,
            self.path_ops.as_ref(),
        );
        ClipProcessor::new(list, device_space_path, clip)
    }

    /// Atlas texture and transform for a clip processor. Available between
    /// `pre_flush` and `post_flush` when the clip path got atlas space.
    pub fn clip_atlas_binding(&self, processor: &ClipProcessor) -> Option<ClipAtlasBinding<B>> {
        let resources = self.per_flush.as_ref()?;
        let clip = self
            .registry
            .get(processor.list())?
            .clip_paths
            .get(&processor.path_id())?;
        let ClipPlacement::Placed(placed) = clip.placement() else {
            return None;
        };
        let atlas = resources.atlas_textures.get(placed.page)?.as_ref()?;
        let (scale, translate) =
            atlas_transform(placed.offset, atlas.width, atlas.height, atlas.origin);
        Some(ClipAtlasBinding {
            texture: atlas.texture.clone(),
            origin: atlas.origin,
            scale,
            translate,
        })
    }

    fn tally(&self, lists: &[RenderTargetListId]) -> FlushTally {
        let mut tally = FlushTally::default();
        for &list in lists {
            let Some(pending) = self.registry.get(list) else {
                continue;
            };
            for &id in &pending.draw_batches {
                for draw in self.batches.draws(id) {
                    tally.draw_paths += 1;
                    tally.add(&draw.path);
                }
            }
            for clip in pending.clip_paths.values() {
                tally.clip_paths += 1;
                tally.add(clip.device_space_path());
            }
        }
        tally
    }

    /// Lay out every pending path of `lists` in atlases and write the
    /// instance buffer.
    ///
    /// Always enters the flushing state; `post_flush` must follow, even when
    /// nothing was drawn.
    pub fn pre_flush<P>(&mut self, provider: &mut P, lists: &[RenderTargetListId]) -> FlushReport<B>
    where
        P: FlushResourceProvider<B> + ?Sized,
    {
        assert!(
            !self.is_flushing(),
            "pre_flush called while a flush is already in progress"
        );
        debug_assert!(self.per_flush.is_none());
        self.state = FlushState::Flushing;

        let mut report = FlushReport::default();
        if self.registry.is_empty() {
            return report;
        }

        let mut unique: Vec<RenderTargetListId> = Vec::with_capacity(lists.len());
        for &list in lists {
            if !unique.contains(&list) {
                unique.push(list);
            }
        }
        let lists = unique;

        let tally = self.tally(&lists);
        let max_total_paths = tally.total_paths();
        report.stats.total_paths = max_total_paths;
        report.stats.clip_paths = tally.clip_paths;
        report.stats.max_path_points = tally.max_path_points;
        report.stats.total_points = tally.total_points;
        report.stats.total_verbs = tally.total_verbs;
        if max_total_paths == 0 {
            return report;
        }

        let Some(index_buffer) = provider.find_or_make_static_buffer(
            StaticBufferKey::OctagonIndices,
            BufferKind::Index,
            bytemuck::cast_slice(&OCTAGON_INDICES),
        ) else {
            return abandon(report, FlushError::IndexBuffer);
        };
        let Some(vertex_buffer) = provider.find_or_make_static_buffer(
            StaticBufferKey::OctagonEdgeNormals,
            BufferKind::Vertex,
            bytemuck::cast_slice(&OCTAGON_EDGE_NORMALS),
        ) else {
            return abandon(report, FlushError::VertexBuffer);
        };
        let instance_bytes = (max_total_paths * std::mem::size_of::<PathInstance>()) as u64;
        let Some(instance_buffer) = provider.make_buffer(BufferKind::Instance, instance_bytes)
        else {
            return abandon(
                report,
                FlushError::InstanceBuffer {
                    bytes: instance_bytes,
                },
            );
        };

        let mut instances: Vec<PathInstance> = Vec::with_capacity(max_total_paths);
        let mut builder = CoverageOpsBuilder::new(
            max_total_paths,
            tally.max_path_points,
            tally.total_points,
            tally.total_verbs,
        );
        let mut packer = AtlasPacker::new(self.min_atlas_size, self.max_atlas_size);

        let mut draw_placed = 0;
        let mut draw_skipped = 0;
        let mut clip_skipped = 0;
        for &list in &lists {
            let Some(pending) = self.registry.get_mut(list) else {
                continue;
            };
            for &id in &pending.draw_batches {
                let counts =
                    self.batches
                        .setup_resources(id, &mut packer, &mut builder, &mut instances);
                draw_placed += counts.placed;
                draw_skipped += counts.skipped;
            }
            for clip in pending.clip_paths.values_mut() {
                if !clip.place_in_atlas(&mut packer, &mut builder) {
                    clip_skipped += 1;
                }
            }
        }

        // The single write into the mapped instance buffer.
        if !instances.is_empty() {
            provider.write_buffer(&instance_buffer, 0, bytemuck::cast_slice(&instances));
        }
        assert!(
            instances.len() <= max_total_paths,
            "wrote more instances than paths"
        );
        assert_eq!(
            draw_placed + draw_skipped,
            tally.draw_paths,
            "placed and skipped draws do not add up"
        );
        assert_eq!(
            instances.len(),
            draw_placed,
            "instance count out of sync with placed draws"
        );

        let skipped = draw_skipped + clip_skipped;
        report.stats.instances_written = instances.len();
        report.stats.skipped_paths = skipped;
        report.stats.placed_paths = max_total_paths - skipped;

        packer.seal_last(&mut builder);
        report.stats.atlas_pages = packer.pages().len();
        let Some(ops) = builder.finalize(provider) else {
            return abandon(report, FlushError::CoverageBuffers);
        };
        debug_assert_eq!(ops.len(), packer.pages().len());

        let pages = packer.into_pages();
        let origin = provider.texture_origin();
        let mut atlas_textures = Vec::with_capacity(pages.len());
        for (index, (page, coverage)) in pages.iter().zip(ops).enumerate() {
            match finalize_page(provider, index, page, origin) {
                Some(atlas) => {
                    report.atlas_tasks.push(AtlasRenderTask {
                        page: index,
                        texture: atlas.texture.clone(),
                        width: atlas.width,
                        height: atlas.height,
                        origin,
                        coverage,
                    });
                    atlas_textures.push(Some(atlas));
                }
                None => atlas_textures.push(None),
            }
        }

        tracing::debug!(
            "covpath flush: {} paths ({} clips), {} instances, {} skipped, {} atlas pages",
            report.stats.total_paths,
            report.stats.clip_paths,
            report.stats.instances_written,
            report.stats.skipped_paths,
            report.stats.atlas_pages
        );

        self.per_flush = Some(PerFlushResources {
            index_buffer,
            vertex_buffer,
            instance_buffer,
            atlas_textures,
        });
        report
    }

    /// Issue the draws of a flushed batch, one per atlas run. Does nothing if
    /// the flush was abandoned or the batch wasn't part of it.
    pub fn execute_batch<S>(&self, id: BatchId, sink: &mut S)
    where
        S: CommandSink<B> + ?Sized,
    {
        assert!(self.is_flushing(), "executing a batch outside of a flush");
        let Some(resources) = self.per_flush.as_ref() else {
            return;
        };
        let Some(batch) = self.batches.get(id) else {
            return;
        };
        let Some(mut base_instance) = batch.base_instance else {
            return;
        };

        for run in &batch.atlas_runs {
            let start = base_instance;
            base_instance = run.end_instance;
            let Some(atlas) = resources.atlas_textures.get(run.page).and_then(Option::as_ref)
            else {
                continue;
            };
            sink.draw(DrawCommand {
                pipeline: PipelineState {
                    fill_rule: batch.fill_rule,
                    srgb_flags: batch.srgb_flags,
                    processors: &batch.processors,
                    atlas: &atlas.texture,
                },
                mesh: InstancedMesh {
                    primitive: PrimitiveType::Triangles,
                    index_buffer: &resources.index_buffer,
                    index_count_per_instance: PER_INSTANCE_INDEX_COUNT,
                    vertex_buffer: &resources.vertex_buffer,
                    instance_buffer: &resources.instance_buffer,
                    base_instance: start,
                    instance_count: run.end_instance - start,
                },
                bounds: batch.bounds,
            });
        }
    }

    /// Drop the per-flush resources and everything pending on `lists`.
    pub fn post_flush(&mut self, lists: &[RenderTargetListId]) {
        assert!(self.is_flushing(), "post_flush without a matching pre_flush");
        self.per_flush = None;
        for &list in lists {
            if let Some(pending) = self.registry.remove(list) {
                for id in pending.draw_batches {
                    self.batches.remove(id);
                }
            }
        }
        self.state = FlushState::Idle;
    }
}

fn abandon<B: GpuBackend>(mut report: FlushReport<B>, error: FlushError) -> FlushReport<B> {
    tracing::warn!("{}. No paths will be drawn this flush.", error);
    report.error = Some(error);
    report
}

fn finalize_page<B, P>(
    provider: &mut P,
    index: usize,
    page: &AtlasPage,
    origin: SurfaceOrigin,
) -> Option<AtlasTexture<B>>
where
    B: GpuBackend,
    P: FlushResourceProvider<B> + ?Sized,
{
    let bounds = page.draw_bounds();
    if bounds.is_empty() {
        return None;
    }
    let (width, height) = (bounds.width() as u32, bounds.height() as u32);
    let Some(texture) = provider.make_atlas_texture(width, height) else {
        tracing::warn!(
            "failed to allocate {}x{} atlas texture; paths in page {} will not be drawn",
            width,
            height,
            index
        );
        return None;
    };
    Some(AtlasTexture {
        texture,
        width,
        height,
        origin,
    })
}
