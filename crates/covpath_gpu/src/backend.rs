//! Collaborator seams: GPU resources in, draw commands out
//!
//! The renderer never talks to a GPU API directly. During a flush it asks a
//! [`FlushResourceProvider`] for buffers and atlas textures, and at execution
//! time it hands [`DrawCommand`]s to a [`CommandSink`].

use std::fmt;

use covpath_paint::{FillRule, Rect};

use crate::processors::{ProcessorSet, SrgbFlags};

/// A GPU API the renderer can allocate resources on.
///
/// Handles are cheap to clone (reference counted); the renderer keeps clones
/// alive for the duration of a flush and drops them in `post_flush`.
pub trait GpuBackend: fmt::Debug + 'static {
    type Buffer: Clone + fmt::Debug;
    type Texture: Clone + fmt::Debug;
}

/// Device capability flags the renderer depends on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GpuCaps {
    /// Geometry shaders, or an equivalent way to amplify vertices
    pub geometry_shader_support: bool,
    pub integer_support: bool,
    pub flat_interpolation_support: bool,
    pub instance_attrib_support: bool,
    pub map_buffer_support: bool,
    /// Half-float alpha format can be sampled
    pub alpha_half_texturable: bool,
    /// Half-float alpha format can be rendered to (without MSAA)
    pub alpha_half_renderable: bool,
    /// Advanced blend equations run in hardware
    pub advanced_blend_support: bool,
    /// Driver is known to misbehave with coverage counting
    pub coverage_counting_blocklisted: bool,
    pub max_render_target_size: u32,
}

impl GpuCaps {
    /// Capabilities of a device that supports everything the renderer needs.
    pub fn full(max_render_target_size: u32) -> Self {
        Self {
            geometry_shader_support: true,
            integer_support: true,
            flat_interpolation_support: true,
            instance_attrib_support: true,
            map_buffer_support: true,
            alpha_half_texturable: true,
            alpha_half_renderable: true,
            advanced_blend_support: false,
            coverage_counting_blocklisted: false,
            max_render_target_size,
        }
    }
}

/// What a buffer is bound as
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Index,
    Vertex,
    /// Per-instance vertex data
    Instance,
    /// Path outlines read by the atlas coverage passes
    Coverage,
}

/// Content-independent buffers shared across flushes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StaticBufferKey {
    OctagonIndices,
    OctagonEdgeNormals,
}

/// Where texel row zero lives
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SurfaceOrigin {
    #[default]
    TopLeft,
    BottomLeft,
}

/// Allocates the GPU resources of one flush.
///
/// Every method that allocates returns `None` on failure; the renderer logs
/// the failure and degrades (skip a page, or abandon the flush).
pub trait FlushResourceProvider<B: GpuBackend> {
    fn caps(&self) -> &GpuCaps;

    fn max_render_target_size(&self) -> u32 {
        self.caps().max_render_target_size
    }

    /// Return the buffer cached under `key`, creating it from `contents` on
    /// first use.
    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        contents: &[u8],
    ) -> Option<B::Buffer>;

    /// Create an uninitialized buffer of `size` bytes.
    fn make_buffer(&mut self, kind: BufferKind, size: u64) -> Option<B::Buffer>;

    /// Map `buffer`, copy `data` in at `offset` and unmap.
    fn write_buffer(&mut self, buffer: &B::Buffer, offset: u64, data: &[u8]);

    /// Create a renderable, sampleable half-float alpha texture.
    fn make_atlas_texture(&mut self, width: u32, height: u32) -> Option<B::Texture>;

    fn texture_origin(&self) -> SurfaceOrigin {
        SurfaceOrigin::TopLeft
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveType {
    #[default]
    Triangles,
}

/// Fixed-function and shader state of a path draw
#[derive(Debug)]
pub struct PipelineState<'a, B: GpuBackend> {
    pub fill_rule: FillRule,
    pub srgb_flags: SrgbFlags,
    pub processors: &'a ProcessorSet,
    /// Coverage atlas the instances sample from
    pub atlas: &'a B::Texture,
}

/// An indexed, instanced draw over a range of the flush's instance buffer
#[derive(Debug)]
pub struct InstancedMesh<'a, B: GpuBackend> {
    pub primitive: PrimitiveType,
    pub index_buffer: &'a B::Buffer,
    pub index_count_per_instance: u32,
    pub vertex_buffer: &'a B::Buffer,
    pub instance_buffer: &'a B::Buffer,
    pub base_instance: u32,
    pub instance_count: u32,
}

#[derive(Debug)]
pub struct DrawCommand<'a, B: GpuBackend> {
    pub pipeline: PipelineState<'a, B>,
    pub mesh: InstancedMesh<'a, B>,
    /// Device-space bounds of the whole batch
    pub bounds: Rect,
}

/// Receives the draw calls of executing batches.
pub trait CommandSink<B: GpuBackend> {
    fn draw(&mut self, command: DrawCommand<'_, B>);
}
