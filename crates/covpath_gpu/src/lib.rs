//! covpath GPU renderer
//!
//! Deferred, atlas-batched coverage-counting path rendering. Filled paths are
//! recorded as batches, packed into shared coverage atlases once per flush and
//! drawn as instanced octagons that sample their atlas region.
//!
//! GPU access goes through [`FlushResourceProvider`] and [`CommandSink`];
//! [`wgpu_backend`] implements them on wgpu and [`headless`] on the CPU.

mod atlas;
pub mod backend;
pub mod clip_cache;
pub mod config;
pub mod coverage;
pub mod crop;
mod draw_batch;
pub mod error;
pub mod headless;
pub mod interop;
pub mod primitives;
pub mod processors;
mod rectanizer;
pub mod registry;
pub mod renderer;
pub mod wgpu_backend;

pub use backend::{
    BufferKind, CommandSink, DrawCommand, FlushResourceProvider, GpuBackend, GpuCaps,
    InstancedMesh, PipelineState, PrimitiveType, StaticBufferKey, SurfaceOrigin,
};
pub use clip_cache::{ClipAtlasBinding, ClipProcessor};
pub use config::PathRendererConfig;
pub use coverage::{CoverageOp, CoverageOutline, CoverageVerb, ScissorMode};
pub use crop::{PathOps, RectClipOps};
pub use draw_batch::BatchId;
pub use error::{FlushError, ImportError, Result};
pub use primitives::PathInstance;
pub use processors::{AppliedClip, BlendMode, FragmentKey, Paint, ProcessorSet, SrgbFlags};
pub use registry::RenderTargetListId;
pub use renderer::{
    AaType, AtlasRenderTask, CanDrawPath, CanDrawPathArgs, DrawPathArgs, FlushReport, FlushStats,
    PathRenderer, ShapeDescriptor, ShapeStyle,
};
pub use wgpu_backend::{WgpuBackend, WgpuFlushResources};
