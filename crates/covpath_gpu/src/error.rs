//! Error types

use thiserror::Error;

/// Why a flush drew nothing.
///
/// Allocation failures abandon every path of the flush rather than drawing a
/// partial frame out of half-initialized shared buffers. They are reported in the
/// [`FlushReport`](crate::FlushReport) and logged; the caller proceeds with its
/// normal teardown.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushError {
    #[error("failed to allocate path index buffer")]
    IndexBuffer,

    #[error("failed to allocate path vertex buffer")]
    VertexBuffer,

    #[error("failed to allocate path instance buffer ({bytes} bytes)")]
    InstanceBuffer { bytes: u64 },

    #[error("failed to allocate atlas coverage buffers")]
    CoverageBuffers,
}

/// Hardware-buffer import errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    #[error("unsupported hardware buffer format: {0:#x}")]
    UnsupportedFormat(u32),

    #[error("GPU context has been abandoned")]
    ContextAbandoned,

    #[error("hardware buffer import is not supported on this backend")]
    UnsupportedBackend,

    #[error("failed to import hardware buffer: {0}")]
    ImportFailed(String),

    #[error("failed to copy imported texture: {0}")]
    CopyFailed(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
