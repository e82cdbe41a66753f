//! CPU-only backend
//!
//! Buffers are byte vectors and textures are bare descriptors. Useful for
//! tests and for inspecting what a flush produces without a device.
//! Individual allocations can be made to fail through
//! [`HeadlessProvider::failures`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bytemuck::Pod;
use covpath_paint::{FillRule, Rect};
use rustc_hash::FxHashMap;

use crate::backend::{
    BufferKind, CommandSink, DrawCommand, FlushResourceProvider, GpuBackend, GpuCaps,
    StaticBufferKey, SurfaceOrigin,
};
use crate::processors::ProcessorSet;

static NEXT_RESOURCE_ID: AtomicU32 = AtomicU32::new(1);

fn next_resource_id() -> u32 {
    NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct HeadlessBackend;

impl GpuBackend for HeadlessBackend {
    type Buffer = Arc<HeadlessBuffer>;
    type Texture = Arc<HeadlessTexture>;
}

#[derive(Debug)]
pub struct HeadlessBuffer {
    id: u32,
    kind: BufferKind,
    data: Mutex<Vec<u8>>,
}

impl HeadlessBuffer {
    fn new(kind: BufferKind, data: Vec<u8>) -> Self {
        Self {
            id: next_resource_id(),
            kind,
            data: Mutex::new(data),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.data.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().map(|d| d.clone()).unwrap_or_default()
    }

    /// Decode the buffer as tightly packed `T`s; a trailing partial element
    /// is ignored.
    pub fn read<T: Pod>(&self) -> Vec<T> {
        let bytes = self.contents();
        bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }

    fn write(&self, offset: u64, src: &[u8]) {
        let Ok(mut data) = self.data.lock() else {
            return;
        };
        let start = offset as usize;
        let Some(end) = start.checked_add(src.len()).filter(|&end| end <= data.len()) else {
            tracing::warn!(
                "write of {} bytes at {} overruns buffer {} ({} bytes)",
                src.len(),
                offset,
                self.id,
                data.len()
            );
            return;
        };
        data[start..end].copy_from_slice(src);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessTexture {
    pub id: u32,
    pub width: u32,
    pub height: u32,
}

/// Allocations to refuse
#[derive(Clone, Copy, Debug, Default)]
pub struct HeadlessFailures {
    pub index_buffer: bool,
    pub vertex_buffer: bool,
    pub instance_buffer: bool,
    pub coverage_buffer: bool,
    /// Fail every atlas texture
    pub atlas_textures: bool,
    /// Fail only the atlas texture with this creation index
    pub atlas_texture_index: Option<usize>,
}

#[derive(Debug)]
pub struct HeadlessProvider {
    caps: GpuCaps,
    origin: SurfaceOrigin,
    pub failures: HeadlessFailures,
    static_buffers: FxHashMap<StaticBufferKey, Arc<HeadlessBuffer>>,
    textures_requested: usize,
    /// Every atlas texture handed out, in order
    pub textures: Vec<Arc<HeadlessTexture>>,
    pub buffers_made: usize,
    pub bytes_written: usize,
}

impl HeadlessProvider {
    pub fn new(max_render_target_size: u32) -> Self {
        Self::with_caps(GpuCaps::full(max_render_target_size))
    }

    pub fn with_caps(caps: GpuCaps) -> Self {
        Self {
            caps,
            origin: SurfaceOrigin::TopLeft,
            failures: HeadlessFailures::default(),
            static_buffers: FxHashMap::default(),
            textures_requested: 0,
            textures: Vec::new(),
            buffers_made: 0,
            bytes_written: 0,
        }
    }

    pub fn with_origin(mut self, origin: SurfaceOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn static_buffer(&self, key: StaticBufferKey) -> Option<Arc<HeadlessBuffer>> {
        self.static_buffers.get(&key).cloned()
    }
}

impl FlushResourceProvider<HeadlessBackend> for HeadlessProvider {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        contents: &[u8],
    ) -> Option<Arc<HeadlessBuffer>> {
        let fail = match kind {
            BufferKind::Index => self.failures.index_buffer,
            BufferKind::Vertex => self.failures.vertex_buffer,
            _ => false,
        };
        if fail {
            return None;
        }
        let buffer = self
            .static_buffers
            .entry(key)
            .or_insert_with(|| Arc::new(HeadlessBuffer::new(kind, contents.to_vec())));
        Some(buffer.clone())
    }

    fn make_buffer(&mut self, kind: BufferKind, size: u64) -> Option<Arc<HeadlessBuffer>> {
        let fail = match kind {
            BufferKind::Instance => self.failures.instance_buffer,
            BufferKind::Coverage => self.failures.coverage_buffer,
            _ => false,
        };
        if fail {
            return None;
        }
        let size = usize::try_from(size).ok()?;
        self.buffers_made += 1;
        Some(Arc::new(HeadlessBuffer::new(kind, vec![0; size])))
    }

    fn write_buffer(&mut self, buffer: &Arc<HeadlessBuffer>, offset: u64, data: &[u8]) {
        self.bytes_written += data.len();
        buffer.write(offset, data);
    }

    fn make_atlas_texture(&mut self, width: u32, height: u32) -> Option<Arc<HeadlessTexture>> {
        let index = self.textures_requested;
        self.textures_requested += 1;
        if self.failures.atlas_textures || self.failures.atlas_texture_index == Some(index) {
            return None;
        }
        let texture = Arc::new(HeadlessTexture {
            id: next_resource_id(),
            width,
            height,
        });
        self.textures.push(texture.clone());
        Some(texture)
    }

    fn texture_origin(&self) -> SurfaceOrigin {
        self.origin
    }
}

/// Owned copy of a [`DrawCommand`]
#[derive(Clone, Debug)]
pub struct RecordedDraw {
    pub fill_rule: FillRule,
    pub processors: ProcessorSet,
    pub atlas: Arc<HeadlessTexture>,
    pub instance_buffer: Arc<HeadlessBuffer>,
    pub index_count_per_instance: u32,
    pub base_instance: u32,
    pub instance_count: u32,
    pub bounds: Rect,
}

/// Command sink that keeps every draw for inspection
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub draws: Vec<RecordedDraw>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_instances(&self) -> u32 {
        self.draws.iter().map(|d| d.instance_count).sum()
    }
}

impl CommandSink<HeadlessBackend> for RecordingSink {
    fn draw(&mut self, command: DrawCommand<'_, HeadlessBackend>) {
        self.draws.push(RecordedDraw {
            fill_rule: command.pipeline.fill_rule,
            processors: command.pipeline.processors.clone(),
            atlas: command.pipeline.atlas.clone(),
            instance_buffer: command.mesh.instance_buffer.clone(),
            index_count_per_instance: command.mesh.index_count_per_instance,
            base_instance: command.mesh.base_instance,
            instance_count: command.mesh.instance_count,
            bounds: command.bounds,
        });
    }
}
