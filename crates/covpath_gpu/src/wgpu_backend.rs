//! wgpu implementation of the resource seam

use std::sync::Arc;

use rustc_hash::FxHashMap;
use wgpu::util::DeviceExt;

use crate::backend::{
    BufferKind, FlushResourceProvider, GpuBackend, GpuCaps, StaticBufferKey, SurfaceOrigin,
};

/// Half-float alpha-only target the atlases are rendered into
pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R16Float;

#[derive(Debug)]
pub struct WgpuBackend;

impl GpuBackend for WgpuBackend {
    type Buffer = Arc<wgpu::Buffer>;
    type Texture = Arc<wgpu::Texture>;
}

/// Derive renderer capabilities from what the adapter reports.
///
/// wgpu has no geometry stage; outlines are pulled from storage buffers in
/// the vertex shader instead, so that downlevel flag stands in for it.
pub fn caps_from_adapter(adapter: &wgpu::Adapter) -> GpuCaps {
    let downlevel = adapter.get_downlevel_capabilities();
    let atlas_usages = adapter.get_texture_format_features(ATLAS_FORMAT).allowed_usages;
    GpuCaps {
        geometry_shader_support: downlevel
            .flags
            .contains(wgpu::DownlevelFlags::VERTEX_STORAGE),
        integer_support: true,
        flat_interpolation_support: true,
        instance_attrib_support: true,
        map_buffer_support: true,
        alpha_half_texturable: atlas_usages.contains(wgpu::TextureUsages::TEXTURE_BINDING),
        alpha_half_renderable: atlas_usages.contains(wgpu::TextureUsages::RENDER_ATTACHMENT),
        advanced_blend_support: false,
        coverage_counting_blocklisted: false,
        max_render_target_size: adapter.limits().max_texture_dimension_2d,
    }
}

fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Vertex | BufferKind::Instance => wgpu::BufferUsages::VERTEX,
        BufferKind::Coverage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

fn buffer_label(kind: BufferKind) -> &'static str {
    match kind {
        BufferKind::Index => "Path Index Buffer",
        BufferKind::Vertex => "Path Vertex Buffer",
        BufferKind::Instance => "Path Instance Buffer",
        BufferKind::Coverage => "Atlas Coverage Buffer",
    }
}

fn align_to_copy(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.div_ceil(align) * align
}

/// Allocates flush resources on a wgpu device
pub struct WgpuFlushResources {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    caps: GpuCaps,
    static_buffers: FxHashMap<StaticBufferKey, Arc<wgpu::Buffer>>,
}

impl WgpuFlushResources {
    pub fn new(adapter: &wgpu::Adapter, device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let mut caps = caps_from_adapter(adapter);
        // The device may have been created with tighter limits than the adapter.
        caps.max_render_target_size = caps
            .max_render_target_size
            .min(device.limits().max_texture_dimension_2d);
        Self {
            device,
            queue,
            caps,
            static_buffers: FxHashMap::default(),
        }
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }
}

impl FlushResourceProvider<WgpuBackend> for WgpuFlushResources {
    fn caps(&self) -> &GpuCaps {
        &self.caps
    }

    fn find_or_make_static_buffer(
        &mut self,
        key: StaticBufferKey,
        kind: BufferKind,
        contents: &[u8],
    ) -> Option<Arc<wgpu::Buffer>> {
        if let Some(buffer) = self.static_buffers.get(&key) {
            return Some(buffer.clone());
        }
        if contents.is_empty() {
            return None;
        }
        let buffer = Arc::new(
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(buffer_label(kind)),
                    contents,
                    usage: buffer_usage(kind),
                }),
        );
        self.static_buffers.insert(key, buffer.clone());
        Some(buffer)
    }

    fn make_buffer(&mut self, kind: BufferKind, size: u64) -> Option<Arc<wgpu::Buffer>> {
        let size = align_to_copy(size.max(wgpu::COPY_BUFFER_ALIGNMENT));
        let limits = self.device.limits();
        let binding_limit = match kind {
            BufferKind::Coverage => u64::from(limits.max_storage_buffer_binding_size),
            _ => limits.max_buffer_size,
        };
        if size > limits.max_buffer_size.min(binding_limit) {
            tracing::warn!(
                "{} of {} bytes exceeds device limits",
                buffer_label(kind),
                size
            );
            return None;
        }
        Some(Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(buffer_label(kind)),
            size,
            usage: buffer_usage(kind),
            mapped_at_creation: false,
        })))
    }

    fn write_buffer(&mut self, buffer: &Arc<wgpu::Buffer>, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let padded_len = align_to_copy(data.len() as u64);
        if offset % wgpu::COPY_BUFFER_ALIGNMENT != 0 || offset + padded_len > buffer.size() {
            tracing::warn!(
                "dropping unaligned or oversized write of {} bytes at {}",
                data.len(),
                offset
            );
            return;
        }
        if padded_len == data.len() as u64 {
            self.queue.write_buffer(buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(padded_len as usize, 0);
            self.queue.write_buffer(buffer, offset, &padded);
        }
    }

    fn make_atlas_texture(&mut self, width: u32, height: u32) -> Option<Arc<wgpu::Texture>> {
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max_dim || height > max_dim {
            tracing::warn!("atlas size {}x{} outside 1..={}", width, height, max_dim);
            return None;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Coverage Atlas"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        Some(Arc::new(texture))
    }

    fn texture_origin(&self) -> SurfaceOrigin {
        SurfaceOrigin::TopLeft
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to_copy() {
        assert_eq!(align_to_copy(0), 0);
        assert_eq!(align_to_copy(1), 4);
        assert_eq!(align_to_copy(36), 36);
        assert_eq!(align_to_copy(37), 40);
    }

    #[test]
    fn test_buffer_usages() {
        assert!(buffer_usage(BufferKind::Index).contains(wgpu::BufferUsages::INDEX));
        assert!(buffer_usage(BufferKind::Instance).contains(wgpu::BufferUsages::VERTEX));
        assert!(buffer_usage(BufferKind::Coverage).contains(wgpu::BufferUsages::STORAGE));
        assert!(buffer_usage(BufferKind::Vertex).contains(wgpu::BufferUsages::COPY_DST));
    }
}
