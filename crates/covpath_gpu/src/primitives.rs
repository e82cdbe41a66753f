//! GPU-ready per-instance records and the shared octagon geometry
//!
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` so they can be
//! copied straight into mapped buffers.

use covpath_paint::{Rect, Transform2D};

/// One drawn path: everything the path shader needs to cover its octagon and
/// sample its coverage out of the atlas.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PathInstance {
    /// Device-space bounds (left, top, right, bottom)
    pub dev_bounds: [f32; 4],
    /// Bounds in the 45-degree frame: (min x+y, min y-x, max x+y, max y-x)
    pub dev_bounds45: [f32; 4],
    /// Linear part of the view matrix (scale_x, skew_y, skew_x, scale_y)
    pub view_matrix: [f32; 4],
    pub view_translate: [f32; 2],
    /// Translation from device space into atlas space
    pub atlas_offset: [i16; 2],
    /// Unpremultiplied RGBA8, little endian
    pub color: u32,
}

impl PathInstance {
    pub fn new(
        dev_bounds: &Rect,
        dev_bounds45: &Rect,
        view_matrix: &Transform2D,
        atlas_offset: [i16; 2],
        color: u32,
    ) -> Self {
        Self {
            dev_bounds: ltrb(dev_bounds),
            dev_bounds45: ltrb(dev_bounds45),
            view_matrix: [
                view_matrix.scale_x(),
                view_matrix.skew_y(),
                view_matrix.skew_x(),
                view_matrix.scale_y(),
            ],
            view_translate: [view_matrix.translate_x(), view_matrix.translate_y()],
            atlas_offset,
            color,
        }
    }
}

fn ltrb(rect: &Rect) -> [f32; 4] {
    [rect.left(), rect.top(), rect.right(), rect.bottom()]
}

/// Corners of the bounding octagon: each vertex is where an axis-aligned
/// edge (normal in xy) meets a diagonal edge (normal in zw).
pub const OCTAGON_EDGE_NORMALS: [[f32; 4]; 8] = [
    [1.0, 0.0, 1.0, 1.0],
    [0.0, 1.0, 1.0, 1.0],
    [0.0, 1.0, -1.0, 1.0],
    [-1.0, 0.0, -1.0, 1.0],
    [-1.0, 0.0, -1.0, -1.0],
    [0.0, -1.0, -1.0, -1.0],
    [0.0, -1.0, 1.0, -1.0],
    [1.0, 0.0, 1.0, -1.0],
];

/// Octagon triangulation: two central triangles plus four corner caps.
pub const OCTAGON_INDICES: [u16; 18] = [0, 4, 2, 0, 6, 4, 0, 2, 1, 2, 4, 3, 4, 6, 5, 6, 0, 7];

/// Indices drawn per path instance
pub const PER_INSTANCE_INDEX_COUNT: u32 = OCTAGON_INDICES.len() as u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_layout() {
        assert_eq!(std::mem::size_of::<PathInstance>(), 64);
        assert_eq!(std::mem::align_of::<PathInstance>(), 4);
    }

    #[test]
    fn test_instance_from_transform() {
        let m = Transform2D::new(2.0, 0.5, -0.5, 3.0, 10.0, 20.0);
        let inst = PathInstance::new(
            &Rect::from_ltrb(1.0, 2.0, 3.0, 4.0),
            &Rect::from_ltrb(3.0, 1.0, 7.0, 3.0),
            &m,
            [-5, 7],
            0xff00_00ff,
        );
        assert_eq!(inst.dev_bounds, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(inst.view_matrix, [2.0, 0.5, -0.5, 3.0]);
        assert_eq!(inst.view_translate, [10.0, 20.0]);
        assert_eq!(inst.atlas_offset, [-5, 7]);

        let bytes: &[u8] = bytemuck::bytes_of(&inst);
        assert_eq!(bytes.len(), 64);
    }

    #[test]
    fn test_octagon_indices_cover_every_vertex() {
        let mut seen = [false; 8];
        for &i in &OCTAGON_INDICES {
            seen[i as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert_eq!(PER_INSTANCE_INDEX_COUNT, 18);
    }
}
