//! Clip paths shared across the draws of a render-target list
//!
//! A clip path is keyed by its [`PathId`]: every clip processor made for the
//! same path on the same list shares one entry, one atlas placement and one
//! coverage mask. Entries only remember bounds at lookup time; placement
//! happens in `pre_flush`, next to the draw batches.

use covpath_paint::{FillRule, IRect, Path, PathId};
use indexmap::map::Entry;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::atlas::{AtlasPacker, PlacedPath};
use crate::backend::{GpuBackend, SurfaceOrigin};
use crate::coverage::CoverageOpsBuilder;
use crate::crop::{crop_path, PathOps, PATH_CROP_THRESHOLD};
use crate::registry::RenderTargetListId;

/// Clip paths of one list, in first-use order
pub(crate) type ClipPathMap = IndexMap<PathId, ClipPath, FxBuildHasher>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ClipPlacement {
    /// Not flushed yet
    Pending,
    Placed(PlacedPath),
    /// Clipped away or out of atlas space
    Rejected,
}

#[derive(Debug)]
pub(crate) struct ClipPath {
    device_space_path: Path,
    /// Rounded-out bounds of the path as given, before any crop
    path_dev_ibounds: IRect,
    /// Union of every access rect seen so far
    access_rect: IRect,
    placement: ClipPlacement,
}

impl ClipPath {
    fn new(
        device_space_path: &Path,
        access_rect: IRect,
        rt_width: i32,
        rt_height: i32,
        path_ops: &dyn PathOps,
    ) -> Self {
        let bounds = device_space_path.bounds();
        let path = if bounds.width().max(bounds.height()) > PATH_CROP_THRESHOLD {
            crop_path(
                device_space_path,
                &IRect::from_wh(rt_width, rt_height),
                path_ops,
            )
        } else {
            device_space_path.clone()
        };
        Self {
            device_space_path: path,
            path_dev_ibounds: bounds.round_out(),
            access_rect,
            placement: ClipPlacement::Pending,
        }
    }

    /// Widen the access union. It never shrinks.
    pub fn add_access(&mut self, access_rect: &IRect) {
        self.access_rect.join(access_rect);
    }

    pub fn access_rect(&self) -> IRect {
        self.access_rect
    }

    pub fn path_dev_ibounds(&self) -> IRect {
        self.path_dev_ibounds
    }

    pub fn device_space_path(&self) -> &Path {
        &self.device_space_path
    }

    pub fn placement(&self) -> ClipPlacement {
        self.placement
    }

    /// Consumers must bounds-check when the path doesn't cover every pixel
    /// they will read.
    pub fn must_check_bounds(&self) -> bool {
        !self.path_dev_ibounds().contains(&self.access_rect())
    }

    /// Parse and place the path. Returns whether it got atlas space.
    pub fn place_in_atlas(
        &mut self,
        packer: &mut AtlasPacker,
        builder: &mut CoverageOpsBuilder,
    ) -> bool {
        assert_eq!(
            self.placement,
            ClipPlacement::Pending,
            "clip path placed twice in one flush"
        );
        builder.parse_device_space_path(&self.device_space_path);
        self.placement =
            match packer.place_parsed_path(&self.access_rect, &self.path_dev_ibounds, builder) {
                Some(placed) => ClipPlacement::Placed(placed),
                None => ClipPlacement::Rejected,
            };
        matches!(self.placement, ClipPlacement::Placed(_))
    }
}

/// The entry for `path`, created on first use; later lookups widen its
/// access union.
pub(crate) fn lookup_or_create<'a>(
    clips: &'a mut ClipPathMap,
    path: &Path,
    access_rect: IRect,
    rt_width: i32,
    rt_height: i32,
    path_ops: &dyn PathOps,
) -> &'a mut ClipPath {
    match clips.entry(path.id()) {
        Entry::Occupied(entry) => {
            let clip = entry.into_mut();
            clip.add_access(&access_rect);
            clip
        }
        Entry::Vacant(entry) => entry.insert(ClipPath::new(
            path,
            access_rect,
            rt_width,
            rt_height,
            path_ops,
        )),
    }
}

/// Coverage-mask lookup for a clip path, handed to the shader that applies it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClipProcessor {
    list: RenderTargetListId,
    path: PathId,
    /// Access union at the time the processor was made
    access_rect: IRect,
    must_check_bounds: bool,
    fill_rule: FillRule,
}

impl ClipProcessor {
    pub(crate) fn new(list: RenderTargetListId, path: &Path, clip: &ClipPath) -> Self {
        Self {
            list,
            path: path.id(),
            access_rect: clip.access_rect(),
            must_check_bounds: clip.must_check_bounds(),
            fill_rule: path.fill_rule(),
        }
    }

    pub fn list(&self) -> RenderTargetListId {
        self.list
    }

    pub fn path_id(&self) -> PathId {
        self.path
    }

    pub fn access_rect(&self) -> IRect {
        self.access_rect
    }

    pub fn must_check_bounds(&self) -> bool {
        self.must_check_bounds
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }
}

/// Atlas texture and the device-to-texcoord mapping of a clip mask
#[derive(Debug)]
pub struct ClipAtlasBinding<B: GpuBackend> {
    pub texture: B::Texture,
    pub origin: SurfaceOrigin,
    pub scale: [f32; 2],
    pub translate: [f32; 2],
}

/// Map device coordinates to normalized texture coordinates of the atlas.
pub(crate) fn atlas_transform(
    offset: [i16; 2],
    texture_width: u32,
    texture_height: u32,
    origin: SurfaceOrigin,
) -> ([f32; 2], [f32; 2]) {
    let mut scale = [1.0 / texture_width as f32, 1.0 / texture_height as f32];
    let mut translate = [
        f32::from(offset[0]) * scale[0],
        f32::from(offset[1]) * scale[1],
    ];
    if origin == SurfaceOrigin::BottomLeft {
        scale[1] = -scale[1];
        translate[1] = 1.0 - translate[1];
    }
    (scale, translate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::RectClipOps;
    use covpath_paint::{PathBuilder, Rect};

    fn circle_ish() -> Path {
        PathBuilder::new()
            .move_to(10.0, 0.0)
            .quad_to(20.0, 0.0, 20.0, 10.0)
            .quad_to(20.0, 20.0, 10.0, 20.0)
            .quad_to(0.0, 20.0, 0.0, 10.0)
            .quad_to(0.0, 0.0, 10.0, 0.0)
            .close()
            .build()
    }

    #[test]
    fn test_access_union_never_shrinks() {
        let mut clips = ClipPathMap::default();
        let path = circle_ish();
        let ops = RectClipOps::default();
        let rects = [
            IRect::new(0, 0, 10, 10),
            IRect::new(5, 5, 8, 8),
            IRect::new(12, 2, 30, 9),
            IRect::new(1, 1, 2, 2),
        ];
        let mut prev = IRect::EMPTY;
        for rect in rects {
            let clip = lookup_or_create(&mut clips, &path, rect, 100, 100, &ops);
            let union = clip.access_rect();
            assert!(prev.is_empty() || union.contains(&prev));
            assert!(union.contains(&rect));
            prev = union;
        }
        assert_eq!(clips.len(), 1);
        assert_eq!(prev, IRect::new(0, 0, 30, 10));
    }

    #[test]
    fn test_must_check_bounds_uses_union() {
        let mut clips = ClipPathMap::default();
        let path = circle_ish();
        let ops = RectClipOps::default();
        let clip = lookup_or_create(&mut clips, &path, IRect::new(2, 2, 18, 18), 100, 100, &ops);
        assert!(!clip.must_check_bounds());
        let clip = lookup_or_create(&mut clips, &path, IRect::new(15, 15, 40, 40), 100, 100, &ops);
        assert!(clip.must_check_bounds());
    }

    #[test]
    fn test_oversized_clip_cropped_to_target() {
        let mut clips = ClipPathMap::default();
        let path = Path::rect(Rect::from_ltrb(-100_000.0, 10.0, 100_000.0, 20.0));
        let ops = RectClipOps::default();
        let clip = lookup_or_create(&mut clips, &path, IRect::from_wh(64, 64), 640, 480, &ops);
        assert!(Rect::from_ltrb(0.0, 0.0, 640.0, 480.0)
            .contains_rect(&clip.device_space_path().bounds()));
        // Placement still uses the uncropped bounds.
        assert_eq!(clip.path_dev_ibounds().left, -100_000);
    }

    #[test]
    fn test_distinct_paths_get_distinct_entries() {
        let mut clips = ClipPathMap::default();
        let ops = RectClipOps::default();
        let a = circle_ish();
        let b = circle_ish();
        lookup_or_create(&mut clips, &a, IRect::from_wh(5, 5), 100, 100, &ops);
        lookup_or_create(&mut clips, &b, IRect::from_wh(5, 5), 100, 100, &ops);
        lookup_or_create(&mut clips, &a, IRect::from_wh(9, 9), 100, 100, &ops);
        assert_eq!(clips.len(), 2);
        assert_eq!(clips.get_index(0).map(|(id, _)| *id), Some(a.id()));
    }

    #[test]
    fn test_atlas_transform() {
        let (scale, translate) = atlas_transform([64, -32], 256, 128, SurfaceOrigin::TopLeft);
        assert_eq!(scale, [1.0 / 256.0, 1.0 / 128.0]);
        assert_eq!(translate, [0.25, -0.25]);

        let (scale, translate) = atlas_transform([64, -32], 256, 128, SurfaceOrigin::BottomLeft);
        assert_eq!(scale, [1.0 / 256.0, -1.0 / 128.0]);
        assert_eq!(translate, [0.25, 1.25]);
    }
}
