//! Atlas packing
//!
//! An [`AtlasPage`] is the CPU-side layout of one coverage texture. Pages start
//! small and grow by doubling their shorter side; each growth adds a new
//! skyline region over the newly exposed area so earlier placements stay put.
//! The [`AtlasPacker`] keeps a list of pages, only the last of which accepts
//! new rects. When it is full it is sealed by emitting its coverage op and a
//! new page is started.

use covpath_paint::IRect;

use crate::coverage::{CoverageOpsBuilder, ScissorMode};
use crate::rectanizer::SkylinePacker;

/// Gap kept right/below every placement so coverage never bleeds between paths
const PADDING: i32 = 1;

/// A skyline region of a page, offset to where it sits in the page
#[derive(Debug)]
struct Region {
    packer: SkylinePacker,
    x: i32,
    y: i32,
}

impl Region {
    fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            packer: SkylinePacker::new(right - left, bottom - top),
            x: left,
            y: top,
        }
    }

    fn add_rect(&mut self, width: i32, height: i32, max_size: i32) -> Option<(i32, i32)> {
        let w = if width < max_size { width + PADDING } else { width };
        let h = if height < max_size { height + PADDING } else { height };
        let (x, y) = self.packer.add_rect(w, h)?;
        Some((x + self.x, y + self.y))
    }
}

#[derive(Debug)]
pub(crate) struct AtlasPage {
    width: i32,
    height: i32,
    max_size: i32,
    // Oldest first; searched newest first.
    regions: Vec<Region>,
    draw_width: i32,
    draw_height: i32,
    sealed: bool,
}

impl AtlasPage {
    /// A square page big enough to start with a `width` x `height` rect.
    pub fn new(width: i32, height: i32, min_size: u32, max_size: u32) -> Self {
        let max_size = max_size.min(i32::MAX as u32) as i32;
        let want = width.max(height).max(1) as u32;
        let side = want
            .checked_next_power_of_two()
            .unwrap_or(u32::MAX)
            .max(min_size)
            .min(max_size as u32) as i32;
        Self {
            width: side,
            height: side,
            max_size,
            regions: vec![Region::new(0, 0, side, side)],
            draw_width: 0,
            draw_height: 0,
            sealed: false,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Extent of every placement made so far
    pub fn draw_bounds(&self) -> IRect {
        IRect::from_wh(self.draw_width, self.draw_height)
    }

    /// Reserve a rect, growing the page if needed. `None` means the page is
    /// at full size and nothing fits.
    pub fn add_rect(&mut self, width: i32, height: i32) -> Option<(i32, i32)> {
        assert!(!self.sealed, "adding a rect to a sealed atlas page");
        let (x, y) = self.place_rect(width, height)?;
        self.draw_width = self.draw_width.max(x + width);
        self.draw_height = self.draw_height.max(y + height);
        Some((x, y))
    }

    fn place_rect(&mut self, width: i32, height: i32) -> Option<(i32, i32)> {
        if width <= 0 || height <= 0 || width > self.max_size || height > self.max_size {
            return None;
        }
        let max_size = self.max_size;
        if let Some(loc) = self
            .regions
            .iter_mut()
            .rev()
            .find_map(|region| region.add_rect(width, height, max_size))
        {
            return Some(loc);
        }

        loop {
            if self.width == self.max_size && self.height == self.max_size {
                return None;
            }
            let region = if self.height <= self.width {
                let top = self.height;
                self.height = self.height.saturating_mul(2).min(self.max_size);
                Region::new(0, top, self.width, self.height)
            } else {
                let left = self.width;
                self.width = self.width.saturating_mul(2).min(self.max_size);
                Region::new(left, 0, self.width, self.height)
            };
            self.regions.push(region);
            let newest = self.regions.len() - 1;
            if let Some(loc) = self.regions[newest].add_rect(width, height, max_size) {
                return Some(loc);
            }
        }
    }

    fn seal(&mut self) {
        self.sealed = true;
    }
}

/// Where a path's coverage landed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct PlacedPath {
    /// Index of the page in creation order
    pub page: usize,
    /// Device space to atlas space
    pub offset: [i16; 2],
}

#[derive(Debug)]
pub(crate) struct AtlasPacker {
    min_size: u32,
    max_size: u32,
    pages: Vec<AtlasPage>,
}

impl AtlasPacker {
    pub fn new(min_size: u32, max_size: u32) -> Self {
        Self {
            min_size,
            max_size,
            pages: Vec::new(),
        }
    }

    pub fn pages(&self) -> &[AtlasPage] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<AtlasPage> {
        self.pages
    }

    /// Place the path parsed last by `builder`, then save or discard it.
    ///
    /// Rejection (clipped away, or too big for any page) is not an error:
    /// the caller skips the path.
    pub fn place_parsed_path(
        &mut self,
        clip: &IRect,
        path_bounds: &IRect,
        builder: &mut CoverageOpsBuilder,
    ) -> Option<PlacedPath> {
        let (scissor_mode, clipped) = if clip.contains(path_bounds) {
            (ScissorMode::NonScissored, *path_bounds)
        } else if let Some(clipped) = clip.intersect(path_bounds) {
            (ScissorMode::Scissored, clipped)
        } else {
            builder.discard_parsed_path();
            return None;
        };

        let Some((page, (x, y))) = self.place_rect(clipped.width(), clipped.height(), builder)
        else {
            builder.discard_parsed_path();
            return None;
        };

        let offset = match (
            i16::try_from(x - clipped.left),
            i16::try_from(y - clipped.top),
        ) {
            (Ok(ox), Ok(oy)) => [ox, oy],
            _ => {
                tracing::warn!(
                    "atlas offset for path at ({}, {}) does not fit in 16 bits; skipping",
                    clipped.left,
                    clipped.top
                );
                builder.discard_parsed_path();
                return None;
            }
        };

        builder.save_parsed_path(scissor_mode, &clipped, offset);
        Some(PlacedPath { page, offset })
    }

    fn place_rect(
        &mut self,
        width: i32,
        height: i32,
        builder: &mut CoverageOpsBuilder,
    ) -> Option<(usize, (i32, i32))> {
        let count = self.pages.len();
        if let Some(last) = self.pages.last_mut() {
            if let Some(loc) = last.add_rect(width, height) {
                return Some((count - 1, loc));
            }
            Self::seal_page(count - 1, last, builder);
        }

        let mut page = AtlasPage::new(width, height, self.min_size, self.max_size);
        let loc = page.add_rect(width, height);
        self.pages.push(page);
        loc.map(|loc| (self.pages.len() - 1, loc))
    }

    /// Seal the still-open page, if any.
    pub fn seal_last(&mut self, builder: &mut CoverageOpsBuilder) {
        let index = self.pages.len().saturating_sub(1);
        if let Some(last) = self.pages.last_mut() {
            if !last.is_sealed() {
                Self::seal_page(index, last, builder);
            }
        }
    }

    fn seal_page(index: usize, page: &mut AtlasPage, builder: &mut CoverageOpsBuilder) {
        let bounds = page.draw_bounds();
        tracing::trace!(
            "sealing atlas page {} ({}x{}, drawn {}x{})",
            index,
            page.width(),
            page.height(),
            bounds.width(),
            bounds.height()
        );
        builder.emit_op(bounds);
        page.seal();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covpath_paint::{Path, Rect};

    fn parsed(builder: &mut CoverageOpsBuilder, bounds: IRect) -> IRect {
        let (dev, _) = builder.parse_device_space_path(&Path::rect(Rect::from(bounds)));
        dev.round_out()
    }

    #[test]
    fn test_page_starts_at_min_size() {
        let page = AtlasPage::new(50, 30, 1024, 8192);
        assert_eq!((page.width(), page.height()), (1024, 1024));
        let page = AtlasPage::new(1500, 30, 1024, 8192);
        assert_eq!((page.width(), page.height()), (2048, 2048));
        let page = AtlasPage::new(5000, 30, 1024, 4096);
        assert_eq!((page.width(), page.height()), (4096, 4096));
    }

    #[test]
    fn test_page_grows_shorter_side() {
        let mut page = AtlasPage::new(63, 63, 64, 256);
        // 63x63 plus padding fills the first region exactly.
        assert_eq!(page.add_rect(63, 63), Some((0, 0)));
        assert_eq!(page.add_rect(63, 63), Some((0, 64)));
        assert_eq!((page.width(), page.height()), (64, 128));
        assert_eq!(page.add_rect(60, 60), Some((64, 0)));
        assert_eq!((page.width(), page.height()), (128, 128));
        assert_eq!(page.draw_bounds(), IRect::from_wh(124, 127));
    }

    #[test]
    fn test_full_page_rejects() {
        let mut page = AtlasPage::new(32, 32, 32, 32);
        // At max size no padding is added.
        assert_eq!(page.add_rect(32, 32), Some((0, 0)));
        assert_eq!(page.add_rect(1, 1), None);
        assert_eq!(page.add_rect(33, 1), None);
    }

    #[test]
    fn test_place_unscissored_offset() {
        let mut builder = CoverageOpsBuilder::new(1, 5, 5, 6);
        let mut packer = AtlasPacker::new(1024, 4096);
        let bounds = parsed(&mut builder, IRect::new(100, 200, 150, 250));
        let placed = packer
            .place_parsed_path(&IRect::from_wh(1000, 1000), &bounds, &mut builder)
            .expect("placed");
        assert_eq!(placed, PlacedPath { page: 0, offset: [-100, -200] });
        assert_eq!(packer.pages()[0].draw_bounds(), IRect::from_wh(50, 50));
    }

    #[test]
    fn test_place_scissored_uses_clipped_size() {
        let mut builder = CoverageOpsBuilder::new(1, 5, 5, 6);
        let mut packer = AtlasPacker::new(1024, 4096);
        let bounds = parsed(&mut builder, IRect::new(-20, -20, 80, 30));
        let placed = packer
            .place_parsed_path(&IRect::from_wh(50, 50), &bounds, &mut builder)
            .expect("placed");
        assert_eq!(placed.offset, [0, 0]);
        assert_eq!(packer.pages()[0].draw_bounds(), IRect::from_wh(50, 30));
    }

    #[test]
    fn test_clipped_away_path_rejected() {
        let mut builder = CoverageOpsBuilder::new(1, 5, 5, 6);
        let mut packer = AtlasPacker::new(1024, 4096);
        let bounds = parsed(&mut builder, IRect::new(200, 200, 300, 300));
        assert!(packer
            .place_parsed_path(&IRect::from_wh(100, 100), &bounds, &mut builder)
            .is_none());
        assert!(packer.pages().is_empty());
        assert_eq!(builder.emitted_ops(), 0);
    }

    #[test]
    fn test_full_page_sealed_and_replaced() {
        let mut builder = CoverageOpsBuilder::new(3, 5, 15, 18);
        let mut packer = AtlasPacker::new(64, 64);
        let clip = IRect::from_wh(1000, 1000);
        for i in 0..3 {
            let bounds = parsed(&mut builder, IRect::from_xywh(i * 10, 0, 64, 64));
            let placed = packer
                .place_parsed_path(&clip, &bounds, &mut builder)
                .expect("placed");
            assert_eq!(placed.page, i as usize);
        }
        assert_eq!(packer.pages().len(), 3);
        assert_eq!(builder.emitted_ops(), 2);
        packer.seal_last(&mut builder);
        packer.seal_last(&mut builder);
        assert_eq!(builder.emitted_ops(), 3);
        assert!(packer.pages().iter().all(AtlasPage::is_sealed));
    }

    #[test]
    fn test_oversized_rect_starts_new_page_each_time() {
        let mut builder = CoverageOpsBuilder::new(3, 5, 15, 18);
        let mut packer = AtlasPacker::new(64, 64);
        let clip = IRect::from_wh(1000, 1000);
        for _ in 0..3 {
            let bounds = parsed(&mut builder, IRect::from_xywh(0, 0, 100, 100));
            assert!(packer
                .place_parsed_path(&clip, &bounds, &mut builder)
                .is_none());
        }
        assert_eq!(packer.pages().len(), 3);
        assert_eq!(builder.emitted_ops(), 2);
        packer.seal_last(&mut builder);
        assert_eq!(builder.emitted_ops(), 3);
        assert!(packer.pages().iter().all(|page| page.draw_bounds().is_empty()));
    }
}
