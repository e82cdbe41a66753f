//! Skyline bottom-left rectangle packer
//!
//! Keeps the "skyline" of the packed area as a list of horizontal segments,
//! left to right. A new rect goes where its top edge would sit lowest; ties
//! prefer the narrowest supporting segment.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    x: i32,
    y: i32,
    width: i32,
}

#[derive(Clone, Debug)]
pub(crate) struct SkylinePacker {
    width: i32,
    height: i32,
    skyline: Vec<Segment>,
}

impl SkylinePacker {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            skyline: vec![Segment {
                x: 0,
                y: 0,
                width,
            }],
        }
    }

    /// Reserve a `width` x `height` rect, returning its top-left corner.
    pub fn add_rect(&mut self, width: i32, height: i32) -> Option<(i32, i32)> {
        if width <= 0 || height <= 0 || width > self.width || height > self.height {
            return None;
        }

        // (index, y) of the best fit so far, plus the tie breakers.
        let mut best: Option<(usize, i32)> = None;
        let mut best_top = i32::MAX;
        let mut best_width = i32::MAX;
        for i in 0..self.skyline.len() {
            if let Some(y) = self.rect_fits(i, width, height) {
                let top = y + height;
                let seg_width = self.skyline[i].width;
                if top < best_top || (top == best_top && seg_width < best_width) {
                    best = Some((i, y));
                    best_top = top;
                    best_width = seg_width;
                }
            }
        }

        let (index, y) = best?;
        let x = self.skyline[index].x;
        self.add_skyline_level(index, x, y, width, height);
        Some((x, y))
    }

    /// The y at which a rect starting on segment `index` would rest, if it
    /// fits at all.
    fn rect_fits(&self, index: usize, width: i32, height: i32) -> Option<i32> {
        let x = self.skyline[index].x;
        if x + width > self.width {
            return None;
        }

        let mut width_left = width;
        let mut y = self.skyline[index].y;
        let mut i = index;
        while width_left > 0 {
            let segment = self.skyline.get(i)?;
            y = y.max(segment.y);
            if y + height > self.height {
                return None;
            }
            width_left -= segment.width;
            i += 1;
        }
        Some(y)
    }

    fn add_skyline_level(&mut self, index: usize, x: i32, y: i32, width: i32, height: i32) {
        self.skyline.insert(
            index,
            Segment {
                x,
                y: y + height,
                width,
            },
        );

        // Trim or drop the segments now covered by the new level.
        let i = index + 1;
        while i < self.skyline.len() {
            let prev = self.skyline[i - 1];
            let prev_right = prev.x + prev.width;
            let segment = &mut self.skyline[i];
            if segment.x >= prev_right {
                break;
            }
            let shrink = prev_right - segment.x;
            segment.x += shrink;
            segment.width -= shrink;
            if segment.width <= 0 {
                self.skyline.remove(i);
            } else {
                break;
            }
        }

        // Merge neighbours at the same height.
        let mut i = 0;
        while i + 1 < self.skyline.len() {
            if self.skyline[i].y == self.skyline[i + 1].y {
                self.skyline[i].width += self.skyline[i + 1].width;
                self.skyline.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }
}
