//! 2D transforms

use crate::path::Point;
use crate::primitives::Rect;

/// 2D affine transform with an optional perspective row.
///
/// Maps `(x, y)` to `(a*x + c*y + e, b*x + d*y + f)`. When the perspective row
/// `persp` differs from `[0, 0, 1]` the result is divided by
/// `persp[0]*x + persp[1]*y + persp[2]`. The coverage-counting renderer refuses
/// perspective transforms, but callers can still describe them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2D {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
    pub persp: [f32; 3],
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform2D {
    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub const fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self {
            a,
            b,
            c,
            d,
            e,
            f,
            persp: [0.0, 0.0, 1.0],
        }
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotate(angle: f32) -> Self {
        let cos = angle.cos();
        let sin = angle.sin();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn with_perspective(mut self, p0: f32, p1: f32, p2: f32) -> Self {
        self.persp = [p0, p1, p2];
        self
    }

    pub fn has_perspective(&self) -> bool {
        self.persp != [0.0, 0.0, 1.0]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    pub fn scale_x(&self) -> f32 {
        self.a
    }

    pub fn skew_y(&self) -> f32 {
        self.b
    }

    pub fn skew_x(&self) -> f32 {
        self.c
    }

    pub fn scale_y(&self) -> f32 {
        self.d
    }

    pub fn translate_x(&self) -> f32 {
        self.e
    }

    pub fn translate_y(&self) -> f32 {
        self.f
    }

    /// `self` applied after `first`.
    pub fn pre_concat(&self, first: &Transform2D) -> Transform2D {
        debug_assert!(
            !self.has_perspective() && !first.has_perspective(),
            "pre_concat only composes affine transforms"
        );
        Transform2D::new(
            self.a * first.a + self.c * first.b,
            self.b * first.a + self.d * first.b,
            self.a * first.c + self.c * first.d,
            self.b * first.c + self.d * first.d,
            self.a * first.e + self.c * first.f + self.e,
            self.b * first.e + self.d * first.f + self.f,
        )
    }

    pub fn map_point(&self, p: Point) -> Point {
        let x = self.a * p.x + self.c * p.y + self.e;
        let y = self.b * p.x + self.d * p.y + self.f;
        if !self.has_perspective() {
            return Point::new(x, y);
        }
        let w = self.persp[0] * p.x + self.persp[1] * p.y + self.persp[2];
        let inv = if w != 0.0 { 1.0 / w } else { 0.0 };
        Point::new(x * inv, y * inv)
    }

    /// Bounds of the four mapped corners of `rect`.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            Point::new(rect.left(), rect.top()),
            Point::new(rect.right(), rect.top()),
            Point::new(rect.right(), rect.bottom()),
            Point::new(rect.left(), rect.bottom()),
        ]
        .map(|p| self.map_point(p));

        let (mut l, mut t) = (corners[0].x, corners[0].y);
        let (mut r, mut b) = (l, t);
        for p in &corners[1..] {
            l = l.min(p.x);
            t = t.min(p.y);
            r = r.max(p.x);
            b = b.max(p.y);
        }
        Rect::from_ltrb(l, t, r, b)
    }
}
