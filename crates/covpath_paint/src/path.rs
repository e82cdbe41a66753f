//! Path building and representation

use std::sync::atomic::{AtomicU32, Ordering};

use smallvec::SmallVec;

use crate::primitives::Rect;
use crate::transform::Transform2D;

/// A 2D point
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Stable identity of a path's geometry.
///
/// Every built path receives a fresh id; clones share it. The clip-path cache
/// keys its entries by this id, so two clones of one path share one atlas mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(u32);

impl PathId {
    fn next() -> Self {
        static NEXT_ID: AtomicU32 = AtomicU32::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Winding rule used to turn a path's coverage count into coverage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// Path command
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathCommand {
    MoveTo(Point),
    LineTo(Point),
    QuadTo {
        control: Point,
        end: Point,
    },
    /// Rational quadratic. The renderer can't draw these; they exist so
    /// callers can describe such paths and have them refused.
    ConicTo {
        control: Point,
        end: Point,
        weight: f32,
    },
    CubicTo {
        control1: Point,
        control2: Point,
        end: Point,
    },
    Close,
}

impl PathCommand {
    /// Number of points this command stores
    pub fn point_count(&self) -> usize {
        match self {
            PathCommand::MoveTo(_) | PathCommand::LineTo(_) => 1,
            PathCommand::QuadTo { .. } | PathCommand::ConicTo { .. } => 2,
            PathCommand::CubicTo { .. } => 3,
            PathCommand::Close => 0,
        }
    }

    fn for_each_point(&self, mut f: impl FnMut(Point)) {
        match *self {
            PathCommand::MoveTo(p) | PathCommand::LineTo(p) => f(p),
            PathCommand::QuadTo { control, end } | PathCommand::ConicTo { control, end, .. } => {
                f(control);
                f(end);
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                f(control1);
                f(control2);
                f(end);
            }
            PathCommand::Close => {}
        }
    }

    fn map_points(&self, t: &Transform2D) -> PathCommand {
        match *self {
            PathCommand::MoveTo(p) => PathCommand::MoveTo(t.map_point(p)),
            PathCommand::LineTo(p) => PathCommand::LineTo(t.map_point(p)),
            PathCommand::QuadTo { control, end } => PathCommand::QuadTo {
                control: t.map_point(control),
                end: t.map_point(end),
            },
            PathCommand::ConicTo {
                control,
                end,
                weight,
            } => PathCommand::ConicTo {
                control: t.map_point(control),
                end: t.map_point(end),
                weight,
            },
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => PathCommand::CubicTo {
                control1: t.map_point(control1),
                control2: t.map_point(control2),
                end: t.map_point(end),
            },
            PathCommand::Close => PathCommand::Close,
        }
    }
}

/// A 2D path composed of commands
#[derive(Clone, Debug)]
pub struct Path {
    commands: SmallVec<[PathCommand; 16]>,
    fill_rule: FillRule,
    volatile: bool,
    id: PathId,
}

impl Default for Path {
    fn default() -> Self {
        Self::new()
    }
}

impl Path {
    pub fn new() -> Self {
        Self::from_commands(SmallVec::new(), FillRule::default())
    }

    fn from_commands(commands: SmallVec<[PathCommand; 16]>, fill_rule: FillRule) -> Self {
        Self {
            commands,
            fill_rule,
            volatile: false,
            id: PathId::next(),
        }
    }

    /// Closed axis-aligned rectangle, wound clockwise in y-down space.
    pub fn rect(rect: Rect) -> Self {
        PathBuilder::new()
            .move_to(rect.left(), rect.top())
            .line_to(rect.right(), rect.top())
            .line_to(rect.right(), rect.bottom())
            .line_to(rect.left(), rect.bottom())
            .close()
            .build()
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    /// Changing the fill rule does not change the geometry, so the id is kept.
    pub fn with_fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    /// Volatile paths are not expected to be drawn again and are never worth caching.
    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    pub fn with_volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    pub fn count_points(&self) -> usize {
        self.commands.iter().map(PathCommand::point_count).sum()
    }

    pub fn count_verbs(&self) -> usize {
        self.commands.len()
    }

    pub fn conic_weight_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, PathCommand::ConicTo { .. }))
            .count()
    }

    /// Bounds of every stored point, control points included. Empty paths
    /// report [`Rect::EMPTY`].
    pub fn bounds(&self) -> Rect {
        let mut bounds: Option<(f32, f32, f32, f32)> = None;
        for cmd in &self.commands {
            cmd.for_each_point(|p| {
                bounds = Some(match bounds {
                    None => (p.x, p.y, p.x, p.y),
                    Some((l, t, r, b)) => (l.min(p.x), t.min(p.y), r.max(p.x), b.max(p.y)),
                });
            });
        }
        match bounds {
            Some((l, t, r, b)) => Rect::from_ltrb(l, t, r, b),
            None => Rect::EMPTY,
        }
    }

    pub fn is_finite(&self) -> bool {
        let mut finite = true;
        for cmd in &self.commands {
            cmd.for_each_point(|p| finite &= p.is_finite());
        }
        finite
    }

    /// A copy of this path with every point mapped through `transform`.
    /// The result is new geometry and receives a new id.
    pub fn transformed(&self, transform: &Transform2D) -> Path {
        let commands = self
            .commands
            .iter()
            .map(|c| c.map_points(transform))
            .collect();
        let mut path = Self::from_commands(commands, self.fill_rule);
        path.volatile = self.volatile;
        path
    }
}

/// Builder for constructing paths
pub struct PathBuilder {
    commands: SmallVec<[PathCommand; 16]>,
    fill_rule: FillRule,
    volatile: bool,
}

impl PathBuilder {
    pub fn new() -> Self {
        Self {
            commands: SmallVec::new(),
            fill_rule: FillRule::default(),
            volatile: false,
        }
    }

    pub fn move_to(mut self, x: f32, y: f32) -> Self {
        self.commands.push(PathCommand::MoveTo(Point::new(x, y)));
        self
    }

    pub fn line_to(mut self, x: f32, y: f32) -> Self {
        self.commands.push(PathCommand::LineTo(Point::new(x, y)));
        self
    }

    pub fn quad_to(mut self, cx: f32, cy: f32, x: f32, y: f32) -> Self {
        self.commands.push(PathCommand::QuadTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
        });
        self
    }

    pub fn conic_to(mut self, cx: f32, cy: f32, x: f32, y: f32, weight: f32) -> Self {
        self.commands.push(PathCommand::ConicTo {
            control: Point::new(cx, cy),
            end: Point::new(x, y),
            weight,
        });
        self
    }

    pub fn cubic_to(mut self, c1x: f32, c1y: f32, c2x: f32, c2y: f32, x: f32, y: f32) -> Self {
        self.commands.push(PathCommand::CubicTo {
            control1: Point::new(c1x, c1y),
            control2: Point::new(c2x, c2y),
            end: Point::new(x, y),
        });
        self
    }

    pub fn close(mut self) -> Self {
        self.commands.push(PathCommand::Close);
        self
    }

    pub fn fill_rule(mut self, fill_rule: FillRule) -> Self {
        self.fill_rule = fill_rule;
        self
    }

    pub fn volatile(mut self, volatile: bool) -> Self {
        self.volatile = volatile;
        self
    }

    pub fn build(self) -> Path {
        let mut path = Path::from_commands(self.commands, self.fill_rule);
        path.volatile = self.volatile;
        path
    }
}

impl Default for PathBuilder {
    fn default() -> Self {
        Self::new()
    }
}
