//! Cropping of oversized paths
//!
//! Paths whose device bounds exceed [`PATH_CROP_THRESHOLD`] are intersected
//! with their clip before anything else touches them, so the coverage math
//! stays within float precision. The boolean operation itself is a
//! collaborator ([`PathOps`]); [`RectClipOps`] is the built-in implementation,
//! which flattens curves with lyon and clips the resulting polygons against an
//! axis-aligned rectangle.

use covpath_paint::{IRect, Path, PathBuilder, PathCommand, Point, Rect};
use lyon::math::point;
use lyon::path::iterator::PathIterator;
use lyon::path::PathEvent;

/// Device-space extent above which a path is cropped to its clip
pub const PATH_CROP_THRESHOLD: f32 = (1 << 16) as f32;

/// Boolean path operations
pub trait PathOps {
    /// Intersection of two filled paths, or `None` if the operation fails.
    fn intersect(&self, a: &Path, b: &Path) -> Option<Path>;
}

/// Crop `path` to `crop_box`. A failed intersection yields an empty path.
pub fn crop_path(path: &Path, crop_box: &IRect, ops: &dyn PathOps) -> Path {
    let crop = Path::rect(Rect::from(*crop_box));
    match ops.intersect(&crop, path) {
        Some(cropped) => cropped.with_volatile(true),
        None => {
            tracing::debug!("path crop failed; drawing nothing for it");
            Path::new()
                .with_fill_rule(path.fill_rule())
                .with_volatile(true)
        }
    }
}

/// Intersection with an axis-aligned rectangle
///
/// One operand must be a rectangle (as built by [`Path::rect`]); anything
/// else fails. Curves are flattened, so the result contains only lines.
#[derive(Clone, Copy, Debug)]
pub struct RectClipOps {
    /// Maximum distance between a curve and its flattened polyline
    pub tolerance: f32,
}

impl Default for RectClipOps {
    fn default() -> Self {
        Self { tolerance: 0.25 }
    }
}

impl PathOps for RectClipOps {
    fn intersect(&self, a: &Path, b: &Path) -> Option<Path> {
        let (rect, subject) = match (axis_aligned_rect(a), axis_aligned_rect(b)) {
            (Some(rect), _) => (rect, b),
            (None, Some(rect)) => (rect, a),
            (None, None) => return None,
        };
        if !subject.is_finite() || !rect.is_finite() {
            return None;
        }
        if subject.is_empty() || rect.is_empty() {
            return Some(Path::new().with_fill_rule(subject.fill_rule()));
        }
        if rect.contains_rect(&subject.bounds()) {
            return Some(subject.clone());
        }

        let mut builder = PathBuilder::new().fill_rule(subject.fill_rule());
        for polygon in flatten(subject, self.tolerance) {
            let clipped = clip_polygon(&polygon, &rect);
            if clipped.len() < 3 {
                continue;
            }
            builder = builder.move_to(clipped[0].x, clipped[0].y);
            for p in &clipped[1..] {
                builder = builder.line_to(p.x, p.y);
            }
            builder = builder.close();
        }
        Some(builder.build())
    }
}

/// The rectangle a path traces, if it is a single closed axis-aligned rect.
fn axis_aligned_rect(path: &Path) -> Option<Rect> {
    let mut points: Vec<Point> = Vec::with_capacity(5);
    for (i, cmd) in path.commands().iter().enumerate() {
        match (i, cmd) {
            (0, PathCommand::MoveTo(p)) => points.push(*p),
            (i, PathCommand::LineTo(p)) if i > 0 => points.push(*p),
            (_, PathCommand::Close) if i + 1 == path.commands().len() => {}
            _ => return None,
        }
    }
    if points.len() == 5 && points[0] == points[4] {
        points.pop();
    }
    if points.len() != 4 {
        return None;
    }

    let bounds = path.bounds();
    let on_corner = |p: &Point| {
        (p.x == bounds.left() || p.x == bounds.right())
            && (p.y == bounds.top() || p.y == bounds.bottom())
    };
    let axis_aligned = (0..4).all(|i| {
        let (p, q) = (points[i], points[(i + 1) % 4]);
        (p.x == q.x) != (p.y == q.y)
    });
    (points.iter().all(on_corner) && axis_aligned).then_some(bounds)
}

fn path_to_lyon_events(path: &Path) -> Vec<PathEvent> {
    let mut events = Vec::new();
    let mut first: Option<Point> = None;
    let mut start = Point::ZERO;
    let mut current = Point::ZERO;

    // Segments with no open contour restart at the last move point.
    let begin = |events: &mut Vec<PathEvent>, first: &mut Option<Point>, start: Point| {
        if first.is_none() {
            events.push(PathEvent::Begin {
                at: point(start.x, start.y),
            });
            *first = Some(start);
        }
    };

    for cmd in path.commands() {
        match *cmd {
            PathCommand::MoveTo(p) => {
                if let Some(f) = first.take() {
                    events.push(PathEvent::End {
                        last: point(current.x, current.y),
                        first: point(f.x, f.y),
                        close: false,
                    });
                }
                events.push(PathEvent::Begin { at: point(p.x, p.y) });
                first = Some(p);
                start = p;
                current = p;
            }
            PathCommand::LineTo(p) => {
                begin(&mut events, &mut first, start);
                events.push(PathEvent::Line {
                    from: point(current.x, current.y),
                    to: point(p.x, p.y),
                });
                current = p;
            }
            // Conics are approximated by their control polygon's quadratic.
            PathCommand::QuadTo { control, end } | PathCommand::ConicTo { control, end, .. } => {
                begin(&mut events, &mut first, start);
                events.push(PathEvent::Quadratic {
                    from: point(current.x, current.y),
                    ctrl: point(control.x, control.y),
                    to: point(end.x, end.y),
                });
                current = end;
            }
            PathCommand::CubicTo {
                control1,
                control2,
                end,
            } => {
                begin(&mut events, &mut first, start);
                events.push(PathEvent::Cubic {
                    from: point(current.x, current.y),
                    ctrl1: point(control1.x, control1.y),
                    ctrl2: point(control2.x, control2.y),
                    to: point(end.x, end.y),
                });
                current = end;
            }
            PathCommand::Close => {
                if let Some(f) = first.take() {
                    events.push(PathEvent::End {
                        last: point(current.x, current.y),
                        first: point(f.x, f.y),
                        close: true,
                    });
                    current = f;
                }
            }
        }
    }

    if let Some(f) = first {
        events.push(PathEvent::End {
            last: point(current.x, current.y),
            first: point(f.x, f.y),
            close: false,
        });
    }

    events
}

/// Flatten every contour into an implicitly closed polygon.
fn flatten(path: &Path, tolerance: f32) -> Vec<Vec<Point>> {
    let mut polygons = Vec::new();
    let mut current: Vec<Point> = Vec::new();
    for event in path_to_lyon_events(path).into_iter().flattened(tolerance) {
        match event {
            PathEvent::Begin { at } => {
                current.clear();
                current.push(Point::new(at.x, at.y));
            }
            PathEvent::Line { to, .. } => current.push(Point::new(to.x, to.y)),
            PathEvent::End { .. } => {
                if current.len() >= 3 {
                    polygons.push(std::mem::take(&mut current));
                } else {
                    current.clear();
                }
            }
            // flattened() only yields lines
            PathEvent::Quadratic { .. } | PathEvent::Cubic { .. } => {}
        }
    }
    polygons
}

#[derive(Clone, Copy)]
enum Edge {
    Left(f32),
    Top(f32),
    Right(f32),
    Bottom(f32),
}

impl Edge {
    fn inside(self, p: Point) -> bool {
        match self {
            Edge::Left(x) => p.x >= x,
            Edge::Top(y) => p.y >= y,
            Edge::Right(x) => p.x <= x,
            Edge::Bottom(y) => p.y <= y,
        }
    }

    fn intersection(self, a: Point, b: Point) -> Point {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + (b.y - a.y) * t)
            }
            Edge::Top(y) | Edge::Bottom(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + (b.x - a.x) * t, y)
            }
        }
    }
}

/// Sutherland-Hodgman clip of a closed polygon against `rect`
fn clip_polygon(polygon: &[Point], rect: &Rect) -> Vec<Point> {
    let edges = [
        Edge::Left(rect.left()),
        Edge::Top(rect.top()),
        Edge::Right(rect.right()),
        Edge::Bottom(rect.bottom()),
    ];
    let mut output = polygon.to_vec();
    for edge in edges {
        let Some(&last) = output.last() else {
            break;
        };
        let input = std::mem::take(&mut output);
        let mut prev = last;
        for &p in &input {
            match (edge.inside(prev), edge.inside(p)) {
                (true, true) => output.push(p),
                (true, false) => output.push(edge.intersection(prev, p)),
                (false, true) => {
                    output.push(edge.intersection(prev, p));
                    output.push(p);
                }
                (false, false) => {}
            }
            prev = p;
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polygon_path() -> Path {
        PathBuilder::new()
            .move_to(10.0, 10.0)
            .line_to(90.0, 20.0)
            .line_to(60.0, 80.0)
            .line_to(20.0, 70.0)
            .close()
            .build()
    }

    #[test]
    fn test_rect_detection() {
        let r = Rect::from_ltrb(1.0, 2.0, 30.0, 40.0);
        assert_eq!(axis_aligned_rect(&Path::rect(r)), Some(r));
        assert_eq!(axis_aligned_rect(&polygon_path()), None);
        let diamond = PathBuilder::new()
            .move_to(5.0, 0.0)
            .line_to(10.0, 5.0)
            .line_to(5.0, 10.0)
            .line_to(0.0, 5.0)
            .close()
            .build();
        assert_eq!(axis_aligned_rect(&diamond), None);
    }

    #[test]
    fn test_crop_contained_path_keeps_bounds() {
        let path = polygon_path();
        let cropped = crop_path(&path, &IRect::from_wh(100, 100), &RectClipOps::default());
        assert_eq!(cropped.bounds(), path.bounds());
        assert!(cropped.is_volatile());
    }

    #[test]
    fn test_crop_clips_to_box() {
        let path = polygon_path();
        let cropped = crop_path(&path, &IRect::new(0, 0, 50, 50), &RectClipOps::default());
        let bounds = cropped.bounds();
        assert!(!cropped.is_empty());
        assert!(Rect::from_ltrb(0.0, 0.0, 50.0, 50.0).contains_rect(&bounds));
        assert_eq!(bounds.right(), 50.0);
        assert_eq!(bounds.bottom(), 50.0);
    }

    #[test]
    fn test_crop_curves_are_flattened() {
        let path = PathBuilder::new()
            .move_to(-100.0, 50.0)
            .cubic_to(-100.0, -200.0, 300.0, -200.0, 300.0, 50.0)
            .close()
            .build();
        let cropped = crop_path(&path, &IRect::new(0, 0, 100, 100), &RectClipOps::default());
        assert!(!cropped.is_empty());
        assert!(cropped
            .commands()
            .iter()
            .all(|c| matches!(c, PathCommand::MoveTo(_) | PathCommand::LineTo(_) | PathCommand::Close)));
        assert!(Rect::from_ltrb(0.0, 0.0, 100.0, 100.0).contains_rect(&cropped.bounds()));
    }

    #[test]
    fn test_crop_disjoint_is_empty() {
        let cropped = crop_path(
            &polygon_path(),
            &IRect::new(500, 500, 600, 600),
            &RectClipOps::default(),
        );
        assert!(cropped.is_empty());
    }

    #[test]
    fn test_crop_non_finite_becomes_empty() {
        let path = PathBuilder::new()
            .move_to(0.0, 0.0)
            .line_to(f32::NAN, 10.0)
            .line_to(10.0, f32::INFINITY)
            .close()
            .fill_rule(covpath_paint::FillRule::EvenOdd)
            .build();
        let cropped = crop_path(&path, &IRect::from_wh(100, 100), &RectClipOps::default());
        assert!(cropped.is_empty());
        assert_eq!(cropped.fill_rule(), covpath_paint::FillRule::EvenOdd);
    }

    #[test]
    fn test_two_general_paths_fail() {
        let ops = RectClipOps::default();
        assert!(ops.intersect(&polygon_path(), &polygon_path()).is_none());
    }
}
