//! Coverage ops builder
//!
//! Collects the device-space outlines of every path placed in an atlas during
//! a flush. Each atlas page gets one [`CoverageOp`]: the list of outlines the
//! caller must accumulate into the page's texture before any path draw samples
//! from it. Outline points are stored already translated into atlas space and
//! are uploaded into a single coverage-geometry buffer shared by all ops.

use std::ops::Range;

use covpath_paint::{IRect, Path, PathCommand, Point, Rect, Transform2D};

use crate::backend::{BufferKind, FlushResourceProvider, GpuBackend};

/// Whether a placed path's shading must be bounds-checked against its clip
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScissorMode {
    /// The clip fully contains the path
    NonScissored,
    /// The path crosses its clip; coverage is limited to `atlas_bounds`
    Scissored,
}

/// Outline verbs in atlas space. Conics are emitted as quadratics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoverageVerb {
    /// Consumes one point
    BeginContour,
    /// Consumes one point
    LineTo,
    /// Consumes two points
    QuadTo,
    /// Consumes three points
    CubicTo,
    EndContour,
}

impl CoverageVerb {
    pub fn point_count(self) -> usize {
        match self {
            CoverageVerb::BeginContour | CoverageVerb::LineTo => 1,
            CoverageVerb::QuadTo => 2,
            CoverageVerb::CubicTo => 3,
            CoverageVerb::EndContour => 0,
        }
    }
}

/// One path's outline inside a coverage op
#[derive(Clone, Debug, PartialEq)]
pub struct CoverageOutline {
    pub scissor_mode: ScissorMode,
    /// Clipped device bounds moved into atlas space
    pub atlas_bounds: IRect,
    /// First point in the shared coverage-geometry buffer
    pub first_point: u32,
    pub point_count: u32,
    /// Range into [`CoverageOp::verbs`]
    pub verbs: Range<usize>,
}

/// Everything needed to render one atlas page's coverage
#[derive(Debug)]
pub struct CoverageOp<B: GpuBackend> {
    /// Atlas-space points of every outline of the flush
    pub geometry: B::Buffer,
    /// Region of the page that was written to
    pub draw_bounds: IRect,
    pub outlines: Vec<CoverageOutline>,
    pub verbs: Vec<CoverageVerb>,
}

#[derive(Clone, Debug)]
struct SavedOutline {
    scissor_mode: ScissorMode,
    atlas_bounds: IRect,
    points: Range<usize>,
    verbs: Range<usize>,
}

#[derive(Clone, Debug)]
struct PendingOp {
    outlines: Range<usize>,
    draw_bounds: IRect,
}

pub(crate) struct CoverageOpsBuilder {
    // Scratch for the path parsed last
    parsed_points: Vec<Point>,
    parsed_verbs: Vec<CoverageVerb>,
    parse_pending: bool,

    points: Vec<Point>,
    verbs: Vec<CoverageVerb>,
    outlines: Vec<SavedOutline>,
    ops: Vec<PendingOp>,
    op_start: usize,
}

impl CoverageOpsBuilder {
    /// Size scratch and saved storage from the flush tallies.
    pub fn new(
        max_total_paths: usize,
        max_path_points: usize,
        num_points: usize,
        num_verbs: usize,
    ) -> Self {
        Self {
            parsed_points: Vec::with_capacity(max_path_points),
            parsed_verbs: Vec::with_capacity(max_path_points + 1),
            parse_pending: false,
            points: Vec::with_capacity(num_points),
            verbs: Vec::with_capacity(num_verbs + max_total_paths),
            outlines: Vec::with_capacity(max_total_paths),
            ops: Vec::new(),
            op_start: 0,
        }
    }

    /// Map `path` into device space and keep its outline for a following
    /// [`save_parsed_path`](Self::save_parsed_path). Returns the device bounds
    /// and the 45-degree bounds.
    pub fn parse_path(&mut self, transform: &Transform2D, path: &Path) -> (Rect, Rect) {
        assert!(
            !self.parse_pending,
            "previous parsed path was neither saved nor discarded"
        );
        self.parse_pending = true;
        self.parsed_points.clear();
        self.parsed_verbs.clear();

        let mut open = false;
        let mut contour_start = transform.map_point(Point::ZERO);
        for cmd in path.commands() {
            match *cmd {
                PathCommand::MoveTo(p) => {
                    if open {
                        self.parsed_verbs.push(CoverageVerb::EndContour);
                    }
                    open = true;
                    contour_start = transform.map_point(p);
                    self.parsed_verbs.push(CoverageVerb::BeginContour);
                    self.parsed_points.push(contour_start);
                }
                PathCommand::LineTo(p) => {
                    open = self.begin_implicit_contour(open, contour_start);
                    self.parsed_verbs.push(CoverageVerb::LineTo);
                    self.parsed_points.push(transform.map_point(p));
                }
                PathCommand::QuadTo { control, end }
                | PathCommand::ConicTo { control, end, .. } => {
                    open = self.begin_implicit_contour(open, contour_start);
                    self.parsed_verbs.push(CoverageVerb::QuadTo);
                    self.parsed_points.push(transform.map_point(control));
                    self.parsed_points.push(transform.map_point(end));
                }
                PathCommand::CubicTo {
                    control1,
                    control2,
                    end,
                } => {
                    open = self.begin_implicit_contour(open, contour_start);
                    self.parsed_verbs.push(CoverageVerb::CubicTo);
                    self.parsed_points.push(transform.map_point(control1));
                    self.parsed_points.push(transform.map_point(control2));
                    self.parsed_points.push(transform.map_point(end));
                }
                PathCommand::Close => {
                    if open {
                        self.parsed_verbs.push(CoverageVerb::EndContour);
                        open = false;
                    }
                }
            }
        }
        if open {
            self.parsed_verbs.push(CoverageVerb::EndContour);
        }

        device_bounds(&self.parsed_points)
    }

    /// Same as [`parse_path`](Self::parse_path) for a path already in device space.
    pub fn parse_device_space_path(&mut self, path: &Path) -> (Rect, Rect) {
        self.parse_path(&Transform2D::identity(), path)
    }

    // A segment with no open contour restarts at the last move point.
    fn begin_implicit_contour(&mut self, open: bool, start: Point) -> bool {
        if !open {
            self.parsed_verbs.push(CoverageVerb::BeginContour);
            self.parsed_points.push(start);
        }
        true
    }

    /// Commit the parsed outline into the current page's pending op.
    pub fn save_parsed_path(&mut self, scissor_mode: ScissorMode, clipped: &IRect, offset: [i16; 2]) {
        assert!(self.parse_pending, "no parsed path to save");
        self.parse_pending = false;

        let (dx, dy) = (i32::from(offset[0]), i32::from(offset[1]));
        let (fx, fy) = (f32::from(offset[0]), f32::from(offset[1]));
        let point_start = self.points.len();
        self.points.extend(
            self.parsed_points
                .iter()
                .map(|p| Point::new(p.x + fx, p.y + fy)),
        );
        let verb_start = self.verbs.len();
        self.verbs.extend_from_slice(&self.parsed_verbs);

        self.outlines.push(SavedOutline {
            scissor_mode,
            atlas_bounds: IRect::new(
                clipped.left + dx,
                clipped.top + dy,
                clipped.right + dx,
                clipped.bottom + dy,
            ),
            points: point_start..self.points.len(),
            verbs: verb_start..self.verbs.len(),
        });
    }

    pub fn discard_parsed_path(&mut self) {
        assert!(self.parse_pending, "no parsed path to discard");
        self.parse_pending = false;
    }

    /// Close the pending op of the page being sealed.
    pub fn emit_op(&mut self, draw_bounds: IRect) {
        self.ops.push(PendingOp {
            outlines: self.op_start..self.outlines.len(),
            draw_bounds,
        });
        self.op_start = self.outlines.len();
    }

    #[cfg(test)]
    pub fn emitted_ops(&self) -> usize {
        self.ops.len()
    }

    /// Upload every saved outline and hand back one op per emitted op.
    ///
    /// Returns `None` if the coverage-geometry buffer can't be allocated.
    pub fn finalize<B, P>(self, provider: &mut P) -> Option<Vec<CoverageOp<B>>>
    where
        B: GpuBackend,
        P: FlushResourceProvider<B> + ?Sized,
    {
        debug_assert!(!self.parse_pending);
        debug_assert_eq!(
            self.op_start,
            self.outlines.len(),
            "saved outlines after the last emitted op"
        );

        // Never ask for a zero-sized buffer, even if every op is empty.
        let bytes: &[u8] = bytemuck::cast_slice(&self.points);
        let size = (bytes.len() as u64).max(std::mem::size_of::<Point>() as u64);
        let geometry = provider.make_buffer(BufferKind::Coverage, size)?;
        if !bytes.is_empty() {
            provider.write_buffer(&geometry, 0, bytes);
        }

        let ops = self
            .ops
            .iter()
            .map(|op| {
                let saved = &self.outlines[op.outlines.clone()];
                let mut verbs = Vec::new();
                let outlines = saved
                    .iter()
                    .map(|s| {
                        let start = verbs.len();
                        verbs.extend_from_slice(&self.verbs[s.verbs.clone()]);
                        CoverageOutline {
                            scissor_mode: s.scissor_mode,
                            atlas_bounds: s.atlas_bounds,
                            first_point: s.points.start as u32,
                            point_count: s.points.len() as u32,
                            verbs: start..verbs.len(),
                        }
                    })
                    .collect();
                CoverageOp {
                    geometry: geometry.clone(),
                    draw_bounds: op.draw_bounds,
                    outlines,
                    verbs,
                }
            })
            .collect();
        Some(ops)
    }
}

/// Device bounds and 45-degree bounds of a point set
fn device_bounds(points: &[Point]) -> (Rect, Rect) {
    let Some(first) = points.first() else {
        return (Rect::EMPTY, Rect::EMPTY);
    };
    let (mut l, mut t, mut r, mut b) = (first.x, first.y, first.x, first.y);
    let (mut l45, mut t45) = (first.x + first.y, first.y - first.x);
    let (mut r45, mut b45) = (l45, t45);
    for p in &points[1..] {
        l = l.min(p.x);
        t = t.min(p.y);
        r = r.max(p.x);
        b = b.max(p.y);
        let (u, v) = (p.x + p.y, p.y - p.x);
        l45 = l45.min(u);
        t45 = t45.min(v);
        r45 = r45.max(u);
        b45 = b45.max(v);
    }
    (
        Rect::from_ltrb(l, t, r, b),
        Rect::from_ltrb(l45, t45, r45, b45),
    )
}
