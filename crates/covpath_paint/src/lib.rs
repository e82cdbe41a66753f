//! covpath geometry
//!
//! Leaf crate shared by the coverage-counting path renderer:
//!
//! - Paths built from move/line/quad/conic/cubic commands, each carrying a
//!   stable [`PathId`] used as its identity by the clip-path cache
//! - Affine transforms (with an optional perspective row that the renderer rejects)
//! - Float and integer bounds with the round-out / intersect / union operations
//!   the atlas packer relies on

pub mod color;
pub mod path;
pub mod primitives;
pub mod transform;

pub use color::Color;
pub use path::{FillRule, Path, PathBuilder, PathCommand, PathId, Point};
pub use primitives::{IRect, Rect};
pub use transform::Transform2D;
