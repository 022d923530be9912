//! Geometry utilities.
//!
//! Rectangles and the affine transforms used to move them between the
//! sensor frame, the detector's crop frame and the display canvas.

mod rect;
mod transform;

pub use rect::Rect;
pub use transform::{frame_to_canvas, transformation_matrix, AffineTransform};
