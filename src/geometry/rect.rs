//! Axis-aligned rectangles and overlap metrics.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel coordinates.
///
/// Stored as edges (`left`, `top`, `right`, `bottom`) with `right >= left`
/// and `bottom >= top` for well-formed rectangles. Inverted rectangles are
/// allowed to exist but report zero area.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    /// Create a rectangle from its edges.
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from its top-left corner and size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Area of the rectangle, zero when inverted.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) * 0.5,
            (self.top + self.bottom) * 0.5,
        )
    }

    /// True when both coordinates are finite and both sides are non-negative.
    pub fn is_valid(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
            && self.width() >= 0.0
            && self.height() >= 0.0
    }

    /// True when either side is shorter than `min_size`.
    pub fn is_degenerate(&self, min_size: f32) -> bool {
        !(self.width() >= min_size && self.height() >= min_size)
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    ///
    /// Rectangles that only touch along an edge do not intersect.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        if left < right && top < bottom {
            Some(Rect::new(left, top, right, bottom))
        } else {
            None
        }
    }

    /// Area covered by either rectangle.
    pub fn union_area(&self, other: &Rect) -> f32 {
        let inter = self.intersection(other).map(|r| r.area()).unwrap_or(0.0);
        self.area() + other.area() - inter
    }

    /// Intersection-over-union. Zero when the rectangles are disjoint or the
    /// union is empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let inter = match self.intersection(other) {
            Some(r) => r.area(),
            None => return 0.0,
        };
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Scale every edge by `factor` (used for downsampled engine space).
    pub fn scale(&self, factor: f32) -> Rect {
        Rect::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }

    /// Translate the rectangle by `(dx, dy)`.
    pub fn offset(&self, dx: f32, dy: f32) -> Rect {
        Rect::new(self.left + dx, self.top + dy, self.right + dx, self.bottom + dy)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rect({:.1}, {:.1}, {:.1}, {:.1})",
            self.left, self.top, self.right, self.bottom
        )
    }
}
