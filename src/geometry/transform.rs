//! Affine transforms between sensor, crop and display coordinate frames.

use nalgebra::{Matrix3, Vector3};

use super::Rect;
use crate::{Error, Result};

/// 2D affine transform stored as a homogeneous 3x3 matrix.
///
/// Composition follows "post" semantics: `a.then(&b)` maps a point through
/// `a` first and `b` second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f32>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn translation(dx: f32, dy: f32) -> Self {
        Self {
            matrix: Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0),
        }
    }

    pub fn scaling(sx: f32, sy: f32) -> Self {
        Self {
            matrix: Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0),
        }
    }

    /// Clockwise rotation (y axis pointing down) by a multiple of 90 degrees.
    ///
    /// Quarter turns are built from exact sine/cosine values so that mapped
    /// rectangles do not pick up rounding noise.
    pub fn quarter_rotation(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(Error::TransformError(format!(
                "rotation must be a multiple of 90 degrees, got {}",
                degrees
            )));
        }
        let (cos, sin) = match degrees.rem_euclid(360) {
            0 => (1.0, 0.0),
            90 => (0.0, 1.0),
            180 => (-1.0, 0.0),
            _ => (0.0, -1.0),
        };
        Ok(Self {
            matrix: Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0),
        })
    }

    /// Apply `next` after `self`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            matrix: next.matrix * self.matrix,
        }
    }

    /// Inverse transform, failing for singular matrices.
    pub fn inverse(&self) -> Result<AffineTransform> {
        self.matrix
            .try_inverse()
            .map(|matrix| AffineTransform { matrix })
            .ok_or_else(|| Error::TransformError("transform is not invertible".to_string()))
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        (p.x, p.y)
    }

    /// Map a rectangle and return the axis-aligned bounds of its four mapped
    /// corners.
    pub fn map_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            self.map_point(rect.left, rect.top),
            self.map_point(rect.right, rect.top),
            self.map_point(rect.right, rect.bottom),
            self.map_point(rect.left, rect.bottom),
        ];

        let mut out = Rect::new(f32::MAX, f32::MAX, f32::MIN, f32::MIN);
        for (x, y) in corners {
            out.left = out.left.min(x);
            out.top = out.top.min(y);
            out.right = out.right.max(x);
            out.bottom = out.bottom.max(y);
        }
        out
    }

    pub fn matrix(&self) -> &Matrix3<f32> {
        &self.matrix
    }
}

/// Build the transform taking a `src_width` x `src_height` image into a
/// `dst_width` x `dst_height` one.
///
/// The source is optionally mirrored horizontally, then rotated clockwise by
/// `rotation` degrees about its centre, then scaled to fill the destination.
/// With `maintain_aspect` the larger of the two scale factors is used for
/// both axes, cropping whatever overflows.
pub fn transformation_matrix(
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
    rotation: i32,
    flip_horizontal: bool,
    maintain_aspect: bool,
) -> Result<AffineTransform> {
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(Error::TransformError(format!(
            "empty source or destination: {}x{} -> {}x{}",
            src_width, src_height, dst_width, dst_height
        )));
    }

    let recenter = rotation != 0 || flip_horizontal;
    let mut transform = AffineTransform::identity();

    if recenter {
        transform = transform.then(&AffineTransform::translation(
            -(src_width as f32) / 2.0,
            -(src_height as f32) / 2.0,
        ));
    }
    if flip_horizontal {
        transform = transform.then(&AffineTransform::scaling(-1.0, 1.0));
    }
    if rotation != 0 {
        transform = transform.then(&AffineTransform::quarter_rotation(rotation)?);
    }

    let transpose = (rotation.abs() + 90) % 180 == 0;
    let (in_width, in_height) = if transpose {
        (src_height, src_width)
    } else {
        (src_width, src_height)
    };

    if in_width != dst_width || in_height != dst_height {
        let scale_x = dst_width as f32 / in_width as f32;
        let scale_y = dst_height as f32 / in_height as f32;
        let scale = if maintain_aspect {
            let s = scale_x.max(scale_y);
            AffineTransform::scaling(s, s)
        } else {
            AffineTransform::scaling(scale_x, scale_y)
        };
        transform = transform.then(&scale);
    }

    if recenter {
        transform = transform.then(&AffineTransform::translation(
            dst_width as f32 / 2.0,
            dst_height as f32 / 2.0,
        ));
    }

    Ok(transform)
}

/// Transform fitting a sensor frame inside a display canvas.
///
/// Frames rotated by 90 or 270 degrees swap their width and height before
/// the fit multiplier is computed.
pub fn frame_to_canvas(
    frame_width: u32,
    frame_height: u32,
    canvas_width: u32,
    canvas_height: u32,
    sensor_orientation: i32,
) -> Result<AffineTransform> {
    let rotated = sensor_orientation.rem_euclid(180) == 90;
    let (fw, fh) = if rotated {
        (frame_height, frame_width)
    } else {
        (frame_width, frame_height)
    };
    if fw == 0 || fh == 0 {
        return Err(Error::TransformError("frame has no area".to_string()));
    }

    let multiplier =
        (canvas_height as f32 / fh as f32).min(canvas_width as f32 / fw as f32);
    let dst_width = (multiplier * fw as f32) as u32;
    let dst_height = (multiplier * fh as f32) as u32;

    transformation_matrix(
        frame_width,
        frame_height,
        dst_width,
        dst_height,
        sensor_orientation,
        false,
        false,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_rect_eq(a: Rect, b: Rect) {
        assert_relative_eq!(a.left, b.left, epsilon = 1e-3);
        assert_relative_eq!(a.top, b.top, epsilon = 1e-3);
        assert_relative_eq!(a.right, b.right, epsilon = 1e-3);
        assert_relative_eq!(a.bottom, b.bottom, epsilon = 1e-3);
    }

    #[test]
    fn test_identity_when_sizes_match() {
        let t = transformation_matrix(640, 480, 640, 480, 0, false, false).unwrap();
        let r = Rect::new(10.0, 20.0, 30.0, 40.0);
        assert_rect_eq(t.map_rect(&r), r);
    }

    #[test]
    fn test_plain_scaling() {
        let t = transformation_matrix(640, 480, 320, 240, 0, false, false).unwrap();
        let mapped = t.map_rect(&Rect::new(100.0, 100.0, 200.0, 200.0));
        assert_rect_eq(mapped, Rect::new(50.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn test_rotation_90_maps_top_left_to_top_right() {
        let t = transformation_matrix(640, 480, 480, 640, 90, false, false).unwrap();
        let (x, y) = t.map_point(0.0, 0.0);
        assert_relative_eq!(x, 480.0, epsilon = 1e-3);
        assert_relative_eq!(y, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_crop_round_trip_through_inverse() {
        let frame_to_crop = transformation_matrix(640, 480, 300, 300, 90, false, false).unwrap();
        let crop_to_frame = frame_to_crop.inverse().unwrap();
        let r = Rect::new(100.0, 50.0, 220.0, 170.0);
        let back = crop_to_frame.map_rect(&frame_to_crop.map_rect(&r));
        assert_rect_eq(back, r);
    }

    #[test]
    fn test_flip_mirrors_horizontally() {
        let t = transformation_matrix(100, 50, 100, 50, 0, true, false).unwrap();
        let mapped = t.map_rect(&Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_rect_eq(mapped, Rect::new(90.0, 0.0, 100.0, 10.0));
    }

    #[test]
    fn test_maintain_aspect_uses_larger_scale() {
        let t = transformation_matrix(200, 100, 100, 100, 0, false, true).unwrap();
        let (x, y) = t.map_point(200.0, 100.0);
        assert_relative_eq!(x, 200.0, epsilon = 1e-3);
        assert_relative_eq!(y, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn test_invalid_rotation_rejected() {
        assert!(transformation_matrix(10, 10, 10, 10, 45, false, false).is_err());
    }

    #[test]
    fn test_frame_to_canvas_rotated_fit() {
        // 640x480 frame rotated by 90 fits a 480x1000 canvas at multiplier 1.
        let t = frame_to_canvas(640, 480, 480, 1000, 90).unwrap();
        let mapped = t.map_rect(&Rect::new(0.0, 0.0, 640.0, 480.0));
        assert_rect_eq(mapped, Rect::new(0.0, 0.0, 480.0, 640.0));
    }
}
