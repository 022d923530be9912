//! Luminance frames handed to the tracker and the motion engine.

use std::sync::Arc;

use crate::{Error, Result};

/// Fixed frame layout declared when a motion engine is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub row_stride: usize,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize, row_stride: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "frame must have a non-zero size, got {}x{}",
                width, height
            )));
        }
        if row_stride < width {
            return Err(Error::InvalidFrame(format!(
                "row stride {} is smaller than width {}",
                row_stride, width
            )));
        }
        Ok(Self {
            width,
            height,
            row_stride,
        })
    }

    /// Geometry after box-downsampling by `factor`. Partial blocks at the
    /// right and bottom edges are kept.
    pub fn downsampled(&self, factor: usize) -> FrameGeometry {
        let width = self.width.div_ceil(factor);
        let height = self.height.div_ceil(factor);
        FrameGeometry {
            width,
            height,
            row_stride: width,
        }
    }

    /// Minimum buffer length for a frame with this layout.
    pub fn buffer_len(&self) -> usize {
        self.row_stride * (self.height - 1) + self.width
    }
}

/// A single luminance (Y plane) frame.
///
/// The pixel buffer is shared so a frame can be handed to the detector
/// worker and the tracker at the same time without copying.
///
/// Fields are private so every frame goes through [`Frame::new`] or
/// [`Frame::blank`] and its buffer always covers its layout.
#[derive(Debug, Clone)]
pub struct Frame {
    timestamp: u64,
    geometry: FrameGeometry,
    sensor_orientation: i32,
    luminance: Arc<[u8]>,
}

impl Frame {
    pub fn new(
        timestamp: u64,
        width: usize,
        height: usize,
        row_stride: usize,
        luminance: impl Into<Arc<[u8]>>,
    ) -> Result<Self> {
        let geometry = FrameGeometry::new(width, height, row_stride)?;
        let luminance = luminance.into();
        if luminance.len() < geometry.buffer_len() {
            return Err(Error::InvalidFrame(format!(
                "luminance buffer holds {} bytes, layout {}x{} (stride {}) needs {}",
                luminance.len(),
                width,
                height,
                row_stride,
                geometry.buffer_len()
            )));
        }
        Ok(Self {
            timestamp,
            geometry,
            sensor_orientation: 0,
            luminance,
        })
    }

    pub fn with_orientation(mut self, sensor_orientation: i32) -> Self {
        self.sensor_orientation = sensor_orientation;
        self
    }

    /// Uniform grey frame, mostly useful for tests and benches.
    pub fn blank(timestamp: u64, width: usize, height: usize) -> Self {
        Self {
            timestamp,
            geometry: FrameGeometry {
                width,
                height,
                row_stride: width,
            },
            sensor_orientation: 0,
            luminance: vec![128u8; width * height].into(),
        }
    }

    /// Same pixels under a new timestamp.
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Monotonic frame timestamp.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Sensor rotation relative to the display, in degrees.
    #[inline]
    pub fn sensor_orientation(&self) -> i32 {
        self.sensor_orientation
    }

    #[inline]
    pub fn luminance(&self) -> &[u8] {
        &self.luminance
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.geometry.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.geometry.height
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.luminance[y * self.geometry.row_stride + x]
    }
}

/// Box-downsample a strided luminance plane into `output`.
///
/// `output` must hold `ceil(width / factor) * ceil(height / factor)` bytes
/// and is written densely (stride equal to the downsampled width).
pub fn downsample_luminance(
    geometry: &FrameGeometry,
    input: &[u8],
    factor: usize,
    output: &mut [u8],
) {
    let out = geometry.downsampled(factor);
    debug_assert!(output.len() >= out.width * out.height);

    for oy in 0..out.height {
        let y0 = oy * factor;
        let y1 = (y0 + factor).min(geometry.height);
        for ox in 0..out.width {
            let x0 = ox * factor;
            let x1 = (x0 + factor).min(geometry.width);

            let mut sum = 0u32;
            for y in y0..y1 {
                let row = &input[y * geometry.row_stride..];
                for &v in &row[x0..x1] {
                    sum += v as u32;
                }
            }
            let count = ((y1 - y0) * (x1 - x0)) as u32;
            output[oy * out.width + ox] = (sum / count) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_timestamp_keeps_pixels() {
        let frame = Frame::new(1, 2, 2, 2, vec![1u8, 2, 3, 4]).unwrap().with_orientation(90);
        let next = frame.clone().with_timestamp(7);
        assert_eq!(next.timestamp(), 7);
        assert_eq!(next.geometry(), frame.geometry());
        assert_eq!(next.sensor_orientation(), 90);
        assert_eq!(next.luminance(), &[1, 2, 3, 4]);
        assert_eq!(next.pixel(1, 1), 4);
    }

    #[test]
    fn test_frame_rejects_short_buffer() {
        let result = Frame::new(1, 4, 4, 4, vec![0u8; 10]);
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_rejects_small_stride() {
        assert!(Frame::new(1, 4, 4, 3, vec![0u8; 16]).is_err());
    }

    #[test]
    fn test_frame_accepts_padded_stride() {
        // Last row does not need trailing padding.
        let frame = Frame::new(1, 3, 2, 4, vec![0u8; 7]).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.geometry.row_stride, 4);
    }

    #[test]
    fn test_downsample_averages_blocks() {
        let geometry = FrameGeometry::new(4, 2, 4).unwrap();
        let input = [0u8, 2, 10, 20, 4, 6, 30, 40];
        let mut output = [0u8; 2];
        downsample_luminance(&geometry, &input, 2, &mut output);
        assert_eq!(output, [3, 25]);
    }

    #[test]
    fn test_downsample_keeps_partial_edge_blocks() {
        let geometry = FrameGeometry::new(3, 3, 3).unwrap();
        let input = [10u8; 9];
        let out = geometry.downsampled(2);
        assert_eq!((out.width, out.height), (2, 2));
        let mut output = vec![0u8; 4];
        downsample_luminance(&geometry, &input, 2, &mut output);
        assert_eq!(output, vec![10, 10, 10, 10]);
    }

    #[test]
    fn test_downsample_respects_stride() {
        let geometry = FrameGeometry::new(2, 2, 3).unwrap();
        // Padding bytes (255) must be ignored.
        let input = [8u8, 8, 255, 8, 8, 255];
        let mut output = [0u8; 1];
        downsample_luminance(&geometry, &input, 2, &mut output);
        assert_eq!(output, [8]);
    }
}
