//! Detector output handed to the tracker.

use serde::{Deserialize, Serialize};

use crate::geometry::{AffineTransform, Rect};
use crate::{Error, Result};

/// A single detector result: a rectangle, its confidence and an optional
/// class label.
///
/// Detections are immutable inputs; the tracker copies what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,

    /// Location in the coordinate frame the detection was produced in.
    pub location: Rect,

    /// Optional class label.
    #[serde(default)]
    pub label: Option<String>,
}

impl Detection {
    /// Create a detection, validating the confidence and rectangle.
    pub fn new(confidence: f32, location: Rect) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::InvalidDetection(format!(
                "confidence {} outside [0, 1]",
                confidence
            )));
        }
        if !location.is_valid() {
            return Err(Error::InvalidDetection(format!(
                "malformed location {}",
                location
            )));
        }
        Ok(Self {
            confidence,
            location,
            label: None,
        })
    }

    /// Create a labelled detection.
    pub fn with_label(confidence: f32, location: Rect, label: impl Into<String>) -> Result<Self> {
        let mut detection = Self::new(confidence, location)?;
        detection.label = Some(label.into());
        Ok(detection)
    }

    /// Copy of this detection with its location mapped through `transform`
    /// (for instance from detector-crop to sensor-frame coordinates).
    pub fn mapped(&self, transform: &AffineTransform) -> Detection {
        Detection {
            confidence: self.confidence,
            location: transform.map_rect(&self.location),
            label: self.label.clone(),
        }
    }
}
