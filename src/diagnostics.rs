//! Read-only projections of the tracker for rendering and debugging.
//!
//! Everything here is a point-in-time copy; holding a snapshot never blocks
//! or races with the tracker.

use serde::Serialize;

use crate::geometry::{AffineTransform, Rect};
use crate::motion::{EngineDiagnostics, KeypointChange, ObjectHandle};
use crate::palette::Color;
use crate::Detection;

/// Render-ready copy of one tracked object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedSnapshot {
    pub id: u64,
    #[serde(skip)]
    pub handle: Option<ObjectHandle>,
    pub color: Color,
    pub label: Option<String>,
    pub confidence: f32,
    pub position: Rect,
    /// Current motion correlation; `None` in detection-only mode.
    pub correlation: Option<f32>,
}

impl TrackedSnapshot {
    /// Overlay caption, e.g. `"person 87.50%"`.
    pub fn caption(&self) -> String {
        let percent = 100.0 * self.confidence;
        match &self.label {
            Some(label) if !label.is_empty() => format!("{} {:.2}%", label, percent),
            _ => format!("{:.2}%", percent),
        }
    }

    /// Copy with the position mapped through `transform`.
    pub fn mapped(&self, transform: &AffineTransform) -> Self {
        Self {
            position: transform.map_rect(&self.position),
            ..self.clone()
        }
    }
}

/// Debug overlay data: raw detections next to tracker and engine state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugView {
    /// The latest detection batch exactly as it was received.
    pub raw_detections: Vec<Detection>,
    /// `(object id, correlation)` for every motion-tracked object.
    pub correlations: Vec<(u64, f32)>,
    pub debug_text: Vec<String>,
    /// Keypoint motion in frame coordinates.
    pub keypoints: Vec<KeypointChange>,
}

impl DebugView {
    pub(crate) fn new(
        raw_detections: Vec<Detection>,
        correlations: Vec<(u64, f32)>,
        diagnostics: Option<EngineDiagnostics>,
    ) -> Self {
        let mut debug_text = Vec::new();
        let keypoints = match diagnostics {
            Some(d) => {
                debug_text.push(format!("Num keypoints {}", d.keypoints.len()));
                if let Some((min, max)) = d.score_range() {
                    debug_text.push(format!("Min score: {:.2}", min));
                    debug_text.push(format!("Max score: {:.2}", max));
                }
                d.keypoints
            }
            None => Vec::new(),
        };
        Self {
            raw_detections,
            correlations,
            debug_text,
            keypoints,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::DEFAULT_PALETTE;

    fn snapshot(label: Option<&str>) -> TrackedSnapshot {
        TrackedSnapshot {
            id: 1,
            handle: None,
            color: DEFAULT_PALETTE[0],
            label: label.map(str::to_string),
            confidence: 0.875,
            position: Rect::new(0.0, 0.0, 10.0, 10.0),
            correlation: None,
        }
    }

    #[test]
    fn test_caption_with_label() {
        assert_eq!(snapshot(Some("person")).caption(), "person 87.50%");
    }

    #[test]
    fn test_caption_without_label() {
        assert_eq!(snapshot(None).caption(), "87.50%");
        assert_eq!(snapshot(Some("")).caption(), "87.50%");
    }

    #[test]
    fn test_debug_text_from_diagnostics() {
        let diagnostics = EngineDiagnostics {
            keypoints: vec![
                KeypointChange { from: (0.0, 0.0), to: (1.0, 1.0), score: 0.25, found: true },
                KeypointChange { from: (2.0, 2.0), to: (2.0, 3.0), score: 0.75, found: false },
            ],
        };
        let view = DebugView::new(Vec::new(), Vec::new(), Some(diagnostics));
        assert_eq!(
            view.debug_text,
            vec!["Num keypoints 2", "Min score: 0.25", "Max score: 0.75"]
        );
        assert_eq!(view.keypoints.len(), 2);
    }

    #[test]
    fn test_debug_view_without_engine() {
        let view = DebugView::new(Vec::new(), Vec::new(), None);
        assert!(view.debug_text.is_empty());
        assert!(view.keypoints.is_empty());
    }
}
