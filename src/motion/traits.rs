//! Motion engine traits.

use crate::frame::FrameGeometry;
use crate::geometry::Rect;
use crate::Result;

/// Identifier the adapter uses when talking to an engine.
pub type EngineObjectId = u64;

/// Frame-to-frame motion correlation engine.
///
/// The engine only ever sees downsampled luminance frames and rectangles in
/// downsampled coordinates; the [`MotionAdapter`](super::MotionAdapter)
/// performs the scaling. Engines are driven from a single thread at a time.
pub trait MotionEngine: Send {
    /// Feed the next frame and update the motion state of every object.
    fn next_frame(&mut self, frame: &[u8], timestamp: u64);

    /// Register the appearance of a new object as seen in `frame`.
    fn register_object(&mut self, id: EngineObjectId, position: &Rect, frame: &[u8]);

    /// Tell the engine where the object was at `timestamp`.
    fn set_previous_position(&mut self, id: EngineObjectId, position: &Rect, timestamp: u64);

    /// Current position of the object.
    fn tracked_position(&self, id: EngineObjectId) -> Rect;

    /// Correlation of the object's appearance at its current position, in
    /// `[0, 1]`.
    fn correlation(&self, id: EngineObjectId) -> f32;

    /// Whether the object was found in the last frame.
    fn is_visible(&self, id: EngineObjectId) -> bool;

    /// Drop every resource held for the object.
    fn forget(&mut self, id: EngineObjectId);

    /// Optional internals for debug overlays.
    fn diagnostics(&self) -> Option<EngineDiagnostics> {
        None
    }
}

/// Creates engines for a fixed frame layout.
///
/// Creation may fail (for example when a native backend is missing); the
/// tracker then falls back to detection-only mode for the whole session.
pub trait MotionEngineFactory: Send {
    fn create(&self, geometry: FrameGeometry) -> Result<Box<dyn MotionEngine>>;
}

/// Motion of a single keypoint between the previous and the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeypointChange {
    pub from: (f32, f32),
    pub to: (f32, f32),
    pub score: f32,
    pub found: bool,
}

/// Engine internals exposed for visualisation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineDiagnostics {
    pub keypoints: Vec<KeypointChange>,
}

impl EngineDiagnostics {
    /// Minimum and maximum keypoint score, `None` without keypoints.
    pub fn score_range(&self) -> Option<(f32, f32)> {
        self.keypoints.iter().fold(None, |acc, k| match acc {
            None => Some((k.score, k.score)),
            Some((lo, hi)) => Some((lo.min(k.score), hi.max(k.score))),
        })
    }

    /// Scale every keypoint coordinate by `factor`.
    pub fn scaled(mut self, factor: f32) -> Self {
        for k in &mut self.keypoints {
            k.from = (k.from.0 * factor, k.from.1 * factor);
            k.to = (k.to.0 * factor, k.to.1 * factor);
        }
        self
    }
}
