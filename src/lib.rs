//! # Multibox - Multi-Object Visual Tracker
//!
//! Fuses sparse, slow detector output with dense frame-to-frame motion
//! correlation to keep stable object identities across frames.
//!
//! ## Features
//!
//! - Per-frame motion advance with correlation-based pruning
//! - Detection batch merge with overlap displacement and confidence eviction
//! - Bounded pool of display colours as object identities
//! - Pluggable motion engines (template matching, scripted fake)
//! - Threaded pipeline with a detector worker that never blocks the frame path
//!
//! ## Example
//!
//! ```rust,ignore
//! use multibox_rs::{Frame, Detection, Rect, Tracker, TrackerConfig};
//! use multibox_rs::motion::TemplateEngineFactory;
//!
//! let mut tracker = Tracker::new(TrackerConfig::default(), TemplateEngineFactory::default()).unwrap();
//!
//! // Every frame
//! let frame = Frame::new(0, 640, 480, 640, luminance).unwrap();
//! tracker.on_frame(&frame).unwrap();
//!
//! // Whenever the detector returns
//! let detections = vec![Detection::with_label(0.9, Rect::new(100.0, 80.0, 220.0, 240.0), "person").unwrap()];
//! let report = tracker.track_results(detections, &frame).unwrap();
//!
//! for object in tracker.snapshot() {
//!     println!("{} {}", object.caption(), object.position);
//! }
//! ```

// Public modules
pub mod detection;
pub mod diagnostics;
pub mod frame;
pub mod geometry;
pub mod motion;
pub mod palette;
pub mod pipeline;
pub mod registry;
pub mod tracked_object;
pub mod tracker;

// Re-exports for convenience
pub use detection::Detection;
pub use diagnostics::{DebugView, TrackedSnapshot};
pub use frame::{Frame, FrameGeometry};
pub use geometry::{AffineTransform, Rect};
pub use motion::{MotionAdapter, MotionEngine, MotionEngineFactory, ObjectHandle};
pub use palette::{Color, ColorPool, DEFAULT_PALETTE};
pub use pipeline::{Detector, PipelineConfig, PipelineStats, TrackingPipeline};
pub use registry::Registry;
pub use tracked_object::{Lifecycle, TrackedObject};
pub use tracker::{BatchReport, MergeOutcome, Tracker, TrackerConfig};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur in the multibox library
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Invalid detection: {0}")]
        InvalidDetection(String),

        #[error("Invalid frame: {0}")]
        InvalidFrame(String),

        #[error("Motion engine unavailable: {0}")]
        EngineUnavailable(String),

        #[error("A motion engine is already active in this process")]
        EngineAlreadyActive,

        #[error("Stale position for {handle}: timestamp {requested} is older than {last}")]
        StaleTimestamp {
            handle: String,
            last: u64,
            requested: u64,
        },

        #[error("Coordinate transformation error: {0}")]
        TransformError(String),

        #[error("Detector error: {0}")]
        DetectorError(String),

        #[error("Tracking pipeline is closed")]
        PipelineClosed,

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),

        #[error("IO error: {0}")]
        IoError(#[from] std::io::Error),
    }

    /// Result type for multibox operations
    pub type Result<T> = std::result::Result<T, Error>;
}
