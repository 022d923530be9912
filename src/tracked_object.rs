//! TrackedObject struct for identities maintained by the tracker.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::geometry::Rect;
use crate::motion::ObjectHandle;
use crate::palette::Color;
use crate::Detection;

/// Global ID counter for unique IDs across all trackers.
static GLOBAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Get the next global ID (unique across all trackers).
/// Uses Relaxed ordering since we only need uniqueness, not memory ordering.
#[inline]
pub fn get_next_global_id() -> u64 {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle of a tracked object.
///
/// Objects move strictly forward: `Created -> Tracking -> Lost -> Released`.
/// A released object is never revived; a re-detection gets a new object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Inserted by initial population or a successful merge.
    Created,
    /// Advanced by the motion engine at least once.
    Tracking,
    /// Correlation dropped too low or a conflict evicted it.
    Lost,
    /// Motion handle stopped and colour returned.
    Released,
}

/// A persistent identity maintained across frames.
#[derive(Clone)]
pub struct TrackedObject {
    /// Global ID unique across all trackers.
    pub id: u64,

    /// Motion engine handle. `None` in detection-only mode.
    pub handle: Option<ObjectHandle>,

    /// Display identity, held by no other live object.
    pub color: Color,

    /// Label copied from the originating detection.
    pub label: Option<String>,

    /// Confidence of the detection that created this object.
    pub detection_confidence: f32,

    /// Position when the object was created, in frame coordinates.
    ///
    /// For tracked objects the live position comes from the motion engine.
    pub location: Rect,

    pub state: Lifecycle,
}

impl fmt::Debug for TrackedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackedObject")
            .field("id", &self.id)
            .field("handle", &self.handle.map(|h| h.to_string()))
            .field("color", &self.color.to_string())
            .field("label", &self.label)
            .field("detection_confidence", &self.detection_confidence)
            .field("location", &self.location)
            .field("state", &self.state)
            .finish()
    }
}

impl TrackedObject {
    /// Object backed by a motion engine handle.
    pub fn tracked(handle: ObjectHandle, color: Color, detection: &Detection, location: Rect) -> Self {
        Self {
            id: get_next_global_id(),
            handle: Some(handle),
            color,
            label: detection.label.clone(),
            detection_confidence: detection.confidence,
            location,
            state: Lifecycle::Created,
        }
    }

    /// Object shown straight from a detection, without motion tracking.
    pub fn detection_only(color: Color, detection: &Detection) -> Self {
        Self {
            id: get_next_global_id(),
            handle: None,
            color,
            label: detection.label.clone(),
            detection_confidence: detection.confidence,
            location: detection.location,
            state: Lifecycle::Created,
        }
    }

    #[inline]
    pub fn is_motion_tracked(&self) -> bool {
        self.handle.is_some()
    }

    /// Move the lifecycle forward. Going backwards is a lifecycle bug.
    pub fn advance_to(&mut self, state: Lifecycle) {
        debug_assert!(
            state as u8 >= self.state as u8,
            "object {} cannot go from {:?} back to {:?}",
            self.id,
            self.state,
            state
        );
        self.state = state;
    }
}
