//! Main tracker implementation.
//!
//! The [`Tracker`] reconciles two streams: every frame advances motion
//! tracked objects and prunes the ones whose correlation collapsed, and
//! every detection batch is merged into the set of live identities.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DebugView, TrackedSnapshot};
use crate::frame::{Frame, FrameGeometry};
use crate::geometry::frame_to_canvas;
use crate::motion::{MotionAdapter, MotionEngineFactory};
use crate::palette::{Color, ColorPool, DEFAULT_PALETTE};
use crate::registry::Registry;
use crate::tracked_object::Lifecycle;
use crate::{Detection, Error, Result, TrackedObject};

/// Maximum IoU tolerated between a new candidate and an existing object.
pub const MAX_OVERLAP: f32 = 0.2;

/// Minimum side of a detection, in frame pixels.
pub const MIN_SIZE: f32 = 16.0;

/// Correlation a candidate needs to be accepted, and an existing object
/// needs to defend its place.
pub const MARGINAL_CORRELATION: f32 = 0.75;

/// Correlation under which a tracked object is considered lost.
pub const MIN_CORRELATION: f32 = 0.3;

/// Frames are downsampled by this factor before reaching the motion engine.
pub const DOWNSAMPLE_FACTOR: usize = 2;

/// Configuration for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// IoU above which a candidate conflicts with an existing object.
    pub max_overlap: f32,

    /// Detections with a side shorter than this are ignored.
    pub min_size: f32,

    /// Correlation threshold for accepting candidates and defending objects.
    pub marginal_correlation: f32,

    /// Correlation under which tracked objects are pruned.
    pub min_correlation: f32,

    /// Downsampling applied to frames before motion tracking.
    pub downsample_factor: usize,

    /// Display colours. The palette size bounds the number of objects.
    pub palette: Vec<Color>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_overlap: MAX_OVERLAP,
            min_size: MIN_SIZE,
            marginal_correlation: MARGINAL_CORRELATION,
            min_correlation: MIN_CORRELATION,
            downsample_factor: DOWNSAMPLE_FACTOR,
            palette: DEFAULT_PALETTE.to_vec(),
        }
    }
}

impl TrackerConfig {
    /// Create a configuration with default thresholds and the given palette.
    pub fn with_palette(palette: Vec<Color>) -> Self {
        Self {
            palette,
            ..Self::default()
        }
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let thresholds = [
            ("max_overlap", self.max_overlap),
            ("marginal_correlation", self.marginal_correlation),
            ("min_correlation", self.min_correlation),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.min_size.is_finite() && self.min_size > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "min_size must be positive, got {}",
                self.min_size
            )));
        }

        if self.downsample_factor == 0 {
            return Err(Error::InvalidConfig(
                "downsample_factor must be at least 1".to_string(),
            ));
        }

        if self.palette.is_empty() {
            return Err(Error::InvalidConfig("palette must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for color in &self.palette {
            if !seen.insert(*color) {
                return Err(Error::InvalidConfig(format!(
                    "palette contains {} more than once",
                    color
                )));
            }
        }

        Ok(())
    }
}

/// What happened to a single detection of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    /// Rectangle below the minimum size; ignored.
    Degenerate,

    /// A new object was created, replacing the listed objects.
    Tracked {
        id: u64,
        color: Color,
        replaced: Vec<u64>,
    },

    /// The candidate correlated too poorly to start tracking.
    RejectedLowCorrelation { correlation: f32 },

    /// A healthier, at least as confident object already covers the area.
    RejectedByOverlap { existing: u64 },

    /// No colour free and nobody weaker to evict.
    PoolExhausted,
}

/// Summary of a detection batch merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Objects were created straight from detections, without motion
    /// tracking or conflict resolution.
    pub initial_population: bool,
    pub degenerate: usize,
    pub tracked: usize,
    pub rejected_low_correlation: usize,
    pub rejected_by_overlap: usize,
    pub pool_exhausted: usize,
    /// Existing objects removed to make room for new ones.
    pub replaced: usize,
    /// One outcome per input detection, in input order.
    pub outcomes: Vec<MergeOutcome>,
}

impl BatchReport {
    fn record(&mut self, outcome: MergeOutcome) {
        match &outcome {
            MergeOutcome::Degenerate => self.degenerate += 1,
            MergeOutcome::Tracked { replaced, .. } => {
                self.tracked += 1;
                self.replaced += replaced.len();
            }
            MergeOutcome::RejectedLowCorrelation { .. } => self.rejected_low_correlation += 1,
            MergeOutcome::RejectedByOverlap { .. } => self.rejected_by_overlap += 1,
            MergeOutcome::PoolExhausted => self.pool_exhausted += 1,
        }
        self.outcomes.push(outcome);
    }
}

enum MotionState {
    /// No frame seen yet.
    Pending,
    Live(MotionAdapter),
    /// Engine creation failed; detection-only for the rest of the session.
    Unavailable(String),
}

/// Multi-object tracker fusing detections with frame-to-frame motion.
///
/// Not internally synchronised: wrap it in a lock or drive it from a single
/// thread (see [`TrackingPipeline`](crate::TrackingPipeline)).
pub struct Tracker {
    /// Tracker configuration.
    config: TrackerConfig,

    registry: Registry,

    pool: ColorPool,

    motion: MotionState,

    factory: Box<dyn MotionEngineFactory>,

    /// Latest detection batch as received.
    raw_detections: Vec<Detection>,

    /// Layout and orientation of the last frame seen.
    last_frame: Option<(FrameGeometry, i32)>,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let motion = match &self.motion {
            MotionState::Pending => "pending".to_string(),
            MotionState::Live(adapter) => format!("{:?}", adapter),
            MotionState::Unavailable(reason) => format!("unavailable ({})", reason),
        };
        f.debug_struct("Tracker")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .field("motion", &motion)
            .field("factory", &"<MotionEngineFactory>")
            .field("raw_detections", &self.raw_detections.len())
            .field("last_frame", &self.last_frame)
            .finish()
    }
}

impl Tracker {
    /// Create a new tracker with the given configuration.
    ///
    /// The motion engine is created from `factory` on the first frame.
    pub fn new(config: TrackerConfig, factory: impl MotionEngineFactory + 'static) -> Result<Self> {
        config.validate()?;

        let pool = ColorPool::new(&config.palette);
        Ok(Self {
            registry: Registry::new(pool.capacity()),
            pool,
            config,
            motion: MotionState::Pending,
            factory: Box::new(factory),
            raw_detections: Vec::new(),
            last_frame: None,
        })
    }

    /// Advance every tracked object to `frame` and prune the lost ones.
    ///
    /// The first call creates the motion engine. If that fails the tracker
    /// stays in detection-only mode for good.
    ///
    /// # Returns
    /// Number of objects pruned.
    pub fn on_frame(&mut self, frame: &Frame) -> Result<usize> {
        self.last_frame = Some((frame.geometry(), frame.sensor_orientation()));

        if let MotionState::Pending = self.motion {
            self.start_engine(frame)?;
        }

        let adapter = match &mut self.motion {
            MotionState::Live(adapter) => adapter,
            _ => return Ok(0),
        };
        adapter.advance_all(frame)?;

        for obj in self.registry.iter_mut() {
            if obj.state == Lifecycle::Created {
                obj.advance_to(Lifecycle::Tracking);
            }
        }

        Ok(self.prune_lost())
    }

    /// Release every motion tracked object whose correlation dropped below
    /// `min_correlation`.
    ///
    /// Correlation only changes when a frame is advanced, so calling this
    /// twice in a row removes nothing the second time.
    pub fn prune_lost(&mut self) -> usize {
        let adapter = match &mut self.motion {
            MotionState::Live(adapter) => adapter,
            _ => return 0,
        };

        let min_correlation = self.config.min_correlation;
        let lost = self.registry.remove_where(|obj| match obj.handle {
            Some(handle) => adapter.current_correlation(handle) < min_correlation,
            None => false,
        });

        let count = lost.len();
        for mut obj in lost {
            obj.advance_to(Lifecycle::Lost);
            if let Some(handle) = obj.handle {
                log::debug!(
                    "Object {} lost (correlation {:.2} < {:.2})",
                    obj.id,
                    adapter.current_correlation(handle),
                    min_correlation
                );
                adapter.stop(handle);
            }
            self.pool.release(obj.color);
            obj.advance_to(Lifecycle::Released);
        }
        count
    }

    /// Merge a detection batch computed on `frame`.
    ///
    /// Detections must be in frame coordinates. Degenerate rectangles never
    /// reach the registry. Without a live motion engine the registry is
    /// rebuilt straight from the batch, unless no detection in it is usable.
    pub fn track_results(&mut self, detections: Vec<Detection>, frame: &Frame) -> Result<BatchReport> {
        log::debug!("Processing {} results from {}", detections.len(), frame.timestamp());
        self.last_frame = Some((frame.geometry(), frame.sensor_orientation()));

        let live = matches!(self.motion, MotionState::Live(_));
        let mut report = BatchReport {
            initial_population: !live,
            ..BatchReport::default()
        };

        let min_size = self.config.min_size;
        if !live && detections.iter().any(|d| !d.location.is_degenerate(min_size)) {
            for mut obj in self.registry.clear() {
                obj.advance_to(Lifecycle::Released);
                self.pool.release(obj.color);
            }
        }

        for detection in &detections {
            let outcome = if detection.location.is_degenerate(self.config.min_size) {
                log::warn!("Degenerate rectangle {} skipped", detection.location);
                MergeOutcome::Degenerate
            } else if live {
                self.handle_detection(detection, frame)?
            } else {
                self.place_directly(detection)
            };
            report.record(outcome);
        }

        self.raw_detections = detections;
        Ok(report)
    }

    /// Point-in-time copy of every object, in frame coordinates.
    pub fn snapshot(&self) -> Vec<TrackedSnapshot> {
        let adapter = self.adapter();
        self.registry
            .iter()
            .map(|obj| {
                let (position, correlation) = match (obj.handle, adapter) {
                    (Some(handle), Some(adapter)) => (
                        adapter.current_position(handle),
                        Some(adapter.current_correlation(handle)),
                    ),
                    _ => (obj.location, None),
                };
                TrackedSnapshot {
                    id: obj.id,
                    handle: obj.handle,
                    color: obj.color,
                    label: obj.label.clone(),
                    confidence: obj.detection_confidence,
                    position,
                    correlation,
                }
            })
            .collect()
    }

    /// Snapshot mapped onto a `canvas_width` x `canvas_height` display,
    /// honouring the sensor orientation of the last frame.
    pub fn snapshot_on_canvas(&self, canvas_width: u32, canvas_height: u32) -> Result<Vec<TrackedSnapshot>> {
        let (geometry, orientation) = self
            .last_frame
            .ok_or_else(|| Error::InvalidFrame("no frame has been seen yet".to_string()))?;
        let transform = frame_to_canvas(
            geometry.width as u32,
            geometry.height as u32,
            canvas_width,
            canvas_height,
            orientation,
        )?;
        Ok(self.snapshot().iter().map(|s| s.mapped(&transform)).collect())
    }

    /// Raw detections and engine internals for a debug overlay.
    pub fn debug_view(&self) -> DebugView {
        let adapter = self.adapter();
        let correlations = match adapter {
            Some(adapter) => self
                .registry
                .iter()
                .filter_map(|obj| obj.handle.map(|h| (obj.id, adapter.current_correlation(h))))
                .collect(),
            None => Vec::new(),
        };
        DebugView::new(
            self.raw_detections.clone(),
            correlations,
            adapter.and_then(|a| a.diagnostics()),
        )
    }

    /// Current correlation of the object with `id`, if it is motion tracked.
    pub fn correlation(&self, id: u64) -> Option<f32> {
        let handle = self.registry.get(id)?.handle?;
        self.adapter().map(|a| a.current_correlation(handle))
    }

    /// Stop every object and release the motion engine, letting another
    /// tracker start one.
    pub fn release(mut self) {
        let objects = self.registry.clear();
        if let MotionState::Live(mut adapter) = std::mem::replace(&mut self.motion, MotionState::Pending) {
            for obj in objects {
                if let Some(handle) = obj.handle {
                    adapter.stop(handle);
                }
            }
            adapter.release();
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pool(&self) -> &ColorPool {
        &self.pool
    }

    pub fn raw_detections(&self) -> &[Detection] {
        &self.raw_detections
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Whether a motion engine is live.
    pub fn is_motion_tracking(&self) -> bool {
        matches!(self.motion, MotionState::Live(_))
    }

    /// Whether engine creation failed and the tracker only mirrors detections.
    pub fn is_detection_only(&self) -> bool {
        matches!(self.motion, MotionState::Unavailable(_))
    }

    fn adapter(&self) -> Option<&MotionAdapter> {
        match &self.motion {
            MotionState::Live(adapter) => Some(adapter),
            _ => None,
        }
    }

    fn start_engine(&mut self, frame: &Frame) -> Result<()> {
        match MotionAdapter::new(self.factory.as_ref(), frame.geometry(), self.config.downsample_factor) {
            Ok(adapter) => {
                // Detection-only entries have no motion state to advance.
                for mut obj in self.registry.remove_where(|o| o.handle.is_none()) {
                    obj.advance_to(Lifecycle::Released);
                    self.pool.release(obj.color);
                }
                self.motion = MotionState::Live(adapter);
            }
            Err(Error::EngineUnavailable(reason)) => {
                log::error!(
                    "Motion engine unavailable, falling back to detection-only mode: {}",
                    reason
                );
                self.motion = MotionState::Unavailable(reason);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn place_directly(&mut self, detection: &Detection) -> MergeOutcome {
        match self.pool.acquire() {
            Some(color) => {
                let obj = TrackedObject::detection_only(color, detection);
                let id = obj.id;
                self.registry.insert(obj);
                MergeOutcome::Tracked {
                    id,
                    color,
                    replaced: Vec::new(),
                }
            }
            None => {
                log::debug!("No colour left for detection {}", detection.location);
                MergeOutcome::PoolExhausted
            }
        }
    }

    /// Merge one detection into the registry.
    fn handle_detection(&mut self, detection: &Detection, frame: &Frame) -> Result<MergeOutcome> {
        let adapter = match &mut self.motion {
            MotionState::Live(adapter) => adapter,
            _ => return Err(Error::EngineUnavailable("motion engine is not live".to_string())),
        };

        let candidate = adapter.begin_tracking(&detection.location, frame)?;
        let candidate_position = adapter.current_position(candidate);
        let candidate_correlation = adapter.current_correlation(candidate);

        if candidate_correlation < self.config.marginal_correlation {
            log::debug!(
                "Candidate {} correlation {:.2} below {:.2}, discarded",
                candidate,
                candidate_correlation,
                self.config.marginal_correlation
            );
            adapter.stop(candidate);
            return Ok(MergeOutcome::RejectedLowCorrelation {
                correlation: candidate_correlation,
            });
        }

        let mut remove = Vec::new();
        let mut donor: Option<(u64, f32)> = None;

        for obj in self.registry.iter() {
            let (position, correlation) = match obj.handle {
                Some(handle) => (
                    adapter.current_position(handle),
                    adapter.current_correlation(handle),
                ),
                None => (obj.location, 0.0),
            };

            let iou = candidate_position.iou(&position);
            if iou <= self.config.max_overlap {
                continue;
            }

            if correlation > self.config.marginal_correlation
                && obj.detection_confidence >= detection.confidence
            {
                log::debug!(
                    "Candidate {} ({:.2}) loses to object {} ({:.2}, correlation {:.2}, IoU {:.2})",
                    candidate,
                    detection.confidence,
                    obj.id,
                    obj.detection_confidence,
                    correlation,
                    iou
                );
                adapter.stop(candidate);
                return Ok(MergeOutcome::RejectedByOverlap { existing: obj.id });
            }

            remove.push(obj.id);
            if donor.map_or(true, |(_, best)| iou > best) {
                donor = Some((obj.id, iou));
            }
        }

        if self.pool.is_exhausted() && remove.is_empty() {
            let weakest = self
                .registry
                .iter()
                .filter(|o| o.detection_confidence < detection.confidence)
                .min_by(|a, b| a.detection_confidence.total_cmp(&b.detection_confidence));
            match weakest {
                Some(obj) => {
                    log::debug!(
                        "Evicting object {} ({:.2}) for candidate {} ({:.2})",
                        obj.id,
                        obj.detection_confidence,
                        candidate,
                        detection.confidence
                    );
                    remove.push(obj.id);
                    donor = Some((obj.id, 0.0));
                }
                None => {
                    log::warn!(
                        "No colour available and no weaker object to replace for {} ({:.2})",
                        detection.location,
                        detection.confidence
                    );
                    adapter.stop(candidate);
                    return Ok(MergeOutcome::PoolExhausted);
                }
            }
        }

        let donor_id = donor.map(|(id, _)| id);
        let mut donated = None;
        for id in &remove {
            if let Some(mut obj) = self.registry.remove(*id) {
                obj.advance_to(Lifecycle::Lost);
                if let Some(handle) = obj.handle {
                    adapter.stop(handle);
                }
                if Some(obj.id) == donor_id {
                    donated = Some(obj.color);
                } else {
                    self.pool.release(obj.color);
                }
                obj.advance_to(Lifecycle::Released);
            }
        }

        let color = match donated.or_else(|| self.pool.acquire()) {
            Some(color) => color,
            None => {
                log::warn!("No colour available for {}", detection.location);
                adapter.stop(candidate);
                return Ok(MergeOutcome::PoolExhausted);
            }
        };

        let obj = TrackedObject::tracked(candidate, color, detection, candidate_position);
        let id = obj.id;
        log::debug!(
            "Tracking object {} as {} with colour {} (replaced {:?})",
            id,
            candidate,
            color,
            remove
        );
        self.registry.insert(obj);

        Ok(MergeOutcome::Tracked {
            id,
            color,
            replaced: remove,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rect;
    use crate::motion::{ScriptControl, ScriptedEngineFactory};

    const WIDTH: usize = 640;
    const HEIGHT: usize = 480;

    fn tracker_with(config: TrackerConfig) -> (Tracker, ScriptControl) {
        let factory = ScriptedEngineFactory::new();
        let control = factory.control();
        (Tracker::new(config, factory).unwrap(), control)
    }

    fn frame(timestamp: u64) -> Frame {
        Frame::blank(timestamp, WIDTH, HEIGHT)
    }

    fn det(confidence: f32, left: f32, top: f32, right: f32, bottom: f32) -> Detection {
        Detection::new(confidence, Rect::new(left, top, right, bottom)).unwrap()
    }

    // ===== Config Tests =====

    #[test]
    fn test_default_config_is_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.palette.len(), 15);
        assert_eq!(config.min_size, 16.0);
    }

    #[test]
    fn test_config_rejects_bad_thresholds() {
        let config = TrackerConfig {
            min_correlation: 1.5,
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = TrackerConfig {
            min_size: 0.0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_duplicate_colours() {
        let config = TrackerConfig::with_palette(vec![DEFAULT_PALETTE[0], DEFAULT_PALETTE[0]]);
        assert!(config.validate().is_err());
        assert!(TrackerConfig::with_palette(Vec::new()).validate().is_err());
    }

    #[test]
    fn test_tracker_new_validates() {
        let config = TrackerConfig {
            downsample_factor: 0,
            ..TrackerConfig::default()
        };
        assert!(Tracker::new(config, ScriptedEngineFactory::new()).is_err());
    }

    // ===== Merge Tests =====

    #[test]
    fn test_batch_before_first_frame_populates_directly() {
        let (mut tracker, _control) = tracker_with(TrackerConfig::default());
        let report = tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();
        assert!(report.initial_population);
        assert_eq!(report.tracked, 1);
        assert!(!tracker.is_motion_tracking());
        assert!(tracker.snapshot()[0].correlation.is_none());
    }

    #[test]
    fn test_engine_start_releases_detection_only_entries() {
        let (mut tracker, _control) = tracker_with(TrackerConfig::default());
        tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();
        assert_eq!(tracker.len(), 1);

        tracker.on_frame(&frame(2)).unwrap();
        assert!(tracker.is_motion_tracking());
        assert!(tracker.is_empty());
        assert_eq!(tracker.pool().available(), 15);
    }

    #[test]
    fn test_low_correlation_candidate_is_discarded() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();

        control.queue_registration_correlation(0.5);
        let report = tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();
        assert_eq!(report.rejected_low_correlation, 1);
        assert!(tracker.is_empty());
        assert_eq!(control.live_objects(), 0);
    }

    #[test]
    fn test_disjoint_detections_all_tracked() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        let report = tracker
            .track_results(
                vec![
                    det(0.9, 0.0, 0.0, 40.0, 40.0),
                    det(0.8, 100.0, 100.0, 140.0, 140.0),
                ],
                &frame(1),
            )
            .unwrap();
        assert_eq!(report.tracked, 2);
        assert_eq!(report.replaced, 0);
        assert_eq!(control.live_objects(), 2);
        assert_eq!(tracker.pool().available(), 13);
    }

    #[test]
    fn test_highest_iou_object_donates_colour() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(
                vec![
                    det(0.5, 0.0, 0.0, 100.0, 100.0),
                    det(0.5, 80.0, 0.0, 180.0, 100.0),
                ],
                &frame(1),
            )
            .unwrap();
        let before = tracker.snapshot();
        control.set_all_correlations(0.5);

        // Overlaps the first object more than the second.
        let report = tracker
            .track_results(vec![det(0.9, 35.0, 0.0, 135.0, 100.0)], &frame(1))
            .unwrap();
        match &report.outcomes[0] {
            MergeOutcome::Tracked { color, replaced, .. } => {
                assert_eq!(*color, before[0].color);
                assert_eq!(replaced.len(), 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(tracker.len(), 1);
        assert!(tracker.pool().is_free(&before[1].color));
    }

    #[test]
    fn test_equal_iou_donor_is_first_in_registry_order() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(
                vec![
                    det(0.5, 0.0, 0.0, 100.0, 100.0),
                    det(0.5, 80.0, 0.0, 180.0, 100.0),
                ],
                &frame(1),
            )
            .unwrap();
        let before = tracker.snapshot();
        control.set_all_correlations(0.5);

        // 60 pixel columns shared with each object.
        let candidate = Rect::new(40.0, 0.0, 140.0, 100.0);
        assert_eq!(candidate.iou(&before[0].position), candidate.iou(&before[1].position));
        let report = tracker
            .track_results(vec![det(0.9, 40.0, 0.0, 140.0, 100.0)], &frame(1))
            .unwrap();
        match &report.outcomes[0] {
            MergeOutcome::Tracked { color, replaced, .. } => {
                assert_eq!(*color, before[0].color);
                assert_eq!(replaced, &vec![before[0].id, before[1].id]);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(tracker.pool().is_free(&before[1].color));
    }

    #[test]
    fn test_equal_confidence_keeps_existing_object() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(vec![det(0.7, 0.0, 0.0, 100.0, 100.0)], &frame(1))
            .unwrap();
        control.set_all_correlations(0.9);

        let report = tracker
            .track_results(vec![det(0.7, 0.0, 0.0, 100.0, 100.0)], &frame(1))
            .unwrap();
        assert_eq!(report.rejected_by_overlap, 1);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_prune_returns_colour() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();
        control.set_all_correlations(0.1);

        assert_eq!(tracker.on_frame(&frame(2)).unwrap(), 1);
        assert!(tracker.is_empty());
        assert_eq!(tracker.pool().available(), 15);
        assert_eq!(control.live_objects(), 0);
    }

    #[test]
    fn test_objects_become_tracking_after_a_frame() {
        let (mut tracker, _control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();
        assert_eq!(tracker.registry().iter().next().unwrap().state, Lifecycle::Created);
        tracker.on_frame(&frame(2)).unwrap();
        assert_eq!(tracker.registry().iter().next().unwrap().state, Lifecycle::Tracking);
    }

    #[test]
    fn test_snapshot_follows_motion() {
        let (mut tracker, control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 40.0, 40.0)], &frame(1))
            .unwrap();

        control.set_motion(5.0, 0.0);
        tracker.on_frame(&frame(2)).unwrap();
        assert_eq!(tracker.snapshot()[0].position, Rect::new(10.0, 0.0, 50.0, 40.0));
    }

    #[test]
    fn test_snapshot_on_canvas_requires_a_frame() {
        let (tracker, _control) = tracker_with(TrackerConfig::default());
        assert!(tracker.snapshot_on_canvas(100, 100).is_err());
    }

    #[test]
    fn test_snapshot_on_canvas_scales_positions() {
        let (mut tracker, _control) = tracker_with(TrackerConfig::default());
        tracker
            .track_results(vec![det(0.9, 0.0, 0.0, 64.0, 48.0)], &frame(1))
            .unwrap();
        let snapshot = tracker.snapshot_on_canvas(320, 240).unwrap();
        assert_eq!(snapshot[0].position, Rect::new(0.0, 0.0, 32.0, 24.0));
    }

    #[test]
    fn test_debug_view_keeps_raw_detections() {
        let (mut tracker, _control) = tracker_with(TrackerConfig::default());
        tracker.on_frame(&frame(1)).unwrap();
        tracker
            .track_results(
                vec![det(0.9, 0.0, 0.0, 40.0, 40.0), det(0.9, 0.0, 0.0, 8.0, 8.0)],
                &frame(1),
            )
            .unwrap();
        let view = tracker.debug_view();
        assert_eq!(view.raw_detections.len(), 2);
        assert_eq!(view.correlations.len(), 1);
    }
}
