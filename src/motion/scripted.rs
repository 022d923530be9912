//! Deterministic motion engine driven by a script.
//!
//! Positions stay where they were registered unless moved through the
//! [`ScriptControl`], and correlations are whatever the script says. This
//! is the baseline used to exercise the tracker without real image data.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::adapter::ObjectHandle;
use super::traits::{EngineObjectId, MotionEngine, MotionEngineFactory};
use crate::frame::FrameGeometry;
use crate::geometry::Rect;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct ScriptedObject {
    position: Rect,
    correlation: f32,
    visible: bool,
}

#[derive(Debug)]
struct ScriptState {
    objects: HashMap<EngineObjectId, ScriptedObject>,
    registration_correlations: VecDeque<f32>,
    default_correlation: f32,
    motion: (f32, f32),
    registered: Vec<EngineObjectId>,
    forgotten: Vec<EngineObjectId>,
    frames_seen: u64,
    last_timestamp: Option<u64>,
    geometry: Option<FrameGeometry>,
}

impl Default for ScriptState {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            registration_correlations: VecDeque::new(),
            default_correlation: 1.0,
            motion: (0.0, 0.0),
            registered: Vec::new(),
            forgotten: Vec::new(),
            frames_seen: 0,
            last_timestamp: None,
            geometry: None,
        }
    }
}

/// Scripted [`MotionEngine`].
#[derive(Debug)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedEngine {
    /// Create an engine together with the control used to script it.
    pub fn new() -> (Self, ScriptControl) {
        let state = Arc::new(Mutex::new(ScriptState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            ScriptControl { state },
        )
    }
}

impl MotionEngine for ScriptedEngine {
    fn next_frame(&mut self, _frame: &[u8], timestamp: u64) {
        let mut state = self.state.lock();
        let (dx, dy) = state.motion;
        for object in state.objects.values_mut() {
            object.position = object.position.offset(dx, dy);
        }
        state.frames_seen += 1;
        state.last_timestamp = Some(timestamp);
    }

    fn register_object(&mut self, id: EngineObjectId, position: &Rect, _frame: &[u8]) {
        let mut state = self.state.lock();
        let correlation = state
            .registration_correlations
            .pop_front()
            .unwrap_or(state.default_correlation);
        state.objects.insert(
            id,
            ScriptedObject {
                position: *position,
                correlation,
                visible: true,
            },
        );
        state.registered.push(id);
    }

    fn set_previous_position(&mut self, id: EngineObjectId, position: &Rect, _timestamp: u64) {
        if let Some(object) = self.state.lock().objects.get_mut(&id) {
            object.position = *position;
        }
    }

    fn tracked_position(&self, id: EngineObjectId) -> Rect {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.position)
            .unwrap_or_default()
    }

    fn correlation(&self, id: EngineObjectId) -> f32 {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.correlation)
            .unwrap_or(0.0)
    }

    fn is_visible(&self, id: EngineObjectId) -> bool {
        self.state
            .lock()
            .objects
            .get(&id)
            .map(|o| o.visible)
            .unwrap_or(false)
    }

    fn forget(&mut self, id: EngineObjectId) {
        let mut state = self.state.lock();
        state.objects.remove(&id);
        state.forgotten.push(id);
    }
}

/// Handle for scripting a [`ScriptedEngine`] from outside the tracker.
///
/// Rectangles passed to and returned from the control are in engine
/// (downsampled) coordinates.
#[derive(Debug, Clone)]
pub struct ScriptControl {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptControl {
    /// Correlation given to objects registered without a queued value.
    pub fn set_default_correlation(&self, correlation: f32) {
        self.state.lock().default_correlation = correlation;
    }

    /// Queue the correlation for the next registered object. Values are
    /// consumed in order.
    pub fn queue_registration_correlation(&self, correlation: f32) {
        self.state
            .lock()
            .registration_correlations
            .push_back(correlation);
    }

    pub fn set_correlation(&self, handle: ObjectHandle, correlation: f32) {
        if let Some(object) = self.state.lock().objects.get_mut(&handle.engine_id()) {
            object.correlation = correlation;
        }
    }

    pub fn set_all_correlations(&self, correlation: f32) {
        for object in self.state.lock().objects.values_mut() {
            object.correlation = correlation;
        }
    }

    pub fn set_visible(&self, handle: ObjectHandle, visible: bool) {
        if let Some(object) = self.state.lock().objects.get_mut(&handle.engine_id()) {
            object.visible = visible;
        }
    }

    pub fn set_position(&self, handle: ObjectHandle, position: Rect) {
        if let Some(object) = self.state.lock().objects.get_mut(&handle.engine_id()) {
            object.position = position;
        }
    }

    /// Shift applied to every object on each frame.
    pub fn set_motion(&self, dx: f32, dy: f32) {
        self.state.lock().motion = (dx, dy);
    }

    /// Number of objects the engine currently holds.
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn registered(&self) -> Vec<EngineObjectId> {
        self.state.lock().registered.clone()
    }

    pub fn forgotten(&self) -> Vec<EngineObjectId> {
        self.state.lock().forgotten.clone()
    }

    pub fn frames_seen(&self) -> u64 {
        self.state.lock().frames_seen
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.state.lock().last_timestamp
    }

    /// Layout the engine was created for, once created.
    pub fn geometry(&self) -> Option<FrameGeometry> {
        self.state.lock().geometry
    }
}

/// Factory handing out [`ScriptedEngine`]s that share one script.
#[derive(Debug)]
pub struct ScriptedEngineFactory {
    control: ScriptControl,
    unavailable: Option<String>,
}

impl ScriptedEngineFactory {
    pub fn new() -> Self {
        let (_, control) = ScriptedEngine::new();
        Self {
            control,
            unavailable: None,
        }
    }

    /// A factory whose engine can never be created.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let mut factory = Self::new();
        factory.unavailable = Some(reason.into());
        factory
    }

    pub fn control(&self) -> ScriptControl {
        self.control.clone()
    }
}

impl Default for ScriptedEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionEngineFactory for ScriptedEngineFactory {
    fn create(&self, geometry: FrameGeometry) -> Result<Box<dyn MotionEngine>> {
        if let Some(reason) = &self.unavailable {
            return Err(Error::EngineUnavailable(reason.clone()));
        }
        self.control.state.lock().geometry = Some(geometry);
        Ok(Box::new(ScriptedEngine {
            state: Arc::clone(&self.control.state),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_correlations_are_consumed_in_order() {
        let (mut engine, control) = ScriptedEngine::new();
        control.set_default_correlation(0.5);
        control.queue_registration_correlation(0.9);
        control.queue_registration_correlation(0.1);

        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        engine.register_object(1, &rect, &[]);
        engine.register_object(2, &rect, &[]);
        engine.register_object(3, &rect, &[]);

        assert_eq!(engine.correlation(1), 0.9);
        assert_eq!(engine.correlation(2), 0.1);
        assert_eq!(engine.correlation(3), 0.5);
    }

    #[test]
    fn test_motion_applies_per_frame() {
        let (mut engine, control) = ScriptedEngine::new();
        engine.register_object(7, &Rect::new(0.0, 0.0, 10.0, 10.0), &[]);
        control.set_motion(1.0, -2.0);
        engine.next_frame(&[], 1);
        engine.next_frame(&[], 2);
        assert_eq!(engine.tracked_position(7), Rect::new(2.0, -4.0, 12.0, 6.0));
        assert_eq!(control.frames_seen(), 2);
        assert_eq!(control.last_timestamp(), Some(2));
    }

    #[test]
    fn test_forget_removes_object() {
        let (mut engine, control) = ScriptedEngine::new();
        engine.register_object(3, &Rect::new(0.0, 0.0, 10.0, 10.0), &[]);
        engine.forget(3);
        assert_eq!(control.live_objects(), 0);
        assert_eq!(control.forgotten(), vec![3]);
        assert_eq!(engine.correlation(3), 0.0);
    }

    #[test]
    fn test_unavailable_factory() {
        let factory = ScriptedEngineFactory::unavailable("missing");
        let geometry = FrameGeometry::new(4, 4, 4).unwrap();
        assert!(matches!(
            factory.create(geometry),
            Err(Error::EngineUnavailable(_))
        ));
    }
}
