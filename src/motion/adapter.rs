//! Object-scoped view of a motion engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::lease::EngineLease;
use super::traits::{EngineDiagnostics, EngineObjectId, MotionEngine, MotionEngineFactory};
use crate::frame::{downsample_luminance, Frame, FrameGeometry};
use crate::geometry::Rect;
use crate::{Error, Result};

/// Adapter generations, so handles from a released adapter are detected.
static ADAPTER_GENERATION: AtomicU32 = AtomicU32::new(0);

/// Engine object ids are never reused within a process.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(0);

/// Opaque handle to an object tracked by a [`MotionAdapter`].
///
/// A handle is invalidated by [`MotionAdapter::stop`]; using it afterwards
/// is a lifecycle bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    generation: u32,
    id: EngineObjectId,
}

impl ObjectHandle {
    /// Identifier the engine knows this object by.
    pub fn engine_id(&self) -> EngineObjectId {
        self.id
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}.{}", self.generation, self.id)
    }
}

#[derive(Debug, Clone)]
struct HandleState {
    /// Timestamp of the last externally supplied position.
    last_external_time: u64,
    /// Last position read back from the engine, in frame coordinates.
    position: Rect,
    visible: bool,
}

/// Wraps a [`MotionEngine`] with per-object lifecycle management.
///
/// The adapter owns the process-wide engine lease, downsamples incoming
/// frames once per timestamp and converts rectangles between frame and
/// engine coordinates.
pub struct MotionAdapter {
    engine: Box<dyn MotionEngine>,
    geometry: FrameGeometry,
    downsample_factor: usize,
    generation: u32,
    objects: HashMap<EngineObjectId, HandleState>,
    downsampled: Vec<u8>,
    downsampled_timestamp: Option<u64>,
    last_timestamp: u64,
    _lease: EngineLease,
}

impl fmt::Debug for MotionAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MotionAdapter")
            .field("engine", &"<MotionEngine>")
            .field("geometry", &self.geometry)
            .field("downsample_factor", &self.downsample_factor)
            .field("generation", &self.generation)
            .field("objects", &self.objects.len())
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

impl MotionAdapter {
    /// Create an adapter, waiting for any other live engine to be released.
    pub fn new(
        factory: &dyn MotionEngineFactory,
        geometry: FrameGeometry,
        downsample_factor: usize,
    ) -> Result<Self> {
        Self::with_lease(factory, geometry, downsample_factor, EngineLease::acquire())
    }

    /// Create an adapter, failing with [`Error::EngineAlreadyActive`] if
    /// another engine is live.
    pub fn try_new(
        factory: &dyn MotionEngineFactory,
        geometry: FrameGeometry,
        downsample_factor: usize,
    ) -> Result<Self> {
        let lease = EngineLease::try_acquire()?;
        Self::with_lease(factory, geometry, downsample_factor, lease)
    }

    fn with_lease(
        factory: &dyn MotionEngineFactory,
        geometry: FrameGeometry,
        downsample_factor: usize,
        lease: EngineLease,
    ) -> Result<Self> {
        if downsample_factor == 0 {
            return Err(Error::InvalidConfig(
                "downsample_factor must be at least 1".to_string(),
            ));
        }

        let engine_geometry = geometry.downsampled(downsample_factor);
        let engine = factory.create(engine_geometry).map_err(|e| match e {
            Error::EngineUnavailable(msg) => Error::EngineUnavailable(msg),
            other => Error::EngineUnavailable(other.to_string()),
        })?;

        let generation = ADAPTER_GENERATION.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Motion engine {} initialised for {}x{} frames (engine sees {}x{})",
            generation,
            geometry.width,
            geometry.height,
            engine_geometry.width,
            engine_geometry.height
        );

        Ok(Self {
            engine,
            geometry,
            downsample_factor,
            generation,
            objects: HashMap::new(),
            downsampled: vec![0; engine_geometry.width * engine_geometry.height],
            downsampled_timestamp: None,
            last_timestamp: 0,
            _lease: lease,
        })
    }

    /// Start tracking the object at `position` as it appears in `frame`.
    ///
    /// `frame` may be older than the last frame passed to
    /// [`advance_all`](Self::advance_all); the engine reconciles the two.
    pub fn begin_tracking(&mut self, position: &Rect, frame: &Frame) -> Result<ObjectHandle> {
        self.prepare_frame(frame)?;

        let id = NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed);
        let engine_position = self.to_engine(position);
        self.engine
            .register_object(id, &engine_position, &self.downsampled);
        self.engine
            .set_previous_position(id, &engine_position, frame.timestamp());

        self.objects.insert(
            id,
            HandleState {
                last_external_time: frame.timestamp(),
                position: *position,
                visible: true,
            },
        );
        self.refresh(id);

        Ok(ObjectHandle {
            generation: self.generation,
            id,
        })
    }

    /// Feed the next frame and refresh every live object's position.
    pub fn advance_all(&mut self, frame: &Frame) -> Result<()> {
        self.prepare_frame(frame)?;
        self.engine.next_frame(&self.downsampled, frame.timestamp());

        let ids: Vec<EngineObjectId> = self.objects.keys().copied().collect();
        for id in ids {
            self.refresh(id);
        }

        self.last_timestamp = frame.timestamp();
        Ok(())
    }

    /// Position of the object after the last update, in frame coordinates.
    pub fn current_position(&self, handle: ObjectHandle) -> Rect {
        self.state(handle).position
    }

    /// Correlation of the object at its current position, in `[0, 1]`.
    pub fn current_correlation(&self, handle: ObjectHandle) -> f32 {
        self.state(handle);
        self.engine.correlation(handle.id).clamp(0.0, 1.0)
    }

    pub fn is_visible(&self, handle: ObjectHandle) -> bool {
        self.state(handle).visible
    }

    /// Supply an externally observed position for the object at `timestamp`.
    ///
    /// Positions older than the last supplied one are rejected with
    /// [`Error::StaleTimestamp`] and leave the object untouched.
    pub fn set_previous_position(
        &mut self,
        handle: ObjectHandle,
        position: &Rect,
        timestamp: u64,
    ) -> Result<()> {
        let last = self.state(handle).last_external_time;
        if last > timestamp {
            log::warn!(
                "Rejected stale position for {}: timestamp {} is older than {}",
                handle,
                timestamp,
                last
            );
            return Err(Error::StaleTimestamp {
                handle: handle.to_string(),
                last,
                requested: timestamp,
            });
        }

        let engine_position = self.to_engine(position);
        self.engine
            .set_previous_position(handle.id, &engine_position, timestamp);
        if let Some(state) = self.objects.get_mut(&handle.id) {
            state.last_external_time = timestamp;
        }
        self.refresh(handle.id);
        Ok(())
    }

    /// Stop tracking the object and free its engine resources.
    ///
    /// The handle is invalid afterwards.
    pub fn stop(&mut self, handle: ObjectHandle) {
        self.state(handle);
        self.engine.forget(handle.id);
        self.objects.remove(&handle.id);
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Whether the handle is live on this adapter.
    pub fn is_live(&self, handle: ObjectHandle) -> bool {
        handle.generation == self.generation && self.objects.contains_key(&handle.id)
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// Engine internals in frame coordinates.
    pub fn diagnostics(&self) -> Option<EngineDiagnostics> {
        self.engine
            .diagnostics()
            .map(|d| d.scaled(self.downsample_factor as f32))
    }

    /// Release the engine and its process-wide lease.
    pub fn release(self) {
        log::info!(
            "Releasing motion engine {} with {} live objects",
            self.generation,
            self.objects.len()
        );
    }

    fn prepare_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.geometry() != self.geometry {
            return Err(Error::InvalidFrame(format!(
                "frame layout {:?} does not match engine layout {:?}",
                frame.geometry(), self.geometry
            )));
        }
        if self.downsampled_timestamp != Some(frame.timestamp()) {
            downsample_luminance(
                &self.geometry,
                frame.luminance(),
                self.downsample_factor,
                &mut self.downsampled,
            );
            self.downsampled_timestamp = Some(frame.timestamp());
        }
        Ok(())
    }

    fn refresh(&mut self, id: EngineObjectId) {
        let position = self.from_engine(&self.engine.tracked_position(id));
        let visible = self.engine.is_visible(id);
        if let Some(state) = self.objects.get_mut(&id) {
            state.position = position;
            state.visible = visible;
        }
    }

    fn state(&self, handle: ObjectHandle) -> &HandleState {
        assert!(
            handle.generation == self.generation,
            "object handle {} was created by another motion engine",
            handle
        );
        match self.objects.get(&handle.id) {
            Some(state) => state,
            None => panic!("object handle {} used after stop", handle),
        }
    }

    fn to_engine(&self, rect: &Rect) -> Rect {
        rect.scale(1.0 / self.downsample_factor as f32)
    }

    fn from_engine(&self, rect: &Rect) -> Rect {
        rect.scale(self.downsample_factor as f32)
    }
}
