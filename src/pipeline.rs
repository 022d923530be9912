//! Threaded frame/detection pipeline around a [`Tracker`].
//!
//! The tracker lives on a single actor thread and is only reached through
//! commands, so frame advances, batch merges and snapshot reads never
//! interleave. A detector worker runs beside it; frames arriving while the
//! detector is busy are tracked but not detected on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{DebugView, TrackedSnapshot};
use crate::frame::Frame;
use crate::geometry::{transformation_matrix, AffineTransform};
use crate::tracker::BatchReport;
use crate::{Detection, Error, Result, Tracker};

/// Object detector run on the worker thread.
pub trait Detector: Send {
    /// Detect objects in `frame`.
    ///
    /// `frame_to_crop` maps frame coordinates into the detector input crop;
    /// returned rectangles are in crop coordinates.
    fn detect(&mut self, frame: &Frame, frame_to_crop: &AffineTransform) -> Result<Vec<Detection>>;
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side of the square detector input.
    pub crop_size: u32,

    /// Keep the frame aspect ratio when mapping into the crop.
    pub maintain_aspect: bool,

    /// Detections below this confidence never reach the tracker.
    pub min_detection_confidence: f32,

    /// Bound of the tracker command queue. Submitting blocks when it is full.
    pub command_queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            crop_size: 300,
            maintain_aspect: false,
            min_detection_confidence: 0.4,
            command_queue_depth: 64,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.crop_size == 0 {
            return Err(Error::InvalidConfig("crop_size must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(Error::InvalidConfig(format!(
                "min_detection_confidence must be within [0, 1], got {}",
                self.min_detection_confidence
            )));
        }
        if self.command_queue_depth == 0 {
            return Err(Error::InvalidConfig(
                "command_queue_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Counters of the frame path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_submitted: u64,
    /// Frames handed to the detector.
    pub frames_detected: u64,
    /// Frames not detected on because the detector was busy.
    pub frames_skipped: u64,
}

enum TrackerCommand {
    Frame(Frame),
    Detections {
        frame: Frame,
        detections: Vec<Detection>,
    },
    Snapshot(Sender<Vec<TrackedSnapshot>>),
    DebugView(Sender<DebugView>),
    LastReport(Sender<Option<BatchReport>>),
    Shutdown,
}

/// Tracker actor plus detector worker.
pub struct TrackingPipeline {
    commands: Sender<TrackerCommand>,
    detector_frames: Sender<Frame>,
    actor: thread::JoinHandle<Tracker>,
    detector: thread::JoinHandle<()>,
    frames_submitted: AtomicU64,
    frames_detected: AtomicU64,
    frames_skipped: AtomicU64,
}

impl TrackingPipeline {
    /// Start the actor and detector threads.
    pub fn spawn(tracker: Tracker, detector: impl Detector + 'static, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let (commands, command_rx) = bounded(config.command_queue_depth);
        // Capacity one: a frame is only queued while the detector is idle.
        let (detector_frames, frame_rx) = bounded(1);

        let actor = thread::Builder::new()
            .name("tracker-actor".to_string())
            .spawn(move || run_actor(tracker, command_rx))?;

        let worker_commands = commands.clone();
        let detector = thread::Builder::new()
            .name("detector".to_string())
            .spawn(move || run_detector(detector, config, frame_rx, worker_commands))?;

        Ok(Self {
            commands,
            detector_frames,
            actor,
            detector,
            frames_submitted: AtomicU64::new(0),
            frames_detected: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
        })
    }

    /// Feed a frame to the tracker, and to the detector if it is idle.
    ///
    /// # Returns
    /// Whether the frame was handed to the detector.
    pub fn submit_frame(&self, frame: Frame) -> Result<bool> {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
        self.send(TrackerCommand::Frame(frame.clone()))?;

        match self.detector_frames.try_send(frame) {
            Ok(()) => {
                self.frames_detected.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            Err(TrySendError::Full(frame)) => {
                log::trace!("Detector busy, skipping detection on frame {}", frame.timestamp());
                self.frames_skipped.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => {
                log::error!("Detector worker has stopped");
                Ok(false)
            }
        }
    }

    /// Merge an externally produced batch, already in frame coordinates.
    pub fn submit_detections(&self, frame: Frame, detections: Vec<Detection>) -> Result<()> {
        self.send(TrackerCommand::Detections { frame, detections })
    }

    pub fn snapshot(&self) -> Result<Vec<TrackedSnapshot>> {
        self.request(TrackerCommand::Snapshot)
    }

    pub fn debug_view(&self) -> Result<DebugView> {
        self.request(TrackerCommand::DebugView)
    }

    /// Report of the most recent batch merge, if any.
    pub fn last_report(&self) -> Result<Option<BatchReport>> {
        self.request(TrackerCommand::LastReport)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_detected: self.frames_detected.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
        }
    }

    /// Stop both threads and hand the tracker back.
    ///
    /// A detection in flight is finished and merged first.
    pub fn shutdown(self) -> Result<Tracker> {
        let Self {
            commands,
            detector_frames,
            actor,
            detector,
            ..
        } = self;

        drop(detector_frames);
        if detector.join().is_err() {
            log::error!("Detector worker panicked");
        }

        // The actor may already be gone if it panicked.
        let _ = commands.send(TrackerCommand::Shutdown);
        actor.join().map_err(|_| Error::PipelineClosed)
    }

    fn send(&self, command: TrackerCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::PipelineClosed)
    }

    fn request<T>(&self, command: impl FnOnce(Sender<T>) -> TrackerCommand) -> Result<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(command(reply_tx))?;
        reply_rx.recv().map_err(|_| Error::PipelineClosed)
    }
}

fn run_actor(mut tracker: Tracker, commands: Receiver<TrackerCommand>) -> Tracker {
    log::debug!("Tracker actor started");
    let mut last_report = None;

    while let Ok(command) = commands.recv() {
        match command {
            TrackerCommand::Frame(frame) => match tracker.on_frame(&frame) {
                Ok(pruned) if pruned > 0 => {
                    log::debug!("Frame {}: pruned {} lost objects", frame.timestamp(), pruned)
                }
                Ok(_) => {}
                Err(e) => log::error!("Frame {} rejected: {}", frame.timestamp(), e),
            },
            TrackerCommand::Detections { frame, detections } => {
                match tracker.track_results(detections, &frame) {
                    Ok(report) => {
                        log::debug!(
                            "Frame {}: {} tracked, {} replaced, {} rejected",
                            frame.timestamp(),
                            report.tracked,
                            report.replaced,
                            report.rejected_low_correlation + report.rejected_by_overlap
                        );
                        last_report = Some(report);
                    }
                    Err(e) => log::error!("Batch for frame {} rejected: {}", frame.timestamp(), e),
                }
            }
            TrackerCommand::Snapshot(reply) => {
                let _ = reply.send(tracker.snapshot());
            }
            TrackerCommand::DebugView(reply) => {
                let _ = reply.send(tracker.debug_view());
            }
            TrackerCommand::LastReport(reply) => {
                let _ = reply.send(last_report.clone());
            }
            TrackerCommand::Shutdown => break,
        }
    }

    log::debug!("Tracker actor stopped");
    tracker
}

fn run_detector(
    mut detector: impl Detector,
    config: PipelineConfig,
    frames: Receiver<Frame>,
    commands: Sender<TrackerCommand>,
) {
    log::debug!("Detector worker started");

    while let Ok(frame) = frames.recv() {
        let frame_to_crop = match transformation_matrix(
            frame.width() as u32,
            frame.height() as u32,
            config.crop_size,
            config.crop_size,
            frame.sensor_orientation(),
            false,
            config.maintain_aspect,
        ) {
            Ok(t) => t,
            Err(e) => {
                log::error!("Cannot map frame {} into the detector crop: {}", frame.timestamp(), e);
                continue;
            }
        };
        let crop_to_frame = match frame_to_crop.inverse() {
            Ok(t) => t,
            Err(e) => {
                log::error!("Crop transform for frame {} is singular: {}", frame.timestamp(), e);
                continue;
            }
        };

        let detections = match detector.detect(&frame, &frame_to_crop) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {}", frame.timestamp(), e);
                continue;
            }
        };

        let mapped: Vec<Detection> = detections
            .iter()
            .filter(|d| d.confidence >= config.min_detection_confidence)
            .map(|d| d.mapped(&crop_to_frame))
            .collect();
        log::debug!(
            "Frame {}: {} of {} detections above {:.2}",
            frame.timestamp(),
            mapped.len(),
            detections.len(),
            config.min_detection_confidence
        );

        if commands
            .send(TrackerCommand::Detections {
                frame,
                detections: mapped,
            })
            .is_err()
        {
            break;
        }
    }

    log::debug!("Detector worker stopped");
}
