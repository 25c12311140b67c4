// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 第二路检测 (Secondary stage)
//!
//! One loop over the secondary camera link; each frame is handled by the
//! mode current at the moment it is taken:
//! - driver: face landmarks → eye-aspect ratio → debounced drowsiness alert
//! - cargo: object boxes (blue) + hand presence → intrusion alert

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::link::{FrameReader, FrameWriter, LinkClosed};
use super::mode::{Mode, ModeHandle};
use super::stats::StageStats;
use crate::alert::{raise, AlertCategory, AlertSink};
use crate::detection::{DetectError, FaceLandmarker, HandLandmarker, ObjectDetector};
use crate::frame::{Frame, CARGO_BOX_COLOR};
use crate::shutdown::Shutdown;

const POLL: Duration = Duration::from_millis(100);

pub const DROWSY_MESSAGE: &str = "⚠️ DRIVER DROWSY";
pub const INTRUSION_MESSAGE: &str = "⚠️ UNAUTHORIZED CARGO ACCESS";

/// Consecutive-low-EAR debounce.
#[derive(Debug, Clone)]
pub struct DrowsinessMonitor {
    threshold: f32,
    frames: u32,
    counter: u32,
}

impl DrowsinessMonitor {
    pub fn new(threshold: f32, frames: u32) -> Self {
        Self {
            threshold,
            frames: frames.max(1),
            counter: 0,
        }
    }

    /// Feed one frame's EAR (`None` = no face). Returns `true` when the run of
    /// low readings reaches the limit; the counter then starts over.
    pub fn observe(&mut self, ear: Option<f32>) -> bool {
        match ear {
            Some(ear) if ear < self.threshold => {
                self.counter += 1;
                if self.counter >= self.frames {
                    self.counter = 0;
                    return true;
                }
                false
            }
            _ => {
                self.counter = 0;
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Counts consecutive per-frame detection failures; fires once per run.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    limit: u32,
    consecutive: u32,
    alerted: bool,
}

impl FailureTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
            alerted: false,
        }
    }

    /// Returns `true` exactly when the run reaches the limit.
    pub fn failure(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        if !self.alerted && self.consecutive >= self.limit {
            self.alerted = true;
            return true;
        }
        false
    }

    pub fn success(&mut self) {
        self.consecutive = 0;
        self.alerted = false;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

/// Analysis capabilities used by the secondary stage.
pub struct SecondaryModels {
    pub detector: Box<dyn ObjectDetector>,
    pub face: Box<dyn FaceLandmarker>,
    pub hands: Box<dyn HandLandmarker>,
}

#[derive(Debug, Clone)]
pub struct SecondaryOptions {
    pub confidence: f32,
    pub ear_threshold: f32,
    pub drowsy_frames: u32,
    /// Consecutive failed frames before `DETECTION DEGRADED`.
    pub degraded_after: u32,
}

impl Default for SecondaryOptions {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            ear_threshold: 0.18,
            drowsy_frames: 12,
            degraded_after: 30,
        }
    }
}

pub struct SecondaryStage {
    input: FrameReader,
    output: FrameWriter,
    mode: ModeHandle,
    models: SecondaryModels,
    alerts: Arc<dyn AlertSink>,
    confidence: f32,
    drowsiness: DrowsinessMonitor,
    failures: FailureTracker,
    last_mode: Option<Mode>,
    stats: StageStats,
}

impl SecondaryStage {
    pub fn new(
        input: FrameReader,
        output: FrameWriter,
        mode: ModeHandle,
        models: SecondaryModels,
        alerts: Arc<dyn AlertSink>,
        options: SecondaryOptions,
    ) -> Self {
        Self {
            input,
            output,
            mode,
            models,
            alerts,
            confidence: options.confidence,
            drowsiness: DrowsinessMonitor::new(options.ear_threshold, options.drowsy_frames),
            failures: FailureTracker::new(options.degraded_after),
            last_mode: None,
            stats: StageStats::new("secondary"),
        }
    }

    pub fn drowsy_counter(&self) -> u32 {
        self.drowsiness.counter()
    }

    /// Analyse one frame under the current mode and publish it.
    pub fn process(&mut self, mut frame: Frame) {
        let start = Instant::now();
        let mode = self.mode.current();
        if self.last_mode != Some(mode) {
            if self.last_mode.is_some() {
                debug!("secondary stage now in {} mode", mode);
            }
            self.drowsiness.reset();
            self.last_mode = Some(mode);
        }

        let outcome = match mode {
            Mode::Driver => self.driver_step(&frame),
            Mode::Cargo => self.cargo_step(&mut frame),
        };
        match outcome {
            Ok(()) => self.failures.success(),
            Err(e) => {
                debug!("{} analysis failed on frame {}: {}", mode, frame.sequence(), e);
                if self.failures.failure() {
                    warn!(
                        "⚠️ {} analysis failing for {} consecutive frames: {}",
                        mode,
                        self.failures.consecutive(),
                        e
                    );
                    raise(
                        self.alerts.as_ref(),
                        AlertCategory::DetectionDegraded,
                        format!("⚠️ DETECTION DEGRADED ({}): {}", mode.label(), e),
                    );
                }
            }
        }

        self.output.put(frame);
        self.stats.record(start.elapsed());
    }

    fn driver_step(&mut self, frame: &Frame) -> Result<(), DetectError> {
        let face = self.models.face.analyze(frame)?;
        let ear = face.map(|face| face.eye_aspect_ratio());
        if self.drowsiness.observe(ear) {
            warn!("😴 driver drowsy (EAR {:.3})", ear.unwrap_or_default());
            raise(self.alerts.as_ref(), AlertCategory::DriverDrowsy, DROWSY_MESSAGE);
        }
        Ok(())
    }

    /// Boxes and hands are independent: either one failing leaves the other's
    /// effect in place but still counts the frame as failed.
    fn cargo_step(&mut self, frame: &mut Frame) -> Result<(), DetectError> {
        // both see the unannotated frame
        let regions = self.models.detector.detect(frame, self.confidence);
        let hands = self.models.hands.analyze(frame);

        if let Ok(regions) = &regions {
            frame.annotate(regions, CARGO_BOX_COLOR);
        }
        if let Ok(hands) = &hands {
            if !hands.is_empty() {
                warn!("✋ {} hand(s) in cargo area", hands.len());
                raise(self.alerts.as_ref(), AlertCategory::CargoIntrusion, INTRUSION_MESSAGE);
            }
        }
        regions.and(hands).map(|_| ())
    }

    /// Consume until shutdown or until every writer is gone.
    pub fn run(mut self, shutdown: &Shutdown) {
        info!("🔍 secondary stage started in {} mode", self.mode.current());
        while !shutdown.is_triggered() {
            match self.input.get_timeout(POLL) {
                Ok(Some(frame)) => self.process(frame),
                Ok(None) => {}
                Err(LinkClosed) => {
                    debug!("secondary input closed");
                    break;
                }
            }
        }
        info!("🔍 secondary stage stopped after {} frames", self.stats.total());
    }
}
