// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 摄像头源 (Camera source)
//!
//! One production thread per physical camera. The thread owns the device
//! handle from acquisition to release and feeds a [`FrameWriter`].
//!
//! ```text
//! Initializing ──open ok──▶ Streaming ──read error──▶ Disconnected
//!      ▲                                                   │
//!      └──────────────────── backoff ──────────────────────┘
//!            any state ──stop()──▶ Stopped
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::device::{BoundCamera, CameraBackend, DeviceRegistry};
use crate::alert::{raise, AlertCategory, AlertSink};
use crate::frame::Frame;
use crate::pipeline::FrameWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Initializing,
    Streaming,
    Disconnected,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct CaptureTiming {
    /// Wait between a failure and the next acquisition attempt.
    pub backoff: Duration,
    /// Pause after each delivered frame.
    pub yield_interval: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            backoff: Duration::from_millis(1000),
            yield_interval: Duration::from_millis(10),
        }
    }
}

/// Everything a source needs besides its own identity and output link.
#[derive(Clone)]
pub struct CaptureContext {
    pub backend: Arc<dyn CameraBackend>,
    pub registry: Arc<DeviceRegistry>,
    pub alerts: Arc<dyn AlertSink>,
    pub timing: CaptureTiming,
}

/// Live view of a source, shared with its production thread.
#[derive(Debug)]
pub struct SourceStatus {
    name: String,
    index: u32,
    generation: u64,
    state: Mutex<SourceState>,
    frames: AtomicU64,
    failure_episodes: AtomicU64,
}

impl SourceStatus {
    fn new(name: &str, index: u32, generation: u64) -> Self {
        Self {
            name: name.to_string(),
            index,
            generation,
            state: Mutex::new(SourceState::Initializing),
            frames: AtomicU64::new(0),
            failure_episodes: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> SourceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn failure_episodes(&self) -> u64 {
        self.failure_episodes.load(Ordering::Relaxed)
    }

    fn set_state(&self, next: SourceState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!("📷 {} (gen {}): {:?} -> {:?}", self.name, self.generation, *state, next);
            *state = next;
        }
    }
}

pub struct CameraSource {
    status: Arc<SourceStatus>,
    context: CaptureContext,
    output: FrameWriter,
    running: Arc<AtomicBool>,
    // dropping the sender wakes every stop-interruptible wait in the thread
    stop_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
    stopped: bool,
}

impl CameraSource {
    /// A source for camera `index`, named `name` in logs and alerts.
    /// `generation` distinguishes successive sources on the same link.
    pub fn new(
        name: &str,
        index: u32,
        generation: u64,
        output: FrameWriter,
        context: CaptureContext,
    ) -> Self {
        Self {
            status: Arc::new(SourceStatus::new(name, index, generation)),
            context,
            output,
            running: Arc::new(AtomicBool::new(false)),
            stop_tx: None,
            worker: None,
            stopped: false,
        }
    }

    pub fn name(&self) -> &str {
        self.status.name()
    }

    pub fn index(&self) -> u32 {
        self.status.index()
    }

    pub fn state(&self) -> SourceState {
        self.status.state()
    }

    pub fn status(&self) -> Arc<SourceStatus> {
        Arc::clone(&self.status)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the production thread. No-op when already running or stopped.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.stopped {
            warn!("📷 {} was stopped, start ignored", self.name());
            return Ok(());
        }
        if self.worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        self.running.store(true, Ordering::Release);
        let production = Production {
            status: Arc::clone(&self.status),
            context: self.context.clone(),
            output: self.output.clone(),
            running: Arc::clone(&self.running),
            stop_rx,
        };
        let thread_name = format!("{}-camera", self.name().to_lowercase());
        match std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || production.run())
        {
            Ok(worker) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Halt the production thread and release the camera. Returns once the
    /// device has been closed and its index is free again. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        self.stop_tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("📷 {} production thread panicked", self.name());
            }
        }
        if !self.stopped {
            self.stopped = true;
            self.status.set_state(SourceState::Stopped);
            info!("📷 {} camera (index {}) stopped", self.name(), self.index());
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State owned by the production thread.
struct Production {
    status: Arc<SourceStatus>,
    context: CaptureContext,
    output: FrameWriter,
    running: Arc<AtomicBool>,
    stop_rx: Receiver<()>,
}

impl Production {
    fn run(self) {
        let name = self.status.name().to_string();
        let index = self.status.index();
        info!(
            "📷 {} camera (index {}, gen {}) starting on {}",
            name,
            index,
            self.status.generation(),
            self.context.backend.name()
        );

        let mut camera: Option<BoundCamera> = None;
        let mut in_episode = false;
        let mut sequence = 0u64;

        while self.running.load(Ordering::Acquire) {
            let read = match camera.as_mut() {
                Some(bound) => bound.read_frame(),
                None => {
                    self.status.set_state(SourceState::Initializing);
                    match BoundCamera::open(self.context.backend.as_ref(), &self.context.registry, index) {
                        Ok(bound) => {
                            info!("✅ {} camera (index {}) streaming", name, index);
                            camera = Some(bound);
                            self.status.set_state(SourceState::Streaming);
                        }
                        Err(e) => {
                            self.fail(&mut in_episode, &e.to_string());
                            if !self.wait(self.context.timing.backoff) {
                                break;
                            }
                        }
                    }
                    continue;
                }
            };

            match read {
                Ok(Some(image)) => {
                    if in_episode {
                        info!("✅ {} camera recovered", name);
                        in_episode = false;
                    }
                    sequence += 1;
                    self.output.put(Frame::new(image, sequence));
                    self.status.frames.fetch_add(1, Ordering::Relaxed);
                    if !self.wait(self.context.timing.yield_interval) {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // release before backing off so the index is free while we wait
                    camera = None;
                    self.fail(&mut in_episode, &e.to_string());
                    if !self.wait(self.context.timing.backoff) {
                        break;
                    }
                }
            }
        }

        drop(camera);
        self.status.set_state(SourceState::Stopped);
        debug!("📷 {} production loop exited", name);
    }

    fn fail(&self, in_episode: &mut bool, reason: &str) {
        self.status.set_state(SourceState::Disconnected);
        if *in_episode {
            debug!("📷 {} still unavailable: {}", self.status.name(), reason);
            return;
        }
        *in_episode = true;
        self.status.failure_episodes.fetch_add(1, Ordering::Relaxed);
        warn!("⚠️ {} camera (index {}) failed: {}", self.status.name(), self.status.index(), reason);
        raise(
            self.context.alerts.as_ref(),
            AlertCategory::CameraFail,
            format!("{} CAMERA FAIL", self.status.name().to_uppercase()),
        );
    }

    /// Sleep for `timeout` unless stopped first. Returns `false` on stop.
    fn wait(&self, timeout: Duration) -> bool {
        match self.stop_rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.running.load(Ordering::Acquire),
            _ => false,
        }
    }
}
