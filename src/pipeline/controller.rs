// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 模式控制器 (Mode controller)
//!
//! Owns the secondary camera and the published mode. A switch replaces the
//! camera outright: the old source is stopped and its device released before
//! the mode is published and the new source is started.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::link::FrameWriter;
use super::mode::{Mode, ModeCell, ModeHandle};
use crate::alert::EventLog;
use crate::input::{CameraSource, CaptureContext, SourceStatus};

/// Physical camera index per mode.
#[derive(Debug, Clone, Copy)]
pub struct ModeCameras {
    pub driver: u32,
    pub cargo: u32,
}

impl ModeCameras {
    pub fn index_for(&self, mode: Mode) -> u32 {
        match mode {
            Mode::Driver => self.driver,
            Mode::Cargo => self.cargo,
        }
    }
}

pub struct ModeController {
    cell: Arc<ModeCell>,
    cameras: ModeCameras,
    writer: FrameWriter,
    capture: CaptureContext,
    event_log: Arc<EventLog>,
    // held for the whole switch; also owns the live secondary source
    active: Mutex<Option<CameraSource>>,
    generation: AtomicU64,
}

impl ModeController {
    /// A controller publishing `initial` with no secondary camera yet; call
    /// [`switch_to`](Self::switch_to) to bring one up.
    pub fn new(
        initial: Mode,
        cameras: ModeCameras,
        writer: FrameWriter,
        capture: CaptureContext,
        event_log: Arc<EventLog>,
    ) -> Self {
        Self {
            cell: Arc::new(ModeCell::new(initial)),
            cameras,
            writer,
            capture,
            event_log,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn current_mode(&self) -> Mode {
        self.cell.load()
    }

    /// Read-only view for stages and the dashboard.
    pub fn handle(&self) -> ModeHandle {
        ModeHandle::new(Arc::clone(&self.cell))
    }

    /// Status of the live secondary source, if any.
    pub fn secondary_status(&self) -> Option<Arc<SourceStatus>> {
        self.lock_active().as_ref().map(|source| source.status())
    }

    /// Replace the secondary camera with the one for `mode` and publish
    /// `mode`. Concurrent calls are serialized; the last one wins.
    pub fn switch_to(&self, mode: Mode) -> std::io::Result<()> {
        let mut active = self.lock_active();

        if let Some(mut old) = active.take() {
            old.stop();
        }
        self.writer.discard();
        let previous = self.cell.load();
        self.cell.store(mode);

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let mut source = CameraSource::new(
            mode.label(),
            self.cameras.index_for(mode),
            generation,
            self.writer.clone(),
            self.capture.clone(),
        );
        let started = source.start();
        *active = Some(source);

        info!("🔄 mode {} -> {} (camera {}, gen {})", previous, mode, self.cameras.index_for(mode), generation);
        self.event_log.record("SYSTEM", "MODE_CHANGE", mode.as_str());
        started
    }

    /// Stop the secondary camera. The published mode is left as is.
    pub fn shutdown(&self) {
        if let Some(mut source) = self.lock_active().take() {
            source.stop();
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, Option<CameraSource>> {
        self.active.lock().unwrap_or_else(|e| {
            warn!("mode controller lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertRecorder;
    use crate::input::{CaptureTiming, DeviceRegistry, ScriptedBackend, SourceState};
    use crate::pipeline::frame_link;
    use crate::frame::Frame;
    use image::Rgb;
    use std::time::{Duration, Instant};

    const CAMERAS: ModeCameras = ModeCameras { driver: 0, cargo: 2 };

    fn controller(backend: &Arc<ScriptedBackend>) -> (ModeController, crate::pipeline::FrameReader, Arc<DeviceRegistry>) {
        let (writer, reader) = frame_link();
        let registry = DeviceRegistry::new();
        let capture = CaptureContext {
            backend: backend.clone(),
            registry: registry.clone(),
            alerts: AlertRecorder::new(),
            timing: CaptureTiming {
                backoff: Duration::from_millis(20),
                yield_interval: Duration::from_millis(1),
            },
        };
        let controller =
            ModeController::new(Mode::Driver, CAMERAS, writer, capture, Arc::new(EventLog::disabled()));
        (controller, reader, registry)
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_switch_rebinds_camera() {
        let backend = ScriptedBackend::new();
        let (controller, reader, registry) = controller(&backend);

        controller.switch_to(Mode::Driver).unwrap();
        backend.push_pattern(0, 4, 4);
        assert!(reader.get_timeout(Duration::from_secs(5)).unwrap().is_some());

        controller.switch_to(Mode::Cargo).unwrap();
        assert_eq!(controller.current_mode(), Mode::Cargo);
        assert!(!registry.is_claimed(0));
        assert_eq!(backend.live_handles(0), 0);
        let status = controller.secondary_status().unwrap();
        assert_eq!(status.index(), 2);
        assert_eq!(status.name(), "CARGO");
        assert!(wait_for(|| status.state() == SourceState::Streaming));

        controller.shutdown();
        assert!(registry.claimed().is_empty());
    }

    #[test]
    fn test_switch_discards_old_camera_frame() {
        let backend = ScriptedBackend::new();
        let (controller, reader, _registry) = controller(&backend);
        controller.switch_to(Mode::Driver).unwrap();

        // an unread frame from the driver camera sits in the link
        controller.writer.put(Frame::filled(4, 4, Rgb([1, 1, 1]), 99));
        controller.switch_to(Mode::Cargo).unwrap();
        backend.push_pattern(2, 6, 6);

        let frame = reader.get_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(frame.dimensions(), (6, 6));
        controller.shutdown();
    }

    #[test]
    fn test_concurrent_switches_leave_one_bound_source() {
        let backend = ScriptedBackend::new();
        let (controller, _reader, registry) = controller(&backend);
        let controller = Arc::new(controller);
        controller.switch_to(Mode::Driver).unwrap();

        for round in 0..10 {
            let a = {
                let c = controller.clone();
                std::thread::spawn(move || c.switch_to(Mode::Cargo).unwrap())
            };
            let b = {
                let c = controller.clone();
                std::thread::spawn(move || c.switch_to(Mode::Driver).unwrap())
            };
            a.join().unwrap();
            b.join().unwrap();

            let mode = controller.current_mode();
            let status = controller.secondary_status().unwrap();
            assert_eq!(status.index(), CAMERAS.index_for(mode), "round {}", round);
            assert!(wait_for(|| registry.claimed() == vec![CAMERAS.index_for(mode)]));
        }

        assert_eq!(backend.max_live_handles(0), 1);
        assert_eq!(backend.max_live_handles(2), 1);
        controller.shutdown();
        assert!(registry.claimed().is_empty());
    }

    #[test]
    fn test_same_mode_switch_restarts_camera() {
        let backend = ScriptedBackend::new();
        let (controller, _reader, _registry) = controller(&backend);
        controller.switch_to(Mode::Driver).unwrap();
        let first = controller.secondary_status().unwrap();
        controller.switch_to(Mode::Driver).unwrap();
        let second = controller.secondary_status().unwrap();

        assert_eq!(first.state(), SourceState::Stopped);
        assert!(second.generation() > first.generation());
        assert_eq!(controller.current_mode(), Mode::Driver);
        controller.shutdown();
    }
}
