// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Alert fan-out.
//!
//! Producers (stages, cameras, the mode controller, telemetry) hand an
//! [`AlertEvent`] to an [`AlertSink`]. The [`AlertGateway`] sink only enqueues;
//! a dispatcher thread pushes each event through every configured
//! [`AlertTransport`] and swallows whatever they fail with.

pub mod event_log;
pub mod modem;
pub mod telegram;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

pub use event_log::EventLog;
pub use modem::{Modem, SmsNotifier};
pub use telegram::TelegramNotifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    CameraFail,
    DriverDrowsy,
    CargoIntrusion,
    DetectionDegraded,
    HighVibration,
    DoorOpen,
    Modem,
    System,
}

impl AlertCategory {
    pub fn label(self) -> &'static str {
        match self {
            AlertCategory::CameraFail => "CAMERA FAIL",
            AlertCategory::DriverDrowsy => "DRIVER DROWSY",
            AlertCategory::CargoIntrusion => "UNAUTHORIZED CARGO ACCESS",
            AlertCategory::DetectionDegraded => "DETECTION DEGRADED",
            AlertCategory::HighVibration => "HIGH VIBRATION",
            AlertCategory::DoorOpen => "DOOR OPEN",
            AlertCategory::Modem => "MODEM",
            AlertCategory::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertEvent {
    pub timestamp: DateTime<Utc>,
    pub category: AlertCategory,
    pub message: String,
}

impl AlertEvent {
    pub fn new(category: AlertCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            message: message.into(),
        }
    }
}

/// Anything alerts can be raised into. Must never block the caller for long
/// and must never fail.
pub trait AlertSink: Send + Sync {
    fn send(&self, event: AlertEvent);

    fn raise(&self, category: AlertCategory, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.send(AlertEvent::new(category, message));
    }
}

impl<T: AlertSink + ?Sized> AlertSink for Arc<T> {
    fn send(&self, event: AlertEvent) {
        (**self).send(event)
    }
}

/// Raise through a trait object.
pub fn raise(sink: &dyn AlertSink, category: AlertCategory, message: impl Into<String>) {
    sink.send(AlertEvent::new(category, message));
}

/// One outbound delivery channel (chat bot, SMS, event log...).
pub trait AlertTransport: Send + Sync {
    fn name(&self) -> &str;

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()>;
}

impl<T: AlertTransport + ?Sized> AlertTransport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        (**self).deliver(event)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    /// Pending alerts beyond this are dropped.
    pub queue_capacity: usize,
    /// Minimum spacing between two alerts of the same category. Zero disables it.
    pub cooldown: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            cooldown: Duration::ZERO,
        }
    }
}

enum Dispatch {
    Alert(AlertEvent),
    Shutdown,
}

/// Enqueue-only front of the alert transports.
pub struct AlertGateway {
    tx: Sender<Dispatch>,
    cooldown: Duration,
    last_sent: Mutex<HashMap<AlertCategory, Instant>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AlertGateway {
    /// Start the dispatcher thread over `transports`.
    pub fn spawn(
        transports: Vec<Box<dyn AlertTransport>>,
        options: GatewayOptions,
    ) -> anyhow::Result<Arc<Self>> {
        let (tx, rx) = crossbeam_channel::bounded(options.queue_capacity.max(1));
        let names: Vec<String> = transports.iter().map(|t| t.name().to_string()).collect();
        info!("📣 alert gateway up, transports: [{}]", names.join(", "));

        let worker = std::thread::Builder::new()
            .name("alert-dispatch".into())
            .spawn(move || dispatch_loop(rx, transports))?;

        Ok(Arc::new(Self {
            tx,
            cooldown: options.cooldown,
            last_sent: Mutex::new(HashMap::new()),
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// Flush what is queued and stop the dispatcher. Idempotent.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            let _ = self.tx.send(Dispatch::Shutdown);
            let _ = worker.join();
        }
    }

    /// Enqueue unless the category is cooling down. The cooldown only starts
    /// once an alert is actually queued, so a drop on a full queue does not
    /// silence the category.
    fn enqueue(&self, event: AlertEvent) {
        let mut last = self.last_sent.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if !self.cooldown.is_zero() {
            if let Some(prev) = last.get(&event.category) {
                if now.duration_since(*prev) < self.cooldown {
                    debug!("alert suppressed by cooldown: {}", event.message);
                    return;
                }
            }
        }
        let category = event.category;
        match self.tx.try_send(Dispatch::Alert(event)) {
            Ok(()) => {
                if !self.cooldown.is_zero() {
                    last.insert(category, now);
                }
            }
            Err(TrySendError::Full(Dispatch::Alert(event))) => {
                warn!("alert queue full, dropping: {}", event.message);
            }
            Err(_) => debug!("alert gateway stopped, dropping alert"),
        }
    }
}

impl AlertSink for AlertGateway {
    fn send(&self, event: AlertEvent) {
        self.enqueue(event);
    }
}

impl Drop for AlertGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(rx: Receiver<Dispatch>, transports: Vec<Box<dyn AlertTransport>>) {
    while let Ok(Dispatch::Alert(event)) = rx.recv() {
        info!("🚨 [{}] {}", event.category.label(), event.message);
        for transport in &transports {
            if let Err(e) = transport.deliver(&event) {
                warn!("{} delivery failed: {:#}", transport.name(), e);
            }
        }
    }
    debug!("alert dispatcher exiting");
}

/// Sink that only remembers what it was given. Used when embedding the
/// pipelines without transports, and by tests.
#[derive(Default)]
pub struct AlertRecorder {
    events: Mutex<Vec<AlertEvent>>,
}

impl AlertRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, category: AlertCategory) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.category == category)
            .count()
    }
}

impl AlertSink for AlertRecorder {
    fn send(&self, event: AlertEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        delivered: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AlertTransport for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn deliver(&self, _event: &AlertEvent) -> anyhow::Result<()> {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("transport down");
            }
            Ok(())
        }
    }

    #[test]
    fn test_gateway_fans_out_and_swallows_failures() {
        let ok = Arc::new(AtomicUsize::new(0));
        let broken = Arc::new(AtomicUsize::new(0));
        let gateway = AlertGateway::spawn(
            vec![
                Box::new(Counting {
                    delivered: broken.clone(),
                    fail: true,
                }),
                Box::new(Counting {
                    delivered: ok.clone(),
                    fail: false,
                }),
            ],
            GatewayOptions::default(),
        )
        .unwrap();

        gateway.raise(AlertCategory::DoorOpen, "⚠️ DOOR OPEN");
        gateway.raise(AlertCategory::HighVibration, "⚠️ HIGH VIBRATION");
        gateway.shutdown();

        assert_eq!(ok.load(Ordering::SeqCst), 2);
        assert_eq!(broken.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cooldown_limits_per_category() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let gateway = AlertGateway::spawn(
            vec![Box::new(Counting {
                delivered: delivered.clone(),
                fail: false,
            })],
            GatewayOptions {
                queue_capacity: 16,
                cooldown: Duration::from_secs(60),
            },
        )
        .unwrap();

        for _ in 0..5 {
            gateway.raise(AlertCategory::CargoIntrusion, "hand");
        }
        gateway.raise(AlertCategory::DoorOpen, "door");
        gateway.shutdown();

        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    /// Signals when a delivery starts, then blocks until `release` closes.
    struct Gated {
        started: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
        delivered: Arc<Mutex<Vec<AlertCategory>>>,
    }

    impl AlertTransport for Gated {
        fn name(&self) -> &str {
            "gated"
        }

        fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
            self.delivered.lock().unwrap().push(event.category);
            let _ = self.started.send(());
            let _ = self.release.recv();
            Ok(())
        }
    }

    #[test]
    fn test_alert_dropped_on_full_queue_does_not_start_cooldown() {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let gateway = AlertGateway::spawn(
            vec![Box::new(Gated {
                started: started_tx,
                release: release_rx,
                delivered: delivered.clone(),
            })],
            GatewayOptions {
                queue_capacity: 1,
                cooldown: Duration::from_secs(60),
            },
        )
        .unwrap();

        // dispatcher busy with the first, queue holds the second
        gateway.raise(AlertCategory::DoorOpen, "door");
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        gateway.raise(AlertCategory::HighVibration, "vibration");
        gateway.raise(AlertCategory::CargoIntrusion, "dropped");

        drop(release_tx);
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        gateway.raise(AlertCategory::CargoIntrusion, "retried");
        gateway.shutdown();

        assert_eq!(
            *delivered.lock().unwrap(),
            vec![
                AlertCategory::DoorOpen,
                AlertCategory::HighVibration,
                AlertCategory::CargoIntrusion
            ]
        );
    }

    #[test]
    fn test_send_after_shutdown_is_harmless() {
        let gateway = AlertGateway::spawn(Vec::new(), GatewayOptions::default()).unwrap();
        gateway.shutdown();
        gateway.raise(AlertCategory::System, "late");
        gateway.shutdown();
    }

    #[test]
    fn test_recorder_counts_by_category() {
        let recorder = AlertRecorder::new();
        raise(recorder.as_ref(), AlertCategory::DriverDrowsy, "a");
        recorder.raise(AlertCategory::DriverDrowsy, "b");
        recorder.raise(AlertCategory::CameraFail, "c");
        assert_eq!(recorder.count(AlertCategory::DriverDrowsy), 2);
        assert_eq!(recorder.events().len(), 3);
    }
}
