// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Process-wide stop signal for the long-running loops (stages, display
//! pumps, telemetry). Waiting on it is a sleep that ends early on trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    // dropped on trigger, which wakes every `wait`
    wake: Arc<Mutex<Option<Sender<()>>>>,
    woken: Receiver<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Mutex::new(Some(tx))),
            woken: rx,
        }
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
        self.wake.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Sleep up to `timeout`. Returns `false` once shutdown was triggered.
    pub fn wait(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        match self.woken.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => !self.is_triggered(),
            _ => false,
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
