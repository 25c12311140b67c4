// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Camera backend fed by hand: frames and failures are pushed per index and
//! handed out by whichever device currently has that index open. Used for
//! replaying recorded frames and by the tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use image::{Rgb, RgbImage};

use super::device::{CameraBackend, CameraDevice, CaptureError};

enum Feed {
    Frame(RgbImage),
    Failure,
}

#[derive(Default)]
struct Script {
    feeds: HashMap<u32, (Sender<Feed>, Receiver<Feed>)>,
    unavailable: HashSet<u32>,
    open_attempts: HashMap<u32, usize>,
    live: HashMap<u32, usize>,
    max_live: HashMap<u32, usize>,
}

impl Script {
    fn feed(&mut self, index: u32) -> &(Sender<Feed>, Receiver<Feed>) {
        self.feeds
            .entry(index)
            .or_insert_with(crossbeam_channel::unbounded)
    }
}

pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
    poll: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Self::with_poll(Duration::from_millis(20))
    }

    /// `poll` bounds how long a read waits for a pushed frame.
    pub fn with_poll(poll: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(Mutex::new(Script::default())),
            poll,
        })
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_frame(&self, index: u32, image: RgbImage) {
        let _ = self.script().feed(index).0.send(Feed::Frame(image));
    }

    /// Push a `width` x `height` gradient frame.
    pub fn push_pattern(&self, index: u32, width: u32, height: u32) {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 128])
        });
        self.push_frame(index, image);
    }

    /// The next read on `index` fails, which also invalidates the handle.
    pub fn push_failure(&self, index: u32) {
        let _ = self.script().feed(index).0.send(Feed::Failure);
    }

    /// While unavailable, opening `index` fails.
    pub fn set_available(&self, index: u32, available: bool) {
        let mut script = self.script();
        if available {
            script.unavailable.remove(&index);
        } else {
            script.unavailable.insert(index);
        }
    }

    pub fn open_attempts(&self, index: u32) -> usize {
        self.script().open_attempts.get(&index).copied().unwrap_or(0)
    }

    /// Devices on `index` opened and not yet dropped.
    pub fn live_handles(&self, index: u32) -> usize {
        self.script().live.get(&index).copied().unwrap_or(0)
    }

    pub fn max_live_handles(&self, index: u32) -> usize {
        self.script().max_live.get(&index).copied().unwrap_or(0)
    }
}

impl CameraBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        let mut script = self.script();
        *script.open_attempts.entry(index).or_default() += 1;
        if script.unavailable.contains(&index) {
            return Err(CaptureError::OpenFailed {
                index,
                reason: "device unavailable".into(),
            });
        }
        let feed = script.feed(index).1.clone();
        let live = script.live.entry(index).or_default();
        *live += 1;
        let live = *live;
        let max = script.max_live.entry(index).or_default();
        *max = (*max).max(live);

        Ok(Box::new(ScriptedDevice {
            index,
            feed,
            script: Arc::clone(&self.script),
            poll: self.poll,
        }))
    }
}

struct ScriptedDevice {
    index: u32,
    feed: Receiver<Feed>,
    script: Arc<Mutex<Script>>,
    poll: Duration,
}

impl CameraDevice for ScriptedDevice {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        match self.feed.recv_timeout(self.poll) {
            Ok(Feed::Frame(image)) => Ok(Some(image)),
            Ok(Feed::Failure) => Err(CaptureError::ReadFailed(format!(
                "scripted failure on camera {}",
                self.index
            ))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(CaptureError::ReadFailed("feed closed".into()))
            }
        }
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(live) = script.live.get_mut(&self.index) {
            *live = live.saturating_sub(1);
        }
    }
}
