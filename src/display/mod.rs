// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 显示发布 (Display publishing)
//!
//! Each channel keeps only its latest JPEG. A pump thread per channel drains
//! the stage's display link, encodes, and swaps the slot; the HTTP handlers
//! read the slot and never touch the pipelines.

pub mod server;

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use image::ImageError;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::frame::Frame;
use crate::pipeline::{FrameReader, LinkClosed};
use crate::shutdown::Shutdown;

pub use server::{configure, spawn_dashboard, DashboardServer, DashboardState};

const POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Road,
    Secondary,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Road, Channel::Secondary];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Road => "road",
            Channel::Secondary => "secondary",
        }
    }
}

/// One encoded display frame.
#[derive(Debug, Clone)]
pub struct JpegFrame {
    /// Publish counter of the channel; unlike the camera sequence it keeps
    /// increasing across camera swaps.
    pub sequence: u64,
    pub source_sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub jpeg: Bytes,
}

#[derive(Default)]
struct Slot {
    latest: Option<JpegFrame>,
    published: u64,
}

pub struct DisplayPublisher {
    road: Mutex<Slot>,
    secondary: Mutex<Slot>,
    quality: u8,
}

impl DisplayPublisher {
    pub fn new(quality: u8) -> Arc<Self> {
        Arc::new(Self {
            road: Mutex::new(Slot::default()),
            secondary: Mutex::new(Slot::default()),
            quality,
        })
    }

    fn slot(&self, channel: Channel) -> std::sync::MutexGuard<'_, Slot> {
        let slot = match channel {
            Channel::Road => &self.road,
            Channel::Secondary => &self.secondary,
        };
        slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Encode `frame` and make it the channel's latest. Returns the publish
    /// sequence. On error the previous frame stays visible.
    pub fn publish(&self, channel: Channel, frame: &Frame) -> Result<u64, ImageError> {
        let jpeg = Bytes::from(frame.encode_jpeg(self.quality)?);
        let mut slot = self.slot(channel);
        slot.published += 1;
        let sequence = slot.published;
        slot.latest = Some(JpegFrame {
            sequence,
            source_sequence: frame.sequence(),
            captured_at: frame.captured_at(),
            jpeg,
        });
        Ok(sequence)
    }

    pub fn latest(&self, channel: Channel) -> Option<JpegFrame> {
        self.slot(channel).latest.clone()
    }

    /// Publish sequence of the latest frame, 0 before the first.
    pub fn published(&self, channel: Channel) -> u64 {
        self.slot(channel).published
    }

    /// Drain `reader` into `channel` on a dedicated thread until shutdown or
    /// until the link closes.
    pub fn spawn_pump(
        self: &Arc<Self>,
        channel: Channel,
        reader: FrameReader,
        shutdown: Shutdown,
    ) -> io::Result<JoinHandle<()>> {
        let publisher = Arc::clone(self);
        std::thread::Builder::new()
            .name(format!("{}-display", channel.as_str()))
            .spawn(move || {
                info!("🖥️ {} display pump started", channel.as_str());
                while !shutdown.is_triggered() {
                    match reader.get_timeout(POLL) {
                        Ok(Some(frame)) => {
                            if let Err(e) = publisher.publish(channel, &frame) {
                                warn!("{} frame {} not encoded: {}", channel.as_str(), frame.sequence(), e);
                            }
                        }
                        Ok(None) => {}
                        Err(LinkClosed) => break,
                    }
                }
                debug!("{} display pump exiting", channel.as_str());
            })
    }
}
