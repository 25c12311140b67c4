// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Test-pattern cameras for running the dashboard without hardware.

use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use super::device::{CameraBackend, CameraDevice, CaptureError};

pub struct SyntheticBackend {
    width: u32,
    height: u32,
    frame_interval: Duration,
}

impl SyntheticBackend {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_interval: Duration::from_secs(1) / fps.max(1),
        }
    }
}

impl CameraBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        Ok(Box::new(SyntheticCamera {
            index,
            width: self.width,
            height: self.height,
            frame_interval: self.frame_interval,
            next_due: Instant::now(),
            tick: 0,
        }))
    }
}

struct SyntheticCamera {
    index: u32,
    width: u32,
    height: u32,
    frame_interval: Duration,
    next_due: Instant,
    tick: u32,
}

impl SyntheticCamera {
    /// Diagonal colour bands drifting one step per frame, tinted per camera.
    fn render(&self) -> RgbImage {
        let tint = (self.index.wrapping_mul(85) % 256) as u8;
        let shift = self.tick.wrapping_mul(4);
        let bar = self.tick % self.width;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x == bar {
                return Rgb([255, 255, 255]);
            }
            let band = (x + y + shift) % 64;
            Rgb([(band * 4) as u8, tint, (255 - band * 4) as u8])
        })
    }
}

impl CameraDevice for SyntheticCamera {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let now = Instant::now();
        if now < self.next_due {
            std::thread::sleep(self.next_due - now);
        }
        self.next_due = Instant::now() + self.frame_interval;
        let image = self.render();
        self.tick = self.tick.wrapping_add(1);
        Ok(Some(image))
    }
}
