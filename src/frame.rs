// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frames and the few pixel operations the pipelines need (box overlay, JPEG).

use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Road detections are outlined in green.
pub const ROAD_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Cargo detections are outlined in blue.
pub const CARGO_BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const BOX_THICKNESS: u32 = 2;

/// One captured RGB picture plus where it sits in its source's timeline.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: DateTime<Utc>,
    sequence: u64,
}

impl Frame {
    /// Wrap an image captured right now.
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self::with_timestamp(image, Utc::now(), sequence)
    }

    pub fn with_timestamp(image: RgbImage, captured_at: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            image,
            captured_at,
            sequence,
        }
    }

    /// Solid-colour frame, handy for synthetic sources.
    pub fn filled(width: u32, height: u32, color: Rgb<u8>, sequence: u64) -> Self {
        Self::new(RgbImage::from_pixel(width, height, color), sequence)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Outline every region on the frame. Regions are clamped to the frame;
    /// ones that collapse to nothing are skipped.
    pub fn annotate(&mut self, regions: &[Region], color: Rgb<u8>) {
        let (w, h) = self.dimensions();
        for region in regions {
            let Some((x, y, rw, rh)) = region.clamped(w, h) else {
                continue;
            };
            for inset in 0..BOX_THICKNESS {
                if rw <= inset * 2 || rh <= inset * 2 {
                    break;
                }
                let rect = Rect::at((x + inset) as i32, (y + inset) as i32)
                    .of_size(rw - inset * 2, rh - inset * 2);
                draw_hollow_rect_mut(&mut self.image, rect, color);
            }
        }
    }

    /// Encode for the MJPEG streams.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ImageError> {
        let mut buf = Vec::with_capacity((self.width() * self.height() / 4) as usize);
        let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
        encoder.encode_image(&self.image)?;
        Ok(buf)
    }
}

/// Axis-aligned detection box in pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Region {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: 1.0,
            class_id: 0,
        }
    }

    pub fn with_score(mut self, class_id: u32, confidence: f32) -> Self {
        self.class_id = class_id;
        self.confidence = confidence;
        self
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &Region) -> f32 {
        let l = self.x1.max(other.x1);
        let r = self.x2.min(other.x2);
        let t = self.y1.max(other.y1);
        let b = self.y2.min(other.y2);
        let inter = (r - l).max(0.0) * (b - t).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer (x, y, w, h) inside a `width` x `height` frame.
    fn clamped(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let x1 = self.x1.min(self.x2).max(0.0) as u32;
        let y1 = self.y1.min(self.y2).max(0.0) as u32;
        let x2 = (self.x1.max(self.x2).max(0.0) as u32).min(width - 1);
        let y2 = (self.y1.max(self.y2).max(0.0) as u32).min(height - 1);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some((x1, y1, x2 - x1 + 1, y2 - y1 + 1))
    }
}
