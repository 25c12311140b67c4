// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Webcam capture using nokhwa.

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

use super::device::{CameraBackend, CameraDevice, CaptureError};

#[derive(Debug, Default)]
pub struct WebcamBackend;

impl WebcamBackend {
    pub fn new() -> Self {
        Self
    }

    /// List available webcam devices.
    pub fn list_devices() -> Result<Vec<String>, CaptureError> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| CaptureError::BackendUnavailable(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }
}

impl CameraBackend for WebcamBackend {
    fn name(&self) -> &str {
        "webcam"
    }

    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError> {
        let open_failed = |e: nokhwa::NokhwaError| CaptureError::OpenFailed {
            index,
            reason: e.to_string(),
        };
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(open_failed)?;
        camera.open_stream().map_err(open_failed)?;

        let resolution = camera.resolution();
        info!(
            "Webcam {} opened: {}x{} @ {} fps",
            index,
            resolution.width(),
            resolution.height(),
            camera.frame_rate()
        );
        Ok(Box::new(Webcam {
            camera,
            index,
            frame_count: 0,
        }))
    }
}

struct Webcam {
    camera: Camera,
    index: u32,
    frame_count: u64,
}

impl CameraDevice for Webcam {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let frame = self
            .camera
            .frame()
            .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;
        let decoded = frame
            .decode_image::<RgbFormat>()
            .map_err(|e| CaptureError::ReadFailed(e.to_string()))?;

        // nokhwa builds against its own `image`, so hand the raw buffer over
        let (width, height) = (decoded.width(), decoded.height());
        let rgb_image = RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| CaptureError::ReadFailed("Failed to create RGB image".to_string()))?;

        self.frame_count += 1;
        Ok(Some(rgb_image))
    }
}

impl Drop for Webcam {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            warn!("Webcam {} stop failed: {}", self.index, e);
        }
        debug!("Webcam {} released after {} frames", self.index, self.frame_count);
    }
}
