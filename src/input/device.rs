// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Camera backends and exclusive ownership of physical camera indices.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use image::RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera {0} is bound by another source")]
    Busy(u32),

    #[error("failed to open camera {index}: {reason}")]
    OpenFailed { index: u32, reason: String },

    #[error("failed to read frame: {0}")]
    ReadFailed(String),

    #[error("camera backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// An opened camera. Dropping it releases the hardware.
///
/// Devices are opened, read and dropped on their source's own thread, so
/// they need not be `Send`.
pub trait CameraDevice {
    /// Next frame, `Ok(None)` when nothing arrived in time. An error means the
    /// handle is no longer usable.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError>;
}

/// Opens cameras by physical index.
pub trait CameraBackend: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, index: u32) -> Result<Box<dyn CameraDevice>, CaptureError>;
}

/// Which physical indices are currently bound.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    claimed: Mutex<BTreeSet<u32>>,
}

impl DeviceRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reserve `index`, failing with [`CaptureError::Busy`] if it is taken.
    pub fn claim(self: &Arc<Self>, index: u32) -> Result<DeviceClaim, CaptureError> {
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        if !claimed.insert(index) {
            return Err(CaptureError::Busy(index));
        }
        Ok(DeviceClaim {
            registry: Arc::clone(self),
            index,
        })
    }

    pub fn is_claimed(&self, index: u32) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&index)
    }

    pub fn claimed(&self) -> Vec<u32> {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    fn release(&self, index: u32) {
        self.claimed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&index);
    }
}

/// Reservation of one index; released on drop.
#[derive(Debug)]
pub struct DeviceClaim {
    registry: Arc<DeviceRegistry>,
    index: u32,
}

impl DeviceClaim {
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        self.registry.release(self.index);
    }
}

/// A claimed and opened camera.
pub struct BoundCamera {
    // field order matters: the device is closed before the claim is released
    device: Box<dyn CameraDevice>,
    claim: DeviceClaim,
}

impl BoundCamera {
    /// Claim `index` in `registry`, then open it through `backend`.
    pub fn open(
        backend: &dyn CameraBackend,
        registry: &Arc<DeviceRegistry>,
        index: u32,
    ) -> Result<Self, CaptureError> {
        let claim = registry.claim(index)?;
        let device = backend.open(index)?;
        Ok(Self { device, claim })
    }

    pub fn index(&self) -> u32 {
        self.claim.index()
    }

    pub fn read_frame(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        self.device.read_frame()
    }
}
