// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测能力 (Detection capabilities)
///
/// The pipelines treat inference as an opaque call on the stage's own thread:
/// - ObjectDetector: frame → boxes (road + cargo)
/// - FaceLandmarker: frame → eye landmarks (driver drowsiness)
/// - HandLandmarker: frame → hands (cargo intrusion)
///
/// ONNX implementations live in `crate::models` behind the `onnx` feature.
pub mod postprocess;
pub mod types;

pub use types::{EyeLandmarks, FaceLandmarks, HandLandmarks, Point2};

use crate::frame::{Frame, Region};

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    /// The capability cannot be invoked at all (no model, no runtime).
    #[error("detection unavailable: {0}")]
    Unavailable(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Region>, DetectError>;
}

pub trait FaceLandmarker: Send {
    /// `None` when no face is visible.
    fn analyze(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectError>;
}

pub trait HandLandmarker: Send {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError>;
}

/// Stand-in for a capability that could not be loaded. Every call fails with
/// [`DetectError::Unavailable`], which the stages treat per their policy.
#[derive(Debug, Clone)]
pub struct MissingModel {
    what: String,
}

impl MissingModel {
    pub fn new(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }

    fn error(&self) -> DetectError {
        DetectError::Unavailable(self.what.clone())
    }
}

impl ObjectDetector for MissingModel {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> Result<Vec<Region>, DetectError> {
        Err(self.error())
    }
}

impl FaceLandmarker for MissingModel {
    fn analyze(&mut self, _frame: &Frame) -> Result<Option<FaceLandmarks>, DetectError> {
        Err(self.error())
    }
}

impl HandLandmarker for MissingModel {
    fn analyze(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
        Err(self.error())
    }
}
