// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型: 道路 / 货舱目标, 以及单类手部检测

use std::path::Path;

use anyhow::Result;

use super::OnnxSession;
use crate::detection::postprocess::{decode_yolov8, letterbox};
use crate::detection::{DetectError, HandLandmarker, HandLandmarks, ObjectDetector, Point2};
use crate::frame::{Frame, Region};

pub struct YoloDetector {
    session: OnnxSession,
    size: u32,
    iou: f32,
    classes: Option<Vec<u32>>,
}

impl YoloDetector {
    pub fn load(path: &Path, size: u32, iou: f32, threads: usize) -> Result<Self> {
        Ok(Self {
            session: OnnxSession::load(path, threads)?,
            size,
            iou,
            classes: None,
        })
    }

    /// Only report these class ids.
    pub fn with_classes(mut self, classes: Vec<u32>) -> Self {
        self.classes = Some(classes);
        self
    }
}

impl ObjectDetector for YoloDetector {
    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Region>, DetectError> {
        let (w, h) = frame.dimensions();
        if w == 0 || h == 0 {
            return Err(DetectError::InvalidFrame(format!("{}x{}", w, h)));
        }
        let (tensor, ratio) = letterbox(frame.image(), self.size);
        let outputs = self.session.run(tensor)?;
        let (dims, data) = outputs
            .first()
            .ok_or_else(|| DetectError::Inference("model produced no output".into()))?;
        decode_yolov8(
            data,
            dims,
            ratio,
            (w, h),
            confidence,
            self.iou,
            self.classes.as_deref(),
        )
    }
}

/// Hand presence from a single-class YOLOv8 model. Each box becomes a hand
/// whose points are the box corners, normalized to the frame.
pub struct YoloHands {
    detector: YoloDetector,
    confidence: f32,
}

impl YoloHands {
    pub fn new(detector: YoloDetector, confidence: f32) -> Self {
        Self {
            detector,
            confidence,
        }
    }
}

impl HandLandmarker for YoloHands {
    fn analyze(&mut self, frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
        let (w, h) = frame.dimensions();
        let (w, h) = (w as f32, h as f32);
        let hands = self
            .detector
            .detect(frame, self.confidence)?
            .into_iter()
            .map(|r| HandLandmarks {
                points: vec![
                    Point2::new(r.x1 / w, r.y1 / h),
                    Point2::new(r.x2 / w, r.y1 / h),
                    Point2::new(r.x2 / w, r.y2 / h),
                    Point2::new(r.x1 / w, r.y2 / h),
                ],
            })
            .collect();
        Ok(hands)
    }
}
