// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// ONNX Runtime 模型 (ONNX Runtime models)
///
/// - yolov8: 目标检测 (道路 / 货舱) 与手部检测
/// - face_mesh: 人脸网格 → 眼部关键点
pub mod face_mesh;
pub mod yolov8;

pub use face_mesh::FaceMesh;
pub use yolov8::{YoloDetector, YoloHands};

use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array, Ix4};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::info;

use crate::detection::DetectError;

/// One output tensor copied out of the session: dims and flat data.
pub type Tensor = (Vec<usize>, Vec<f32>);

/// A loaded ONNX model with a single image input.
pub struct OnnxSession {
    session: Session,
    input: String,
}

impl OnnxSession {
    pub fn load(path: &Path, threads: usize) -> Result<Self> {
        info!("📦 loading model {}", path.display());
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model {}", path.display()))?;
        let input = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("model has no inputs")?;
        Ok(Self { session, input })
    }

    /// Run one NCHW image tensor and copy out every output.
    pub fn run(&mut self, tensor: Array<f32, Ix4>) -> Result<Vec<Tensor>, DetectError> {
        let (n, c, h, w) = tensor.dim();
        let shape = [n, c, h, w];
        let (data, _) = tensor.into_raw_vec_and_offset();
        let input_value =
            ort::value::Value::from_array((shape.as_slice(), data.into_boxed_slice()))
                .map_err(inference)?;

        let outputs = self
            .session
            .run(ort::inputs![self.input.as_str() => input_value])
            .map_err(inference)?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let (dims, data) = outputs[i].try_extract_tensor::<f32>().map_err(inference)?;
            tensors.push((dims.iter().map(|&d| d.max(0) as usize).collect(), data.to_vec()));
        }
        Ok(tensors)
    }
}

fn inference(e: ort::Error) -> DetectError {
    DetectError::Inference(e.to_string())
}
