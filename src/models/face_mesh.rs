// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 人脸网格 (Face mesh): 468 个关键点, 只取双眼各 6 点

use std::path::Path;

use anyhow::Result;

use super::OnnxSession;
use crate::detection::postprocess::{face_from_mesh, sigmoid, stretch};
use crate::detection::{DetectError, FaceLandmarker, FaceLandmarks};
use crate::frame::Frame;

const MESH_INPUT: u32 = 192;
const PRESENCE_THRESHOLD: f32 = 0.5;

/// Face landmark model fed with the whole frame. The first output is the
/// flat mesh; a second output, when present, is the face-presence logit.
pub struct FaceMesh {
    session: OnnxSession,
}

impl FaceMesh {
    pub fn load(path: &Path, threads: usize) -> Result<Self> {
        Ok(Self {
            session: OnnxSession::load(path, threads)?,
        })
    }
}

impl FaceLandmarker for FaceMesh {
    fn analyze(&mut self, frame: &Frame) -> Result<Option<FaceLandmarks>, DetectError> {
        let outputs = self.session.run(stretch(frame.image(), MESH_INPUT))?;
        let mut outputs = outputs.into_iter();
        let (_, mesh) = outputs
            .next()
            .ok_or_else(|| DetectError::Inference("face model produced no output".into()))?;

        if let Some((_, flag)) = outputs.next() {
            let present = flag.first().map(|&logit| sigmoid(logit)).unwrap_or(0.0);
            if present < PRESENCE_THRESHOLD {
                return Ok(None);
            }
        }
        face_from_mesh(&mesh, MESH_INPUT).map(Some)
    }
}
