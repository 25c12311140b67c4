// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 道路检测 (Road stage)
//! 职责: 读取道路摄像头帧 → 目标检测 → 绿框标注 → 发布到显示链路

use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::link::{FrameReader, FrameWriter, LinkClosed};
use super::stats::StageStats;
use crate::detection::{DetectError, ObjectDetector};
use crate::frame::{Frame, ROAD_BOX_COLOR};
use crate::shutdown::Shutdown;

const POLL: Duration = Duration::from_millis(100);

pub struct RoadStage {
    input: FrameReader,
    output: FrameWriter,
    detector: Box<dyn ObjectDetector>,
    confidence: f32,
    stats: StageStats,
}

impl RoadStage {
    pub fn new(
        input: FrameReader,
        output: FrameWriter,
        detector: Box<dyn ObjectDetector>,
        confidence: f32,
    ) -> Self {
        Self {
            input,
            output,
            detector,
            confidence,
            stats: StageStats::new("road"),
        }
    }

    /// Detect, outline and publish one frame. Returns the number of regions.
    pub fn process(&mut self, mut frame: Frame) -> Result<usize, DetectError> {
        let start = Instant::now();
        let regions = self.detector.detect(&frame, self.confidence)?;
        frame.annotate(&regions, ROAD_BOX_COLOR);
        self.output.put(frame);
        self.stats.record(start.elapsed());
        Ok(regions.len())
    }

    /// Consume until shutdown or until every writer is gone. A detection
    /// error ends the loop and is handed back to the caller.
    pub fn run(mut self, shutdown: &Shutdown) -> Result<(), DetectError> {
        info!("🔍 road stage started (conf {:.2})", self.confidence);
        while !shutdown.is_triggered() {
            match self.input.get_timeout(POLL) {
                Ok(Some(frame)) => {
                    self.process(frame)?;
                }
                Ok(None) => {}
                Err(LinkClosed) => {
                    debug!("road input closed");
                    break;
                }
            }
        }
        info!("🔍 road stage stopped after {} frames", self.stats.total());
        Ok(())
    }
}
