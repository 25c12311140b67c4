// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频处理流水线 (Video Processing Pipeline)
///
/// 每条流水线: CameraSource → FrameLink → Stage → FrameLink → Display
/// - Road: 常驻道路摄像头, 目标检测
/// - Secondary: 由 ModeController 管理的摄像头, 按模式分支 (司机 / 货舱)
/// - ModeController: 串行化的模式切换与摄像头热替换
pub mod controller;
pub mod link;
pub mod mode;
pub mod road;
pub mod secondary;
pub mod stats;

pub use controller::{ModeCameras, ModeController};
pub use link::{frame_link, FrameReader, FrameWriter, LinkClosed};
pub use mode::{Mode, ModeHandle, UnknownMode};
pub use road::RoadStage;
pub use secondary::{
    DrowsinessMonitor, FailureTracker, SecondaryModels, SecondaryOptions, SecondaryStage,
};
pub use stats::StageStats;
