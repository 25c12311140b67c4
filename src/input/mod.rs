// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入系统 (Video Input System)
///
/// 每个摄像头一个独立采集线程
/// - CameraSource: 采集状态机, 断线重连, 可中断停止
/// - DeviceRegistry: 物理摄像头索引独占
/// - Backends: webcam (nokhwa), synthetic (测试图案), scripted (手动注入)
pub mod camera;
pub mod device;
pub mod scripted;
pub mod synthetic;
#[cfg(feature = "webcam")]
pub mod webcam;

pub use camera::{CameraSource, CaptureContext, CaptureTiming, SourceState, SourceStatus};
pub use device::{BoundCamera, CameraBackend, CameraDevice, CaptureError, DeviceClaim, DeviceRegistry};
pub use scripted::ScriptedBackend;
pub use synthetic::SyntheticBackend;
#[cfg(feature = "webcam")]
pub use webcam::WebcamBackend;
