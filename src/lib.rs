// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod alert; // 告警: 网关, Telegram, SMS, 事件日志
pub mod app; // 系统装配
pub mod config; // 配置文件与命令行参数
pub mod detection; // 检测能力接口与前后处理
pub mod display; // 显示发布与 HTTP 仪表盘
pub mod frame; // 帧与标注
pub mod input; // 视频输入系统
#[cfg(feature = "onnx")]
pub mod models; // ONNX 模型实现
pub mod pipeline; // 视频处理流水线
pub mod shutdown; // 全局停止信号
pub mod telemetry; // GPS 与环境传感器

pub use crate::app::{Fleet, FleetParts};
pub use crate::config::{Args, FleetConfig};
pub use crate::frame::{Frame, Region};
pub use crate::pipeline::Mode;
