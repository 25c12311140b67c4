// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 系统配置 - 通过JSON文件调整参数, 命令行覆盖

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::pipeline::Mode;

/// Log filter when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "fleet_monitor=info";

/// `RUST_LOG` as given, or [`DEFAULT_LOG_FILTER`].
pub fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|spec| !spec.trim().is_empty())
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// 车队监控程序
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "Vehicle multi-camera monitoring", long_about = None)]
pub struct Args {
    /// 配置文件路径 (不存在时写入默认配置)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 仪表盘监听地址, e.g. 0.0.0.0:5000
    #[arg(long)]
    pub bind: Option<String>,

    /// 启动模式: driver 或 cargo
    #[arg(long)]
    pub mode: Option<Mode>,

    /// 摄像头后端
    #[arg(long, value_enum)]
    pub camera_backend: Option<BackendKind>,

    /// 目标检测模型 (ONNX)
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// 人脸关键点模型 (ONNX)
    #[arg(long)]
    pub face_model: Option<PathBuf>,

    /// 手部检测模型 (ONNX)
    #[arg(long)]
    pub hand_model: Option<PathBuf>,

    /// 事件日志 CSV 路径
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// 列出可用摄像头后退出
    #[arg(long)]
    pub list_cameras: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Webcam,
    Synthetic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub road: u32,
    pub driver: u32,
    pub cargo: u32,
    pub backend: BackendKind,
    // synthetic backend only
    pub synthetic_width: u32,
    pub synthetic_height: u32,
    pub synthetic_fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            road: 1,
            driver: 0,
            cargo: 2,
            backend: BackendKind::Webcam,
            synthetic_width: 640,
            synthetic_height: 480,
            synthetic_fps: 15,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence: f32,
    pub iou: f32,
    pub input_size: u32,
    pub model: PathBuf,
    pub face_model: PathBuf,
    pub hand_model: PathBuf,
    /// Consecutive failed secondary frames before `DETECTION DEGRADED`.
    pub degraded_after: u32,
    /// Class ids the cargo detector outlines. Empty keeps every class.
    pub cargo_classes: Vec<u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence: 0.4,
            iou: 0.45,
            input_size: 640,
            model: PathBuf::from("models/yolov8n.onnx"),
            face_model: PathBuf::from("models/face_landmark.onnx"),
            hand_model: PathBuf::from("models/hand_yolov8n.onnx"),
            degraded_after: 30,
            cargo_classes: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DrowsinessConfig {
    pub ear_threshold: f32,
    pub frames: u32,
}

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.18,
            frames: 12,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub backoff_ms: u64,
    pub yield_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            yield_ms: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_telegram_timeout_ms() -> u64 {
    1000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Probe for the modem at all (it also serves GPS).
    pub enabled: bool,
    /// Recipient; without one the modem is used for GPS only.
    pub number: Option<String>,
    pub ports: Vec<String>,
    pub pause_ms: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            number: None,
            ports: ["/dev/ttyUSB2", "/dev/ttyUSB3", "/dev/ttyUSB1", "/dev/ttyUSB0"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            pause_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub telegram: Option<TelegramConfig>,
    pub sms: SmsConfig,
    /// Per-category minimum spacing, 0 = off.
    pub cooldown_ms: u64,
    pub queue_capacity: usize,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            sms: SmsConfig::default(),
            cooldown_ms: 0,
            queue_capacity: 64,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub gps_interval_ms: u64,
    pub env_interval_ms: u64,
    /// Run the random vibration/door stand-ins.
    pub simulated_sensors: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            gps_interval_ms: 5000,
            env_interval_ms: 2000,
            simulated_sensors: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            jpeg_quality: 80,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    pub enabled: bool,
    pub path: PathBuf,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("ai_fleet_log.csv"),
        }
    }
}

/// 系统参数配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub initial_mode: Mode,
    pub cameras: CameraConfig,
    pub detection: DetectionConfig,
    pub drowsiness: DrowsinessConfig,
    pub capture: CaptureConfig,
    pub alerts: AlertsConfig,
    pub telemetry: TelemetryConfig,
    pub server: ServerConfig,
    pub event_log: EventLogConfig,
}

impl FleetConfig {
    /// `fleet-monitor/config.json` under the user config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("fleet-monitor").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("fleet_config.json"))
    }

    /// 从JSON文件加载配置; 文件不存在时写入默认配置
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(json) => {
                let config = serde_json::from_str(&json)
                    .with_context(|| format!("malformed config {}", path.display()))?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("📝 配置文件不存在, 创建默认配置 {}", path.display());
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("reading config {}", path.display())),
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing config {}", path.display()))?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// Command-line values win over the file.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(bind) = &args.bind {
            self.server.bind = bind.clone();
        }
        if let Some(mode) = args.mode {
            self.initial_mode = mode;
        }
        if let Some(backend) = args.camera_backend {
            self.cameras.backend = backend;
        }
        if let Some(model) = &args.model {
            self.detection.model = model.clone();
        }
        if let Some(model) = &args.face_model {
            self.detection.face_model = model.clone();
        }
        if let Some(model) = &args.hand_model {
            self.detection.hand_model = model.clone();
        }
        if let Some(path) = &args.log_file {
            self.event_log.path = path.clone();
        }
    }

    pub fn validate(&self) -> Result<()> {
        let cams = &self.cameras;
        if cams.road == cams.driver || cams.road == cams.cargo {
            bail!(
                "road camera index {} is also used by a secondary camera (driver {}, cargo {})",
                cams.road,
                cams.driver,
                cams.cargo
            );
        }
        if self.drowsiness.frames == 0 {
            bail!("drowsiness.frames must be at least 1");
        }
        if !(self.drowsiness.ear_threshold > 0.0 && self.drowsiness.ear_threshold < 1.0) {
            bail!("drowsiness.ear_threshold {} outside (0, 1)", self.drowsiness.ear_threshold);
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            bail!("detection.confidence {} outside [0, 1]", self.detection.confidence);
        }
        if !(0.0..=1.0).contains(&self.detection.iou) {
            bail!("detection.iou {} outside [0, 1]", self.detection.iou);
        }
        if !(1..=100).contains(&self.server.jpeg_quality) {
            bail!("server.jpeg_quality {} outside 1..=100", self.server.jpeg_quality);
        }
        if self.alerts.queue_capacity == 0 {
            bail!("alerts.queue_capacity must be at least 1");
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️ 当前配置:");
        info!(
            "  摄像头: road {} | driver {} | cargo {} ({:?})",
            self.cameras.road, self.cameras.driver, self.cameras.cargo, self.cameras.backend
        );
        info!(
            "  检测置信度 {:.2} | EAR {:.2} x {} 帧",
            self.detection.confidence, self.drowsiness.ear_threshold, self.drowsiness.frames
        );
        info!("  仪表盘 {} | 日志 {}", self.server.bind, self.event_log.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = FleetConfig::default();
        assert_eq!(config.initial_mode, Mode::Driver);
        assert_eq!((config.cameras.driver, config.cameras.road, config.cameras.cargo), (0, 1, 2));
        assert_eq!(config.drowsiness.frames, 12);
        assert_eq!(config.server.bind, "0.0.0.0:5000");
        assert_eq!(config.alerts.sms.ports[0], "/dev/ttyUSB2");
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = FleetConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.capture.backoff_ms, 1000);

        let reloaded = FleetConfig::load(&path).unwrap();
        assert_eq!(reloaded.server.jpeg_quality, 80);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"initial_mode": "cargo", "cameras": {"cargo": 4}, "alerts": {"telegram": {"bot_token": "t", "chat_id": "c"}}}"#,
        )
        .unwrap();

        let config = FleetConfig::load(&path).unwrap();
        assert_eq!(config.initial_mode, Mode::Cargo);
        assert_eq!(config.cameras.cargo, 4);
        assert_eq!(config.cameras.driver, 0);
        assert_eq!(config.alerts.telegram.unwrap().timeout_ms, 1000);
    }

    #[test]
    fn test_cargo_classes_default_to_all() {
        assert!(FleetConfig::default().detection.cargo_classes.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"detection": {"cargo_classes": [24, 26, 28]}}"#).unwrap();
        let config = FleetConfig::load(&path).unwrap();
        assert_eq!(config.detection.cargo_classes, vec![24, 26, 28]);
        assert_eq!(config.detection.degraded_after, 30);
    }

    #[test]
    fn test_log_filter_honors_rust_log() {
        let default = EnvFilter::new(DEFAULT_LOG_FILTER).to_string();
        assert_eq!(log_filter(None).to_string(), default);
        assert_eq!(log_filter(Some("  ")).to_string(), default);

        for spec in ["fleet_monitor=debug", "warn"] {
            let filter = log_filter(Some(spec)).to_string();
            assert_eq!(filter, EnvFilter::new(spec).to_string());
            assert_ne!(filter, default);
        }
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(FleetConfig::load(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_shared_road_index() {
        let mut config = FleetConfig::default();
        config.cameras.cargo = config.cameras.road;
        assert!(config.validate().is_err());

        let mut config = FleetConfig::default();
        config.drowsiness.frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_args_override_file() {
        let args = Args::parse_from([
            "fleet",
            "--bind",
            "127.0.0.1:8080",
            "--mode",
            "cargo",
            "--camera-backend",
            "synthetic",
            "--log-file",
            "/tmp/events.csv",
        ]);
        assert!(!args.list_cameras);
        let mut config = FleetConfig::default();
        config.apply_args(&args);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.initial_mode, Mode::Cargo);
        assert_eq!(config.cameras.backend, BackendKind::Synthetic);
        assert_eq!(config.event_log.path, PathBuf::from("/tmp/events.csv"));
    }
}
