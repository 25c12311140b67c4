// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 车队监控 (Fleet Monitor)
///
/// 系统架构:
/// 1. 采集线程: 道路摄像头 + 按模式切换的第二摄像头
/// 2. 检测线程: 道路目标检测 / 司机疲劳 + 货舱入侵
/// 3. 告警线程: Telegram / SMS / CSV 事件日志
/// 4. HTTP 仪表盘: MJPEG 视频流与模式切换
use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::error;

use fleet_monitor::app::{list_cameras, Fleet, FleetParts};
use fleet_monitor::config::{log_filter, Args, FleetConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    let args = Args::parse();
    if args.list_cameras {
        for camera in list_cameras()? {
            println!("{}", camera);
        }
        return Ok(());
    }
    let path = args.config.clone().unwrap_or_else(FleetConfig::default_path);
    let mut config = FleetConfig::load(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    config.apply_args(&args);
    config.validate()?;
    config.log_summary();

    let parts = FleetParts::from_config(&config)?;
    let fleet = Fleet::start(&config, parts)?;
    let outcome = fleet.wait();
    fleet.shutdown();

    if let Err(e) = &outcome {
        error!("❌ {:#}", e);
    }
    outcome
}
