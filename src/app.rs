// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 系统装配 (System wiring)
///
/// 启动顺序:
/// 1. 事件日志 + 告警网关 (Telegram / SMS / CSV)
/// 2. 道路摄像头 → 道路检测线程
/// 3. ModeController 拉起初始模式的摄像头 → 第二路检测线程
/// 4. 显示泵 + HTTP 仪表盘
/// 5. 遥测轮询 (GPS / 环境传感器)
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};

use crate::alert::{
    raise, AlertCategory, AlertGateway, AlertSink, AlertTransport, EventLog, GatewayOptions,
    Modem, SmsNotifier, TelegramNotifier,
};
use crate::config::{BackendKind, CameraConfig, DetectionConfig, FleetConfig};
use crate::detection::ObjectDetector;
use crate::display::{spawn_dashboard, Channel, DashboardServer, DashboardState, DisplayPublisher};
use crate::input::{
    CameraBackend, CameraSource, CaptureContext, CaptureTiming, DeviceRegistry, SyntheticBackend,
};
use crate::pipeline::{
    frame_link, ModeCameras, ModeController, RoadStage, SecondaryModels, SecondaryOptions,
    SecondaryStage,
};
use crate::shutdown::Shutdown;
use crate::telemetry::{spawn_env_loop, spawn_gps_loop, SimulatedSensors};

#[cfg(feature = "onnx")]
const MODEL_THREADS: usize = 2;

/// The swappable pieces of a fleet: where frames come from and what analyses
/// them.
pub struct FleetParts {
    pub backend: Arc<dyn CameraBackend>,
    pub road_detector: Box<dyn ObjectDetector>,
    pub secondary: SecondaryModels,
    /// Delivered to in addition to the configured transports.
    pub extra_transports: Vec<Box<dyn AlertTransport>>,
}

impl FleetParts {
    /// Camera backend and models as configured. Fails when the road detector
    /// cannot be built; missing secondary models only degrade that stage.
    pub fn from_config(config: &FleetConfig) -> Result<Self> {
        let backend = camera_backend(&config.cameras)?;
        let (road_detector, secondary) = load_models(&config.detection)?;
        Ok(Self {
            backend,
            road_detector,
            secondary,
            extra_transports: Vec::new(),
        })
    }
}

pub fn camera_backend(cameras: &CameraConfig) -> Result<Arc<dyn CameraBackend>> {
    match cameras.backend {
        BackendKind::Synthetic => Ok(Arc::new(SyntheticBackend::new(
            cameras.synthetic_width,
            cameras.synthetic_height,
            cameras.synthetic_fps,
        ))),
        BackendKind::Webcam => webcam_backend(),
    }
}

#[cfg(feature = "webcam")]
fn webcam_backend() -> Result<Arc<dyn CameraBackend>> {
    Ok(Arc::new(crate::input::WebcamBackend::new()))
}

#[cfg(not(feature = "webcam"))]
fn webcam_backend() -> Result<Arc<dyn CameraBackend>> {
    anyhow::bail!("built without the `webcam` feature; use --camera-backend synthetic")
}

/// Cameras the webcam backend can open, as `index: name`.
#[cfg(feature = "webcam")]
pub fn list_cameras() -> Result<Vec<String>> {
    Ok(crate::input::WebcamBackend::list_devices()?)
}

#[cfg(not(feature = "webcam"))]
pub fn list_cameras() -> Result<Vec<String>> {
    anyhow::bail!("built without the `webcam` feature; no cameras to list")
}

#[cfg(feature = "onnx")]
fn load_models(detection: &DetectionConfig) -> Result<(Box<dyn ObjectDetector>, SecondaryModels)> {
    use crate::detection::{FaceLandmarker, HandLandmarker, MissingModel};
    use crate::models::{FaceMesh, YoloDetector, YoloHands};

    let road = YoloDetector::load(&detection.model, detection.input_size, detection.iou, MODEL_THREADS)
        .context("road detector")?;

    let detector: Box<dyn ObjectDetector> =
        match YoloDetector::load(&detection.model, detection.input_size, detection.iou, MODEL_THREADS) {
            Ok(model) if detection.cargo_classes.is_empty() => Box::new(model),
            Ok(model) => Box::new(model.with_classes(detection.cargo_classes.clone())),
            Err(e) => {
                warn!("cargo detector unavailable: {:#}", e);
                Box::new(MissingModel::new("cargo object detector"))
            }
        };
    let face: Box<dyn FaceLandmarker> = match FaceMesh::load(&detection.face_model, MODEL_THREADS) {
        Ok(model) => Box::new(model),
        Err(e) => {
            warn!("face landmarker unavailable: {:#}", e);
            Box::new(MissingModel::new("face landmarker"))
        }
    };
    let hands: Box<dyn HandLandmarker> =
        match YoloDetector::load(&detection.hand_model, detection.input_size, detection.iou, MODEL_THREADS) {
            Ok(model) => Box::new(YoloHands::new(model, detection.confidence)),
            Err(e) => {
                warn!("hand detector unavailable: {:#}", e);
                Box::new(MissingModel::new("hand detector"))
            }
        };

    Ok((
        Box::new(road),
        SecondaryModels {
            detector,
            face,
            hands,
        },
    ))
}

#[cfg(not(feature = "onnx"))]
fn load_models(_detection: &DetectionConfig) -> Result<(Box<dyn ObjectDetector>, SecondaryModels)> {
    anyhow::bail!("built without the `onnx` feature; no road detector available")
}

/// Everything started by [`Fleet::start`]. Dropping only signals the
/// threads; call [`Fleet::shutdown`] for an orderly stop.
pub struct Fleet {
    shutdown: Shutdown,
    event_log: Arc<EventLog>,
    gateway: Arc<AlertGateway>,
    controller: Arc<ModeController>,
    road_source: CameraSource,
    display: Arc<DisplayPublisher>,
    dashboard: Option<DashboardServer>,
    workers: Vec<JoinHandle<()>>,
    fatal: Receiver<String>,
}

impl Fleet {
    pub fn start(config: &FleetConfig, parts: FleetParts) -> Result<Self> {
        let FleetParts {
            backend,
            road_detector,
            secondary,
            extra_transports,
        } = parts;
        let shutdown = Shutdown::new();

        // ========== 告警 ==========
        let event_log = Arc::new(if config.event_log.enabled {
            EventLog::new(&config.event_log.path)
        } else {
            EventLog::disabled()
        });
        let (mut transports, modem) = build_transports(config, &event_log);
        transports.extend(extra_transports);
        let gateway = AlertGateway::spawn(
            transports,
            GatewayOptions {
                queue_capacity: config.alerts.queue_capacity,
                cooldown: Duration::from_millis(config.alerts.cooldown_ms),
            },
        )?;
        let alerts: Arc<dyn AlertSink> = gateway.clone();
        if config.alerts.sms.enabled && modem.is_none() {
            warn!("📵 no modem on {:?}", config.alerts.sms.ports);
            raise(alerts.as_ref(), AlertCategory::Modem, "⚠️ MODEM NOT FOUND");
        }
        event_log.record("SYSTEM", "START", config.initial_mode.as_str());

        let capture = CaptureContext {
            backend,
            registry: DeviceRegistry::new(),
            alerts: alerts.clone(),
            timing: CaptureTiming {
                backoff: Duration::from_millis(config.capture.backoff_ms),
                yield_interval: Duration::from_millis(config.capture.yield_ms),
            },
        };

        let (road_cam_tx, road_cam_rx) = frame_link();
        let (road_out_tx, road_out_rx) = frame_link();
        let (second_cam_tx, second_cam_rx) = frame_link();
        let (second_out_tx, second_out_rx) = frame_link();
        let (fatal_tx, fatal) = crossbeam_channel::unbounded();
        let mut workers = Vec::new();

        // ========== 道路流水线 ==========
        let mut road_source = CameraSource::new(
            "road",
            config.cameras.road,
            0,
            road_cam_tx,
            capture.clone(),
        );
        road_source.start().context("road camera")?;

        let road_stage = RoadStage::new(
            road_cam_rx,
            road_out_tx,
            road_detector,
            config.detection.confidence,
        );
        workers.push(spawn_road_stage(
            road_stage,
            shutdown.clone(),
            alerts.clone(),
            fatal_tx,
        )?);

        // ========== 第二路流水线 ==========
        let controller = Arc::new(ModeController::new(
            config.initial_mode,
            ModeCameras {
                driver: config.cameras.driver,
                cargo: config.cameras.cargo,
            },
            second_cam_tx,
            capture,
            event_log.clone(),
        ));
        controller
            .switch_to(config.initial_mode)
            .inspect_err(|_| shutdown.trigger())
            .context("secondary camera")?;

        let secondary_stage = SecondaryStage::new(
            second_cam_rx,
            second_out_tx,
            controller.handle(),
            secondary,
            alerts.clone(),
            SecondaryOptions {
                confidence: config.detection.confidence,
                ear_threshold: config.drowsiness.ear_threshold,
                drowsy_frames: config.drowsiness.frames,
                degraded_after: config.detection.degraded_after,
            },
        );
        let stage_shutdown = shutdown.clone();
        workers.push(
            std::thread::Builder::new()
                .name("secondary-stage".into())
                .spawn(move || secondary_stage.run(&stage_shutdown))
                .context("Failed to spawn secondary stage")?,
        );

        // ========== 显示 ==========
        let display = DisplayPublisher::new(config.server.jpeg_quality);
        workers.push(display.spawn_pump(Channel::Road, road_out_rx, shutdown.clone())?);
        workers.push(display.spawn_pump(Channel::Secondary, second_out_rx, shutdown.clone())?);

        let state = Arc::new(DashboardState {
            display: display.clone(),
            controller: controller.clone(),
            road_camera: Some(road_source.status()),
        });
        let server_shutdown = shutdown.clone();
        let dashboard = spawn_dashboard(&config.server.bind, state, move || {
            server_shutdown.trigger();
        })
        .inspect_err(|_| shutdown.trigger())?;

        // ========== 遥测 ==========
        if let Some(modem) = modem {
            workers.push(spawn_gps_loop(
                modem,
                event_log.clone(),
                Duration::from_millis(config.telemetry.gps_interval_ms),
                shutdown.clone(),
            )?);
        }
        if config.telemetry.simulated_sensors {
            workers.push(spawn_env_loop(
                Box::new(SimulatedSensors::new()),
                alerts,
                Duration::from_millis(config.telemetry.env_interval_ms),
                shutdown.clone(),
            )?);
        }

        info!("✅ fleet monitor running in {} mode", config.initial_mode.label());
        Ok(Self {
            shutdown,
            event_log,
            gateway,
            controller,
            road_source,
            display,
            dashboard: Some(dashboard),
            workers,
            fatal,
        })
    }

    pub fn controller(&self) -> &Arc<ModeController> {
        &self.controller
    }

    pub fn display(&self) -> &Arc<DisplayPublisher> {
        &self.display
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// State for mounting the dashboard routes elsewhere.
    pub fn dashboard_state(&self) -> Arc<DashboardState> {
        Arc::new(DashboardState {
            display: self.display.clone(),
            controller: self.controller.clone(),
            road_camera: Some(self.road_source.status()),
        })
    }

    /// Block until something stops the fleet. Returns the road stage's error
    /// if that is what stopped it.
    pub fn wait(&self) -> Result<()> {
        while self.shutdown.wait(Duration::from_millis(500)) {}
        match self.fatal.try_recv() {
            Ok(reason) => Err(anyhow!("road detection failed: {}", reason)),
            Err(_) => Ok(()),
        }
    }

    /// Stop every thread and flush pending alerts.
    pub fn shutdown(mut self) {
        info!("🛑 shutting down");
        self.shutdown.trigger();
        if let Some(dashboard) = self.dashboard.take() {
            dashboard.stop();
        }
        self.controller.shutdown();
        self.road_source.stop();
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(str::to_string);
            if worker.join().is_err() {
                error!("{} panicked", name.as_deref().unwrap_or("worker"));
            }
        }
        self.event_log.record("SYSTEM", "STOP", "");
        self.gateway.shutdown();
        debug!("fleet stopped");
    }
}

impl Drop for Fleet {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Event log, then Telegram and SMS when configured. Also hands back the
/// modem, which doubles as the GPS receiver.
fn build_transports(
    config: &FleetConfig,
    event_log: &Arc<EventLog>,
) -> (Vec<Box<dyn AlertTransport>>, Option<Arc<Modem>>) {
    let mut transports: Vec<Box<dyn AlertTransport>> = vec![Box::new(event_log.clone())];

    if let Some(telegram) = &config.alerts.telegram {
        let timeout = Duration::from_millis(telegram.timeout_ms);
        let notifier = match &telegram.api_base {
            Some(base) => {
                TelegramNotifier::with_api_base(base, &telegram.bot_token, &telegram.chat_id, timeout)
            }
            None => TelegramNotifier::new(&telegram.bot_token, &telegram.chat_id, timeout),
        };
        transports.push(Box::new(notifier));
    }

    let sms = &config.alerts.sms;
    let modem = if sms.enabled {
        Modem::find(&sms.ports, Duration::from_millis(sms.pause_ms)).map(Arc::new)
    } else {
        None
    };
    match (&modem, &sms.number) {
        (Some(modem), Some(number)) => {
            transports.push(Box::new(SmsNotifier::new(modem.clone(), number.clone())));
        }
        (Some(modem), None) => info!("📶 {} used for GPS only, no SMS number set", modem.name()),
        _ => {}
    }

    (transports, modem)
}

fn spawn_road_stage(
    stage: RoadStage,
    shutdown: Shutdown,
    alerts: Arc<dyn AlertSink>,
    fatal: Sender<String>,
) -> Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("road-stage".into())
        .spawn(move || {
            if let Err(e) = stage.run(&shutdown) {
                error!("❌ road detection failed: {}", e);
                raise(
                    alerts.as_ref(),
                    AlertCategory::System,
                    format!("⛔ ROAD DETECTION FAILED: {}", e),
                );
                let _ = fatal.send(e.to_string());
                shutdown.trigger();
            }
        })
        .context("Failed to spawn road stage")
}
