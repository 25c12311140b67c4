// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use actix_web::{test, web, App};
use fleet_monitor::alert::{AlertCategory, AlertEvent, AlertTransport};
use fleet_monitor::detection::{
    DetectError, FaceLandmarker, FaceLandmarks, HandLandmarker, HandLandmarks, ObjectDetector,
};
use fleet_monitor::display::{configure, Channel};
use fleet_monitor::input::ScriptedBackend;
use fleet_monitor::pipeline::SecondaryModels;
use fleet_monitor::{Fleet, FleetConfig, FleetParts, Frame, Mode, Region};

#[derive(Clone, Default)]
struct Collect(Arc<Mutex<Vec<AlertEvent>>>);

impl Collect {
    fn count(&self, category: AlertCategory) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.category == category)
            .count()
    }
}

impl AlertTransport for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct NoBoxes;

impl ObjectDetector for NoBoxes {
    fn detect(&mut self, _frame: &Frame, _confidence: f32) -> Result<Vec<Region>, DetectError> {
        Ok(Vec::new())
    }
}

/// Eyes nearly closed on every frame.
struct SleepyFace;

impl FaceLandmarker for SleepyFace {
    fn analyze(&mut self, _frame: &Frame) -> Result<Option<FaceLandmarks>, DetectError> {
        Ok(Some(FaceLandmarks::with_eye_aspect_ratio(0.10)))
    }
}

/// One hand in every frame.
struct OneHand;

impl HandLandmarker for OneHand {
    fn analyze(&mut self, _frame: &Frame) -> Result<Vec<HandLandmarks>, DetectError> {
        Ok(vec![HandLandmarks::default()])
    }
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.server.bind = "127.0.0.1:0".into();
    config.event_log.enabled = false;
    config.alerts.sms.enabled = false;
    config.initial_mode = Mode::Driver;
    config
}

#[actix_web::test]
async fn test_drowsy_driver_then_cargo_intrusion() {
    let backend = ScriptedBackend::new();
    let alerts = Collect::default();
    let fleet = Fleet::start(
        &config(),
        FleetParts {
            backend: backend.clone(),
            road_detector: Box::new(NoBoxes),
            secondary: SecondaryModels {
                detector: Box::new(NoBoxes),
                face: Box::new(SleepyFace),
                hands: Box::new(OneHand),
            },
            extra_transports: vec![Box::new(alerts.clone())],
        },
    )
    .unwrap();
    let display = fleet.display().clone();

    // driver camera is index 0; feed one frame at a time so none is replaced
    for n in 1..=12 {
        backend.push_pattern(0, 64, 48);
        wait_until("driver frame", || display.published(Channel::Secondary) >= n);
    }
    wait_until("drowsy alert", || alerts.count(AlertCategory::DriverDrowsy) == 1);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(fleet.dashboard_state()))
            .configure(configure),
    )
    .await;
    let req = test::TestRequest::get().uri("/set/cargo").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, web::Bytes::from_static(b"Mode changed to CARGO"));
    assert_eq!(fleet.controller().current_mode(), Mode::Cargo);
    assert_eq!(fleet.controller().secondary_status().unwrap().index(), 2);

    let before = display.published(Channel::Secondary);
    backend.push_pattern(2, 64, 48);
    wait_until("cargo frame", || display.published(Channel::Secondary) > before);
    wait_until("intrusion alert", || {
        alerts.count(AlertCategory::CargoIntrusion) == 1
    });

    fleet.shutdown_signal().trigger();
    fleet.wait().unwrap();
    fleet.shutdown();

    assert_eq!(alerts.count(AlertCategory::DriverDrowsy), 1);
    assert_eq!(alerts.count(AlertCategory::CargoIntrusion), 1);
    assert_eq!(alerts.count(AlertCategory::CameraFail), 0);
}

#[actix_web::test]
async fn test_status_reports_both_cameras() {
    let backend = ScriptedBackend::new();
    let fleet = Fleet::start(
        &config(),
        FleetParts {
            backend: backend.clone(),
            road_detector: Box::new(NoBoxes),
            secondary: SecondaryModels {
                detector: Box::new(NoBoxes),
                face: Box::new(SleepyFace),
                hands: Box::new(OneHand),
            },
            extra_transports: Vec::new(),
        },
    )
    .unwrap();

    backend.push_pattern(1, 64, 48);
    let display = fleet.display().clone();
    wait_until("road frame", || display.published(Channel::Road) == 1);

    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(fleet.dashboard_state()))
            .configure(configure),
    )
    .await;
    let req = test::TestRequest::get().uri("/status").to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["mode"], "driver");
    assert_eq!(status["road_camera"]["index"], 1);
    assert_eq!(status["road_camera"]["state"], "streaming");
    assert_eq!(status["secondary_camera"]["index"], 0);
    assert_eq!(status["road_published"], 1);

    fleet.shutdown();
}
