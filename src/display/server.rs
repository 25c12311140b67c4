// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Actix Web dashboard: the two MJPEG streams, the mode control endpoint and
//! a JSON status snapshot.
//!
//! The server runs on a dedicated thread so the pipelines never share a
//! runtime with it.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    http::header,
    web::{self, Bytes},
    App, HttpResponse, HttpServer,
};
use anyhow::{anyhow, Context, Result};
use async_stream::stream;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use super::{Channel, DisplayPublisher};
use crate::input::{SourceState, SourceStatus};
use crate::pipeline::{Mode, ModeController};

const STREAM_INTERVAL: Duration = Duration::from_millis(33);

/// Shared state behind the HTTP handlers.
pub struct DashboardState {
    pub display: Arc<DisplayPublisher>,
    pub controller: Arc<ModeController>,
    pub road_camera: Option<Arc<SourceStatus>>,
}

/// Register the dashboard routes. Callers add `web::Data<DashboardState>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/road", web::get().to(road_stream))
        .route("/second", web::get().to(secondary_stream))
        .route("/set/{mode}", web::get().to(set_mode))
        .route("/status", web::get().to(status_route));
}

/// Handle for the dashboard thread.
pub struct DashboardServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DashboardServer {
    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Bind `bind` and serve the dashboard on its own thread. Returns once the
/// socket is bound; `on_exit` runs when the server stops for any reason
/// (including Ctrl-C, which actix handles).
pub fn spawn_dashboard(
    bind: &str,
    state: Arc<DashboardState>,
    on_exit: impl FnOnce() + Send + 'static,
) -> Result<DashboardServer> {
    let bind = bind.to_string();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(1);

    let handle = std::thread::Builder::new()
        .name("dashboard-server".into())
        .spawn(move || {
            let data = web::Data::from(state);
            let result = actix_web::rt::System::new().block_on(async move {
                let server = match HttpServer::new(move || {
                    App::new().app_data(data.clone()).configure(configure)
                })
                .workers(2)
                .bind(bind.as_str())
                {
                    Ok(server) => server.run(),
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("bind {}: {}", bind, e)));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(()));
                info!("🌐 dashboard on http://{}", bind);

                let srv_handle = server.handle();
                actix_web::rt::spawn(async move {
                    let _ = shutdown_rx.await;
                    srv_handle.stop(true).await;
                });

                server.await
            });
            if let Err(err) = result {
                error!("HTTP server error: {err}");
            }
            on_exit();
        })
        .context("Failed to spawn dashboard thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(DashboardServer {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }),
        Ok(Err(reason)) => {
            let _ = handle.join();
            Err(anyhow!(reason))
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("dashboard thread exited before binding"))
        }
    }
}

async fn index_route(state: web::Data<DashboardState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(render_index(state.controller.current_mode()))
}

fn render_index(mode: Mode) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Fleet Monitor</title>
<style>
body {{ background: #111; color: #eee; font-family: sans-serif; text-align: center; }}
img {{ width: 45%; margin: 8px; border: 2px solid #444; }}
a {{ color: #6cf; margin: 0 12px; }}
</style>
</head>
<body>
<h2>Fleet Monitor</h2>
<p>Current mode: <b id="mode">{label}</b></p>
<p><a href="/set/driver">Driver mode</a><a href="/set/cargo">Cargo mode</a></p>
<div>
<img src="/road" alt="road camera">
<img src="/second" alt="{label} camera">
</div>
</body>
</html>
"#,
        label = mode.label()
    )
}

async fn road_stream(state: web::Data<DashboardState>) -> HttpResponse {
    mjpeg_response(Arc::clone(&state.display), Channel::Road)
}

async fn secondary_stream(state: web::Data<DashboardState>) -> HttpResponse {
    mjpeg_response(Arc::clone(&state.display), Channel::Secondary)
}

/// Stream the channel over `multipart/x-mixed-replace`, sending each
/// published frame once.
fn mjpeg_response(display: Arc<DisplayPublisher>, channel: Channel) -> HttpResponse {
    let stream = stream! {
        let mut interval = actix_web::rt::time::interval(STREAM_INTERVAL);
        let mut last_sent = 0u64;
        loop {
            interval.tick().await;
            let frame = match display.latest(channel) {
                Some(frame) if frame.sequence != last_sent => frame,
                _ => continue,
            };
            last_sent = frame.sequence;

            let mut payload = Vec::with_capacity(frame.jpeg.len() + 96);
            payload.extend_from_slice(b"--frame\r\n");
            payload.extend_from_slice(format!("X-Sequence: {}\r\n", frame.sequence).as_bytes());
            payload.extend_from_slice(b"Content-Type: image/jpeg\r\n");
            payload.extend_from_slice(format!("Content-Length: {}\r\n\r\n", frame.jpeg.len()).as_bytes());
            payload.extend_from_slice(&frame.jpeg);
            payload.extend_from_slice(b"\r\n");
            yield Ok::<Bytes, actix_web::Error>(Bytes::from(payload));
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

async fn set_mode(path: web::Path<String>, state: web::Data<DashboardState>) -> HttpResponse {
    let requested = path.into_inner();
    let mode: Mode = match requested.parse() {
        Ok(mode) => mode,
        Err(e) => {
            warn!("rejected mode request: {}", e);
            return HttpResponse::BadRequest().body(format!("Unknown mode '{}'", requested));
        }
    };

    let controller = Arc::clone(&state.controller);
    match web::block(move || controller.switch_to(mode)).await {
        Ok(Ok(())) => HttpResponse::Ok()
            .content_type("text/plain; charset=utf-8")
            .body(format!("Mode changed to {}", mode.label())),
        Ok(Err(e)) => {
            error!("mode switch to {} failed: {}", mode, e);
            HttpResponse::InternalServerError().body(format!("Mode switch failed: {}", e))
        }
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct CameraReport {
    name: String,
    index: u32,
    state: SourceState,
    frames: u64,
    failure_episodes: u64,
}

impl From<&SourceStatus> for CameraReport {
    fn from(status: &SourceStatus) -> Self {
        Self {
            name: status.name().to_string(),
            index: status.index(),
            state: status.state(),
            frames: status.frames_produced(),
            failure_episodes: status.failure_episodes(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    mode: Mode,
    road_camera: Option<CameraReport>,
    secondary_camera: Option<CameraReport>,
    road_published: u64,
    secondary_published: u64,
}

async fn status_route(state: web::Data<DashboardState>) -> HttpResponse {
    let report = StatusReport {
        mode: state.controller.current_mode(),
        road_camera: state.road_camera.as_deref().map(CameraReport::from),
        secondary_camera: state
            .controller
            .secondary_status()
            .as_deref()
            .map(CameraReport::from),
        road_published: state.display.published(Channel::Road),
        secondary_published: state.display.published(Channel::Secondary),
    };
    HttpResponse::Ok().json(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertRecorder, EventLog};
    use crate::input::{CaptureContext, CaptureTiming, DeviceRegistry, ScriptedBackend};
    use crate::pipeline::{frame_link, ModeCameras};
    use actix_web::{http::StatusCode, test};

    fn state() -> Arc<DashboardState> {
        let (writer, _reader) = frame_link();
        let capture = CaptureContext {
            backend: ScriptedBackend::new(),
            registry: DeviceRegistry::new(),
            alerts: AlertRecorder::new(),
            timing: CaptureTiming::default(),
        };
        let controller = ModeController::new(
            Mode::Driver,
            ModeCameras { driver: 0, cargo: 2 },
            writer,
            capture,
            Arc::new(EventLog::disabled()),
        );
        Arc::new(DashboardState {
            display: DisplayPublisher::new(80),
            controller: Arc::new(controller),
            road_camera: None,
        })
    }

    #[actix_web::test]
    async fn test_set_mode_switches_controller() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/set/cargo").to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, Bytes::from_static(b"Mode changed to CARGO"));
        assert_eq!(state.controller.current_mode(), Mode::Cargo);
        state.controller.shutdown();
    }

    #[actix_web::test]
    async fn test_unknown_mode_is_rejected() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/set/road").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.controller.current_mode(), Mode::Driver);
        assert!(state.controller.secondary_status().is_none());
    }

    #[actix_web::test]
    async fn test_index_and_status() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get().uri("/").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("DRIVER"));
        assert!(html.contains("/second"));

        let req = test::TestRequest::get().uri("/status").to_request();
        let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status["mode"], "driver");
        assert_eq!(status["road_published"], 0);
        assert!(status["secondary_camera"].is_null());
    }
}
