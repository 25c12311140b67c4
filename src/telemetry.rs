// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 遥测 (Telemetry)
//!
//! Two slow polling loops beside the video pipelines:
//! - GPS: ask the modem for a fix and log it as `GPS,DATA,<line>`
//! - environment: vibration level and door state, alerting on thresholds

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::alert::{raise, AlertCategory, AlertSink, EventLog, Modem};
use crate::shutdown::Shutdown;

/// Vibration levels above this raise `HIGH VIBRATION`.
pub const VIBRATION_LIMIT: u8 = 5;

static CGPSINFO: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\+CGPSINFO:\s*(\d+?)(\d{2}\.\d+),([NS]),(\d+?)(\d{2}\.\d+),([EW])").ok()
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// Parse a `+CGPSINFO: ddmm.mmmm,N,dddmm.mmmm,E,...` reply into degrees.
pub fn parse_cgpsinfo(line: &str) -> Option<GpsFix> {
    let caps = CGPSINFO.as_ref()?.captures(line)?;
    let coord = |deg: usize, min: usize, hemi: usize, negative: &str| -> Option<f64> {
        let degrees: f64 = caps[deg].parse().ok()?;
        let minutes: f64 = caps[min].parse().ok()?;
        let value = degrees + minutes / 60.0;
        Some(if &caps[hemi] == negative { -value } else { value })
    };
    Some(GpsFix {
        latitude: coord(1, 2, 3, "S")?,
        longitude: coord(4, 5, 6, "W")?,
    })
}

/// A reply line carries a fix when any of its fields is non-empty; a modem
/// without a fix answers `+CGPSINFO: ,,,,,,,,`.
pub fn has_fix(line: &str) -> bool {
    let payload = line.split_once(':').map_or(line, |(_, rest)| rest);
    payload.contains(',') && payload.split(',').any(|field| !field.trim().is_empty())
}

pub trait GpsReceiver: Send + Sync {
    fn query(&self) -> io::Result<Option<String>>;
}

impl GpsReceiver for Modem {
    fn query(&self) -> io::Result<Option<String>> {
        self.query_gps()
    }
}

pub fn spawn_gps_loop(
    gps: Arc<dyn GpsReceiver>,
    event_log: Arc<EventLog>,
    interval: Duration,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("gps-poll".into())
        .spawn(move || {
            info!("📍 GPS polling every {:?}", interval);
            loop {
                match gps.query() {
                    Ok(Some(line)) if has_fix(&line) => {
                        event_log.record("GPS", "DATA", &line);
                        match parse_cgpsinfo(&line) {
                            Some(fix) => debug!("📍 {:.6}, {:.6}", fix.latitude, fix.longitude),
                            None => debug!("📍 unparsed GPS reply: {}", line),
                        }
                    }
                    Ok(_) => debug!("no GPS fix"),
                    Err(e) => warn!("GPS query failed: {}", e),
                }
                if !shutdown.wait(interval) {
                    break;
                }
            }
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvReading {
    /// 0 (still) to 7 (violent).
    pub vibration: u8,
    pub door_open: bool,
}

pub trait EnvSensor: Send {
    fn read(&mut self) -> anyhow::Result<EnvReading>;
}

/// Random readings for benches without sensor hardware.
pub struct SimulatedSensors {
    rng: StdRng,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvSensor for SimulatedSensors {
    fn read(&mut self) -> anyhow::Result<EnvReading> {
        Ok(EnvReading {
            vibration: self.rng.gen_range(0..8),
            door_open: self.rng.gen_bool(0.5),
        })
    }
}

/// Raise the alerts `reading` calls for. Returns how many were raised.
pub fn check_environment(reading: EnvReading, alerts: &dyn AlertSink) -> usize {
    let mut raised = 0;
    if reading.vibration > VIBRATION_LIMIT {
        raise(alerts, AlertCategory::HighVibration, "⚠️ HIGH VIBRATION");
        raised += 1;
    }
    if reading.door_open {
        raise(alerts, AlertCategory::DoorOpen, "⚠️ DOOR OPEN");
        raised += 1;
    }
    raised
}

pub fn spawn_env_loop(
    mut sensor: Box<dyn EnvSensor>,
    alerts: Arc<dyn AlertSink>,
    interval: Duration,
    shutdown: Shutdown,
) -> io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("env-poll".into())
        .spawn(move || {
            info!("🌡️ environment polling every {:?}", interval);
            loop {
                match sensor.read() {
                    Ok(reading) => {
                        check_environment(reading, alerts.as_ref());
                    }
                    Err(e) => warn!("environment read failed: {:#}", e),
                }
                if !shutdown.wait(interval) {
                    break;
                }
            }
        })
}
