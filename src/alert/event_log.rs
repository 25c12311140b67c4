// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Append-only CSV event log: `timestamp,module,sub,message`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use tracing::warn;

use super::{AlertEvent, AlertTransport};

pub struct EventLog {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            write_lock: Mutex::new(()),
        }
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: None,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Best effort: failures are logged and otherwise ignored.
    pub fn record(&self, module: &str, sub: &str, message: &str) {
        if let Err(e) = self.try_record(module, sub, message) {
            warn!("event log write failed: {}", e);
        }
    }

    fn try_record(&self, module: &str, sub: &str, message: &str) -> io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(
            file,
            "{},{},{},{}",
            Local::now().format("%Y-%m-%dT%H:%M:%S%.6f"),
            csv_field(module),
            csv_field(sub),
            csv_field(message)
        )
    }
}

impl AlertTransport for EventLog {
    fn name(&self) -> &str {
        "event-log"
    }

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.try_record("ALERT", event.category.label(), &event.message)?;
        Ok(())
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertCategory;

    #[test]
    fn test_record_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let log = EventLog::new(&path);

        log.record("SYSTEM", "MODE_CHANGE", "cargo");
        log.deliver(&AlertEvent::new(AlertCategory::DoorOpen, "⚠️ DOOR OPEN"))
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].ends_with(",SYSTEM,MODE_CHANGE,cargo"));
        assert!(rows[1].ends_with(",ALERT,DOOR OPEN,⚠️ DOOR OPEN"));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("+CGPSINFO: 1,N"), "\"+CGPSINFO: 1,N\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_unwritable_path_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path().join("missing").join("events.csv"));
        log.record("GPS", "DATA", "x");
        assert!(log
            .deliver(&AlertEvent::new(AlertCategory::System, "x"))
            .is_err());
        EventLog::disabled().record("GPS", "DATA", "x");
    }
}
