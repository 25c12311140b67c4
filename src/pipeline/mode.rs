// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Purpose currently assigned to the secondary camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Driver,
    Cargo,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Driver, Mode::Cargo];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Driver => "driver",
            Mode::Cargo => "cargo",
        }
    }

    /// Upper-case name used for camera identities and dashboard text.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Driver => "DRIVER",
            Mode::Cargo => "CARGO",
        }
    }

    fn to_bits(self) -> u8 {
        match self {
            Mode::Driver => 0,
            Mode::Cargo => 1,
        }
    }

    fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Mode::Driver,
            _ => Mode::Cargo,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode '{0}' (expected driver or cargo)")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver" => Ok(Mode::Driver),
            "cargo" => Ok(Mode::Cargo),
            _ => Err(UnknownMode(s.to_string())),
        }
    }
}

/// The one shared, atomically published mode value.
#[derive(Debug)]
pub(crate) struct ModeCell(AtomicU8);

impl ModeCell {
    pub(crate) fn new(mode: Mode) -> Self {
        Self(AtomicU8::new(mode.to_bits()))
    }

    pub(crate) fn load(&self) -> Mode {
        Mode::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, mode: Mode) {
        self.0.store(mode.to_bits(), Ordering::Release);
    }
}

/// Read-only view of the current mode, handed to stages and the dashboard.
#[derive(Debug, Clone)]
pub struct ModeHandle {
    cell: Arc<ModeCell>,
}

impl ModeHandle {
    pub(crate) fn new(cell: Arc<ModeCell>) -> Self {
        Self { cell }
    }

    /// A handle fixed to one mode, for stages driven outside a controller.
    pub fn fixed(mode: Mode) -> Self {
        Self::new(Arc::new(ModeCell::new(mode)))
    }

    pub fn current(&self) -> Mode {
        self.cell.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!("driver".parse::<Mode>().unwrap(), Mode::Driver);
        assert_eq!(" CARGO ".parse::<Mode>().unwrap(), Mode::Cargo);
        assert!("road".parse::<Mode>().is_err());
    }

    #[test]
    fn test_handle_sees_published_mode() {
        let cell = Arc::new(ModeCell::new(Mode::Driver));
        let handle = ModeHandle::new(cell.clone());
        assert_eq!(handle.current(), Mode::Driver);
        cell.store(Mode::Cargo);
        assert_eq!(handle.current(), Mode::Cargo);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Cargo).unwrap(), "\"cargo\"");
        let mode: Mode = serde_json::from_str("\"driver\"").unwrap();
        assert_eq!(mode, Mode::Driver);
    }
}
