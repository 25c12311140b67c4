// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! SIM7600-style cellular modem: SMS alerts and GPS queries over AT commands.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{AlertEvent, AlertTransport};

/// Byte stream to the modem's AT port.
pub trait AtPort: Read + Write + Send {}

impl<T: Read + Write + Send> AtPort for T {}

const CTRL_Z: u8 = 0x1A;
const BAUD_RATE: u32 = 115_200;
/// Per-read timeout on the serial port and the default bound on waiting for
/// a full reply.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// The port lock is held for at most `pause` plus `reply_timeout` per
/// command, so SMS delivery never waits long behind a GPS query.
pub struct Modem {
    port: Mutex<Box<dyn AtPort>>,
    name: String,
    pause: Duration,
    reply_timeout: Duration,
}

impl Modem {
    pub fn new(port: Box<dyn AtPort>, name: impl Into<String>, pause: Duration) -> Self {
        Self {
            port: Mutex::new(port),
            name: name.into(),
            pause,
            reply_timeout: READ_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Open the first serial port in `candidates` at 115200 baud.
    pub fn find(candidates: &[String], pause: Duration) -> Option<Self> {
        for path in candidates {
            match serialport::new(path.as_str(), BAUD_RATE)
                .timeout(READ_TIMEOUT)
                .open()
            {
                Ok(port) => {
                    info!("📶 modem found on {}", path);
                    return Some(Self::new(Box::new(port), path.clone(), pause));
                }
                Err(e) => debug!("modem not on {}: {}", path, e),
            }
        }
        None
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text-mode SMS: `AT+CMGF=1`, `AT+CMGS="<number>"`, body, Ctrl-Z.
    pub fn send_sms(&self, number: &str, text: &str) -> io::Result<()> {
        let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
        port.write_all(b"AT+CMGF=1\r")?;
        port.flush()?;
        std::thread::sleep(self.pause);
        port.write_all(format!("AT+CMGS=\"{}\"\r", number).as_bytes())?;
        port.flush()?;
        std::thread::sleep(self.pause);
        port.write_all(text.as_bytes())?;
        port.write_all(&[CTRL_Z])?;
        port.flush()
    }

    /// Ask for the GNSS fix and return the first reply line that carries fields.
    pub fn query_gps(&self) -> io::Result<Option<String>> {
        let reply = {
            let mut port = self.port.lock().unwrap_or_else(|e| e.into_inner());
            port.write_all(b"AT+CGPSINFO\r")?;
            port.flush()?;
            std::thread::sleep(self.pause);
            read_reply(port.as_mut(), Instant::now() + self.reply_timeout)?
        };
        let reply = String::from_utf8_lossy(&reply);
        Ok(reply
            .lines()
            .map(str::trim)
            .find(|line| line.contains(','))
            .map(str::to_string))
    }
}

/// Collect bytes until the modem's final result code, end of stream, or
/// `deadline`. Read timeouts only mean "nothing yet".
fn read_reply(port: &mut dyn AtPort, deadline: Instant) -> io::Result<Vec<u8>> {
    let mut reply = Vec::new();
    let mut buf = [0u8; 256];
    while Instant::now() < deadline {
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                reply.extend_from_slice(&buf[..n]);
                if is_final(&reply) {
                    break;
                }
            }
            Err(e) if matches!(
                e.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
            ) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(reply)
}

fn is_final(reply: &[u8]) -> bool {
    let text = String::from_utf8_lossy(reply);
    text.lines()
        .map(str::trim)
        .any(|line| line == "OK" || line.starts_with("ERROR"))
}

/// Alert transport that texts one phone number through a shared modem.
pub struct SmsNotifier {
    modem: Arc<Modem>,
    number: String,
}

impl SmsNotifier {
    pub fn new(modem: Arc<Modem>, number: impl Into<String>) -> Self {
        Self {
            modem,
            number: number.into(),
        }
    }
}

impl AlertTransport for SmsNotifier {
    fn name(&self) -> &str {
        "sms"
    }

    fn deliver(&self, event: &AlertEvent) -> anyhow::Result<()> {
        self.modem.send_sms(&self.number, &event.message)?;
        Ok(())
    }
}
