// src/transport/mod.rs - Serial connection and command round trips
//!
//! [`Connection`] owns the single open port. Every round trip holds its lock,
//! so two commands can never interleave on the wire. Driver faults close the
//! port; the next command then fails with `PLT-C006` until `connect` runs
//! again.

pub mod discovery;
pub mod framing;

pub use discovery::{PortDescriptor, SupportedDevice, SystemSerial, SUPPORTED_DEVICES, is_supported};
pub use framing::CommandDialect;

use crate::config::SerialConfig;
use crate::errors::{ErrorCode, PlotterError};
use async_trait::async_trait;
use futures::FutureExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout, timeout_at};

/// Any byte stream usable as a serial port.
pub trait SerialStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send + ?Sized> SerialStream for T {}

pub type DynSerial = Box<dyn SerialStream>;

/// Link parameters applied on every connect.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Bound on a single write.
    pub port_timeout: Duration,
    /// Bound on the identification query after opening.
    pub liveness_timeout: Duration,
    /// Default reply bound for `send_command`.
    pub command_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::from(&SerialConfig::default())
    }
}

impl From<&SerialConfig> for SerialSettings {
    fn from(cfg: &SerialConfig) -> Self {
        Self {
            baud_rate: cfg.baud_rate,
            port_timeout: cfg.port_timeout(),
            liveness_timeout: cfg.liveness_timeout(),
            command_timeout: cfg.command_timeout(),
        }
    }
}

/// Port enumeration and opening. Implemented for real hardware and for the simulator.
#[async_trait]
pub trait SerialBackend: Send + Sync {
    fn available_ports(&self) -> io::Result<Vec<PortDescriptor>>;
    async fn open(&self, path: &str, settings: &SerialSettings) -> io::Result<DynSerial>;
}

struct Link {
    stream: DynSerial,
    port_name: String,
}

#[derive(Debug, Clone, Default)]
struct LinkInfo {
    port_name: Option<String>,
    firmware: Option<String>,
}

/// How a round trip failed before classification.
#[derive(Debug)]
enum Fault {
    Io { phase: &'static str, error: io::Error },
    Closed { phase: &'static str },
    WriteTimeout,
    ReplyTimeout { partial: String, elapsed: Duration },
}

pub struct Connection {
    backend: Arc<dyn SerialBackend>,
    settings: SerialSettings,
    link: Mutex<Option<Link>>,
    info: std::sync::Mutex<LinkInfo>,
}

impl Connection {
    pub fn new(backend: Arc<dyn SerialBackend>, settings: SerialSettings) -> Self {
        Self {
            backend,
            settings,
            link: Mutex::new(None),
            info: std::sync::Mutex::new(LinkInfo::default()),
        }
    }

    /// Connection over the operating system's serial ports.
    pub fn system(settings: SerialSettings) -> Self {
        Self::new(Arc::new(SystemSerial), settings)
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    pub fn list_ports(&self) -> Vec<PortDescriptor> {
        match self.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tracing::warn!("Serial port enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// First compatible port in enumeration order.
    pub fn find_port(&self) -> Option<String> {
        self.list_ports().into_iter().find(|p| p.compatible).map(|p| p.device)
    }

    pub fn is_connected(&self) -> bool {
        self.info().port_name.is_some()
    }

    pub fn port_name(&self) -> Option<String> {
        self.info().port_name
    }

    /// Identification reply captured on connect.
    pub fn firmware_version(&self) -> Option<String> {
        self.info().firmware
    }

    fn info(&self) -> LinkInfo {
        self.info.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_info(&self, info: LinkInfo) {
        *self.info.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    /// Opens `port`, or the first compatible port when `None`, and checks
    /// that the firmware answers. An existing link is closed first.
    pub async fn connect(&self, port: Option<&str>) -> Result<(), PlotterError> {
        let mut guard = self.link.lock().await;
        if let Some(old) = guard.take() {
            tracing::info!("Closing {} before reconnecting", old.port_name);
            self.set_info(LinkInfo::default());
        }

        let path = match port {
            Some(p) => p.to_string(),
            None => self.find_port().ok_or_else(|| {
                PlotterError::new(ErrorCode::NO_DEVICE_FOUND)
                    .with_context("reason", "no compatible USB serial device")
            })?,
        };

        tracing::info!("Opening {} at {} baud", path, self.settings.baud_rate);
        let stream = self
            .backend
            .open(&path, &self.settings)
            .await
            .map_err(|e| classify_open_error(&path, e))?;

        let mut link = Link { stream, port_name: path.clone() };
        let firmware = match self.identify(&mut link).await {
            Some(version) => version,
            None => {
                tracing::error!("{} opened but the firmware did not answer", path);
                return Err(PlotterError::new(ErrorCode::DEVICE_NOT_RESPONDING)
                    .with_context("port", path)
                    .with_context("timeout_s", self.settings.liveness_timeout.as_secs_f64()));
            }
        };

        tracing::info!("Connected to {} ({})", path, firmware);
        self.set_info(LinkInfo {
            port_name: Some(path),
            firmware: Some(firmware),
        });
        *guard = Some(link);
        Ok(())
    }

    /// `$I`, then the legacy `V`. Any complete reply counts as alive. Both
    /// queries share one liveness deadline; each gets an even split of what
    /// is left.
    async fn identify(&self, link: &mut Link) -> Option<String> {
        const QUERIES: [&str; 2] = ["$I", "V"];
        let deadline = Instant::now() + self.settings.liveness_timeout;
        for (i, query) in QUERIES.into_iter().enumerate() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let budget = remaining / (QUERIES.len() - i) as u32;
            match round_trip(&mut link.stream, query, budget, self.settings.port_timeout).await {
                Ok(reply) if !reply.trim().is_empty() => return Some(firmware_line(&reply)),
                Ok(_) => {}
                Err(_) => tracing::debug!("No reply to {:?} on {}", query, link.port_name),
            }
        }
        None
    }

    /// Closes the port if open. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let mut guard = self.link.lock().await;
        if let Some(link) = guard.take() {
            tracing::info!("Disconnected from {}", link.port_name);
        }
        self.set_info(LinkInfo::default());
    }

    /// Sends one command and returns the trimmed reply.
    pub async fn send_command(&self, command: &str, reply_timeout: Option<Duration>) -> Result<String, PlotterError> {
        let reply_timeout = reply_timeout.unwrap_or(self.settings.command_timeout);
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or_else(|| not_connected(command))?;
        let port = link.port_name.clone();

        match round_trip(&mut link.stream, command, reply_timeout, self.settings.port_timeout).await {
            Ok(reply) => {
                if reply.starts_with('!') {
                    tracing::warn!("Command {:?} rejected: {}", command, reply);
                    return Err(PlotterError::new(ErrorCode::COMMAND_REJECTED)
                        .with_context("command", command)
                        .with_context("response", reply));
                }
                Ok(reply)
            }
            Err(fault) => {
                let closes = !matches!(fault, Fault::ReplyTimeout { .. });
                if closes {
                    guard.take();
                    self.set_info(LinkInfo::default());
                }
                Err(classify_fault(fault, command, &port, reply_timeout))
            }
        }
    }

    /// Writes a command without reading a reply.
    pub async fn send_command_no_response(&self, command: &str) -> Result<(), PlotterError> {
        let mut guard = self.link.lock().await;
        let link = guard.as_mut().ok_or_else(|| not_connected(command))?;
        let port = link.port_name.clone();
        let result = match drain_input(&mut link.stream) {
            Ok(()) => write_command(&mut link.stream, command, self.settings.port_timeout).await,
            Err(fault) => Err(fault),
        };
        if let Err(fault) = result {
            guard.take();
            self.set_info(LinkInfo::default());
            return Err(classify_fault(fault, command, &port, self.settings.port_timeout));
        }
        Ok(())
    }
}

async fn round_trip(
    stream: &mut DynSerial,
    command: &str,
    reply_timeout: Duration,
    port_timeout: Duration,
) -> Result<String, Fault> {
    drain_input(stream)?;
    write_command(stream, command, port_timeout).await?;

    let start = Instant::now();
    let deadline = start + reply_timeout;
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        if framing::is_complete(command, &String::from_utf8_lossy(&buffer)) {
            let reply = String::from_utf8_lossy(&buffer).trim().to_string();
            tracing::debug!("Serial RX: {:?}", reply);
            return Ok(reply);
        }
        match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => return Err(Fault::Closed { phase: "read" }),
            Ok(Ok(n)) => buffer.extend_from_slice(&chunk[..n]),
            Ok(Err(error)) => return Err(Fault::Io { phase: "read", error }),
            Err(_) => {
                return Err(Fault::ReplyTimeout {
                    partial: String::from_utf8_lossy(&buffer).into_owned(),
                    elapsed: start.elapsed(),
                });
            }
        }
    }
}

/// Discards bytes already waiting so the next reply is not confused with stale output.
fn drain_input(stream: &mut DynSerial) -> Result<(), Fault> {
    let mut scratch = [0u8; 256];
    loop {
        match stream.read(&mut scratch).now_or_never() {
            None => return Ok(()),
            Some(Ok(0)) => return Err(Fault::Closed { phase: "read" }),
            Some(Ok(n)) => tracing::trace!("Discarded {} stale bytes", n),
            Some(Err(error)) => return Err(Fault::Io { phase: "read", error }),
        }
    }
}

async fn write_command(stream: &mut DynSerial, command: &str, port_timeout: Duration) -> Result<(), Fault> {
    let bytes = framing::encode(command);
    tracing::debug!("Serial TX: {:?}", String::from_utf8_lossy(&bytes));
    let write = async {
        stream.write_all(&bytes).await?;
        stream.flush().await
    };
    match timeout(port_timeout, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(Fault::Io { phase: "write", error }),
        Err(_) => Err(Fault::WriteTimeout),
    }
}

fn classify_fault(fault: Fault, command: &str, port: &str, reply_timeout: Duration) -> PlotterError {
    match fault {
        Fault::ReplyTimeout { partial, elapsed } => {
            tracing::warn!("No complete reply to {:?} within {:?}", command, reply_timeout);
            PlotterError::new(ErrorCode::RESPONSE_TIMEOUT)
                .with_context("command", command)
                .with_context("timeout_s", reply_timeout.as_secs_f64())
                .with_context("elapsed_s", elapsed.as_secs_f64())
                .with_context("partial_response", partial)
        }
        Fault::Io { phase, error } => {
            tracing::error!("Serial {} failed on {}: {}", phase, port, error);
            disconnected(command, port, phase).with_context("reason", error.to_string()).with_cause(error)
        }
        Fault::Closed { phase } => {
            tracing::error!("Serial port {} closed during {}", port, phase);
            disconnected(command, port, phase).with_context("reason", "port closed")
        }
        Fault::WriteTimeout => {
            tracing::error!("Serial write to {} timed out", port);
            disconnected(command, port, "write").with_context("reason", "write timed out")
        }
    }
}

fn disconnected(command: &str, port: &str, phase: &str) -> PlotterError {
    PlotterError::new(ErrorCode::DEVICE_DISCONNECTED)
        .with_context("command", command)
        .with_context("port", port)
        .with_context("phase", phase)
}

fn not_connected(command: &str) -> PlotterError {
    PlotterError::new(ErrorCode::NOT_CONNECTED).with_context("command", command)
}

/// Maps a driver open failure onto a connection code.
pub fn classify_open_error(port: &str, error: io::Error) -> PlotterError {
    let text = error.to_string().to_lowercase();
    let code = if error.kind() == io::ErrorKind::PermissionDenied
        || text.contains("permission")
        || text.contains("access")
    {
        ErrorCode::PERMISSION_DENIED
    } else if error.raw_os_error() == Some(16)
        || text.contains("busy")
        || text.contains("in use")
        || text.contains("resource")
    {
        ErrorCode::PORT_BUSY
    } else {
        ErrorCode::NO_DEVICE_FOUND
    };
    tracing::error!("Failed to open {}: {}", port, error);
    PlotterError::new(code)
        .with_context("port", port)
        .with_context("reason", error.to_string())
        .with_cause(error)
}

/// First meaningful line of an identification reply.
fn firmware_line(reply: &str) -> String {
    reply
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && *l != "ok")
        .unwrap_or(reply.trim())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
        assert!(classify_open_error("/dev/ttyUSB0", denied).is(&ErrorCode::PERMISSION_DENIED));

        let busy = io::Error::from_raw_os_error(16);
        assert!(classify_open_error("/dev/ttyUSB0", busy).is(&ErrorCode::PORT_BUSY));

        let in_use = io::Error::other("port is in use by another process");
        assert!(classify_open_error("COM3", in_use).is(&ErrorCode::PORT_BUSY));

        let missing = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        assert!(classify_open_error("/dev/ttyUSB9", missing).is(&ErrorCode::NO_DEVICE_FOUND));
    }

    #[tokio::test]
    async fn test_round_trip_frames_protocol_command() {
        let mock = tokio_test::io::Builder::new().write(b"G21\n").read(b"ok\r\n").build();
        let mut stream: DynSerial = Box::new(mock);
        let reply = round_trip(&mut stream, "G21", Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn test_round_trip_reassembles_status_report() {
        let mock = tokio_test::io::Builder::new()
            .write(b"?")
            .read(b"<Idle|MPos:1.000,")
            .read(b"2.000,0.000|FS:0,0>\r\n")
            .build();
        let mut stream: DynSerial = Box::new(mock);
        let reply = round_trip(&mut stream, "?", Duration::from_secs(1), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "<Idle|MPos:1.000,2.000,0.000|FS:0,0>");
    }

    #[test]
    fn test_firmware_line_skips_ok() {
        assert_eq!(firmware_line("[VER:1.1h.20190825:]\r\n[OPT:V,15,128]\r\nok"), "[VER:1.1h.20190825:]");
        assert_eq!(firmware_line("EBBv13 EB Firmware Version 2.8.1"), "EBBv13 EB Firmware Version 2.8.1");
    }
}
