// src/sim/mod.rs - In-process GRBL-style plotter for tests and dry runs
//!
//! [`SimulatedPlotter`] is a [`SerialBackend`]: each `open` starts a fresh
//! device session on one end of a `tokio::io::duplex` pipe. Machine state and
//! injected faults are shared across sessions, so a reconnect sees the same
//! machine.

use crate::protocol::{ControllerState, Position};
use crate::transport::{DynSerial, PortDescriptor, SerialBackend, SerialSettings};
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

pub const SIM_PORT: &str = "/dev/ttySIM0";
const FIRMWARE: &str = "[VER:1.1h.20190825:DrawCore SIM]\r\n[OPT:V,15,128]\r\nok\r\n";
const BANNER: &str = "\r\nGrbl 1.1h ['$' for help]\r\n";

#[derive(Debug)]
struct SimState {
    present: bool,
    position: Position,
    state: ControllerState,
    commands: Vec<String>,
    scripts: Vec<(String, String)>,
    silent: bool,
    disconnect_after: Option<usize>,
    open_error: Option<(io::ErrorKind, String)>,
    busy_polls: usize,
    pending_run: usize,
    sessions: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            present: true,
            position: Position::default(),
            state: ControllerState::Idle,
            commands: Vec::new(),
            scripts: Vec::new(),
            silent: false,
            disconnect_after: None,
            open_error: None,
            busy_polls: 0,
            pending_run: 0,
            sessions: 0,
        }
    }
}

enum Reply {
    Text(String),
    Nothing,
    Drop,
}

/// Shared handle onto one simulated machine.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPlotter {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedPlotter {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every command received, real-time bytes included, in arrival order.
    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.state().commands.iter().filter(|c| c.as_str() == command).count()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    pub fn position(&self) -> Position {
        self.state().position
    }

    pub fn controller_state(&self) -> ControllerState {
        self.state().state.clone()
    }

    /// Number of device sessions opened so far.
    pub fn sessions(&self) -> usize {
        self.state().sessions
    }

    /// Hides the device from enumeration and opening.
    pub fn set_present(&self, present: bool) {
        self.state().present = present;
    }

    /// Commands are still recorded, but nothing is answered.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    /// The `n`-th command from now closes the link without a reply.
    pub fn disconnect_after(&self, n: usize) {
        self.state().disconnect_after = Some(n.max(1));
    }

    /// Answers any line starting with `prefix` with `reply` instead of the normal handling.
    pub fn script_reply(&self, prefix: &str, reply: &str) {
        self.state().scripts.push((prefix.to_string(), reply.to_string()));
    }

    pub fn clear_scripts(&self) {
        self.state().scripts.clear();
    }

    /// Status reports `Run` for this many polls after each motion command.
    pub fn set_busy_polls(&self, polls: usize) {
        self.state().busy_polls = polls;
    }

    /// Enters feed hold, as the physical pause button does. `~` releases it.
    pub fn press_pause_button(&self) {
        self.state().state = ControllerState::Hold;
    }

    /// Locks the controller in Alarm until `$X` or `$H`.
    pub fn raise_alarm(&self) {
        self.state().state = ControllerState::Alarm;
    }

    pub fn fail_open(&self, kind: io::ErrorKind, message: &str) {
        self.state().open_error = Some((kind, message.to_string()));
    }

    pub fn descriptor() -> PortDescriptor {
        PortDescriptor::usb(SIM_PORT, 0x1A86, 0x7523, Some("Simulated plotter".to_string()), None)
    }

    fn respond(&self, command: &str) -> Reply {
        let mut s = self.state();
        s.commands.push(command.to_string());

        if let Some(n) = s.disconnect_after {
            if n <= 1 {
                s.disconnect_after = None;
                tracing::debug!("sim: dropping link on {:?}", command);
                return Reply::Drop;
            }
            s.disconnect_after = Some(n - 1);
        }
        if s.silent {
            return Reply::Nothing;
        }
        if let Some((_, reply)) = s.scripts.iter().find(|(p, _)| command.starts_with(p.as_str())) {
            return Reply::Text(format!("{}\r\n", reply));
        }

        match command {
            "?" => Reply::Text(status_report(&mut s)),
            "!" => {
                if s.state != ControllerState::Alarm {
                    s.state = ControllerState::Hold;
                }
                Reply::Nothing
            }
            "~" => {
                if s.state == ControllerState::Hold {
                    s.state = ControllerState::Idle;
                }
                Reply::Nothing
            }
            "\x18" => {
                s.state = ControllerState::Idle;
                s.pending_run = 0;
                Reply::Text(BANNER.to_string())
            }
            line => Reply::Text(execute_line(&mut s, line)),
        }
    }
}

fn status_report(s: &mut SimState) -> String {
    let state = if s.state == ControllerState::Hold {
        "Hold:0".to_string()
    } else if s.state == ControllerState::Idle && s.pending_run > 0 {
        s.pending_run -= 1;
        "Run".to_string()
    } else {
        s.state.to_string()
    };
    let p = s.position;
    format!("<{}|MPos:{:.3},{:.3},{:.3}|FS:0,0>\r\n", state, p.x, p.y, p.z)
}

fn execute_line(s: &mut SimState, line: &str) -> String {
    let upper = line.to_ascii_uppercase();
    if s.state == ControllerState::Alarm && !upper.starts_with('$') {
        return "error:9\r\n".to_string();
    }
    match upper.as_str() {
        "$I" => FIRMWARE.to_string(),
        "$X" => {
            s.state = ControllerState::Idle;
            "[MSG:Caution: Unlocked]\r\nok\r\n".to_string()
        }
        "$H" => {
            s.position = Position::default();
            s.state = ControllerState::Idle;
            "ok\r\n".to_string()
        }
        "$SLP" => {
            s.state = ControllerState::Sleep;
            "ok\r\n".to_string()
        }
        cmd if cmd.starts_with("G0") || cmd.starts_with("G1") => {
            apply_motion(s, cmd);
            "ok\r\n".to_string()
        }
        cmd if cmd.starts_with('G') || cmd.starts_with('M') || cmd.starts_with('$') => "ok\r\n".to_string(),
        _ => "error:20\r\n".to_string(),
    }
}

fn apply_motion(s: &mut SimState, cmd: &str) {
    for word in cmd.split_whitespace().skip(1) {
        let (axis, value) = word.split_at(1);
        let Ok(v) = value.parse::<f64>() else {
            continue;
        };
        match axis {
            "X" => s.position.x = v,
            "Y" => s.position.y = v,
            "Z" => s.position.z = v,
            _ => {}
        }
    }
    s.pending_run = s.busy_polls;
}

async fn run_session(sim: SimulatedPlotter, mut io: DuplexStream) {
    let mut line = String::new();
    let mut buf = [0u8; 256];
    loop {
        let n = match io.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            let reply = match byte {
                b'?' | b'!' | b'~' | 0x18 => sim.respond(&(byte as char).to_string()),
                b'\n' | b'\r' => {
                    let command = std::mem::take(&mut line);
                    let command = command.trim();
                    if command.is_empty() {
                        continue;
                    }
                    sim.respond(command)
                }
                _ => {
                    line.push(byte as char);
                    continue;
                }
            };
            match reply {
                Reply::Text(text) => {
                    if io.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Reply::Nothing => {}
                Reply::Drop => return,
            }
        }
    }
    tracing::debug!("sim: session closed");
}

#[async_trait]
impl SerialBackend for SimulatedPlotter {
    fn available_ports(&self) -> io::Result<Vec<PortDescriptor>> {
        if self.state().present {
            Ok(vec![Self::descriptor()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn open(&self, path: &str, _settings: &SerialSettings) -> io::Result<DynSerial> {
        {
            let mut s = self.state();
            if let Some((kind, message)) = &s.open_error {
                return Err(io::Error::new(*kind, message.clone()));
            }
            if !s.present || path != SIM_PORT {
                return Err(io::Error::new(io::ErrorKind::NotFound, "No such file or directory"));
            }
            s.sessions += 1;
        }
        let (host, device) = tokio::io::duplex(4096);
        tokio::spawn(run_session(self.clone(), device));
        Ok(Box::new(host))
    }
}
