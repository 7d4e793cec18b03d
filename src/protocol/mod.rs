// src/protocol/mod.rs - GRBL command layer for the pen plotter
//!
//! Pen height is the Z axis: the up height is the lower Z value. Motion is
//! absolute (`G90`) in millimetres (`G21`). Every controller reply passes
//! through [`classify_reply`] before it reaches the caller.

pub mod status;
#[cfg(feature = "legacy-dialect")]
pub mod legacy;

pub use status::{ControllerState, DeviceStatus, Position};

use crate::config::{MotionConfig, PenConfig};
use crate::errors::{ErrorCode, PlotterError};
use crate::poll::{BoundedPoll, PollOutcome};
use crate::transport::Connection;
use crate::transport::framing::{CYCLE_START, FEED_HOLD, SOFT_RESET};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Z travel limit for pen heights.
pub const MAX_PEN_HEIGHT_MM: f64 = 10.0;
/// Z tolerance when inferring pen state from a status report.
const PEN_UP_TOLERANCE_MM: f64 = 0.5;

const FEED_HOLD_SETTLE: Duration = Duration::from_millis(100);
const SOFT_RESET_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PenState {
    Up,
    Down,
    Unknown,
}

/// Physical pause button, read from the controller's Hold state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseButton {
    Pressed,
    Released,
    /// Status query failed.
    Unknown,
}

/// Connection and machine summary for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotterStatus {
    pub connected: bool,
    pub port: Option<String>,
    pub firmware_version: Option<String>,
    pub pen_state: PenState,
    pub motors_enabled: bool,
}

#[derive(Debug, Clone)]
struct MachineCache {
    position: Position,
    pen_state: PenState,
    motors_enabled: bool,
    up_height: f64,
    down_height: f64,
}

pub struct GrblPlotter {
    conn: Arc<Connection>,
    motion: MotionConfig,
    pen_timeout: Duration,
    cache: Mutex<MachineCache>,
}

impl GrblPlotter {
    pub fn new(conn: Arc<Connection>, pen: &PenConfig, motion: MotionConfig) -> Self {
        Self {
            conn,
            motion,
            pen_timeout: pen.timeout(),
            cache: Mutex::new(MachineCache {
                position: Position::default(),
                pen_state: PenState::Unknown,
                motors_enabled: false,
                up_height: pen.up_height_mm,
                down_height: pen.down_height_mm,
            }),
        }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    pub fn motion(&self) -> &MotionConfig {
        &self.motion
    }

    fn cache(&self) -> MutexGuard<'_, MachineCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Units, positioning mode and plane, then syncs the cached position.
    pub async fn initialize(&self) -> Result<(), PlotterError> {
        self.send_gcode("G21").await?;
        self.send_gcode("G90").await?;
        self.send_gcode("G17").await?;

        let status = self.query_status().await?;
        let mut cache = self.cache();
        cache.position = status.machine_position;
        cache.pen_state = if status.machine_position.z <= cache.up_height + PEN_UP_TOLERANCE_MM {
            PenState::Up
        } else {
            PenState::Down
        };
        tracing::info!(
            "Controller initialized at ({:.3}, {:.3}, {:.3}), pen {:?}",
            cache.position.x,
            cache.position.y,
            cache.position.z,
            cache.pen_state
        );
        Ok(())
    }

    pub async fn version(&self) -> Result<String, PlotterError> {
        self.conn.send_command("$I", None).await
    }

    pub async fn pen_up(&self) -> Result<(), PlotterError> {
        let height = self.cache().up_height;
        self.move_pen(height, PenState::Up).await
    }

    pub async fn pen_down(&self) -> Result<(), PlotterError> {
        let height = self.cache().down_height;
        self.move_pen(height, PenState::Down).await
    }

    async fn move_pen(&self, height: f64, state: PenState) -> Result<(), PlotterError> {
        self.send_gcode(&format!("G00 Z{:.3}", height)).await?;
        {
            let mut cache = self.cache();
            cache.pen_state = state;
            cache.position.z = height;
        }
        self.wait_for_idle(self.pen_timeout).await
    }

    /// Changes the pen heights used by later pen moves.
    pub fn set_pen_heights(&self, up_height_mm: f64, down_height_mm: f64) -> Result<(), PlotterError> {
        let in_range = |h: f64| (0.0..=MAX_PEN_HEIGHT_MM).contains(&h);
        if !in_range(up_height_mm) || !in_range(down_height_mm) || down_height_mm <= up_height_mm {
            return Err(PlotterError::new(ErrorCode::BOUNDS_EXCEEDED)
                .with_context("up_height_mm", up_height_mm)
                .with_context("down_height_mm", down_height_mm)
                .with_context("max_height_mm", MAX_PEN_HEIGHT_MM));
        }
        let mut cache = self.cache();
        cache.up_height = up_height_mm;
        cache.down_height = down_height_mm;
        tracing::info!("Pen heights set: up={}mm, down={}mm", up_height_mm, down_height_mm);
        Ok(())
    }

    pub fn pen_heights(&self) -> (f64, f64) {
        let cache = self.cache();
        (cache.up_height, cache.down_height)
    }

    pub fn pen_state(&self) -> PenState {
        self.cache().pen_state
    }

    /// Clears an alarm lock (`$X`).
    pub async fn enable_motors(&self) -> Result<(), PlotterError> {
        self.send_gcode("$X").await?;
        self.cache().motors_enabled = true;
        tracing::info!("Motors enabled");
        Ok(())
    }

    pub async fn disable_motors(&self) -> Result<(), PlotterError> {
        if let Err(e) = self.send_gcode("M18").await {
            tracing::debug!("M18 failed ({}), falling back to $SLP", e);
            self.send_gcode("$SLP").await?;
        }
        self.cache().motors_enabled = false;
        tracing::info!("Motors disabled");
        Ok(())
    }

    /// Rapid move when `feed` is `None`, linear move otherwise. Targets and
    /// feed are clamped to the machine envelope.
    pub async fn move_absolute(&self, x: f64, y: f64, feed: Option<f64>) -> Result<(), PlotterError> {
        let x = self.motion.clamp_x(x);
        let y = self.motion.clamp_y(y);
        let gcode = match feed {
            None => format!("G00 X{:.3} Y{:.3}", x, y),
            Some(f) => format!("G01 X{:.3} Y{:.3} F{:.1}", x, y, self.motion.clamp_feed(f)),
        };
        self.send_gcode(&gcode).await?;
        let mut cache = self.cache();
        cache.position.x = x;
        cache.position.y = y;
        Ok(())
    }

    /// Runs the homing cycle and re-syncs the cached position.
    pub async fn home(&self, timeout: Duration) -> Result<(), PlotterError> {
        let result = async {
            // `$H` is answered only once the cycle finishes.
            self.send_gcode_with_timeout("$H", timeout).await?;
            self.wait_for_idle(timeout).await?;
            self.query_status().await
        }
        .await;

        match result {
            Ok(status) => {
                let mut cache = self.cache();
                cache.position = status.machine_position;
                cache.pen_state = PenState::Up;
                tracing::info!(
                    "Homing completed at ({:.3}, {:.3}, {:.3})",
                    status.machine_position.x,
                    status.machine_position.y,
                    status.machine_position.z
                );
                Ok(())
            }
            Err(e) if e.is(&ErrorCode::CONTROLLER_ALARM) => {
                tracing::error!("Alarm during homing: {}", e);
                Err(PlotterError::new(ErrorCode::HOMING_FAILED)
                    .with_context("phase", "homing")
                    .with_context("error", e.to_string())
                    .with_cause(e))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn query_status(&self) -> Result<DeviceStatus, PlotterError> {
        let reply = self.conn.send_command("?", None).await?;
        Ok(DeviceStatus::parse(&reply))
    }

    /// Feed hold, soft reset, then a best-effort unlock.
    pub async fn emergency_stop(&self) -> Result<(), PlotterError> {
        self.conn.send_command_no_response(&FEED_HOLD.to_string()).await?;
        tokio::time::sleep(FEED_HOLD_SETTLE).await;
        self.conn.send_command_no_response(&SOFT_RESET.to_string()).await?;
        tokio::time::sleep(SOFT_RESET_SETTLE).await;
        if let Err(e) = self.conn.send_command("$X", None).await {
            tracing::debug!("Unlock after reset failed: {}", e);
        }
        self.cache().pen_state = PenState::Unknown;
        tracing::warn!("Emergency stop executed");
        Ok(())
    }

    /// Resumes motion after a controller feed hold.
    pub async fn cycle_start(&self) -> Result<(), PlotterError> {
        self.conn.send_command_no_response(&CYCLE_START.to_string()).await
    }

    /// Polls status until Idle. An alarm fails at once.
    pub async fn wait_for_idle(&self, timeout: Duration) -> Result<(), PlotterError> {
        let poll = BoundedPoll::new(self.motion.idle_poll(), timeout);
        let outcome = poll
            .until(|| async move {
                let status = self.query_status().await?;
                if status.is_idle() {
                    return Ok(Some(()));
                }
                if status.is_alarm() {
                    let p = status.machine_position;
                    return Err(PlotterError::new(ErrorCode::CONTROLLER_ALARM)
                        .with_context("alarm_state", status.state.to_string())
                        .with_context("position", vec![p.x, p.y, p.z]));
                }
                Ok(None)
            })
            .await?;
        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            PollOutcome::TimedOut { elapsed } => Err(PlotterError::new(ErrorCode::MOTION_TIMEOUT)
                .with_context("timeout_s", timeout.as_secs_f64())
                .with_context("elapsed_s", elapsed.as_secs_f64())),
        }
    }

    pub async fn is_idle(&self) -> Result<bool, PlotterError> {
        Ok(self.query_status().await?.is_idle())
    }

    pub async fn query_pause_button(&self) -> PauseButton {
        match self.query_status().await {
            Ok(status) if status.is_hold() => PauseButton::Pressed,
            Ok(_) => PauseButton::Released,
            Err(e) => {
                tracing::warn!("Pause button query failed: {}", e);
                PauseButton::Unknown
            }
        }
    }

    /// Fails with `PLT-U001` while the controller is in feed hold.
    pub async fn check_for_pause_button(&self) -> Result<(), PlotterError> {
        match self.query_pause_button().await {
            PauseButton::Pressed => Err(PlotterError::new(ErrorCode::PAUSE_BUTTON)),
            _ => Ok(()),
        }
    }

    /// This controller reports no motor voltage, so there is nothing to check.
    pub async fn check_voltage(&self) -> Result<(), PlotterError> {
        tracing::debug!("Voltage check skipped: not reported by controller");
        Ok(())
    }

    pub fn current_position(&self) -> (f64, f64) {
        let p = self.cache().position;
        (p.x, p.y)
    }

    pub fn status(&self) -> PlotterStatus {
        let cache = self.cache();
        PlotterStatus {
            connected: self.conn.is_connected(),
            port: self.conn.port_name(),
            firmware_version: self.conn.firmware_version(),
            pen_state: cache.pen_state,
            motors_enabled: cache.motors_enabled,
        }
    }

    /// Pen-up move for calibration; `speed` is in mm/s.
    pub async fn move_to_position(&self, x: f64, y: f64, speed_mm_s: f64) -> Result<(), PlotterError> {
        self.pen_up().await?;
        self.move_absolute(x, y, Some(speed_mm_s * 60.0)).await?;
        self.wait_for_idle(self.motion.move_timeout()).await?;
        tracing::info!("Moved to position ({}, {}) mm", x, y);
        Ok(())
    }

    /// Square with both diagonals, starting at the current position.
    pub async fn draw_test_pattern(&self, size_mm: f64, speed_mm_s: f64) -> Result<(), PlotterError> {
        let result = self.trace_test_pattern(size_mm, speed_mm_s * 60.0).await;
        if result.is_err() {
            if let Err(e) = self.pen_up().await {
                tracing::warn!("Pen up after failed test pattern: {}", e);
            }
        }
        result
    }

    async fn trace_test_pattern(&self, size: f64, feed: f64) -> Result<(), PlotterError> {
        let (x0, y0) = self.current_position();
        let timeout = self.motion.move_timeout();

        self.pen_down().await?;
        for (x, y) in [(x0 + size, y0), (x0 + size, y0 + size), (x0, y0 + size), (x0, y0)] {
            self.move_absolute(x, y, Some(feed)).await?;
            self.wait_for_idle(timeout).await?;
        }
        self.pen_up().await?;

        self.pen_down().await?;
        self.move_absolute(x0 + size, y0 + size, Some(feed)).await?;
        self.wait_for_idle(timeout).await?;
        self.pen_up().await?;

        self.move_absolute(x0 + size, y0, None).await?;
        self.wait_for_idle(timeout).await?;
        self.pen_down().await?;
        self.move_absolute(x0, y0 + size, Some(feed)).await?;
        self.wait_for_idle(timeout).await?;
        self.pen_up().await?;

        self.move_absolute(x0, y0, None).await?;
        self.wait_for_idle(timeout).await?;
        tracing::info!("Test pattern drawn ({}mm square with diagonals)", size);
        Ok(())
    }

    /// Sends a command and maps `error:`/`ALARM:` replies onto error codes.
    pub async fn send_gcode(&self, gcode: &str) -> Result<String, PlotterError> {
        let reply = self.conn.send_command(gcode, None).await?;
        classify_reply(gcode, reply)
    }

    async fn send_gcode_with_timeout(&self, gcode: &str, timeout: Duration) -> Result<String, PlotterError> {
        let reply = self.conn.send_command(gcode, Some(timeout)).await?;
        classify_reply(gcode, reply)
    }
}

/// Passes `ok` replies through; `error:<n>` and `ALARM:<n>` become errors.
pub fn classify_reply(gcode: &str, reply: String) -> Result<String, PlotterError> {
    for line in reply.lines().map(str::trim) {
        let lower = line.to_ascii_lowercase();
        if let Some(n) = lower.strip_prefix("error:") {
            let code = match n.trim().parse::<u32>() {
                Ok(9) => ErrorCode::POSITION_UNKNOWN,
                _ => ErrorCode::CONTROLLER_ERROR,
            };
            tracing::warn!("{:?} answered {}", gcode, line);
            return Err(PlotterError::new(code)
                .with_context("gcode", gcode)
                .with_context("grbl_error", n.trim())
                .with_context("response", reply.as_str()));
        }
        if let Some(n) = lower.strip_prefix("alarm:") {
            let code = match n.trim().parse::<u32>() {
                Ok(1) => ErrorCode::HARD_LIMIT,
                Ok(2) => ErrorCode::SOFT_LIMIT,
                Ok(6..=9) => ErrorCode::HOMING_FAILED,
                _ => ErrorCode::CONTROLLER_ALARM,
            };
            tracing::error!("{:?} answered {}", gcode, line);
            return Err(PlotterError::new(code)
                .with_context("gcode", gcode)
                .with_context("alarm", n.trim())
                .with_context("response", reply.as_str()));
        }
    }
    Ok(reply)
}
