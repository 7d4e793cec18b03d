//! # Plotter Configuration
//!
//! Host-side settings for the serial link, pen servo heights, motion envelope,
//! homing and the plot executor. Every field has a default, so an empty file
//! is a valid configuration.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//!
//! [pen]
//! up_height_mm = 0.0
//! down_height_mm = 4.5
//!
//! [page]
//! width_mm = 297.0
//! height_mm = 420.0
//! ```

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration struct for the plotter host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PlotterConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub pen: PenConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub homing: HomingConfig,
    #[serde(default)]
    pub page: PageConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SerialConfig {
    /// Explicit device path. Auto-detected when absent.
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-operation port timeout.
    #[serde(default = "default_port_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_liveness_timeout_ms")]
    pub liveness_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_port_timeout_ms(),
            liveness_timeout_ms: default_liveness_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl SerialConfig {
    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PenConfig {
    #[serde(default = "default_pen_up")]
    pub up_height_mm: f64,
    #[serde(default = "default_pen_down")]
    pub down_height_mm: f64,
    /// Idle-wait bound after a pen move.
    #[serde(default = "default_pen_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PenConfig {
    fn default() -> Self {
        Self {
            up_height_mm: default_pen_up(),
            down_height_mm: default_pen_down(),
            timeout_ms: default_pen_timeout_ms(),
        }
    }
}

impl PenConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Feed rate for pen-down moves, mm/min
    #[serde(default = "default_draw_feed")]
    pub draw_feed: f64,
    #[serde(default = "default_min_feed")]
    pub min_feed: f64,
    #[serde(default = "default_max_feed")]
    pub max_feed: f64,
    #[serde(default = "default_x_min")]
    pub x_min: f64,
    #[serde(default = "default_x_max")]
    pub x_max: f64,
    #[serde(default = "default_y_min")]
    pub y_min: f64,
    #[serde(default = "default_y_max")]
    pub y_max: f64,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
    /// Idle-wait bound after each plotted move.
    #[serde(default = "default_move_timeout_ms")]
    pub move_timeout_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            draw_feed: default_draw_feed(),
            min_feed: default_min_feed(),
            max_feed: default_max_feed(),
            x_min: default_x_min(),
            x_max: default_x_max(),
            y_min: default_y_min(),
            y_max: default_y_max(),
            idle_poll_ms: default_idle_poll_ms(),
            move_timeout_ms: default_move_timeout_ms(),
        }
    }
}

impl MotionConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_millis(self.move_timeout_ms)
    }

    pub fn clamp_x(&self, x: f64) -> f64 {
        x.clamp(self.x_min, self.x_max)
    }

    pub fn clamp_y(&self, y: f64) -> f64 {
        y.clamp(self.y_min, self.y_max)
    }

    pub fn clamp_feed(&self, feed: f64) -> f64 {
        feed.clamp(self.min_feed, self.max_feed)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HomingConfig {
    #[serde(default = "default_homing_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause after homing before the first status query.
    #[serde(default = "default_homing_settle_ms")]
    pub settle_ms: u64,
    /// Pause after the rapid move to the reference corner.
    #[serde(default = "default_positioning_settle_ms")]
    pub positioning_settle_ms: u64,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_homing_timeout_ms(),
            settle_ms: default_homing_settle_ms(),
            positioning_settle_ms: default_positioning_settle_ms(),
        }
    }
}

impl HomingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn positioning_settle(&self) -> Duration {
        Duration::from_millis(self.positioning_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PageConfig {
    #[serde(default = "default_page_width")]
    pub width_mm: f64,
    #[serde(default = "default_page_height")]
    pub height_mm: f64,
    /// Overrides the reference corner derived from the page size.
    #[serde(default)]
    pub reference_x: Option<f64>,
    #[serde(default)]
    pub reference_y: Option<f64>,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            width_mm: default_page_width(),
            height_mm: default_page_height(),
            reference_x: None,
            reference_y: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutorConfig {
    /// Hold indicator is polled once every this many instructions.
    #[serde(default = "default_pause_poll_every")]
    pub pause_poll_every: usize,
    #[serde(default = "default_pause_interval_ms")]
    pub pause_interval_ms: u64,
    #[serde(default = "default_min_displacement")]
    pub min_displacement_mm: f64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            pause_poll_every: default_pause_poll_every(),
            pause_interval_ms: default_pause_interval_ms(),
            min_displacement_mm: default_min_displacement(),
        }
    }
}

impl ExecutorConfig {
    pub fn pause_interval(&self) -> Duration {
        Duration::from_millis(self.pause_interval_ms)
    }
}

impl PlotterConfig {
    /// Reads and validates a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PlotterConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pen.down_height_mm <= self.pen.up_height_mm {
            return Err(ConfigError::Invalid(format!(
                "pen.down_height_mm ({}) must be greater than pen.up_height_mm ({})",
                self.pen.down_height_mm, self.pen.up_height_mm
            )));
        }
        let m = &self.motion;
        if m.min_feed <= 0.0 || m.min_feed >= m.max_feed {
            return Err(ConfigError::Invalid(format!(
                "motion feed range {}..{} is empty",
                m.min_feed, m.max_feed
            )));
        }
        if m.x_min >= m.x_max || m.y_min >= m.y_max {
            return Err(ConfigError::Invalid("motion travel envelope is empty".to_string()));
        }
        if self.page.width_mm <= 0.0 || self.page.height_mm <= 0.0 {
            return Err(ConfigError::Invalid("page size must be positive".to_string()));
        }
        if self.executor.pause_poll_every == 0 {
            return Err(ConfigError::Invalid("executor.pause_poll_every must be at least 1".to_string()));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("serial.baud_rate must be positive".to_string()));
        }
        Ok(())
    }
}

fn default_baud_rate() -> u32 { 115200 }
fn default_port_timeout_ms() -> u64 { 1000 }
fn default_liveness_timeout_ms() -> u64 { 3000 }
fn default_command_timeout_ms() -> u64 { 5000 }
fn default_pen_up() -> f64 { 0.0 }
fn default_pen_down() -> f64 { 5.0 }
fn default_pen_timeout_ms() -> u64 { 5000 }
fn default_draw_feed() -> f64 { 2000.0 }
fn default_min_feed() -> f64 { 50.0 }
fn default_max_feed() -> f64 { 2500.0 }
fn default_x_min() -> f64 { 0.0 }
fn default_x_max() -> f64 { 297.0 }
fn default_y_min() -> f64 { -420.0 }
fn default_y_max() -> f64 { 420.0 }
fn default_idle_poll_ms() -> u64 { 50 }
fn default_move_timeout_ms() -> u64 { 60_000 }
fn default_homing_timeout_ms() -> u64 { 60_000 }
fn default_homing_settle_ms() -> u64 { 5000 }
fn default_positioning_settle_ms() -> u64 { 1000 }
fn default_page_width() -> f64 { 210.0 }
fn default_page_height() -> f64 { 297.0 }
fn default_pause_poll_every() -> usize { 10 }
fn default_pause_interval_ms() -> u64 { 100 }
fn default_min_displacement() -> f64 { 0.01 }
