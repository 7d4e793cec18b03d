// src/protocol/status.rs - Status report tokenizer
//!
//! Parses replies of the form `<State|MPos:x,y,z|FS:feed,spindle|Pn:XY|...>`.
//! Fields that are missing or malformed keep their defaults.

use serde::{Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Run,
    Hold,
    Jog,
    Alarm,
    Door,
    Check,
    Home,
    Sleep,
    Unknown(String),
}

impl ControllerState {
    pub fn parse(token: &str) -> Self {
        match token {
            "Idle" => ControllerState::Idle,
            "Run" => ControllerState::Run,
            "Hold" => ControllerState::Hold,
            "Jog" => ControllerState::Jog,
            "Alarm" => ControllerState::Alarm,
            "Door" => ControllerState::Door,
            "Check" => ControllerState::Check,
            "Home" => ControllerState::Home,
            "Sleep" => ControllerState::Sleep,
            other => ControllerState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ControllerState::Idle => "Idle",
            ControllerState::Run => "Run",
            ControllerState::Hold => "Hold",
            ControllerState::Jog => "Jog",
            ControllerState::Alarm => "Alarm",
            ControllerState::Door => "Door",
            ControllerState::Check => "Check",
            ControllerState::Home => "Home",
            ControllerState::Sleep => "Sleep",
            ControllerState::Unknown(s) => s,
        }
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::Unknown("Unknown".to_string())
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ControllerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl std::ops::Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// One parsed status report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub state: ControllerState,
    /// Numeric qualifier such as the `0` in `Hold:0`.
    pub sub_state: Option<u8>,
    pub machine_position: Position,
    pub work_position: Option<Position>,
    pub work_offset: Option<Position>,
    pub feed_rate: f64,
    pub spindle_speed: f64,
    /// Triggered input pins, e.g. `XP`.
    pub pins: Option<String>,
}

impl DeviceStatus {
    pub fn parse(reply: &str) -> Self {
        let mut status = DeviceStatus::default();
        let Some(body) = report_body(reply) else {
            return status;
        };

        let mut fields = body.split('|');
        if let Some(state) = fields.next() {
            let (name, sub) = match state.split_once(':') {
                Some((name, sub)) => (name, sub.parse().ok()),
                None => (state, None),
            };
            if !name.is_empty() {
                status.state = ControllerState::parse(name);
            }
            status.sub_state = sub;
        }

        let mut have_mpos = false;
        for field in fields {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key {
                "MPos" => {
                    if let Some(p) = parse_position(value) {
                        status.machine_position = p;
                        have_mpos = true;
                    }
                }
                "WPos" => status.work_position = parse_position(value),
                "WCO" => status.work_offset = parse_position(value),
                "FS" | "F" => {
                    let mut parts = value.split(',').map(|v| v.trim().parse::<f64>());
                    if let Some(Ok(feed)) = parts.next() {
                        status.feed_rate = feed;
                    }
                    if let Some(Ok(spindle)) = parts.next() {
                        status.spindle_speed = spindle;
                    }
                }
                "Pn" if !value.is_empty() => status.pins = Some(value.to_string()),
                _ => {}
            }
        }

        if !have_mpos {
            if let (Some(w), Some(o)) = (status.work_position, status.work_offset) {
                status.machine_position = w + o;
            }
        }
        status
    }

    pub fn is_idle(&self) -> bool {
        self.state == ControllerState::Idle
    }

    pub fn is_alarm(&self) -> bool {
        self.state == ControllerState::Alarm
    }

    pub fn is_hold(&self) -> bool {
        self.state == ControllerState::Hold
    }
}

/// Text between the first `<` and the following `>`.
fn report_body(reply: &str) -> Option<&str> {
    let start = reply.find('<')? + 1;
    let len = reply[start..].find('>')?;
    Some(&reply[start..start + len])
}

fn parse_position(value: &str) -> Option<Position> {
    let mut it = value.split(',').map(|v| v.trim().parse::<f64>());
    match (it.next(), it.next(), it.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => Some(Position::new(x, y, z)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idle_report() {
        let s = DeviceStatus::parse("<Idle|MPos:100.000,50.000,5.000|FS:500,0>");
        assert_eq!(s.state, ControllerState::Idle);
        assert_eq!(s.machine_position, Position::new(100.0, 50.0, 5.0));
        assert_eq!(s.feed_rate, 500.0);
        assert_eq!(s.spindle_speed, 0.0);
        assert_eq!(s.pins, None);
    }

    #[test]
    fn test_parse_hold_with_substate_and_pins() {
        let s = DeviceStatus::parse("<Hold:0|MPos:-1.5,2.250,0.000|FS:0,0|Pn:XP|WCO:0.000,0.000,0.000>\r\nok");
        assert!(s.is_hold());
        assert_eq!(s.sub_state, Some(0));
        assert_eq!(s.machine_position.x, -1.5);
        assert_eq!(s.pins.as_deref(), Some("XP"));
        assert_eq!(s.work_offset, Some(Position::default()));
    }

    #[test]
    fn test_work_position_fallback() {
        let s = DeviceStatus::parse("<Run|WPos:10.000,20.000,0.000|FS:1500,0|WCO:5.000,-5.000,1.000>");
        assert_eq!(s.state, ControllerState::Run);
        assert_eq!(s.machine_position, Position::new(15.0, 15.0, 1.0));
    }

    #[test]
    fn test_garbage_defaults() {
        let s = DeviceStatus::parse("ok");
        assert_eq!(s.state.as_str(), "Unknown");
        assert_eq!(s.machine_position, Position::default());

        let s = DeviceStatus::parse("<Alarm|MPos:1,2|FS:x,0>");
        assert!(s.is_alarm());
        assert_eq!(s.machine_position, Position::default());
        assert_eq!(s.feed_rate, 0.0);
    }

    #[test]
    fn test_unrecognized_state_is_kept() {
        let s = DeviceStatus::parse("<Tool|MPos:0,0,0>");
        assert_eq!(s.state, ControllerState::Unknown("Tool".to_string()));
    }
}
