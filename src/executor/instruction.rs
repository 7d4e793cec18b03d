// src/executor/instruction.rs - Neutral drawing instructions
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstructionError {
    #[error("Instruction {index} has a non-finite target ({x}, {y})")]
    NonFinite { index: usize, x: f64, y: f64 },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKind {
    Move,
    #[serde(alias = "line")]
    DrawTo,
    PenUp,
    PenDown,
}

/// One step of a drawing. Coordinates are page millimetres, origin at the
/// top-left corner, +y towards the bottom edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(rename = "type")]
    pub kind: InstructionKind,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
}

impl Instruction {
    pub fn move_to(x: f64, y: f64) -> Self {
        Self { kind: InstructionKind::Move, x, y }
    }

    pub fn draw_to(x: f64, y: f64) -> Self {
        Self { kind: InstructionKind::DrawTo, x, y }
    }

    pub fn pen_up() -> Self {
        Self { kind: InstructionKind::PenUp, x: 0.0, y: 0.0 }
    }

    pub fn pen_down() -> Self {
        Self { kind: InstructionKind::PenDown, x: 0.0, y: 0.0 }
    }

    pub fn is_motion(&self) -> bool {
        matches!(self.kind, InstructionKind::Move | InstructionKind::DrawTo)
    }

    pub fn validate(&self, index: usize) -> Result<(), InstructionError> {
        if self.is_motion() && !(self.x.is_finite() && self.y.is_finite()) {
            return Err(InstructionError::NonFinite { index, x: self.x, y: self.y });
        }
        Ok(())
    }
}

/// Parses a JSON array of instructions.
pub fn parse_program(json: &str) -> Result<Vec<Instruction>, InstructionError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_program_accepts_line_alias() {
        let program = parse_program(
            r#"[{"type":"move","x":10,"y":20},{"type":"pen_down"},{"type":"line","x":30.5,"y":20},{"type":"pen_up"}]"#,
        )
        .unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::move_to(10.0, 20.0),
                Instruction::pen_down(),
                Instruction::draw_to(30.5, 20.0),
                Instruction::pen_up(),
            ]
        );
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(matches!(parse_program(r#"[{"type":"arc"}]"#), Err(InstructionError::Json(_))));
    }

    #[test]
    fn test_non_finite_target() {
        assert!(Instruction::draw_to(f64::NAN, 1.0).validate(3).is_err());
        assert!(Instruction::pen_up().validate(0).is_ok());
    }
}
