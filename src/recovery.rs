// src/recovery.rs - Operator recovery actions and problem reports
use crate::config::PlotterConfig;
use crate::errors::{PlotterError, RecoveryAction, registry};
use crate::executor::{PageSide, PlotControl, ProgressHub, ProgressSink, ProgressSnapshot, RunState};
use crate::protocol::GrblPlotter;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error(transparent)]
    Plotter(#[from] PlotterError),
    #[error("No plot to resume")]
    NoActivePlot,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("Unknown error code: {0}")]
    UnknownCode(String),
    #[error("Error {0} is auto-detected and cannot be user-reported")]
    NotOperatorReportable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryOutcome {
    ReadyForRetry,
    Reconnected,
    Homed,
    Stopped,
    PenRaised,
    MotorsDisabled,
    AwaitingUserFix,
    Resumed,
    Aborted,
}

pub struct Recovery {
    plotter: Arc<GrblPlotter>,
    control: Option<PlotControl>,
    progress: Option<Arc<ProgressHub>>,
    configured_port: Option<String>,
    reconnect_delay: Duration,
    homing_timeout: Duration,
}

impl Recovery {
    pub fn new(plotter: Arc<GrblPlotter>, config: &PlotterConfig) -> Self {
        Self {
            plotter,
            control: None,
            progress: None,
            configured_port: config.serial.port.clone(),
            reconnect_delay: Duration::from_secs(2),
            homing_timeout: config.homing.timeout(),
        }
    }

    /// Attaches the flags of the active plot, if any.
    pub fn with_control(mut self, control: PlotControl) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_progress(mut self, hub: Arc<ProgressHub>) -> Self {
        self.progress = Some(hub);
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub async fn perform(&self, action: RecoveryAction) -> Result<RecoveryOutcome, RecoveryError> {
        tracing::info!("Recovery action: {}", action.as_str());
        match action {
            RecoveryAction::Retry => {
                self.publish(RunState::Idle, None);
                Ok(RecoveryOutcome::ReadyForRetry)
            }
            RecoveryAction::Reconnect => {
                let conn = self.plotter.connection();
                let port = conn.port_name().or_else(|| self.configured_port.clone());
                conn.disconnect().await;
                tokio::time::sleep(self.reconnect_delay).await;
                conn.connect(port.as_deref()).await?;
                Ok(RecoveryOutcome::Reconnected)
            }
            RecoveryAction::Home => {
                self.plotter.home(self.homing_timeout).await?;
                Ok(RecoveryOutcome::Homed)
            }
            RecoveryAction::EmergencyStop => {
                self.plotter.emergency_stop().await?;
                if let Some(control) = &self.control {
                    control.cancel();
                }
                self.publish(RunState::Cancelled, None);
                Ok(RecoveryOutcome::Stopped)
            }
            RecoveryAction::PenUp => {
                self.plotter.pen_up().await?;
                Ok(RecoveryOutcome::PenRaised)
            }
            RecoveryAction::DisableMotors => {
                self.plotter.disable_motors().await?;
                Ok(RecoveryOutcome::MotorsDisabled)
            }
            RecoveryAction::UserFix => Ok(RecoveryOutcome::AwaitingUserFix),
            RecoveryAction::Resume => match &self.control {
                Some(control) => {
                    control.resume();
                    Ok(RecoveryOutcome::Resumed)
                }
                None => Err(RecoveryError::NoActivePlot),
            },
            RecoveryAction::Abort => {
                if let Some(control) = &self.control {
                    control.cancel();
                }
                self.plotter.pen_up().await?;
                self.plotter.disable_motors().await?;
                self.publish(RunState::Cancelled, None);
                Ok(RecoveryOutcome::Aborted)
            }
        }
    }

    /// Records a problem only an operator can see. Pauses the active plot and
    /// returns the raised error for broadcast.
    pub fn report_problem(
        &self,
        code: &str,
        context: BTreeMap<String, Value>,
    ) -> Result<PlotterError, ReportError> {
        let definition = registry()
            .lookup(code)
            .ok_or_else(|| ReportError::UnknownCode(code.to_string()))?;
        if definition.auto_detected {
            return Err(ReportError::NotOperatorReportable(code.to_string()));
        }

        if let Some(control) = &self.control {
            if !control.is_paused() {
                control.pause();
            }
        }

        let mut error = PlotterError::new(definition.code);
        for (key, value) in context {
            error.insert_context(key, value);
        }
        tracing::warn!("Operator reported {}: {}", definition.code, definition.message);
        self.publish(RunState::Paused, Some(&error));
        Ok(error)
    }

    /// Re-emits the latest snapshot in a new state.
    fn publish(&self, state: RunState, error: Option<&PlotterError>) {
        let Some(hub) = &self.progress else {
            return;
        };
        let previous = hub.latest();
        let mut snapshot = match &previous {
            Some(p) => ProgressSnapshot::new(p.run_id, state, p.current_command, p.total_commands, p.side),
            None => ProgressSnapshot::new(Uuid::nil(), state, 0, 0, PageSide::default()),
        };
        if let Some(e) = error {
            snapshot = snapshot.with_error(e.code().as_str(), e.message());
        }
        hub.emit(&snapshot);
    }
}
