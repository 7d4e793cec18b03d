// src/executor/mod.rs - Plot execution state machine
//!
//! `Idle -> Homing -> Positioning -> Plotting <-> Paused -> Completed | Error | Cancelled`
//!
//! A run homes the machine, parks the pen on the page's reference corner and
//! fixes that position as the transform origin for the rest of the run.

pub mod control;
pub mod instruction;
pub mod page;
pub mod progress;

pub use control::PlotControl;
pub use instruction::{Instruction, InstructionError, InstructionKind, parse_program};
pub use page::{CoordinateTransform, PageFormat};
pub use progress::{NoProgress, PageSide, ProgressHub, ProgressObserver, ProgressSink, ProgressSnapshot, RunState};

use crate::config::{ExecutorConfig, HomingConfig, PageConfig, PlotterConfig};
use crate::errors::{BoxError, ErrorCode, PlotterError};
use crate::poll::{BoundedPoll, PollOutcome};
use crate::protocol::{GrblPlotter, PauseButton};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub check_voltage: bool,
    pub poll_pause_button: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { check_voltage: true, poll_pause_button: true }
    }
}

/// Failure inside a run before it is decorated for the caller.
enum RunFailure {
    Plotter(PlotterError),
    Other(BoxError),
}

impl From<PlotterError> for RunFailure {
    fn from(e: PlotterError) -> Self {
        RunFailure::Plotter(e)
    }
}

impl From<InstructionError> for RunFailure {
    fn from(e: InstructionError) -> Self {
        RunFailure::Other(Box::new(e))
    }
}

/// Mutable state of one run.
struct ExecutionState {
    run_id: Uuid,
    side: PageSide,
    total: usize,
    index: usize,
    position: (f64, f64),
    pen_down: bool,
    origin: Option<CoordinateTransform>,
}

impl ExecutionState {
    fn snapshot(&self, state: RunState, current: usize) -> ProgressSnapshot {
        ProgressSnapshot::new(self.run_id, state, current, self.total, self.side)
    }
}

pub struct PlotExecutor {
    plotter: Arc<GrblPlotter>,
    control: PlotControl,
    page: PageConfig,
    homing: HomingConfig,
    settings: ExecutorConfig,
    draw_feed: f64,
    move_timeout: Duration,
}

impl PlotExecutor {
    pub fn new(plotter: Arc<GrblPlotter>, config: &PlotterConfig) -> Self {
        Self {
            plotter,
            control: PlotControl::new(),
            page: config.page.clone(),
            homing: config.homing.clone(),
            settings: config.executor.clone(),
            draw_feed: config.motion.draw_feed,
            move_timeout: config.motion.move_timeout(),
        }
    }

    pub fn plotter(&self) -> &Arc<GrblPlotter> {
        &self.plotter
    }

    /// Handle for pausing or cancelling from another task.
    pub fn control(&self) -> PlotControl {
        self.control.clone()
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Runs `instructions` to the end. `Ok(false)` means the run was cancelled.
    pub async fn execute(
        &self,
        instructions: &[Instruction],
        side: PageSide,
        options: RunOptions,
        progress: &dyn ProgressSink,
    ) -> Result<bool, PlotterError> {
        self.control.reset();
        let mut state = ExecutionState {
            run_id: Uuid::new_v4(),
            side,
            total: instructions.len(),
            index: 0,
            position: (0.0, 0.0),
            pen_down: false,
            origin: None,
        };
        tracing::info!(
            "Plot {} starting: {} instructions, side {}",
            state.run_id,
            state.total,
            side
        );

        let failure = match self.run(instructions, options, progress, &mut state).await {
            Ok(completed) => return Ok(completed),
            Err(failure) => failure,
        };

        if let Err(e) = self.plotter.pen_up().await {
            tracing::warn!("Pen up after failure did not complete: {}", e);
        }

        let mut error = match failure {
            RunFailure::Plotter(e) => e,
            RunFailure::Other(cause) => {
                tracing::error!("Plot {} failed: {}", state.run_id, cause);
                PlotterError::new(ErrorCode::INVALID_RESPONSE)
                    .with_context("original_error", cause.to_string())
                    .with_cause(cause)
            }
        };
        error.insert_context("command_index", state.index);
        error.insert_context("total_commands", state.total);
        error.insert_context("side", side.as_str());
        if let Some(origin) = state.origin {
            error.insert_context("origin", vec![origin.origin_x, origin.origin_y]);
        }
        tracing::error!("Plot {} failed at instruction {}: {}", state.run_id, state.index, error);

        progress.emit(
            &state
                .snapshot(RunState::Error, state.index)
                .with_error(error.code().as_str(), error.message()),
        );
        Err(error)
    }

    async fn run(
        &self,
        instructions: &[Instruction],
        options: RunOptions,
        progress: &dyn ProgressSink,
        state: &mut ExecutionState,
    ) -> Result<bool, RunFailure> {
        if options.check_voltage {
            self.plotter.check_voltage().await?;
        }
        self.plotter.enable_motors().await?;
        self.plotter.pen_up().await?;
        state.pen_down = false;

        progress.emit(&state.snapshot(RunState::Homing, 0));
        self.plotter.home(self.homing.timeout()).await?;
        tokio::time::sleep(self.homing.settle()).await;
        let status = self.plotter.query_status().await?;
        tracing::info!(
            "After homing: machine position ({:.1}, {:.1})",
            status.machine_position.x,
            status.machine_position.y
        );

        progress.emit(&state.snapshot(RunState::Positioning, 0));
        let (origin_x, origin_y) = page::reference_corner(&self.page);
        self.plotter.move_absolute(origin_x, origin_y, None).await?;
        tokio::time::sleep(self.homing.positioning_settle()).await;
        let status = self.plotter.query_status().await?;
        tracing::info!(
            "Pen parked at ({:.1}, {:.1}), page corner ({:.0}, 0)",
            status.machine_position.x,
            status.machine_position.y,
            self.page.width_mm
        );

        let transform = CoordinateTransform::new(origin_x, origin_y, self.page.width_mm);
        state.origin = Some(transform);
        state.position = (origin_x, origin_y);

        let poll_every = self.settings.pause_poll_every.max(1);
        for (i, instruction) in instructions.iter().enumerate() {
            state.index = i;

            if self.control.is_cancelled() {
                self.finish_cancelled(progress, state, i).await;
                return Ok(false);
            }

            if options.poll_pause_button && i % poll_every == 0 {
                if self.plotter.query_pause_button().await == PauseButton::Pressed {
                    tracing::info!("Controller feed hold detected, pausing");
                    self.control.pause_for_controller_hold();
                }
            }

            if self.control.is_paused() {
                if self.wait_while_paused(progress, state, i).await {
                    self.finish_cancelled(progress, state, i).await;
                    return Ok(false);
                }
                if self.control.take_controller_hold() {
                    self.plotter.cycle_start().await?;
                }
            }

            self.execute_instruction(instruction, &transform, state).await?;
            progress.emit(&state.snapshot(RunState::Plotting, i + 1));
        }

        self.plotter.pen_up().await?;
        state.pen_down = false;
        self.plotter.wait_for_idle(self.move_timeout).await?;
        progress.emit(&state.snapshot(RunState::Completed, state.total));
        tracing::info!("Plot {} completed", state.run_id);
        Ok(true)
    }

    /// Emits `Paused` until resumed or cancelled. Returns true on cancel.
    async fn wait_while_paused(&self, progress: &dyn ProgressSink, state: &ExecutionState, index: usize) -> bool {
        tracing::info!("Plot {} paused at instruction {}", state.run_id, index);
        let control = &self.control;
        let poll = BoundedPoll::unbounded(self.settings.pause_interval());
        let outcome: Result<PollOutcome<bool>, std::convert::Infallible> = poll
            .until(|| async move {
                if control.is_cancelled() {
                    return Ok(Some(true));
                }
                if !control.is_paused() {
                    return Ok(Some(false));
                }
                progress.emit(&state.snapshot(RunState::Paused, index));
                Ok(None)
            })
            .await;
        match outcome {
            Ok(PollOutcome::Ready(cancelled)) => cancelled,
            _ => control.is_cancelled(),
        }
    }

    async fn finish_cancelled(&self, progress: &dyn ProgressSink, state: &mut ExecutionState, index: usize) {
        tracing::info!("Plot {} cancelled at instruction {}", state.run_id, index);
        if let Err(e) = self.plotter.pen_up().await {
            tracing::warn!("Pen up after cancel did not complete: {}", e);
        }
        state.pen_down = false;
        progress.emit(&state.snapshot(RunState::Cancelled, index));
    }

    async fn execute_instruction(
        &self,
        instruction: &Instruction,
        transform: &CoordinateTransform,
        state: &mut ExecutionState,
    ) -> Result<(), RunFailure> {
        instruction.validate(state.index)?;
        match instruction.kind {
            InstructionKind::PenUp => {
                if state.pen_down {
                    self.plotter.pen_up().await?;
                    state.pen_down = false;
                }
            }
            InstructionKind::PenDown => {
                if !state.pen_down {
                    self.plotter.pen_down().await?;
                    state.pen_down = true;
                }
            }
            InstructionKind::Move | InstructionKind::DrawTo => {
                let (x, y) = transform.apply(instruction.x, instruction.y);
                let distance = (x - state.position.0).hypot(y - state.position.1);
                if distance < self.settings.min_displacement_mm {
                    tracing::trace!("Skipping {:.4}mm move", distance);
                    return Ok(());
                }
                tracing::debug!(
                    "Page ({:.2}, {:.2}) -> machine ({:.2}, {:.2})",
                    instruction.x,
                    instruction.y,
                    x,
                    y
                );
                let feed = state.pen_down.then_some(self.draw_feed);
                self.plotter.move_absolute(x, y, feed).await?;
                state.position = (x, y);
                self.plotter.wait_for_idle(self.move_timeout).await?;
            }
        }
        Ok(())
    }
}
