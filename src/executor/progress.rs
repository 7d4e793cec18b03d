// src/executor/progress.rs - Progress snapshots and fan-out
use crate::errors::BoxError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Homing,
    Positioning,
    Plotting,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Error | RunState::Cancelled)
    }
}

/// Which face of the media is being drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSide {
    #[default]
    Front,
    Back,
    Envelope,
}

impl PageSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageSide::Front => "front",
            PageSide::Back => "back",
            PageSide::Envelope => "envelope",
        }
    }
}

impl fmt::Display for PageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "front" => Ok(PageSide::Front),
            "back" => Ok(PageSide::Back),
            "envelope" => Ok(PageSide::Envelope),
            other => Err(format!("unknown page side '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub run_id: Uuid,
    pub state: RunState,
    pub current_command: usize,
    pub total_commands: usize,
    pub percentage: f64,
    pub side: PageSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(run_id: Uuid, state: RunState, current: usize, total: usize, side: PageSide) -> Self {
        let percentage = if state == RunState::Completed {
            100.0
        } else if total == 0 {
            0.0
        } else {
            current as f64 / total as f64 * 100.0
        };
        Self {
            run_id,
            state,
            current_command: current,
            total_commands: total,
            percentage,
            side,
            error_code: None,
            error_message: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }
}

/// Receives snapshots from a running plot. Called inline, so keep it quick.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn emit(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Discards every snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&self, _snapshot: &ProgressSnapshot) {}
}

/// One registered listener on a [`ProgressHub`]. An error unregisters it.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, snapshot: &ProgressSnapshot) -> Result<(), BoxError>;
}

struct ChannelObserver(mpsc::UnboundedSender<ProgressSnapshot>);

impl ProgressObserver for ChannelObserver {
    fn notify(&self, snapshot: &ProgressSnapshot) -> Result<(), BoxError> {
        self.0
            .send(snapshot.clone())
            .map_err(|_| "progress receiver dropped".into())
    }
}

/// Broadcasts snapshots to every observer and remembers the latest one.
#[derive(Default)]
pub struct ProgressHub {
    observers: Mutex<Vec<(u64, Box<dyn ProgressObserver>)>>,
    next_id: Mutex<u64>,
    latest: Mutex<Option<ProgressSnapshot>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Box<dyn ProgressObserver>) -> u64 {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            *next
        };
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, observer));
        id
    }

    pub fn remove_observer(&self, id: u64) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    /// Channel fed with every later snapshot. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_observer(Box::new(ChannelObserver(tx)));
        rx
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn latest(&self) -> Option<ProgressSnapshot> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl ProgressSink for ProgressHub {
    fn emit(&self, snapshot: &ProgressSnapshot) {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        observers.retain(|(id, observer)| match observer.notify(snapshot) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping progress observer {}: {}", id, e);
                false
            }
        });
    }
}
