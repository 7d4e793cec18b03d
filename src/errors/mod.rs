// src/errors/mod.rs - Plotter error taxonomy and raised errors
//!
//! Every failure surfaced by the host carries a code from a fixed catalog.
//! The catalog is turned into an [`ErrorRegistry`] once per process and is
//! read-only from then on. A [`PlotterError`] always renders to a complete
//! [`ErrorReport`], even when its code is not in the registry.

mod catalog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

pub use catalog::CATALOG;

/// Boxed underlying fault attached to a raised error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cannot continue, immediate attention required
    Critical,
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Connection,
    Power,
    Communication,
    Motion,
    UserInput,
    Pen,
    Paper,
    Quality,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Connection,
        Category::Power,
        Category::Communication,
        Category::Motion,
        Category::UserInput,
        Category::Pen,
        Category::Paper,
        Category::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Connection => "connection",
            Category::Power => "power",
            Category::Communication => "communication",
            Category::Motion => "motion",
            Category::UserInput => "user_input",
            Category::Pen => "pen",
            Category::Paper => "paper",
            Category::Quality => "quality",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s || c.as_str().replace('_', "-") == s)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator or automated actions a caller may take after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Retry,
    Reconnect,
    Home,
    EmergencyStop,
    PenUp,
    DisableMotors,
    UserFix,
    Abort,
    Resume,
}

impl RecoveryAction {
    pub const ALL: [RecoveryAction; 9] = [
        RecoveryAction::Retry,
        RecoveryAction::Reconnect,
        RecoveryAction::Home,
        RecoveryAction::EmergencyStop,
        RecoveryAction::PenUp,
        RecoveryAction::DisableMotors,
        RecoveryAction::UserFix,
        RecoveryAction::Abort,
        RecoveryAction::Resume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryAction::Retry => "retry",
            RecoveryAction::Reconnect => "reconnect",
            RecoveryAction::Home => "home",
            RecoveryAction::EmergencyStop => "emergency_stop",
            RecoveryAction::PenUp => "pen_up",
            RecoveryAction::DisableMotors => "disable_motors",
            RecoveryAction::UserFix => "user_fix",
            RecoveryAction::Abort => "abort",
            RecoveryAction::Resume => "resume",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s || a.as_str().replace('_', "-") == s)
    }
}

/// Error code such as `PLT-C004`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(Cow<'static, str>);

impl ErrorCode {
    pub const NO_DEVICE_FOUND: ErrorCode = ErrorCode::from_static("PLT-C001");
    pub const PORT_BUSY: ErrorCode = ErrorCode::from_static("PLT-C002");
    pub const PERMISSION_DENIED: ErrorCode = ErrorCode::from_static("PLT-C003");
    pub const DEVICE_DISCONNECTED: ErrorCode = ErrorCode::from_static("PLT-C004");
    pub const DEVICE_NOT_RESPONDING: ErrorCode = ErrorCode::from_static("PLT-C005");
    pub const NOT_CONNECTED: ErrorCode = ErrorCode::from_static("PLT-C006");
    pub const LOW_VOLTAGE: ErrorCode = ErrorCode::from_static("PLT-W001");
    pub const RESPONSE_TIMEOUT: ErrorCode = ErrorCode::from_static("PLT-X001");
    pub const INVALID_RESPONSE: ErrorCode = ErrorCode::from_static("PLT-X002");
    pub const COMMAND_REJECTED: ErrorCode = ErrorCode::from_static("PLT-X003");
    pub const HOMING_FAILED: ErrorCode = ErrorCode::from_static("PLT-M001");
    pub const MOTION_TIMEOUT: ErrorCode = ErrorCode::from_static("PLT-M002");
    pub const BOUNDS_EXCEEDED: ErrorCode = ErrorCode::from_static("PLT-M003");
    pub const PAUSE_BUTTON: ErrorCode = ErrorCode::from_static("PLT-U001");
    pub const CONTROLLER_ALARM: ErrorCode = ErrorCode::from_static("PLT-G001");
    pub const CONTROLLER_ERROR: ErrorCode = ErrorCode::from_static("PLT-G002");
    pub const POSITION_UNKNOWN: ErrorCode = ErrorCode::from_static("PLT-G003");
    pub const HARD_LIMIT: ErrorCode = ErrorCode::from_static("PLT-G004");
    pub const SOFT_LIMIT: ErrorCode = ErrorCode::from_static("PLT-G005");

    pub const fn from_static(code: &'static str) -> Self {
        ErrorCode(Cow::Borrowed(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ErrorCode {
    fn from(s: &str) -> Self {
        ErrorCode(Cow::Owned(s.to_string()))
    }
}

impl From<String> for ErrorCode {
    fn from(s: String) -> Self {
        ErrorCode(Cow::Owned(s))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Immutable catalog entry describing one failure kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDefinition {
    pub code: &'static str,
    pub name: &'static str,
    pub message: &'static str,
    pub detail: &'static str,
    pub severity: Severity,
    pub category: Category,
    pub remediation_steps: &'static [&'static str],
    pub recovery_actions: &'static [RecoveryAction],
    /// False for problems only an operator can observe (ink, paper, skew).
    pub auto_detected: bool,
}

/// Collects definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct ErrorRegistryBuilder {
    definitions: Vec<ErrorDefinition>,
}

impl ErrorRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one definition. A later entry with the same code replaces the earlier one.
    pub fn register(mut self, definition: ErrorDefinition) -> Self {
        if let Some(existing) = self.definitions.iter_mut().find(|d| d.code == definition.code) {
            *existing = definition;
        } else {
            self.definitions.push(definition);
        }
        self
    }

    pub fn build(self) -> ErrorRegistry {
        let index = self
            .definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.code, i))
            .collect();
        ErrorRegistry { definitions: self.definitions, index }
    }
}

/// Read-only lookup table of error definitions, in registration order.
#[derive(Debug)]
pub struct ErrorRegistry {
    definitions: Vec<ErrorDefinition>,
    index: HashMap<&'static str, usize>,
}

impl ErrorRegistry {
    /// Registry holding the built-in catalog.
    pub fn builtin() -> Self {
        CATALOG
            .iter()
            .cloned()
            .fold(ErrorRegistryBuilder::new(), ErrorRegistryBuilder::register)
            .build()
    }

    pub fn lookup(&self, code: &str) -> Option<&ErrorDefinition> {
        self.index.get(code).map(|&i| &self.definitions[i])
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &ErrorDefinition> {
        self.definitions.iter().filter(move |d| d.category == category)
    }

    /// Definitions an operator may report by hand (not hardware-observable).
    pub fn user_reportable_only(&self) -> impl Iterator<Item = &ErrorDefinition> {
        self.definitions.iter().filter(|d| !d.auto_detected)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

static REGISTRY: OnceLock<ErrorRegistry> = OnceLock::new();

/// Process-wide registry, built from the catalog on first use.
pub fn registry() -> &'static ErrorRegistry {
    REGISTRY.get_or_init(ErrorRegistry::builtin)
}

/// A raised occurrence of a catalogued failure.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct PlotterError {
    code: ErrorCode,
    message: String,
    context: BTreeMap<String, Value>,
    occurred_at: DateTime<Utc>,
    #[source]
    cause: Option<BoxError>,
}

impl PlotterError {
    pub fn new(code: impl Into<ErrorCode>) -> Self {
        let code = code.into();
        let message = match registry().lookup(code.as_str()) {
            Some(def) => def.message.to_string(),
            None => format!("Unknown error: {}", code),
        };
        Self {
            code,
            message,
            context: BTreeMap::new(),
            occurred_at: Utc::now(),
            cause: None,
        }
    }

    /// Adds one context entry, replacing an existing key.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn insert_context(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.context.insert(key.into(), value.into());
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn is(&self, code: &ErrorCode) -> bool {
        &self.code == code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn definition(&self) -> Option<&'static ErrorDefinition> {
        registry().lookup(self.code.as_str())
    }

    /// Renders against the process registry.
    pub fn to_report(&self) -> ErrorReport {
        self.to_report_with(registry())
    }

    /// Renders against an explicit registry. Never fails: unknown codes get a
    /// generic connection/error report.
    pub fn to_report_with(&self, registry: &ErrorRegistry) -> ErrorReport {
        let cause = self.cause.as_ref().map(|c| c.to_string());
        match registry.lookup(self.code.as_str()) {
            Some(def) => ErrorReport {
                code: self.code.to_string(),
                name: def.name.to_string(),
                message: def.message.to_string(),
                detail: def.detail.to_string(),
                severity: def.severity,
                category: def.category,
                remediation_steps: def.remediation_steps.iter().map(|s| s.to_string()).collect(),
                recovery_actions: def.recovery_actions.to_vec(),
                is_auto_detected: def.auto_detected,
                context: self.context.clone(),
                cause,
                occurred_at: self.occurred_at,
            },
            None => ErrorReport {
                code: self.code.to_string(),
                name: "Unknown Error".to_string(),
                message: format!("Unknown error: {}", self.code),
                detail: String::new(),
                severity: Severity::Error,
                category: Category::Connection,
                remediation_steps: Vec::new(),
                recovery_actions: Vec::new(),
                is_auto_detected: true,
                context: self.context.clone(),
                cause,
                occurred_at: self.occurred_at,
            },
        }
    }
}

/// Flat, serializable rendering of a [`PlotterError`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: String,
    pub name: String,
    pub message: String,
    pub detail: String,
    pub severity: Severity,
    pub category: Category,
    pub remediation_steps: Vec<String>,
    pub recovery_actions: Vec<RecoveryAction>,
    pub is_auto_detected: bool,
    pub context: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub occurred_at: DateTime<Utc>,
}
