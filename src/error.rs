//! Error types.
//!
//! - [`PatternError`]: errors raised while loading a model, building a flow or
//!   running it. Everything except the `Record` variant aborts the run.
//! - [`RecordError`]: per-record failures. These never abort a run; the stage
//!   that raises one turns it into a trapped record.
//! - [`AppError`]: what the binary reports, an exit code plus a message.

use thiserror::Error;

use crate::domain::Record;

/// Errors for model loading, flow assembly and execution.
#[derive(Error, Debug)]
pub enum PatternError {
    // ── Model loading ────────────────────────────────────────────────
    /// The definition declares a family outside the supported set.
    #[error("unsupported model family: {family}")]
    UnsupportedModelFamily { family: String },

    /// The definition could not be parsed into a model.
    #[error("malformed model definition: {reason}")]
    MalformedDefinition { reason: String },

    /// `classify` was called before `prepare`.
    #[error("classifier used before prepare()")]
    NotPrepared,

    // ── Flow assembly ────────────────────────────────────────────────
    /// Both measurement modes were requested.
    #[error(
        "conflicting aggregation mode: a validation source ({validation}) and an error source ({error}) cannot both be set"
    )]
    ConflictingAggregationMode { validation: String, error: String },

    /// A stage needs a field its upstream schema does not carry.
    #[error("stage `{stage}` requires field `{field}`, which is not in the upstream schema")]
    MissingField { stage: String, field: String },

    /// A stage would append a field that already exists.
    #[error("field `{field}` already exists in the upstream schema")]
    FieldCollision { field: String },

    /// RMSE mode has no grouping key (no `group_field` and no model target).
    #[error("error aggregation needs a group field: pass one explicitly or configure a model")]
    MissingGroupField,

    /// A flow with a measure branch was run without a measure sink.
    #[error("flow has a `{branch}` branch but no sink was attached for it")]
    MissingSink { branch: &'static str },

    /// A per-record failure; stages trap these instead of aborting.
    #[error(transparent)]
    Record(#[from] RecordError),

    // ── I/O ──────────────────────────────────────────────────────────
    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PatternError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        PatternError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        PatternError::MalformedDefinition {
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PatternError::NotPrepared | PatternError::Record(_) => 5,
            _ => 2,
        }
    }
}

/// Per-record failures, isolated to the trap sink.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    /// The model could not score the record.
    #[error("{reason}")]
    Scoring { record: Record, reason: String },

    /// A field that must be numeric could not be coerced.
    #[error("field `{field}` is not numeric: '{value}'")]
    NonNumericField { field: String, value: String },

    /// A required value is empty.
    #[error("field `{field}` is empty")]
    MissingValue { field: String },

    /// A source row does not match the header width.
    #[error("row has {found} fields, header declares {expected}")]
    MalformedRow { expected: usize, found: usize },
}

impl RecordError {
    pub fn scoring(record: &Record, reason: impl Into<String>) -> Self {
        RecordError::Scoring {
            record: record.clone(),
            reason: reason.into(),
        }
    }
}

/// Top-level error for the `pattern` binary.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<PatternError> for AppError {
    fn from(err: PatternError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
