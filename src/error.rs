//! Error types for the demand-backtest library.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for backtest operations.
pub type Result<T> = std::result::Result<T, BacktestError>;

/// Errors raised while fitting or querying a single forecasting model.
///
/// These are recoverable: the backtester records them against the window
/// that produced them and moves on.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelFitError {
    /// Train window shorter than the model's minimum history.
    #[error("{model}: needs at least {needed} training points, got {got}")]
    InsufficientHistory {
        model: String,
        needed: usize,
        got: usize,
    },

    /// Train window contains NaN or infinite values.
    #[error("{model}: training data contains {count} missing values")]
    MissingValues { model: String, count: usize },

    /// Hyperparameters rejected at construction.
    #[error("{model}: invalid configuration: {reason}")]
    InvalidConfig { model: String, reason: String },

    /// Numeric fitting broke down.
    #[error("{model}: numerical failure: {reason}")]
    Numerical { model: String, reason: String },

    /// Fit and predict did not finish within the caller's limit.
    #[error("{model}: fit exceeded timeout of {limit_ms} ms")]
    Timeout { model: String, limit_ms: u64 },

    /// The fit thread terminated without producing a result.
    #[error("{model}: fit aborted before producing a result")]
    Aborted { model: String },
}

impl ModelFitError {
    /// Name of the model that raised the error.
    pub fn model(&self) -> &str {
        match self {
            Self::InsufficientHistory { model, .. }
            | Self::MissingValues { model, .. }
            | Self::InvalidConfig { model, .. }
            | Self::Numerical { model, .. }
            | Self::Timeout { model, .. }
            | Self::Aborted { model } => model,
        }
    }

    /// Whether the error was caused by the fit timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors that can occur during backtesting and model comparison.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BacktestError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Series too short to produce a single window.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A model fit failed.
    #[error(transparent)]
    ModelFit(#[from] ModelFitError),

    /// Dimension mismatch between paired sequences.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Every window of a model's backtest was skipped.
    #[error("backtest of {model} failed: all {skipped} windows skipped (last reason: {reason})")]
    BacktestFailed {
        model: String,
        skipped: usize,
        reason: String,
    },

    /// Aggregation attempted without any scored window.
    #[error("cannot aggregate an empty report")]
    EmptyReport,

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker pool could not be created.
    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl From<toml::de::Error> for BacktestError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for BacktestError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(err.to_string())
    }
}
