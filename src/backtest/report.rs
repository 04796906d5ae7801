//! Per-window records and the backtest report.

use crate::backtest::config::BacktestConfig;
use crate::core::Window;
use crate::error::ModelFitError;
use crate::utils::metrics::{Metric, ReportSummary, WindowMetrics};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// One forecast step compared with what happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointForecast {
    pub timestamp: DateTime<Utc>,
    pub actual: f64,
    pub forecast: f64,
    /// `actual - forecast`.
    pub error: f64,
    pub abs_error: f64,
    /// `error / actual * 100`; `None` when the actual is zero.
    pub pct_error: Option<f64>,
}

impl PointForecast {
    /// Pair an actual with its forecast and derive the errors.
    pub fn new(timestamp: DateTime<Utc>, actual: f64, forecast: f64) -> Self {
        let error = actual - forecast;
        Self {
            timestamp,
            actual,
            forecast,
            error,
            abs_error: error.abs(),
            pct_error: (actual != 0.0).then(|| error / actual * 100.0),
        }
    }
}

/// Why a window was left out of the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fit or predict failed.
    FitFailed { error: ModelFitError },
    /// Actuals or forecasts contain NaN or infinite values.
    MissingValues { actual: usize, forecast: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FitFailed { error } => write!(f, "{error}"),
            SkipReason::MissingValues { actual, forecast } => write!(
                f,
                "missing values: {actual} in actuals, {forecast} in forecast"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowOutcome {
    Scored {
        metrics: WindowMetrics,
        points: Vec<PointForecast>,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// Result of one window of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowRecord {
    pub window: Window,
    pub outcome: WindowOutcome,
}

impl WindowRecord {
    /// Metrics of a scored window.
    pub fn metrics(&self) -> Option<&WindowMetrics> {
        match &self.outcome {
            WindowOutcome::Scored { metrics, .. } => Some(metrics),
            WindowOutcome::Skipped { .. } => None,
        }
    }

    /// Point records of a scored window; empty when skipped.
    pub fn points(&self) -> &[PointForecast] {
        match &self.outcome {
            WindowOutcome::Scored { points, .. } => points,
            WindowOutcome::Skipped { .. } => &[],
        }
    }

    /// Why the window was skipped, if it was.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match &self.outcome {
            WindowOutcome::Scored { .. } => None,
            WindowOutcome::Skipped { reason } => Some(reason),
        }
    }

    /// Whether the window was left out of the summary.
    pub fn is_skipped(&self) -> bool {
        self.skip_reason().is_some()
    }
}

/// Outcome of backtesting one model over one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    /// Model id (comparison key) or model name.
    pub model: String,
    pub config: BacktestConfig,
    /// One record per planned window, in window order.
    pub windows: Vec<WindowRecord>,
    /// Aggregate over the scored windows.
    pub summary: ReportSummary,
}

impl BacktestReport {
    /// Records of windows that were scored.
    pub fn scored(&self) -> impl Iterator<Item = &WindowRecord> {
        self.windows.iter().filter(|w| !w.is_skipped())
    }

    /// Records of windows that were skipped.
    pub fn skipped(&self) -> impl Iterator<Item = &WindowRecord> {
        self.windows.iter().filter(|w| w.is_skipped())
    }

    /// Number of scored windows.
    pub fn scored_count(&self) -> usize {
        self.scored().count()
    }

    /// Number of skipped windows.
    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// Mean of `metric` over the scored windows that define it.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.summary.mean(metric)
    }

    /// Every scored point, in window order.
    pub fn points(&self) -> impl Iterator<Item = &PointForecast> {
        self.windows.iter().flat_map(|w| w.points())
    }
}
