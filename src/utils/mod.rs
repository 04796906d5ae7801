//! Numeric helpers shared by the models and the backtest engine.

pub mod metrics;
pub mod ols;
pub mod optimization;

pub use metrics::{
    aggregate, score, score_with_history, Metric, MetricSummary, ReportSummary, WindowMetrics,
};
pub use ols::{ridge_fit, RidgeFit};
pub use optimization::{nelder_mead, NelderMeadConfig, NelderMeadResult};
