//! Rolling-window backtesting and model comparison.

mod compare;
mod config;
mod executor;
mod report;
mod runner;

pub use compare::{ComparisonResult, ModelComparator, RankedModel};
pub use config::{BacktestConfig, ComparisonPlan};
pub use report::{BacktestReport, PointForecast, SkipReason, WindowOutcome, WindowRecord};
pub use runner::RollingBacktester;
