//! Rolling-origin backtest of a single model.

use crate::backtest::config::BacktestConfig;
use crate::backtest::executor::{fit_and_predict, WorkerPool};
use crate::backtest::report::{
    BacktestReport, PointForecast, SkipReason, WindowOutcome, WindowRecord,
};
use crate::core::{RollingWindows, TimeSeries, Window};
use crate::error::{BacktestError, Result};
use crate::models::SharedModel;
use crate::utils::metrics::{aggregate, score_with_history};
use rayon::prelude::*;
use tracing::{debug, info_span, warn};

/// Runs one model over every window of a series.
///
/// # Example
///
/// ```
/// use demand_backtest::backtest::{BacktestConfig, RollingBacktester};
/// use demand_backtest::core::TimeSeries;
/// use demand_backtest::models::{Arima, ArimaConfig, SharedModel};
/// use chrono::{TimeZone, Utc};
/// use std::sync::Arc;
///
/// let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
/// let values: Vec<f64> = (0..24).map(|t| 100.0 + 2.0 * t as f64).collect();
/// let series = TimeSeries::weekly(start, values).unwrap();
///
/// let model: SharedModel = Arc::new(Arima::new(ArimaConfig::new(0, 1, 0)).unwrap());
/// let report = RollingBacktester::new()
///     .run(&series, &model, &BacktestConfig::new(12, 4))
///     .unwrap();
///
/// assert_eq!(report.windows.len(), 3);
/// assert!(report.mean(demand_backtest::utils::Metric::Mape).unwrap() < 1e-6);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct RollingBacktester;

impl RollingBacktester {
    /// Create a backtester.
    pub fn new() -> Self {
        Self
    }

    /// Backtest `model` on `series`.
    ///
    /// Fails with `InsufficientData` if no window fits, `DimensionMismatch` if
    /// the model returns a forecast of the wrong length, and `BacktestFailed`
    /// if every window was skipped.
    pub fn run(
        &self,
        series: &TimeSeries,
        model: &SharedModel,
        config: &BacktestConfig,
    ) -> Result<BacktestReport> {
        let plan = config.plan(series)?;
        let pool = WorkerPool::new(config.max_workers)?;
        pool.install(|| run_windows(model.name(), series, model, config, &plan))
    }
}

/// Evaluate all windows of `plan` on the current rayon pool.
pub(crate) fn run_windows(
    label: &str,
    series: &TimeSeries,
    model: &SharedModel,
    config: &BacktestConfig,
    plan: &RollingWindows,
) -> Result<BacktestReport> {
    let span = info_span!("backtest", model = label, windows = plan.len());

    // Entered per task so window events keep this span on any worker
    let windows: Vec<Window> = plan.iter().collect();
    let windows = windows
        .into_par_iter()
        .map(|window| span.in_scope(|| evaluate_window(label, series, model, config, window)))
        .collect::<Result<Vec<_>>>()?;
    let _enter = span.enter();

    let skipped = windows.iter().filter(|w| w.is_skipped()).count();
    if skipped == windows.len() {
        let reason = windows
            .iter()
            .rev()
            .find_map(|w| w.skip_reason())
            .map(ToString::to_string)
            .unwrap_or_default();
        warn!(model = label, skipped, %reason, "Every window skipped");
        return Err(BacktestError::BacktestFailed {
            model: label.to_string(),
            skipped,
            reason,
        });
    }

    let summary = aggregate(windows.iter().filter_map(|w| w.metrics()))?;
    debug!(
        model = label,
        scored = windows.len() - skipped,
        skipped,
        "Backtest complete"
    );

    Ok(BacktestReport {
        model: label.to_string(),
        config: config.clone(),
        windows,
        summary,
    })
}

fn evaluate_window(
    label: &str,
    series: &TimeSeries,
    model: &SharedModel,
    config: &BacktestConfig,
    window: Window,
) -> Result<WindowRecord> {
    let train = series.slice(window.train.start, window.train.end)?;
    let history = train.values().to_vec();
    let horizon = window.horizon();

    let forecast = match fit_and_predict(model, train, horizon, config.fit_timeout()) {
        Ok(forecast) => forecast,
        Err(error) => {
            warn!(model = label, window = window.index, %error, "Window skipped");
            return Ok(WindowRecord {
                window,
                outcome: WindowOutcome::Skipped {
                    reason: SkipReason::FitFailed { error },
                },
            });
        }
    };

    if forecast.horizon() != horizon {
        return Err(BacktestError::DimensionMismatch {
            expected: horizon,
            got: forecast.horizon(),
        });
    }

    let actual = &series.values()[window.test.clone()];
    let missing_actual = actual.iter().filter(|v| !v.is_finite()).count();
    let missing_forecast = forecast.values().iter().filter(|v| !v.is_finite()).count();
    if missing_actual > 0 || missing_forecast > 0 {
        warn!(
            model = label,
            window = window.index,
            missing_actual,
            missing_forecast,
            "Window skipped: missing values"
        );
        return Ok(WindowRecord {
            window,
            outcome: WindowOutcome::Skipped {
                reason: SkipReason::MissingValues {
                    actual: missing_actual,
                    forecast: missing_forecast,
                },
            },
        });
    }

    let metrics = score_with_history(actual, forecast.values(), &history)?;
    debug!(
        model = label,
        window = window.index,
        train = window.train_len(),
        mae = metrics.mae,
        "Window scored"
    );

    let points = series.timestamps()[window.test.clone()]
        .iter()
        .zip(actual)
        .zip(forecast.values())
        .map(|((&timestamp, &a), &f)| PointForecast::new(timestamp, a, f))
        .collect();

    Ok(WindowRecord {
        window,
        outcome: WindowOutcome::Scored { metrics, points },
    })
}
