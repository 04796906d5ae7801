//! Accuracy metrics for forecast evaluation.

use crate::error::{BacktestError, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Names of the supported accuracy metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Mean absolute percentage error (fraction).
    Mape,
    /// Weighted absolute percentage error (fraction).
    Wape,
    /// Mean absolute error.
    Mae,
    /// Root mean squared error.
    Rmse,
    /// Mean forecast error relative to the mean actual.
    Bias,
    /// Mean absolute scaled error against the in-sample naive forecast.
    Mase,
}

impl Metric {
    /// All metrics, in reporting order.
    pub const ALL: [Metric; 6] = [
        Metric::Mape,
        Metric::Wape,
        Metric::Mae,
        Metric::Rmse,
        Metric::Bias,
        Metric::Mase,
    ];

    /// Lowercase metric name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Mape => "mape",
            Metric::Wape => "wape",
            Metric::Mae => "mae",
            Metric::Rmse => "rmse",
            Metric::Bias => "bias",
            Metric::Mase => "mase",
        }
    }

    /// Score used for ranking: lower is better.
    ///
    /// Bias is signed, so models are ranked on its magnitude.
    pub fn ranking_score(&self, value: f64) -> f64 {
        match self {
            Metric::Bias => value.abs(),
            _ => value,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mape" => Ok(Metric::Mape),
            "wape" => Ok(Metric::Wape),
            "mae" => Ok(Metric::Mae),
            "rmse" => Ok(Metric::Rmse),
            "bias" => Ok(Metric::Bias),
            "mase" => Ok(Metric::Mase),
            other => Err(BacktestError::InvalidParameter(format!(
                "unknown metric '{}'",
                other
            ))),
        }
    }
}

/// Accuracy metrics for one (actual, forecast) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowMetrics {
    /// Mean absolute percentage error over non-zero actuals (None if all zero).
    pub mape: Option<f64>,
    /// Weighted absolute percentage error (None if the actuals sum to zero).
    pub wape: Option<f64>,
    /// Mean absolute error.
    pub mae: f64,
    /// Root mean squared error.
    pub rmse: f64,
    /// Mean error divided by mean actual (None if the mean actual is zero).
    pub bias: Option<f64>,
    /// Mean absolute scaled error (None without usable history).
    pub mase: Option<f64>,
    /// Points left out of MAPE because the actual was zero.
    pub mape_excluded: usize,
    /// Number of scored points.
    pub points: usize,
}

impl WindowMetrics {
    /// Look up a metric by name.
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Mape => self.mape,
            Metric::Wape => self.wape,
            Metric::Mae => Some(self.mae),
            Metric::Rmse => Some(self.rmse),
            Metric::Bias => self.bias,
            Metric::Mase => self.mase,
        }
    }

    /// Iterate over the defined metrics.
    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(move |m| self.get(m).map(|v| (m, v)))
    }
}

/// Score a forecast against actual values.
///
/// Requires `actual.len() == forecast.len() > 0`.
///
/// # Example
/// ```
/// use demand_backtest::utils::metrics::score;
///
/// let m = score(&[100.0, 100.0, 100.0], &[110.0, 90.0, 100.0]).unwrap();
/// assert!((m.mae - 6.67).abs() < 0.01);
/// assert!((m.rmse - 8.16).abs() < 0.01);
/// assert_eq!(m.bias, Some(0.0));
/// ```
pub fn score(actual: &[f64], forecast: &[f64]) -> Result<WindowMetrics> {
    if actual.is_empty() || actual.len() != forecast.len() {
        return Err(BacktestError::DimensionMismatch {
            expected: actual.len(),
            got: forecast.len(),
        });
    }

    let n = actual.len() as f64;

    // MAE
    let abs_error_sum: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).abs())
        .sum();
    let mae = abs_error_sum / n;

    // RMSE
    let mse: f64 = actual
        .iter()
        .zip(forecast.iter())
        .map(|(a, f)| (a - f).powi(2))
        .sum::<f64>()
        / n;
    let rmse = mse.sqrt();

    // MAPE over non-zero actuals only
    let (ape_sum, ape_count) = actual
        .iter()
        .zip(forecast.iter())
        .filter(|(a, _)| **a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (a, f)| {
            (sum + ((a - f) / a).abs(), count + 1)
        });
    let mape = (ape_count > 0).then(|| ape_sum / ape_count as f64);
    let mape_excluded = actual.len() - ape_count;

    // WAPE
    let abs_actual_sum: f64 = actual.iter().map(|a| a.abs()).sum();
    let wape = (abs_actual_sum != 0.0).then(|| abs_error_sum / abs_actual_sum);

    // Bias
    let mean_actual = actual.iter().sum::<f64>() / n;
    let mean_error = forecast
        .iter()
        .zip(actual.iter())
        .map(|(f, a)| f - a)
        .sum::<f64>()
        / n;
    let bias = (mean_actual != 0.0).then(|| mean_error / mean_actual);

    Ok(WindowMetrics {
        mape,
        wape,
        mae,
        rmse,
        bias,
        mase: None,
        mape_excluded,
        points: actual.len(),
    })
}

/// Score a forecast and add MASE scaled by the training history.
///
/// MASE = MAE / mean(|y_t - y_{t-1}|) over `history`.
pub fn score_with_history(
    actual: &[f64],
    forecast: &[f64],
    history: &[f64],
) -> Result<WindowMetrics> {
    let mut metrics = score(actual, forecast)?;
    metrics.mase = naive_scale(history).map(|scale| metrics.mae / scale);
    Ok(metrics)
}

/// Mean absolute one-step change of the history.
fn naive_scale(history: &[f64]) -> Option<f64> {
    if history.len() < 2 {
        return None;
    }
    let scale = history
        .windows(2)
        .map(|w| (w[1] - w[0]).abs())
        .sum::<f64>()
        / (history.len() - 1) as f64;
    (scale > 0.0 && scale.is_finite()).then_some(scale)
}

/// Distribution of one metric across windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation (0 for a single window).
    pub std_dev: f64,
    /// Windows in which the metric was defined.
    pub count: usize,
}

impl MetricSummary {
    fn from_values(values: Vec<f64>) -> Self {
        let count = values.len();
        let mean = values.iter().mean();
        let std_dev = if count < 2 {
            0.0
        } else {
            values.iter().std_dev()
        };
        let median = Data::new(values).median();
        Self {
            mean,
            median,
            std_dev,
            count,
        }
    }
}

/// Per-metric aggregation over the scored windows of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    /// Number of windows aggregated.
    pub windows: usize,
    /// Summary per metric; metrics undefined in every window are absent.
    pub metrics: BTreeMap<Metric, MetricSummary>,
}

impl ReportSummary {
    /// Summary for one metric.
    pub fn get(&self, metric: Metric) -> Option<&MetricSummary> {
        self.metrics.get(&metric)
    }

    /// Mean of one metric across windows.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.get(metric).map(|s| s.mean)
    }
}

/// Aggregate window metrics into per-metric mean, median and spread.
///
/// Callers pass only the windows that were scored; an empty input is an
/// `EmptyReport` error.
pub fn aggregate<'a, I>(metrics: I) -> Result<ReportSummary>
where
    I: IntoIterator<Item = &'a WindowMetrics>,
{
    let mut windows = 0;
    let mut columns: BTreeMap<Metric, Vec<f64>> = BTreeMap::new();

    for window in metrics {
        windows += 1;
        for (metric, value) in window.iter() {
            columns.entry(metric).or_default().push(value);
        }
    }

    if windows == 0 {
        return Err(BacktestError::EmptyReport);
    }

    let metrics = columns
        .into_iter()
        .map(|(metric, values)| (metric, MetricSummary::from_values(values)))
        .collect();

    Ok(ReportSummary { windows, metrics })
}
