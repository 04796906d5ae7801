//! Causal train/test window planning for rolling backtests.

use crate::core::TimeSeries;
use crate::error::{BacktestError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How the training range moves between windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStrategy {
    /// Training always starts at the first observation and grows.
    #[default]
    Expanding,
    /// Training keeps a fixed length and slides forward with the test range.
    Sliding,
}

/// One train/test split, as index offsets into a series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    /// Position of the window in the plan.
    pub index: usize,
    /// Observations the model may see during fit.
    pub train: Range<usize>,
    /// Observations the forecast is scored against.
    pub test: Range<usize>,
}

impl Window {
    /// Number of training observations.
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    /// Number of test observations.
    pub fn horizon(&self) -> usize {
        self.test.len()
    }

    /// Whether this window's test range shares any index with `other`'s
    /// training range.
    pub fn leaks_into(&self, other: &Window) -> bool {
        self.test.start < other.train.end && other.train.start < self.test.end
    }
}

/// A lazy, restartable plan of rolling windows over a series of fixed length.
///
/// Window `i` tests on `[m + i*s, m + i*s + h)`. Under the expanding
/// strategy it trains on `[0, m + i*s)`; under the sliding strategy on
/// `[i*s, m + i*s)`.
///
/// # Example
/// ```
/// use demand_backtest::core::RollingWindows;
///
/// let plan = RollingWindows::new(24, 12, 4, 4).unwrap();
/// assert_eq!(plan.len(), 3);
///
/// let tests: Vec<_> = plan.iter().map(|w| w.test).collect();
/// assert_eq!(tests, vec![12..16, 16..20, 20..24]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingWindows {
    series_len: usize,
    min_train: usize,
    horizon: usize,
    step: usize,
    strategy: TrainingStrategy,
}

impl RollingWindows {
    /// Plan windows over a series of `series_len` observations.
    ///
    /// Fails with `InsufficientData` when not even one window fits.
    pub fn new(series_len: usize, min_train: usize, horizon: usize, step: usize) -> Result<Self> {
        if min_train == 0 {
            return Err(BacktestError::InvalidParameter(
                "minimum train length must be positive".to_string(),
            ));
        }
        if horizon == 0 {
            return Err(BacktestError::InvalidParameter(
                "horizon must be positive".to_string(),
            ));
        }
        if step == 0 {
            return Err(BacktestError::InvalidParameter(
                "step must be positive".to_string(),
            ));
        }

        let needed = min_train.checked_add(horizon).ok_or_else(|| {
            BacktestError::InvalidParameter(
                "minimum train length plus horizon overflows".to_string(),
            )
        })?;
        if series_len < needed {
            return Err(BacktestError::InsufficientData {
                needed,
                got: series_len,
            });
        }

        Ok(Self {
            series_len,
            min_train,
            horizon,
            step,
            strategy: TrainingStrategy::Expanding,
        })
    }

    /// Plan windows over `series` with the step defaulting to the horizon.
    pub fn for_series(series: &TimeSeries, min_train: usize, horizon: usize) -> Result<Self> {
        Self::new(series.len(), min_train, horizon, horizon)
    }

    /// Set the training strategy.
    pub fn with_strategy(mut self, strategy: TrainingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Number of windows: `floor((L - m - h) / s) + 1`.
    pub fn len(&self) -> usize {
        (self.series_len - self.min_train - self.horizon) / self.step + 1
    }

    /// Always false: construction guarantees at least one window.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Training strategy in use.
    pub fn strategy(&self) -> TrainingStrategy {
        self.strategy
    }

    /// Forecast horizon of every window.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// Get window `index`, if it exists.
    pub fn get(&self, index: usize) -> Option<Window> {
        if index >= self.len() {
            return None;
        }
        let origin = self.min_train + index * self.step;
        let train_start = match self.strategy {
            TrainingStrategy::Expanding => 0,
            TrainingStrategy::Sliding => index * self.step,
        };
        Some(Window {
            index,
            train: train_start..origin,
            test: origin..origin + self.horizon,
        })
    }

    /// Iterate over the windows in order. Each call starts from the first window.
    pub fn iter(&self) -> WindowIter {
        WindowIter {
            plan: *self,
            next: 0,
        }
    }
}

impl IntoIterator for &RollingWindows {
    type Item = Window;
    type IntoIter = WindowIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`RollingWindows`] plan.
#[derive(Debug, Clone)]
pub struct WindowIter {
    plan: RollingWindows,
    next: usize,
}

impl Iterator for WindowIter {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let window = self.plan.get(self.next)?;
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.plan.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for WindowIter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twenty_four_weeks_give_three_windows() {
        let plan = RollingWindows::new(24, 12, 4, 4).unwrap();
        assert_eq!(plan.len(), 3);

        let windows: Vec<_> = plan.iter().collect();
        assert_eq!(windows[0].train, 0..12);
        assert_eq!(windows[0].test, 12..16);
        assert_eq!(windows[1].train, 0..16);
        assert_eq!(windows[1].test, 16..20);
        assert_eq!(windows[2].train, 0..20);
        assert_eq!(windows[2].test, 20..24);
        assert!(windows.iter().enumerate().all(|(i, w)| w.index == i));
    }

    #[test]
    fn fifteen_points_are_insufficient() {
        let result = RollingWindows::new(15, 12, 4, 4);
        assert!(matches!(
            result,
            Err(BacktestError::InsufficientData { needed: 16, got: 15 })
        ));
    }

    #[test]
    fn oversized_horizon_is_rejected() {
        let result = RollingWindows::new(24, 12, usize::MAX, 4);
        assert!(matches!(result, Err(BacktestError::InvalidParameter(_))));
        let result = RollingWindows::new(24, usize::MAX, 1, 1);
        assert!(matches!(result, Err(BacktestError::InvalidParameter(_))));
    }

    #[test]
    fn exact_fit_gives_one_window() {
        let plan = RollingWindows::new(16, 12, 4, 1).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get(0).unwrap().test, 12..16);
        assert!(plan.get(1).is_none());
    }

    #[test]
    fn overlapping_test_windows_with_unit_step() {
        let plan = RollingWindows::new(20, 10, 3, 1).unwrap();
        // floor((20 - 10 - 3) / 1) + 1 = 8
        assert_eq!(plan.len(), 8);
        assert_eq!(plan.iter().last().unwrap().test, 17..20);
    }

    #[test]
    fn partial_trailing_window_is_dropped() {
        let plan = RollingWindows::new(23, 12, 4, 4).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.iter().last().unwrap().test, 16..20);
    }

    #[test]
    fn sliding_strategy_keeps_train_length() {
        let plan = RollingWindows::new(30, 10, 4, 2)
            .unwrap()
            .with_strategy(TrainingStrategy::Sliding);
        assert_eq!(plan.strategy(), TrainingStrategy::Sliding);
        for window in &plan {
            assert_eq!(window.train_len(), 10);
            assert_eq!(window.train.end, window.test.start);
        }
        assert_eq!(plan.get(2).unwrap().train, 4..14);
    }

    #[test]
    fn iteration_is_restartable() {
        let plan = RollingWindows::new(40, 10, 5, 3).unwrap();
        let first: Vec<_> = plan.iter().collect();
        let second: Vec<_> = plan.iter().collect();
        assert_eq!(first, second);
        assert_eq!(plan.iter().len(), plan.len());
    }

    #[test]
    fn no_test_range_leaks_into_earlier_training() {
        let plan = RollingWindows::new(50, 8, 6, 2).unwrap();
        let windows: Vec<_> = plan.iter().collect();
        for (i, wi) in windows.iter().enumerate() {
            for wj in &windows[..=i] {
                assert!(!wi.leaks_into(wj));
            }
        }
    }

    #[test]
    fn rejects_zero_parameters() {
        assert!(matches!(
            RollingWindows::new(20, 0, 4, 4),
            Err(BacktestError::InvalidParameter(_))
        ));
        assert!(matches!(
            RollingWindows::new(20, 10, 0, 4),
            Err(BacktestError::InvalidParameter(_))
        ));
        assert!(matches!(
            RollingWindows::new(20, 10, 4, 0),
            Err(BacktestError::InvalidParameter(_))
        ));
    }

    #[test]
    fn for_series_defaults_step_to_horizon() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let ts = TimeSeries::weekly(start, vec![1.0; 24]).unwrap();
        let plan = RollingWindows::for_series(&ts, 12, 4).unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.horizon(), 4);
    }
}
