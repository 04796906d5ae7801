//! TimeSeries data structure for weekly demand histories.

use crate::error::{BacktestError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// An immutable univariate time series with strictly increasing timestamps.
///
/// Values may be NaN to mark a missing observation; the series itself never
/// fills them in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<f64>,
    label: Option<String>,
}

impl TimeSeries {
    /// Create a new TimeSeries, validating its shape.
    pub fn new(timestamps: Vec<DateTime<Utc>>, values: Vec<f64>) -> Result<Self> {
        if timestamps.is_empty() {
            return Err(BacktestError::EmptyData);
        }

        if values.len() != timestamps.len() {
            return Err(BacktestError::DimensionMismatch {
                expected: timestamps.len(),
                got: values.len(),
            });
        }

        // Validate timestamps are strictly increasing
        for i in 1..timestamps.len() {
            if timestamps[i] <= timestamps[i - 1] {
                return Err(BacktestError::TimestampError(format!(
                    "timestamps must be strictly increasing (position {})",
                    i
                )));
            }
        }

        Ok(Self {
            timestamps,
            values,
            label: None,
        })
    }

    /// Create a weekly series starting at `start`.
    pub fn weekly(start: DateTime<Utc>, values: Vec<f64>) -> Result<Self> {
        let timestamps = (0..values.len())
            .map(|i| start + Duration::weeks(i as i64))
            .collect();
        Self::new(timestamps, values)
    }

    /// Attach a label (e.g. the brand identifier).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Get the number of observations.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if the series is empty.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Get timestamps.
    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    /// Get values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Get the label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Extract the observations in `[start, end)` as a new series.
    pub fn slice(&self, start: usize, end: usize) -> Result<TimeSeries> {
        if start >= end {
            return Err(BacktestError::InvalidParameter(format!(
                "slice start {} must be < end {}",
                start, end
            )));
        }
        if end > self.len() {
            return Err(BacktestError::InvalidParameter(format!(
                "slice end {} exceeds series length {}",
                end,
                self.len()
            )));
        }

        Ok(TimeSeries {
            timestamps: self.timestamps[start..end].to_vec(),
            values: self.values[start..end].to_vec(),
            label: self.label.clone(),
        })
    }

    /// Number of NaN or infinite values.
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_finite()).count()
    }

    /// Check if series has missing values (NaN or Inf).
    pub fn has_missing_values(&self) -> bool {
        self.missing_count() > 0
    }

    /// Infer the modal spacing between timestamps.
    ///
    /// `tolerance` is the minimum share of gaps that must equal the modal gap.
    pub fn infer_frequency(&self, tolerance: f64) -> Result<Duration> {
        if self.len() < 2 {
            return Err(BacktestError::InsufficientData {
                needed: 2,
                got: self.len(),
            });
        }

        let mut counts: HashMap<i64, usize> = HashMap::new();
        for w in self.timestamps.windows(2) {
            *counts.entry((w[1] - w[0]).num_seconds()).or_insert(0) += 1;
        }

        // Smallest gap wins ties so the result does not depend on map order
        let (modal_diff, modal_count) = counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&diff, &count)| (diff, count))
            .ok_or_else(|| BacktestError::TimestampError("empty spacing data".to_string()))?;

        let modal_ratio = modal_count as f64 / (self.len() - 1) as f64;
        if modal_ratio < tolerance {
            return Err(BacktestError::TimestampError(
                "no unique modal spacing found".to_string(),
            ));
        }

        Ok(Duration::seconds(modal_diff))
    }

    /// Check whether every gap equals `frequency`.
    pub fn is_regular(&self, frequency: Duration) -> bool {
        self.timestamps.windows(2).all(|w| w[1] - w[0] == frequency)
    }
}
