//! Forecast result structure for holding point predictions.

use serde::Serialize;

/// Point predictions produced by one fitted model.
///
/// Step `i` of the forecast corresponds to the `i`-th period after the last
/// training observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    model: String,
    values: Vec<f64>,
}

impl ForecastResult {
    /// Create a forecast from point predictions.
    pub fn new(model: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            model: model.into(),
            values,
        }
    }

    /// Name of the model that produced the forecast.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.values.len()
    }

    /// Check if forecast is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Point predictions.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Whether every prediction is finite.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// Consume the forecast and return its predictions.
    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}
