//! Adapter traits shared by every forecasting model.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::ModelFitError;
use std::fmt;
use std::sync::Arc;

/// A configured, unfitted forecasting model.
///
/// Fitting never mutates the model, so one instance can be shared across
/// windows and worker threads. Each call to [`fit`](ForecastModel::fit)
/// produces an independent [`FittedModel`].
pub trait ForecastModel: Send + Sync + fmt::Debug {
    /// Display name of the model.
    fn name(&self) -> &str;

    /// Smallest training length this configuration accepts.
    fn min_history(&self) -> usize;

    /// Fit the model on `train`.
    ///
    /// Implementations must check the history length before any numeric work
    /// and fail with [`ModelFitError::InsufficientHistory`] when it is too short.
    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError>;

    /// Fit on `train` and forecast `horizon` steps past its last observation.
    fn fit_predict(
        &self,
        train: &TimeSeries,
        horizon: usize,
    ) -> Result<ForecastResult, ModelFitError> {
        self.fit(train)?.predict(horizon)
    }
}

/// A model that has been fitted on one training range.
pub trait FittedModel: fmt::Debug {
    /// Display name of the model.
    fn name(&self) -> &str;

    /// Forecast `horizon` steps past the end of the training data.
    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError>;
}

/// Shared handle to a model, as stored in comparison maps.
///
/// # Example
///
/// ```
/// use demand_backtest::models::{ArimaConfig, Arima, SharedModel};
/// use std::sync::Arc;
///
/// let model: SharedModel = Arc::new(Arima::new(ArimaConfig::default()).unwrap());
/// assert_eq!(model.name(), "ARIMA");
/// assert_eq!(model.min_history(), 4);
/// ```
pub type SharedModel = Arc<dyn ForecastModel>;

/// Validate a training series and return its values.
///
/// Checks the length against `model.min_history()` first, then rejects
/// missing (non-finite) observations.
pub fn training_values<'a, M>(model: &M, train: &'a TimeSeries) -> Result<&'a [f64], ModelFitError>
where
    M: ForecastModel + ?Sized,
{
    let needed = model.min_history();
    if train.len() < needed {
        return Err(ModelFitError::InsufficientHistory {
            model: model.name().to_string(),
            needed,
            got: train.len(),
        });
    }

    let count = train.missing_count();
    if count > 0 {
        return Err(ModelFitError::MissingValues {
            model: model.name().to_string(),
            count,
        });
    }

    Ok(train.values())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[derive(Debug)]
    struct MeanModel;

    #[derive(Debug)]
    struct FittedMean(f64);

    impl ForecastModel for MeanModel {
        fn name(&self) -> &str {
            "Mean"
        }

        fn min_history(&self) -> usize {
            3
        }

        fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
            let values = training_values(self, train)?;
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Ok(Box::new(FittedMean(mean)))
        }
    }

    impl FittedModel for FittedMean {
        fn name(&self) -> &str {
            "Mean"
        }

        fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
            Ok(ForecastResult::new(self.name(), vec![self.0; horizon]))
        }
    }

    fn series(values: Vec<f64>) -> TimeSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TimeSeries::weekly(start, values).unwrap()
    }

    #[test]
    fn fit_predict_through_shared_handle() {
        let model: SharedModel = Arc::new(MeanModel);
        let forecast = model.fit_predict(&series(vec![1.0, 2.0, 3.0]), 2).unwrap();
        assert_eq!(forecast.values(), &[2.0, 2.0]);
        assert_eq!(forecast.model(), "Mean");
    }

    #[test]
    fn short_history_is_rejected_first() {
        let err = MeanModel.fit(&series(vec![f64::NAN, 2.0])).unwrap_err();
        assert_eq!(
            err,
            ModelFitError::InsufficientHistory {
                model: "Mean".to_string(),
                needed: 3,
                got: 2
            }
        );
    }

    #[test]
    fn missing_values_are_rejected() {
        let err = MeanModel
            .fit(&series(vec![1.0, f64::NAN, 3.0, f64::NAN]))
            .unwrap_err();
        assert_eq!(
            err,
            ModelFitError::MissingValues {
                model: "Mean".to_string(),
                count: 2
            }
        );
    }
}
