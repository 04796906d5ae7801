//! Forecasting models behind a common fit/predict adapter.

mod spec;
mod traits;

pub mod arima;
pub mod lstm;
pub mod prophet;
pub mod xgboost;

pub use arima::{Arima, ArimaConfig, FittedArima};
pub use lstm::{FittedLstm, Lstm, LstmConfig};
pub use prophet::{FittedProphet, Prophet, ProphetConfig, SeasonalityMode};
pub use spec::ModelSpec;
pub use traits::{training_values, FittedModel, ForecastModel, SharedModel};
pub use xgboost::{FittedXgboost, Xgboost, XgboostConfig};
