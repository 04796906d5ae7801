//! # demand-backtest
//!
//! Rolling-window backtesting and model comparison for weekly demand
//! forecasts.
//!
//! A series is cut into expanding (or sliding) train/test windows, each
//! candidate model is refit on every training range, and the forecasts are
//! scored with MAPE, WAPE, MAE, RMSE, bias and MASE. Models ship for ARIMA,
//! gradient-boosted trees, Prophet-style additive regression and LSTM.
//!
//! ```
//! use demand_backtest::prelude::*;
//! use chrono::{TimeZone, Utc};
//! use std::collections::BTreeMap;
//!
//! let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
//! let values: Vec<f64> = (0..30).map(|t| 200.0 + 3.0 * t as f64).collect();
//! let series = TimeSeries::weekly(start, values).unwrap();
//!
//! let mut models = BTreeMap::new();
//! models.insert("random_walk".to_string(), ModelSpec::Arima(ArimaConfig::new(0, 1, 0)).build().unwrap());
//!
//! let result = ModelComparator::new()
//!     .compare(&series, &models, &BacktestConfig::new(18, 4), Metric::Wape)
//!     .unwrap();
//! assert_eq!(result.best().unwrap().model, "random_walk");
//! ```

#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]

pub mod backtest;
pub mod core;
pub mod error;
pub mod models;
pub mod utils;

pub use error::{BacktestError, ModelFitError, Result};

pub mod prelude {
    pub use crate::backtest::{
        BacktestConfig, BacktestReport, ComparisonPlan, ComparisonResult, ModelComparator,
        RollingBacktester,
    };
    pub use crate::core::{ForecastResult, RollingWindows, TimeSeries, TrainingStrategy};
    pub use crate::error::{BacktestError, ModelFitError, Result};
    pub use crate::models::{
        ArimaConfig, ForecastModel, LstmConfig, ModelSpec, ProphetConfig, SharedModel,
        XgboostConfig,
    };
    pub use crate::utils::Metric;
}
