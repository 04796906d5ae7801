//! Core data structures: series, windows and forecasts.

mod forecast;
mod time_series;
mod window;

pub use forecast::ForecastResult;
pub use time_series::TimeSeries;
pub use window::{RollingWindows, TrainingStrategy, Window, WindowIter};
