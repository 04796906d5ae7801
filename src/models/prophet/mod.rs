//! Prophet-style decomposable model: piecewise-linear trend, yearly
//! Fourier seasonality and an optional holiday effect.

mod holidays;
mod model;

pub use holidays::{Holiday, PharmaCalendar};
pub use model::{FittedProphet, Prophet, ProphetConfig, SeasonalityMode};
