//! ARIMA(p, d, q) adapter fitted by conditional sum of squares.

mod diff;
mod model;

pub use diff::{difference, integrate};
pub use model::{Arima, ArimaConfig, FittedArima};
