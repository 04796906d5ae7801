//! ARIMA (Autoregressive Integrated Moving Average) adapter.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::ModelFitError;
use crate::models::arima::diff::{difference, integrate};
use crate::models::traits::{training_values, FittedModel, ForecastModel};
use crate::utils::optimization::{nelder_mead, NelderMeadConfig};
use serde::{Deserialize, Serialize};

const NAME: &str = "ARIMA";
const MAX_ORDER: usize = 5;
const COEFFICIENT_BOUND: f64 = 0.99;

/// ARIMA order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArimaConfig {
    /// AR order (p)
    pub p: usize,
    /// Differencing order (d)
    pub d: usize,
    /// MA order (q)
    pub q: usize,
}

impl ArimaConfig {
    /// ARIMA(p, d, q) orders.
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Total number of estimated parameters (AR + MA + intercept).
    pub fn num_params(&self) -> usize {
        self.p + self.q + 1
    }

    /// `d + max(p, q) + 2`.
    pub fn min_history(&self) -> usize {
        self.d + self.p.max(self.q) + 2
    }

    /// Check the orders against the supported limits.
    pub fn validate(&self) -> Result<(), ModelFitError> {
        if self.p > MAX_ORDER || self.q > MAX_ORDER {
            return Err(invalid(format!(
                "AR and MA orders must be at most {MAX_ORDER}, got p={} q={}",
                self.p, self.q
            )));
        }
        if self.d > 2 {
            return Err(invalid(format!(
                "differencing order must be at most 2, got {}",
                self.d
            )));
        }
        Ok(())
    }
}

impl Default for ArimaConfig {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

fn invalid(reason: String) -> ModelFitError {
    ModelFitError::InvalidConfig {
        model: NAME.to_string(),
        reason,
    }
}

/// Unfitted ARIMA model.
///
/// ARIMA(p, d, q) combines:
/// - AR(p): Autoregressive component
/// - I(d): Differencing for stationarity
/// - MA(q): Moving average component
#[derive(Debug, Clone)]
pub struct Arima {
    config: ArimaConfig,
}

impl Arima {
    /// Validate `config` and create the model.
    pub fn new(config: ArimaConfig) -> Result<Self, ModelFitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ArimaConfig {
        self.config
    }

    /// Fit and return the concrete fitted model.
    pub fn fit_arima(&self, train: &TimeSeries) -> Result<FittedArima, ModelFitError> {
        let values = training_values(self, train)?;
        let ArimaConfig { p, d, q } = self.config;

        let differenced = difference(values, d);
        let (intercept, ar, ma) = estimate(&differenced, p, q);
        let residuals = residuals(&differenced, intercept, &ar, &ma);

        let start = p.max(q);
        let effective = &residuals[start..];
        let variance = effective.iter().map(|r| r * r).sum::<f64>() / effective.len() as f64;
        if !variance.is_finite() || !intercept.is_finite() {
            return Err(ModelFitError::Numerical {
                model: NAME.to_string(),
                reason: "conditional sum of squares diverged".to_string(),
            });
        }

        let n_eff = effective.len() as f64;
        let aic = (variance > 0.0).then(|| {
            let log_likelihood =
                -0.5 * n_eff * (1.0 + variance.ln() + (2.0 * std::f64::consts::PI).ln());
            -2.0 * log_likelihood + 2.0 * self.config.num_params() as f64
        });

        Ok(FittedArima {
            config: self.config,
            intercept,
            ar,
            ma,
            history: values.to_vec(),
            differenced,
            residuals,
            variance,
            aic,
        })
    }
}

impl Default for Arima {
    fn default() -> Self {
        Self {
            config: ArimaConfig::default(),
        }
    }
}

impl ForecastModel for Arima {
    fn name(&self) -> &str {
        NAME
    }

    fn min_history(&self) -> usize {
        self.config.min_history()
    }

    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        Ok(Box::new(self.fit_arima(train)?))
    }
}

/// One step of the ARMA recursion on the differenced scale.
fn one_step(history: &[f64], shocks: &[f64], intercept: f64, ar: &[f64], ma: &[f64]) -> f64 {
    let t = history.len();
    let ar_part: f64 = ar
        .iter()
        .enumerate()
        .map(|(i, phi)| phi * (history[t - 1 - i] - intercept))
        .sum();
    let ma_part: f64 = ma
        .iter()
        .enumerate()
        .map(|(i, theta)| theta * shocks[t - 1 - i])
        .sum();
    intercept + ar_part + ma_part
}

/// Residuals of the ARMA recursion; the first `max(p, q)` are zero.
fn residuals(series: &[f64], intercept: f64, ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let start = ar.len().max(ma.len());
    let mut shocks = vec![0.0; series.len()];
    for t in start..series.len() {
        shocks[t] = series[t] - one_step(&series[..t], &shocks[..t], intercept, ar, ma);
    }
    shocks
}

fn conditional_sum_of_squares(series: &[f64], intercept: f64, ar: &[f64], ma: &[f64]) -> f64 {
    residuals(series, intercept, ar, ma)
        .iter()
        .map(|e| e * e)
        .sum()
}

/// Estimate `(intercept, ar, ma)` by bounded Nelder-Mead on the CSS.
fn estimate(series: &[f64], p: usize, q: usize) -> (f64, Vec<f64>, Vec<f64>) {
    let mean = series.iter().sum::<f64>() / series.len() as f64;
    if p == 0 && q == 0 {
        return (mean, vec![], vec![]);
    }

    let mut initial = vec![mean];
    initial.extend((0..p).map(|i| 0.1 / (i + 1) as f64));
    initial.extend((0..q).map(|i| 0.1 / (i + 1) as f64));

    let mut bounds = vec![(f64::NEG_INFINITY, f64::INFINITY)];
    bounds.extend(std::iter::repeat((-COEFFICIENT_BOUND, COEFFICIENT_BOUND)).take(p + q));

    let result = nelder_mead(
        |params| {
            conditional_sum_of_squares(series, params[0], &params[1..1 + p], &params[1 + p..])
        },
        &initial,
        &bounds,
        NelderMeadConfig::default(),
    );

    let point = result.optimal_point;
    (point[0], point[1..1 + p].to_vec(), point[1 + p..].to_vec())
}

/// ARIMA fitted on one training range.
#[derive(Debug, Clone)]
pub struct FittedArima {
    config: ArimaConfig,
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    history: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
    variance: f64,
    aic: Option<f64>,
}

impl FittedArima {
    pub fn config(&self) -> ArimaConfig {
        self.config
    }

    /// Estimated AR coefficients.
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    /// Estimated MA coefficients.
    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// Mean of the differenced series under the fitted model.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// In-sample residual variance on the differenced scale.
    pub fn residual_variance(&self) -> f64 {
        self.variance
    }

    /// Akaike information criterion; `None` for a perfect fit.
    pub fn aic(&self) -> Option<f64> {
        self.aic
    }
}

impl FittedModel for FittedArima {
    fn name(&self) -> &str {
        NAME
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
        let mut extended = self.differenced.clone();
        let mut shocks = self.residuals.clone();

        for _ in 0..horizon {
            let next = one_step(&extended, &shocks, self.intercept, &self.ar, &self.ma);
            extended.push(next);
            // Future shocks have zero expectation
            shocks.push(0.0);
        }

        let steps = &extended[self.differenced.len()..];
        let values = integrate(steps, &self.history, self.config.d);
        Ok(ForecastResult::new(NAME, values))
    }
}
