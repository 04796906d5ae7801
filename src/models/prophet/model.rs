//! Prophet-style regression on trend, seasonality and holiday features.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::ModelFitError;
use crate::models::prophet::holidays::PharmaCalendar;
use crate::models::traits::{training_values, FittedModel, ForecastModel};
use crate::utils::ols::{ridge_fit, RidgeFit};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const NAME: &str = "Prophet";
const MIN_HISTORY: usize = 8;
/// Assumed residual scale on max-normalised data; turns prior scales into
/// ridge penalties via `(NOISE_SCALE / prior_scale)^2`.
const NOISE_SCALE: f64 = 0.05;

/// How seasonal and holiday effects combine with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    #[default]
    Additive,
    /// Effects scale with the trend level.
    Multiplicative,
}

/// Prophet hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProphetConfig {
    pub seasonality_mode: SeasonalityMode,
    /// Number of Fourier pairs for yearly seasonality (0 disables it).
    pub yearly_order: usize,
    /// Length of a year in observations.
    pub period_weeks: f64,
    /// Maximum number of potential trend changepoints.
    pub n_changepoints: usize,
    /// Share of the history in which changepoints may be placed.
    pub changepoint_range: f64,
    /// Flexibility of the trend; larger allows sharper slope changes.
    pub changepoint_prior_scale: f64,
    /// Strength of the seasonal and holiday effects.
    pub seasonality_prior_scale: f64,
    /// Include the pharma holiday indicator.
    pub holidays: bool,
}

impl Default for ProphetConfig {
    fn default() -> Self {
        Self {
            seasonality_mode: SeasonalityMode::Additive,
            yearly_order: 10,
            period_weeks: 52.18,
            n_changepoints: 10,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays: false,
        }
    }
}

impl ProphetConfig {
    /// Set how seasonality combines with the trend.
    pub fn with_mode(mut self, mode: SeasonalityMode) -> Self {
        self.seasonality_mode = mode;
        self
    }

    /// Set the number of yearly Fourier pairs.
    pub fn with_yearly_order(mut self, order: usize) -> Self {
        self.yearly_order = order;
        self
    }

    /// Set the number of potential trend changepoints.
    pub fn with_changepoints(mut self, n_changepoints: usize) -> Self {
        self.n_changepoints = n_changepoints;
        self
    }

    /// Enable the pharma holiday regressor.
    pub fn with_holidays(mut self, holidays: bool) -> Self {
        self.holidays = holidays;
        self
    }

    /// `2 * yearly_order + 4`, never below 8.
    pub fn min_history(&self) -> usize {
        (2 * self.yearly_order + 4).max(MIN_HISTORY)
    }

    /// Check orders, ranges and prior scales.
    pub fn validate(&self) -> Result<(), ModelFitError> {
        let fail = |reason: &str| {
            Err(ModelFitError::InvalidConfig {
                model: NAME.to_string(),
                reason: reason.to_string(),
            })
        };
        if !(self.period_weeks.is_finite() && self.period_weeks > 1.0) {
            return fail("period_weeks must be greater than 1");
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return fail("changepoint_range must be in (0, 1]");
        }
        if !(self.changepoint_prior_scale.is_finite() && self.changepoint_prior_scale > 0.0) {
            return fail("changepoint_prior_scale must be positive");
        }
        if !(self.seasonality_prior_scale.is_finite() && self.seasonality_prior_scale > 0.0) {
            return fail("seasonality_prior_scale must be positive");
        }
        Ok(())
    }

    fn delta_penalty(&self) -> f64 {
        (NOISE_SCALE / self.changepoint_prior_scale).powi(2)
    }

    fn seasonal_penalty(&self) -> f64 {
        (NOISE_SCALE / self.seasonality_prior_scale).powi(2)
    }
}

/// Unfitted Prophet-style model.
#[derive(Debug, Clone)]
pub struct Prophet {
    config: ProphetConfig,
}

impl Prophet {
    /// Validate `config` and create the model.
    pub fn new(config: ProphetConfig) -> Result<Self, ModelFitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProphetConfig {
        &self.config
    }

    /// Fit and return the concrete fitted model.
    pub fn fit_prophet(&self, train: &TimeSeries) -> Result<FittedProphet, ModelFitError> {
        let values = training_values(self, train)?;
        let n = values.len();
        let step = train.infer_frequency(0.5).unwrap_or_else(|_| Duration::weeks(1));

        let scale = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let scale = if scale > 0.0 { scale } else { 1.0 };
        let scaled: Vec<f64> = values.iter().map(|v| v / scale).collect();

        let features = Features {
            config: &self.config,
            span: (n - 1) as f64,
            changepoints: changepoints(n, &self.config),
        };
        let timestamps = train.timestamps();
        let trend_rows: Vec<Vec<f64>> = (0..n).map(|i| features.trend_row(i)).collect();
        let effect_rows: Vec<Vec<f64>> = (0..n)
            .map(|i| features.effect_row(i, timestamps[i], step))
            .collect();

        let (trend, effects) = match self.config.seasonality_mode {
            SeasonalityMode::Additive => {
                let rows: Vec<Vec<f64>> = trend_rows
                    .iter()
                    .zip(&effect_rows)
                    .map(|(t, e)| t.iter().chain(e).copied().collect())
                    .collect();
                let mut penalties = features.trend_penalties();
                penalties.extend(features.effect_penalties());
                let joint = solve(&rows, &scaled, &penalties)?;
                let split = features.trend_width();
                (
                    RidgeFit {
                        coefficients: joint.coefficients[..split].to_vec(),
                    },
                    RidgeFit {
                        coefficients: joint.coefficients[split..].to_vec(),
                    },
                )
            }
            SeasonalityMode::Multiplicative => {
                let trend = solve(&trend_rows, &scaled, &features.trend_penalties())?;
                let level = trend.predict(&trend_rows);
                if level.iter().any(|l| *l <= 1e-9) {
                    return Err(ModelFitError::Numerical {
                        model: NAME.to_string(),
                        reason: "multiplicative seasonality needs a positive trend".to_string(),
                    });
                }
                let ratio: Vec<f64> = scaled
                    .iter()
                    .zip(&level)
                    .map(|(y, l)| y / l - 1.0)
                    .collect();
                let effects = if features.effect_width() == 0 {
                    RidgeFit {
                        coefficients: vec![],
                    }
                } else {
                    solve(&effect_rows, &ratio, &features.effect_penalties())?
                };
                (trend, effects)
            }
        };

        Ok(FittedProphet {
            config: self.config.clone(),
            n,
            scale,
            changepoints: features.changepoints,
            trend,
            effects,
            last_timestamp: timestamps[n - 1],
            step,
        })
    }
}

impl Default for Prophet {
    fn default() -> Self {
        Self {
            config: ProphetConfig::default(),
        }
    }
}

impl ForecastModel for Prophet {
    fn name(&self) -> &str {
        NAME
    }

    fn min_history(&self) -> usize {
        self.config.min_history()
    }

    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        Ok(Box::new(self.fit_prophet(train)?))
    }
}

fn solve(rows: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<RidgeFit, ModelFitError> {
    ridge_fit(rows, y, penalties).map_err(|e| ModelFitError::Numerical {
        model: NAME.to_string(),
        reason: e.to_string(),
    })
}

/// Changepoint locations on the `[0, 1]` time scale, evenly spaced over the
/// first `changepoint_range` share of the history.
fn changepoints(n: usize, config: &ProphetConfig) -> Vec<f64> {
    let history = ((n as f64 * config.changepoint_range).floor() as usize).max(1);
    let count = config.n_changepoints.min(history.saturating_sub(1));
    if count == 0 {
        return vec![];
    }
    let span = (n - 1) as f64;
    (1..=count)
        .map(|j| {
            let index = (j as f64 * (history - 1) as f64 / count as f64).round();
            index / span
        })
        .collect()
}

/// Design-row builder shared by fit and predict.
struct Features<'a> {
    config: &'a ProphetConfig,
    span: f64,
    changepoints: Vec<f64>,
}

impl Features<'_> {
    fn trend_width(&self) -> usize {
        2 + self.changepoints.len()
    }

    fn effect_width(&self) -> usize {
        2 * self.config.yearly_order + usize::from(self.config.holidays)
    }

    /// `[1, t, (t - s_1)+, ..., (t - s_J)+]` with `t = i / (n - 1)`.
    fn trend_row(&self, index: usize) -> Vec<f64> {
        let t = index as f64 / self.span;
        let mut row = vec![1.0, t];
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));
        row
    }

    fn trend_penalties(&self) -> Vec<f64> {
        let mut penalties = vec![0.0, 0.0];
        penalties.extend(std::iter::repeat(self.config.delta_penalty()).take(self.changepoints.len()));
        penalties
    }

    /// Fourier pairs at observation `index`, then the holiday indicator.
    fn effect_row(&self, index: usize, timestamp: DateTime<Utc>, step: Duration) -> Vec<f64> {
        let mut row = Vec::with_capacity(self.effect_width());
        for k in 1..=self.config.yearly_order {
            let angle = 2.0 * PI * k as f64 * index as f64 / self.config.period_weeks;
            row.push(angle.sin());
            row.push(angle.cos());
        }
        if self.config.holidays {
            let start = timestamp.date_naive();
            let end = (timestamp + step).date_naive();
            row.push(if PharmaCalendar.touches(start, end) { 1.0 } else { 0.0 });
        }
        row
    }

    fn effect_penalties(&self) -> Vec<f64> {
        vec![self.config.seasonal_penalty(); self.effect_width()]
    }
}

/// Prophet fitted on one training range.
#[derive(Debug, Clone)]
pub struct FittedProphet {
    config: ProphetConfig,
    n: usize,
    scale: f64,
    changepoints: Vec<f64>,
    trend: RidgeFit,
    effects: RidgeFit,
    last_timestamp: DateTime<Utc>,
    step: Duration,
}

impl FittedProphet {
    /// Changepoint locations on the `[0, 1]` training time scale.
    pub fn changepoints(&self) -> &[f64] {
        &self.changepoints
    }

    /// Trend slope adjustment at each changepoint, in original units per
    /// training span.
    pub fn changepoint_deltas(&self) -> Vec<f64> {
        self.trend.coefficients[2..]
            .iter()
            .map(|d| d * self.scale)
            .collect()
    }

    /// Fitted holiday effect, if the indicator is enabled.
    pub fn holiday_effect(&self) -> Option<f64> {
        if !self.config.holidays {
            return None;
        }
        self.effects.coefficients.last().copied()
    }

    fn features(&self) -> Features<'_> {
        Features {
            config: &self.config,
            span: (self.n - 1) as f64,
            changepoints: self.changepoints.clone(),
        }
    }
}

impl FittedModel for FittedProphet {
    fn name(&self) -> &str {
        NAME
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
        let features = self.features();
        let values = (1..=horizon)
            .map(|k| {
                let index = self.n - 1 + k;
                let timestamp = self.last_timestamp + self.step * k as i32;
                let trend = self.trend.predict_row(&features.trend_row(index));
                let effect = self
                    .effects
                    .predict_row(&features.effect_row(index, timestamp, self.step));
                let scaled = match self.config.seasonality_mode {
                    SeasonalityMode::Additive => trend + effect,
                    SeasonalityMode::Multiplicative => trend * (1.0 + effect),
                };
                scaled * self.scale
            })
            .collect();
        Ok(ForecastResult::new(NAME, values))
    }
}
