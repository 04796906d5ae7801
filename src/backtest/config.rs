//! Backtest settings and TOML comparison plans.

use crate::core::{RollingWindows, TimeSeries, TrainingStrategy};
use crate::error::{BacktestError, Result};
use crate::models::{ModelSpec, SharedModel};
use crate::utils::metrics::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// How a rolling backtest cuts and runs its windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Length of the first training range.
    #[serde(default = "default_min_train")]
    pub min_train: usize,
    /// Periods forecast per window.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// Distance between window origins; defaults to the horizon.
    #[serde(default)]
    pub step: Option<usize>,
    #[serde(default)]
    pub strategy: TrainingStrategy,
    /// Worker threads shared by windows and models.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-window limit on fit plus predict, in milliseconds.
    #[serde(default)]
    pub fit_timeout_ms: Option<u64>,
}

fn default_min_train() -> usize {
    52
}

fn default_horizon() -> usize {
    12
}

fn default_max_workers() -> usize {
    4
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_train: default_min_train(),
            horizon: default_horizon(),
            step: None,
            strategy: TrainingStrategy::default(),
            max_workers: default_max_workers(),
            fit_timeout_ms: None,
        }
    }
}

impl BacktestConfig {
    /// Expanding-window backtest with step equal to `horizon`.
    pub fn new(min_train: usize, horizon: usize) -> Self {
        Self {
            min_train,
            horizon,
            ..Self::default()
        }
    }

    /// Set the distance between window origins.
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }

    /// Set how the training range moves.
    pub fn with_strategy(mut self, strategy: TrainingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the worker pool size.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Limit each window's fit plus predict; sub-millisecond parts are dropped.
    pub fn with_fit_timeout(mut self, timeout: Duration) -> Self {
        self.fit_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Effective step between window origins.
    pub fn step(&self) -> usize {
        self.step.unwrap_or(self.horizon)
    }

    /// Per-window fit limit, if any.
    pub fn fit_timeout(&self) -> Option<Duration> {
        self.fit_timeout_ms.map(Duration::from_millis)
    }

    /// Reject zero sizes, a zero step and a zero fit timeout.
    pub fn validate(&self) -> Result<()> {
        if self.min_train == 0 {
            return Err(BacktestError::InvalidParameter(
                "min_train must be positive".to_string(),
            ));
        }
        if self.horizon == 0 {
            return Err(BacktestError::InvalidParameter(
                "horizon must be positive".to_string(),
            ));
        }
        if self.step() == 0 {
            return Err(BacktestError::InvalidParameter(
                "step must be positive".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(BacktestError::InvalidParameter(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.fit_timeout_ms == Some(0) {
            return Err(BacktestError::InvalidParameter(
                "fit timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate and cut `series` into windows.
    pub fn plan(&self, series: &TimeSeries) -> Result<RollingWindows> {
        self.validate()?;
        Ok(
            RollingWindows::new(series.len(), self.min_train, self.horizon, self.step())?
                .with_strategy(self.strategy),
        )
    }
}

/// A full comparison described in TOML.
///
/// ```toml
/// rank_by = "wape"
///
/// [backtest]
/// min_train = 52
/// horizon = 12
///
/// [models.arima]
/// kind = "arima"
///
/// [models.prophet_holidays]
/// kind = "prophet"
/// seasonality_mode = "multiplicative"
/// holidays = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPlan {
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default = "default_rank_by")]
    pub rank_by: Metric,
    /// Candidate models keyed by id.
    pub models: BTreeMap<String, ModelSpec>,
}

fn default_rank_by() -> Metric {
    Metric::Mape
}

impl ComparisonPlan {
    /// Parse and validate a plan from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let plan: ComparisonPlan = toml::from_str(content)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Read and validate a plan from a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BacktestError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(BacktestError::Config("no models configured".to_string()));
        }
        self.backtest
            .validate()
            .map_err(|e| BacktestError::Config(e.to_string()))
    }

    /// Instantiate every configured model.
    pub fn build_models(&self) -> Result<BTreeMap<String, SharedModel>> {
        self.models
            .iter()
            .map(|(id, spec)| {
                spec.build()
                    .map(|model| (id.clone(), model))
                    .map_err(|e| BacktestError::Config(format!("model '{id}': {e}")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArimaConfig, SeasonalityMode};
    use std::io::Write;

    const PLAN: &str = r#"
rank_by = "wape"

[backtest]
min_train = 26
horizon = 4
strategy = "sliding"
fit_timeout_ms = 5000

[models.arima]
kind = "arima"

[models.prophet_holidays]
kind = "prophet"
seasonality_mode = "multiplicative"
holidays = true
yearly_order = 3
"#;

    #[test]
    fn defaults_follow_weekly_planning() {
        let config = BacktestConfig::default();
        assert_eq!(config.min_train, 52);
        assert_eq!(config.horizon, 12);
        assert_eq!(config.step(), 12);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.strategy, TrainingStrategy::Expanding);
        assert!(config.fit_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = BacktestConfig::new(12, 4)
            .with_step(2)
            .with_strategy(TrainingStrategy::Sliding)
            .with_max_workers(2)
            .with_fit_timeout(Duration::from_millis(250));
        assert_eq!(config.step(), 2);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.fit_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn validation_rejects_zero_values() {
        assert!(BacktestConfig::new(0, 4).validate().is_err());
        assert!(BacktestConfig::new(12, 0).validate().is_err());
        assert!(BacktestConfig::new(12, 4).with_step(0).validate().is_err());
        assert!(BacktestConfig::new(12, 4).with_max_workers(0).validate().is_err());
        assert!(BacktestConfig::new(12, 4)
            .with_fit_timeout(Duration::from_micros(10))
            .validate()
            .is_err());
    }

    #[test]
    fn plan_applies_strategy() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let series = TimeSeries::weekly(start, vec![1.0; 24]).unwrap();
        let plan = BacktestConfig::new(12, 4)
            .with_strategy(TrainingStrategy::Sliding)
            .plan(&series)
            .unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.strategy(), TrainingStrategy::Sliding);
    }

    #[test]
    fn huge_horizon_fails_to_plan() {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let series = TimeSeries::weekly(start, vec![1.0; 24]).unwrap();
        let err = BacktestConfig::new(12, usize::MAX).plan(&series).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidParameter(_)));
    }

    #[test]
    fn parses_comparison_plan() {
        let plan = ComparisonPlan::from_toml_str(PLAN).unwrap();
        assert_eq!(plan.rank_by, Metric::Wape);
        assert_eq!(plan.backtest.min_train, 26);
        assert_eq!(plan.backtest.strategy, TrainingStrategy::Sliding);
        assert_eq!(plan.backtest.max_workers, 4);
        assert_eq!(plan.backtest.fit_timeout_ms, Some(5000));
        assert_eq!(plan.models["arima"], ModelSpec::Arima(ArimaConfig::default()));
        match &plan.models["prophet_holidays"] {
            ModelSpec::Prophet(config) => {
                assert_eq!(config.seasonality_mode, SeasonalityMode::Multiplicative);
                assert!(config.holidays);
                assert_eq!(config.yearly_order, 3);
            }
            other => panic!("unexpected spec {other:?}"),
        }

        let models = plan.build_models().unwrap();
        assert_eq!(models.keys().collect::<Vec<_>>(), vec!["arima", "prophet_holidays"]);
    }

    #[test]
    fn minimal_plan_uses_defaults() {
        let plan = ComparisonPlan::from_toml_str(
            r#"
[models.lstm]
kind = "lstm"
"#,
        )
        .unwrap();
        assert_eq!(plan.rank_by, Metric::Mape);
        assert_eq!(plan.backtest, BacktestConfig::default());
    }

    #[test]
    fn malformed_plans_are_config_errors() {
        assert!(matches!(
            ComparisonPlan::from_toml_str("rank_by = \"smape\"\n[models.a]\nkind = \"arima\""),
            Err(BacktestError::Config(_))
        ));
        assert!(matches!(
            ComparisonPlan::from_toml_str("[backtest]\nhorizon = 4\n"),
            Err(BacktestError::Config(_))
        ));
        assert!(matches!(
            ComparisonPlan::from_toml_str("[backtest]\nhorizon = 0\n[models.a]\nkind = \"arima\""),
            Err(BacktestError::Config(_))
        ));
    }

    #[test]
    fn invalid_model_surfaces_on_build() {
        let plan = ComparisonPlan::from_toml_str(
            "[models.bad]\nkind = \"lstm\"\nlookback = 0\n",
        )
        .unwrap();
        let err = plan.build_models().unwrap_err();
        assert!(matches!(err, BacktestError::Config(ref msg) if msg.contains("bad")));
    }

    #[test]
    fn loads_plan_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLAN.as_bytes()).unwrap();
        let plan = ComparisonPlan::from_path(file.path()).unwrap();
        assert_eq!(plan.models.len(), 2);

        assert!(matches!(
            ComparisonPlan::from_path("/nonexistent/plan.toml"),
            Err(BacktestError::Config(_))
        ));
    }
}
