//! End-to-end backtests and comparisons over weekly demand series.

use chrono::{TimeZone, Utc};
use demand_backtest::backtest::{
    BacktestConfig, ComparisonPlan, ModelComparator, RollingBacktester, SkipReason,
};
use demand_backtest::core::{ForecastResult, TimeSeries};
use demand_backtest::models::{
    FittedModel, ForecastModel, LstmConfig, ModelSpec, SharedModel,
};
use demand_backtest::utils::Metric;
use demand_backtest::{BacktestError, ModelFitError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn weekly(values: Vec<f64>) -> TimeSeries {
    let start = Utc.with_ymd_and_hms(2022, 1, 3, 0, 0, 0).unwrap();
    TimeSeries::weekly(start, values).unwrap()
}

/// Two years of trending, seasonal demand with seeded noise.
fn demand_history() -> TimeSeries {
    let mut rng = StdRng::seed_from_u64(7);
    let values = (0..104)
        .map(|t| {
            let season = 25.0 * (2.0 * std::f64::consts::PI * t as f64 / 52.0).sin();
            500.0 + 1.5 * t as f64 + season + rng.gen_range(-8.0..8.0)
        })
        .collect();
    weekly(values).with_label("SKU-1042")
}

/// Forecasts `level * (1 + offset)` for every step.
#[derive(Debug)]
struct Scaled {
    name: &'static str,
    level: f64,
    offset: f64,
    min_history: usize,
}

#[derive(Debug)]
struct FittedScaled(&'static str, f64);

impl ForecastModel for Scaled {
    fn name(&self) -> &str {
        self.name
    }
    fn min_history(&self) -> usize {
        self.min_history
    }
    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        demand_backtest::models::training_values(self, train)?;
        Ok(Box::new(FittedScaled(self.name, self.level * (1.0 + self.offset))))
    }
}

impl FittedModel for FittedScaled {
    fn name(&self) -> &str {
        self.0
    }
    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
        Ok(ForecastResult::new(self.0, vec![self.1; horizon]))
    }
}

/// Stalls on one training length, otherwise forecasts the last value.
#[derive(Debug)]
struct StallsOn(usize);

impl ForecastModel for StallsOn {
    fn name(&self) -> &str {
        "Stalling"
    }
    fn min_history(&self) -> usize {
        1
    }
    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        if train.len() == self.0 {
            thread::sleep(Duration::from_millis(1500));
        }
        let last = train.values()[train.len() - 1];
        Ok(Box::new(FittedScaled("Stalling", last)))
    }
}

/// Panics inside every fit.
#[derive(Debug)]
struct Exploding;

impl ForecastModel for Exploding {
    fn name(&self) -> &str {
        "Exploding"
    }
    fn min_history(&self) -> usize {
        1
    }
    fn fit(&self, _train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        panic!("singular matrix")
    }
}

#[test]
fn twenty_four_weeks_give_three_windows() {
    init_tracing();
    let series = weekly((0..24).map(|t| 100.0 + t as f64).collect());
    let model = ModelSpec::Arima(demand_backtest::models::ArimaConfig::new(0, 1, 0))
        .build()
        .unwrap();

    let report = RollingBacktester::new()
        .run(&series, &model, &BacktestConfig::new(12, 4))
        .unwrap();

    let tests: Vec<_> = report.windows.iter().map(|w| w.window.test.clone()).collect();
    assert_eq!(tests, vec![12..16, 16..20, 20..24]);
    let trains: Vec<_> = report.windows.iter().map(|w| w.window.train.clone()).collect();
    assert_eq!(trains, vec![0..12, 0..16, 0..20]);
    assert_eq!(report.points().count(), 12);
    // A random walk with drift recovers a straight line exactly
    assert!(report.mean(Metric::Mae).unwrap() < 1e-6);
}

#[test]
fn comparison_ranks_and_isolates_failures() {
    init_tracing();
    let series = weekly(vec![100.0; 24]);
    let mut models: BTreeMap<String, SharedModel> = BTreeMap::new();
    models.insert(
        "A".to_string(),
        Arc::new(Scaled {
            name: "A",
            level: 100.0,
            offset: 0.10,
            min_history: 1,
        }),
    );
    models.insert(
        "B".to_string(),
        Arc::new(Scaled {
            name: "B",
            level: 100.0,
            offset: -0.05,
            min_history: 1,
        }),
    );
    models.insert(
        "C".to_string(),
        Arc::new(Scaled {
            name: "C",
            level: 100.0,
            offset: 0.0,
            min_history: 40,
        }),
    );

    let result = ModelComparator::new()
        .compare(&series, &models, &BacktestConfig::new(12, 4), Metric::Wape)
        .unwrap();

    assert_eq!(result.ranked_ids(), vec!["B", "A"]);
    assert!((result.ranking[0].value - 0.05).abs() < 1e-12);
    assert!((result.ranking[1].value - 0.10).abs() < 1e-12);
    assert_eq!(result.ranking[1].rank, 2);
    assert!(matches!(
        result.failure("C"),
        Some(BacktestError::BacktestFailed { skipped: 3, .. })
    ));
    assert_eq!(result.reports.len(), 2);
}

#[test]
fn panicking_model_fails_alone_without_timeout() {
    init_tracing();
    let series = weekly((0..24).map(|t| 100.0 + t as f64).collect());
    let mut models: BTreeMap<String, SharedModel> = BTreeMap::new();
    models.insert(
        "good".to_string(),
        ModelSpec::Arima(demand_backtest::models::ArimaConfig::new(0, 1, 0))
            .build()
            .unwrap(),
    );
    models.insert("bad".to_string(), Arc::new(Exploding));

    let config = BacktestConfig::new(12, 4);
    assert!(config.fit_timeout().is_none());
    let result = ModelComparator::new()
        .compare(&series, &models, &config, Metric::Wape)
        .unwrap();

    assert_eq!(result.ranked_ids(), vec!["good"]);
    match result.failure("bad") {
        Some(BacktestError::BacktestFailed { skipped, reason, .. }) => {
            assert_eq!(*skipped, 3);
            assert!(reason.contains("aborted"), "reason: {reason}");
        }
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn timeout_skips_only_the_stalled_window() {
    init_tracing();
    let series = weekly((1..=24).map(|t| t as f64).collect());
    let model: SharedModel = Arc::new(StallsOn(16));
    let config = BacktestConfig::new(12, 4)
        .with_max_workers(3)
        .with_fit_timeout(Duration::from_millis(200));

    let report = RollingBacktester::new().run(&series, &model, &config).unwrap();

    assert_eq!(report.skipped_count(), 1);
    assert_eq!(
        report.windows[1].skip_reason(),
        Some(&SkipReason::FitFailed {
            error: ModelFitError::Timeout {
                model: "Stalling".to_string(),
                limit_ms: 200,
            }
        })
    );
    assert!(!report.windows[0].is_skipped());
    assert!(!report.windows[2].is_skipped());
    assert_eq!(report.summary.windows, 2);
}

#[test]
fn missing_actuals_skip_their_window() {
    init_tracing();
    let mut values: Vec<f64> = (1..=24).map(|t| t as f64).collect();
    values[21] = f64::NAN;
    let series = weekly(values);
    let model: SharedModel = Arc::new(StallsOn(0));

    let report = RollingBacktester::new()
        .run(&series, &model, &BacktestConfig::new(12, 4))
        .unwrap();

    assert_eq!(report.scored_count(), 2);
    assert_eq!(
        report.windows[2].skip_reason(),
        Some(&SkipReason::MissingValues {
            actual: 1,
            forecast: 0
        })
    );
}

#[test]
fn lstm_lookback_beyond_training_fails_every_window() {
    init_tracing();
    let series = demand_history();
    let model = ModelSpec::Lstm(LstmConfig::default().with_lookback(100).with_epochs(2))
        .build()
        .unwrap();

    let err = RollingBacktester::new()
        .run(&series, &model, &BacktestConfig::new(40, 12).with_step(20))
        .unwrap_err();

    match err {
        BacktestError::BacktestFailed { model, skipped, .. } => {
            assert_eq!(model, "LSTM");
            assert_eq!(skipped, 3);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

const PLAN: &str = r#"
rank_by = "wape"

[backtest]
min_train = 52
horizon = 12
max_workers = 4

[models.arima]
kind = "arima"

[models.xgboost]
kind = "xgboost"
lags = [1, 2, 3, 4]
n_estimators = 40
max_depth = 3
learning_rate = 0.1

[models.prophet]
kind = "prophet"
yearly_order = 3
holidays = true

[models.lstm]
kind = "lstm"
lookback = 8
hidden_units = 8
epochs = 20
learning_rate = 0.01
"#;

#[test]
fn plan_compares_all_model_families() {
    init_tracing();
    let series = demand_history();
    let plan = ComparisonPlan::from_toml_str(PLAN).unwrap();
    let models = plan.build_models().unwrap();

    let result = ModelComparator::new()
        .compare(&series, &models, &plan.backtest, plan.rank_by)
        .unwrap();

    assert!(result.failures.is_empty(), "failures: {:?}", result.failures);
    assert_eq!(result.ranking.len(), 4);
    assert_eq!(
        result.ranking.iter().map(|r| r.rank).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert!(result
        .ranking
        .windows(2)
        .all(|pair| pair[0].score <= pair[1].score));

    for (id, report) in &result.reports {
        assert_eq!(report.model, *id);
        assert_eq!(report.windows.len(), 4, "{id}");
        assert!(report.points().all(|p| p.forecast.is_finite()), "{id}");
        assert!(report.mean(Metric::Wape).unwrap() < 1.0, "{id}");
    }
}

#[test]
fn comparison_is_repeatable() {
    init_tracing();
    let series = demand_history();
    let plan = ComparisonPlan::from_toml_str(PLAN).unwrap();
    let models = plan.build_models().unwrap();

    let first = ModelComparator::new()
        .compare(&series, &models, &plan.backtest, plan.rank_by)
        .unwrap();
    let second = ModelComparator::new()
        .compare(
            &series,
            &models,
            &plan.backtest.clone().with_max_workers(1),
            plan.rank_by,
        )
        .unwrap();

    assert_eq!(first.ranking, second.ranking);
    for (id, report) in &first.reports {
        assert_eq!(report.windows, second.reports[id].windows);
    }
}

#[test]
fn report_serializes_to_json() {
    let series = weekly((0..24).map(|t| 100.0 + t as f64).collect());
    let model = ModelSpec::Arima(demand_backtest::models::ArimaConfig::new(0, 1, 0))
        .build()
        .unwrap();
    let report = RollingBacktester::new()
        .run(&series, &model, &BacktestConfig::new(12, 4))
        .unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["model"], "ARIMA");
    assert_eq!(json["config"]["horizon"], 4);
    assert_eq!(json["config"]["strategy"], "expanding");
    assert_eq!(json["windows"].as_array().unwrap().len(), 3);
    assert_eq!(json["windows"][0]["outcome"]["status"], "scored");
    assert_eq!(
        json["windows"][0]["outcome"]["points"].as_array().unwrap().len(),
        4
    );
    assert_eq!(json["summary"]["windows"], 3);
    assert!(json["summary"]["metrics"]["wape"]["mean"].is_number());
}
