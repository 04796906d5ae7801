//! Side-by-side backtests of several models on one series.

use crate::backtest::config::BacktestConfig;
use crate::backtest::executor::WorkerPool;
use crate::backtest::report::BacktestReport;
use crate::backtest::runner::run_windows;
use crate::core::TimeSeries;
use crate::error::{BacktestError, Result};
use crate::models::SharedModel;
use crate::utils::metrics::Metric;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, info_span, warn};

/// A model's position in the ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedModel {
    /// 1-based rank.
    pub rank: usize,
    pub model: String,
    /// Summary mean of the ranking metric.
    pub value: f64,
    /// Value used for ordering (magnitude for bias).
    pub score: f64,
}

/// Reports, ranking and failures of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub rank_by: Metric,
    /// Best model first.
    pub ranking: Vec<RankedModel>,
    /// Reports of every model whose backtest completed.
    pub reports: BTreeMap<String, BacktestReport>,
    /// Models whose backtest failed, with the reason.
    pub failures: BTreeMap<String, BacktestError>,
    /// Completed models whose report does not define the ranking metric.
    pub unranked: Vec<String>,
}

impl ComparisonResult {
    /// Winner of the comparison.
    pub fn best(&self) -> Option<&RankedModel> {
        self.ranking.first()
    }

    /// Report of a model whose backtest completed.
    pub fn report(&self, model: &str) -> Option<&BacktestReport> {
        self.reports.get(model)
    }

    /// Error of a model whose backtest failed.
    pub fn failure(&self, model: &str) -> Option<&BacktestError> {
        self.failures.get(model)
    }

    /// Model ids in rank order.
    pub fn ranked_ids(&self) -> Vec<&str> {
        self.ranking.iter().map(|r| r.model.as_str()).collect()
    }
}

/// Backtests candidate models independently and ranks them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelComparator;

impl ModelComparator {
    /// Create a comparator.
    pub fn new() -> Self {
        Self
    }

    /// Backtest every model in `models` on `series` and rank by `rank_by`.
    ///
    /// The window plan is checked once; a series too short for it fails the
    /// whole comparison. Any other failure is confined to its model.
    pub fn compare(
        &self,
        series: &TimeSeries,
        models: &BTreeMap<String, SharedModel>,
        config: &BacktestConfig,
        rank_by: Metric,
    ) -> Result<ComparisonResult> {
        let plan = config.plan(series)?;
        if models.is_empty() {
            return Err(BacktestError::InvalidParameter(
                "no models to compare".to_string(),
            ));
        }

        let span = info_span!("compare", models = models.len(), windows = plan.len(), %rank_by);

        let pool = WorkerPool::new(config.max_workers)?;
        let outcomes: Vec<(String, Result<BacktestReport>)> = pool.install(|| {
            models
                .par_iter()
                .map(|(id, model)| {
                    let report = span.in_scope(|| run_windows(id, series, model, config, &plan));
                    (id.clone(), report)
                })
                .collect()
        });
        let _enter = span.enter();

        let mut reports = BTreeMap::new();
        let mut failures = BTreeMap::new();
        let mut unranked = Vec::new();
        let mut ranking = Vec::new();

        for (id, outcome) in outcomes {
            match outcome {
                Ok(report) => {
                    match report.mean(rank_by).filter(|v| v.is_finite()) {
                        Some(value) => ranking.push(RankedModel {
                            rank: 0,
                            model: id.clone(),
                            value,
                            score: rank_by.ranking_score(value),
                        }),
                        None => {
                            warn!(model = %id, metric = %rank_by, "Model has no value for ranking metric");
                            unranked.push(id.clone());
                        }
                    }
                    reports.insert(id, report);
                }
                Err(error) => {
                    warn!(model = %id, %error, "Model failed");
                    failures.insert(id, error);
                }
            }
        }

        ranking.sort_by(|a, b| a.score.total_cmp(&b.score).then_with(|| a.model.cmp(&b.model)));
        for (position, entry) in ranking.iter_mut().enumerate() {
            entry.rank = position + 1;
        }

        if let Some(best) = ranking.first() {
            info!(
                best = %best.model,
                value = best.value,
                ranked = ranking.len(),
                failed = failures.len(),
                "Comparison complete"
            );
        } else {
            warn!(failed = failures.len(), "No model could be ranked");
        }

        Ok(ComparisonResult {
            rank_by,
            ranking,
            reports,
            failures,
            unranked,
        })
    }
}
