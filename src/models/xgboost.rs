//! Gradient-boosted regression trees over lag features.
//!
//! Trees are grown greedily with second-order gains and L2-regularised leaf
//! weights, the way XGBoost does for squared error. Multi-step forecasts are
//! produced recursively: each prediction is appended to the history and fed
//! back as a lag for the next step.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::ModelFitError;
use crate::models::traits::{training_values, FittedModel, ForecastModel};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const NAME: &str = "XGBoost";

/// Booster hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XgboostConfig {
    /// Lags (in periods) used as features.
    pub lags: Vec<usize>,
    /// Number of boosting rounds.
    pub n_estimators: usize,
    /// Maximum tree depth.
    pub max_depth: usize,
    /// Shrinkage applied to every tree.
    pub learning_rate: f64,
    /// Fraction of rows sampled per tree.
    pub subsample: f64,
    /// Fraction of lag features sampled per tree.
    pub colsample: f64,
    /// Minimum hessian sum in a child.
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub seed: u64,
}

impl Default for XgboostConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 2, 3, 4, 6, 12],
            n_estimators: 300,
            max_depth: 4,
            learning_rate: 0.05,
            subsample: 0.9,
            colsample: 0.9,
            min_child_weight: 1.0,
            lambda: 1.0,
            seed: 42,
        }
    }
}

impl XgboostConfig {
    /// Set the lag features.
    pub fn with_lags(mut self, lags: Vec<usize>) -> Self {
        self.lags = lags;
        self
    }

    /// Set the number of boosting rounds.
    pub fn with_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the maximum tree depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the shrinkage per tree.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    /// `max(lags) + 2`, so at least two supervised rows exist.
    pub fn min_history(&self) -> usize {
        self.max_lag() + 2
    }

    /// Reject empty or zero lags and out-of-range rates.
    pub fn validate(&self) -> Result<(), ModelFitError> {
        let fail = |reason: &str| {
            Err(ModelFitError::InvalidConfig {
                model: NAME.to_string(),
                reason: reason.to_string(),
            })
        };
        if self.lags.is_empty() || self.lags.contains(&0) {
            return fail("lags must be non-empty and positive");
        }
        if self.n_estimators == 0 {
            return fail("n_estimators must be positive");
        }
        if self.max_depth == 0 {
            return fail("max_depth must be positive");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return fail("learning_rate must be in (0, 1]");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return fail("subsample must be in (0, 1]");
        }
        if !(self.colsample > 0.0 && self.colsample <= 1.0) {
            return fail("colsample must be in (0, 1]");
        }
        if !(self.min_child_weight >= 0.0 && self.lambda >= 0.0) {
            return fail("min_child_weight and lambda must be non-negative");
        }
        Ok(())
    }
}

/// Unfitted gradient-boosted lag model.
#[derive(Debug, Clone)]
pub struct Xgboost {
    config: XgboostConfig,
}

impl Xgboost {
    /// Validate `config` and create the model.
    pub fn new(config: XgboostConfig) -> Result<Self, ModelFitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &XgboostConfig {
        &self.config
    }

    /// Fit and return the concrete fitted model.
    pub fn fit_boosted(&self, train: &TimeSeries) -> Result<FittedXgboost, ModelFitError> {
        let values = training_values(self, train)?;
        let config = &self.config;
        let (rows, targets) = lag_matrix(values, &config.lags);

        let base_score = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base_score; targets.len()];
        let mut rng = StdRng::seed_from_u64(config.seed);
        let n_features = config.lags.len();
        let n_columns = ((config.colsample * n_features as f64).ceil() as usize).clamp(1, n_features);

        let mut trees = Vec::with_capacity(config.n_estimators);
        for _ in 0..config.n_estimators {
            let gradients: Vec<f64> = predictions
                .iter()
                .zip(&targets)
                .map(|(p, y)| p - y)
                .collect();

            let mut sampled: Vec<usize> = (0..rows.len())
                .filter(|_| rng.gen::<f64>() < config.subsample)
                .collect();
            if sampled.is_empty() {
                sampled = (0..rows.len()).collect();
            }
            let mut columns = sample(&mut rng, n_features, n_columns).into_vec();
            columns.sort_unstable();

            let builder = TreeBuilder {
                rows: &rows,
                gradients: &gradients,
                columns: &columns,
                config,
            };
            let tree = builder.build(sampled);

            for (prediction, row) in predictions.iter_mut().zip(&rows) {
                *prediction += config.learning_rate * tree.evaluate(row);
            }
            trees.push(tree);
        }

        if predictions.iter().any(|p| !p.is_finite()) {
            return Err(ModelFitError::Numerical {
                model: NAME.to_string(),
                reason: "boosted predictions diverged".to_string(),
            });
        }

        let train_mae = predictions
            .iter()
            .zip(&targets)
            .map(|(p, y)| (y - p).abs())
            .sum::<f64>()
            / targets.len() as f64;

        Ok(FittedXgboost {
            lags: config.lags.clone(),
            learning_rate: config.learning_rate,
            base_score,
            trees,
            history: values.to_vec(),
            train_mae,
        })
    }
}

impl Default for Xgboost {
    fn default() -> Self {
        Self {
            config: XgboostConfig::default(),
        }
    }
}

impl ForecastModel for Xgboost {
    fn name(&self) -> &str {
        NAME
    }

    fn min_history(&self) -> usize {
        self.config.min_history()
    }

    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        Ok(Box::new(self.fit_boosted(train)?))
    }
}

/// Supervised rows: features `y[t - lag]` for each lag, target `y[t]`.
fn lag_matrix(values: &[f64], lags: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let max_lag = lags.iter().copied().max().unwrap_or(0);
    (max_lag..values.len())
        .map(|t| {
            let row: Vec<f64> = lags.iter().map(|&lag| values[t - lag]).collect();
            (row, values[t])
        })
        .unzip()
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(f64),
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// One regression tree, stored as a flat node arena rooted at index 0.
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn evaluate(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(weight) => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

struct TreeBuilder<'a> {
    rows: &'a [Vec<f64>],
    gradients: &'a [f64],
    columns: &'a [usize],
    config: &'a XgboostConfig,
}

impl TreeBuilder<'_> {
    fn build(&self, samples: Vec<usize>) -> Tree {
        let mut tree = Tree { nodes: Vec::new() };
        self.grow(&mut tree, samples, 0);
        tree
    }

    /// Squared error has unit hessians, so the hessian sum is the sample count.
    fn leaf_weight(&self, gradient_sum: f64, hessian_sum: f64) -> f64 {
        -gradient_sum / (hessian_sum + self.config.lambda)
    }

    fn score(&self, gradient_sum: f64, hessian_sum: f64) -> f64 {
        gradient_sum * gradient_sum / (hessian_sum + self.config.lambda)
    }

    fn grow(&self, tree: &mut Tree, samples: Vec<usize>, depth: usize) -> usize {
        let index = tree.nodes.len();
        let gradient_sum: f64 = samples.iter().map(|&i| self.gradients[i]).sum();
        let hessian_sum = samples.len() as f64;
        tree.nodes
            .push(Node::Leaf(self.leaf_weight(gradient_sum, hessian_sum)));

        if depth >= self.config.max_depth || samples.len() < 2 {
            return index;
        }

        if let Some(split) = self.best_split(&samples, gradient_sum, hessian_sum) {
            let left = self.grow(tree, split.left, depth + 1);
            let right = self.grow(tree, split.right, depth + 1);
            tree.nodes[index] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
        }
        index
    }

    fn best_split(&self, samples: &[usize], gradient_sum: f64, hessian_sum: f64) -> Option<BestSplit> {
        let parent = self.score(gradient_sum, hessian_sum);
        let min_child = self.config.min_child_weight;
        let mut best: Option<(f64, usize, f64)> = None;

        for &feature in self.columns {
            let mut ordered = samples.to_vec();
            ordered.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_gradient = 0.0;
            for position in 0..ordered.len() - 1 {
                left_gradient += self.gradients[ordered[position]];
                let here = self.rows[ordered[position]][feature];
                let next = self.rows[ordered[position + 1]][feature];
                if here == next {
                    continue;
                }

                let left_hessian = (position + 1) as f64;
                let right_hessian = hessian_sum - left_hessian;
                if left_hessian < min_child || right_hessian < min_child {
                    continue;
                }

                let gain = 0.5
                    * (self.score(left_gradient, left_hessian)
                        + self.score(gradient_sum - left_gradient, right_hessian)
                        - parent);
                if gain > 1e-12 && best.map_or(true, |(g, ..)| gain > g) {
                    best = Some((gain, feature, 0.5 * (here + next)));
                }
            }
        }

        let (_, feature, threshold) = best?;
        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.rows[i][feature] < threshold);
        Some(BestSplit {
            feature,
            threshold,
            left,
            right,
        })
    }
}

/// Booster fitted on one training range.
#[derive(Debug, Clone)]
pub struct FittedXgboost {
    lags: Vec<usize>,
    learning_rate: f64,
    base_score: f64,
    trees: Vec<Tree>,
    history: Vec<f64>,
    train_mae: f64,
}

impl FittedXgboost {
    /// Number of boosted trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean absolute error of the final in-sample predictions.
    pub fn train_mae(&self) -> f64 {
        self.train_mae
    }

    fn evaluate(&self, row: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| self.learning_rate * tree.evaluate(row))
                .sum::<f64>()
    }
}

impl FittedModel for FittedXgboost {
    fn name(&self) -> &str {
        NAME
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
        let mut extended = self.history.clone();
        for _ in 0..horizon {
            let t = extended.len();
            let row: Vec<f64> = self.lags.iter().map(|&lag| extended[t - lag]).collect();
            let next = self.evaluate(&row);
            extended.push(next);
        }
        let values = extended.split_off(self.history.len());
        Ok(ForecastResult::new(NAME, values))
    }
}
