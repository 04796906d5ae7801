//! Single-layer LSTM with a linear head, trained on min-max scaled windows.
//!
//! Each training sample is `lookback` consecutive observations and the value
//! that follows them. Training is full-batch Adam on mean squared error with
//! gradients from backpropagation through time. Forecasts are recursive.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::ModelFitError;
use crate::models::traits::{training_values, FittedModel, ForecastModel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const NAME: &str = "LSTM";
const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

/// LSTM hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LstmConfig {
    /// Number of past observations fed to the network.
    pub lookback: usize,
    pub hidden_units: usize,
    /// Full passes over the training windows.
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
}

impl Default for LstmConfig {
    fn default() -> Self {
        Self {
            lookback: 12,
            hidden_units: 50,
            epochs: 100,
            learning_rate: 0.001,
            seed: 42,
        }
    }
}

impl LstmConfig {
    /// Set the input sequence length.
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Set the hidden state size.
    pub fn with_hidden_units(mut self, hidden_units: usize) -> Self {
        self.hidden_units = hidden_units;
        self
    }

    /// Set the number of training passes.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the Adam step size.
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// `lookback + 1`: one complete training sample.
    pub fn min_history(&self) -> usize {
        self.lookback + 1
    }

    /// Reject zero sizes and a non-positive learning rate.
    pub fn validate(&self) -> Result<(), ModelFitError> {
        let reason = if self.lookback == 0 {
            "lookback must be positive"
        } else if self.hidden_units == 0 {
            "hidden_units must be positive"
        } else if self.epochs == 0 {
            "epochs must be positive"
        } else if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            "learning_rate must be positive"
        } else {
            return Ok(());
        };
        Err(ModelFitError::InvalidConfig {
            model: NAME.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// Offsets of each parameter block in the flat weight vector.
///
/// Gate rows are ordered input, forget, cell, output; each block has
/// `hidden` rows.
#[derive(Debug, Clone, Copy)]
struct Layout {
    hidden: usize,
}

impl Layout {
    fn gates(&self) -> usize {
        4 * self.hidden
    }
    fn input_weights(&self) -> usize {
        0
    }
    fn recurrent_weights(&self) -> usize {
        self.gates()
    }
    fn gate_bias(&self) -> usize {
        self.recurrent_weights() + self.gates() * self.hidden
    }
    fn head_weights(&self) -> usize {
        self.gate_bias() + self.gates()
    }
    fn head_bias(&self) -> usize {
        self.head_weights() + self.hidden
    }
    fn len(&self) -> usize {
        self.head_bias() + 1
    }
}

/// Activations of one time step, kept for the backward pass.
struct Step {
    input: f64,
    prev_hidden: Vec<f64>,
    prev_cell: Vec<f64>,
    gates: Vec<f64>,
    cell: Vec<f64>,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[derive(Debug, Clone)]
struct Network {
    layout: Layout,
    weights: Vec<f64>,
}

impl Network {
    fn initialise(hidden: usize, seed: u64) -> Self {
        let layout = Layout { hidden };
        let bound = 1.0 / (hidden as f64).sqrt();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut weights: Vec<f64> = (0..layout.len())
            .map(|_| rng.gen_range(-bound..bound))
            .collect();
        // Start with the forget gate open
        for unit in 0..hidden {
            weights[layout.gate_bias() + hidden + unit] = 1.0;
        }
        Self { layout, weights }
    }

    /// Run the sequence; returns the prediction and the per-step cache.
    fn forward(&self, inputs: &[f64]) -> (f64, Vec<Step>) {
        let h = self.layout.hidden;
        let g = self.layout.gates();
        let w = &self.weights;
        let mut hidden = vec![0.0; h];
        let mut cell = vec![0.0; h];
        let mut steps = Vec::with_capacity(inputs.len());

        for &x in inputs {
            let mut gates = vec![0.0; g];
            for (row, gate) in gates.iter_mut().enumerate() {
                let recurrent = &w[self.layout.recurrent_weights() + row * h..][..h];
                let z = w[self.layout.input_weights() + row] * x
                    + recurrent.iter().zip(&hidden).map(|(a, b)| a * b).sum::<f64>()
                    + w[self.layout.gate_bias() + row];
                *gate = if row / h == 2 { z.tanh() } else { sigmoid(z) };
            }

            let new_cell: Vec<f64> = (0..h)
                .map(|u| gates[h + u] * cell[u] + gates[u] * gates[2 * h + u])
                .collect();
            let new_hidden: Vec<f64> = (0..h)
                .map(|u| gates[3 * h + u] * new_cell[u].tanh())
                .collect();

            steps.push(Step {
                input: x,
                prev_hidden: std::mem::replace(&mut hidden, new_hidden),
                prev_cell: std::mem::replace(&mut cell, new_cell.clone()),
                gates,
                cell: new_cell,
            });
        }

        let head = &w[self.layout.head_weights()..][..h];
        let output = head.iter().zip(&hidden).map(|(a, b)| a * b).sum::<f64>()
            + w[self.layout.head_bias()];
        (output, steps)
    }

    fn predict(&self, inputs: &[f64]) -> f64 {
        self.forward(inputs).0
    }

    /// Accumulate `d_output * d(prediction)/d(weights)` into `grad`.
    fn backward(&self, steps: &[Step], d_output: f64, grad: &mut [f64]) {
        let layout = self.layout;
        let h = layout.hidden;
        let w = &self.weights;

        let final_hidden: Vec<f64> = match steps.last() {
            Some(last) => (0..h)
                .map(|u| last.gates[3 * h + u] * last.cell[u].tanh())
                .collect(),
            None => return,
        };
        for u in 0..h {
            grad[layout.head_weights() + u] += d_output * final_hidden[u];
        }
        grad[layout.head_bias()] += d_output;

        let mut d_hidden: Vec<f64> = (0..h)
            .map(|u| d_output * w[layout.head_weights() + u])
            .collect();
        let mut d_cell = vec![0.0; h];
        let mut d_gates = vec![0.0; layout.gates()];

        for step in steps.iter().rev() {
            for u in 0..h {
                let input = step.gates[u];
                let forget = step.gates[h + u];
                let candidate = step.gates[2 * h + u];
                let output = step.gates[3 * h + u];
                let cell_tanh = step.cell[u].tanh();

                d_cell[u] += d_hidden[u] * output * (1.0 - cell_tanh * cell_tanh);
                d_gates[u] = d_cell[u] * candidate * input * (1.0 - input);
                d_gates[h + u] = d_cell[u] * step.prev_cell[u] * forget * (1.0 - forget);
                d_gates[2 * h + u] = d_cell[u] * input * (1.0 - candidate * candidate);
                d_gates[3 * h + u] = d_hidden[u] * cell_tanh * output * (1.0 - output);
                d_cell[u] *= forget;
            }

            let mut d_prev_hidden = vec![0.0; h];
            for (row, &dz) in d_gates.iter().enumerate() {
                grad[layout.input_weights() + row] += dz * step.input;
                grad[layout.gate_bias() + row] += dz;
                let offset = layout.recurrent_weights() + row * h;
                for j in 0..h {
                    grad[offset + j] += dz * step.prev_hidden[j];
                    d_prev_hidden[j] += dz * w[offset + j];
                }
            }
            d_hidden = d_prev_hidden;
        }
    }
}

/// Adam optimiser state for a flat parameter vector.
struct Adam {
    learning_rate: f64,
    first: Vec<f64>,
    second: Vec<f64>,
    t: i32,
}

impl Adam {
    fn new(len: usize, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            first: vec![0.0; len],
            second: vec![0.0; len],
            t: 0,
        }
    }

    fn step(&mut self, weights: &mut [f64], grad: &[f64]) {
        self.t += 1;
        let correction1 = 1.0 - BETA1.powi(self.t);
        let correction2 = 1.0 - BETA2.powi(self.t);
        for i in 0..weights.len() {
            self.first[i] = BETA1 * self.first[i] + (1.0 - BETA1) * grad[i];
            self.second[i] = BETA2 * self.second[i] + (1.0 - BETA2) * grad[i] * grad[i];
            let m = self.first[i] / correction1;
            let v = self.second[i] / correction2;
            weights[i] -= self.learning_rate * m / (v.sqrt() + ADAM_EPSILON);
        }
    }
}

/// Min-max scaling to `[0, 1]` fitted on the training window.
#[derive(Debug, Clone, Copy)]
struct MinMax {
    min: f64,
    range: f64,
}

impl MinMax {
    fn fit(values: &[f64]) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = if max > min { max - min } else { 1.0 };
        Self { min, range }
    }

    fn scale(&self, v: f64) -> f64 {
        (v - self.min) / self.range
    }

    fn unscale(&self, v: f64) -> f64 {
        v * self.range + self.min
    }
}

/// Unfitted LSTM model.
#[derive(Debug, Clone)]
pub struct Lstm {
    config: LstmConfig,
}

impl Lstm {
    /// Validate `config` and create the model.
    pub fn new(config: LstmConfig) -> Result<Self, ModelFitError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LstmConfig {
        &self.config
    }

    /// Fit and return the concrete fitted model.
    pub fn fit_lstm(&self, train: &TimeSeries) -> Result<FittedLstm, ModelFitError> {
        let values = training_values(self, train)?;
        let config = &self.config;
        let scaler = MinMax::fit(values);
        let scaled: Vec<f64> = values.iter().map(|&v| scaler.scale(v)).collect();
        let samples: Vec<(&[f64], f64)> = (config.lookback..scaled.len())
            .map(|t| (&scaled[t - config.lookback..t], scaled[t]))
            .collect();

        let mut network = Network::initialise(config.hidden_units, config.seed);
        let mut adam = Adam::new(network.weights.len(), config.learning_rate);
        let batch = samples.len() as f64;
        let mut loss = f64::NAN;

        for _ in 0..config.epochs {
            let mut grad = vec![0.0; network.weights.len()];
            loss = 0.0;
            for (inputs, target) in &samples {
                let (prediction, steps) = network.forward(inputs);
                let error = prediction - target;
                loss += error * error / batch;
                network.backward(&steps, 2.0 * error / batch, &mut grad);
            }
            if !loss.is_finite() {
                return Err(ModelFitError::Numerical {
                    model: NAME.to_string(),
                    reason: "training loss diverged".to_string(),
                });
            }
            adam.step(&mut network.weights, &grad);
        }

        Ok(FittedLstm {
            lookback: config.lookback,
            network,
            scaler,
            context: scaled[scaled.len() - config.lookback..].to_vec(),
            training_loss: loss,
        })
    }
}

impl Default for Lstm {
    fn default() -> Self {
        Self {
            config: LstmConfig::default(),
        }
    }
}

impl ForecastModel for Lstm {
    fn name(&self) -> &str {
        NAME
    }

    fn min_history(&self) -> usize {
        self.config.min_history()
    }

    fn fit(&self, train: &TimeSeries) -> Result<Box<dyn FittedModel>, ModelFitError> {
        Ok(Box::new(self.fit_lstm(train)?))
    }
}

/// LSTM fitted on one training range.
#[derive(Debug, Clone)]
pub struct FittedLstm {
    lookback: usize,
    network: Network,
    scaler: MinMax,
    context: Vec<f64>,
    training_loss: f64,
}

impl FittedLstm {
    /// Mean squared error on scaled data before the final update.
    pub fn training_loss(&self) -> f64 {
        self.training_loss
    }
}

impl FittedModel for FittedLstm {
    fn name(&self) -> &str {
        NAME
    }

    fn predict(&self, horizon: usize) -> Result<ForecastResult, ModelFitError> {
        let mut window = self.context.clone();
        let mut values = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = self.network.predict(&window[window.len() - self.lookback..]);
            values.push(self.scaler.unscale(next));
            window.push(next);
        }
        Ok(ForecastResult::new(NAME, values))
    }
}
