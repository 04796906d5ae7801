//! Worker pool and per-window fit execution.

use crate::core::{ForecastResult, TimeSeries};
use crate::error::{ModelFitError, Result};
use crate::models::SharedModel;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Bounded pool shared by every task of one `run` or `compare` call.
pub(crate) struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    /// Build a pool of `max_workers` named threads.
    pub(crate) fn new(max_workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("backtest-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Run `op` inside the pool; nested rayon iterators stay on its threads.
    pub(crate) fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}

/// Fit `model` on `train` and forecast `horizon` steps.
///
/// With a timeout the work runs on its own thread and the caller waits at most
/// `timeout`. A fit that overruns is left to finish in the background and its
/// result is dropped. A panicking fit yields `Aborted` either way.
pub(crate) fn fit_and_predict(
    model: &SharedModel,
    train: TimeSeries,
    horizon: usize,
    timeout: Option<Duration>,
) -> std::result::Result<ForecastResult, ModelFitError> {
    let Some(limit) = timeout else {
        return panic::catch_unwind(AssertUnwindSafe(|| model.fit_predict(&train, horizon)))
            .unwrap_or_else(|_| {
                warn!(model = model.name(), "Fit panicked");
                Err(ModelFitError::Aborted {
                    model: model.name().to_string(),
                })
            });
    };

    let (tx, rx) = mpsc::channel();
    let worker_model = Arc::clone(model);
    let spawned = thread::Builder::new()
        .name(format!("fit-{}", model.name()))
        .spawn(move || {
            let outcome = worker_model.fit_predict(&train, horizon);
            // Receiver is gone once the caller has timed out
            let _ = tx.send(outcome);
        });

    if let Err(err) = spawned {
        warn!(model = model.name(), error = %err, "Could not spawn fit thread");
        return Err(ModelFitError::Aborted {
            model: model.name().to_string(),
        });
    }

    match rx.recv_timeout(limit) {
        Ok(outcome) => outcome,
        Err(RecvTimeoutError::Timeout) => Err(ModelFitError::Timeout {
            model: model.name().to_string(),
            limit_ms: limit.as_millis() as u64,
        }),
        Err(RecvTimeoutError::Disconnected) => Err(ModelFitError::Aborted {
            model: model.name().to_string(),
        }),
    }
}
