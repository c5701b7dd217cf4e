//! Background lookahead training.
//!
//! ```text
//! retrain scheduler ──try_send──► mpsc(1) ──► TrainerWorker
//!   (snapshot copy of pairs)                     │ spawn_blocking + timeout
//!                                                ▼
//!                                  watch::Sender<Option<Arc<LookaheadModel>>>
//!                                                │
//!                                   decision loop reads latest params
//! ```
//!
//! A full channel defers the job to the next interval. A run that exceeds
//! its time budget is discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::config::LookaheadConfig;

use super::lookahead::{train, LookaheadModel, TrainingMetrics, TrainingPair};

/// Latest published lookahead parameters.
pub type ModelPublisher = watch::Sender<Option<Arc<LookaheadModel>>>;

/// Immutable copy of the training set handed to the worker.
#[derive(Debug, Clone)]
pub struct TrainingJob {
    pub pairs: Vec<TrainingPair>,
    pub requested_at: DateTime<Utc>,
}

/// Result of one training run.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Published(TrainingMetrics),
    /// Not enough usable pairs
    Skipped { pairs: usize },
    /// Exceeded the time budget; result discarded
    TimedOut,
    Failed(String),
}

/// Train under the configured budget and publish on success.
pub async fn run_training_job(
    job: TrainingJob,
    config: &LookaheadConfig,
    publisher: &ModelPublisher,
) -> TrainingOutcome {
    let pair_count = job.pairs.len();
    let budget = Duration::from_secs(config.training_budget_secs);
    let cfg = config.clone();
    let handle = tokio::task::spawn_blocking(move || train(&job.pairs, &cfg, Utc::now()));

    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Some(model))) => {
            let metrics = model.metrics.clone();
            publisher.send_replace(Some(Arc::new(model)));
            TrainingOutcome::Published(metrics)
        }
        Ok(Ok(None)) => TrainingOutcome::Skipped { pairs: pair_count },
        Ok(Err(e)) => TrainingOutcome::Failed(e.to_string()),
        Err(_) => TrainingOutcome::TimedOut,
    }
}

/// Consumes training jobs until the sending side closes.
pub struct TrainerWorker {
    config: LookaheadConfig,
    jobs: mpsc::Receiver<TrainingJob>,
    publisher: Arc<ModelPublisher>,
}

impl TrainerWorker {
    pub fn new(
        config: LookaheadConfig,
        jobs: mpsc::Receiver<TrainingJob>,
        publisher: Arc<ModelPublisher>,
    ) -> Self {
        Self {
            config,
            jobs,
            publisher,
        }
    }

    pub async fn run(mut self) {
        info!("[Trainer] Lookahead training worker started");
        while let Some(job) = self.jobs.recv().await {
            let requested_at = job.requested_at;
            match run_training_job(job, &self.config, &self.publisher).await {
                TrainingOutcome::Published(m) => info!(
                    mae = %format!("{:.4}", m.mae),
                    directional_accuracy = %format!("{:.3}", m.directional_accuracy),
                    samples = m.sample_count,
                    holdout = m.holdout_count,
                    requested_at = %requested_at,
                    "[Trainer] Lookahead model published"
                ),
                TrainingOutcome::Skipped { pairs } => debug!(
                    pairs = pairs,
                    min_pairs = self.config.min_training_pairs,
                    "[Trainer] Not enough training pairs"
                ),
                TrainingOutcome::TimedOut => warn!(
                    budget_secs = self.config.training_budget_secs,
                    "[Trainer] Training exceeded budget, result discarded"
                ),
                TrainingOutcome::Failed(e) => warn!(error = %e, "[Trainer] Training task failed"),
            }
        }
        info!("[Trainer] Job channel closed, worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::learning::lookahead::MODEL_INPUT_DIM;

    fn pairs(n: usize) -> Vec<TrainingPair> {
        (0..n)
            .map(|i| {
                let x = (i as f64 / n as f64) - 0.5;
                let mut inputs = vec![0.0; MODEL_INPUT_DIM];
                inputs[0] = x;
                TrainingPair {
                    inputs,
                    target_pct: 2.0 * x,
                }
            })
            .collect()
    }

    fn config() -> LookaheadConfig {
        LookaheadConfig {
            min_training_pairs: 10,
            epochs: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_job_publishes_model() {
        let (tx, rx) = watch::channel(None);
        let job = TrainingJob {
            pairs: pairs(100),
            requested_at: Utc::now(),
        };
        let outcome = run_training_job(job, &config(), &tx).await;
        assert!(matches!(outcome, TrainingOutcome::Published(_)));
        assert!(rx.borrow().is_some());
    }

    #[tokio::test]
    async fn test_short_job_is_skipped() {
        let (tx, rx) = watch::channel(None);
        let job = TrainingJob {
            pairs: pairs(5),
            requested_at: Utc::now(),
        };
        let outcome = run_training_job(job, &config(), &tx).await;
        assert_eq!(outcome, TrainingOutcome::Skipped { pairs: 5 });
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_worker_exits_when_channel_closes() {
        let (job_tx, job_rx) = mpsc::channel(1);
        let (model_tx, mut model_rx) = watch::channel(None);
        let worker = tokio::spawn(TrainerWorker::new(config(), job_rx, Arc::new(model_tx)).run());

        job_tx
            .send(TrainingJob {
                pairs: pairs(60),
                requested_at: Utc::now(),
            })
            .await
            .unwrap();
        model_rx.changed().await.unwrap();
        assert!(model_rx.borrow().is_some());

        drop(job_tx);
        worker.await.unwrap();
    }
}
