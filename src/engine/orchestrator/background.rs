//! Background services around the decision loop.
//!
//! ```text
//!            ┌──────────────────┐ try_send  ┌─────────┐   ┌───────────────┐
//!  interval ─► retrain scheduler ├──────────► mpsc(1) ├──►│ TrainerWorker │──► watch (model)
//!            └──────────────────┘           └─────────┘   └───────────────┘
//!            ┌──────────────────┐
//!  interval ─► checkpoint writer ├──► CheckpointManager::save + cleanup_old
//!            └──────────────────┘
//!  shutdown ─► stop loops ─► join ─► final flush
//! ```
//!
//! None of these tasks ever blocks the bar cycle. A full job channel means
//! the previous run is still going, so the new job is dropped and the
//! scheduler tries again next interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::checkpoint::CheckpointManager;
use crate::engine::config::LearningConfig;
use crate::engine::learning::{LearningOrchestrator, TrainerWorker, TrainingJob};
use crate::errors::Error;
use crate::prelude::Result;

/// Extra time the trainer gets beyond its budget to wind down at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Intervals the background loops run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundSchedule {
    pub retrain_every: Duration,
    pub checkpoint_every: Duration,
}

impl BackgroundSchedule {
    pub fn from_config(config: &LearningConfig) -> Self {
        Self {
            retrain_every: Duration::from_secs(config.lookahead.retrain_interval_secs.max(1)),
            checkpoint_every: Duration::from_secs(config.checkpoint.interval_secs.max(1)),
        }
    }
}

/// Handle to the running background tasks.
pub struct BackgroundServices {
    learning: Arc<LearningOrchestrator>,
    checkpoints: Option<CheckpointManager>,
    shutdown_tx: watch::Sender<bool>,
    scheduler: JoinHandle<()>,
    trainer: JoinHandle<()>,
    writer: Option<JoinHandle<()>>,
}

impl BackgroundServices {
    /// Spawn the scheduler, the training worker and, when a checkpoint
    /// manager is given, the periodic checkpoint writer.
    pub fn spawn(
        learning: Arc<LearningOrchestrator>,
        checkpoints: Option<CheckpointManager>,
        schedule: BackgroundSchedule,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (job_tx, job_rx) = mpsc::channel::<TrainingJob>(1);

        let trainer = tokio::spawn(
            TrainerWorker::new(
                learning.config().lookahead.clone(),
                job_rx,
                learning.model_publisher(),
            )
            .run(),
        );
        let scheduler = tokio::spawn(retrain_scheduler(
            Arc::clone(&learning),
            job_tx,
            schedule.retrain_every,
            shutdown_rx.clone(),
        ));
        let writer = checkpoints.clone().map(|manager| {
            tokio::spawn(checkpoint_writer(
                Arc::clone(&learning),
                manager,
                schedule.checkpoint_every,
                shutdown_rx,
            ))
        });

        info!(
            retrain_every_s = schedule.retrain_every.as_secs_f64(),
            checkpoint_every_s = schedule.checkpoint_every.as_secs_f64(),
            checkpoints = checkpoints.is_some(),
            "Background services started"
        );

        Self {
            learning,
            checkpoints,
            shutdown_tx,
            scheduler,
            trainer,
            writer,
        }
    }

    /// Stop every loop, wait for the trainer to drain, then write the final
    /// checkpoint.
    pub async fn shutdown(self) -> Result<()> {
        info!("Stopping background services");
        self.shutdown_tx.send_replace(true);

        join("retrain scheduler", self.scheduler).await?;
        if let Some(writer) = self.writer {
            join("checkpoint writer", writer).await?;
        }

        // The scheduler owned the job sender, so the trainer exits once any
        // in-flight run finishes.
        let budget = Duration::from_secs(self.learning.config().lookahead.training_budget_secs);
        match tokio::time::timeout(budget + SHUTDOWN_GRACE, self.trainer).await {
            Ok(joined) => joined.map_err(|e| Error::Background(format!("trainer: {e}")))?,
            Err(_) => warn!("Trainer did not stop in time, abandoning in-flight run"),
        }

        if let Some(manager) = &self.checkpoints {
            self.learning.save_checkpoint(manager)?;
            info!(
                trades = self.learning.trades_processed(),
                "Final checkpoint written"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for BackgroundServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundServices")
            .field("checkpoints", &self.checkpoints.as_ref().map(|m| m.base_dir().to_path_buf()))
            .field("stopping", &*self.shutdown_tx.borrow())
            .finish()
    }
}

async fn join(name: &str, handle: JoinHandle<()>) -> Result<()> {
    handle
        .await
        .map_err(|e| Error::Background(format!("{name}: {e}")))
}

fn interval_after_first(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker
}

async fn retrain_scheduler(
    learning: Arc<LearningOrchestrator>,
    jobs: mpsc::Sender<TrainingJob>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let min_pairs = learning.config().lookahead.min_training_pairs;
    let mut ticker = interval_after_first(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        let job = learning.training_job();
        if job.pairs.len() < min_pairs {
            debug!(
                pairs = job.pairs.len(),
                min_pairs = min_pairs,
                "[Scheduler] Not enough pairs to retrain"
            );
            continue;
        }
        match jobs.try_send(job) {
            Ok(()) => debug!("[Scheduler] Retrain job queued"),
            Err(TrySendError::Full(_)) => {
                debug!("[Scheduler] Trainer busy, retrain deferred to next interval")
            }
            Err(TrySendError::Closed(_)) => {
                warn!("[Scheduler] Trainer gone, stopping scheduler");
                break;
            }
        }
    }
}

async fn checkpoint_writer(
    learning: Arc<LearningOrchestrator>,
    manager: CheckpointManager,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval_after_first(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if let Err(e) = learning.save_checkpoint(&manager) {
            warn!(error = %e, "[Checkpoint] Save failed, retrying next interval");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::LookaheadConfig;
    use crate::engine::learning::FeatureFrame;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn test_dir() -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!(
            "pressure_background_test_{}_{}",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn learning() -> Arc<LearningOrchestrator> {
        Arc::new(LearningOrchestrator::new(LearningConfig {
            lookahead: LookaheadConfig {
                sequence_length: 4,
                horizon_bars: 2,
                min_training_pairs: 10,
                epochs: 10,
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    fn fast() -> BackgroundSchedule {
        BackgroundSchedule {
            retrain_every: Duration::from_millis(20),
            checkpoint_every: Duration::from_millis(30),
        }
    }

    #[tokio::test]
    async fn test_scheduler_trains_and_publishes() {
        let learning = learning();
        for i in 0..60 {
            let drift = (i as f64 * 0.3).sin();
            let frame = FeatureFrame::new(100.0 + drift, [drift, 0.0, 0.0, 0.2, 0.1, 0.0]);
            learning.add_snapshot("SPY", frame);
        }
        let mut models = learning.subscribe_models();

        let services = BackgroundServices::spawn(Arc::clone(&learning), None, fast());
        tokio::time::timeout(Duration::from_secs(10), models.changed())
            .await
            .expect("model published in time")
            .expect("publisher alive");
        assert!(learning.lookahead_model().is_some());

        services.shutdown().await.expect("clean shutdown");
    }

    #[tokio::test]
    async fn test_shutdown_writes_final_checkpoint() {
        let dir = test_dir();
        let manager = CheckpointManager::new(&dir).unwrap();
        let learning = learning();

        let services = BackgroundServices::spawn(Arc::clone(&learning), Some(manager.clone()), fast());
        tokio::time::sleep(Duration::from_millis(80)).await;
        services.shutdown().await.expect("clean shutdown");

        let bundle = manager.load_latest().unwrap().expect("checkpoint written");
        assert_eq!(bundle.metadata.trades_processed, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
