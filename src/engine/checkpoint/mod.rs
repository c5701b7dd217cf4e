//! Checkpoint persistence for warm-starting the learning loop.
//!
//! ```text
//! LearningOrchestrator
//!   │ saves every interval + on shutdown
//!   ▼
//! <dir>/latest/checkpoint.json
//!   │ loads on startup (warm start); missing/corrupt/version mismatch → cold start
//!   ▼
//! LearningOrchestrator (next session)
//! ```
//!
//! Writes go to `checkpoint.json.tmp` and are renamed into place, so a crash
//! mid-write never leaves a torn file. Each save also drops a timestamped
//! backup that `cleanup_old` prunes.

mod types;

pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::errors::{CheckpointError, Error};
use crate::prelude::Result;

const LATEST_DIR: &str = "latest";
const CHECKPOINT_FILE: &str = "checkpoint.json";
const TMP_FILE: &str = "checkpoint.json.tmp";

fn io_err(context: &str, path: &Path, e: std::io::Error) -> Error {
    Error::checkpoint_io(format!("{context} {}: {e}", path.display()))
}

/// Manages checkpoint files under one directory.
///
/// ```text
/// base_dir/
/// ├── latest/
/// │   └── checkpoint.json
/// └── 1700000000000/     (timestamped backups)
///     └── checkpoint.json
/// ```
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    base_dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the base directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).map_err(|e| io_err("create", &base_dir, e))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn latest_path(&self) -> PathBuf {
        self.base_dir.join(LATEST_DIR).join(CHECKPOINT_FILE)
    }

    /// Save a bundle atomically and write a timestamped backup.
    pub fn save(&self, bundle: &CheckpointBundle) -> Result<()> {
        let latest_dir = self.base_dir.join(LATEST_DIR);
        fs::create_dir_all(&latest_dir).map_err(|e| io_err("create", &latest_dir, e))?;

        let checkpoint_path = latest_dir.join(CHECKPOINT_FILE);
        let tmp_path = latest_dir.join(TMP_FILE);

        let json = serde_json::to_string_pretty(bundle)
            .map_err(|e| Error::checkpoint_json(format!("serialize: {e}")))?;

        fs::write(&tmp_path, &json).map_err(|e| io_err("write", &tmp_path, e))?;
        fs::rename(&tmp_path, &checkpoint_path).map_err(|e| io_err("rename", &tmp_path, e))?;

        let backup_dir = self.base_dir.join(bundle.metadata.timestamp_ms.to_string());
        fs::create_dir_all(&backup_dir).map_err(|e| io_err("create", &backup_dir, e))?;
        let backup_path = backup_dir.join(CHECKPOINT_FILE);
        fs::write(&backup_path, &json).map_err(|e| io_err("write", &backup_path, e))?;

        info!(
            version = bundle.metadata.version,
            trades = bundle.metadata.trades_processed,
            bandit_arms = bundle.bandit.arms.len(),
            calibration_samples = bundle.calibration.sample_count,
            lookahead_model = bundle.lookahead.model.is_some(),
            "Checkpoint saved to {}",
            checkpoint_path.display()
        );
        Ok(())
    }

    /// Load the latest bundle.
    ///
    /// `Ok(None)` when no checkpoint exists; `Err` on I/O failure, corrupt
    /// JSON, or a schema version other than [`CHECKPOINT_VERSION`].
    pub fn load_latest(&self) -> Result<Option<CheckpointBundle>> {
        let checkpoint_path = self.latest_path();
        if !checkpoint_path.exists() {
            return Ok(None);
        }

        let json =
            fs::read_to_string(&checkpoint_path).map_err(|e| io_err("read", &checkpoint_path, e))?;
        let bundle: CheckpointBundle = serde_json::from_str(&json)
            .map_err(|e| Error::checkpoint_json(format!("deserialize: {e}")))?;

        if bundle.metadata.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                found: bundle.metadata.version,
                expected: CHECKPOINT_VERSION,
            }
            .into());
        }

        info!(
            version = bundle.metadata.version,
            timestamp_ms = bundle.metadata.timestamp_ms,
            session_duration_s = bundle.metadata.session_duration_s,
            bandit_arms = bundle.bandit.arms.len(),
            calibration_samples = bundle.calibration.sample_count,
            "Loaded checkpoint from {}",
            checkpoint_path.display()
        );
        Ok(Some(bundle))
    }

    /// Remove timestamped backups older than `keep_days`. Returns the number removed.
    pub fn cleanup_old(&self, keep_days: u32) -> Result<usize> {
        let now_ms = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let cutoff_ms = now_ms.saturating_sub(keep_days as u64 * 86_400_000);

        let entries = fs::read_dir(&self.base_dir).map_err(|e| io_err("list", &self.base_dir, e))?;
        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| io_err("list", &self.base_dir, e))?;
            let name = entry.file_name();
            let Ok(ts) = name.to_string_lossy().parse::<u64>() else {
                continue;
            };
            if ts < cutoff_ms {
                let path = entry.path();
                fs::remove_dir_all(&path).map_err(|e| io_err("remove", &path, e))?;
                debug!(timestamp_ms = ts, "Removed old checkpoint: {}", path.display());
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed = removed, keep_days = keep_days, "Cleaned up old checkpoints");
        }
        Ok(removed)
    }
}
