use thiserror::Error;

/// Configuration failures. Always fatal at startup.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Config parse error in {path}: {message}")]
    Parse { path: String, message: String },
    #[error("Invalid config value `{field}` = {value}: {reason}")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("Config I/O error: {0}")]
    Io(String),
}

/// Checkpoint persistence failures.
#[derive(Error, Debug, Clone)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(String),
    #[error("Checkpoint JSON error: {0}")]
    Json(String),
    #[error("Checkpoint schema version {found} does not match expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
}

/// Main engine error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Malformed or out-of-range configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Checkpoint could not be written or read
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Chain snapshot input could not be decoded
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(String),

    /// Background worker channel closed or task panicked
    #[error("Background task error: {0}")]
    Background(String),

    /// Logging subscriber could not be installed
    #[error("Logging setup error: {0}")]
    Logging(String),
}

impl Error {
    /// Create an invalid-value configuration error
    pub fn invalid_config(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Error::Config(ConfigError::InvalidValue {
            field,
            value: value.to_string(),
            reason,
        })
    }

    /// Create a checkpoint I/O error
    pub fn checkpoint_io(msg: impl Into<String>) -> Self {
        Error::Checkpoint(CheckpointError::Io(msg.into()))
    }

    /// Create a checkpoint JSON error
    pub fn checkpoint_json(msg: impl Into<String>) -> Self {
        Error::Checkpoint(CheckpointError::Json(msg.into()))
    }

    /// Whether this error must stop the process before any bar runs.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
