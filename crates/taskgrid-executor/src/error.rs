//! Executor error types.

use thiserror::Error;

/// Errors surfaced by the task executor.
///
/// None of these abort a reconcile cycle; they are logged where they occur
/// and the next cycle re-derives its decisions from fresh state.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid template for {algorithm}: {source}")]
    Template {
        algorithm: String,
        source: taskgrid_state::StateError,
    },

    #[error("dispatch to {target} failed: {source}")]
    Dispatch {
        target: String,
        source: anyhow::Error,
    },

    #[error("snapshot unavailable: {0}")]
    Snapshot(anyhow::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
