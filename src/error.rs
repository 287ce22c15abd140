use crate::config::ConfigError;
use crate::datasource::ChainError;
use thiserror::Error;

/// Run-level failure taxonomy.
#[derive(Debug, Error)]
pub enum RunError {
    /// Retries at the chain boundary were exhausted.
    #[error("Transient RPC failure in {context}: {source}")]
    TransientRpc { context: String, source: ChainError },
    /// The query cannot succeed (pruned state, revert, malformed response).
    #[error("Permanent query failure in {context}: {source}")]
    PermanentQuery { context: String, source: ChainError },
    /// The extraction model does not match what the chain returned.
    #[error("Data consistency violation: {0}")]
    DataConsistency(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("{} extraction unit(s) failed: {}", .0.len(), .0.join("; "))]
    UnitsFailed(Vec<String>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunError {
    /// Classify a chain error raised while working on `context`.
    pub fn chain(context: impl Into<String>, source: ChainError) -> Self {
        let context = context.into();
        if source.is_transient() {
            RunError::TransientRpc { context, source }
        } else {
            RunError::PermanentQuery { context, source }
        }
    }

    /// Whether the error must abort the whole run rather than one unit.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RunError::TransientRpc { .. } | RunError::PermanentQuery { .. }
        )
    }
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Configuration(err.to_string())
    }
}

/// Attach unit context to chain results.
pub trait ChainContext<T> {
    fn in_unit<F, S>(self, context: F) -> Result<T, RunError>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ChainContext<T> for Result<T, ChainError> {
    fn in_unit<F, S>(self, context: F) -> Result<T, RunError>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| RunError::chain(context(), e))
    }
}
