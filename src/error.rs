use thiserror::Error;

/// Errors produced by the downsample engine.
///
/// `Cancelled` and `OrderingViolation` are never retried by the engine
/// itself; `BulkIndexingFailure` carries its own retryability so
/// `ShardDriver` can tell the caller whether resuming from
/// `last_completed_tsid` is sound.
#[derive(Clone, Debug, Error)]
pub enum DownsampleError {
    #[error("shard downsample cancelled")]
    Cancelled,

    #[error("bulk indexing failed ({item_failures} item failure(s)): {message}")]
    BulkIndexingFailure {
        retryable: bool,
        item_failures: usize,
        message: String,
    },

    #[error("document stream ordering violation: {0}")]
    OrderingViolation(String),

    #[error("transport error: {0}")]
    Transport(TransportError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("mapping mismatch: {0}")]
    MappingMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type DownsampleResult<T = ()> = Result<T, DownsampleError>;

impl DownsampleError {
    /// Whether the orchestrator may retry the shard from
    /// `last_completed_tsid` after this error.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            DownsampleError::BulkIndexingFailure {
                retryable: true,
                ..
            }
        )
    }
}

/// A transport-layer failure reported by a [`crate::bulk_sink::BulkWriter`].
/// Distinct from [`DownsampleError`] because the sink retries these
/// internally up to `max_retries` times before ever surfacing a
/// `BulkIndexingFailure` to the collector.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub retryable: bool,
    pub message: String,
}

impl TransportError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}
