use thiserror::Error;

/// Failures seen by a caller of the worker. Storage errors never show up
/// here: the worker answers those with a `null` reply.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("database worker has shut down")]
    Closed,

    #[error("database worker dropped the reply for handle {0}")]
    ReplyDropped(u64),

    #[error("unexpected reply payload: {0}")]
    Decode(#[from] serde_json::Error),
}
