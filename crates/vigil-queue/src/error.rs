use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("unknown delivery tag: {0}")]
    UnknownTag(u64),

    /// Transient broker failure; the producer may retry on a later tick.
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}
