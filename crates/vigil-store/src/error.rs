use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-key violation on incident creation, or a release attempted by
    /// a non-owning holder.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transient backend failure; callers may retry on a later tick.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
