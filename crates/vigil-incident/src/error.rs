use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IncidentError {
    /// Malformed input; surfaced to the caller, never retried internally.
    #[error("validation error: {0}")]
    Validation(#[from] vigil_domain::DomainError),

    #[error("incident not found: {0}")]
    NotFound(Uuid),

    #[error("incident {0} is already resolved")]
    AlreadyResolved(Uuid),

    /// Store failures propagate to the result-stream consumer so redelivery
    /// semantics compose with the upstream queue.
    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),
}
