use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("missing or empty check id")]
    MissingCheckId,

    #[error("missing or empty tenant id")]
    MissingTenantId,

    #[error("negative probe duration: {0}ms")]
    NegativeDuration(i64),

    #[error("check '{0}' has a zero interval")]
    InvalidInterval(String),

    #[error("check '{0}' has a zero timeout")]
    InvalidTimeout(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
