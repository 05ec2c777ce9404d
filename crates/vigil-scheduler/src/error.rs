use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("domain error: {0}")]
    Domain(#[from] vigil_domain::DomainError),

    #[error("store error: {0}")]
    Store(#[from] vigil_store::StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] vigil_queue::QueueError),

    #[error("cron error: {0}")]
    Cron(#[from] vigil_cron::CronError),
}
