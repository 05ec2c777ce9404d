use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("zero interval for check '{0}'")]
    ZeroInterval(String),

    #[error("cron fabric is shut down")]
    ShutDown,
}
