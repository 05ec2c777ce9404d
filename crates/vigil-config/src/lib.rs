pub mod checks;
pub mod error;
pub mod settings;

pub use checks::load_checks;
pub use error::ConfigError;
pub use settings::{
    IncidentSettings, SchedulerSettings, Settings, SeverityRetries, SeverityTimeouts,
};
