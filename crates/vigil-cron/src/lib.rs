pub mod error;
pub mod fabric;

pub use error::CronError;
pub use fabric::{CronFabric, FiringCallback};
