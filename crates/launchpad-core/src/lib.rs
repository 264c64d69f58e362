pub mod config;
pub mod naming;
pub mod progress;
pub mod types;

pub use config::{ConfigError, LaunchpadConfig};
pub use progress::{Progress, ProgressSink, Step};
pub use types::*;
