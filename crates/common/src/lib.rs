pub mod config;
pub mod logging;
#[cfg(feature = "async")]
pub mod wait;

pub use config::Environment;
pub use logging::setup_logging;
#[cfg(feature = "async")]
pub use wait::{WaitTimeout, wait_with_timeout};
