//! Utilities
//!
//! Logging setup and timing helpers.

mod logger;
mod timer;

pub use logger::{init_logger, LogLevel, LogTarget};
pub use timer::{format_duration, Timer};
