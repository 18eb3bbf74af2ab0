//! Application module
//!
//! Process-level concerns shared by every subcommand: verbosity and logging
//! setup, fatal error reporting, and assembly of the scheduler components.

pub mod config;
pub mod error_handling;
pub mod logging;
pub mod runtime;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
pub use runtime::Runtime;
