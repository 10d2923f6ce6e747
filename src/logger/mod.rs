//! Structured logging for the cache layers
//!
//! A small tagged logging API:
//! - Standard log levels (Error/Warning/Info/Debug/Verbose)
//! - Per-tag debug control (`--debug-cache`, `--debug-rpc`, ...)
//! - Colored console output
//!
//! ## Usage
//!
//! ```rust
//! use chama_cache::logger::{self, LogTag};
//!
//! logger::warning(LogTag::Cache, "Background refresh failed");
//! logger::debug(LogTag::Cache, "Cold fetch for chama:info:0xabc"); // Only with --debug-cache
//! ```
//!
//! Call [`init`] once at startup to pick up command-line flags.

mod config;
mod core;
mod format;
mod levels;
mod tags;

pub use config::{
    enable_debug_for, get_logger_config, init_from_args, set_logger_config,
    update_logger_config, LoggerConfig,
};
pub use levels::LogLevel;
pub use tags::LogTag;

/// Initialize the logger from the process arguments
pub fn init() {
    config::init_from_args(std::env::args());
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Error, message);
}

/// Log at WARNING level
///
/// Used for retries and swallowed background failures.
pub fn warning(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Info, message);
}

/// Log at DEBUG level, only shown when debug is enabled for the tag
pub fn debug(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Debug, message);
}

/// Log at VERBOSE level
pub fn verbose(tag: LogTag, message: &str) {
    core::log_internal(tag, LogLevel::Verbose, message);
}
