/// Core logging implementation with automatic filtering
use super::config::{
    get_logger_config, is_debug_enabled_for_tag, is_verbose_enabled_for_tag, LoggerConfig,
};
use super::levels::LogLevel;
use super::tags::LogTag;

/// Check if a log message should be displayed
///
/// Filtering rules:
/// 1. Errors are always shown
/// 2. Level must be within the minimum threshold
/// 3. Debug level requires debug mode for that tag
/// 4. Verbose level requires verbose threshold with no tag list, or per-tag verbose
/// 5. If enabled_tags is non-empty, the tag must be in the set
pub fn should_log(config: &LoggerConfig, tag: &LogTag, level: LogLevel) -> bool {
    if level == LogLevel::Error {
        return true;
    }

    if level > config.min_level {
        return false;
    }

    if level == LogLevel::Debug {
        return is_debug_enabled_for_tag(config, tag);
    }

    if level == LogLevel::Verbose {
        return (config.verbose_tags.is_empty() && config.min_level == LogLevel::Verbose)
            || is_verbose_enabled_for_tag(config, tag);
    }

    if !config.enabled_tags.is_empty() && !config.enabled_tags.contains(&tag.to_debug_key()) {
        return false;
    }

    true
}

pub fn log_internal(tag: LogTag, level: LogLevel, message: &str) {
    let config = get_logger_config();
    if !config.console || !should_log(&config, &tag, level) {
        return;
    }

    super::format::format_and_log(&tag, level, message);
}
