/// Logger configuration and per-tag debug switches
use super::levels::LogLevel;
use super::tags::LogTag;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level shown (Info by default)
    pub min_level: LogLevel,
    /// Tags with debug output enabled
    pub debug_tags: HashSet<String>,
    /// Tags with verbose output enabled
    pub verbose_tags: HashSet<String>,
    /// If non-empty, only these tags are shown (errors excepted)
    pub enabled_tags: HashSet<String>,
    /// Console output switch, tests run with it off
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
            debug_tags: HashSet::new(),
            verbose_tags: HashSet::new(),
            enabled_tags: HashSet::new(),
            console: !cfg!(test),
        }
    }
}

static LOGGER_CONFIG: Lazy<RwLock<LoggerConfig>> =
    Lazy::new(|| RwLock::new(LoggerConfig::default()));

pub fn get_logger_config() -> LoggerConfig {
    LOGGER_CONFIG
        .read()
        .map(|config| config.clone())
        .unwrap_or_default()
}

pub fn set_logger_config(config: LoggerConfig) {
    if let Ok(mut current) = LOGGER_CONFIG.write() {
        *current = config;
    }
}

pub fn update_logger_config<F>(f: F)
where
    F: FnOnce(&mut LoggerConfig),
{
    if let Ok(mut current) = LOGGER_CONFIG.write() {
        f(&mut current);
    }
}

/// Turn on debug output for one tag (raises the threshold to Debug)
pub fn enable_debug_for(tag: &LogTag) {
    update_logger_config(|config| {
        config.debug_tags.insert(tag.to_debug_key());
        if config.min_level < LogLevel::Debug {
            config.min_level = LogLevel::Debug;
        }
    });
}

/// Read `--debug-<tag>`, `--verbose-<tag>`, `--verbose` and
/// `--log-level=<level>` from arguments, in order
///
/// Unknown levels are ignored.
pub fn init_from_args<I, S>(args: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    update_logger_config(|config| {
        for arg in args {
            let arg = arg.as_ref();
            if arg == "--verbose" {
                config.min_level = LogLevel::Verbose;
            } else if let Some(level) = arg.strip_prefix("--log-level=") {
                if let Some(level) = LogLevel::parse(level) {
                    config.min_level = level;
                }
            } else if let Some(tag) = arg.strip_prefix("--debug-") {
                config.debug_tags.insert(tag.to_lowercase());
                if config.min_level < LogLevel::Debug {
                    config.min_level = LogLevel::Debug;
                }
            } else if let Some(tag) = arg.strip_prefix("--verbose-") {
                config.verbose_tags.insert(tag.to_lowercase());
                config.min_level = LogLevel::Verbose;
            }
        }
    });
}

pub fn is_debug_enabled_for_tag(config: &LoggerConfig, tag: &LogTag) -> bool {
    config.debug_tags.contains(&tag.to_debug_key())
}

pub fn is_verbose_enabled_for_tag(config: &LoggerConfig, tag: &LogTag) -> bool {
    config.verbose_tags.contains(&tag.to_debug_key())
}
