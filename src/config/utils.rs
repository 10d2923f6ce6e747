/// Configuration utilities - loading, reloading, and access helpers
///
/// The global configuration is optional: every accessor falls back to
/// `Config::default()` when nothing was loaded, so the cache works out of
/// the box in tests and embedded use.
use super::schemas::Config;
use crate::errors::{CacheError, CacheResult};
use crate::logger::{self, LogTag};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::RwLock;

/// Global configuration instance
pub static CONFIG: OnceCell<RwLock<Config>> = OnceCell::new();

/// Default configuration file path
pub const CONFIG_FILE_PATH: &str = "data/cache.toml";

/// Parse a configuration from TOML text
pub fn parse_config(contents: &str) -> CacheResult<Config> {
    toml::from_str::<Config>(contents)
        .map_err(|e| CacheError::Config(format!("Failed to parse config: {}", e)))
}

/// Read a configuration file, using defaults when the file does not exist
pub fn read_config_file(path: impl AsRef<Path>) -> CacheResult<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        CacheError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
    })?;

    parse_config(&contents)
}

/// Load configuration from the default path and initialize the global CONFIG
pub fn load_config() -> CacheResult<()> {
    load_config_from_path(CONFIG_FILE_PATH)
}

/// Load configuration from a specific path and initialize the global CONFIG
///
/// Fails if the global configuration was already initialized.
pub fn load_config_from_path(path: impl AsRef<Path>) -> CacheResult<()> {
    let path = path.as_ref();
    let config = read_config_file(path)?;

    CONFIG
        .set(RwLock::new(config))
        .map_err(|_| CacheError::Config("Config already initialized".to_string()))?;
    logger::info(
        LogTag::System,
        &format!("Configuration loaded from {}", path.display()),
    );
    Ok(())
}

/// Reload configuration from disk, replacing the global value atomically
///
/// Caches that were already constructed keep the settings they were built with.
pub fn reload_config_from_path(path: impl AsRef<Path>) -> CacheResult<()> {
    let path = path.as_ref();
    let new_config = read_config_file(path)?;
    logger::info(
        LogTag::System,
        &format!("Configuration reloaded from {}", path.display()),
    );

    match CONFIG.get() {
        Some(config_lock) => {
            let mut config = config_lock
                .write()
                .map_err(|e| CacheError::Config(format!("Config lock poisoned: {}", e)))?;
            *config = new_config;
            Ok(())
        }
        None => CONFIG
            .set(RwLock::new(new_config))
            .map_err(|_| CacheError::Config("Config initialized concurrently".to_string())),
    }
}

/// Execute a function with read access to the configuration
pub fn with_config<F, R>(f: F) -> R
where
    F: FnOnce(&Config) -> R,
{
    match CONFIG.get().and_then(|lock| lock.read().ok()) {
        Some(config) => f(&config),
        None => f(&Config::default()),
    }
}

/// Get a clone of the entire configuration
pub fn get_config_clone() -> Config {
    with_config(|cfg| cfg.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_partial_config_keeps_defaults() {
        let config = parse_config(
            r#"
            [cache]
            max_cache_size = 50
            min_request_interval_ms = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.max_cache_size, 50);
        assert_eq!(config.cache.min_request_interval_ms, 0);
        assert_eq!(config.cache.default_cache_duration_ms, 30_000);
        assert_eq!(config.batch.high_priority_stale_ms, 5_000);
    }

    #[test]
    fn test_parse_invalid_config_is_config_error() {
        let err = parse_config("[cache]\nmax_cache_size = \"lots\"").unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn test_read_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[batch]\nhigh_priority_stale_ms = 1000").unwrap();

        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.batch.high_priority_stale_ms, 1_000);
        assert_eq!(config.batch.medium_priority_stale_ms, 20_000);
    }

    #[test]
    fn test_reload_replaces_global_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");

        std::fs::write(&path, "[batch]\nhigh_priority_stale_ms = 3000\n").unwrap();
        reload_config_from_path(&path).unwrap();
        assert_eq!(with_config(|c| c.batch.high_priority_stale_ms), 3_000);

        std::fs::write(&path, "[batch]\nhigh_priority_stale_ms = 4000\n").unwrap();
        reload_config_from_path(&path).unwrap();
        assert_eq!(get_config_clone().batch.high_priority_stale_ms, 4_000);

        // A missing file restores the defaults
        reload_config_from_path(dir.path().join("absent.toml")).unwrap();
        assert_eq!(get_config_clone(), Config::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
