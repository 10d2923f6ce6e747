//! Cache configuration
//!
//! Settings are declared with [`config_struct!`](crate::config_struct) and
//! loaded from TOML. Nothing has to be loaded: accessors fall back to the
//! built-in defaults (1000 entries, 2s request spacing, 30s TTL).

pub mod macros;
mod schemas;
mod utils;

pub use schemas::{BatchSettings, CacheSettings, Config};
pub use utils::{
    get_config_clone, load_config, load_config_from_path, parse_config, read_config_file,
    reload_config_from_path, with_config, CONFIG, CONFIG_FILE_PATH,
};
