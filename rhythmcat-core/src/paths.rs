//! Path constants for configuration, library and cache files.

use std::path::PathBuf;

/// The name of the configuration directory under ~/.config/
pub const CONFIG_DIR_NAME: &str = "rhythmcat";

/// The name of the main configuration file
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The name of the compressed library database file
pub const LIBRARY_DB_FILE_NAME: &str = "library.db";

/// The name of the crawled lyrics cache database file
pub const LYRICS_CACHE_DB_FILE_NAME: &str = "lyrics_cache.db";

/// The name of the log file written when file logging is enabled
pub const LOG_FILE_NAME: &str = "rhythmcat.log";

/// Get the configuration directory path (~/.config/rhythmcat/)
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(CONFIG_DIR_NAME)
}

/// Get the config file path (~/.config/rhythmcat/config.toml)
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the default library database path (`~/.config/rhythmcat/library.db`)
#[must_use]
pub fn library_db_path() -> PathBuf {
    config_dir().join(LIBRARY_DB_FILE_NAME)
}

/// Get the default directory for downloaded lyrics (`~/.config/rhythmcat/lyrics`)
#[must_use]
pub fn lyrics_dir() -> PathBuf {
    config_dir().join("lyrics")
}

/// Get the cache directory (`~/.cache/rhythmcat`)
#[must_use]
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| config_dir().join("cache"))
        .join(CONFIG_DIR_NAME)
}

/// Get the lyrics cache database path (`~/.cache/rhythmcat/lyrics_cache.db`)
#[must_use]
pub fn lyrics_cache_db_path() -> PathBuf {
    cache_dir().join(LYRICS_CACHE_DB_FILE_NAME)
}

/// Get the log file path (`~/.cache/rhythmcat/rhythmcat.log`)
#[must_use]
pub fn log_file_path() -> PathBuf {
    cache_dir().join(LOG_FILE_NAME)
}
