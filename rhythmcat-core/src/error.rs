use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please review it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Library errors
    #[error("Unknown catalog: {id}")]
    UnknownCatalog { id: u64 },

    #[error("Unknown playlist item: {id}")]
    UnknownItem { id: u64 },

    #[error("Invalid library operation: {reason}")]
    InvalidOperation { reason: String },

    // Library database file errors
    #[error("Malformed library database: {reason}")]
    DbFormat { reason: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Legacy database error: {0}")]
    LegacyJson(#[from] serde_json::Error),

    #[error("Failed to read tags from {path}: {reason}")]
    TagRead { path: PathBuf, reason: String },

    // Lyric errors
    #[error("Lyric crawler {crawler} failed: {reason}")]
    CrawlerFailed { crawler: String, reason: String },

    #[error("Failed to parse LRC: {reason}")]
    LrcParseError { reason: String },

    // Player errors
    #[error("Audio backend error: {reason}")]
    Backend { reason: String },

    #[error("Player is not running")]
    PlayerGone,

    // Plugin errors
    #[error("Unknown plugin: {id}")]
    UnknownPlugin { id: String },

    #[error("Plugin {id} failed to load: {reason}")]
    PluginLoad { id: String, reason: String },

    #[error("D-Bus error: {reason}")]
    Dbus { reason: String },

    // DSP errors
    #[error("Invalid filter parameter {name}: {reason}")]
    InvalidFilterParameter { name: &'static str, reason: String },

    // Cache errors
    #[error("Cache database error: {0}")]
    CacheError(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
