use crate::error::{CoreError, Result};
use crate::player::{RandomMode, RepeatMode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RhythmCatConfig {
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub repeat: RepeatMode,
    #[serde(default)]
    pub random: RandomMode,
    #[serde(default)]
    pub auto_play: bool,
    /// Delay used to coalesce property change notifications
    #[serde(default = "default_flush_delay")]
    pub flush_delay_ms: u64,
}

const fn default_volume() -> f64 {
    1.0
}

const fn default_flush_delay() -> u64 {
    50
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            repeat: RepeatMode::default(),
            random: RandomMode::default(),
            auto_play: false,
            flush_delay_ms: default_flush_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    #[serde(default = "crate::paths::library_db_path")]
    pub db_file: PathBuf,
    #[serde(default = "default_true")]
    pub autosave: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            db_file: crate::paths::library_db_path(),
            autosave: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Extra directories searched for `.lrc` files
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,
    /// Where crawled lyrics are written
    #[serde(default = "crate::paths::lyrics_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_true")]
    pub auto_download: bool,
    /// Crawler priority: crawlers are tried in order
    #[serde(default = "default_crawlers")]
    pub crawlers: Vec<String>,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_days: u32,
}

fn default_crawlers() -> Vec<String> {
    vec!["ttplayer".to_string()]
}

const fn default_true() -> bool {
    true
}

const fn default_cache_ttl() -> u32 {
    30
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            search_dirs: Vec::new(),
            download_dir: crate::paths::lyrics_dir(),
            auto_download: true,
            crawlers: default_crawlers(),
            cache_enabled: true,
            cache_ttl_days: default_cache_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Plugin selection plus free-form per-plugin tables.
///
/// Each plugin crate owns the shape of its `[plugins.<id>]` table and pulls
/// it out with [`PluginsConfig::get`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_enabled_plugins")]
    pub enabled: Vec<String>,
    #[serde(flatten)]
    pub settings: toml::Table,
}

fn default_enabled_plugins() -> Vec<String> {
    vec!["mpris".to_string(), "mediakey".to_string(), "notify".to_string()]
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_plugins(),
            settings: toml::Table::new(),
        }
    }
}

impl PluginsConfig {
    /// Whether the plugin with this id should be loaded at startup
    #[must_use]
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.iter().any(|e| e == id)
    }

    /// Raw `[plugins.<id>]` table, if present
    #[must_use]
    pub fn table(&self, id: &str) -> Option<toml::Table> {
        match self.settings.get(id) {
            Some(toml::Value::Table(table)) => Some(table.clone()),
            _ => None,
        }
    }

    /// Deserialize the `[plugins.<id>]` table into a plugin-specific struct.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but does not match `T`.
    pub fn get<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>> {
        self.settings
            .get(id)
            .map(|value| value.clone().try_into::<T>())
            .transpose()
            .map_err(CoreError::from)
    }
}

impl RhythmCatConfig {
    /// Get the configuration directory path (~/.config/rhythmcat/)
    #[must_use]
    pub fn config_dir() -> PathBuf {
        crate::paths::config_dir()
    }

    /// Get the config file path (~/.config/rhythmcat/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path or create the template on first run.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read or parsed.
    pub fn load_or_create(plugin_templates: Option<&[&str]>) -> Result<Self> {
        Self::load_or_create_at(&Self::config_path(), plugin_templates)
    }

    /// Same as [`Self::load_or_create`] for an explicit path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read or parsed.
    pub fn load_or_create_at(path: &Path, plugin_templates: Option<&[&str]>) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(path, build_config_template(plugin_templates))?;

            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a config document.
    ///
    /// # Errors
    ///
    /// Returns an error on TOML syntax errors or out-of-range values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.player.volume) {
            return Err(CoreError::ConfigInvalid {
                message: format!("player.volume must be within 0.0..=1.0, got {}", self.player.volume),
            });
        }
        if self.lyrics.crawlers.iter().any(String::is_empty) {
            return Err(CoreError::ConfigInvalid {
                message: "lyrics.crawlers contains an empty name".to_string(),
            });
        }
        Ok(())
    }
}

/// Build the full config template: base sections followed by plugin sections.
#[must_use]
pub fn build_config_template(plugin_templates: Option<&[&str]>) -> String {
    let mut template = CONFIG_TEMPLATE.to_string();
    for section in plugin_templates.unwrap_or_default() {
        template.push('\n');
        template.push_str(section);
    }
    template
}

const CONFIG_TEMPLATE: &str = r#"# RhythmCat Configuration
# ~/.config/rhythmcat/config.toml

[player]
volume = 1.0
# Repeat mode: "none", "single", "list", "all"
repeat = "none"
# Random mode: "none", "single", "all"
random = "none"
auto_play = false
# Property change notifications arriving within this window are sent together
flush_delay_ms = 50

[library]
# db_file = "~/.config/rhythmcat/library.db"
autosave = true

[lyrics]
# Extra directories searched for "<artist> - <title>.lrc"
search_dirs = []
# download_dir = "~/.config/rhythmcat/lyrics"
auto_download = true
# Crawlers are tried in order; first successful download wins
crawlers = ["ttplayer"]
cache_enabled = true
cache_ttl_days = 30

[logging]
# Also write logs to ~/.cache/rhythmcat/rhythmcat.log
enabled = false

[plugins]
enabled = ["mpris", "mediakey", "notify"]
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RhythmCatConfig::from_toml_str("").unwrap();
        assert!((config.player.volume - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.player.repeat, RepeatMode::None);
        assert_eq!(config.lyrics.crawlers, vec!["ttplayer".to_string()]);
        assert!(config.plugins.is_enabled("mpris"));
    }

    #[test]
    fn test_template_parses() {
        let template = build_config_template(Some(&["[plugins.notify]\ntimeout_ms = 3000\n"]));
        let config = RhythmCatConfig::from_toml_str(&template).unwrap();
        assert_eq!(config.player.flush_delay_ms, 50);
        assert!(config.plugins.table("notify").is_some());
    }

    #[test]
    fn test_invalid_volume_rejected() {
        let result = RhythmCatConfig::from_toml_str("[player]\nvolume = 1.5\n");
        assert!(matches!(result, Err(CoreError::ConfigInvalid { .. })));
    }

    #[test]
    fn test_plugin_table_typed_access() {
        #[derive(Deserialize)]
        struct Sample {
            timeout_ms: i32,
        }

        let config = RhythmCatConfig::from_toml_str(
            "[plugins]\nenabled = [\"notify\"]\n\n[plugins.notify]\ntimeout_ms = 1234\n",
        )
        .unwrap();
        let sample: Sample = config.plugins.get("notify").unwrap().unwrap();
        assert_eq!(sample.timeout_ms, 1234);
        assert!(config.plugins.get::<Sample>("mpris").unwrap().is_none());
        assert!(!config.plugins.is_enabled("mpris"));
    }

    #[test]
    fn test_plugin_table_type_mismatch() {
        #[derive(Debug, Deserialize)]
        struct Sample {
            #[allow(dead_code)]
            timeout_ms: i32,
        }

        let config =
            RhythmCatConfig::from_toml_str("[plugins.notify]\ntimeout_ms = \"soon\"\n").unwrap();
        assert!(config.plugins.get::<Sample>("notify").is_err());
    }

    #[test]
    fn test_load_or_create_writes_template() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let _ = fs::remove_file(&path);

        let first = RhythmCatConfig::load_or_create_at(&path, None);
        assert!(matches!(first, Err(CoreError::ConfigNotFound { .. })));

        let second = RhythmCatConfig::load_or_create_at(&path, None).unwrap();
        assert!(second.library.autosave);

        let _ = fs::remove_dir_all(&dir);
    }
}
