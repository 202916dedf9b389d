//! Plugin lifecycle management.
//!
//! Plugins are owned objects: everything a plugin needs while loaded lives in
//! its own struct and is handed over through [`Plugin::load`]. The manager
//! only tracks which plugins exist and drives their lifecycle.

use crate::config::PluginsConfig;
use crate::error::{CoreError, Result};
use crate::library::SharedLibrary;
use crate::player::PlayerHandle;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Static description of a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    /// Stable identifier, used in `[plugins] enabled` and `[plugins.<id>]`
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub author: &'static str,
    pub homepage: &'static str,
}

/// Everything a plugin may use while it is loaded
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub player: PlayerHandle,
    pub library: SharedLibrary,
    /// The plugin's `[plugins.<id>]` table
    pub config: Option<toml::Table>,
    /// Cancelled when the plugin is unloaded
    pub cancel: CancellationToken,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn info(&self) -> &PluginInfo;

    /// Acquire resources and start background tasks.
    async fn load(&mut self, ctx: PluginContext) -> Result<()>;

    /// Release everything acquired in [`Plugin::load`].
    async fn unload(&mut self) -> Result<()>;

    /// Apply new settings; called before `load` and whenever settings change.
    async fn configure(&mut self, config: Option<toml::Table>) -> Result<()>;

    fn is_loaded(&self) -> bool;
}

/// Summary row returned by [`PluginManager::plugins`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStatus {
    pub info: PluginInfo,
    pub loaded: bool,
}

struct Entry {
    plugin: Box<dyn Plugin>,
    cancel: Option<CancellationToken>,
}

/// Registry of plugins and their lifecycle
pub struct PluginManager {
    player: PlayerHandle,
    library: SharedLibrary,
    settings: PluginsConfig,
    entries: Vec<Entry>,
}

impl PluginManager {
    pub fn new(player: PlayerHandle, library: SharedLibrary, settings: PluginsConfig) -> Self {
        Self {
            player,
            library,
            settings,
            entries: Vec::new(),
        }
    }

    /// Add a plugin.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if a plugin with the same id is registered.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let id = plugin.info().id;
        if self.entries.iter().any(|e| e.plugin.info().id == id) {
            return Err(CoreError::InvalidOperation {
                reason: format!("plugin {id} is already registered"),
            });
        }
        debug!("Registered plugin {}", id);
        self.entries.push(Entry {
            plugin,
            cancel: None,
        });
        Ok(())
    }

    #[must_use]
    pub fn plugins(&self) -> Vec<PluginStatus> {
        self.entries
            .iter()
            .map(|e| PluginStatus {
                info: e.plugin.info().clone(),
                loaded: e.plugin.is_loaded(),
            })
            .collect()
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.plugin.info().id == id)
            .ok_or_else(|| CoreError::UnknownPlugin { id: id.to_string() })
    }

    /// Configure and load a plugin; loading a loaded plugin does nothing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlugin` for an unregistered id, or `PluginLoad` when the
    /// plugin fails to start (it stays unloaded).
    pub async fn load(&mut self, id: &str) -> Result<()> {
        let config = self.settings.table(id);
        let ctx = PluginContext {
            player: self.player.clone(),
            library: self.library.clone(),
            config: config.clone(),
            cancel: CancellationToken::new(),
        };

        let entry = self.entry_mut(id)?;
        if entry.plugin.is_loaded() {
            debug!("Plugin {} is already loaded", id);
            return Ok(());
        }

        let cancel = ctx.cancel.clone();
        let result = match entry.plugin.configure(config).await {
            Ok(()) => entry.plugin.load(ctx).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                entry.cancel = Some(cancel);
                info!("Loaded plugin {}", id);
                Ok(())
            }
            Err(e) => {
                cancel.cancel();
                warn!("Plugin {} failed to load: {}", id, e);
                Err(CoreError::PluginLoad {
                    id: id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Unload a plugin; unloading an unloaded plugin does nothing.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlugin` for an unregistered id, or the plugin's error.
    pub async fn unload(&mut self, id: &str) -> Result<()> {
        let entry = self.entry_mut(id)?;
        if let Some(cancel) = entry.cancel.take() {
            cancel.cancel();
        }
        if !entry.plugin.is_loaded() {
            return Ok(());
        }
        entry.plugin.unload().await?;
        info!("Unloaded plugin {}", id);
        Ok(())
    }

    /// Push a new `[plugins.<id>]` table to a plugin
    ///
    /// # Errors
    ///
    /// Returns `UnknownPlugin` for an unregistered id, or the plugin's error.
    pub async fn configure(&mut self, id: &str, config: Option<toml::Table>) -> Result<()> {
        match &config {
            Some(table) => {
                self.settings
                    .settings
                    .insert(id.to_string(), toml::Value::Table(table.clone()));
            }
            None => {
                self.settings.settings.remove(id);
            }
        }
        self.entry_mut(id)?.plugin.configure(config).await
    }

    /// Load every registered plugin listed in `[plugins] enabled`.
    ///
    /// Failures are logged and skipped. Returns the ids that loaded.
    pub async fn load_enabled(&mut self) -> Vec<&'static str> {
        let ids: Vec<&'static str> = self
            .entries
            .iter()
            .map(|e| e.plugin.info().id)
            .filter(|id| self.settings.is_enabled(id))
            .collect();

        for name in &self.settings.enabled {
            if !ids.contains(&name.as_str()) {
                warn!("Enabled plugin '{}' is not available", name);
            }
        }

        let mut loaded = Vec::new();
        for id in ids {
            if self.load(id).await.is_ok() {
                loaded.push(id);
            }
        }
        loaded
    }

    /// Unload every loaded plugin, in reverse registration order
    pub async fn unload_all(&mut self) {
        let ids: Vec<&'static str> = self.entries.iter().rev().map(|e| e.plugin.info().id).collect();
        for id in ids {
            if let Err(e) = self.unload(id).await {
                warn!("Plugin {} failed to unload: {}", id, e);
            }
        }
    }
}
