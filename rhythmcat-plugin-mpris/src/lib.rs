//! MPRIS2 plugin: exposes the player on the session bus as
//! `org.mpris.MediaPlayer2.rhythmcat`.

mod error;
mod interface;
pub mod model;

pub use error::MprisError;
pub use model::{Emission, MprisModel};

use async_trait::async_trait;
use const_format::concatcp;
use interface::{PlayerInterface, RootInterface};
use model::SharedModel;
use rhythmcat_core::{CoreError, Plugin, PluginContext, PluginInfo, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::names::InterfaceName;
use zbus::zvariant::Value;
use zbus::{Connection, SignalContext};

pub const BUS_NAME: &str = "org.mpris.MediaPlayer2.rhythmcat";
pub const OBJECT_PATH: &str = "/org/mpris/MediaPlayer2";
const PLAYER_INTERFACE: &str = "org.mpris.MediaPlayer2.Player";

const DEFAULT_IDENTITY: &str = "RhythmCat";
const DEFAULT_DESKTOP_ENTRY: &str = "rhythmcat";

/// Appended to the generated config file
pub const CONFIG_TEMPLATE: &str = concatcp!(
    "[plugins.mpris]\n",
    "# Name shown by MPRIS clients\n",
    "identity = \"",
    DEFAULT_IDENTITY,
    "\"\n",
    "# Desktop file name without the .desktop suffix\n",
    "desktop_entry = \"",
    DEFAULT_DESKTOP_ENTRY,
    "\"\n"
);

const INFO: PluginInfo = PluginInfo {
    id: "mpris",
    name: "MPRIS2 Support",
    version: env!("CARGO_PKG_VERSION"),
    description: "Control the player through the MPRIS2 D-Bus interface",
    author: "RhythmCat Developers",
    homepage: "https://github.com/supercatexpert/RhythmCat2",
};

/// `[plugins.mpris]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MprisSettings {
    pub identity: String,
    pub desktop_entry: String,
}

impl Default for MprisSettings {
    fn default() -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            desktop_entry: DEFAULT_DESKTOP_ENTRY.to_string(),
        }
    }
}

struct Running {
    connection: Connection,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct MprisPlugin {
    flush_delay: Duration,
    settings: MprisSettings,
    running: Option<Running>,
}

impl MprisPlugin {
    /// `flush_delay` is how long property changes are collected before
    /// one `PropertiesChanged` signal goes out.
    #[must_use]
    pub fn new(flush_delay: Duration) -> Self {
        Self {
            flush_delay,
            settings: MprisSettings::default(),
            running: None,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &MprisSettings {
        &self.settings
    }

    async fn connect(&self, ctx: &PluginContext, model: SharedModel) -> zbus::Result<Connection> {
        zbus::connection::Builder::session()?
            .name(BUS_NAME)?
            .serve_at(
                OBJECT_PATH,
                RootInterface {
                    settings: self.settings.clone(),
                },
            )?
            .serve_at(
                OBJECT_PATH,
                PlayerInterface {
                    model,
                    player: ctx.player.clone(),
                    library: ctx.library.clone(),
                },
            )?
            .build()
            .await
    }
}

/// Send model emissions to the bus until cancelled or the model loop ends
async fn emit_loop(
    connection: Connection,
    model: SharedModel,
    mut emissions: mpsc::UnboundedReceiver<Emission>,
    cancel: CancellationToken,
) {
    let ctxt = match SignalContext::new(&connection, OBJECT_PATH) {
        Ok(ctxt) => ctxt,
        Err(e) => {
            warn!("MPRIS cannot emit signals: {}", e);
            return;
        }
    };

    loop {
        let emission = tokio::select! {
            () = cancel.cancelled() => break,
            emission = emissions.recv() => match emission {
                Some(emission) => emission,
                None => break,
            },
        };

        let result = match emission {
            Emission::Properties(names) => {
                let values: Vec<(&str, Value<'static>)> = {
                    let model = model.lock().await;
                    names
                        .iter()
                        .filter_map(|name| model.value_of(name).map(|value| (*name, value)))
                        .collect()
                };
                let changed: HashMap<&str, &Value<'_>> =
                    values.iter().map(|(name, value)| (*name, value)).collect();
                debug!("MPRIS PropertiesChanged: {:?}", names);
                zbus::fdo::Properties::properties_changed(
                    &ctxt,
                    InterfaceName::from_static_str_unchecked(PLAYER_INTERFACE),
                    &changed,
                    &[],
                )
                .await
            }
            Emission::Seeked(position) => PlayerInterface::seeked(&ctxt, position).await,
        };

        if let Err(e) = result {
            warn!("Failed to emit MPRIS signal: {}", e);
        }
    }
}

#[async_trait]
impl Plugin for MprisPlugin {
    fn info(&self) -> &PluginInfo {
        &INFO
    }

    async fn load(&mut self, ctx: PluginContext) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let snapshot = ctx.player.snapshot().await;
        let has_items = ctx.library.read().await.item_count() > 0;
        let model: SharedModel = Arc::new(Mutex::new(
            MprisModel::from_snapshot(&snapshot).with_library_items(has_items),
        ));

        let connection = self.connect(&ctx, model.clone()).await.map_err(|e| {
            warn!("Cannot connect to D-Bus: {}", e);
            MprisError::from(e)
        })?;

        let cancel = ctx.cancel.child_token();
        let (emission_tx, emission_rx) = mpsc::unbounded_channel();
        let tasks = vec![
            tokio::spawn(model::drive(
                model.clone(),
                ctx.player.subscribe(),
                ctx.library.clone(),
                self.flush_delay,
                cancel.clone(),
                emission_tx,
            )),
            tokio::spawn(emit_loop(connection.clone(), model, emission_rx, cancel.clone())),
        ];

        info!("MPRIS interface registered as {}", BUS_NAME);
        self.running = Some(Running {
            connection,
            cancel,
            tasks,
        });
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        for task in running.tasks {
            if let Err(e) = task.await {
                warn!("MPRIS task ended abnormally: {}", e);
            }
        }
        if let Err(e) = running.connection.release_name(BUS_NAME).await {
            debug!("Failed to release {}: {}", BUS_NAME, e);
        }
        info!("MPRIS interface removed");
        Ok(())
    }

    async fn configure(&mut self, config: Option<toml::Table>) -> Result<()> {
        self.settings = match config {
            Some(table) => toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| CoreError::ConfigInvalid {
                    message: format!("plugins.mpris: {e}"),
                })?,
            None => MprisSettings::default(),
        };
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.running.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(text: &str) -> toml::Table {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_configure() {
        let mut plugin = MprisPlugin::new(Duration::from_millis(50));
        plugin
            .configure(Some(table("identity = \"Cat\"\n")))
            .await
            .unwrap();
        assert_eq!(plugin.settings().identity, "Cat");
        assert_eq!(plugin.settings().desktop_entry, "rhythmcat");

        assert!(plugin
            .configure(Some(table("identity = 3\n")))
            .await
            .is_err());

        plugin.configure(None).await.unwrap();
        assert_eq!(plugin.settings(), &MprisSettings::default());
    }

    #[test]
    fn test_config_template_parses() {
        let parsed: toml::Table = CONFIG_TEMPLATE.parse().unwrap();
        let section = parsed["plugins"]["mpris"].clone();
        let settings: MprisSettings = section.try_into().unwrap();
        assert_eq!(settings, MprisSettings::default());
    }

    #[tokio::test]
    async fn test_unload_when_not_loaded() {
        let mut plugin = MprisPlugin::new(Duration::from_millis(50));
        assert!(!plugin.is_loaded());
        plugin.unload().await.unwrap();
        assert_eq!(plugin.info().id, "mpris");
    }
}
