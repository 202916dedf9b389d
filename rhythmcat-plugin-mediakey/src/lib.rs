//! Forwards GNOME multimedia keys to the player.

use async_trait::async_trait;
use futures::StreamExt;
use rhythmcat_core::{CoreError, PlaybackAction, PlayerHandle, Plugin, PluginContext, PluginInfo, Result};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::{proxy, Connection};

/// Application name registered with the settings daemon
pub const APP_NAME: &str = "RhythmCat";

const SERVICE: &str = "org.gnome.SettingsDaemon.MediaKeys";
const FALLBACK_SERVICE: &str = "org.gnome.SettingsDaemon";

const INFO: PluginInfo = PluginInfo {
    id: "mediakey",
    name: "Media Key Support",
    version: env!("CARGO_PKG_VERSION"),
    description: "Control the player with the multimedia keys of GNOME",
    author: "RhythmCat Developers",
    homepage: "https://github.com/supercatexpert/RhythmCat2",
};

#[derive(Debug, Error)]
pub enum MediaKeyError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),
}

impl From<MediaKeyError> for CoreError {
    fn from(err: MediaKeyError) -> Self {
        match err {
            MediaKeyError::Dbus(e) => Self::Dbus {
                reason: e.to_string(),
            },
        }
    }
}

#[proxy(
    interface = "org.gnome.SettingsDaemon.MediaKeys",
    default_service = "org.gnome.SettingsDaemon.MediaKeys",
    default_path = "/org/gnome/SettingsDaemon/MediaKeys"
)]
trait MediaKeys {
    fn grab_media_player_keys(&self, application: &str, time: u32) -> zbus::Result<()>;

    fn release_media_player_keys(&self, application: &str) -> zbus::Result<()>;

    #[zbus(signal)]
    fn media_player_key_pressed(&self, application: &str, key: &str) -> zbus::Result<()>;
}

/// Action for a key name sent by the settings daemon
#[must_use]
pub fn key_action(key: &str) -> Option<PlaybackAction> {
    match key {
        "Play" => Some(PlaybackAction::PlayPause),
        "Pause" => Some(PlaybackAction::Pause),
        "Stop" => Some(PlaybackAction::Stop),
        "Previous" => Some(PlaybackAction::Previous),
        "Next" => Some(PlaybackAction::Next),
        _ => None,
    }
}

/// Action for a key press, `None` when it was meant for another application
fn press_action(application: &str, key: &str) -> Option<PlaybackAction> {
    if application != APP_NAME {
        return None;
    }
    key_action(key)
}

fn handle_key(player: &PlayerHandle, application: &str, key: &str) {
    match press_action(application, key) {
        Some(action) => {
            debug!("Media key {} pressed", key);
            if let Err(e) = player.send(action) {
                warn!("Failed to forward media key {}: {}", key, e);
            }
        }
        None => debug!("Ignoring media key {} for {}", key, application),
    }
}

struct Running {
    proxy: MediaKeysProxy<'static>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct MediaKeyPlugin {
    running: Option<Running>,
}

impl MediaKeyPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

async fn grab_from(connection: &Connection, service: &'static str) -> zbus::Result<MediaKeysProxy<'static>> {
    let proxy = MediaKeysProxy::builder(connection)
        .destination(service)?
        .build()
        .await?;
    proxy.grab_media_player_keys(APP_NAME, 0).await?;
    debug!("Grabbed media keys from {}", service);
    Ok(proxy)
}

/// Grab the keys from the current settings daemon, or the older one
async fn grab_keys() -> zbus::Result<MediaKeysProxy<'static>> {
    let connection = Connection::session().await?;
    match grab_from(&connection, SERVICE).await {
        Ok(proxy) => Ok(proxy),
        Err(e) => {
            debug!("{} refused media key grab: {}", SERVICE, e);
            grab_from(&connection, FALLBACK_SERVICE).await
        }
    }
}

async fn listen(proxy: MediaKeysProxy<'static>, player: PlayerHandle, cancel: CancellationToken) {
    let mut presses = match proxy.receive_media_player_key_pressed().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Cannot listen for media keys: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            press = presses.next() => {
                let Some(press) = press else { break };
                match press.args() {
                    Ok(args) => handle_key(&player, args.application(), args.key()),
                    Err(e) => warn!("Malformed media key signal: {}", e),
                }
            }
        }
    }
}

#[async_trait]
impl Plugin for MediaKeyPlugin {
    fn info(&self) -> &PluginInfo {
        &INFO
    }

    async fn load(&mut self, ctx: PluginContext) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let proxy = grab_keys().await.map_err(|e| {
            warn!("Cannot connect to D-Bus: {}", e);
            MediaKeyError::from(e)
        })?;

        let cancel = ctx.cancel.child_token();
        let task = tokio::spawn(listen(proxy.clone(), ctx.player, cancel.clone()));
        info!("Media keys grabbed");
        self.running = Some(Running { proxy, cancel, task });
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!("Media key listener ended abnormally: {}", e);
        }
        if let Err(e) = running.proxy.release_media_player_keys(APP_NAME).await {
            warn!("Failed to release media keys: {}", e);
        }
        info!("Media keys released");
        Ok(())
    }

    async fn configure(&mut self, _config: Option<toml::Table>) -> Result<()> {
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.running.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_action("Play"), Some(PlaybackAction::PlayPause));
        assert_eq!(key_action("Pause"), Some(PlaybackAction::Pause));
        assert_eq!(key_action("Stop"), Some(PlaybackAction::Stop));
        assert_eq!(key_action("Previous"), Some(PlaybackAction::Previous));
        assert_eq!(key_action("Next"), Some(PlaybackAction::Next));
        assert_eq!(key_action("Rewind"), None);
        assert_eq!(key_action("play"), None);
    }

    #[test]
    fn test_presses_for_other_applications_ignored() {
        assert_eq!(press_action("RhythmCat", "Next"), Some(PlaybackAction::Next));
        assert_eq!(press_action("Rhythmbox", "Next"), None);
        assert_eq!(press_action("", "Play"), None);
        assert_eq!(press_action("RhythmCat", "Eject"), None);
    }

    #[test]
    fn test_dbus_failure_converts_to_dbus_error() {
        let err = CoreError::from(MediaKeyError::from(zbus::Error::Failure("no bus".to_string())));
        assert!(matches!(err, CoreError::Dbus { ref reason } if reason.contains("no bus")));
    }
}
