//! Desktop notification on every track change.

use async_trait::async_trait;
use rhythmcat_core::{
    CoreError, PlayerEvent, PlayerHandle, Plugin, PluginContext, PluginInfo, Result, TrackInfo,
};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::zvariant::Value;
use zbus::{proxy, Connection};

/// Appended to the generated config file
pub const CONFIG_TEMPLATE: &str = r#"[plugins.notify]
# How long a notification stays visible, in milliseconds (-1 = server default)
timeout_ms = 3000
# Icon name or path shown with the notification
icon = "audio-x-generic"
"#;

const APP_NAME: &str = "RhythmCat";

const INFO: PluginInfo = PluginInfo {
    id: "notify",
    name: "Desktop Notification",
    version: env!("CARGO_PKG_VERSION"),
    description: "Show a desktop notification when the track changes",
    author: "RhythmCat Developers",
    homepage: "https://github.com/supercatexpert/RhythmCat2",
};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("D-Bus error: {0}")]
    Dbus(#[from] zbus::Error),
}

impl From<NotifyError> for CoreError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Dbus(e) => Self::Dbus {
                reason: e.to_string(),
            },
        }
    }
}

#[proxy(
    interface = "org.freedesktop.Notifications",
    default_service = "org.freedesktop.Notifications",
    default_path = "/org/freedesktop/Notifications"
)]
trait Notifications {
    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: &[&str],
        hints: &HashMap<&str, &Value<'_>>,
        expire_timeout: i32,
    ) -> zbus::Result<u32>;

    fn get_capabilities(&self) -> zbus::Result<Vec<String>>;
}

/// `[plugins.notify]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub timeout_ms: i32,
    pub icon: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            icon: "audio-x-generic".to_string(),
        }
    }
}

/// Escape text for servers that render body markup
#[must_use]
pub fn escape_markup(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Summary and body for a track
#[must_use]
pub fn format_notification(track: &TrackInfo, markup: bool) -> (String, String) {
    let escape = |text: &str| {
        if markup {
            escape_markup(text)
        } else {
            text.to_string()
        }
    };

    let mut lines = Vec::new();
    if let Some(artist) = track.artist.as_deref().filter(|a| !a.is_empty()) {
        lines.push(format!("Artist: {}", escape(artist)));
    }
    if let Some(album) = track.album.as_deref().filter(|a| !a.is_empty()) {
        lines.push(format!("Album: {}", escape(album)));
    }
    (track.title.clone(), lines.join("\n"))
}

struct Notifier {
    proxy: NotificationsProxy<'static>,
    settings: NotifySettings,
    markup: bool,
    /// Id of the notification currently shown, replaced by the next one
    last_id: u32,
}

impl Notifier {
    async fn show(&mut self, track: &TrackInfo) {
        let (summary, body) = format_notification(track, self.markup);
        let hints = HashMap::new();
        match self
            .proxy
            .notify(
                APP_NAME,
                self.last_id,
                &self.settings.icon,
                &summary,
                &body,
                &[],
                &hints,
                self.settings.timeout_ms,
            )
            .await
        {
            Ok(id) => {
                debug!("Notification {} shown for {}", id, summary);
                self.last_id = id;
            }
            Err(e) => warn!("Failed to show notification: {}", e),
        }
    }

    async fn run(mut self, player: PlayerHandle, cancel: CancellationToken) {
        let mut events = player.subscribe();
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(PlayerEvent::TrackChanged { track: Some(track) }) => self.show(&track).await,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => debug!("Notifier skipped {} player events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    }
}

async fn connect() -> zbus::Result<(NotificationsProxy<'static>, bool)> {
    let connection = Connection::session().await?;
    let proxy = NotificationsProxy::new(&connection).await?;
    let capabilities = proxy.get_capabilities().await?;
    let markup = capabilities.iter().any(|c| c == "body-markup");
    Ok((proxy, markup))
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

#[derive(Default)]
pub struct NotifyPlugin {
    settings: NotifySettings,
    running: Option<Running>,
}

impl NotifyPlugin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn settings(&self) -> &NotifySettings {
        &self.settings
    }
}

#[async_trait]
impl Plugin for NotifyPlugin {
    fn info(&self) -> &PluginInfo {
        &INFO
    }

    async fn load(&mut self, ctx: PluginContext) -> Result<()> {
        if self.running.is_some() {
            return Ok(());
        }

        let (proxy, markup) = connect().await.map_err(|e| {
            warn!("Cannot connect to D-Bus: {}", e);
            NotifyError::from(e)
        })?;

        let notifier = Notifier {
            proxy,
            settings: self.settings.clone(),
            markup,
            last_id: 0,
        };
        let cancel = ctx.cancel.child_token();
        let task = tokio::spawn(notifier.run(ctx.player, cancel.clone()));
        info!("Desktop notifications enabled (markup: {})", markup);
        self.running = Some(Running { cancel, task });
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!("Notifier ended abnormally: {}", e);
        }
        info!("Desktop notifications disabled");
        Ok(())
    }

    /// New settings apply from the next load
    async fn configure(&mut self, config: Option<toml::Table>) -> Result<()> {
        self.settings = match config {
            Some(table) => toml::Value::Table(table)
                .try_into()
                .map_err(|e: toml::de::Error| CoreError::ConfigInvalid {
                    message: format!("plugins.notify: {e}"),
                })?,
            None => NotifySettings::default(),
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
    use rhythmcat_core::{CatalogKind, ItemKind, ItemMetadata, Library};

    #[test]
    fn test_dbus_failure_converts_to_dbus_error() {
        let err = CoreError::from(NotifyError::from(zbus::Error::Failure("no bus".to_string())));
        assert!(matches!(err, CoreError::Dbus { ref reason } if reason.contains("no bus")));
    }

    fn track(metadata: ItemMetadata) -> TrackInfo {
        let mut library = Library::new();
        let catalog = library.add_catalog("Default", CatalogKind::Playlist, None);
        let id = library.add_item(catalog, ItemKind::Music, metadata, None).unwrap();
        TrackInfo::from_item(library.item(id).unwrap())
    }

    #[test]
    fn test_escape_markup() {
        assert_eq!(
            escape_markup("Tom & Jerry <live> \"x\" 'y'"),
            "Tom &amp; Jerry &lt;live&gt; &quot;x&quot; &apos;y&apos;"
        );
        assert_eq!(escape_markup("plain"), "plain");
    }

    #[test]
    fn test_format_with_markup() {
        let track = track(ItemMetadata {
            title: Some("Song".to_string()),
            artist: Some("Simon & Garfunkel".to_string()),
            album: Some("<Best>".to_string()),
            ..ItemMetadata::new("file:///music/song.ogg")
        });
        let (summary, body) = format_notification(&track, true);
        assert_eq!(summary, "Song");
        assert_eq!(body, "Artist: Simon &amp; Garfunkel\nAlbum: &lt;Best&gt;");

        let (_, plain) = format_notification(&track, false);
        assert_eq!(plain, "Artist: Simon & Garfunkel\nAlbum: <Best>");
    }

    #[test]
    fn test_format_falls_back_to_file_name() {
        let track = track(ItemMetadata::new("file:///music/My%20Song.ogg"));
        let (summary, body) = format_notification(&track, true);
        assert!(summary.starts_with("My Song"));
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_configure() {
        let mut plugin = NotifyPlugin::new();
        plugin
            .configure(Some("timeout_ms = -1\n".parse().unwrap()))
            .await
            .unwrap();
        assert_eq!(plugin.settings().timeout_ms, -1);
        assert_eq!(plugin.settings().icon, "audio-x-generic");
        assert!(plugin
            .configure(Some("timeout_ms = \"long\"\n".parse().unwrap()))
            .await
            .is_err());
    }

    #[test]
    fn test_config_template_parses() {
        let parsed: toml::Table = CONFIG_TEMPLATE.parse().unwrap();
        let settings: NotifySettings = parsed["plugins"]["notify"].clone().try_into().unwrap();
        assert_eq!(settings, NotifySettings::default());
    }
}
