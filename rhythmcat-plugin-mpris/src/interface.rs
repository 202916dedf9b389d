use crate::model::{loop_status_action, shuffle_action, SharedModel};
use crate::MprisSettings;
use rhythmcat_core::time::DurationExt;
use rhythmcat_core::{PlaybackAction, PlayerHandle, SharedLibrary};
use std::collections::HashMap;
use tracing::{debug, warn};
use zbus::zvariant::{ObjectPath, OwnedValue};
use zbus::{fdo, interface, SignalContext};

fn send(player: &PlayerHandle, action: PlaybackAction) -> fdo::Result<()> {
    player
        .send(action)
        .map_err(|e| fdo::Error::Failed(e.to_string()))
}

/// `org.mpris.MediaPlayer2`
pub struct RootInterface {
    pub settings: MprisSettings,
}

#[allow(clippy::unused_self)]
#[interface(name = "org.mpris.MediaPlayer2")]
impl RootInterface {
    fn raise(&self) {
        debug!("MPRIS Raise requested; no window to raise");
    }

    fn quit(&self) {
        debug!("MPRIS Quit requested; quitting is not supported");
    }

    #[zbus(property)]
    fn can_quit(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_raise(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn fullscreen(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn can_set_fullscreen(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn has_track_list(&self) -> bool {
        false
    }

    #[zbus(property)]
    fn identity(&self) -> String {
        self.settings.identity.clone()
    }

    #[zbus(property)]
    fn desktop_entry(&self) -> String {
        self.settings.desktop_entry.clone()
    }

    #[zbus(property)]
    fn supported_uri_schemes(&self) -> Vec<String> {
        vec!["file".to_string()]
    }

    #[zbus(property)]
    fn supported_mime_types(&self) -> Vec<String> {
        [
            "audio/mpeg",
            "audio/ogg",
            "audio/flac",
            "audio/x-flac",
            "audio/x-wav",
            "audio/mp4",
            "audio/x-ape",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }
}

/// `org.mpris.MediaPlayer2.Player`
pub struct PlayerInterface {
    pub model: SharedModel,
    pub player: PlayerHandle,
    pub library: SharedLibrary,
}

#[allow(clippy::unused_self)]
#[interface(name = "org.mpris.MediaPlayer2.Player")]
impl PlayerInterface {
    fn next(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Next)
    }

    fn previous(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Previous)
    }

    fn pause(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Pause)
    }

    fn play_pause(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::PlayPause)
    }

    fn stop(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Stop)
    }

    fn play(&self) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Play)
    }

    fn seek(&self, offset: i64) -> fdo::Result<()> {
        send(&self.player, PlaybackAction::Seek(offset))
    }

    async fn set_position(&self, track_id: ObjectPath<'_>, position: i64) -> fdo::Result<()> {
        let action = self
            .model
            .lock()
            .await
            .set_position_action(track_id.as_str(), position);
        match action {
            Some(action) => send(&self.player, action),
            None => Ok(()),
        }
    }

    /// Only URIs already in the library can be opened
    async fn open_uri(&self, uri: String) -> fdo::Result<()> {
        let item = self.library.read().await.find_by_uri(&uri);
        match item {
            Some(item) => send(&self.player, PlaybackAction::PlayItem(item)),
            None => Err(fdo::Error::InvalidArgs(format!("{uri} is not in the library"))),
        }
    }

    #[zbus(signal)]
    pub async fn seeked(ctxt: &SignalContext<'_>, position: i64) -> zbus::Result<()>;

    #[zbus(property)]
    async fn playback_status(&self) -> String {
        self.model.lock().await.playback_status().to_string()
    }

    #[zbus(property)]
    async fn loop_status(&self) -> String {
        self.model.lock().await.loop_status().to_string()
    }

    #[zbus(property)]
    fn set_loop_status(&mut self, status: String) {
        match loop_status_action(&status) {
            Some(action) => {
                if let Err(e) = self.player.send(action) {
                    warn!("Failed to set loop status: {}", e);
                }
            }
            None => warn!("Ignoring unknown loop status {}", status),
        }
    }

    #[zbus(property)]
    fn rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn set_rate(&mut self, rate: f64) {
        debug!("Ignoring playback rate {}", rate);
    }

    #[zbus(property)]
    fn minimum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    fn maximum_rate(&self) -> f64 {
        1.0
    }

    #[zbus(property)]
    async fn shuffle(&self) -> bool {
        self.model.lock().await.shuffle()
    }

    #[zbus(property)]
    fn set_shuffle(&mut self, shuffle: bool) {
        if let Err(e) = self.player.send(shuffle_action(shuffle)) {
            warn!("Failed to set shuffle: {}", e);
        }
    }

    #[zbus(property)]
    async fn metadata(&self) -> HashMap<String, OwnedValue> {
        self.model.lock().await.metadata()
    }

    #[zbus(property)]
    async fn volume(&self) -> f64 {
        self.model.lock().await.volume()
    }

    #[zbus(property)]
    fn set_volume(&mut self, volume: f64) {
        if let Err(e) = self.player.send(PlaybackAction::SetVolume(volume.clamp(0.0, 1.0))) {
            warn!("Failed to set volume: {}", e);
        }
    }

    #[zbus(property(emits_changed_signal = "false"))]
    async fn position(&self) -> i64 {
        self.player.position().await.as_micros_i64()
    }

    #[zbus(property)]
    async fn can_go_next(&self) -> bool {
        self.model.lock().await.has_track()
    }

    #[zbus(property)]
    async fn can_go_previous(&self) -> bool {
        self.model.lock().await.has_track()
    }

    #[zbus(property)]
    async fn can_play(&self) -> bool {
        self.model.lock().await.can_play()
    }

    #[zbus(property)]
    async fn can_pause(&self) -> bool {
        self.model.lock().await.has_track()
    }

    #[zbus(property)]
    async fn can_seek(&self) -> bool {
        self.model.lock().await.can_seek()
    }

    #[zbus(property(emits_changed_signal = "const"))]
    fn can_control(&self) -> bool {
        true
    }
}
