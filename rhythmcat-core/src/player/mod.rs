//! Playback engine: state, actions, events and the audio backend seam.

mod engine;
pub mod queue;

pub use engine::{PlayerEngine, PlayerHandle, PlayerSettings};

use crate::error::Result;
use crate::library::{CatalogId, ItemId, PlaylistItem};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Transport state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// What happens when a track or catalog ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Stop at the end of the catalog
    #[default]
    None,
    /// Replay the current track when it ends
    Single,
    /// Wrap around inside the current catalog
    List,
    /// Continue into the next catalog, wrapping the catalog list
    All,
}

/// Shuffle scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RandomMode {
    #[default]
    None,
    /// Pick randomly inside the current catalog
    Single,
    /// Pick randomly across the whole library
    All,
}

/// The track currently loaded in the player
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub item: ItemId,
    pub catalog: CatalogId,
    pub uri: String,
    pub title: String,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub track_number: Option<u32>,
    pub length: Duration,
    pub rating: f32,
    pub album_art_file: Option<PathBuf>,
}

impl TrackInfo {
    #[must_use]
    pub fn from_item(item: &PlaylistItem) -> Self {
        let metadata = &item.metadata;
        Self {
            item: item.id,
            catalog: item.catalog,
            uri: metadata.uri.clone(),
            title: metadata.display_title(),
            artist: metadata.artist.clone(),
            album: metadata.album.clone(),
            genre: metadata.genre.clone(),
            track_number: metadata.track_number,
            length: metadata.length,
            rating: metadata.rating,
            album_art_file: metadata.album_art_file.clone(),
        }
    }
}

/// Commands accepted by the engine.
///
/// UI, plugins and the audio backend all talk to the engine through this
/// one channel; the last three variants are backend reports.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Play,
    Pause,
    PlayPause,
    Stop,
    Next,
    Previous,
    /// Relative seek in microseconds
    Seek(i64),
    SetPosition(Duration),
    PlayItem(ItemId),
    SetVolume(f64),
    SetRepeat(RepeatMode),
    SetRandom(RandomMode),
    UpdatePosition(Duration),
    EndOfStream,
    BackendError(String),
}

/// Events broadcast by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged { state: PlaybackState },
    TrackChanged { track: Option<TrackInfo> },
    Seeked { position: Duration },
    VolumeChanged { volume: f64 },
    RepeatChanged { repeat: RepeatMode },
    RandomChanged { random: RandomMode },
    Error { message: String },
}

/// Sender half used by backends to report position, end of stream and errors
pub type ActionSender = mpsc::UnboundedSender<PlaybackAction>;

/// Audio output driven by the engine.
///
/// Implementations are expected to be cheap to call; long-running work
/// (decoding, bus watching) belongs on the backend's own threads, which
/// report back through the [`ActionSender`] passed to [`AudioBackend::connect`].
pub trait AudioBackend: Send {
    /// Hand the backend a channel for its reports. Called once by the engine.
    fn connect(&mut self, _reports: ActionSender) {}

    /// # Errors
    ///
    /// Returns an error if the backend rejects the URI.
    fn set_uri(&mut self, uri: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot start playback.
    fn play(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot pause.
    fn pause(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot stop.
    fn stop(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the seek is rejected.
    fn seek(&mut self, position: Duration) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the volume cannot be applied.
    fn set_volume(&mut self, volume: f64) -> Result<()>;
}

/// Point-in-time view of the player
#[derive(Debug, Clone)]
pub struct PlayerSnapshot {
    pub state: PlaybackState,
    pub track: Option<TrackInfo>,
    /// Position at `updated_at`
    pub position: Duration,
    pub volume: f64,
    pub repeat: RepeatMode,
    pub random: RandomMode,
    pub updated_at: Instant,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            state: PlaybackState::Stopped,
            track: None,
            position: Duration::ZERO,
            volume: 1.0,
            repeat: RepeatMode::None,
            random: RandomMode::None,
            updated_at: Instant::now(),
        }
    }
}

impl PlayerSnapshot {
    /// Position advanced by the time elapsed since the last update while playing
    #[must_use]
    pub fn interpolated_position(&self) -> Duration {
        if self.state != PlaybackState::Playing {
            return self.position;
        }

        let interpolated = self.position + self.updated_at.elapsed();
        match &self.track {
            Some(track) if !track.length.is_zero() => interpolated.min(track.length),
            _ => interpolated,
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(length: Duration) -> TrackInfo {
        let mut library = crate::library::Library::new();
        let catalog = library.add_catalog("c", crate::library::CatalogKind::Playlist, None);
        let metadata = crate::library::ItemMetadata {
            length,
            ..crate::library::ItemMetadata::new("file:///a.ogg")
        };
        let id = library
            .add_item(catalog, crate::library::ItemKind::Music, metadata, None)
            .unwrap();
        TrackInfo::from_item(library.item(id).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn test_interpolated_position_while_playing() {
        let snapshot = PlayerSnapshot {
            state: PlaybackState::Playing,
            track: Some(track(Duration::from_secs(10))),
            position: Duration::from_secs(2),
            updated_at: Instant::now(),
            ..PlayerSnapshot::default()
        };
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(snapshot.interpolated_position(), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(snapshot.interpolated_position(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interpolated_position_paused() {
        let snapshot = PlayerSnapshot {
            state: PlaybackState::Paused,
            position: Duration::from_secs(2),
            ..PlayerSnapshot::default()
        };
        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(snapshot.interpolated_position(), Duration::from_secs(2));
    }

    #[test]
    fn test_track_info_uses_display_title() {
        let info = track(Duration::ZERO);
        assert_eq!(info.title, "a.ogg");
        assert_eq!(info.uri, "file:///a.ogg");
    }

    #[test]
    fn test_modes_deserialize_snake_case() {
        #[derive(Deserialize)]
        struct Modes {
            repeat: RepeatMode,
            random: RandomMode,
        }
        let modes: Modes = toml::from_str("repeat = \"list\"\nrandom = \"all\"\n").unwrap();
        assert_eq!(modes.repeat, RepeatMode::List);
        assert_eq!(modes.random, RandomMode::All);
    }
}
