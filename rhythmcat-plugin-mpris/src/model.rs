//! Player state as MPRIS sees it, and the loop that coalesces changes.
//!
//! The model is plain data: player events update it and record which
//! properties changed. [`drive`] batches those records so that every change
//! arriving within one flush window goes out as a single
//! `PropertiesChanged` emission.

use rhythmcat_core::time::{from_micros_i64, DurationExt};
use rhythmcat_core::{
    PlaybackAction, PlaybackState, PlayerEvent, PlayerSnapshot, RandomMode, RepeatMode,
    SharedLibrary, TrackInfo,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use zbus::zvariant::{ObjectPath, OwnedValue, Value};

pub type SharedModel = Arc<Mutex<MprisModel>>;

/// Track id reported when nothing is loaded
pub const NO_TRACK: &str = "/org/mpris/MediaPlayer2/TrackList/NoTrack";

const TRACK_PATH_PREFIX: &str = "/org/rhythmcat/track/";

const PLAYBACK_STATUS: &str = "PlaybackStatus";
const LOOP_STATUS: &str = "LoopStatus";
const SHUFFLE: &str = "Shuffle";
const METADATA: &str = "Metadata";
const VOLUME: &str = "Volume";
const CAN_SEEK: &str = "CanSeek";
const CAN_PLAY: &str = "CanPlay";
const CAN_PAUSE: &str = "CanPause";
const CAN_GO_NEXT: &str = "CanGoNext";
const CAN_GO_PREVIOUS: &str = "CanGoPrevious";

const ALL_PROPERTIES: [&str; 10] = [
    PLAYBACK_STATUS,
    LOOP_STATUS,
    SHUFFLE,
    METADATA,
    VOLUME,
    CAN_SEEK,
    CAN_PLAY,
    CAN_PAUSE,
    CAN_GO_NEXT,
    CAN_GO_PREVIOUS,
];

/// Cached `org.mpris.MediaPlayer2.Player` state
#[derive(Debug, Clone)]
pub struct MprisModel {
    state: PlaybackState,
    track: Option<TrackInfo>,
    volume: f64,
    repeat: RepeatMode,
    random: RandomMode,
    /// `Play` without a track starts the first library item
    library_has_items: bool,
    dirty: BTreeSet<&'static str>,
}

impl MprisModel {
    #[must_use]
    pub fn from_snapshot(snapshot: &PlayerSnapshot) -> Self {
        Self {
            state: snapshot.state,
            track: snapshot.track.clone(),
            volume: snapshot.volume,
            repeat: snapshot.repeat,
            random: snapshot.random,
            library_has_items: false,
            dirty: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_library_items(mut self, has_items: bool) -> Self {
        self.library_has_items = has_items;
        self
    }

    /// Record whether the library has anything to play
    pub fn set_library_has_items(&mut self, has_items: bool) {
        let could_play = self.can_play();
        self.library_has_items = has_items;
        if could_play != self.can_play() {
            self.dirty.insert(CAN_PLAY);
        }
    }

    /// Update from a player event.
    ///
    /// Returns the new position in microseconds when the event should be
    /// announced with the `Seeked` signal.
    pub fn apply(&mut self, event: &PlayerEvent) -> Option<i64> {
        match event {
            PlayerEvent::StateChanged { state } => {
                if *state != self.state {
                    self.state = *state;
                    self.dirty.insert(PLAYBACK_STATUS);
                }
            }
            PlayerEvent::TrackChanged { track } => {
                let had_track = self.track.is_some();
                let could_play = self.can_play();
                self.track.clone_from(track);
                self.dirty.insert(METADATA);
                self.dirty.insert(CAN_SEEK);
                if had_track != self.track.is_some() {
                    self.dirty.extend([CAN_PAUSE, CAN_GO_NEXT, CAN_GO_PREVIOUS]);
                }
                if could_play != self.can_play() {
                    self.dirty.insert(CAN_PLAY);
                }
            }
            PlayerEvent::VolumeChanged { volume } => {
                if (*volume - self.volume).abs() > f64::EPSILON {
                    self.volume = *volume;
                    self.dirty.insert(VOLUME);
                }
            }
            PlayerEvent::RepeatChanged { repeat } => {
                if loop_status(*repeat) != loop_status(self.repeat) {
                    self.dirty.insert(LOOP_STATUS);
                }
                self.repeat = *repeat;
            }
            PlayerEvent::RandomChanged { random } => {
                if (*random != RandomMode::None) != self.shuffle() {
                    self.dirty.insert(SHUFFLE);
                }
                self.random = *random;
            }
            PlayerEvent::Seeked { position } => return Some(position.as_micros_i64()),
            PlayerEvent::Error { .. } => {}
        }
        None
    }

    /// Mark every property changed, after events may have been missed
    pub fn mark_all(&mut self) {
        self.dirty.extend(ALL_PROPERTIES);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Drain the names of properties changed since the last call
    pub fn take_dirty(&mut self) -> Vec<&'static str> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }

    #[must_use]
    pub const fn playback_status(&self) -> &'static str {
        match self.state {
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Stopped => "Stopped",
        }
    }

    #[must_use]
    pub const fn loop_status(&self) -> &'static str {
        loop_status(self.repeat)
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.random != RandomMode::None
    }

    #[must_use]
    pub const fn volume(&self) -> f64 {
        self.volume
    }

    #[must_use]
    pub const fn track(&self) -> Option<&TrackInfo> {
        self.track.as_ref()
    }

    #[must_use]
    pub fn can_seek(&self) -> bool {
        self.track.as_ref().is_some_and(|t| !t.length.is_zero())
    }

    #[must_use]
    pub const fn has_track(&self) -> bool {
        self.track.is_some()
    }

    #[must_use]
    pub const fn can_play(&self) -> bool {
        self.track.is_some() || self.library_has_items
    }

    /// D-Bus object path identifying the current track
    #[must_use]
    pub fn track_id(&self) -> String {
        self.track
            .as_ref()
            .map_or_else(|| NO_TRACK.to_string(), |t| format!("{TRACK_PATH_PREFIX}{}", t.item))
    }

    /// `xesam:` / `mpris:` metadata map of the current track
    #[must_use]
    pub fn metadata(&self) -> HashMap<String, OwnedValue> {
        let mut map = HashMap::new();
        let Some(track) = &self.track else {
            insert_path(&mut map, "mpris:trackid", NO_TRACK.to_string());
            return map;
        };

        insert_path(&mut map, "mpris:trackid", self.track_id());
        if !track.length.is_zero() {
            insert(&mut map, "mpris:length", Value::from(track.length.as_micros_i64()));
        }
        insert(&mut map, "xesam:url", Value::from(track.uri.clone()));
        insert(&mut map, "xesam:title", Value::from(track.title.clone()));
        if let Some(artist) = &track.artist {
            insert(&mut map, "xesam:artist", Value::from(vec![artist.clone()]));
        }
        if let Some(album) = &track.album {
            insert(&mut map, "xesam:album", Value::from(album.clone()));
        }
        if let Some(genre) = &track.genre {
            insert(&mut map, "xesam:genre", Value::from(vec![genre.clone()]));
        }
        if let Some(number) = track.track_number {
            insert(&mut map, "xesam:trackNumber", Value::from(i32::try_from(number).unwrap_or(i32::MAX)));
        }
        if track.rating > 0.0 {
            insert(&mut map, "xesam:userRating", Value::from(f64::from(track.rating) / 5.0));
        }
        if let Some(art) = &track.album_art_file {
            if let Ok(uri) = rhythmcat_core::tags::file_uri(art) {
                insert(&mut map, "mpris:artUrl", Value::from(uri));
            }
        }
        map
    }

    /// Current value of a property named in [`Self::take_dirty`]
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<Value<'static>> {
        let value = match name {
            PLAYBACK_STATUS => Value::from(self.playback_status()),
            LOOP_STATUS => Value::from(self.loop_status()),
            SHUFFLE => Value::from(self.shuffle()),
            METADATA => Value::from(self.metadata()),
            VOLUME => Value::from(self.volume),
            CAN_SEEK => Value::from(self.can_seek()),
            CAN_PLAY => Value::from(self.can_play()),
            CAN_PAUSE | CAN_GO_NEXT | CAN_GO_PREVIOUS => Value::from(self.has_track()),
            _ => return None,
        };
        Some(value)
    }

    /// Map a `SetPosition` call; calls naming a track other than the
    /// current one are ignored.
    #[must_use]
    pub fn set_position_action(&self, track_id: &str, position: i64) -> Option<PlaybackAction> {
        let track = self.track.as_ref()?;
        if track_id != self.track_id() || position < 0 {
            debug!("Ignoring SetPosition for stale track {}", track_id);
            return None;
        }
        let position = from_micros_i64(position);
        if !track.length.is_zero() && position > track.length {
            return None;
        }
        Some(PlaybackAction::SetPosition(position))
    }
}

const fn loop_status(repeat: RepeatMode) -> &'static str {
    match repeat {
        RepeatMode::None => "None",
        RepeatMode::Single => "Track",
        RepeatMode::List | RepeatMode::All => "Playlist",
    }
}

/// Map a `LoopStatus` write
#[must_use]
pub fn loop_status_action(status: &str) -> Option<PlaybackAction> {
    let repeat = match status {
        "None" => RepeatMode::None,
        "Track" => RepeatMode::Single,
        "Playlist" => RepeatMode::List,
        _ => return None,
    };
    Some(PlaybackAction::SetRepeat(repeat))
}

/// Map a `Shuffle` write
#[must_use]
pub const fn shuffle_action(shuffle: bool) -> PlaybackAction {
    PlaybackAction::SetRandom(if shuffle { RandomMode::All } else { RandomMode::None })
}

fn insert(map: &mut HashMap<String, OwnedValue>, key: &str, value: Value<'_>) {
    match OwnedValue::try_from(value) {
        Ok(value) => {
            map.insert(key.to_string(), value);
        }
        Err(e) => warn!("Skipping metadata {}: {}", key, e),
    }
}

fn insert_path(map: &mut HashMap<String, OwnedValue>, key: &str, path: String) {
    match ObjectPath::try_from(path) {
        Ok(path) => insert(map, key, Value::from(path)),
        Err(e) => warn!("Skipping metadata {}: {}", key, e),
    }
}

/// What the D-Bus side has to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emission {
    /// One `PropertiesChanged` carrying these properties
    Properties(Vec<&'static str>),
    /// `Seeked(position_us)`
    Seeked(i64),
}

/// Feed player and library events into the model until cancelled.
///
/// The first change after a flush arms a timer of `flush_delay`; everything
/// changed before it fires is emitted together.
pub async fn drive(
    model: SharedModel,
    mut events: broadcast::Receiver<PlayerEvent>,
    library: SharedLibrary,
    flush_delay: Duration,
    cancel: CancellationToken,
    out: mpsc::UnboundedSender<Emission>,
) {
    let mut library_events = library.read().await.subscribe();
    let mut library_open = true;
    refresh_library(&model, &library).await;
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let names = model.lock().await.take_dirty();
                if !names.is_empty() && out.send(Emission::Properties(names)).is_err() {
                    break;
                }
            }
            event = events.recv() => {
                let seeked = match event {
                    Ok(event) => model.lock().await.apply(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("MPRIS missed {} player events, refreshing all properties", missed);
                        model.lock().await.mark_all();
                        None
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Some(position) = seeked {
                    if out.send(Emission::Seeked(position)).is_err() {
                        break;
                    }
                }
            }
            event = library_events.recv(), if library_open => {
                match event {
                    Ok(_) | Err(RecvError::Lagged(_)) => refresh_library(&model, &library).await,
                    Err(RecvError::Closed) => library_open = false,
                }
            }
        }

        if deadline.is_none() && model.lock().await.is_dirty() {
            deadline = Some(Instant::now() + flush_delay);
        }
    }
    debug!("MPRIS model loop stopped");
}

async fn refresh_library(model: &SharedModel, library: &SharedLibrary) {
    let has_items = library.read().await.item_count() > 0;
    model.lock().await.set_library_has_items(has_items);
}
