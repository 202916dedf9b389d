use super::queue;
use super::{
    ActionSender, AudioBackend, PlaybackAction, PlaybackState, PlayerEvent, PlayerSnapshot,
    RandomMode, RepeatMode, TrackInfo,
};
use crate::config::PlayerConfig;
use crate::error::{CoreError, Result};
use crate::library::{ItemId, SharedLibrary};
use crate::time::offset_micros;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Initial player settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerSettings {
    pub volume: f64,
    pub repeat: RepeatMode,
    pub random: RandomMode,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self::from(&PlayerConfig::default())
    }
}

impl From<&PlayerConfig> for PlayerSettings {
    fn from(config: &PlayerConfig) -> Self {
        Self {
            volume: config.volume,
            repeat: config.repeat,
            random: config.random,
        }
    }
}

/// Cloneable control handle for a running [`PlayerEngine`]
#[derive(Debug, Clone)]
pub struct PlayerHandle {
    action_tx: ActionSender,
    event_tx: broadcast::Sender<PlayerEvent>,
    snapshot: Arc<RwLock<PlayerSnapshot>>,
}

impl PlayerHandle {
    /// Queue an action for the engine.
    ///
    /// # Errors
    ///
    /// Returns `PlayerGone` if the engine has shut down.
    pub fn send(&self, action: PlaybackAction) -> Result<()> {
        self.action_tx.send(action).map_err(|_| CoreError::PlayerGone)
    }

    /// Subscribe to player events
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.event_tx.subscribe()
    }

    /// Current player state
    pub async fn snapshot(&self) -> PlayerSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Interpolated playback position
    pub async fn position(&self) -> Duration {
        self.snapshot.read().await.interpolated_position()
    }
}

/// Owns the audio backend and serialises every playback action.
pub struct PlayerEngine {
    library: SharedLibrary,
    backend: Box<dyn AudioBackend>,
    action_rx: mpsc::UnboundedReceiver<PlaybackAction>,
    handle: PlayerHandle,
    rng: StdRng,
}

impl PlayerEngine {
    pub fn new(
        library: SharedLibrary,
        mut backend: Box<dyn AudioBackend>,
        settings: PlayerSettings,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(64);
        backend.connect(action_tx.clone());

        let snapshot = PlayerSnapshot {
            volume: settings.volume.clamp(0.0, 1.0),
            repeat: settings.repeat,
            random: settings.random,
            ..PlayerSnapshot::default()
        };

        Self {
            library,
            backend,
            action_rx,
            handle: PlayerHandle {
                action_tx,
                event_tx,
                snapshot: Arc::new(RwLock::new(snapshot)),
            },
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the shuffle RNG with a seeded one
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[must_use]
    pub fn handle(&self) -> PlayerHandle {
        self.handle.clone()
    }

    /// Process actions until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let volume = self.handle.snapshot.read().await.volume;
        if let Err(e) = self.backend.set_volume(volume) {
            warn!("Failed to apply initial volume: {}", e);
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    debug!("Player engine cancelled");
                    break;
                }
                action = self.action_rx.recv() => {
                    let Some(action) = action else { break };
                    if let Err(e) = self.handle_action(action).await {
                        warn!("Playback action failed: {}", e);
                        self.emit(PlayerEvent::Error { message: e.to_string() });
                    }
                }
            }
        }

        if let Err(e) = self.backend.stop() {
            warn!("Failed to stop backend on shutdown: {}", e);
        }
        info!("Player engine stopped");
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.handle.event_tx.send(event);
    }

    async fn handle_action(&mut self, action: PlaybackAction) -> Result<()> {
        debug!("Playback action: {:?}", action);
        match action {
            PlaybackAction::Play => self.play().await,
            PlaybackAction::Pause => self.pause().await,
            PlaybackAction::PlayPause => {
                if self.handle.snapshot.read().await.is_playing() {
                    self.pause().await
                } else {
                    self.play().await
                }
            }
            PlaybackAction::Stop => self.stop().await,
            PlaybackAction::Next => self.advance(false).await,
            PlaybackAction::EndOfStream => self.advance(true).await,
            PlaybackAction::Previous => self.previous().await,
            PlaybackAction::Seek(delta) => self.seek_relative(delta).await,
            PlaybackAction::SetPosition(position) => self.set_position(position).await,
            PlaybackAction::PlayItem(item) => self.start(item).await,
            PlaybackAction::SetVolume(volume) => self.set_volume(volume).await,
            PlaybackAction::SetRepeat(repeat) => {
                self.handle.snapshot.write().await.repeat = repeat;
                self.emit(PlayerEvent::RepeatChanged { repeat });
                Ok(())
            }
            PlaybackAction::SetRandom(random) => {
                self.handle.snapshot.write().await.random = random;
                self.emit(PlayerEvent::RandomChanged { random });
                Ok(())
            }
            PlaybackAction::UpdatePosition(position) => {
                let mut snapshot = self.handle.snapshot.write().await;
                snapshot.position = position;
                snapshot.updated_at = Instant::now();
                Ok(())
            }
            PlaybackAction::BackendError(message) => {
                warn!("Audio backend reported an error: {}", message);
                self.emit(PlayerEvent::Error { message });
                self.stop().await
            }
        }
    }

    async fn set_state(&mut self, state: PlaybackState) {
        let mut snapshot = self.handle.snapshot.write().await;
        if snapshot.state == state {
            return;
        }
        // Freeze the interpolated position at the transition
        snapshot.position = snapshot.interpolated_position();
        snapshot.updated_at = Instant::now();
        snapshot.state = state;
        drop(snapshot);
        self.emit(PlayerEvent::StateChanged { state });
    }

    async fn play(&mut self) -> Result<()> {
        let state = self.handle.snapshot.read().await.state;
        match state {
            PlaybackState::Playing => Ok(()),
            PlaybackState::Paused => {
                self.backend.play()?;
                self.set_state(PlaybackState::Playing).await;
                Ok(())
            }
            PlaybackState::Stopped => {
                let (current, random) = {
                    let snapshot = self.handle.snapshot.read().await;
                    (snapshot.track.as_ref().map(|t| t.item), snapshot.random)
                };
                let library = self.library.read().await;
                let target = current
                    .filter(|id| library.item(*id).is_some())
                    .or_else(|| {
                        queue::next_item(
                            &library,
                            None,
                            RepeatMode::None,
                            random,
                            &mut self.rng,
                            false,
                        )
                    });
                drop(library);
                match target {
                    Some(item) => self.start(item).await,
                    None => {
                        debug!("Nothing to play");
                        Ok(())
                    }
                }
            }
        }
    }

    async fn pause(&mut self) -> Result<()> {
        if self.handle.snapshot.read().await.is_playing() {
            self.backend.pause()?;
            self.set_state(PlaybackState::Paused).await;
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.backend.stop()?;
        self.set_state(PlaybackState::Stopped).await;
        let mut snapshot = self.handle.snapshot.write().await;
        snapshot.position = Duration::ZERO;
        snapshot.updated_at = Instant::now();
        Ok(())
    }

    /// Load an item into the backend and start playing it
    async fn start(&mut self, item: ItemId) -> Result<()> {
        let track = {
            let library = self.library.read().await;
            let entry = library
                .item(item)
                .ok_or(CoreError::UnknownItem { id: item.get() })?;
            TrackInfo::from_item(entry)
        };

        info!("Playing {} ({})", track.title, track.uri);
        self.backend.set_uri(&track.uri)?;
        self.backend.play()?;

        {
            let mut snapshot = self.handle.snapshot.write().await;
            snapshot.track = Some(track.clone());
            snapshot.position = Duration::ZERO;
            snapshot.updated_at = Instant::now();
        }
        self.emit(PlayerEvent::TrackChanged { track: Some(track) });
        self.set_state(PlaybackState::Playing).await;
        Ok(())
    }

    async fn advance(&mut self, end_of_stream: bool) -> Result<()> {
        let (current, repeat, random) = {
            let snapshot = self.handle.snapshot.read().await;
            (snapshot.track.as_ref().map(|t| t.item), snapshot.repeat, snapshot.random)
        };
        let next = {
            let library = self.library.read().await;
            queue::next_item(&library, current, repeat, random, &mut self.rng, end_of_stream)
        };
        match next {
            Some(item) => self.start(item).await,
            None => {
                debug!("End of play order reached");
                self.stop().await
            }
        }
    }

    async fn previous(&mut self) -> Result<()> {
        let (current, repeat, random) = {
            let snapshot = self.handle.snapshot.read().await;
            (snapshot.track.as_ref().map(|t| t.item), snapshot.repeat, snapshot.random)
        };
        let previous = {
            let library = self.library.read().await;
            queue::previous_item(&library, current, repeat, random, &mut self.rng)
        };
        match previous {
            Some(item) => self.start(item).await,
            None => Ok(()),
        }
    }

    async fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let (position, length) = {
            let snapshot = self.handle.snapshot.read().await;
            let Some(track) = &snapshot.track else {
                return Ok(());
            };
            (snapshot.interpolated_position(), track.length)
        };
        let target = offset_micros(position, delta);
        if !length.is_zero() && target > length {
            return self.advance(false).await;
        }
        self.set_position(target).await
    }

    async fn set_position(&mut self, position: Duration) -> Result<()> {
        {
            let snapshot = self.handle.snapshot.read().await;
            let Some(track) = &snapshot.track else {
                return Ok(());
            };
            if !track.length.is_zero() && position > track.length {
                debug!("Ignoring seek past the end of the track");
                return Ok(());
            }
        }

        self.backend.seek(position)?;
        {
            let mut snapshot = self.handle.snapshot.write().await;
            snapshot.position = position;
            snapshot.updated_at = Instant::now();
        }
        self.emit(PlayerEvent::Seeked { position });
        Ok(())
    }

    async fn set_volume(&mut self, volume: f64) -> Result<()> {
        let volume = volume.clamp(0.0, 1.0);
        self.backend.set_volume(volume)?;
        self.handle.snapshot.write().await.volume = volume;
        self.emit(PlayerEvent::VolumeChanged { volume });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::library::{CatalogKind, ItemKind, ItemMetadata, Library};
    use std::sync::Mutex;

    /// Backend that records every call
    #[derive(Clone, Default)]
    pub(crate) struct RecordingBackend {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl AudioBackend for RecordingBackend {
        fn set_uri(&mut self, uri: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("uri {uri}"));
            Ok(())
        }
        fn play(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("play".into());
            Ok(())
        }
        fn pause(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("pause".into());
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push("stop".into());
            Ok(())
        }
        fn seek(&mut self, position: Duration) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("seek {}", position.as_secs()));
            Ok(())
        }
        fn set_volume(&mut self, volume: f64) -> Result<()> {
            self.calls.lock().unwrap().push(format!("volume {volume}"));
            Ok(())
        }
    }

    fn library() -> (SharedLibrary, Vec<ItemId>) {
        let mut library = Library::new();
        let catalog = library.add_catalog("Default", CatalogKind::Playlist, None);
        let ids = (0..3)
            .map(|i| {
                let metadata = ItemMetadata {
                    title: Some(format!("Track {i}")),
                    length: Duration::from_secs(100),
                    ..ItemMetadata::new(format!("file:///music/{i}.ogg"))
                };
                library
                    .add_item(catalog, ItemKind::Music, metadata, None)
                    .unwrap()
            })
            .collect();
        (library.into_shared(), ids)
    }

    async fn next_event(rx: &mut broadcast::Receiver<PlayerEvent>) -> PlayerEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn spawn(
        library: SharedLibrary,
        backend: RecordingBackend,
    ) -> (PlayerHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        let engine = PlayerEngine::new(library, Box::new(backend), PlayerSettings::default())
            .with_seed(1);
        let handle = engine.handle();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(engine.run(cancel.clone()));
        (handle, cancel, task)
    }

    #[tokio::test]
    async fn test_play_starts_first_item() {
        let (library, ids) = library();
        let backend = RecordingBackend::default();
        let (handle, cancel, task) = spawn(library, backend.clone());
        let mut rx = handle.subscribe();

        handle.send(PlaybackAction::Play).unwrap();
        match next_event(&mut rx).await {
            PlayerEvent::TrackChanged { track: Some(track) } => assert_eq!(track.item, ids[0]),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::StateChanged {
                state: PlaybackState::Playing
            }
        );
        assert!(backend
            .calls
            .lock()
            .unwrap()
            .contains(&"uri file:///music/0.ogg".to_string()));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_play_pause_toggles() {
        let (library, ids) = library();
        let (handle, cancel, task) = spawn(library, RecordingBackend::default());
        let mut rx = handle.subscribe();

        handle.send(PlaybackAction::PlayItem(ids[1])).unwrap();
        let _ = next_event(&mut rx).await;
        let _ = next_event(&mut rx).await;

        handle.send(PlaybackAction::PlayPause).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::StateChanged {
                state: PlaybackState::Paused
            }
        );
        handle.send(PlaybackAction::PlayPause).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::StateChanged {
                state: PlaybackState::Playing
            }
        );
        assert_eq!(
            handle.snapshot().await.track.map(|t| t.item),
            Some(ids[1])
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_of_stream_stops_at_end() {
        let (library, ids) = library();
        let (handle, cancel, task) = spawn(library, RecordingBackend::default());
        let mut rx = handle.subscribe();

        handle.send(PlaybackAction::PlayItem(ids[2])).unwrap();
        let _ = next_event(&mut rx).await;
        let _ = next_event(&mut rx).await;

        handle.send(PlaybackAction::EndOfStream).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::StateChanged {
                state: PlaybackState::Stopped
            }
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_set_position_emits_seeked() {
        let (library, ids) = library();
        let backend = RecordingBackend::default();
        let (handle, cancel, task) = spawn(library, backend.clone());
        let mut rx = handle.subscribe();

        handle.send(PlaybackAction::PlayItem(ids[0])).unwrap();
        let _ = next_event(&mut rx).await;
        let _ = next_event(&mut rx).await;

        handle
            .send(PlaybackAction::SetPosition(Duration::from_secs(42)))
            .unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::Seeked {
                position: Duration::from_secs(42)
            }
        );
        assert!(backend.calls.lock().unwrap().contains(&"seek 42".to_string()));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_volume_is_clamped() {
        let (library, _) = library();
        let (handle, cancel, task) = spawn(library, RecordingBackend::default());
        let mut rx = handle.subscribe();

        handle.send(PlaybackAction::SetVolume(3.0)).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            PlayerEvent::VolumeChanged { volume: 1.0 }
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_item_reports_error() {
        let (library, _) = library();
        let (handle, cancel, task) = spawn(library, RecordingBackend::default());
        let mut rx = handle.subscribe();

        let missing = {
            let mut other = Library::new();
            let c = other.add_catalog("x", CatalogKind::Playlist, None);
            for _ in 0..10 {
                other
                    .add_item(c, ItemKind::Music, ItemMetadata::new("file:///x"), None)
                    .unwrap();
            }
            other
                .add_item(c, ItemKind::Music, ItemMetadata::new("file:///x"), None)
                .unwrap()
        };
        handle.send(PlaybackAction::PlayItem(missing)).unwrap();
        assert!(matches!(next_event(&mut rx).await, PlayerEvent::Error { .. }));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (library, _) = library();
        let (handle, cancel, task) = spawn(library, RecordingBackend::default());
        cancel.cancel();
        task.await.unwrap();
        assert!(matches!(
            handle.send(PlaybackAction::Play),
            Err(CoreError::PlayerGone)
        ));
    }
}
