//! Headless player: audio backend, lyric fetcher and plugins until Ctrl+C.

use crate::commands::{create_crawlers, open_cache};
use crate::gst_backend::GstBackend;
use rhythmcat_core::{
    dbfile, Library, LyricEvent, LyricFetcher, LyricTracker, PlaybackAction, PlayerEngine,
    PlayerHandle, PlayerSettings, PluginManager, Result, RhythmCatConfig, SharedLibrary,
};
use rhythmcat_plugin_mediakey::MediaKeyPlugin;
use rhythmcat_plugin_mpris::MprisPlugin;
use rhythmcat_plugin_notify::NotifyPlugin;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LOG_TARGET_LYRICS: &str = "rhythmcat::lyrics";

/// How often the current lyric line is checked against the position
const LYRIC_TICK: Duration = Duration::from_millis(200);

/// Log lyric lookups and the current line while playing
async fn follow_lyrics(fetcher: Arc<LyricFetcher>, player: PlayerHandle, cancel: CancellationToken) {
    let mut events = fetcher.subscribe();
    let mut tracker = LyricTracker::new();
    let mut tick = tokio::time::interval(LYRIC_TICK);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(LyricEvent::Loaded { source, lyrics, .. }) => {
                    info!(
                        target: LOG_TARGET_LYRICS,
                        "Lyrics loaded from {:?}: {} lines",
                        source,
                        lyrics.lines.len()
                    );
                    tracker.set_lyrics(Some(lyrics));
                }
                Ok(LyricEvent::NotFound { .. }) => {
                    info!(target: LOG_TARGET_LYRICS, "No lyrics found for current track");
                    tracker.set_lyrics(None);
                }
                Err(RecvError::Lagged(n)) => debug!("Missed {} lyric events", n),
                Err(RecvError::Closed) => break,
            },
            _ = tick.tick() => {
                if tracker.lyrics().is_none() {
                    continue;
                }
                let position = player.position().await;
                if let Some(line) = tracker.update(position) {
                    info!(target: LOG_TARGET_LYRICS, "{}", line.text);
                }
            }
        }
    }
}

async fn save_library(library: &SharedLibrary, path: &Path) {
    let library = library.read().await;
    match dbfile::save(&library, path) {
        Ok(()) => info!("Saved library to {}", path.display()),
        Err(e) => error!("Failed to save library: {}", e),
    }
}

/// Run the player until Ctrl+C.
///
/// # Errors
///
/// Returns an error if the audio backend cannot be created.
pub async fn run(config: RhythmCatConfig, library: Library, db_path: &Path) -> Result<()> {
    let backend = GstBackend::new()?;
    let library = library.into_shared();

    let cancel_token = CancellationToken::new();
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    let engine = PlayerEngine::new(
        library.clone(),
        Box::new(backend),
        PlayerSettings::from(&config.player),
    );
    let player = engine.handle();
    let engine_task = tokio::spawn(engine.run(cancel_token.child_token()));

    let cache = open_cache(&config.lyrics).await;
    let crawlers = create_crawlers();
    let fetcher = Arc::new(LyricFetcher::new(
        library.clone(),
        config.lyrics.clone(),
        cache.clone(),
        crawlers,
        Some(cancel_token.clone()),
    ));
    info!("Lyric crawlers: {:?}", fetcher.crawler_names());
    let lyrics_task = tokio::spawn(follow_lyrics(
        Arc::clone(&fetcher),
        player.clone(),
        cancel_token.clone(),
    ));
    let fetcher_task = Arc::clone(&fetcher).start(player.clone());

    let mut plugins = PluginManager::new(player.clone(), library.clone(), config.plugins.clone());
    let registered = plugins
        .register(Box::new(MprisPlugin::new(Duration::from_millis(
            config.player.flush_delay_ms,
        ))))
        .and_then(|()| plugins.register(Box::new(MediaKeyPlugin::new())))
        .and_then(|()| plugins.register(Box::new(NotifyPlugin::new())));
    if let Err(e) = registered {
        warn!("Plugin registration failed: {}", e);
    }
    let loaded = plugins.load_enabled().await;
    info!("Loaded {} plugin(s): {:?}", loaded.len(), loaded);

    if config.player.auto_play {
        if let Err(e) = player.send(PlaybackAction::Play) {
            warn!("Auto play failed: {}", e);
        }
    }

    info!("RhythmCat is running, press Ctrl+C to quit");
    cancel_token.cancelled().await;

    plugins.unload_all().await;
    for (name, task) in [
        ("player engine", engine_task),
        ("lyric fetcher", fetcher_task),
        ("lyric follower", lyrics_task),
    ] {
        if let Err(e) = task.await {
            warn!("{} ended abnormally: {}", name, e);
        }
    }

    if let Some(cache) = cache {
        if let Err(e) = cache.checkpoint().await {
            warn!("Lyric cache checkpoint failed: {}", e);
        }
    }
    if config.library.autosave {
        save_library(&library, db_path).await;
    }
    Ok(())
}
