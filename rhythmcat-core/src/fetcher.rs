//! Lyric fetcher that follows the player and resolves lyrics for each track.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::LyricCache;
use crate::config::LyricsConfig;
use crate::crawler::{rank_candidates, LyricCrawler, LyricQuery};
use crate::error::{CoreError, Result};
use crate::library::{ItemId, ItemMetadata, SharedLibrary};
use crate::lrc::Lyrics;
use crate::lyric::{lyric_file_name, LyricEvent, LyricLocator, LyricSource};
use crate::player::{PlayerEvent, PlayerHandle};

/// Candidates downloaded per crawler before moving on to the next one
const MAX_DOWNLOADS_PER_CRAWLER: usize = 3;

/// Resolves lyrics from disk, the cache and crawlers, in that order
pub struct LyricFetcher {
    library: SharedLibrary,
    locator: LyricLocator,
    cache: Option<Arc<LyricCache>>,
    crawlers: Vec<Arc<dyn LyricCrawler>>,
    config: LyricsConfig,
    event_tx: broadcast::Sender<LyricEvent>,
    cancel_token: CancellationToken,
}

impl LyricFetcher {
    /// Create a new lyric fetcher
    ///
    /// # Arguments
    /// * `library` - Library used for metadata and to bind downloaded files
    /// * `config` - `[lyrics]` settings; `crawlers` selects and orders the crawlers
    /// * `cache` - Crawled-lyrics cache, `None` to disable caching
    /// * `crawlers` - Available crawlers
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    pub fn new(
        library: SharedLibrary,
        config: LyricsConfig,
        cache: Option<Arc<LyricCache>>,
        crawlers: Vec<Arc<dyn LyricCrawler>>,
        cancel_token: Option<CancellationToken>,
    ) -> Self {
        let mut ordered = Vec::new();
        for name in &config.crawlers {
            match crawlers.iter().find(|c| c.name() == name.as_str()) {
                Some(crawler) => ordered.push(Arc::clone(crawler)),
                None => warn!("Lyric crawler '{}' is not available", name),
            }
        }

        let (event_tx, _) = broadcast::channel(16);
        Self {
            library,
            locator: LyricLocator::from_config(&config),
            cache,
            crawlers: ordered,
            config,
            event_tx,
            cancel_token: cancel_token.unwrap_or_default(),
        }
    }

    /// Subscribe to lyric events
    pub fn subscribe(&self) -> broadcast::Receiver<LyricEvent> {
        self.event_tx.subscribe()
    }

    #[must_use]
    pub fn crawler_names(&self) -> Vec<&'static str> {
        self.crawlers.iter().map(|c| c.name()).collect()
    }

    /// Start following the player in a background task
    #[must_use]
    pub fn start(self: Arc<Self>, player: PlayerHandle) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run(player).await;
        })
    }

    async fn run(&self, player: PlayerHandle) {
        info!("Initializing lyric fetching handler");

        let mut rx = player.subscribe();

        if let Some(track) = player.snapshot().await.track {
            self.handle_track(track.item).await;
        }

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Lyric fetcher shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Ok(PlayerEvent::TrackChanged { track: Some(track) }) => {
                            self.handle_track(track.item).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_track(&self, item: ItemId) {
        tokio::select! {
            () = self.cancel_token.cancelled() => {
                debug!("Lyric lookup for item {} cancelled", item.get());
            }
            result = self.resolve(item, self.config.auto_download) => {
                if let Err(e) = result {
                    warn!("Lyric lookup failed: {}", e);
                }
            }
        }
    }

    /// Find lyrics for an item and publish the outcome.
    ///
    /// Crawlers are only consulted when `allow_download` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub async fn resolve(&self, item: ItemId, allow_download: bool) -> Result<LyricEvent> {
        let metadata = self
            .library
            .read()
            .await
            .item(item)
            .map(|i| i.metadata.clone())
            .ok_or(CoreError::UnknownItem { id: item.get() })?;

        let event = match self.find(item, &metadata, allow_download).await {
            Some((path, source, lyrics)) => {
                info!(
                    "Loaded lyrics for {} ({} lines, {:?})",
                    metadata.display_title(),
                    lyrics.lines.len(),
                    source
                );
                LyricEvent::Loaded {
                    item,
                    path,
                    source,
                    lyrics,
                }
            }
            None => {
                info!("No lyrics found for {}", metadata.display_title());
                LyricEvent::NotFound { item }
            }
        };

        let _ = self.event_tx.send(event.clone());
        Ok(event)
    }

    async fn find(
        &self,
        item: ItemId,
        metadata: &ItemMetadata,
        allow_download: bool,
    ) -> Option<(Option<PathBuf>, LyricSource, Lyrics)> {
        if let Some((path, lyrics)) = self.locator.load(metadata) {
            return Some((Some(path), LyricSource::Local, lyrics));
        }

        let title = metadata.display_title();
        let artist = metadata.artist.clone().unwrap_or_default();
        let track_length = (!metadata.length.is_zero()).then_some(metadata.length);

        if let Some(cache) = &self.cache {
            match cache.get(&artist, &title).await {
                Ok(Some(cached)) => match Lyrics::parse(&cached.content, track_length) {
                    Ok(lyrics) => {
                        let path = self.persist(item, metadata, &cached.content).await;
                        return Some((path, LyricSource::Cache, lyrics));
                    }
                    Err(e) => warn!("Cached lyrics for {} are unusable: {}", title, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Lyric cache lookup failed: {}", e),
            }
        }

        if !allow_download {
            return None;
        }

        let mut query = LyricQuery::new(&title, &artist);
        query.album.clone_from(&metadata.album);
        query.duration = track_length;

        for crawler in &self.crawlers {
            if let Some((content, lyrics, provider_id)) = self.crawl(crawler.as_ref(), &query, track_length).await {
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache
                        .store(&artist, &title, crawler.name(), &provider_id, &content)
                        .await
                    {
                        warn!("Failed to cache lyrics: {}", e);
                    }
                }
                let path = self.persist(item, metadata, &content).await;
                return Some((path, LyricSource::Crawler(crawler.name().to_string()), lyrics));
            }
        }
        None
    }

    /// Search one crawler and download its best candidates until one parses
    async fn crawl(
        &self,
        crawler: &dyn LyricCrawler,
        query: &LyricQuery,
        track_length: Option<std::time::Duration>,
    ) -> Option<(String, Lyrics, String)> {
        info!("Trying crawler: {}", crawler.name());
        let candidates = match crawler.search(query).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Crawler {} search failed: {}", crawler.name(), e);
                return None;
            }
        };
        debug!("Crawler {} returned {} candidates", crawler.name(), candidates.len());

        for candidate in rank_candidates(query, candidates)
            .into_iter()
            .take(MAX_DOWNLOADS_PER_CRAWLER)
        {
            match crawler.download(&candidate).await {
                Ok(content) => match Lyrics::parse(&content, track_length) {
                    Ok(lyrics) if !lyrics.is_empty() => {
                        return Some((content, lyrics, candidate.id));
                    }
                    Ok(_) => debug!("Candidate {} has no timed lines", candidate.id),
                    Err(e) => debug!("Candidate {} is not LRC: {}", candidate.id, e),
                },
                Err(e) => warn!("Crawler {} download failed: {}", crawler.name(), e),
            }
        }
        None
    }

    /// Write lyrics into the download directory and bind them to the item
    async fn persist(&self, item: ItemId, metadata: &ItemMetadata, content: &str) -> Option<PathBuf> {
        let name = lyric_file_name(metadata.artist.as_deref(), &metadata.display_title());
        let path = self.config.download_dir.join(name);

        let written = tokio::fs::create_dir_all(&self.config.download_dir).await;
        if let Err(e) = written {
            warn!("Cannot create lyric directory: {}", e);
            return None;
        }
        if let Err(e) = tokio::fs::write(&path, content).await {
            warn!("Cannot write {}: {}", path.display(), e);
            return None;
        }

        if let Err(e) = self
            .library
            .write()
            .await
            .set_lyric_binding(item, Some(&path), false)
        {
            warn!("Cannot bind lyrics to item {}: {}", item, e);
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::LyricCandidate;
    use crate::library::{CatalogKind, ItemKind, Library};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct FakeCrawler {
        searches: AtomicUsize,
        body: &'static str,
    }

    #[async_trait]
    impl LyricCrawler for FakeCrawler {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, query: &LyricQuery) -> std::result::Result<Vec<LyricCandidate>, CoreError> {
            self.searches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![LyricCandidate {
                provider: "fake".to_string(),
                id: "7".to_string(),
                title: query.title.clone(),
                artist: query.artist.clone(),
                url: None,
            }])
        }

        async fn download(&self, _candidate: &LyricCandidate) -> std::result::Result<String, CoreError> {
            Ok(self.body.to_string())
        }
    }

    /// Never answers a search
    struct StalledCrawler {
        started: Notify,
    }

    #[async_trait]
    impl LyricCrawler for StalledCrawler {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn search(&self, _query: &LyricQuery) -> std::result::Result<Vec<LyricCandidate>, CoreError> {
            self.started.notify_one();
            std::future::pending().await
        }

        async fn download(&self, _candidate: &LyricCandidate) -> std::result::Result<String, CoreError> {
            std::future::pending().await
        }
    }

    fn setup(name: &str) -> (SharedLibrary, ItemId, LyricsConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("rhythmcat-fetcher-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut library = Library::new();
        let catalog = library.add_catalog("c", CatalogKind::Playlist, None);
        let metadata = ItemMetadata {
            title: Some("Song".to_string()),
            artist: Some("Band".to_string()),
            ..ItemMetadata::new(format!("file://{}/track.ogg", dir.display()))
        };
        let item = library
            .add_item(catalog, ItemKind::Music, metadata, None)
            .unwrap();
        let config = LyricsConfig {
            search_dirs: Vec::new(),
            download_dir: dir.join("lyrics"),
            crawlers: vec!["fake".to_string(), "missing".to_string()],
            ..LyricsConfig::default()
        };
        (library.into_shared(), item, config, dir)
    }

    #[tokio::test]
    async fn test_crawled_lyrics_are_saved_bound_and_cached() {
        let (library, item, config, dir) = setup("crawl");
        let crawler = Arc::new(FakeCrawler {
            searches: AtomicUsize::new(0),
            body: "[00:01.00]la la",
        });
        let cache = Arc::new(LyricCache::in_memory().await.unwrap());
        let fetcher = LyricFetcher::new(
            Arc::clone(&library),
            config,
            Some(Arc::clone(&cache)),
            vec![crawler.clone() as Arc<dyn LyricCrawler>],
            None,
        );
        assert_eq!(fetcher.crawler_names(), vec!["fake"]);
        let mut rx = fetcher.subscribe();

        let event = fetcher.resolve(item, true).await.unwrap();
        let LyricEvent::Loaded { path, source, lyrics, .. } = event else {
            panic!("expected lyrics");
        };
        assert_eq!(source, LyricSource::Crawler("fake".to_string()));
        assert_eq!(lyrics.lines[0].text, "la la");
        let path = path.unwrap();
        assert_eq!(path, dir.join("lyrics/Band - Song.lrc"));
        assert!(path.is_file());
        assert_eq!(
            library.read().await.item(item).unwrap().metadata.lyric_file,
            Some(path)
        );
        assert!(cache.get("Band", "Song").await.unwrap().is_some());
        assert!(matches!(rx.recv().await.unwrap(), LyricEvent::Loaded { .. }));

        // Second lookup finds the bound file without searching again
        let again = fetcher.resolve(item, true).await.unwrap();
        assert!(matches!(again, LyricEvent::Loaded { source: LyricSource::Local, .. }));
        assert_eq!(crawler.searches.load(Ordering::SeqCst), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_download_disabled_reports_not_found() {
        let (library, item, config, dir) = setup("nodownload");
        let crawler = Arc::new(FakeCrawler {
            searches: AtomicUsize::new(0),
            body: "[00:01.00]x",
        });
        let fetcher = LyricFetcher::new(library, config, None, vec![crawler.clone() as Arc<dyn LyricCrawler>], None);

        let event = fetcher.resolve(item, false).await.unwrap();
        assert_eq!(event, LyricEvent::NotFound { item });
        assert_eq!(crawler.searches.load(Ordering::SeqCst), 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unparsable_download_is_not_found() {
        let (library, item, config, dir) = setup("garbage");
        let crawler = Arc::new(FakeCrawler {
            searches: AtomicUsize::new(0),
            body: "<html>rate limited</html>",
        });
        let fetcher = LyricFetcher::new(library, config, None, vec![crawler as Arc<dyn LyricCrawler>], None);
        let event = fetcher.resolve(item, true).await.unwrap();
        assert_eq!(event, LyricEvent::NotFound { item });
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let (library, _, config, _) = setup("unknown");
        let fetcher = LyricFetcher::new(library, config, None, Vec::new(), None);
        let missing = {
            let mut other = Library::new();
            let c = other.add_catalog("x", CatalogKind::Playlist, None);
            for _ in 0..5 {
                other.add_item(c, ItemKind::Music, ItemMetadata::new("file:///x"), None).unwrap();
            }
            other.add_item(c, ItemKind::Music, ItemMetadata::new("file:///y"), None).unwrap()
        };
        assert!(matches!(
            fetcher.resolve(missing, true).await,
            Err(CoreError::UnknownItem { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_crawl() {
        let (library, item, config, dir) = setup("cancel");
        let crawler = Arc::new(StalledCrawler { started: Notify::new() });
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(LyricFetcher::new(
            library,
            LyricsConfig {
                auto_download: true,
                ..config
            },
            None,
            vec![crawler.clone() as Arc<dyn LyricCrawler>],
            Some(cancel.clone()),
        ));

        let task = {
            let fetcher = Arc::clone(&fetcher);
            tokio::spawn(async move { fetcher.handle_track(item).await })
        };
        crawler.started.notified().await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }
}
