pub mod cache;
pub mod config;
pub mod crawler;
pub mod dbfile;
pub mod dsp;
pub mod error;
pub mod fetcher;
pub mod legacy;
pub mod library;
pub mod lrc;
pub mod lyric;
pub mod paths;
pub mod player;
pub mod plugin;
pub mod tags;
pub mod time;

pub use cache::{CachedLyric, LyricCache};
pub use config::{
    build_config_template, LibraryConfig, LoggingConfig, LyricsConfig, PlayerConfig,
    PluginsConfig, RhythmCatConfig,
};
pub use crawler::{rank_candidates, LyricCandidate, LyricCrawler, LyricQuery};
pub use dsp::{EchoFilter, EchoSettings, KaraokeFilter, KaraokeSettings};
pub use error::{CoreError, Result};
pub use fetcher::LyricFetcher;
pub use library::{
    Catalog, CatalogId, CatalogKind, ItemId, ItemKind, ItemMetadata, Library, LibraryEvent,
    PlaylistItem, SharedLibrary,
};
pub use lrc::{LyricLine, LyricTags, LyricWord, Lyrics};
pub use lyric::{LyricEvent, LyricLocator, LyricSource, LyricTracker};
pub use paths::{
    config_dir, config_path, library_db_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME,
    LIBRARY_DB_FILE_NAME, LYRICS_CACHE_DB_FILE_NAME,
};
pub use player::{
    ActionSender, AudioBackend, PlaybackAction, PlaybackState, PlayerEngine, PlayerEvent,
    PlayerHandle, PlayerSettings, PlayerSnapshot, RandomMode, RepeatMode, TrackInfo,
};
pub use plugin::{Plugin, PluginContext, PluginInfo, PluginManager, PluginStatus};
pub use time::DurationExt;
