use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use std::path::Path;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

const SCHEMA_SQL: &str = r"
-- Lyrics fetched by crawlers, keyed by the track they were searched for
CREATE TABLE IF NOT EXISTS crawled_lyrics (
    id INTEGER PRIMARY KEY,
    artist TEXT NOT NULL,
    title TEXT NOT NULL,
    provider TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    content TEXT NOT NULL,
    fetched_at INTEGER NOT NULL,
    UNIQUE(artist, title)
);

CREATE INDEX IF NOT EXISTS idx_crawled_provider ON crawled_lyrics(provider, provider_id);
";

/// Cached crawler result
#[derive(Debug, Clone)]
pub struct CachedLyric {
    pub artist: String,
    pub title: String,
    pub provider: String,
    pub provider_id: String,
    /// Raw LRC text
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

/// SQLite cache of crawled lyrics
pub struct LyricCache {
    conn: Connection,
}

impl LyricCache {
    /// Open the cache at the default location
    ///
    /// # Errors
    ///
    /// Returns an error if the cache database cannot be created or opened.
    pub async fn new() -> Result<Self> {
        Self::open(&crate::paths::lyrics_cache_db_path()).await
    }

    /// Open a cache at a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &Path) -> Result<Self> {
        info!("Opening lyric cache database at {:?}", path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    /// In-memory cache, used when the on-disk cache is disabled
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot initialise the schema.
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA_SQL)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Look up lyrics by artist and title, ignoring case
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, artist: &str, title: &str) -> Result<Option<CachedLyric>> {
        debug!("Looking up cached lyrics for {} - {}", artist, title);
        let artist = artist.to_lowercase();
        let title = title.to_lowercase();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    r"
                    SELECT artist, title, provider, provider_id, content, fetched_at
                    FROM crawled_lyrics
                    WHERE LOWER(artist) = ?1 AND LOWER(title) = ?2
                ",
                )?;
                let result = stmt
                    .query_row(rusqlite::params![artist, title], |row| {
                        Ok(CachedLyric {
                            artist: row.get(0)?,
                            title: row.get(1)?,
                            provider: row.get(2)?,
                            provider_id: row.get(3)?,
                            content: row.get(4)?,
                            fetched_at: DateTime::from_timestamp(row.get::<_, i64>(5)?, 0)
                                .unwrap_or_else(Utc::now),
                        })
                    })
                    .optional()?;
                Ok(result)
            })
            .await
            .map_err(Into::into)
    }

    /// Store (or replace) crawled lyrics for a track
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn store(
        &self,
        artist: &str,
        title: &str,
        provider: &str,
        provider_id: &str,
        content: &str,
    ) -> Result<()> {
        info!(
            "Caching lyrics for {} - {} (provider: {}, id: {})",
            artist, title, provider, provider_id
        );
        let params = (
            artist.to_string(),
            title.to_string(),
            provider.to_string(),
            provider_id.to_string(),
            content.to_string(),
            Utc::now().timestamp(),
        );

        self.conn
            .call(move |conn| {
                conn.execute(
                    r"
                    INSERT INTO crawled_lyrics (artist, title, provider, provider_id, content, fetched_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(artist, title) DO UPDATE SET
                        provider = excluded.provider,
                        provider_id = excluded.provider_id,
                        content = excluded.content,
                        fetched_at = excluded.fetched_at
                ",
                    rusqlite::params![params.0, params.1, params.2, params.3, params.4, params.5],
                )?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }

    /// Delete entries older than the TTL
    ///
    /// # Errors
    ///
    /// Returns an error if the database cleanup fails.
    pub async fn cleanup(&self, ttl_days: u32) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - i64::from(ttl_days) * 24 * 60 * 60;
        self.conn
            .call(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM crawled_lyrics WHERE fetched_at < ?1",
                    rusqlite::params![cutoff],
                )?;
                Ok(deleted)
            })
            .await
            .map_err(Into::into)
    }

    /// Checkpoint WAL for clean shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if the WAL checkpoint fails.
    pub async fn checkpoint(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")?;
                Ok(())
            })
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_get_ignores_case() {
        let cache = LyricCache::in_memory().await.unwrap();
        cache
            .store("Queen", "Bohemian Rhapsody", "ttplayer", "42", "[00:01.00]Is this")
            .await
            .unwrap();

        let hit = cache.get("queen", "BOHEMIAN RHAPSODY").await.unwrap().unwrap();
        assert_eq!(hit.provider, "ttplayer");
        assert_eq!(hit.provider_id, "42");
        assert_eq!(hit.content, "[00:01.00]Is this");

        assert!(cache.get("queen", "other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_replaces_existing() {
        let cache = LyricCache::in_memory().await.unwrap();
        cache.store("a", "t", "p", "1", "old").await.unwrap();
        cache.store("a", "t", "p", "2", "new").await.unwrap();
        let hit = cache.get("a", "t").await.unwrap().unwrap();
        assert_eq!(hit.content, "new");
        assert_eq!(hit.provider_id, "2");
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_entries() {
        let cache = LyricCache::in_memory().await.unwrap();
        cache.store("a", "t", "p", "1", "x").await.unwrap();
        assert_eq!(cache.cleanup(30).await.unwrap(), 0);
        assert!(cache.get("a", "t").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_on_disk_and_checkpoint() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-cache-{}", std::process::id()));
        let path = dir.join("lyrics_cache.db");
        let cache = LyricCache::open(&path).await.unwrap();
        cache.store("a", "t", "p", "1", "x").await.unwrap();
        cache.checkpoint().await.unwrap();
        assert!(path.exists());
        drop(cache);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
