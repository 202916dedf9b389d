use crate::error::CoreError;
use crate::player::TrackInfo;
use crate::time::DurationExt;
use async_trait::async_trait;
use std::time::Duration;

/// What to search lyrics for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricQuery {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration: Option<Duration>,
}

impl LyricQuery {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration: None,
        }
    }

    #[must_use]
    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    #[must_use]
    pub const fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Query for the track currently playing
    #[must_use]
    pub fn from_track(track: &TrackInfo) -> Self {
        let mut query = Self::new(&track.title, track.artist.clone().unwrap_or_default());
        query.album.clone_from(&track.album);
        if !track.length.is_zero() {
            query.duration = Some(track.length);
        }
        query
    }

    /// Duration in whole seconds, for providers that match on it
    #[must_use]
    pub fn duration_secs(&self) -> Option<u32> {
        self.duration.map(|d| d.as_secs_u32())
    }
}

/// One search hit from a crawler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricCandidate {
    /// Name of the crawler that produced it
    pub provider: String,
    /// Provider-specific id
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Download location, when the provider exposes one
    pub url: Option<String>,
}

/// Trait for lyric crawlers
#[async_trait]
pub trait LyricCrawler: Send + Sync {
    /// Get the crawler name, used in `[lyrics] crawlers`
    fn name(&self) -> &'static str;

    /// Search the provider
    async fn search(&self, query: &LyricQuery) -> Result<Vec<LyricCandidate>, CoreError>;

    /// Download the LRC text of a candidate returned by [`Self::search`]
    async fn download(&self, candidate: &LyricCandidate) -> Result<String, CoreError>;
}

/// Order candidates by how well they match the query.
///
/// Exact artist and title matches (ignoring case and surrounding spaces)
/// come first, then title-only matches, then the rest; the provider's own
/// order is kept within each group.
#[must_use]
pub fn rank_candidates(query: &LyricQuery, mut candidates: Vec<LyricCandidate>) -> Vec<LyricCandidate> {
    let title = normalize(&query.title);
    let artist = normalize(&query.artist);
    candidates.sort_by_key(|candidate| {
        let title_match = normalize(&candidate.title) == title;
        let artist_match = normalize(&candidate.artist) == artist;
        match (title_match, artist_match) {
            (true, true) => 0,
            (true, false) => 1,
            _ => 2,
        }
    });
    candidates
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, title: &str, artist: &str) -> LyricCandidate {
        LyricCandidate {
            provider: "test".to_string(),
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            url: None,
        }
    }

    #[test]
    fn test_rank_exact_first_then_title() {
        let query = LyricQuery::new("Yesterday", "The Beatles");
        let ranked = rank_candidates(
            &query,
            vec![
                candidate("1", "Yesterday Once More", "Carpenters"),
                candidate("2", "yesterday", "Some Cover Band"),
                candidate("3", " Yesterday ", "the beatles"),
                candidate("4", "Yesterday", "Another Cover"),
            ],
        );
        let ids: Vec<_> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "4", "1"]);
    }

    #[test]
    fn test_rank_keeps_order_without_matches() {
        let query = LyricQuery::new("a", "b");
        let ranked = rank_candidates(&query, vec![candidate("x", "c", "d"), candidate("y", "e", "f")]);
        assert_eq!(ranked[0].id, "x");
        assert_eq!(ranked[1].id, "y");
    }

    #[test]
    fn test_query_builder() {
        let query = LyricQuery::new("t", "a")
            .with_album("al")
            .with_duration(Duration::from_millis(185_900));
        assert_eq!(query.album.as_deref(), Some("al"));
        assert_eq!(query.duration_secs(), Some(185));
    }
}
