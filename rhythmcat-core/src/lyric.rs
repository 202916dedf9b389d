//! Lyric file lookup, lyric events and the current-line tracker.

use crate::config::LyricsConfig;
use crate::error::Result;
use crate::library::{ItemId, ItemMetadata};
use crate::lrc::{LyricLine, Lyrics};
use crate::tags::uri_to_path;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Where a set of lyrics came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricSource {
    /// A file on disk (bound, beside the track or in a search directory)
    Local,
    /// The crawled-lyrics cache
    Cache,
    /// Downloaded just now by the named crawler
    Crawler(String),
}

/// Events published by the lyric fetcher
#[derive(Debug, Clone, PartialEq)]
pub enum LyricEvent {
    Loaded {
        item: ItemId,
        path: Option<PathBuf>,
        source: LyricSource,
        lyrics: Lyrics,
    },
    NotFound {
        item: ItemId,
    },
}

/// File name used for `artist - title.lrc` lookups and downloads
#[must_use]
pub fn lyric_file_name(artist: Option<&str>, title: &str) -> String {
    let clean = |s: &str| s.trim().replace(['/', '\\'], "_");
    match artist.map(str::trim).filter(|a| !a.is_empty()) {
        Some(artist) => format!("{} - {}.lrc", clean(artist), clean(title)),
        None => format!("{}.lrc", clean(title)),
    }
}

/// Read a lyric file; invalid UTF-8 is replaced rather than rejected.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read.
pub fn read_lyric_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Resolves the lyric file for a playlist item
#[derive(Debug, Clone, Default)]
pub struct LyricLocator {
    search_dirs: Vec<PathBuf>,
}

impl LyricLocator {
    #[must_use]
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs }
    }

    /// Search the configured directories followed by the download directory
    #[must_use]
    pub fn from_config(config: &LyricsConfig) -> Self {
        let mut search_dirs = config.search_dirs.clone();
        if !search_dirs.contains(&config.download_dir) {
            search_dirs.push(config.download_dir.clone());
        }
        Self::new(search_dirs)
    }

    /// Candidate paths in lookup order: bound file, `<stem>.lrc` beside the
    /// audio file, then `"<artist> - <title>.lrc"` and `"<title>.lrc"` in each
    /// search directory.
    #[must_use]
    pub fn candidates(&self, metadata: &ItemMetadata) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if let Some(bound) = &metadata.lyric_file {
            paths.push(bound.clone());
        }

        if let Some(audio) = uri_to_path(&metadata.uri) {
            paths.push(audio.with_extension("lrc"));
        }

        let title = metadata.display_title();
        let names = [
            lyric_file_name(metadata.artist.as_deref(), &title),
            lyric_file_name(None, &title),
        ];
        for dir in &self.search_dirs {
            for name in &names {
                let path = dir.join(name);
                if !paths.contains(&path) {
                    paths.push(path);
                }
            }
        }
        paths
    }

    /// First candidate that exists on disk
    #[must_use]
    pub fn locate(&self, metadata: &ItemMetadata) -> Option<PathBuf> {
        self.candidates(metadata).into_iter().find(|p| p.is_file())
    }

    /// Locate and parse; unreadable or unparsable files are skipped with a warning
    #[must_use]
    pub fn load(&self, metadata: &ItemMetadata) -> Option<(PathBuf, Lyrics)> {
        let track_length = (!metadata.length.is_zero()).then_some(metadata.length);
        for path in self.candidates(metadata) {
            if !path.is_file() {
                continue;
            }
            debug!("Trying lyric file {}", path.display());
            match read_lyric_file(&path).and_then(|text| Lyrics::parse(&text, track_length)) {
                Ok(lyrics) => return Some((path, lyrics)),
                Err(e) => warn!("Ignoring lyric file {}: {}", path.display(), e),
            }
        }
        None
    }
}

/// Follows playback position through a set of lyrics and reports line changes
#[derive(Debug, Clone, Default)]
pub struct LyricTracker {
    lyrics: Option<Lyrics>,
    current: Option<usize>,
}

impl LyricTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lyrics(&mut self, lyrics: Option<Lyrics>) {
        self.lyrics = lyrics;
        self.current = None;
    }

    #[must_use]
    pub fn lyrics(&self) -> Option<&Lyrics> {
        self.lyrics.as_ref()
    }

    /// Returns the newly active line when `position` crosses into it
    pub fn update(&mut self, position: Duration) -> Option<&LyricLine> {
        let lyrics = self.lyrics.as_ref()?;
        let index = lyrics.line_index_at(position);
        if index == self.current {
            return None;
        }
        self.current = index;
        index.map(|i| &lyrics.lines[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rhythmcat-lyric-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn metadata(dir: &Path) -> ItemMetadata {
        ItemMetadata {
            title: Some("Song".to_string()),
            artist: Some("Band".to_string()),
            ..ItemMetadata::new(format!("file://{}/music/track.flac", dir.display()))
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(lyric_file_name(Some("AC/DC"), "T.N.T"), "AC_DC - T.N.T.lrc");
        assert_eq!(lyric_file_name(Some("  "), "Solo"), "Solo.lrc");
        assert_eq!(lyric_file_name(None, "Solo"), "Solo.lrc");
    }

    #[test]
    fn test_candidate_order() {
        let dir = temp_dir("order");
        let mut meta = metadata(&dir);
        meta.lyric_file = Some(dir.join("bound.lrc"));
        let locator = LyricLocator::new(vec![dir.join("lyrics")]);
        let candidates = locator.candidates(&meta);
        assert_eq!(candidates[0], dir.join("bound.lrc"));
        assert_eq!(candidates[1], dir.join("music/track.lrc"));
        assert_eq!(candidates[2], dir.join("lyrics/Band - Song.lrc"));
        assert_eq!(candidates[3], dir.join("lyrics/Song.lrc"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_locate_prefers_file_beside_audio() {
        let dir = temp_dir("beside");
        fs::create_dir_all(dir.join("music")).unwrap();
        fs::create_dir_all(dir.join("lyrics")).unwrap();
        fs::write(dir.join("music/track.lrc"), "[00:01.00]beside").unwrap();
        fs::write(dir.join("lyrics/Band - Song.lrc"), "[00:01.00]dir").unwrap();

        let locator = LyricLocator::new(vec![dir.join("lyrics")]);
        let (path, lyrics) = locator.load(&metadata(&dir)).unwrap();
        assert_eq!(path, dir.join("music/track.lrc"));
        assert_eq!(lyrics.lines[0].text, "beside");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_skips_garbage_and_reads_lossy() {
        let dir = temp_dir("lossy");
        fs::create_dir_all(dir.join("lyrics")).unwrap();
        fs::write(dir.join("lyrics/Band - Song.lrc"), "not lyrics at all").unwrap();
        fs::write(dir.join("lyrics/Song.lrc"), b"[00:02.00]caf\xe9").unwrap();

        let locator = LyricLocator::new(vec![dir.join("lyrics")]);
        let (path, lyrics) = locator.load(&metadata(&dir)).unwrap();
        assert_eq!(path, dir.join("lyrics/Song.lrc"));
        assert_eq!(lyrics.lines[0].text, "caf\u{fffd}");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_nothing_found() {
        let dir = temp_dir("none");
        let locator = LyricLocator::new(vec![dir.clone()]);
        assert!(locator.locate(&metadata(&dir)).is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_tracker_reports_line_changes_once() {
        let lyrics = Lyrics::parse("[00:01.00]one\n[00:03.00]two", None).unwrap();
        let mut tracker = LyricTracker::new();
        tracker.set_lyrics(Some(lyrics));

        assert!(tracker.update(Duration::from_millis(500)).is_none());
        assert_eq!(tracker.update(Duration::from_secs(1)).unwrap().text, "one");
        assert!(tracker.update(Duration::from_secs(2)).is_none());
        assert_eq!(tracker.update(Duration::from_secs(3)).unwrap().text, "two");
    }
}
