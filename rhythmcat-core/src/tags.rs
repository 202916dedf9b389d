//! Tag import through lofty plus `file://` URI helpers.

use crate::error::{CoreError, Result};
use crate::library::ItemMetadata;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::tag::Accessor;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Read display metadata from an audio file.
///
/// Untagged files get their file stem as title.
///
/// # Errors
///
/// Returns `TagRead` if the file cannot be opened or its format is not
/// recognised.
pub fn read_metadata(path: &Path) -> Result<ItemMetadata> {
    debug!("Reading tags from {}", path.display());
    let uri = file_uri(path)?;

    let tagged_file = lofty::read_from_path(path).map_err(|e| CoreError::TagRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut metadata = ItemMetadata::new(uri);
    metadata.file_type = Some(format!("{:?}", tagged_file.file_type()));
    metadata.length = tagged_file.properties().duration();

    let tag = tagged_file.primary_tag().or_else(|| tagged_file.first_tag());
    if let Some(tag) = tag {
        metadata.title = tag.title().map(Cow::into_owned);
        metadata.artist = tag.artist().map(Cow::into_owned);
        metadata.album = tag.album().map(Cow::into_owned);
        metadata.genre = tag.genre().map(Cow::into_owned);
        metadata.track_number = tag.track();
        metadata.year = tag.year().and_then(|y| i32::try_from(y).ok());
    } else {
        warn!("No tags found in {}, using file name as title", path.display());
    }

    if metadata.title.as_deref().map_or(true, str::is_empty) {
        metadata.title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned());
    }

    Ok(metadata)
}

/// Build a `file://` URI for a local path; relative paths are resolved
/// against the current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be determined.
pub fn file_uri(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .map_err(|()| CoreError::InvalidOperation {
            reason: format!("cannot build a file URI for {}", absolute.display()),
        })
}

/// Local path of a `file://` URI, `None` for other schemes
#[must_use]
pub fn uri_to_path(uri: &str) -> Option<PathBuf> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Decode `%XX` escapes, leaving the input untouched if it is not valid UTF-8
#[must_use]
pub fn percent_decode(text: &str) -> String {
    urlencoding::decode(text).map_or_else(|_| text.to_string(), Cow::into_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_uri_escapes_spaces() {
        let uri = file_uri(Path::new("/music/My Song.flac")).unwrap();
        assert_eq!(uri, "file:///music/My%20Song.flac");
    }

    #[test]
    fn test_uri_to_path() {
        assert_eq!(
            uri_to_path("file:///music/My%20Song.flac"),
            Some(PathBuf::from("/music/My Song.flac"))
        );
        assert_eq!(uri_to_path("http://example.com/a.mp3"), None);
        assert_eq!(uri_to_path("not a uri"), None);
    }

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("a%20b"), "a b");
        assert_eq!(percent_decode("plain"), "plain");
    }

    #[test]
    fn test_read_metadata_missing_file() {
        let result = read_metadata(Path::new("/nonexistent/track.flac"));
        assert!(matches!(result, Err(CoreError::TagRead { .. })));
    }

    #[test]
    fn test_read_metadata_unrecognised_file() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-tags-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("notes.txt");
        std::fs::write(&path, b"not audio").unwrap();

        assert!(read_metadata(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
