//! Library and lyric commands of the `rhythmcat` CLI.

use rhythmcat_core::time::format_clock;
use rhythmcat_core::{
    dbfile, tags, CatalogId, CatalogKind, CoreError, ItemId, ItemKind, Library, LyricCache,
    LyricCrawler, LyricEvent, LyricFetcher, LyricLocator, LyricsConfig, Result,
};
use rhythmcat_crawler_ttplayer::TtPlayerCrawler;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Load the library file, or start empty when it does not exist yet
pub fn open_library(path: &Path) -> Result<Library> {
    if path.exists() {
        let library = dbfile::load(path)?;
        debug!(
            "Loaded {} catalog(s) with {} item(s) from {}",
            library.catalog_count(),
            library.item_count(),
            path.display()
        );
        Ok(library)
    } else {
        info!("No library at {}, starting empty", path.display());
        Ok(Library::new())
    }
}

pub fn find_catalog(library: &Library, name: &str) -> Result<CatalogId> {
    library
        .catalog_by_name(name)
        .map(|c| c.id)
        .ok_or_else(|| CoreError::InvalidOperation {
            reason: format!("no catalog named '{name}'"),
        })
}

/// Item at a 1-based position in a catalog
pub fn item_at(library: &Library, catalog: &str, position: usize) -> Result<ItemId> {
    let id = find_catalog(library, catalog)?;
    let items = library.catalog(id).map(|c| c.items()).unwrap_or_default();
    position
        .checked_sub(1)
        .and_then(|i| items.get(i))
        .copied()
        .ok_or_else(|| CoreError::InvalidOperation {
            reason: format!("'{catalog}' has no item {position}"),
        })
}

/// Convert a 1-based CLI position to an index
fn index(position: usize) -> Result<usize> {
    position.checked_sub(1).ok_or_else(|| CoreError::InvalidOperation {
        reason: "positions start at 1".to_string(),
    })
}

pub fn catalog_lines(library: &Library) -> Vec<String> {
    library
        .catalogs()
        .enumerate()
        .map(|(i, c)| {
            let kind = match c.kind {
                CatalogKind::Library => " [library]",
                CatalogKind::Playlist => "",
            };
            format!("{:>3}. {} ({} items){}", i + 1, c.name, c.len(), kind)
        })
        .collect()
}

pub fn item_lines(library: &Library, catalog: &str) -> Result<Vec<String>> {
    let id = find_catalog(library, catalog)?;
    Ok(library
        .items(id)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let meta = &item.metadata;
            let artist = meta.artist.as_deref().unwrap_or("Unknown");
            let rating = if meta.rating > 0.0 {
                format!(" {}", "*".repeat(rating_stars(meta.rating)))
            } else {
                String::new()
            };
            format!(
                "{:>4}. {} - {} [{}]{}",
                i + 1,
                artist,
                meta.display_title(),
                format_clock(meta.length),
                rating
            )
        })
        .collect())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rating_stars(rating: f32) -> usize {
    rating.round().clamp(0.0, 5.0) as usize
}

pub fn add_catalog(library: &mut Library, name: &str, position: Option<usize>) -> Result<()> {
    if library.catalog_by_name(name).is_some() {
        return Err(CoreError::InvalidOperation {
            reason: format!("catalog '{name}' already exists"),
        });
    }
    let position = position.map(index).transpose()?;
    library.add_catalog(name, CatalogKind::Playlist, position);
    Ok(())
}

pub fn remove_catalog(library: &mut Library, name: &str) -> Result<()> {
    let id = find_catalog(library, name)?;
    library.remove_catalog(id)?;
    Ok(())
}

pub fn rename_catalog(library: &mut Library, name: &str, new_name: &str) -> Result<()> {
    let id = find_catalog(library, name)?;
    library.rename_catalog(id, new_name)
}

pub fn move_catalog(library: &mut Library, name: &str, position: usize) -> Result<()> {
    let id = find_catalog(library, name)?;
    library.move_catalog(id, index(position)?)
}

pub fn remove_item(library: &mut Library, catalog: &str, position: usize) -> Result<()> {
    let id = item_at(library, catalog, position)?;
    library.remove_item(id)?;
    Ok(())
}

pub fn move_item(
    library: &mut Library,
    catalog: &str,
    position: usize,
    target: &str,
    target_position: usize,
) -> Result<()> {
    let id = item_at(library, catalog, position)?;
    let target = find_catalog(library, target)?;
    library.move_items(&[id], target, index(target_position)?)
}

/// Audio files under `path`, directories walked recursively in name order
pub fn collect_files(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read {}: {}", path.display(), e);
            return Vec::new();
        }
    };
    let mut children: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    children.sort();
    children.iter().flat_map(|child| collect_files(child)).collect()
}

/// Import files into a catalog; unreadable files are skipped. Returns the
/// number of items added.
pub fn import(library: &mut Library, catalog: &str, paths: &[PathBuf]) -> Result<usize> {
    let id = find_catalog(library, catalog)?;
    let mut added = 0;
    for file in paths.iter().flat_map(|p| collect_files(p)) {
        match tags::read_metadata(&file) {
            Ok(metadata) => {
                if library.find_by_uri(&metadata.uri).is_some() {
                    debug!("{} is already in the library", file.display());
                }
                library.add_item(id, ItemKind::Music, metadata, None)?;
                added += 1;
            }
            Err(e) => warn!("Skipping {}: {}", file.display(), e),
        }
    }
    Ok(added)
}

pub fn bind_lyric(
    library: &mut Library,
    catalog: &str,
    position: usize,
    file: &Path,
    secondary: bool,
) -> Result<()> {
    if !file.is_file() {
        return Err(CoreError::InvalidOperation {
            reason: format!("{} is not a file", file.display()),
        });
    }
    let id = item_at(library, catalog, position)?;
    library.set_lyric_binding(id, Some(file), secondary)
}

/// Timed lyric lines of an item, found on disk
pub fn lyric_lines(
    library: &Library,
    config: &LyricsConfig,
    catalog: &str,
    position: usize,
) -> Result<Option<(PathBuf, Vec<String>)>> {
    let id = item_at(library, catalog, position)?;
    let Some(item) = library.item(id) else {
        return Ok(None);
    };
    let locator = LyricLocator::from_config(config);
    Ok(locator.load(&item.metadata).map(|(path, lyrics)| {
        let lines = lyrics
            .lines
            .iter()
            .map(|line| {
                let millis = line.start.as_millis();
                format!(
                    "[{:02}:{:02}.{:02}] {}",
                    millis / 60_000,
                    millis / 1000 % 60,
                    millis / 10 % 100,
                    line.text
                )
            })
            .collect();
        (path, lines)
    }))
}

/// Open the crawled-lyrics cache and drop expired entries
pub async fn open_cache(config: &LyricsConfig) -> Option<Arc<LyricCache>> {
    if !config.cache_enabled {
        return None;
    }
    match LyricCache::new().await {
        Ok(cache) => {
            match cache.cleanup(config.cache_ttl_days).await {
                Ok(0) => {}
                Ok(removed) => debug!("Removed {} expired cached lyric(s)", removed),
                Err(e) => warn!("Lyric cache cleanup failed: {}", e),
            }
            Some(Arc::new(cache))
        }
        Err(e) => {
            error!("Failed to initialize lyric cache, continuing without it: {}", e);
            None
        }
    }
}

pub fn create_crawlers() -> Vec<Arc<dyn LyricCrawler>> {
    let mut crawlers: Vec<Arc<dyn LyricCrawler>> = Vec::new();
    match TtPlayerCrawler::new() {
        Ok(crawler) => crawlers.push(Arc::new(crawler)),
        Err(e) => warn!("TTPlayer crawler unavailable: {}", e),
    }
    crawlers
}

/// Look up lyrics for an item, downloading them when nothing is on disk.
/// Downloaded files are bound to the item in `library`.
pub async fn fetch_lyric(
    library: Library,
    config: &LyricsConfig,
    catalog: &str,
    position: usize,
) -> Result<(Library, LyricEvent)> {
    let id = item_at(&library, catalog, position)?;
    let shared = library.into_shared();
    let cache = open_cache(config).await;
    let fetcher = LyricFetcher::new(
        Arc::clone(&shared),
        config.clone(),
        cache.clone(),
        create_crawlers(),
        None,
    );
    let event = fetcher.resolve(id, true).await;
    drop(fetcher);

    if let Some(cache) = cache {
        if let Err(e) = cache.checkpoint().await {
            warn!("Lyric cache checkpoint failed: {}", e);
        }
    }
    let library = Arc::try_unwrap(shared)
        .map_err(|_| CoreError::InvalidOperation {
            reason: "library is still shared after the lyric lookup".to_string(),
        })?
        .into_inner();
    Ok((library, event?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhythmcat_core::ItemMetadata;

    fn library() -> Library {
        let mut library = Library::new();
        let default = library.add_catalog("Default", CatalogKind::Playlist, None);
        library.add_catalog("Other", CatalogKind::Playlist, None);
        for name in ["a", "b", "c"] {
            library
                .add_item(
                    default,
                    ItemKind::Music,
                    ItemMetadata {
                        title: Some(name.to_string()),
                        ..ItemMetadata::new(format!("file:///music/{name}.ogg"))
                    },
                    None,
                )
                .unwrap();
        }
        library
    }

    fn titles(library: &Library, catalog: &str) -> Vec<String> {
        let id = find_catalog(library, catalog).unwrap();
        library
            .items(id)
            .unwrap()
            .iter()
            .map(|i| i.metadata.display_title())
            .collect()
    }

    #[test]
    fn test_catalog_commands() {
        let mut library = library();
        add_catalog(&mut library, "First", Some(1)).unwrap();
        assert!(add_catalog(&mut library, "First", None).is_err());
        assert!(catalog_lines(&library)[0].contains("First"));

        move_catalog(&mut library, "First", 3).unwrap();
        assert!(catalog_lines(&library)[2].contains("First"));
        assert!(move_catalog(&mut library, "First", 0).is_err());

        rename_catalog(&mut library, "First", "Last").unwrap();
        remove_catalog(&mut library, "Last").unwrap();
        assert!(find_catalog(&library, "Last").is_err());
        assert!(library.is_consistent());
    }

    #[test]
    fn test_item_commands() {
        let mut library = library();
        assert!(item_at(&library, "Default", 0).is_err());
        assert!(item_at(&library, "Default", 4).is_err());

        move_item(&mut library, "Default", 3, "Other", 1).unwrap();
        assert_eq!(titles(&library, "Default"), vec!["a", "b"]);
        assert_eq!(titles(&library, "Other"), vec!["c"]);

        remove_item(&mut library, "Default", 1).unwrap();
        assert_eq!(titles(&library, "Default"), vec!["b"]);
        assert!(library.is_consistent());

        let lines = item_lines(&library, "Default").unwrap();
        assert_eq!(lines, vec!["   1. Unknown - b [0:00]"]);
    }

    #[test]
    fn test_collect_files_walks_directories() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-app-walk-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("b")).unwrap();
        fs::write(dir.join("b/2.ogg"), b"").unwrap();
        fs::write(dir.join("a.ogg"), b"").unwrap();

        let files = collect_files(&dir);
        assert_eq!(files, vec![dir.join("a.ogg"), dir.join("b/2.ogg")]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_import_skips_unreadable_files() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-app-import-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("noise.ogg"), b"not audio").unwrap();

        let mut library = library();
        assert_eq!(import(&mut library, "Other", &[dir.clone()]).unwrap(), 0);
        assert!(import(&mut library, "Missing", &[dir.clone()]).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bind_and_show_lyrics() {
        let dir = std::env::temp_dir().join(format!("rhythmcat-app-lyric-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("a.lrc");
        fs::write(&file, "[00:01.50]hello\n[01:02.00]world").unwrap();

        let mut library = library();
        assert!(bind_lyric(&mut library, "Default", 1, &dir.join("missing.lrc"), false).is_err());
        bind_lyric(&mut library, "Default", 1, &file, false).unwrap();

        let config = LyricsConfig {
            download_dir: dir.join("downloads"),
            ..LyricsConfig::default()
        };
        let (path, lines) = lyric_lines(&library, &config, "Default", 1).unwrap().unwrap();
        assert_eq!(path, file);
        assert_eq!(lines, vec!["[00:01.50] hello", "[01:02.00] world"]);
        let _ = fs::remove_dir_all(&dir);
    }
}
