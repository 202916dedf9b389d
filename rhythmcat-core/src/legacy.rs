//! Import of the older JSON playlist database.

use crate::dbfile;
use crate::error::Result;
use crate::library::{CatalogKind, ItemKind, ItemMetadata, Library};
use crate::time::from_nanos_i64;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level JSON document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyDatabase {
    #[serde(default)]
    pub catalogs: Vec<LegacyCatalog>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyCatalog {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<i32>,
    #[serde(default)]
    pub items: Vec<LegacyItem>,
}

/// One playlist entry; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LegacyItem {
    #[serde(rename = "type")]
    pub kind: Option<i32>,
    pub uri: Option<String>,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub ftype: Option<String>,
    /// Nanoseconds
    pub length: Option<i64>,
    pub tracknum: Option<u32>,
    pub year: Option<i32>,
    pub rating: Option<f32>,
    pub lyricfile: Option<String>,
    pub lyricsecfile: Option<String>,
    pub albumfile: Option<String>,
    pub genre: Option<String>,
}

/// Counts reported after a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionReport {
    pub catalogs: usize,
    pub items: usize,
}

impl LegacyDatabase {
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON of this shape.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a library. Items without a URI are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the library rejects an insertion.
    pub fn into_library(self) -> Result<Library> {
        let mut library = Library::new();
        for catalog in self.catalogs {
            let kind = catalog
                .kind
                .and_then(CatalogKind::from_i32)
                .unwrap_or_default();
            let id = library.add_catalog(catalog.name, kind, None);
            for item in catalog.items {
                if let Some((kind, metadata)) = item.into_metadata() {
                    library.add_item(id, kind, metadata, None)?;
                }
            }
        }
        Ok(library)
    }
}

impl LegacyItem {
    fn into_metadata(self) -> Option<(ItemKind, ItemMetadata)> {
        let uri = self.uri.filter(|u| !u.is_empty())?;
        let kind = self.kind.and_then(ItemKind::from_i32).unwrap_or_default();
        let metadata = ItemMetadata {
            uri,
            title: self.title,
            artist: self.artist,
            album: self.album,
            file_type: self.ftype,
            length: self.length.map(from_nanos_i64).unwrap_or_default(),
            track_number: self.tracknum,
            year: self.year,
            rating: self.rating.unwrap_or_default().clamp(0.0, 5.0),
            genre: self.genre,
            lyric_file: self.lyricfile.map(PathBuf::from),
            lyric_sec_file: self.lyricsecfile.map(PathBuf::from),
            album_art_file: self.albumfile.map(PathBuf::from),
        };
        Some((kind, metadata))
    }
}

/// Convert a JSON database into the compressed XML library file.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, or the output
/// cannot be written.
pub fn convert(json_path: &Path, db_path: &Path) -> Result<ConversionReport> {
    let json = fs::read_to_string(json_path)?;
    let library = LegacyDatabase::from_json(&json)?.into_library()?;
    let report = ConversionReport {
        catalogs: library.catalog_count(),
        items: library.item_count(),
    };
    dbfile::save(&library, db_path)?;
    info!(
        "Converted {} -> {} ({} catalogs, {} items)",
        json_path.display(),
        db_path.display(),
        report.catalogs,
        report.items
    );
    Ok(report)
}
