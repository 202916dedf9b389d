//! Library database file: zlib-compressed XML.
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <rclibdb version="1.9.4">
//!   <playlist name="Default" type="1">
//!     <item type="1" uri="file:///..." title="..." length="183000000000"/>
//!   </playlist>
//! </rclibdb>
//! ```

use crate::error::{CoreError, Result};
use crate::library::{CatalogId, CatalogKind, ItemKind, ItemMetadata, Library};
use crate::time::{from_nanos_i64, DurationExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Version string written into the root element
pub const DB_VERSION: &str = "1.9.4";

const ROOT: &[u8] = b"rclibdb";
const PLAYLIST: &[u8] = b"playlist";
const ITEM: &[u8] = b"item";

/// Serialize the library into the XML document.
///
/// # Errors
///
/// Returns an error if the XML writer fails.
pub fn to_xml(library: &Library) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("rclibdb");
    root.push_attribute(("version", DB_VERSION));
    writer.write_event(Event::Start(root))?;

    for catalog in library.catalogs() {
        let mut playlist = BytesStart::new("playlist");
        playlist.push_attribute(("name", catalog.name.as_str()));
        playlist.push_attribute(("type", catalog.kind.as_i32().to_string().as_str()));
        writer.write_event(Event::Start(playlist))?;

        for id in catalog.items() {
            let Some(item) = library.item(*id) else {
                continue;
            };
            let mut element = BytesStart::new("item");
            for (key, value) in item_attributes(item.kind, &item.metadata) {
                element.push_attribute((key, value.as_str()));
            }
            writer.write_event(Event::Empty(element))?;
        }

        writer.write_event(Event::End(BytesEnd::new("playlist")))?;
    }

    writer.write_event(Event::End(BytesEnd::new("rclibdb")))?;

    String::from_utf8(writer.into_inner()).map_err(|e| CoreError::DbFormat {
        reason: e.to_string(),
    })
}

/// Attribute list of an `<item>`; empty optional values are left out
fn item_attributes(kind: ItemKind, metadata: &ItemMetadata) -> Vec<(&'static str, String)> {
    let mut attributes = vec![
        ("type", kind.as_i32().to_string()),
        ("uri", metadata.uri.clone()),
    ];

    let mut text = |key: &'static str, value: Option<&str>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            attributes.push((key, value.to_string()));
        }
    };
    text("title", metadata.title.as_deref());
    text("artist", metadata.artist.as_deref());
    text("album", metadata.album.as_deref());
    text("ftype", metadata.file_type.as_deref());

    attributes.push(("length", metadata.length.as_nanos_i64().to_string()));
    if let Some(track) = metadata.track_number {
        attributes.push(("tracknum", track.to_string()));
    }
    if let Some(year) = metadata.year {
        attributes.push(("year", year.to_string()));
    }
    if metadata.rating > 0.0 {
        attributes.push(("rating", metadata.rating.to_string()));
    }

    let mut path = |key: &'static str, value: Option<&PathBuf>| {
        if let Some(value) = value {
            attributes.push((key, value.to_string_lossy().into_owned()));
        }
    };
    path("lyricfile", metadata.lyric_file.as_ref());
    path("lyricsecfile", metadata.lyric_sec_file.as_ref());
    path("albumfile", metadata.album_art_file.as_ref());

    if let Some(genre) = metadata.genre.as_deref().filter(|g| !g.is_empty()) {
        attributes.push(("genre", genre.to_string()));
    }
    attributes
}

/// Parse the XML document into a fresh library.
///
/// # Errors
///
/// Returns `DbFormat` if the document is not a library database, or an XML
/// error if it is malformed.
pub fn from_xml(xml: &str) -> Result<Library> {
    let mut reader = Reader::from_str(xml);
    let mut library = Library::new();
    let mut seen_root = false;
    let mut current: Option<CatalogId> = None;

    loop {
        let (element, self_closing) = match reader.read_event()? {
            Event::Start(element) => (element, false),
            Event::Empty(element) => (element, true),
            Event::End(element) => {
                if element.name().as_ref() == PLAYLIST {
                    current = None;
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = element.name();
        match name.as_ref() {
            ROOT => seen_root = true,
            _ if !seen_root => {
                return Err(CoreError::DbFormat {
                    reason: "missing <rclibdb> root element".to_string(),
                });
            }
            PLAYLIST => {
                let attributes = read_attributes(&element)?;
                let name = lookup(&attributes, "name").unwrap_or_default();
                let kind = lookup(&attributes, "type")
                    .and_then(|t| t.parse().ok())
                    .and_then(CatalogKind::from_i32)
                    .unwrap_or_default();
                let id = library.add_catalog(name, kind, None);
                // A self-closing playlist has no children
                current = if self_closing { None } else { Some(id) };
            }
            ITEM => {
                let catalog = current.ok_or_else(|| CoreError::DbFormat {
                    reason: "<item> outside of <playlist>".to_string(),
                })?;
                let attributes = read_attributes(&element)?;
                let (kind, metadata) = parse_item(&attributes);
                library.add_item(catalog, kind, metadata, None)?;
            }
            _ => {}
        }
    }

    if !seen_root {
        return Err(CoreError::DbFormat {
            reason: "missing <rclibdb> root element".to_string(),
        });
    }
    Ok(library)
}

fn read_attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut attributes = Vec::new();
    for attribute in element.attributes() {
        let attribute = attribute.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(attributes)
}

fn lookup(attributes: &[(String, String)], key: &str) -> Option<String> {
    attributes
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

/// Build item metadata from attributes; unknown attributes are ignored
fn parse_item(attributes: &[(String, String)]) -> (ItemKind, ItemMetadata) {
    let mut kind = ItemKind::default();
    let mut metadata = ItemMetadata::default();

    for (key, value) in attributes {
        match key.as_str() {
            "type" => {
                kind = value
                    .parse()
                    .ok()
                    .and_then(ItemKind::from_i32)
                    .unwrap_or_default();
            }
            "uri" => metadata.uri.clone_from(value),
            "title" => metadata.title = Some(value.clone()),
            "artist" => metadata.artist = Some(value.clone()),
            "album" => metadata.album = Some(value.clone()),
            "ftype" => metadata.file_type = Some(value.clone()),
            "length" => metadata.length = value.parse().map(from_nanos_i64).unwrap_or_default(),
            "tracknum" => metadata.track_number = value.parse().ok(),
            "year" => metadata.year = value.parse().ok(),
            "rating" => {
                metadata.rating = value
                    .parse()
                    .ok()
                    .filter(|rating: &f32| rating.is_finite() && (0.0..=5.0).contains(rating))
                    .unwrap_or_default();
            }
            "lyricfile" => metadata.lyric_file = Some(PathBuf::from(value)),
            "lyricsecfile" => metadata.lyric_sec_file = Some(PathBuf::from(value)),
            "albumfile" => metadata.album_art_file = Some(PathBuf::from(value)),
            "genre" => metadata.genre = Some(value.clone()),
            _ => {}
        }
    }
    (kind, metadata)
}

/// Write the library to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if serialisation, compression or the write fails.
pub fn save(library: &Library, path: &Path) -> Result<()> {
    let xml = to_xml(library)?;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, compressed)?;
    info!(
        "Saved {} catalogs / {} items to {}",
        library.catalog_count(),
        library.item_count(),
        path.display()
    );
    Ok(())
}

/// Read a library from `path`.
///
/// # Errors
///
/// Returns an I/O error if the file is missing or not zlib data, or a format
/// error if the XML is not a library database.
pub fn load(path: &Path) -> Result<Library> {
    let compressed = fs::read(path)?;
    let mut xml = String::new();
    ZlibDecoder::new(compressed.as_slice()).read_to_string(&mut xml)?;
    let library = from_xml(&xml)?;
    debug!(
        "Loaded {} catalogs / {} items from {}",
        library.catalog_count(),
        library.item_count(),
        path.display()
    );
    Ok(library)
}
