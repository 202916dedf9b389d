//! Catalog and playlist database.
//!
//! A [`Library`] is an ordered list of catalogs, each holding an ordered list
//! of playlist items. Items live in one arena keyed by [`ItemId`] and carry a
//! back-reference to the catalog whose list contains them; every mutation
//! below keeps the two in step.

use crate::error::{CoreError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Library shared between the player engine, plugins and the lyric fetcher
pub type SharedLibrary = Arc<RwLock<Library>>;

/// Identifies a catalog within one [`Library`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogId(u64);

/// Identifies a playlist item within one [`Library`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl CatalogId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl ItemId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of catalog, stored as an integer in the database file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogKind {
    Library,
    #[default]
    Playlist,
}

impl CatalogKind {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Library => 0,
            Self::Playlist => 1,
        }
    }

    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Library),
            1 => Some(Self::Playlist),
            _ => None,
        }
    }
}

/// Kind of playlist item, stored as an integer in the database file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemKind {
    Missing,
    #[default]
    Music,
    Cue,
    Remote,
}

impl ItemKind {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Missing => 0,
            Self::Music => 1,
            Self::Cue => 2,
            Self::Remote => 3,
        }
    }

    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Missing),
            1 => Some(Self::Music),
            2 => Some(Self::Cue),
            3 => Some(Self::Remote),
            _ => None,
        }
    }
}

/// Display metadata and file bindings of a playlist item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemMetadata {
    pub uri: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    /// Container/codec description, e.g. "FLAC"
    pub file_type: Option<String>,
    pub length: Duration,
    pub track_number: Option<u32>,
    pub year: Option<i32>,
    /// 0.0 ..= 5.0
    pub rating: f32,
    pub genre: Option<String>,
    pub lyric_file: Option<PathBuf>,
    pub lyric_sec_file: Option<PathBuf>,
    pub album_art_file: Option<PathBuf>,
}

impl ItemMetadata {
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Title if tagged, otherwise the last path segment of the URI
    #[must_use]
    pub fn display_title(&self) -> String {
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            return title.to_string();
        }
        let tail = self.uri.rsplit('/').next().unwrap_or(&self.uri);
        crate::tags::percent_decode(tail)
    }
}

/// A single track entry owned by a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistItem {
    pub id: ItemId,
    /// Back-reference to the owning catalog
    pub catalog: CatalogId,
    pub kind: ItemKind,
    pub metadata: ItemMetadata,
}

/// A named, ordered playlist container
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub id: CatalogId,
    pub name: String,
    pub kind: CatalogKind,
    items: Vec<ItemId>,
}

impl Catalog {
    #[must_use]
    pub fn items(&self) -> &[ItemId] {
        &self.items
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Change notifications emitted by the library
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryEvent {
    CatalogAdded { catalog: CatalogId },
    CatalogRemoved { catalog: CatalogId },
    CatalogChanged { catalog: CatalogId },
    CatalogsReordered,
    ItemAdded { catalog: CatalogId, item: ItemId },
    ItemRemoved { catalog: CatalogId, item: ItemId },
    ItemChanged { item: ItemId },
    ItemsReordered { catalog: CatalogId },
}

/// The catalog/playlist database
#[derive(Debug)]
pub struct Library {
    order: Vec<CatalogId>,
    catalogs: HashMap<CatalogId, Catalog>,
    items: HashMap<ItemId, PlaylistItem>,
    next_id: u64,
    event_tx: broadcast::Sender<LibraryEvent>,
}

impl Default for Library {
    fn default() -> Self {
        Self::new()
    }
}

impl Library {
    #[must_use]
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            order: Vec::new(),
            catalogs: HashMap::new(),
            items: HashMap::new(),
            next_id: 1,
            event_tx,
        }
    }

    /// Wrap into the shared handle used across tasks
    #[must_use]
    pub fn into_shared(self) -> SharedLibrary {
        Arc::new(RwLock::new(self))
    }

    /// Subscribe to library change events
    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: LibraryEvent) {
        let _ = self.event_tx.send(event);
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Catalogs in display order
    pub fn catalogs(&self) -> impl Iterator<Item = &Catalog> {
        self.order.iter().filter_map(|id| self.catalogs.get(id))
    }

    #[must_use]
    pub fn catalog_count(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn catalog(&self, id: CatalogId) -> Option<&Catalog> {
        self.catalogs.get(&id)
    }

    /// Catalog at a display position
    #[must_use]
    pub fn catalog_at(&self, index: usize) -> Option<&Catalog> {
        self.order.get(index).and_then(|id| self.catalogs.get(id))
    }

    #[must_use]
    pub fn catalog_by_name(&self, name: &str) -> Option<&Catalog> {
        self.catalogs().find(|c| c.name == name)
    }

    #[must_use]
    pub fn catalog_index(&self, id: CatalogId) -> Option<usize> {
        self.order.iter().position(|c| *c == id)
    }

    #[must_use]
    pub fn item(&self, id: ItemId) -> Option<&PlaylistItem> {
        self.items.get(&id)
    }

    /// Items of a catalog in display order
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog does not exist.
    pub fn items(&self, catalog: CatalogId) -> Result<Vec<&PlaylistItem>> {
        let catalog = self.require_catalog(catalog)?;
        Ok(catalog
            .items
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect())
    }

    /// All items of the library, catalog by catalog
    pub fn all_items(&self) -> impl Iterator<Item = &PlaylistItem> {
        self.catalogs()
            .flat_map(|c| c.items.iter())
            .filter_map(|id| self.items.get(id))
    }

    fn require_catalog(&self, id: CatalogId) -> Result<&Catalog> {
        self.catalogs
            .get(&id)
            .ok_or(CoreError::UnknownCatalog { id: id.get() })
    }

    fn require_catalog_mut(&mut self, id: CatalogId) -> Result<&mut Catalog> {
        self.catalogs
            .get_mut(&id)
            .ok_or(CoreError::UnknownCatalog { id: id.get() })
    }

    fn require_item_mut(&mut self, id: ItemId) -> Result<&mut PlaylistItem> {
        self.items
            .get_mut(&id)
            .ok_or(CoreError::UnknownItem { id: id.get() })
    }

    /// Add a catalog; `position` past the end (or `None`) appends.
    pub fn add_catalog(
        &mut self,
        name: impl Into<String>,
        kind: CatalogKind,
        position: Option<usize>,
    ) -> CatalogId {
        let id = CatalogId(self.allocate());
        let catalog = Catalog {
            id,
            name: name.into(),
            kind,
            items: Vec::new(),
        };
        debug!("Adding catalog {} ({})", catalog.name, id);
        self.catalogs.insert(id, catalog);
        let index = position.map_or(self.order.len(), |p| p.min(self.order.len()));
        self.order.insert(index, id);
        self.emit(LibraryEvent::CatalogAdded { catalog: id });
        id
    }

    /// Remove a catalog and every item it holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog does not exist.
    pub fn remove_catalog(&mut self, id: CatalogId) -> Result<Catalog> {
        let catalog = self
            .catalogs
            .remove(&id)
            .ok_or(CoreError::UnknownCatalog { id: id.get() })?;
        self.order.retain(|c| *c != id);
        for item in &catalog.items {
            self.items.remove(item);
        }
        debug!("Removed catalog {} with {} items", catalog.name, catalog.items.len());
        self.emit(LibraryEvent::CatalogRemoved { catalog: id });
        Ok(catalog)
    }

    /// # Errors
    ///
    /// Returns an error if the catalog does not exist.
    pub fn rename_catalog(&mut self, id: CatalogId, name: impl Into<String>) -> Result<()> {
        self.require_catalog_mut(id)?.name = name.into();
        self.emit(LibraryEvent::CatalogChanged { catalog: id });
        Ok(())
    }

    /// Move a catalog to a new display position (drag-and-drop in the catalog list).
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog does not exist.
    pub fn move_catalog(&mut self, id: CatalogId, position: usize) -> Result<()> {
        let current = self
            .catalog_index(id)
            .ok_or(CoreError::UnknownCatalog { id: id.get() })?;
        self.order.remove(current);
        let index = position.min(self.order.len());
        self.order.insert(index, id);
        self.emit(LibraryEvent::CatalogsReordered);
        Ok(())
    }

    /// Add an item to a catalog; `position` past the end (or `None`) appends.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog does not exist.
    pub fn add_item(
        &mut self,
        catalog: CatalogId,
        kind: ItemKind,
        metadata: ItemMetadata,
        position: Option<usize>,
    ) -> Result<ItemId> {
        self.require_catalog(catalog)?;
        let id = ItemId(self.allocate());
        self.items.insert(
            id,
            PlaylistItem {
                id,
                catalog,
                kind,
                metadata,
            },
        );
        let list = &mut self.require_catalog_mut(catalog)?.items;
        let index = position.map_or(list.len(), |p| p.min(list.len()));
        list.insert(index, id);
        self.emit(LibraryEvent::ItemAdded { catalog, item: id });
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn remove_item(&mut self, id: ItemId) -> Result<PlaylistItem> {
        let item = self
            .items
            .remove(&id)
            .ok_or(CoreError::UnknownItem { id: id.get() })?;
        if let Some(catalog) = self.catalogs.get_mut(&item.catalog) {
            catalog.items.retain(|i| *i != id);
        }
        self.emit(LibraryEvent::ItemRemoved {
            catalog: item.catalog,
            item: id,
        });
        Ok(item)
    }

    /// Move a block of items to `position` in `target` (drag-and-drop).
    ///
    /// `position` is an index into the target list as it looks before the
    /// move; the moved block keeps its relative order and may come from
    /// several catalogs, including the target itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the target catalog or any item does not exist.
    pub fn move_items(&mut self, ids: &[ItemId], target: CatalogId, position: usize) -> Result<()> {
        self.require_catalog(target)?;

        let mut seen = HashSet::new();
        let block: Vec<ItemId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        for id in &block {
            if !self.items.contains_key(id) {
                return Err(CoreError::UnknownItem { id: id.get() });
            }
        }
        if block.is_empty() {
            return Ok(());
        }

        // Items above the drop point that leave the target shift it up
        let target_list = &self.require_catalog(target)?.items;
        let shift = target_list
            .iter()
            .take(position)
            .filter(|id| seen.contains(*id))
            .count();
        let position = position.min(target_list.len()) - shift.min(position);

        let mut touched = Vec::new();
        for id in &block {
            let source = self.items[id].catalog;
            if let Some(catalog) = self.catalogs.get_mut(&source) {
                catalog.items.retain(|i| i != id);
            }
            if !touched.contains(&source) {
                touched.push(source);
            }
        }

        let list = &mut self.require_catalog_mut(target)?.items;
        let index = position.min(list.len());
        list.splice(index..index, block.iter().copied());

        for id in &block {
            self.require_item_mut(*id)?.catalog = target;
        }

        if !touched.contains(&target) {
            touched.push(target);
        }
        for catalog in touched {
            self.emit(LibraryEvent::ItemsReordered { catalog });
        }
        Ok(())
    }

    /// Replace the metadata of an item, keeping its file bindings if the new
    /// metadata has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn update_metadata(&mut self, id: ItemId, metadata: ItemMetadata) -> Result<()> {
        let item = self.require_item_mut(id)?;
        let mut metadata = metadata;
        if metadata.lyric_file.is_none() {
            metadata.lyric_file = item.metadata.lyric_file.take();
        }
        if metadata.lyric_sec_file.is_none() {
            metadata.lyric_sec_file = item.metadata.lyric_sec_file.take();
        }
        if metadata.album_art_file.is_none() {
            metadata.album_art_file = item.metadata.album_art_file.take();
        }
        item.metadata = metadata;
        self.emit(LibraryEvent::ItemChanged { item: id });
        Ok(())
    }

    /// Bind (or unbind with `None`) a lyric file to an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn set_lyric_binding(
        &mut self,
        id: ItemId,
        path: Option<&Path>,
        secondary: bool,
    ) -> Result<()> {
        let metadata = &mut self.require_item_mut(id)?.metadata;
        let slot = if secondary {
            &mut metadata.lyric_sec_file
        } else {
            &mut metadata.lyric_file
        };
        *slot = path.map(Path::to_path_buf);
        self.emit(LibraryEvent::ItemChanged { item: id });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the item does not exist.
    pub fn set_album_binding(&mut self, id: ItemId, path: Option<&Path>) -> Result<()> {
        self.require_item_mut(id)?.metadata.album_art_file = path.map(Path::to_path_buf);
        self.emit(LibraryEvent::ItemChanged { item: id });
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the item does not exist or the rating is out of range.
    pub fn set_rating(&mut self, id: ItemId, rating: f32) -> Result<()> {
        if !(0.0..=5.0).contains(&rating) {
            return Err(CoreError::InvalidOperation {
                reason: format!("rating {rating} is outside 0..=5"),
            });
        }
        self.require_item_mut(id)?.metadata.rating = rating;
        self.emit(LibraryEvent::ItemChanged { item: id });
        Ok(())
    }

    /// First item (in display order) with this URI
    #[must_use]
    pub fn find_by_uri(&self, uri: &str) -> Option<ItemId> {
        self.all_items().find(|i| i.metadata.uri == uri).map(|i| i.id)
    }

    /// Owning catalog and index of an item
    #[must_use]
    pub fn position_of(&self, id: ItemId) -> Option<(CatalogId, usize)> {
        let item = self.items.get(&id)?;
        let index = self
            .catalogs
            .get(&item.catalog)?
            .items
            .iter()
            .position(|i| *i == id)?;
        Some((item.catalog, index))
    }

    /// Item `offset` places away inside the same catalog
    #[must_use]
    pub fn neighbor(&self, id: ItemId, offset: isize) -> Option<ItemId> {
        let (catalog, index) = self.position_of(id)?;
        let target = index.checked_add_signed(offset)?;
        self.catalogs.get(&catalog)?.items.get(target).copied()
    }

    /// Check the catalog/item back-reference invariant. Used by tests and
    /// after loading a database file.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut listed = 0;
        for catalog in self.catalogs() {
            for id in &catalog.items {
                match self.items.get(id) {
                    Some(item) if item.catalog == catalog.id => listed += 1,
                    _ => return false,
                }
            }
        }
        listed == self.items.len() && self.order.len() == self.catalogs.len()
    }
}
