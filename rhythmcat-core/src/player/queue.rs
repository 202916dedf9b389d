//! Next/previous track selection.

use super::{RandomMode, RepeatMode};
use crate::library::{CatalogId, ItemId, Library};
use rand::seq::SliceRandom;
use rand::Rng;

/// Which way to walk the play order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// Item to play after `current`.
///
/// `end_of_stream` distinguishes a track running out (where
/// [`RepeatMode::Single`] replays it) from the user pressing "next".
pub fn next_item<R: Rng + ?Sized>(
    library: &Library,
    current: Option<ItemId>,
    repeat: RepeatMode,
    random: RandomMode,
    rng: &mut R,
    end_of_stream: bool,
) -> Option<ItemId> {
    step(library, current, repeat, random, rng, end_of_stream, Direction::Forward)
}

/// Item to play before `current`.
pub fn previous_item<R: Rng + ?Sized>(
    library: &Library,
    current: Option<ItemId>,
    repeat: RepeatMode,
    random: RandomMode,
    rng: &mut R,
) -> Option<ItemId> {
    step(library, current, repeat, random, rng, false, Direction::Backward)
}

/// First playable item of the library
#[must_use]
pub fn first_item(library: &Library) -> Option<ItemId> {
    library
        .catalogs()
        .find_map(|catalog| catalog.items().first().copied())
}

fn step<R: Rng + ?Sized>(
    library: &Library,
    current: Option<ItemId>,
    repeat: RepeatMode,
    random: RandomMode,
    rng: &mut R,
    end_of_stream: bool,
    direction: Direction,
) -> Option<ItemId> {
    let Some((catalog, _)) = current.and_then(|id| library.position_of(id)) else {
        return match random {
            RandomMode::All => pick_random(&all_ids(library), None, rng),
            _ => first_item(library),
        };
    };
    let current = current?;

    if end_of_stream && repeat == RepeatMode::Single {
        return Some(current);
    }

    match random {
        RandomMode::Single => {
            let ids = library.catalog(catalog)?.items().to_vec();
            return pick_random(&ids, Some(current), rng);
        }
        RandomMode::All => return pick_random(&all_ids(library), Some(current), rng),
        RandomMode::None => {}
    }

    let offset = match direction {
        Direction::Forward => 1,
        Direction::Backward => -1,
    };
    if let Some(neighbor) = library.neighbor(current, offset) {
        return Some(neighbor);
    }

    match repeat {
        RepeatMode::List => edge_of(library, catalog, direction),
        RepeatMode::All => {
            let start = library.catalog_index(catalog)?;
            let count = library.catalog_count();
            // Walk the catalog list (wrapping back to ourselves) for the next non-empty one
            (1..=count).find_map(|step| {
                let index = match direction {
                    Direction::Forward => (start + step) % count,
                    Direction::Backward => (start + count - step % count) % count,
                };
                let next = library.catalog_at(index)?;
                edge_of(library, next.id, direction)
            })
        }
        RepeatMode::None | RepeatMode::Single => None,
    }
}

/// First item when walking forward, last item when walking backward
fn edge_of(library: &Library, catalog: CatalogId, direction: Direction) -> Option<ItemId> {
    let items = library.catalog(catalog)?.items();
    match direction {
        Direction::Forward => items.first().copied(),
        Direction::Backward => items.last().copied(),
    }
}

fn all_ids(library: &Library) -> Vec<ItemId> {
    library.all_items().map(|item| item.id).collect()
}

fn pick_random<R: Rng + ?Sized>(
    ids: &[ItemId],
    avoid: Option<ItemId>,
    rng: &mut R,
) -> Option<ItemId> {
    if ids.len() > 1 {
        let candidates: Vec<ItemId> = ids.iter().copied().filter(|id| Some(*id) != avoid).collect();
        return candidates.choose(rng).copied();
    }
    ids.first().copied()
}
