// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tombstones and graph repair
//!
//! Deletion is logical: the document keeps its slot, its tombstone byte goes
//! to 1, and the slot joins the in-memory [`DeletedSet`] for O(1) checks
//! during traversal. Slots are only physically reclaimed by a vacuum rebuild.
//!
//! Repair is eager: the moment a slot is tombstoned, every back-reference to
//! it is removed from its neighbours' lists and its own lists are reset, so
//! no neighbour list ever names a dead slot (searches additionally re-check
//! the tombstone at visit time, which covers edits a crash left unfinished).

use std::collections::HashSet;
use tracing::debug;

use crate::hnsw::{MAX_M, iter_list};
use crate::layout::{NO_SLOT, StoreFile};
use smallvec::SmallVec;

/// In-memory set of tombstoned slots, rebuilt from the tombstone section on
/// open.
#[derive(Debug, Default)]
pub struct DeletedSet {
    slots: HashSet<u32>,
}

impl DeletedSet {
    pub fn new() -> Self {
        Self {
            slots: HashSet::new(),
        }
    }

    /// Scan the tombstone section for occupied slots.
    pub fn rebuild(store: &StoreFile) -> Self {
        let mut slots = HashSet::new();
        for slot in 0..store.header.count as u32 {
            if store.tombstone(slot) {
                slots.insert(slot);
            }
        }
        Self { slots }
    }

    #[inline]
    pub fn contains(&self, slot: u32) -> bool {
        self.slots.contains(&slot)
    }

    pub fn insert(&mut self, slot: u32) -> bool {
        self.slots.insert(slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().copied()
    }
}

/// Remove every graph edge touching `slot`, at every layer.
///
/// Back-references are dropped first (shift-left, `-1` tail fill), then the
/// slot's own list is reset, matching the crash-ordering contract: the
/// tombstone byte is already on disk by the time this runs, so a partial
/// rewiring only costs searches a few wasted visits.
pub(crate) fn unlink_slot(store: &mut StoreFile, slot: u32) {
    let max_layers = store.layout().max_layers;
    let mut dropped_edges = 0usize;

    for layer in 0..max_layers {
        let neighbors: SmallVec<[u32; MAX_M]> = iter_list(store.neighbors(slot, layer)).collect();
        for &neighbor in &neighbors {
            let mut list: SmallVec<[i32; MAX_M]> = iter_list(store.neighbors(neighbor, layer))
                .map(|n| n as i32)
                .collect();
            let before = list.len();
            list.retain(|&mut n| n != slot as i32);
            if list.len() != before {
                store.write_neighbors(neighbor, layer, &list);
                dropped_edges += before - list.len();
            }
        }
        store.write_neighbors(slot, layer, &[]);
    }

    debug!(slot, dropped_edges, "unlinked tombstoned slot from graph");
}

/// Pick a replacement entry point after the current one was tombstoned:
/// the first live slot, recorded at level 0. Subsequent inserts that land on
/// a higher layer will promote themselves through the normal insert rule.
pub(crate) fn select_entry_after_delete(store: &StoreFile, deleted: &DeletedSet) -> i32 {
    for slot in 0..store.header.count as u32 {
        if !deleted.contains(slot) {
            return slot as i32;
        }
    }
    NO_SLOT
}
