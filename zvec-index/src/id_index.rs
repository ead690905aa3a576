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

//! External identifier index
//!
//! Maps the 128-bit DocId to its physical slot. The map is memory-only and
//! rebuilt on every open with one sequential pass over the tombstone and
//! DocId sections; it holds exactly the live slots, never tombstoned ones.
//!
//! Two live slots carrying the same DocId mean an earlier writer misbehaved,
//! and the open fails with `CorruptIndex` instead of silently letting one
//! document shadow the other.

use std::collections::HashMap;
use zvec_core::{DocId, Result, ZvecError};

use crate::layout::StoreFile;

/// DocId → slot map for the live documents.
#[derive(Debug, Default)]
pub struct IdIndex {
    map: HashMap<DocId, u32>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Rebuild from the mapped file: every non-tombstoned slot in
    /// `[0, count)` contributes its DocId.
    pub fn rebuild(store: &StoreFile) -> Result<Self> {
        let count = store.header.count as u32;
        let mut map = HashMap::with_capacity(
            (store.header.count - store.header.deleted_count).max(0) as usize,
        );
        for slot in 0..count {
            if store.tombstone(slot) {
                continue;
            }
            let id = store.doc_id(slot);
            if let Some(previous) = map.insert(id, slot) {
                return Err(ZvecError::CorruptIndex(format!(
                    "DocId {id} appears at slots {previous} and {slot}"
                )));
            }
        }
        Ok(Self { map })
    }

    #[inline]
    pub fn get(&self, id: DocId) -> Option<u32> {
        self.map.get(&id).copied()
    }

    #[inline]
    pub fn contains(&self, id: DocId) -> bool {
        self.map.contains_key(&id)
    }

    /// Register a live document. The caller has already checked for
    /// duplicates; a collision here is a logic error.
    pub fn insert(&mut self, id: DocId, slot: u32) {
        let previous = self.map.insert(id, slot);
        debug_assert!(previous.is_none(), "duplicate DocId {id} inserted");
    }

    pub fn remove(&mut self, id: DocId) -> Option<u32> {
        self.map.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
