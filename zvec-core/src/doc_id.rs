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

//! Stable external document identifiers
//!
//! A [`DocId`] is a 128-bit opaque handle that survives vector updates,
//! vacuum rebuilds and `sync_from` imports. Slots move; DocIds never do.
//!
//! On disk a DocId occupies 16 little-endian bytes in the DocId section.
//! An all-zero DocId is valid (it is just another 128-bit value); slot
//! occupancy is tracked by the header count and tombstone bytes, not by
//! sentinel ids.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The width of a DocId in the on-disk DocId section.
pub const DOC_ID_BYTES: usize = 16;

/// 128-bit stable external document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(pub u128);

impl DocId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        DocId(rng.r#gen::<u128>())
    }

    /// Little-endian on-disk encoding.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; DOC_ID_BYTES] {
        self.0.to_le_bytes()
    }

    /// Decode from the on-disk representation.
    #[inline]
    pub fn from_le_bytes(bytes: [u8; DOC_ID_BYTES]) -> Self {
        DocId(u128::from_le_bytes(bytes))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl From<u128> for DocId {
    fn from(raw: u128) -> Self {
        DocId(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_bytes() {
        let id = DocId(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(DocId::from_le_bytes(id.to_le_bytes()), id);
    }

    #[test]
    fn test_random_ids_differ() {
        // Collisions over a handful of draws would indicate a broken RNG hookup.
        let a = DocId::random();
        let b = DocId::random();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_hex() {
        let id = DocId(0xff);
        let s = id.to_string();
        assert_eq!(s.len(), 32);
        assert!(s.ends_with("ff"));
    }
}
