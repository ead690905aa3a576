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

//! Exact parallel scan
//!
//! Brute-force top-K over the vector section, fanned out across rayon
//! workers. Each worker keeps a bounded min-heap of its best K and the heaps
//! are merged at the end, so the reduction stays O(K) per worker instead of
//! materialising every score.
//!
//! Workers only read: the mapping is held stable by the engine's shared
//! lock, and the scoring kernel is pure. Used for exact search and as the
//! recall baseline in tests.

use rayon::prelude::*;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::hnsw::ScoredSlot;
use crate::layout::StoreFile;
use crate::score::ScoreKernel;
use crate::tombstones::DeletedSet;

/// Exact top-K by score over all live slots, sorted descending.
pub(crate) fn top_k_exact(
    store: &StoreFile,
    deleted: &DeletedSet,
    kernel: ScoreKernel,
    query: &[f32],
    k: usize,
) -> Vec<ScoredSlot> {
    let count = store.header.count as u32;
    if k == 0 || count == 0 {
        return Vec::new();
    }

    let merged = (0..count)
        .into_par_iter()
        .fold(
            BinaryHeap::<Reverse<ScoredSlot>>::new,
            |mut heap, slot| {
                if !deleted.contains(slot) {
                    let candidate = ScoredSlot {
                        score: kernel.score(query, store.vector(slot)),
                        slot,
                    };
                    heap.push(Reverse(candidate));
                    if heap.len() > k {
                        heap.pop();
                    }
                }
                heap
            },
        )
        .reduce(BinaryHeap::new, |mut left, right| {
            for item in right {
                left.push(item);
                if left.len() > k {
                    left.pop();
                }
            }
            left
        });

    let mut out: Vec<ScoredSlot> = merged.into_iter().map(|Reverse(c)| c).collect();
    out.sort_by(|a, b| b.cmp(a));
    out
}
