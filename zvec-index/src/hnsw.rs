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

//! HNSW graph construction and traversal
//!
//! Based on Malkov & Yashunin (2016), "Efficient and robust approximate
//! nearest neighbor search using Hierarchical Navigable Small World graphs".
//!
//! The graph lives entirely in the mapped file's Graph section: every slot
//! owns `max_layers` fixed-width neighbour lists, `-1`-terminated. Upper
//! layers are sparse and route coarsely ([`search_layer_upper`], greedy);
//! layer 0 is dense and ranks precisely ([`search_layer_base`], bounded
//! best-first with an `ef`-wide beam).
//!
//! All ranking is by score (dot product), higher is better. Tombstoned slots
//! are skipped at visit time, so traversal stays correct even while a crash
//! has left stale back-references behind.

use rand::Rng;
use smallvec::SmallVec;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::layout::{NO_SLOT, StoreFile};
use crate::score::ScoreKernel;
use crate::tombstones::DeletedSet;

/// Inline capacity for neighbour-list scratch copies (typical M is 16-32).
pub(crate) const MAX_M: usize = 32;

/// A slot with its score against the current query. Orders by score, ties
/// broken toward the lower slot, so heap traversal is deterministic.
#[derive(Debug, Clone, Copy)]
pub struct ScoredSlot {
    pub score: f32,
    pub slot: u32,
}

impl Eq for ScoredSlot {}

impl PartialEq for ScoredSlot {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.slot == other.slot
    }
}

impl PartialOrd for ScoredSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap behaviour: best score pops first
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

/// Sample a level for a new document: `min(⌊−ln(u)·mL⌋, L−1)` with
/// `u ∈ (0, 1]` and `mL = 1/ln(M)` from the header.
pub(crate) fn random_level(layer_probability: f64, max_layers: usize) -> usize {
    let mut rng = rand::thread_rng();
    // gen() is [0, 1); flip it so ln() never sees zero
    let u: f64 = 1.0 - rng.r#gen::<f64>();
    (((-u.ln()) * layer_probability) as usize).min(max_layers - 1)
}

/// Iterate a raw neighbour list up to the `-1` terminator.
#[inline]
pub(crate) fn iter_list(list: &[i32]) -> impl Iterator<Item = u32> + '_ {
    list.iter()
        .take_while(|&&n| n != NO_SLOT)
        .map(|&n| n as u32)
}

/// Greedy descent within one upper layer: hill-climb to the locally best
/// slot, skipping tombstoned neighbours. Entry must be live.
pub(crate) fn search_layer_upper(
    store: &StoreFile,
    deleted: &DeletedSet,
    kernel: ScoreKernel,
    query: &[f32],
    entry: u32,
    layer: usize,
) -> u32 {
    let mut current = entry;
    let mut current_score = kernel.score(query, store.vector(current));

    loop {
        let mut best = current;
        let mut best_score = current_score;

        for neighbor in iter_list(store.neighbors(current, layer)) {
            if deleted.contains(neighbor) {
                continue;
            }
            let score = kernel.score(query, store.vector(neighbor));
            if score > best_score {
                best = neighbor;
                best_score = score;
            }
        }

        if best == current {
            return current;
        }
        current = best;
        current_score = best_score;
    }
}

/// Bounded best-first expansion at one layer.
///
/// Keeps a visited set, a max-heap of candidates to explore and a bounded
/// min-heap of the `ef` best results seen so far; expansion stops when the
/// best unexplored candidate cannot beat the current worst result. Returns
/// results sorted by score descending.
pub(crate) fn search_layer_base(
    store: &StoreFile,
    deleted: &DeletedSet,
    kernel: ScoreKernel,
    query: &[f32],
    entry: u32,
    layer: usize,
    ef: usize,
) -> Vec<ScoredSlot> {
    if ef == 0 {
        return Vec::new();
    }

    let mut visited: HashSet<u32> = HashSet::new();
    let mut candidates: BinaryHeap<ScoredSlot> = BinaryHeap::new();
    let mut results: BinaryHeap<Reverse<ScoredSlot>> = BinaryHeap::new();

    let seed = ScoredSlot {
        score: kernel.score(query, store.vector(entry)),
        slot: entry,
    };
    visited.insert(entry);
    candidates.push(seed);
    results.push(Reverse(seed));

    while let Some(current) = candidates.pop() {
        if results.len() >= ef {
            if let Some(&Reverse(worst)) = results.peek() {
                if current.score < worst.score {
                    break;
                }
            }
        }

        for neighbor in iter_list(store.neighbors(current.slot, layer)) {
            if !visited.insert(neighbor) {
                continue;
            }
            if deleted.contains(neighbor) {
                continue;
            }

            let score = kernel.score(query, store.vector(neighbor));
            let worst_score = results
                .peek()
                .map(|&Reverse(w)| w.score)
                .unwrap_or(f32::NEG_INFINITY);

            if results.len() < ef || score > worst_score {
                let candidate = ScoredSlot {
                    score,
                    slot: neighbor,
                };
                candidates.push(candidate);
                results.push(Reverse(candidate));
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut out: Vec<ScoredSlot> = results.into_iter().map(|Reverse(c)| c).collect();
    out.sort_by(|a, b| b.cmp(a));
    out
}

/// Add `node` to `target`'s neighbour list at `layer` (one direction of the
/// bidirectional connect).
///
/// A free sentinel slot is taken as-is; a full list evicts its worst member
/// only when the newcomer scores better against `target`, which keeps every
/// list at ≤ M entries biased toward its nearest neighbours.
pub(crate) fn connect(
    store: &mut StoreFile,
    kernel: ScoreKernel,
    target: u32,
    node: u32,
    layer: usize,
) {
    if target == node {
        return;
    }

    let max_neighbors = store.layout().max_neighbors;
    let mut list: SmallVec<[i32; MAX_M]> =
        iter_list(store.neighbors(target, layer)).map(|n| n as i32).collect();

    if list.contains(&(node as i32)) {
        return;
    }

    if list.len() < max_neighbors {
        list.push(node as i32);
        store.write_neighbors(target, layer, &list);
        return;
    }

    // List is full: find the worst current neighbour of `target`
    let target_vector = store.vector(target);
    let mut worst_idx = 0;
    let mut worst_score = f32::INFINITY;
    for (i, &existing) in list.iter().enumerate() {
        let score = kernel.score(target_vector, store.vector(existing as u32));
        if score < worst_score {
            worst_score = score;
            worst_idx = i;
        }
    }

    let node_score = kernel.score(target_vector, store.vector(node));
    if node_score > worst_score {
        list[worst_idx] = node as i32;
        store.write_neighbors(target, layer, &list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::StoreFile;
    use tempfile::TempDir;
    use zvec_core::DistanceFunction;

    fn graph_fixture() -> (TempDir, StoreFile, DeletedSet, ScoreKernel) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("graph.zvec");
        let mut store =
            StoreFile::create(&path, 2, 16, 4, 2, DistanceFunction::Dot).unwrap();
        // Slots 0..4 on the unit circle at 0°, 30°, 60°, 90°
        for (slot, angle) in [(0u32, 0.0f32), (1, 30.0), (2, 60.0), (3, 90.0)] {
            let rad = angle.to_radians();
            store.write_vector(slot, &[rad.cos(), rad.sin()]);
            store.clear_neighbors(slot);
        }
        store.header.count = 4;
        // Chain 0 - 1 - 2 - 3 at layer 0
        store.write_neighbors(0, 0, &[1]);
        store.write_neighbors(1, 0, &[0, 2]);
        store.write_neighbors(2, 0, &[1, 3]);
        store.write_neighbors(3, 0, &[2]);
        (tmp, store, DeletedSet::new(), ScoreKernel::detect())
    }

    #[test]
    fn test_scored_slot_heap_order() {
        let mut heap = BinaryHeap::new();
        heap.push(ScoredSlot { score: 0.1, slot: 3 });
        heap.push(ScoredSlot { score: 0.9, slot: 1 });
        heap.push(ScoredSlot { score: 0.5, slot: 2 });
        assert_eq!(heap.pop().unwrap().slot, 1);
        assert_eq!(heap.pop().unwrap().slot, 2);
        assert_eq!(heap.pop().unwrap().slot, 3);
    }

    #[test]
    fn test_scored_slot_tie_breaks_to_lower_slot() {
        let mut heap = BinaryHeap::new();
        heap.push(ScoredSlot { score: 0.5, slot: 9 });
        heap.push(ScoredSlot { score: 0.5, slot: 2 });
        assert_eq!(heap.pop().unwrap().slot, 2);
    }

    #[test]
    fn test_random_level_within_bounds() {
        let ml = 1.0 / 16.0f64.ln();
        for _ in 0..1000 {
            assert!(random_level(ml, 5) < 5);
        }
        // With L = 1 every document lands on the base layer
        for _ in 0..100 {
            assert_eq!(random_level(ml, 1), 0);
        }
    }

    #[test]
    fn test_greedy_descent_walks_the_chain() {
        let (_tmp, store, deleted, kernel) = graph_fixture();
        // Query near 90°: climbing from slot 0 must end at slot 3
        let query = [0.0f32, 1.0];
        assert_eq!(search_layer_upper(&store, &deleted, kernel, &query, 0, 0), 3);
        // Query near 0°: stays at slot 0
        let query = [1.0f32, 0.0];
        assert_eq!(search_layer_upper(&store, &deleted, kernel, &query, 0, 0), 0);
    }

    #[test]
    fn test_greedy_descent_skips_deleted() {
        let (_tmp, store, mut deleted, kernel) = graph_fixture();
        deleted.insert(3);
        let query = [0.0f32, 1.0];
        assert_eq!(search_layer_upper(&store, &deleted, kernel, &query, 0, 0), 2);
    }

    #[test]
    fn test_base_search_finds_all_within_ef() {
        let (_tmp, store, deleted, kernel) = graph_fixture();
        let query = [1.0f32, 0.0];
        let results = search_layer_base(&store, &deleted, kernel, &query, 3, 0, 10);
        assert_eq!(results.len(), 4);
        // Sorted by score descending: 0°, 30°, 60°, 90°
        let slots: Vec<u32> = results.iter().map(|c| c.slot).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_base_search_bounds_results_to_ef() {
        let (_tmp, store, deleted, kernel) = graph_fixture();
        let query = [1.0f32, 0.0];
        let results = search_layer_base(&store, &deleted, kernel, &query, 0, 0, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].slot, 0);
        assert_eq!(results[1].slot, 1);
    }

    #[test]
    fn test_base_search_never_returns_deleted() {
        let (_tmp, store, mut deleted, kernel) = graph_fixture();
        deleted.insert(1);
        let query = [1.0f32, 0.0];
        let results = search_layer_base(&store, &deleted, kernel, &query, 0, 0, 10);
        assert!(results.iter().all(|c| c.slot != 1));
        // Traversal still crossed the deleted node's neighbourhood? It must
        // not: slot 1 was the only bridge, so 2 and 3 are unreachable.
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_connect_fills_free_slot_then_evicts_worst() {
        let (_tmp, mut store, _deleted, kernel) = graph_fixture();
        // target 0 already has neighbour 1; M = 4
        connect(&mut store, kernel, 0, 2, 0);
        connect(&mut store, kernel, 0, 3, 0);
        assert_eq!(store.neighbors(0, 0), &[1, 2, 3, NO_SLOT]);

        // Add a vector very close to slot 0 at slot 4; list still has a free
        // slot, then fill it and force an eviction decision
        store.write_vector(4, &[0.999, 0.05]);
        store.clear_neighbors(4);
        store.header.count = 5;
        connect(&mut store, kernel, 0, 4, 0);
        let list = store.neighbors(0, 0);
        assert_eq!(iter_list(list).count(), 4);

        // Slot 5 far from 0 must not displace anyone
        store.write_vector(5, &[-1.0, 0.0]);
        store.clear_neighbors(5);
        store.header.count = 6;
        connect(&mut store, kernel, 0, 5, 0);
        assert!(!iter_list(store.neighbors(0, 0)).any(|n| n == 5));

        // A duplicate or self connect is a no-op
        connect(&mut store, kernel, 0, 4, 0);
        connect(&mut store, kernel, 0, 0, 0);
        assert_eq!(iter_list(store.neighbors(0, 0)).count(), 4);
        assert!(!iter_list(store.neighbors(0, 0)).any(|n| n == 0));
    }
}
