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

//! The vector store engine
//!
//! [`VectorStore`] ties the subsystems together: the mapped [`StoreFile`],
//! the DocId index, the deleted-slot set and the HNSW traversal, all behind
//! one reader-writer lock.
//!
//! ## Concurrency Model
//!
//! Concurrent readers, one writer, coordinated by a single
//! `parking_lot::RwLock` over the whole engine:
//!
//! - shared side: `search*`, `get_by_id`, `count`, `stats`, diagnostics
//! - exclusive side: `add`, `update*`, `delete`, `vacuum`, `sync_from`
//!
//! Readers entering after a writer's commit observe all of its effects; a
//! reader can never see a half-rewritten neighbour list because those writes
//! only happen under the exclusive side. There is no async surface and no
//! cancellation; operations are bounded by graph fan-out and `ef`.
//!
//! ## Write Ordering
//!
//! Within a writer critical section the on-disk order is fixed: document
//! bytes, then graph wiring, then the header (insert); tombstone byte, then
//! graph rewiring, then the header (delete). The header flush is the commit
//! point, which is what makes crashes between operations recoverable without
//! a journal.

use parking_lot::RwLock;
use serde::Serialize;
use smallvec::SmallVec;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zvec_core::{DistanceFunction, DocId, Result, ZvecError};

use crate::hnsw::{self, MAX_M, ScoredSlot};
use crate::id_index::IdIndex;
use crate::layout::{METADATA_SIZE, NO_SLOT, StoreFile};
use crate::metrics;
use crate::scan;
use crate::score::{ScoreKernel, l2_normalize};
use crate::tombstones::{self, DeletedSet};

/// Default beam width when the caller does not pass `ef_search`.
pub const DEFAULT_EF_SEARCH: usize = 50;

/// Store shape and tuning, fixed at file-creation time.
#[derive(Debug, Clone, Serialize)]
pub struct StoreConfig {
    /// Physical slot capacity; vacuum is the only way to reclaim slots.
    pub max_count: usize,
    /// Neighbour cap per (slot, layer) — the HNSW `M` parameter.
    pub max_neighbors: usize,
    /// Layer count — the HNSW `L` parameter.
    pub max_layers: usize,
    /// Similarity metric recorded in the header.
    pub metric: DistanceFunction,
    /// Default `ef` for searches that do not pass one.
    pub ef_search: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_count: 100_000,
            max_neighbors: 16,
            max_layers: 5,
            metric: DistanceFunction::Cosine,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub doc_id: DocId,
    pub score: f32,
    pub metadata: Vec<u8>,
}

/// Snapshot of the engine counters.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub dim: usize,
    pub count: i32,
    pub deleted_count: i32,
    pub live_count: i32,
    pub max_count: i32,
    pub max_neighbors: i32,
    pub max_layers: i32,
    pub entry_point: i32,
    pub entry_point_level: i32,
    pub metric: DistanceFunction,
    pub file_len: usize,
}

struct StoreInner {
    file: StoreFile,
    ids: IdIndex,
    deleted: DeletedSet,
    kernel: ScoreKernel,
    ef_search: usize,
    faulted: bool,
}

/// Embedded single-file vector store with HNSW search and stable DocIds.
pub struct VectorStore {
    inner: RwLock<StoreInner>,
    dim: usize,
}

impl VectorStore {
    /// Open the store at `path`, creating the backing file when absent.
    ///
    /// An existing file is validated (magic, dimension) and migrated from
    /// older format versions; its recorded shape (`max_count`, `M`, `L`,
    /// metric) wins over `config`. The DocId index and the deleted-slot set
    /// are rebuilt with one sequential pass.
    pub fn open(path: impl AsRef<Path>, dim: usize, config: StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = if path.exists() {
            StoreFile::open(path, dim)?
        } else {
            StoreFile::create(
                path,
                dim,
                config.max_count,
                config.max_neighbors,
                config.max_layers,
                config.metric,
            )?
        };

        let ids = IdIndex::rebuild(&file)?;
        let deleted = DeletedSet::rebuild(&file);
        if deleted.len() != file.header.deleted_count as usize {
            warn!(
                recorded = file.header.deleted_count,
                scanned = deleted.len(),
                "tombstone count disagrees with header; trusting the scan"
            );
        }
        metrics::update_population(file.header.count, file.header.deleted_count);
        info!(
            path = %path.display(),
            dim,
            count = file.header.count,
            deleted = file.header.deleted_count,
            "opened vector store"
        );

        Ok(VectorStore {
            inner: RwLock::new(StoreInner {
                file,
                ids,
                deleted,
                kernel: ScoreKernel::detect(),
                ef_search: config.ef_search.max(1),
                faulted: false,
            }),
            dim,
        })
    }

    /// Add a document. Returns the existing DocId untouched when
    /// `external_id` is already present (dedup, not upsert).
    pub fn add(
        &self,
        vector: &[f32],
        metadata: &[u8],
        external_id: Option<DocId>,
    ) -> Result<DocId> {
        let _timer = metrics::TimerGuard::new(metrics::ADD_LATENCY.clone());
        metrics::ADD_COUNT.inc();

        let mut inner = self.inner.write();
        inner.check_writable()?;
        check_dim(self.dim, vector)?;
        check_metadata(metadata)?;

        if let Some(id) = external_id {
            if inner.ids.contains(id) {
                return Ok(id);
            }
        }
        inner.check_capacity()?;

        let id = external_id.unwrap_or_else(DocId::random);
        inner.insert_document(id, vector, metadata)?;
        metrics::update_population(inner.file.header.count, inner.file.header.deleted_count);
        Ok(id)
    }

    /// Approximate search with the default beam width.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let ef = self.inner.read().ef_search;
        self.search_impl(query, top_k, ef, None)
    }

    /// Approximate search with an explicit `ef_search` (the effective beam
    /// is `max(top_k, ef_search)`).
    pub fn search_with_ef(
        &self,
        query: &[f32],
        top_k: usize,
        ef_search: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_impl(query, top_k, ef_search, None)
    }

    /// Approximate search with a caller predicate over the raw metadata
    /// bytes. Typed deserialisation belongs to the caller.
    pub fn search_filtered(
        &self,
        query: &[f32],
        top_k: usize,
        ef_search: usize,
        predicate: &dyn Fn(&[u8]) -> bool,
    ) -> Result<Vec<SearchResult>> {
        self.search_impl(query, top_k, ef_search, Some(predicate))
    }

    fn search_impl(
        &self,
        query: &[f32],
        top_k: usize,
        ef_search: usize,
        predicate: Option<&dyn Fn(&[u8]) -> bool>,
    ) -> Result<Vec<SearchResult>> {
        let _timer = metrics::TimerGuard::new(metrics::SEARCH_LATENCY.clone());
        metrics::SEARCH_COUNT.inc();

        let inner = self.inner.read();
        check_dim(self.dim, query)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let entry = inner.file.header.entry_point;
        if entry == NO_SLOT {
            return Ok(Vec::new());
        }

        let query = inner.prepared_query(query);
        let mut current = entry as u32;
        let entry_level = inner.file.header.entry_point_level as usize;
        for layer in (1..=entry_level).rev() {
            current = hnsw::search_layer_upper(
                &inner.file,
                &inner.deleted,
                inner.kernel,
                &query,
                current,
                layer,
            );
        }

        let ef = top_k.max(ef_search);
        let mut hits = hnsw::search_layer_base(
            &inner.file,
            &inner.deleted,
            inner.kernel,
            &query,
            current,
            0,
            ef,
        );
        // Traversal filters tombstoned neighbours, but the seed itself may be
        // a tombstone a crash left as entry point; re-check every hit.
        hits.retain(|c| !inner.deleted.contains(c.slot));
        if let Some(predicate) = predicate {
            hits.retain(|c| predicate(inner.file.metadata(c.slot)));
        }
        hits.truncate(top_k);
        Ok(inner.materialize(&hits))
    }

    /// Exact top-K by parallel linear scan over the vector section. The
    /// recall baseline; also the sane choice for tiny stores.
    pub fn search_exact(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchResult>> {
        let _timer = metrics::TimerGuard::new(metrics::SEARCH_LATENCY.clone());
        metrics::SEARCH_COUNT.inc();

        let inner = self.inner.read();
        check_dim(self.dim, query)?;
        let query = inner.prepared_query(query);
        let hits = scan::top_k_exact(&inner.file, &inner.deleted, inner.kernel, &query, top_k);
        Ok(inner.materialize(&hits))
    }

    /// Fetch one document by its stable id.
    pub fn get_by_id(&self, id: DocId) -> Option<(Vec<f32>, Vec<u8>)> {
        let inner = self.inner.read();
        let slot = inner.ids.get(id)?;
        Some((
            inner.file.vector(slot).to_vec(),
            inner.file.metadata(slot).to_vec(),
        ))
    }

    /// Rewrite only the 512-byte metadata slot, in place.
    pub fn update_metadata(&self, id: DocId, metadata: &[u8]) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.check_writable()?;
        check_metadata(metadata)?;
        let Some(slot) = inner.ids.get(id) else {
            return Ok(false);
        };
        inner.file.write_metadata(slot, metadata);
        Ok(true)
    }

    /// Replace a document's vector, keeping its DocId (soft-delete plus
    /// re-insert).
    pub fn update_vector(&self, id: DocId, vector: &[f32]) -> Result<bool> {
        self.update(id, Some(vector), None)
    }

    /// Update vector and/or metadata under a stable DocId.
    ///
    /// A vector update needs a free physical slot; at `max_count` it fails
    /// with `DbFull` *before* touching the old document (capacity is
    /// physical — vacuum first). With neither field this is an existence
    /// check.
    pub fn update(
        &self,
        id: DocId,
        vector: Option<&[f32]>,
        metadata: Option<&[u8]>,
    ) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.check_writable()?;
        if let Some(meta) = metadata {
            check_metadata(meta)?;
        }

        let Some(vector) = vector else {
            let Some(slot) = inner.ids.get(id) else {
                return Ok(false);
            };
            if let Some(meta) = metadata {
                inner.file.write_metadata(slot, meta);
            }
            return Ok(true);
        };

        check_dim(self.dim, vector)?;
        let Some(slot) = inner.ids.get(id) else {
            return Ok(false);
        };
        inner.check_capacity()?;

        let meta_bytes = match metadata {
            Some(meta) => meta.to_vec(),
            None => inner.file.metadata(slot).to_vec(),
        };
        inner.delete_slot(id, slot)?;
        inner.insert_document(id, vector, &meta_bytes)?;
        metrics::update_population(inner.file.header.count, inner.file.header.deleted_count);
        Ok(true)
    }

    /// Soft-delete. Returns `false` when the DocId is unknown (or already
    /// deleted); never an error.
    pub fn delete(&self, id: DocId) -> Result<bool> {
        let mut inner = self.inner.write();
        inner.check_writable()?;
        let Some(slot) = inner.ids.get(id) else {
            return Ok(false);
        };
        inner.delete_slot(id, slot)?;
        metrics::DELETE_COUNT.inc();
        metrics::update_population(inner.file.header.count, inner.file.header.deleted_count);
        Ok(true)
    }

    /// Number of occupied slots, tombstoned included.
    pub fn count(&self) -> i32 {
        self.inner.read().file.header.count
    }

    /// Number of tombstoned slots awaiting vacuum.
    pub fn deleted_count(&self) -> i32 {
        self.inner.read().file.header.deleted_count
    }

    /// Current entry-point slot, `-1` when the store has no live document.
    pub fn entry_point(&self) -> i32 {
        self.inner.read().file.header.entry_point
    }

    /// Cheap invariant check over header, indices and entry point.
    pub fn is_healthy(&self) -> bool {
        let inner = self.inner.read();
        let h = &inner.file.header;
        if inner.faulted {
            return false;
        }
        if h.count > h.max_count || h.deleted_count > h.count {
            return false;
        }
        if inner.ids.len() as i32 != h.count - h.deleted_count {
            return false;
        }
        if inner.deleted.len() as i32 != h.deleted_count {
            return false;
        }
        if h.count - h.deleted_count > 0 {
            let entry = h.entry_point;
            if entry < 0 || entry >= h.count {
                return false;
            }
            if inner.deleted.contains(entry as u32) || inner.file.tombstone(entry as u32) {
                return false;
            }
        }
        true
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        let h = &inner.file.header;
        StoreStats {
            dim: self.dim,
            count: h.count,
            deleted_count: h.deleted_count,
            live_count: h.count - h.deleted_count,
            max_count: h.max_count,
            max_neighbors: h.max_neighbors,
            max_layers: h.max_layers,
            entry_point: h.entry_point,
            entry_point_level: h.entry_point_level,
            metric: h.metric(),
            file_len: inner.file.layout().file_len,
        }
    }

    /// Import every non-duplicate, non-tombstoned document from `other`,
    /// preserving DocIds. Returns how many documents were imported.
    pub fn sync_from(&self, other: &VectorStore) -> Result<i32> {
        if std::ptr::eq(self, other) {
            return Ok(0);
        }
        if self.dim != other.dim {
            return Err(ZvecError::DimMismatch {
                expected: self.dim,
                got: other.dim,
            });
        }

        let source = other.inner.read();
        let mut inner = self.inner.write();
        inner.check_writable()?;

        let mut imported = 0;
        for slot in 0..source.file.header.count as u32 {
            if source.deleted.contains(slot) {
                continue;
            }
            let id = source.file.doc_id(slot);
            if inner.ids.contains(id) {
                continue;
            }
            inner.check_capacity()?;
            let vector = source.file.vector(slot).to_vec();
            let metadata = source.file.metadata(slot).to_vec();
            inner.insert_document(id, &vector, &metadata)?;
            imported += 1;
        }
        metrics::update_population(inner.file.header.count, inner.file.header.deleted_count);
        info!(imported, "synced documents from peer store");
        Ok(imported)
    }

    /// Rebuild into a fresh file, dropping tombstoned slots, and atomically
    /// swap it in. On failure the original file is untouched.
    pub fn vacuum(&self) -> Result<()> {
        let mut inner = self.inner.write();
        inner.check_writable()?;

        let path = inner.file.path().to_path_buf();
        let scratch: PathBuf = path.with_extension("vacuum");
        let h = inner.file.header;
        let kernel = inner.kernel;
        let ef_search = inner.ef_search;

        let build = (|| -> Result<()> {
            let file = StoreFile::create(
                &scratch,
                self.dim,
                h.max_count as usize,
                h.max_neighbors as usize,
                h.max_layers as usize,
                h.metric(),
            )?;
            let mut fresh = StoreInner {
                file,
                ids: IdIndex::new(),
                deleted: DeletedSet::new(),
                kernel,
                ef_search,
                faulted: false,
            };
            for slot in 0..h.count as u32 {
                if inner.deleted.contains(slot) {
                    continue;
                }
                let id = inner.file.doc_id(slot);
                let vector = inner.file.vector(slot).to_vec();
                let metadata = inner.file.metadata(slot).to_vec();
                fresh.insert_document(id, &vector, &metadata)?;
            }
            fresh.file.flush()?;
            fresh.file.sync_file()?;
            Ok(())
        })();

        if let Err(err) = build {
            let _ = std::fs::remove_file(&scratch);
            return Err(err);
        }

        std::fs::rename(&scratch, &path)?;

        let file = StoreFile::open(&path, self.dim)?;
        let ids = IdIndex::rebuild(&file)?;
        let deleted = DeletedSet::rebuild(&file);
        let reclaimed = h.deleted_count;
        *inner = StoreInner {
            file,
            ids,
            deleted,
            kernel,
            ef_search,
            faulted: false,
        };
        metrics::update_population(inner.file.header.count, inner.file.header.deleted_count);
        info!(
            reclaimed,
            live = inner.file.header.count,
            "vacuum rebuilt the store file"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Diagnostics (useful for invariant tests)
    // ------------------------------------------------------------------

    /// Whether `slot` is in the in-memory deleted set.
    pub fn is_deleted_slot(&self, slot: u32) -> bool {
        self.inner.read().deleted.contains(slot)
    }

    /// The live neighbour list of (slot, layer), terminator excluded.
    pub fn neighbors_of(&self, slot: u32, layer: usize) -> Vec<u32> {
        let inner = self.inner.read();
        hnsw::iter_list(inner.file.neighbors(slot, layer)).collect()
    }

    /// DocId stored at `slot` (valid for any occupied slot, tombstoned or
    /// not).
    pub fn doc_id_at(&self, slot: u32) -> Option<DocId> {
        let inner = self.inner.read();
        if slot < inner.file.header.count as u32 {
            Some(inner.file.doc_id(slot))
        } else {
            None
        }
    }
}

impl StoreInner {
    fn check_writable(&self) -> Result<()> {
        if self.faulted {
            metrics::ERROR_COUNT.inc();
            return Err(ZvecError::Faulted);
        }
        Ok(())
    }

    fn check_capacity(&self) -> Result<()> {
        if self.file.header.count >= self.file.header.max_count {
            metrics::ERROR_COUNT.inc();
            return Err(ZvecError::DbFull {
                max_count: self.file.header.max_count as usize,
            });
        }
        Ok(())
    }

    /// Normalise a query copy under cosine; pass dot queries through.
    fn prepared_query(&self, query: &[f32]) -> Vec<f32> {
        let mut q = query.to_vec();
        if self.file.metric() == DistanceFunction::Cosine {
            l2_normalize(&mut q);
        }
        q
    }

    fn materialize(&self, hits: &[ScoredSlot]) -> Vec<SearchResult> {
        hits.iter()
            .map(|c| SearchResult {
                doc_id: self.file.doc_id(c.slot),
                score: c.score,
                metadata: self.file.metadata(c.slot).to_vec(),
            })
            .collect()
    }

    /// Flush the header, poisoning the engine on failure.
    fn commit_header(&mut self) -> Result<()> {
        if let Err(err) = self.file.flush_header() {
            self.faulted = true;
            metrics::ERROR_COUNT.inc();
            warn!(error = %err, "header flush failed; store is now read-only");
            return Err(err);
        }
        Ok(())
    }

    /// Write a new document into the next free slot and wire it into the
    /// graph. The caller has verified capacity, dimension and id freshness.
    fn insert_document(&mut self, id: DocId, vector: &[f32], metadata: &[u8]) -> Result<()> {
        let slot = self.file.header.count as u32;
        let max_layers = self.file.layout().max_layers;
        let max_neighbors = self.file.layout().max_neighbors;
        let level = hnsw::random_level(self.file.header.layer_probability, max_layers);

        let mut vector = vector.to_vec();
        if self.file.metric() == DistanceFunction::Cosine {
            l2_normalize(&mut vector);
        }

        // Document bytes first; the header flush at the end publishes them.
        self.file.write_vector(slot, &vector);
        self.file.write_metadata(slot, metadata);
        self.file.write_doc_id(slot, id);
        self.file.write_tombstone(slot, false);
        self.file.clear_neighbors(slot);

        let old_entry = self.file.header.entry_point;
        let old_entry_level = self.file.header.entry_point_level as usize;

        self.file.header.count += 1;
        self.ids.insert(id, slot);

        if old_entry == NO_SLOT {
            // First live document: it is the whole graph.
            self.file.header.entry_point = slot as i32;
            self.file.header.entry_point_level = level as i32;
            return self.commit_header();
        }

        // Coarse routing from the entry point down to the insertion level
        let mut current = old_entry as u32;
        for layer in ((level + 1)..=old_entry_level).rev() {
            current = hnsw::search_layer_upper(
                &self.file,
                &self.deleted,
                self.kernel,
                &vector,
                current,
                layer,
            );
        }

        // Connect on every layer the new document participates in
        for layer in (0..=level).rev() {
            let candidates = hnsw::search_layer_base(
                &self.file,
                &self.deleted,
                self.kernel,
                &vector,
                current,
                layer,
                max_neighbors,
            );

            let list: SmallVec<[i32; MAX_M]> = candidates
                .iter()
                .take(max_neighbors)
                .map(|c| c.slot as i32)
                .collect();
            self.file.write_neighbors(slot, layer, &list);

            for candidate in &candidates {
                hnsw::connect(&mut self.file, self.kernel, candidate.slot, slot, layer);
            }

            if let Some(best) = candidates.first() {
                current = best.slot;
            }
        }

        if level > old_entry_level {
            self.file.header.entry_point = slot as i32;
            self.file.header.entry_point_level = level as i32;
        }
        self.commit_header()
    }

    /// Tombstone one live slot and repair the graph around it.
    fn delete_slot(&mut self, id: DocId, slot: u32) -> Result<()> {
        // Tombstone first: once this byte is down, a crash can only leave
        // stale edges, never a resurrected document.
        self.file.write_tombstone(slot, true);
        if let Err(err) = self.file.flush_tombstone(slot) {
            self.faulted = true;
            metrics::ERROR_COUNT.inc();
            warn!(error = %err, "tombstone flush failed; store is now read-only");
            return Err(err);
        }
        self.deleted.insert(slot);
        self.ids.remove(id);

        tombstones::unlink_slot(&mut self.file, slot);

        if self.file.header.entry_point == slot as i32 {
            let replacement = tombstones::select_entry_after_delete(&self.file, &self.deleted);
            self.file.header.entry_point = replacement;
            self.file.header.entry_point_level = 0;
        }

        self.file.header.deleted_count += 1;
        self.commit_header()
    }
}

fn check_dim(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        metrics::ERROR_COUNT.inc();
        return Err(ZvecError::DimMismatch {
            expected,
            got: vector.len(),
        });
    }
    Ok(())
}

fn check_metadata(metadata: &[u8]) -> Result<()> {
    if metadata.len() > METADATA_SIZE {
        metrics::ERROR_COUNT.inc();
        return Err(ZvecError::InvalidParameter(format!(
            "metadata is {} bytes, the slot holds {METADATA_SIZE}",
            metadata.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> StoreConfig {
        StoreConfig {
            max_count: 8,
            max_neighbors: 4,
            max_layers: 3,
            metric: DistanceFunction::Dot,
            ef_search: 16,
        }
    }

    fn open_store(tmp: &TempDir, dim: usize, config: StoreConfig) -> VectorStore {
        VectorStore::open(tmp.path().join("store.zvec"), dim, config).unwrap()
    }

    #[test]
    fn test_add_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());

        let id = store.add(&[1.0, 2.0, 3.0, 4.0], b"doc-1", None).unwrap();
        assert_eq!(store.count(), 1);

        let (vector, metadata) = store.get_by_id(id).unwrap();
        assert_eq!(vector, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(metadata, b"doc-1");
        assert!(store.is_healthy());
    }

    #[test]
    fn test_add_duplicate_external_id_is_dedup() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());

        let id = DocId(42);
        let first = store.add(&[1.0, 0.0, 0.0, 0.0], b"a", Some(id)).unwrap();
        let second = store.add(&[0.0, 1.0, 0.0, 0.0], b"b", Some(id)).unwrap();
        assert_eq!(first, id);
        assert_eq!(second, id);
        assert_eq!(store.count(), 1);
        // The original document is untouched
        let (vector, metadata) = store.get_by_id(id).unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(metadata, b"a");
    }

    #[test]
    fn test_db_full_at_physical_capacity() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());

        for i in 0..8 {
            store
                .add(&[i as f32, 1.0, 0.0, 0.0], b"", None)
                .unwrap();
        }
        match store.add(&[9.0, 1.0, 0.0, 0.0], b"", None) {
            Err(ZvecError::DbFull { max_count: 8 }) => {}
            other => panic!("expected DbFull, got {other:?}"),
        }
    }

    #[test]
    fn test_dim_mismatch() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        match store.add(&[1.0, 2.0], b"", None) {
            Err(ZvecError::DimMismatch {
                expected: 4,
                got: 2,
            }) => {}
            other => panic!("expected DimMismatch, got {other:?}"),
        }
        match store.search(&[1.0], 3) {
            Err(ZvecError::DimMismatch { .. }) => {}
            other => panic!("expected DimMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_metadata_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let big = vec![b'x'; METADATA_SIZE + 1];
        match store.add(&[1.0, 0.0, 0.0, 0.0], &big, None) {
            Err(ZvecError::InvalidParameter(_)) => {}
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_and_zero_k_searches() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 5).unwrap().is_empty());

        store.add(&[1.0, 0.0, 0.0, 0.0], b"", None).unwrap();
        assert!(store.search(&[1.0, 0.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_delete_unknown_returns_false() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        assert!(!store.delete(DocId(999)).unwrap());
        assert_eq!(store.deleted_count(), 0);

        let id = store.add(&[1.0, 0.0, 0.0, 0.0], b"", None).unwrap();
        assert!(store.delete(id).unwrap());
        // Double delete is "already gone"
        assert!(!store.delete(id).unwrap());
        assert_eq!(store.deleted_count(), 1);
        assert_eq!(store.entry_point(), NO_SLOT);
    }

    #[test]
    fn test_update_metadata_in_place() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let id = store.add(&[1.0, 0.0, 0.0, 0.0], b"before", None).unwrap();

        assert!(store.update_metadata(id, b"after").unwrap());
        let (vector, metadata) = store.get_by_id(id).unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0, 0.0]);
        assert_eq!(metadata, b"after");
        assert_eq!(store.count(), 1);

        assert!(!store.update_metadata(DocId(12345), b"nope").unwrap());
    }

    #[test]
    fn test_update_vector_keeps_doc_id_and_consumes_slot() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let id = store.add(&[1.0, 0.0, 0.0, 0.0], b"m", None).unwrap();

        assert!(store.update_vector(id, &[0.0, 1.0, 0.0, 0.0]).unwrap());
        let (vector, metadata) = store.get_by_id(id).unwrap();
        assert_eq!(vector, vec![0.0, 1.0, 0.0, 0.0]);
        assert_eq!(metadata, b"m");
        // Old slot is tombstoned, new slot occupied
        assert_eq!(store.count(), 2);
        assert_eq!(store.deleted_count(), 1);
        assert!(store.is_healthy());
    }

    #[test]
    fn test_update_vector_at_capacity_is_db_full_and_keeps_old_doc() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let mut last = None;
        for i in 0..8 {
            last = Some(store.add(&[i as f32, 1.0, 0.0, 0.0], b"keep", None).unwrap());
        }
        let id = last.unwrap();
        match store.update_vector(id, &[9.0, 9.0, 9.0, 9.0]) {
            Err(ZvecError::DbFull { .. }) => {}
            other => panic!("expected DbFull, got {other:?}"),
        }
        // The old document must have survived the rejected update
        let (vector, _) = store.get_by_id(id).unwrap();
        assert_eq!(vector, vec![7.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_update_without_fields_is_existence_check() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let id = store.add(&[1.0, 0.0, 0.0, 0.0], b"", None).unwrap();
        assert!(store.update(id, None, None).unwrap());
        assert!(!store.update(DocId(7), None, None).unwrap());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_sync_from_imports_live_non_duplicates() {
        let tmp = TempDir::new().unwrap();
        let a = VectorStore::open(tmp.path().join("a.zvec"), 4, small_config()).unwrap();
        let b = VectorStore::open(tmp.path().join("b.zvec"), 4, small_config()).unwrap();

        let shared = a.add(&[1.0, 0.0, 0.0, 0.0], b"shared", None).unwrap();
        let fresh = a.add(&[0.0, 1.0, 0.0, 0.0], b"fresh", None).unwrap();
        let dead = a.add(&[0.0, 0.0, 1.0, 0.0], b"dead", None).unwrap();
        a.delete(dead).unwrap();

        b.add(&[1.0, 0.0, 0.0, 0.0], b"mine", Some(shared)).unwrap();

        let imported = b.sync_from(&a).unwrap();
        assert_eq!(imported, 1);
        assert_eq!(b.count(), 2);
        let (_, metadata) = b.get_by_id(fresh).unwrap();
        assert_eq!(metadata, b"fresh");
        // The duplicate kept b's copy
        let (_, metadata) = b.get_by_id(shared).unwrap();
        assert_eq!(metadata, b"mine");
        // Tombstoned documents do not travel
        assert!(b.get_by_id(dead).is_none());
    }

    #[test]
    fn test_vacuum_reclaims_slots() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp, 4, small_config());
        let mut kept = Vec::new();
        for i in 0..6 {
            let id = store.add(&[i as f32, 1.0, 0.0, 0.0], b"v", None).unwrap();
            if i % 2 == 0 {
                kept.push(id);
            } else {
                store.delete(id).unwrap();
            }
        }
        assert_eq!(store.count(), 6);
        assert_eq!(store.deleted_count(), 3);

        store.vacuum().unwrap();
        assert_eq!(store.count(), 3);
        assert_eq!(store.deleted_count(), 0);
        assert!(store.is_healthy());
        for id in kept {
            assert!(store.get_by_id(id).is_some());
        }
        // Capacity is back: three slots were reclaimed
        for i in 0..5 {
            store.add(&[10.0 + i as f32, 0.0, 0.0, 0.0], b"", None).unwrap();
        }
        assert_eq!(store.count(), 8);
    }
}
