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

//! Durability tests: close/reopen round-trips, legacy format migration and
//! vacuum persistence.

use rand::prelude::*;
use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};
use tempfile::TempDir;
use zvec_index::{DistanceFunction, DocId, FORMAT_VERSION, StoreConfig, VectorStore};

fn config(max_count: usize) -> StoreConfig {
    StoreConfig {
        max_count,
        max_neighbors: 8,
        max_layers: 3,
        metric: DistanceFunction::Dot,
        ..Default::default()
    }
}

#[test]
fn test_reopen_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("rt.zvec");

    let mut rng = StdRng::seed_from_u64(3);
    let vectors: Vec<Vec<f32>> = (0..64)
        .map(|_| (0..8).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect();
    let query: Vec<f32> = (0..8).map(|_| rng.gen_range(-1.0f32..1.0)).collect();

    let (ids, before): (Vec<DocId>, Vec<(DocId, f32)>) = {
        let store = VectorStore::open(&path, 8, config(128)).unwrap();
        let ids: Vec<DocId> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| store.add(v, format!("doc-{i}").as_bytes(), None).unwrap())
            .collect();
        let hits = store.search_with_ef(&query, 10, 64).unwrap();
        (ids, hits.iter().map(|h| (h.doc_id, h.score)).collect())
    };

    let store = VectorStore::open(&path, 8, config(128)).unwrap();
    assert_eq!(store.count(), 64);
    assert_eq!(store.deleted_count(), 0);
    assert!(store.is_healthy());

    // Same DocId set
    let reopened_ids: HashSet<DocId> = (0..64).map(|s| store.doc_id_at(s).unwrap()).collect();
    assert_eq!(reopened_ids, ids.iter().copied().collect::<HashSet<_>>());

    // Same results for the same query
    let hits = store.search_with_ef(&query, 10, 64).unwrap();
    let after: Vec<(DocId, f32)> = hits.iter().map(|h| (h.doc_id, h.score)).collect();
    assert_eq!(before, after);

    // Vectors and metadata byte-identical
    for (i, id) in ids.iter().enumerate() {
        let (vector, metadata) = store.get_by_id(*id).unwrap();
        assert_eq!(vector, vectors[i]);
        assert_eq!(metadata, format!("doc-{i}").as_bytes());
    }
}

#[test]
fn test_doc_ids_stable_across_updates_and_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("stable.zvec");

    let id = {
        let store = VectorStore::open(&path, 4, config(16)).unwrap();
        let id = store.add(&[1.0, 0.0, 0.0, 0.0], b"v1", None).unwrap();
        store.update(id, Some(&[0.0, 1.0, 0.0, 0.0]), Some(b"v2")).unwrap();
        store.update(id, Some(&[0.0, 0.0, 1.0, 0.0]), Some(b"v3")).unwrap();
        id
    };

    let store = VectorStore::open(&path, 4, config(16)).unwrap();
    let (vector, metadata) = store.get_by_id(id).unwrap();
    assert_eq!(vector, vec![0.0, 0.0, 1.0, 0.0]);
    assert_eq!(metadata, b"v3");
    // Two tombstoned predecessors occupy slots until vacuum
    assert_eq!(store.count(), 3);
    assert_eq!(store.deleted_count(), 2);
}

/// Rewrite the version field of a store file and truncate the sections that
/// version did not have yet, producing a faithful legacy file.
fn downgrade_file(path: &std::path::Path, to_version: i32, max_count: u64, doc_id_section: u64) {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .unwrap();
    let len = file.metadata().unwrap().len();
    let new_len = match to_version {
        2 => len - max_count,                   // drop tombstones
        1 => len - max_count - doc_id_section,  // drop tombstones + DocIds
        _ => len,
    };
    file.set_len(new_len).unwrap();
    file.seek(SeekFrom::Start(16)).unwrap();
    file.write_all(&to_version.to_le_bytes()).unwrap();
    file.sync_all().unwrap();
}

#[test]
fn test_v2_migration_preserves_doc_ids() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("v2.zvec");

    let ids = {
        let store = VectorStore::open(&path, 4, config(16)).unwrap();
        (0..5)
            .map(|i| store.add(&[i as f32, 1.0, 0.0, 0.0], b"m", None).unwrap())
            .collect::<Vec<_>>()
    };

    downgrade_file(&path, 2, 16, 16 * 16);

    let store = VectorStore::open(&path, 4, config(16)).unwrap();
    assert_eq!(store.count(), 5);
    assert_eq!(store.deleted_count(), 0);
    for (i, id) in ids.iter().enumerate() {
        let (vector, _) = store.get_by_id(*id).unwrap();
        assert_eq!(vector[0], i as f32);
    }
    // Reopen once more: the migrated file is a normal v3 file now
    drop(store);
    let store = VectorStore::open(&path, 4, config(16)).unwrap();
    assert!(store.is_healthy());
}

#[test]
fn test_v1_migration_mints_fresh_doc_ids() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("v1.zvec");

    {
        let store = VectorStore::open(&path, 4, config(16)).unwrap();
        for i in 0..5 {
            store.add(&[i as f32, 1.0, 0.0, 0.0], b"m", None).unwrap();
        }
    }

    downgrade_file(&path, 1, 16, 16 * 16);

    let store = VectorStore::open(&path, 4, config(16)).unwrap();
    assert_eq!(store.count(), 5);
    assert!(store.is_healthy());

    // Every slot got a fresh, distinct id and resolves through the index
    let ids: HashSet<DocId> = (0..5).map(|s| store.doc_id_at(s).unwrap()).collect();
    assert_eq!(ids.len(), 5);
    for id in ids {
        assert!(store.get_by_id(id).is_some());
    }

    // Search still works on the migrated graph
    let hits = store.search(&[4.0, 1.0, 0.0, 0.0], 1).unwrap();
    let (vector, _) = store.get_by_id(hits[0].doc_id).unwrap();
    assert_eq!(vector[0], 4.0);
}

#[test]
fn test_vacuum_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("vac.zvec");

    let keep = {
        let store = VectorStore::open(&path, 4, config(32)).unwrap();
        let mut keep = Vec::new();
        for i in 0..20 {
            let id = store
                .add(&[i as f32, 1.0, 0.0, 0.0], format!("d{i}").as_bytes(), None)
                .unwrap();
            if i % 2 == 0 {
                store.delete(id).unwrap();
            } else {
                keep.push((id, i));
            }
        }
        store.vacuum().unwrap();
        assert_eq!(store.count(), 10);
        keep
    };

    let store = VectorStore::open(&path, 4, config(32)).unwrap();
    assert_eq!(store.count(), 10);
    assert_eq!(store.deleted_count(), 0);
    assert!(store.is_healthy());
    for (id, i) in keep {
        let (vector, metadata) = store.get_by_id(id).unwrap();
        assert_eq!(vector[0], i as f32);
        assert_eq!(metadata, format!("d{i}").as_bytes());
    }
}

#[test]
fn test_format_version_constant_round_trips() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("ver.zvec");
    {
        VectorStore::open(&path, 4, config(8)).unwrap();
    }
    let bytes = std::fs::read(&path).unwrap();
    let version = i32::from_le_bytes(bytes[16..20].try_into().unwrap());
    assert_eq!(version, FORMAT_VERSION);
    let magic = i32::from_le_bytes(bytes[12..16].try_into().unwrap());
    assert_eq!(magic, 0x5A56_4543);
}
