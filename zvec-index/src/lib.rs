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

//! ZVEC Index Layer
//!
//! An embedded, single-file, in-process approximate-nearest-neighbor vector
//! store. One memory-mapped file holds vectors, the HNSW graph, metadata,
//! DocIds and tombstones in fixed slot-addressed sections; one process opens
//! it, concurrent readers and a single writer share it through an
//! engine-wide lock.
//!
//! ```rust,no_run
//! use zvec_index::{StoreConfig, VectorStore};
//!
//! # fn main() -> zvec_core::Result<()> {
//! let store = VectorStore::open("embeddings.zvec", 128, StoreConfig::default())?;
//!
//! let id = store.add(&vec![0.1; 128], b"{\"title\":\"intro\"}", None)?;
//! let hits = store.search(&vec![0.1; 128], 10)?;
//! assert_eq!(hits[0].doc_id, id);
//!
//! store.delete(id)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module map
//!
//! - [`layout`]: on-disk format and the mapped [`layout::StoreFile`]
//! - [`migration`]: v1/v2 → v3 upgrades on open
//! - [`id_index`]: DocId → slot map, rebuilt on open
//! - [`score`]: SIMD dot-product kernels (AVX2/NEON/scalar)
//! - [`hnsw`]: graph construction and traversal
//! - [`tombstones`]: soft-delete set and eager graph repair
//! - [`scan`]: rayon-parallel exact top-K
//! - [`store`]: the [`VectorStore`] engine surface
//! - [`metrics`]: Prometheus counters/histograms/gauges

pub mod hnsw;
pub mod id_index;
pub mod layout;
pub mod metrics;
pub mod migration;
mod scan;
pub mod score;
pub mod store;
pub mod tombstones;

pub use hnsw::ScoredSlot;
pub use layout::{FORMAT_VERSION, MAGIC, METADATA_SIZE, NO_SLOT};
pub use score::{ScoreKernel, SimdLevel, l2_normalize};
pub use store::{DEFAULT_EF_SEARCH, SearchResult, StoreConfig, StoreStats, VectorStore};
pub use zvec_core::{DistanceFunction, DocId, Result, ZvecError};
