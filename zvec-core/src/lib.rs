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

//! ZVEC Core Types
//!
//! Shared vocabulary for the zvec embedded vector store:
//!
//! - [`ZvecError`] / [`Result`]: the workspace-wide error enum
//! - [`DocId`]: the 128-bit stable external document identifier
//! - [`DistanceFunction`]: the similarity metric recorded in the file header
//!
//! Everything that touches the on-disk format or the engine surface speaks in
//! these types; the engine itself lives in `zvec-index`.

pub mod doc_id;
pub mod error;
pub mod metric;

pub use doc_id::DocId;
pub use error::{Result, ZvecError};
pub use metric::DistanceFunction;
