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

//! On-disk layout and the memory-mapped store file
//!
//! One backing file holds everything, in fixed section order:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header      1024 bytes, packed, little-endian                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Vectors     max_count × dim × 4 bytes (f32)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Graph       max_count × max_layers × max_neighbors × 4 (i32) │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Metadata    max_count × 512 bytes (zero-padded UTF-8)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ DocIds      max_count × 16 bytes (u128, LE)                  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Tombstones  max_count × 1 byte (0 = live, 1 = deleted)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every section is an array indexed by slot, so each access is one offset
//! multiplication and each mutation a localized write. Neighbour lists use
//! `-1` as the terminator; entries after the first `-1` are ignored.
//!
//! The vector and graph sections start at 4-byte-aligned offsets (the header
//! is 1024 bytes and every section size is a multiple of 4 except the
//! trailing tombstone bytes), which lets readers hand out `&[f32]`/`&[i32]`
//! views straight into the mapping.

use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;
use zvec_core::{DistanceFunction, DocId, Result, ZvecError};

/// Fixed header prefix size.
pub const HEADER_SIZE: usize = 1024;

/// File magic, spells "ZVEC".
pub const MAGIC: i32 = 0x5A56_4543;

/// Current format version. v1 lacked DocId and tombstone sections, v2 added
/// DocIds; older files are migrated on open.
pub const FORMAT_VERSION: i32 = 3;

/// Fixed metadata slot width.
pub const METADATA_SIZE: usize = 512;

/// Width of one DocId entry.
pub const DOC_ID_SIZE: usize = 16;

/// Neighbour-list terminator / "no slot" sentinel.
pub const NO_SLOT: i32 = -1;

// ============================================================================
// Header
// ============================================================================

/// The 1024-byte file header. Field order is normative.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub max_layers: i32,
    pub layer_probability: f64,
    pub magic: i32,
    pub version: i32,
    pub dim: i32,
    pub count: i32,
    pub max_count: i32,
    pub max_neighbors: i32,
    pub entry_point: i32,
    pub entry_point_level: i32,
    pub deleted_count: i32,
    pub distance_function: i32,
}

impl Header {
    /// Bytes actually carrying fields; the rest of the 1024 is zero padding.
    pub const ENCODED_LEN: usize = 52;

    pub fn new(
        dim: usize,
        max_count: usize,
        max_neighbors: usize,
        max_layers: usize,
        metric: DistanceFunction,
    ) -> Self {
        Header {
            max_layers: max_layers as i32,
            layer_probability: 1.0 / (max_neighbors as f64).ln(),
            magic: MAGIC,
            version: FORMAT_VERSION,
            dim: dim as i32,
            count: 0,
            max_count: max_count as i32,
            max_neighbors: max_neighbors as i32,
            entry_point: NO_SLOT,
            entry_point_level: 0,
            deleted_count: 0,
            distance_function: metric.as_i32(),
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.max_layers.to_le_bytes());
        buf[4..12].copy_from_slice(&self.layer_probability.to_le_bytes());
        buf[12..16].copy_from_slice(&self.magic.to_le_bytes());
        buf[16..20].copy_from_slice(&self.version.to_le_bytes());
        buf[20..24].copy_from_slice(&self.dim.to_le_bytes());
        buf[24..28].copy_from_slice(&self.count.to_le_bytes());
        buf[28..32].copy_from_slice(&self.max_count.to_le_bytes());
        buf[32..36].copy_from_slice(&self.max_neighbors.to_le_bytes());
        buf[36..40].copy_from_slice(&self.entry_point.to_le_bytes());
        buf[40..44].copy_from_slice(&self.entry_point_level.to_le_bytes());
        buf[44..48].copy_from_slice(&self.deleted_count.to_le_bytes());
        buf[48..52].copy_from_slice(&self.distance_function.to_le_bytes());
    }

    pub fn read_from(buf: &[u8]) -> Self {
        let i32_at = |off: usize| i32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Header {
            max_layers: i32_at(0),
            layer_probability: f64::from_le_bytes(buf[4..12].try_into().unwrap()),
            magic: i32_at(12),
            version: i32_at(16),
            dim: i32_at(20),
            count: i32_at(24),
            max_count: i32_at(28),
            max_neighbors: i32_at(32),
            entry_point: i32_at(36),
            entry_point_level: i32_at(40),
            deleted_count: i32_at(44),
            distance_function: i32_at(48),
        }
    }

    /// Reject files that are not ours or do not match the requested shape.
    pub fn validate(&self, expected_dim: usize) -> Result<()> {
        if self.magic != MAGIC {
            return Err(ZvecError::FormatMismatch(format!(
                "bad magic 0x{:08X} (expected 0x{MAGIC:08X})",
                self.magic
            )));
        }
        if self.version < 1 || self.version > FORMAT_VERSION {
            return Err(ZvecError::FormatMismatch(format!(
                "unsupported format version {} (newest known is {FORMAT_VERSION})",
                self.version
            )));
        }
        if self.dim as usize != expected_dim {
            return Err(ZvecError::FormatMismatch(format!(
                "file holds {}-dim vectors, caller requested {expected_dim}",
                self.dim
            )));
        }
        if self.max_layers <= 0 || self.max_neighbors <= 0 || self.max_count <= 0 {
            return Err(ZvecError::FormatMismatch(format!(
                "nonsensical header parameters: max_layers={}, max_neighbors={}, max_count={}",
                self.max_layers, self.max_neighbors, self.max_count
            )));
        }
        if self.count < 0 || self.count > self.max_count || self.deleted_count > self.count {
            return Err(ZvecError::FormatMismatch(format!(
                "inconsistent counters: count={}, deleted={}, max={}",
                self.count, self.deleted_count, self.max_count
            )));
        }
        if DistanceFunction::from_i32(self.distance_function).is_none() {
            return Err(ZvecError::FormatMismatch(format!(
                "unknown distance function {}",
                self.distance_function
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn metric(&self) -> DistanceFunction {
        // validate() has already rejected unknown values
        DistanceFunction::from_i32(self.distance_function).unwrap_or_default()
    }
}

// ============================================================================
// Section offsets
// ============================================================================

/// Precomputed section offsets for one (dim, max_count, M, L) shape.
#[derive(Debug, Clone, Copy)]
pub struct SectionLayout {
    pub dim: usize,
    pub max_count: usize,
    pub max_neighbors: usize,
    pub max_layers: usize,
    pub vectors_off: usize,
    pub graph_off: usize,
    pub metadata_off: usize,
    pub doc_ids_off: usize,
    pub tombstones_off: usize,
    pub file_len: usize,
}

impl SectionLayout {
    pub fn new(dim: usize, max_count: usize, max_neighbors: usize, max_layers: usize) -> Self {
        let vectors_off = HEADER_SIZE;
        let graph_off = vectors_off + max_count * dim * 4;
        let metadata_off = graph_off + max_count * max_layers * max_neighbors * 4;
        let doc_ids_off = metadata_off + max_count * METADATA_SIZE;
        let tombstones_off = doc_ids_off + max_count * DOC_ID_SIZE;
        let file_len = tombstones_off + max_count;
        SectionLayout {
            dim,
            max_count,
            max_neighbors,
            max_layers,
            vectors_off,
            graph_off,
            metadata_off,
            doc_ids_off,
            tombstones_off,
            file_len,
        }
    }

    pub fn for_header(header: &Header) -> Self {
        SectionLayout::new(
            header.dim as usize,
            header.max_count as usize,
            header.max_neighbors as usize,
            header.max_layers as usize,
        )
    }

    /// File length of this shape at an older format version. Sections only
    /// ever append, so migration is a pure extension.
    pub fn file_len_at_version(&self, version: i32) -> usize {
        match version {
            1 => self.doc_ids_off,
            2 => self.tombstones_off,
            _ => self.file_len,
        }
    }

    #[inline]
    pub fn vector_offset(&self, slot: u32) -> usize {
        self.vectors_off + slot as usize * self.dim * 4
    }

    #[inline]
    pub fn neighbors_offset(&self, slot: u32, layer: usize) -> usize {
        self.graph_off
            + (slot as usize * self.max_layers + layer) * self.max_neighbors * 4
    }

    #[inline]
    pub fn metadata_offset(&self, slot: u32) -> usize {
        self.metadata_off + slot as usize * METADATA_SIZE
    }

    #[inline]
    pub fn doc_id_offset(&self, slot: u32) -> usize {
        self.doc_ids_off + slot as usize * DOC_ID_SIZE
    }

    #[inline]
    pub fn tombstone_offset(&self, slot: u32) -> usize {
        self.tombstones_off + slot as usize
    }
}

// ============================================================================
// Mapped store file
// ============================================================================

/// The memory-mapped backing file with typed per-slot accessors.
///
/// `StoreFile` owns the mapping for its whole lifetime; callers never retain
/// pointers into it. All mutation goes through `&mut self`, which lines up
/// with the engine-wide writer lock one level up.
#[derive(Debug)]
pub struct StoreFile {
    file: File,
    mmap: MmapMut,
    layout: SectionLayout,
    pub header: Header,
    path: PathBuf,
}

impl StoreFile {
    /// Create a fresh backing file of exactly the computed size.
    ///
    /// An existing file at `path` is truncated; the engine only calls this
    /// after deciding the path does not hold a store yet (or for vacuum
    /// scratch files).
    pub fn create(
        path: &Path,
        dim: usize,
        max_count: usize,
        max_neighbors: usize,
        max_layers: usize,
        metric: DistanceFunction,
    ) -> Result<Self> {
        if dim == 0 {
            return Err(ZvecError::InvalidParameter("dim must be > 0".into()));
        }
        if max_count == 0 {
            return Err(ZvecError::InvalidParameter("max_count must be > 0".into()));
        }
        if max_neighbors < 2 {
            return Err(ZvecError::InvalidParameter(
                "max_neighbors must be >= 2 (layer probability is 1/ln(M))".into(),
            ));
        }
        if max_layers == 0 {
            return Err(ZvecError::InvalidParameter("max_layers must be > 0".into()));
        }

        let layout = SectionLayout::new(dim, max_count, max_neighbors, max_layers);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(layout.file_len as u64)?;

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let header = Header::new(dim, max_count, max_neighbors, max_layers, metric);

        let mut store = StoreFile {
            file,
            mmap,
            layout,
            header,
            path: path.to_path_buf(),
        };
        store.flush_header()?;
        debug!(path = %store.path.display(), dim, max_count, "created store file");
        Ok(store)
    }

    /// Open an existing backing file, migrating older format versions.
    pub fn open(path: &Path, expected_dim: usize) -> Result<Self> {
        let mut header = crate::migration::read_header(path)?;
        header.validate(expected_dim)?;

        if header.version < FORMAT_VERSION {
            crate::migration::upgrade(path, &mut header)?;
        }

        let layout = SectionLayout::for_header(&header);
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let actual_len = file.metadata()?.len() as usize;
        if actual_len != layout.file_len {
            return Err(ZvecError::FormatMismatch(format!(
                "file is {actual_len} bytes, layout wants {}",
                layout.file_len
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!(
            path = %path.display(),
            count = header.count,
            deleted = header.deleted_count,
            "opened store file"
        );
        Ok(StoreFile {
            file,
            mmap,
            layout,
            header,
            path: path.to_path_buf(),
        })
    }

    #[inline]
    pub fn layout(&self) -> &SectionLayout {
        &self.layout
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn metric(&self) -> DistanceFunction {
        self.header.metric()
    }

    // ------------------------------------------------------------------
    // Vectors
    // ------------------------------------------------------------------

    /// Borrow one stored vector straight out of the mapping.
    #[inline]
    pub fn vector(&self, slot: u32) -> &[f32] {
        let off = self.layout.vector_offset(slot);
        let bytes = &self.mmap[off..off + self.layout.dim * 4];
        debug_assert_eq!(bytes.as_ptr() as usize % 4, 0);
        unsafe { std::slice::from_raw_parts(bytes.as_ptr() as *const f32, self.layout.dim) }
    }

    pub fn write_vector(&mut self, slot: u32, vector: &[f32]) {
        debug_assert_eq!(vector.len(), self.layout.dim);
        let off = self.layout.vector_offset(slot);
        let dst = &mut self.mmap[off..off + self.layout.dim * 4];
        for (chunk, value) in dst.chunks_exact_mut(4).zip(vector.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }

    // ------------------------------------------------------------------
    // Neighbour lists
    // ------------------------------------------------------------------

    /// Borrow the raw `max_neighbors`-wide list for (slot, layer). Entries
    /// after the first `NO_SLOT` are garbage.
    #[inline]
    pub fn neighbors(&self, slot: u32, layer: usize) -> &[i32] {
        debug_assert!(layer < self.layout.max_layers);
        let off = self.layout.neighbors_offset(slot, layer);
        let bytes = &self.mmap[off..off + self.layout.max_neighbors * 4];
        unsafe {
            std::slice::from_raw_parts(bytes.as_ptr() as *const i32, self.layout.max_neighbors)
        }
    }

    /// Overwrite the list for (slot, layer); short input is tail-padded with
    /// `NO_SLOT`.
    pub fn write_neighbors(&mut self, slot: u32, layer: usize, neighbors: &[i32]) {
        debug_assert!(neighbors.len() <= self.layout.max_neighbors);
        let off = self.layout.neighbors_offset(slot, layer);
        let dst = &mut self.mmap[off..off + self.layout.max_neighbors * 4];
        for (i, chunk) in dst.chunks_exact_mut(4).enumerate() {
            let value = neighbors.get(i).copied().unwrap_or(NO_SLOT);
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }

    /// Reset every layer of one slot to the empty list.
    pub fn clear_neighbors(&mut self, slot: u32) {
        for layer in 0..self.layout.max_layers {
            self.write_neighbors(slot, layer, &[]);
        }
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// The full 512-byte metadata slot, padding included.
    #[inline]
    pub fn metadata_raw(&self, slot: u32) -> &[u8] {
        let off = self.layout.metadata_offset(slot);
        &self.mmap[off..off + METADATA_SIZE]
    }

    /// Metadata with the zero padding trimmed off.
    pub fn metadata(&self, slot: u32) -> &[u8] {
        let raw = self.metadata_raw(slot);
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        &raw[..end]
    }

    /// Write metadata, zero-padding the remainder of the slot.
    pub fn write_metadata(&mut self, slot: u32, meta: &[u8]) {
        debug_assert!(meta.len() <= METADATA_SIZE);
        let off = self.layout.metadata_offset(slot);
        let dst = &mut self.mmap[off..off + METADATA_SIZE];
        dst[..meta.len()].copy_from_slice(meta);
        dst[meta.len()..].fill(0);
    }

    // ------------------------------------------------------------------
    // DocIds
    // ------------------------------------------------------------------

    #[inline]
    pub fn doc_id(&self, slot: u32) -> DocId {
        let off = self.layout.doc_id_offset(slot);
        DocId::from_le_bytes(self.mmap[off..off + DOC_ID_SIZE].try_into().unwrap())
    }

    pub fn write_doc_id(&mut self, slot: u32, id: DocId) {
        let off = self.layout.doc_id_offset(slot);
        self.mmap[off..off + DOC_ID_SIZE].copy_from_slice(&id.to_le_bytes());
    }

    // ------------------------------------------------------------------
    // Tombstones
    // ------------------------------------------------------------------

    #[inline]
    pub fn tombstone(&self, slot: u32) -> bool {
        self.mmap[self.layout.tombstone_offset(slot)] != 0
    }

    pub fn write_tombstone(&mut self, slot: u32, deleted: bool) {
        let off = self.layout.tombstone_offset(slot);
        self.mmap[off] = deleted as u8;
    }

    // ------------------------------------------------------------------
    // Durability
    // ------------------------------------------------------------------

    /// Publish the in-memory header to the mapping and sync that range.
    ///
    /// Every mutating operation calls this last; the header is the commit
    /// point for crash recovery.
    pub fn flush_header(&mut self) -> Result<()> {
        self.header.write_to(&mut self.mmap[..Header::ENCODED_LEN]);
        self.mmap.flush_range(0, HEADER_SIZE)?;
        Ok(())
    }

    /// Sync one tombstone byte. Delete flushes this before rewiring the
    /// graph so a crash can only leave stale edges, never a live ghost.
    pub fn flush_tombstone(&self, slot: u32) -> Result<()> {
        self.mmap.flush_range(self.layout.tombstone_offset(slot), 1)?;
        Ok(())
    }

    /// Sync the whole mapping.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }

    /// File handle, used by vacuum to fsync before the atomic rename.
    pub fn sync_file(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
