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

//! Format migration for pre-v3 store files
//!
//! Version history:
//!
//! - **v1**: header + vectors + graph + metadata only
//! - **v2**: adds the DocId section
//! - **v3**: adds the tombstone section (current)
//!
//! Sections only ever append to the end of the file, so upgrading is a pure
//! extension: grow the file to the v3 length (the OS zero-fills, which makes
//! every tombstone "live"), seed the DocId section with fresh random ids when
//! coming from v1, and bump the header version. Nothing moves, and a crash
//! mid-migration just re-runs it on the next open (re-seeding v1 DocIds is
//! harmless because the version bump is the last write).

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;
use zvec_core::{DocId, Result, ZvecError};

use crate::layout::{FORMAT_VERSION, Header, HEADER_SIZE, SectionLayout};

/// Read just the header of a store file, without mapping it.
pub fn read_header(path: &Path) -> Result<Header> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    let len = file.metadata()?.len() as usize;
    if len < HEADER_SIZE {
        return Err(ZvecError::FormatMismatch(format!(
            "file is {len} bytes, smaller than the {HEADER_SIZE}-byte header"
        )));
    }
    let mut buf = [0u8; HEADER_SIZE];
    file.read_exact(&mut buf)?;
    Ok(Header::read_from(&buf))
}

/// Upgrade a v1/v2 file in place to the current format.
///
/// The caller has already validated magic and dimension. On return the file
/// has the v3 length and `header.version == FORMAT_VERSION`.
pub fn upgrade(path: &Path, header: &mut Header) -> Result<()> {
    let from_version = header.version;
    let layout = SectionLayout::for_header(header);

    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let actual_len = file.metadata()?.len() as usize;
    let expected_len = layout.file_len_at_version(from_version);
    if actual_len != expected_len {
        return Err(ZvecError::FormatMismatch(format!(
            "v{from_version} file is {actual_len} bytes, layout wants {expected_len}"
        )));
    }

    // Grow to the v3 length; the new tail (DocIds and/or tombstones) reads
    // as zeros, which is exactly "no tombstones".
    file.set_len(layout.file_len as u64)?;

    if from_version < 2 {
        // v1 predates external identifiers: mint a fresh DocId per occupied
        // slot so the identifier index has something stable to hand out.
        for slot in 0..header.count as u32 {
            file.seek(SeekFrom::Start(layout.doc_id_offset(slot) as u64))?;
            file.write_all(&DocId::random().to_le_bytes())?;
        }
    }

    header.version = FORMAT_VERSION;
    let mut buf = [0u8; Header::ENCODED_LEN];
    header.write_to(&mut buf);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&buf)?;
    file.sync_all()?;

    info!(
        path = %path.display(),
        from_version,
        count = header.count,
        "migrated store file to format v{FORMAT_VERSION}"
    );
    Ok(())
}
