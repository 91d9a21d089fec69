// SPDX-License-Identifier: MIT
//! Record readers

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{self, RecordHeader, HEADER_SIZE};
use crate::element::Element;
use crate::error::{RecordError, Result};
use crate::schema::Schema;
use crate::writer::{checksum, CHECKSUM_SIZE};

/// Decode a whole record file
///
/// Offsets of the returned elements are relative to the start of the file and
/// stay valid for [`overwrite_partial`](crate::writer::overwrite_partial) until
/// the file changes shape.
pub fn read_record(path: impl AsRef<Path>, schema: &Arc<Schema>) -> Result<Element> {
    let path = path.as_ref();
    let bytes = read_file(path)?;
    debug!(
        "Decoding {:?} as {} ({} bytes)",
        path,
        schema.name(),
        bytes.len()
    );
    Ok(schema.decode(&bytes)?)
}

/// Decode only the common header of a record file
pub fn read_header(path: impl AsRef<Path>) -> Result<RecordHeader> {
    let path = path.as_ref();
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    File::open(path)
        .and_then(|file| file.take(HEADER_SIZE as u64).read_to_end(&mut bytes))
        .map_err(|e| RecordError::io(path, e))?;
    let header = catalog::header().decode(&bytes)?;
    RecordHeader::from_element(&header)
}

/// Result of checking a record file's trailing checksum and length field
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Integrity {
    pub stored_crc: u32,
    pub computed_crc: u32,
    /// Header length field, if the file is long enough to hold a header
    pub stored_length: Option<u32>,
    pub file_length: u64,
}

impl Integrity {
    pub fn checksum_ok(&self) -> bool {
        self.stored_crc == self.computed_crc
    }

    pub fn length_ok(&self) -> bool {
        self.stored_length.map(u64::from) == Some(self.file_length)
    }

    pub fn is_valid(&self) -> bool {
        self.checksum_ok() && self.length_ok()
    }
}

/// Check a record file's checksum and header length against its contents
pub fn verify_record(path: impl AsRef<Path>) -> Result<Integrity> {
    let path = path.as_ref();
    let bytes = read_file(path)?;
    if bytes.len() < CHECKSUM_SIZE {
        return Err(RecordError::TooSmall {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }

    let (body, tail) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let stored_crc = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]);
    let stored_length = if body.len() >= HEADER_SIZE {
        let header = catalog::header().decode(body)?;
        Some(RecordHeader::from_element(&header)?.length)
    } else {
        None
    };

    let integrity = Integrity {
        stored_crc,
        computed_crc: checksum(body),
        stored_length,
        file_length: bytes.len() as u64,
    };
    if !integrity.checksum_ok() {
        warn!(
            "Checksum mismatch in {:?}: stored {:08x}, computed {:08x}",
            path, integrity.stored_crc, integrity.computed_crc
        );
    }
    if !integrity.length_ok() {
        warn!(
            "Length mismatch in {:?}: header says {:?}, file has {} bytes",
            path, integrity.stored_length, integrity.file_length
        );
    }
    Ok(integrity)
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| RecordError::io(path, e))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| RecordError::io(path, e))?;
    Ok(bytes)
}
