// SPDX-License-Identifier: MIT
//! Record writers: full rewrites and in-place partial rewrites
//!
//! Every record file ends with a big-endian CRC32 of all preceding bytes. A
//! full write also stores the final file size in the header's `length` field.
//! A partial rewrite overwrites one previously decoded element where it was
//! read from and refreshes the checksum, leaving `length` alone.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::catalog::{HEADER, LENGTH_PATH};
use crate::element::Element;
use crate::error::{RecordError, Result};
use crate::primitive::Scalar;

/// Size of the trailing checksum in bytes
pub const CHECKSUM_SIZE: usize = 4;

/// CRC32 used for the trailing checksum
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Encode `element` as a complete file at `path`
///
/// The header's `length` field is set to the final file size and the CRC32 of
/// everything before it is appended, so a single checksum pass is needed. The
/// element itself is left unchanged. Returns the number of bytes written.
pub fn write_full(path: impl AsRef<Path>, element: &Element) -> Result<u64> {
    let path = path.as_ref();
    let mut buffer = element.encode()?;
    let total = buffer.len() + CHECKSUM_SIZE;

    match length_field(element) {
        Some((offset, field)) => {
            let mut patch = Vec::with_capacity(4);
            if let Some(primitive) = field.node().node().primitive() {
                primitive.encode(&Scalar::Int(total as i64), field.name(), &mut patch)?;
            }
            if let Some(slot) = buffer.get_mut(offset..offset + patch.len()) {
                slot.copy_from_slice(&patch);
            }
        }
        None => debug!("{} has no header length field to patch", element.name()),
    }

    let crc = checksum(&buffer);
    buffer.extend_from_slice(&crc.to_be_bytes());
    debug_assert_eq!(buffer.len(), total);

    debug!(
        "Writing {} ({} bytes, crc={:08x}) to {:?}",
        element.name(),
        total,
        crc,
        path
    );
    replace_file(path, &buffer)?;
    Ok(total as u64)
}

/// Overwrite the bytes of a decoded element in place and refresh the checksum
///
/// The element must come from reading this same file, and the file must not
/// have changed shape since; otherwise the write lands on the wrong bytes.
pub fn overwrite_partial(path: impl AsRef<Path>, element: &Element) -> Result<()> {
    let path = path.as_ref();
    let io = |e| RecordError::io(path, e);

    let offset = element
        .offset()
        .ok_or_else(|| RecordError::NoOffset(element.name().to_string()))?;
    let bytes = element.encode()?;

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(io)?;
    let file_len = file.metadata().map_err(io)?.len();
    if file_len < CHECKSUM_SIZE as u64 {
        return Err(RecordError::TooSmall {
            path: path.to_path_buf(),
            len: file_len,
        });
    }
    if offset + bytes.len() as u64 > file_len - CHECKSUM_SIZE as u64 {
        return Err(RecordError::OutOfBounds {
            offset,
            len: bytes.len(),
            file_len,
        });
    }

    debug!(
        "Overwriting {} at offset {} ({} bytes) in {:?}",
        element.name(),
        offset,
        bytes.len(),
        path
    );
    file.seek(SeekFrom::Start(offset)).map_err(io)?;
    file.write_all(&bytes).map_err(io)?;
    let crc = store_checksum(&mut file, file_len).map_err(io)?;
    file.sync_all().map_err(io)?;
    debug!("Checksum of {:?} is now {:08x}", path, crc);
    Ok(())
}

/// Recompute and store the trailing checksum of an existing file
pub fn rewrite_checksum(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();
    let io = |e| RecordError::io(path, e);

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(io)?;
    let file_len = file.metadata().map_err(io)?.len();
    if file_len < CHECKSUM_SIZE as u64 {
        return Err(RecordError::TooSmall {
            path: path.to_path_buf(),
            len: file_len,
        });
    }
    let crc = store_checksum(&mut file, file_len).map_err(io)?;
    file.sync_all().map_err(io)?;
    Ok(crc)
}

fn store_checksum(file: &mut File, file_len: u64) -> std::io::Result<u32> {
    let body_len = file_len - CHECKSUM_SIZE as u64;
    let mut body = Vec::with_capacity(body_len as usize);
    file.seek(SeekFrom::Start(0))?;
    Read::by_ref(file).take(body_len).read_to_end(&mut body)?;

    let crc = checksum(&body);
    file.seek(SeekFrom::Start(body_len))?;
    file.write_all(&crc.to_be_bytes())?;
    Ok(crc)
}

/// Locate the header length field relative to the start of `element`
fn length_field(element: &Element) -> Option<(usize, &Element)> {
    let path: &[&str] = if element.name() == HEADER {
        &["length"]
    } else {
        &LENGTH_PATH
    };
    let field = element.get_path(path).ok()?;
    let node = element.node();
    let offset = node.schema().static_offset_in(node.id(), path)?;
    Some((offset, field))
}

/// Write to a sibling temp file, sync, then rename over `path`
///
/// A symlink at `path` is followed so the link itself survives, and an existing
/// file's permissions carry over to its replacement. Hard links to the old file
/// keep the old contents.
fn replace_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        Err(_) => path.to_path_buf(),
    };
    let existing = fs::metadata(&target).ok().map(|m| m.permissions());
    let temp_path = temp_path_for(&target);

    let written = write_synced(&temp_path, bytes).and_then(|()| match existing {
        Some(permissions) => fs::set_permissions(&temp_path, permissions),
        None => Ok(()),
    });
    if let Err(e) = written {
        warn!("Failed to write temp file {:?}: {}", temp_path, e);
        let _ = fs::remove_file(&temp_path);
        return Err(RecordError::io(path, e));
    }

    if let Err(e) = fs::rename(&temp_path, &target) {
        let _ = fs::remove_file(&temp_path);
        return Err(RecordError::io(path, e));
    }
    Ok(())
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}
