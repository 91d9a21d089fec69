// SPDX-License-Identifier: MIT
//! Error types for schema construction, decoding, encoding and record file operations

use std::path::{Path, PathBuf};

/// Errors raised while building a schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown primitive descriptor: {0:?}")]
    UnknownPrimitive(String),

    #[error("Invalid bit width {bits} for a {width}-byte integer")]
    InvalidBitWidth { bits: u32, width: usize },

    #[error("Bit masks only apply to integers, not {0}")]
    MaskOnBytes(String),

    #[error("Text flag only applies to fixed-length bytes, not {0}")]
    TextOnInteger(String),

    #[error("Run {run} counts on {field}, which is not declared before it in the same composite")]
    CountFieldNotDeclared { run: String, field: String },

    #[error("Run {run} counts on {field}, which is not an integer field")]
    CountFieldNotInteger { run: String, field: String },

    #[error("Run {run} sorts on {key}, which is not a field of its entries")]
    UnknownSortKey { run: String, key: String },

    #[error("Composite {parent} declares {name} more than once")]
    DuplicateChild { parent: String, name: String },
}

/// Errors raised while decoding bytes into elements
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Truncated at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Invalid text encoding at offset {offset}")]
    InvalidEncoding { offset: usize },

    #[error("Count field {field} holds {value}, which is not a valid repeat count")]
    InvalidCount { field: String, value: i64 },

    #[error("Run {run} decoded before its count was resolved")]
    UnresolvedCount { run: String },
}

/// Errors raised while encoding elements into bytes
///
/// Out-of-range integers are never an error: they are masked or truncated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Field {field} expects {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("Field {field} holds non-ASCII text")]
    InvalidEncoding { field: String },
}

/// Errors returned by record operations
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{parent} has no child named {name}")]
    NoSuchChild { parent: String, name: String },

    #[error("{0} is not a run")]
    NotARun(String),

    #[error("{0} is not a composite")]
    NotAComposite(String),

    #[error("{0} is not a field")]
    NotAField(String),

    #[error("Entry {entry} does not belong to run {run}")]
    ForeignEntry { run: String, entry: String },

    #[error("{0} was not decoded from a file and has no offset")]
    NoOffset(String),

    #[error("Span {offset}+{len} does not fit before the checksum of a {file_len}-byte file")]
    OutOfBounds {
        offset: u64,
        len: usize,
        file_len: u64,
    },

    #[error("{} is {len} bytes, too small to hold a checksum", path.display())]
    TooSmall { path: PathBuf, len: u64 },
}

impl RecordError {
    /// Attach a path to an I/O error, sorting out the kinds callers care about
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => RecordError::NotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => RecordError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => RecordError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

pub type Result<T, E = RecordError> = std::result::Result<T, E>;
