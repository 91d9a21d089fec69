// SPDX-License-Identifier: MIT
//! # Param Records
//!
//! Schema-driven codec for the versioned, checksum-protected binary parameter
//! records distributed across a fleet-management deployment.
//!
//! ## Format Overview
//!
//! ```text
//! Record file (big-endian):
//! - Header: 16 bytes, common to every record type
//! - Payload: schema-specific fields, composites and runs
//! - Checksum: CRC32 of every preceding byte (4 bytes)
//! ```
//!
//! A [`Schema`] describes the layout as a tree of fields, composites and runs.
//! A run repeats an entry schema a literal number of times or as many times as
//! an earlier sibling field says, and may be kept sorted by one of its entry
//! fields. Decoding yields an [`Element`] tree whose nodes remember where in the
//! file they came from, so a single field can later be rewritten in place.
//!
//! ## Usage
//!
//! ```no_run
//! use param_records::catalog::{self, RecordHeader, RosterEntry};
//! use param_records::{overwrite_partial, read_record, write_full};
//!
//! # fn main() -> Result<(), param_records::RecordError> {
//! let schema = catalog::roster();
//! let mut record = catalog::new_record(&schema, &RecordHeader::default())?;
//! RosterEntry {
//!     id: "BUS0002".into(),
//!     sp_id: 1,
//!     effective_date: 0,
//!     bitmap: vec![0; 25],
//! }
//! .append_to(&mut record)?;
//! write_full("MDCSMBLA.SYS", &record)?;
//!
//! // Bump the version without re-encoding the rest of the file
//! let mut record = read_record("MDCSMBLA.SYS", &schema)?;
//! let version = record.get_path_mut(&catalog::PARAM_VERSION_PATH)?;
//! let next = version.as_int().unwrap_or_default() + 1;
//! version.set_int(next)?;
//! overwrite_partial("MDCSMBLA.SYS", version)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Hazards
//!
//! - Appending to a run with [`Element::append`] does not update the run's
//!   count field; use [`Element::append_entry`] or update it before writing.
//! - A partial rewrite trusts the offsets captured when the element was read.
//!   If the file changed shape in between, the write corrupts it.
//! - Text longer than its field is silently truncated, and integers are
//!   silently masked or truncated to their width.

pub mod catalog;
pub mod config;
pub mod element;
pub mod error;
pub mod primitive;
pub mod reader;
pub mod schema;
pub mod writer;

// Re-export main types
pub use config::Config;
pub use element::{create_blank, Element, NodeRef, Value};
pub use error::{DecodeError, EncodeError, RecordError, SchemaError};
pub use primitive::{Primitive, PrimitiveKind, Scalar};
pub use reader::{read_header, read_record, verify_record, Integrity};
pub use schema::{CountResolver, NodeDef, NodeId, Schema, SchemaNode};
pub use writer::{checksum, overwrite_partial, rewrite_checksum, write_full, CHECKSUM_SIZE};

/// Locate a directly named child of `element`
pub fn get_child<'a>(element: &'a Element, name: &str) -> Result<&'a Element, RecordError> {
    element.get_child(name)
}
