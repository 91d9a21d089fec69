// SPDX-License-Identifier: MIT
//! Built-in record schemas
//!
//! Every record starts with the same 16-byte header followed by a
//! schema-specific payload. The payloads here are a count field followed by a
//! run of entries sorted by a key field.
//!
//! ```text
//! Header (16 bytes, big-endian):
//! - file_id: u16
//! - format_version: u8
//! - param_version: s16
//! - length: u32 (total file size, checksum included)
//! - eff_datetime: s32 (epoch seconds)
//! - location_id: u16
//! - unused: u8
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::element::{create_blank, Element};
use crate::error::{RecordError, Result, SchemaError};
use crate::primitive::Primitive;
use crate::schema::{CountResolver, NodeDef, Schema};

/// Encoded header size in bytes
pub const HEADER_SIZE: usize = 16;

/// Name of the header composite inside every record
pub const HEADER: &str = "header";

/// Path from a record root to the header's length field
pub const LENGTH_PATH: [&str; 2] = [HEADER, "length"];

/// Path from a record root to the header's parameter version field
pub const PARAM_VERSION_PATH: [&str; 2] = [HEADER, "param_version"];

pub fn header_def() -> NodeDef {
    NodeDef::composite(
        HEADER,
        vec![
            NodeDef::field("file_id", Primitive::U16),
            NodeDef::field("format_version", Primitive::U8),
            NodeDef::field("param_version", Primitive::S16),
            NodeDef::field("length", Primitive::U32),
            NodeDef::field("eff_datetime", Primitive::S32),
            NodeDef::field("location_id", Primitive::U16),
            NodeDef::field("unused", Primitive::U8),
        ],
    )
}

/// Define a record type: the common header followed by `payload`
pub fn define_record(name: &str, payload: Vec<NodeDef>) -> Result<Arc<Schema>, SchemaError> {
    let mut children = Vec::with_capacity(payload.len() + 1);
    children.push(header_def());
    children.extend(payload);
    Schema::build(NodeDef::composite(name, children))
}

fn counted_run(
    count_field: &str,
    count: Primitive,
    run: &str,
    entry: &str,
    fields: Vec<NodeDef>,
    sort_key: &str,
) -> Vec<NodeDef> {
    vec![
        NodeDef::field(count_field, count),
        NodeDef::sorted_run(
            run,
            NodeDef::composite(entry, fields),
            CountResolver::Named(count_field.to_string()),
            sort_key,
        ),
    ]
}

static HEADER_SCHEMA: Lazy<Arc<Schema>> =
    Lazy::new(|| Schema::build(header_def()).expect("header schema is valid"));

static ROSTER: Lazy<Arc<Schema>> = Lazy::new(|| {
    define_record(
        "roster",
        counted_run(
            "num_entries",
            Primitive::U32,
            "entries",
            "entry",
            vec![
                NodeDef::field("id", Primitive::text(8)),
                NodeDef::field("sp_id", Primitive::U8),
                NodeDef::field("effective_date", Primitive::S32),
                NodeDef::field("bitmap", Primitive::bytes(25)),
            ],
            "id",
        ),
    )
    .expect("roster schema is valid")
});

static GROUP_ROSTER: Lazy<Arc<Schema>> = Lazy::new(|| {
    let group_bitmap = Primitive::U8.masked(3).expect("3 bits fit in a byte");
    define_record(
        "group_roster",
        counted_run(
            "num_entries",
            Primitive::U32,
            "entries",
            "entry",
            vec![
                NodeDef::field("id", Primitive::text(8)),
                NodeDef::field("group_bitmap", group_bitmap),
            ],
            "id",
        ),
    )
    .expect("group roster schema is valid")
});

static PROVIDER_CATALOG: Lazy<Arc<Schema>> = Lazy::new(|| {
    define_record(
        "provider_catalog",
        counted_run(
            "num_files",
            Primitive::U8,
            "files",
            "file",
            vec![
                NodeDef::field("file_id", Primitive::U16),
                NodeDef::field("file_name", Primitive::text(12)),
                NodeDef::field("version", Primitive::U16),
                NodeDef::field("path", Primitive::text(32)),
            ],
            "file_name",
        ),
    )
    .expect("provider catalog schema is valid")
});

static CATALOG: Lazy<Arc<Schema>> = Lazy::new(|| {
    define_record(
        "catalog",
        counted_run(
            "num_files",
            Primitive::U16,
            "files",
            "file",
            vec![
                NodeDef::field("sp_id", Primitive::U8),
                NodeDef::field("depot_id", Primitive::U16),
                NodeDef::field("file_id", Primitive::U16),
                NodeDef::field("file_name", Primitive::text(12)),
                NodeDef::field("version", Primitive::U16),
                NodeDef::field("path", Primitive::text(32)),
            ],
            "file_name",
        ),
    )
    .expect("catalog schema is valid")
});

static FLEET: Lazy<Arc<Schema>> = Lazy::new(|| {
    define_record(
        "fleet",
        counted_run(
            "num_entries",
            Primitive::U16,
            "entries",
            "entry",
            vec![
                NodeDef::field("id", Primitive::text(8)),
                NodeDef::field("group", Primitive::U8),
                NodeDef::field("kind", Primitive::U8),
            ],
            "id",
        ),
    )
    .expect("fleet schema is valid")
});

/// The header on its own, for reading just the first 16 bytes of any record
pub fn header() -> Arc<Schema> {
    Arc::clone(&HEADER_SCHEMA)
}

/// Vehicle roster: `id`, service provider, effective date and a 200-bit bitmap
pub fn roster() -> Arc<Schema> {
    Arc::clone(&ROSTER)
}

/// Vehicle ids with a 3-bit group mask
pub fn group_roster() -> Arc<Schema> {
    Arc::clone(&GROUP_ROSTER)
}

/// Files published for one service provider depot
pub fn provider_catalog() -> Arc<Schema> {
    Arc::clone(&PROVIDER_CATALOG)
}

/// Files published across all providers and depots
pub fn catalog() -> Arc<Schema> {
    Arc::clone(&CATALOG)
}

/// Vehicle ids with group and kind codes
pub fn fleet() -> Arc<Schema> {
    Arc::clone(&FLEET)
}

/// Names accepted by [`by_name`]
pub fn names() -> &'static [&'static str] {
    &[
        "header",
        "roster",
        "group_roster",
        "provider_catalog",
        "catalog",
        "fleet",
    ]
}

pub fn by_name(name: &str) -> Option<Arc<Schema>> {
    match name {
        "header" => Some(header()),
        "roster" => Some(roster()),
        "group_roster" => Some(group_roster()),
        "provider_catalog" => Some(provider_catalog()),
        "catalog" => Some(catalog()),
        "fleet" => Some(fleet()),
        _ => None,
    }
}

/// Typed view of the common header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordHeader {
    pub file_id: u16,
    pub format_version: u8,
    pub param_version: i16,
    pub length: u32,
    pub eff_datetime: i32,
    pub location_id: u16,
}

impl RecordHeader {
    /// Read from a header element
    pub fn from_element(header: &Element) -> Result<Self> {
        let int = |name: &str| -> Result<i64> {
            let field = header.get_child(name)?;
            field
                .as_int()
                .ok_or_else(|| RecordError::NotAField(field.name().to_string()))
        };
        Ok(Self {
            file_id: int("file_id")? as u16,
            format_version: int("format_version")? as u8,
            param_version: int("param_version")? as i16,
            length: int("length")? as u32,
            eff_datetime: int("eff_datetime")? as i32,
            location_id: int("location_id")? as u16,
        })
    }

    /// Write every field into a header element; `unused` is zeroed
    pub fn apply(&self, header: &mut Element) -> Result<()> {
        header.get_child_mut("file_id")?.set_int(self.file_id.into())?;
        header
            .get_child_mut("format_version")?
            .set_int(self.format_version.into())?;
        header
            .get_child_mut("param_version")?
            .set_int(self.param_version.into())?;
        header.get_child_mut("length")?.set_int(self.length.into())?;
        header
            .get_child_mut("eff_datetime")?
            .set_int(self.eff_datetime.into())?;
        header
            .get_child_mut("location_id")?
            .set_int(self.location_id.into())?;
        header.get_child_mut("unused")?.set_int(0)?;
        Ok(())
    }

    /// Effective date as UTC, if the stored seconds are representable
    pub fn effective_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.eff_datetime.into(), 0)
    }
}

/// Blank record of `schema` with its header filled in
pub fn new_record(schema: &Arc<Schema>, header: &RecordHeader) -> Result<Element> {
    let mut record = create_blank(schema);
    header.apply(record.get_child_mut(HEADER)?)?;
    Ok(record)
}

/// One entry of a [`roster`] record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub sp_id: u8,
    pub effective_date: i32,
    pub bitmap: Vec<u8>,
}

impl RosterEntry {
    /// Append to a roster record, keeping `entries` sorted and `num_entries` in step
    pub fn append_to(&self, record: &mut Element) -> Result<()> {
        let mut entry = record.get_child("entries")?.new_entry()?;
        entry.get_child_mut("id")?.set_text(self.id.as_str())?;
        entry.get_child_mut("sp_id")?.set_int(self.sp_id.into())?;
        entry
            .get_child_mut("effective_date")?
            .set_int(self.effective_date.into())?;
        entry.get_child_mut("bitmap")?.set_bytes(self.bitmap.clone())?;
        record.append_entry("entries", entry)
    }

    pub fn from_element(entry: &Element) -> Result<Self> {
        let field = |name: &str| entry.get_child(name);
        Ok(Self {
            id: field("id")?.as_text().unwrap_or_default().to_string(),
            sp_id: field("sp_id")?.as_int().unwrap_or_default() as u8,
            effective_date: field("effective_date")?.as_int().unwrap_or_default() as i32,
            bitmap: field("bitmap")?.as_bytes().unwrap_or_default().to_vec(),
        })
    }
}

/// One entry of a [`catalog`] record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFile {
    pub sp_id: u8,
    pub depot_id: u16,
    pub file_id: u16,
    pub file_name: String,
    pub version: u16,
    pub path: String,
}

impl CatalogFile {
    /// Append to a catalog record, keeping `files` sorted and `num_files` in step
    pub fn append_to(&self, record: &mut Element) -> Result<()> {
        let mut file = record.get_child("files")?.new_entry()?;
        file.get_child_mut("sp_id")?.set_int(self.sp_id.into())?;
        file.get_child_mut("depot_id")?.set_int(self.depot_id.into())?;
        file.get_child_mut("file_id")?.set_int(self.file_id.into())?;
        file.get_child_mut("file_name")?
            .set_text(self.file_name.as_str())?;
        file.get_child_mut("version")?.set_int(self.version.into())?;
        file.get_child_mut("path")?.set_text(self.path.as_str())?;
        record.append_entry("files", file)
    }
}
