// SPDX-License-Identifier: MIT
//! Decoded record values
//!
//! An [`Element`] mirrors one schema node. Elements produced by decoding carry
//! the byte offset they were read from, which is what makes partial rewrites
//! possible. Elements built with [`Element::blank`] have no offset.

use std::fmt;
use std::sync::Arc;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{EncodeError, RecordError, Result};
use crate::primitive::Scalar;
use crate::schema::{CountResolver, NodeId, Schema, SchemaNode};

/// Shared handle to one node of a schema
#[derive(Clone)]
pub struct NodeRef {
    schema: Arc<Schema>,
    id: NodeId,
}

impl NodeRef {
    pub fn new(schema: Arc<Schema>, id: NodeId) -> Self {
        Self { schema, id }
    }

    #[inline]
    pub fn node(&self) -> &SchemaNode {
        self.schema.node(self.id)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.node().name()
    }

    fn with_id(&self, id: NodeId) -> NodeRef {
        NodeRef::new(Arc::clone(&self.schema), id)
    }

    fn same_node(&self, other: &NodeRef) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.schema, &other.schema)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("schema", &self.schema.name())
            .field("node", &self.name())
            .finish()
    }
}

/// Value held by an element: a scalar for fields, child elements otherwise
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Element>),
}

/// One node of a decoded (or freshly built) record
#[derive(Debug, Clone)]
pub struct Element {
    node: NodeRef,
    value: Value,
    offset: Option<u64>,
}

/// Elements compare by schema node and value; offsets are ignored
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.node.same_node(&other.node) && self.value == other.value
    }
}

impl Element {
    pub(crate) fn decoded(node: NodeRef, value: Value, offset: usize) -> Self {
        Self {
            node,
            value,
            offset: Some(offset as u64),
        }
    }

    /// Schema-conformant default: zero integers, empty text, zeroed bytes, empty runs
    pub fn blank(node: NodeRef) -> Self {
        let value = match node.node() {
            SchemaNode::Field(f) => Value::Scalar(f.primitive.default_value()),
            SchemaNode::Composite(c) => Value::List(
                c.children
                    .iter()
                    .map(|&child| Element::blank(node.with_id(child)))
                    .collect(),
            ),
            SchemaNode::Run(_) => Value::List(Vec::new()),
        };
        Self {
            node,
            value,
            offset: None,
        }
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn node(&self) -> &NodeRef {
        &self.node
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Byte offset in the source file, for decoded elements only
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match &self.value {
            Value::Scalar(s) => Some(s),
            Value::List(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.scalar().and_then(Scalar::as_int)
    }

    pub fn as_text(&self) -> Option<&str> {
        self.scalar().and_then(Scalar::as_text)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.scalar().and_then(Scalar::as_bytes)
    }

    /// Replace a field's value; the kind is checked when encoding
    pub fn set(&mut self, value: Scalar) -> Result<()> {
        match &mut self.value {
            Value::Scalar(s) => {
                *s = value;
                Ok(())
            }
            Value::List(_) => Err(RecordError::NotAField(self.name().to_string())),
        }
    }

    pub fn set_int(&mut self, value: i64) -> Result<()> {
        self.set(Scalar::Int(value))
    }

    pub fn set_text(&mut self, value: impl Into<String>) -> Result<()> {
        self.set(Scalar::Text(value.into()))
    }

    pub fn set_bytes(&mut self, value: impl Into<Vec<u8>>) -> Result<()> {
        self.set(Scalar::Bytes(value.into()))
    }

    /// Child elements in order; empty for fields
    pub fn children(&self) -> &[Element] {
        match &self.value {
            Value::List(children) => children,
            Value::Scalar(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [Element] {
        match &mut self.value {
            Value::List(children) => children,
            Value::Scalar(_) => &mut [],
        }
    }

    /// First direct child whose schema name is `name`
    pub fn get_child(&self, name: &str) -> Result<&Element> {
        self.children()
            .iter()
            .find(|c| c.name() == name)
            .ok_or_else(|| self.no_such_child(name))
    }

    pub fn get_child_mut(&mut self, name: &str) -> Result<&mut Element> {
        let index = self
            .children()
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| self.no_such_child(name))?;
        Ok(&mut self.children_mut()[index])
    }

    /// Follow a chain of child names, e.g. `["header", "length"]`
    pub fn get_path(&self, path: &[&str]) -> Result<&Element> {
        path.iter().try_fold(self, |elem, name| elem.get_child(name))
    }

    pub fn get_path_mut(&mut self, path: &[&str]) -> Result<&mut Element> {
        let mut current = self;
        for name in path {
            current = current.get_child_mut(name)?;
        }
        Ok(current)
    }

    fn no_such_child(&self, name: &str) -> RecordError {
        RecordError::NoSuchChild {
            parent: self.name().to_string(),
            name: name.to_string(),
        }
    }

    /// Entries of a run
    pub fn entries(&self) -> Result<&[Element]> {
        match self.node.node() {
            SchemaNode::Run(_) => Ok(self.children()),
            _ => Err(RecordError::NotARun(self.name().to_string())),
        }
    }

    /// A blank entry for this run, ready to be filled and appended
    pub fn new_entry(&self) -> Result<Element> {
        match self.node.node() {
            SchemaNode::Run(r) => Ok(Element::blank(self.node.with_id(r.element))),
            _ => Err(RecordError::NotARun(self.name().to_string())),
        }
    }

    /// Append an entry to this run, re-sorting by the run's sort key if it has one
    ///
    /// The sort is stable: entries with equal keys keep their relative order.
    /// No count field is touched; see [`Element::append_entry`].
    pub fn append(&mut self, entry: Element) -> Result<()> {
        let SchemaNode::Run(run) = self.node.node() else {
            return Err(RecordError::NotARun(self.name().to_string()));
        };
        if entry.node.id != run.element || !Arc::ptr_eq(&entry.node.schema, &self.node.schema) {
            return Err(RecordError::ForeignEntry {
                run: run.name.clone(),
                entry: entry.name().to_string(),
            });
        }
        let run_name = run.name.clone();
        let sort_key = run.sort_key.clone();

        let entries = match &mut self.value {
            Value::List(entries) => entries,
            Value::Scalar(_) => return Err(RecordError::NotARun(run_name)),
        };
        entries.push(entry);
        if let Some(key) = sort_key {
            entries.sort_by(|a, b| sort_value(a, &key).cmp(&sort_value(b, &key)));
        }
        Ok(())
    }

    /// Append an entry to the named run child and bump its count field
    ///
    /// Only runs counted by a sibling field have a count to bump; runs with a
    /// literal count are appended to as-is.
    pub fn append_entry(&mut self, run_name: &str, entry: Element) -> Result<()> {
        if !matches!(self.node.node(), SchemaNode::Composite(_)) {
            return Err(RecordError::NotAComposite(self.name().to_string()));
        }
        let run = self.get_child_mut(run_name)?;
        let count_field = match run.node.node() {
            SchemaNode::Run(r) => match &r.count {
                CountResolver::Named(field) => Some(field.clone()),
                CountResolver::Literal(_) => None,
            },
            _ => return Err(RecordError::NotARun(run_name.to_string())),
        };
        run.append(entry)?;

        if let Some(field) = count_field {
            let count = self.get_child_mut(&field)?;
            let next = count.as_int().unwrap_or_default() + 1;
            count.set_int(next)?;
        }
        Ok(())
    }

    pub fn encode(&self) -> std::result::Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.encode_into(&mut out)?;
        Ok(out)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> std::result::Result<(), EncodeError> {
        self.node.node().encode(self, out)
    }

    /// Indented `name = value` listing of the tree
    pub fn dump(&self, indent: usize) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0, indent);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize, indent: usize) {
        let pad = " ".repeat(depth * indent);
        match &self.value {
            Value::Scalar(s) => out.push_str(&format!("{}{} = {}\n", pad, self.name(), s)),
            Value::List(children) if children.is_empty() => {
                out.push_str(&format!("{}{} = []\n", pad, self.name()))
            }
            Value::List(children) => {
                out.push_str(&format!("{}{} =\n", pad, self.name()));
                for child in children {
                    child.write_tree(out, depth + 1, indent);
                }
            }
        }
    }
}

fn sort_value<'a>(entry: &'a Element, key: &str) -> Option<&'a Scalar> {
    entry.get_child(key).ok().and_then(Element::scalar)
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump(2))
    }
}

/// Composites serialize as maps, runs as sequences, bytes as hex strings
impl Serialize for Element {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match (&self.value, self.node.node()) {
            (Value::Scalar(Scalar::Int(v)), _) => serializer.serialize_i64(*v),
            (Value::Scalar(Scalar::Text(t)), _) => serializer.serialize_str(t),
            (Value::Scalar(Scalar::Bytes(b)), _) => serializer.serialize_str(&hex::encode(b)),
            (Value::List(entries), SchemaNode::Run(_)) => {
                let mut seq = serializer.serialize_seq(Some(entries.len()))?;
                for entry in entries {
                    seq.serialize_element(entry)?;
                }
                seq.end()
            }
            (Value::List(children), _) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for child in children {
                    map.serialize_entry(child.name(), child)?;
                }
                map.end()
            }
        }
    }
}

/// Build a blank root element for `schema`
pub fn create_blank(schema: &Arc<Schema>) -> Element {
    Element::blank(schema.root_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitive::Primitive;
    use crate::schema::NodeDef;

    fn schema() -> Arc<Schema> {
        Schema::build(NodeDef::composite(
            "rec",
            vec![
                NodeDef::field("count", Primitive::U16),
                NodeDef::sorted_run(
                    "items",
                    NodeDef::composite(
                        "item",
                        vec![
                            NodeDef::field("key", Primitive::text(4)),
                            NodeDef::field("tag", Primitive::U8),
                        ],
                    ),
                    CountResolver::Named("count".into()),
                    "key",
                ),
                NodeDef::run(
                    "pad",
                    NodeDef::field("byte", Primitive::bytes(2)),
                    CountResolver::Literal(1),
                ),
            ],
        ))
        .unwrap()
    }

    fn item(run: &Element, key: &str, tag: i64) -> Element {
        let mut entry = run.new_entry().unwrap();
        entry.get_child_mut("key").unwrap().set_text(key).unwrap();
        entry.get_child_mut("tag").unwrap().set_int(tag).unwrap();
        entry
    }

    fn keys(run: &Element) -> Vec<(String, i64)> {
        run.entries()
            .unwrap()
            .iter()
            .map(|e| {
                (
                    e.get_child("key").unwrap().as_text().unwrap().to_string(),
                    e.get_child("tag").unwrap().as_int().unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_blank_has_defaults_and_no_offsets() {
        let root = create_blank(&schema());
        assert_eq!(root.offset(), None);
        assert_eq!(root.get_child("count").unwrap().as_int(), Some(0));
        assert!(root.get_child("items").unwrap().entries().unwrap().is_empty());
        assert_eq!(root.get_child("count").unwrap().offset(), None);
    }

    #[test]
    fn test_get_child_missing() {
        let root = create_blank(&schema());
        assert!(matches!(
            root.get_child("nope"),
            Err(RecordError::NoSuchChild { .. })
        ));
    }

    #[test]
    fn test_append_sorts_by_key() {
        let mut root = create_blank(&schema());
        let run = root.get_child_mut("items").unwrap();
        for k in ["B", "A", "C"] {
            let e = item(run, k, 0);
            run.append(e).unwrap();
        }
        let order: Vec<String> = keys(run).into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_append_is_stable_for_equal_keys() {
        let mut root = create_blank(&schema());
        let run = root.get_child_mut("items").unwrap();
        for (k, tag) in [("B", 1), ("A", 2), ("B", 3), ("A", 4)] {
            let e = item(run, k, tag);
            run.append(e).unwrap();
        }
        assert_eq!(
            keys(run),
            vec![
                ("A".to_string(), 2),
                ("A".to_string(), 4),
                ("B".to_string(), 1),
                ("B".to_string(), 3)
            ]
        );
    }

    #[test]
    fn test_append_does_not_touch_count() {
        let mut root = create_blank(&schema());
        let run = root.get_child_mut("items").unwrap();
        let e = item(run, "A", 1);
        run.append(e).unwrap();
        assert_eq!(root.get_child("count").unwrap().as_int(), Some(0));
    }

    #[test]
    fn test_append_entry_bumps_count() {
        let mut root = create_blank(&schema());
        let e1 = item(root.get_child("items").unwrap(), "Z", 1);
        let e2 = item(root.get_child("items").unwrap(), "Y", 2);
        root.append_entry("items", e1).unwrap();
        root.append_entry("items", e2).unwrap();
        assert_eq!(root.get_child("count").unwrap().as_int(), Some(2));

        // Literal counts have nothing to bump.
        let pad = root.get_child("pad").unwrap().new_entry().unwrap();
        root.append_entry("pad", pad).unwrap();
        assert_eq!(root.get_child("count").unwrap().as_int(), Some(2));
    }

    #[test]
    fn test_append_rejects_foreign_entry() {
        let mut root = create_blank(&schema());
        let foreign = root.get_child("pad").unwrap().new_entry().unwrap();
        let run = root.get_child_mut("items").unwrap();
        assert!(matches!(
            run.append(foreign),
            Err(RecordError::ForeignEntry { .. })
        ));
    }

    #[test]
    fn test_append_on_non_run() {
        let mut root = create_blank(&schema());
        let entry = root.get_child("items").unwrap().new_entry().unwrap();
        let count = root.get_child_mut("count").unwrap();
        assert!(matches!(count.append(entry), Err(RecordError::NotARun(_))));
    }

    #[test]
    fn test_set_on_composite_fails() {
        let mut root = create_blank(&schema());
        assert!(matches!(
            root.set_int(3),
            Err(RecordError::NotAField(_))
        ));
    }

    #[test]
    fn test_encode_and_decode_back() {
        let s = schema();
        let mut root = create_blank(&s);
        let e = item(root.get_child("items").unwrap(), "K1", 7);
        root.append_entry("items", e).unwrap();
        let pad = root.get_child("pad").unwrap().new_entry().unwrap();
        root.get_child_mut("pad").unwrap().append(pad).unwrap();

        let bytes = root.encode().unwrap();
        assert_eq!(bytes, vec![0, 1, b'K', b'1', 0, 0, 7, 0, 0]);

        let back = s.decode(&bytes).unwrap();
        assert_eq!(back, root);
        assert_eq!(back.get_path(&["items"]).unwrap().offset(), Some(2));
    }

    #[test]
    fn test_encode_type_mismatch() {
        let mut root = create_blank(&schema());
        root.get_child_mut("count").unwrap().set_text("x").unwrap();
        assert!(matches!(
            root.encode(),
            Err(EncodeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_dump_and_json() {
        let mut root = create_blank(&schema());
        let e = item(root.get_child("items").unwrap(), "AB", 1);
        root.append_entry("items", e).unwrap();

        let text = root.to_string();
        assert!(text.starts_with("rec =\n"));
        assert!(text.contains("  count = 1\n"));
        assert!(text.contains("      key = \"AB\"\n"));
        assert!(text.contains("  pad = []\n"));

        let json = serde_json::to_value(&root).unwrap();
        assert_eq!(json["count"], 1);
        assert_eq!(json["items"][0]["key"], "AB");
        assert_eq!(json["pad"], serde_json::json!([]));
    }
}
