// SPDX-License-Identifier: MIT
//! Record schemas
//!
//! A schema is an immutable graph of [`SchemaNode`]s stored in an arena and
//! addressed by [`NodeId`]. Nodes refer to their parent by id, never by pointer.
//!
//! A run whose repeat count comes from a sibling field registers itself with its
//! enclosing composite when the schema is built. During decoding the composite
//! consults that registry after each child and resolves the run's count in a
//! per-call [`DecodeContext`], so the schema itself is never mutated.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::element::{Element, NodeRef, Value};
use crate::error::{DecodeError, EncodeError, SchemaError};
use crate::primitive::Primitive;

/// Index of a node inside its [`Schema`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where a run gets its repeat count from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountResolver {
    /// Fixed number of repetitions
    Literal(usize),
    /// Value of an integer field declared earlier in the same composite
    Named(String),
}

/// Per-decode resolution state of a run's count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountState {
    Unresolved,
    Resolved(usize),
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub primitive: Primitive,
    pub parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CompositeSchema {
    pub name: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// Count field name -> runs whose count it supplies
    pub count_registry: HashMap<String, Vec<NodeId>>,
}

#[derive(Debug, Clone)]
pub struct RunSchema {
    pub name: String,
    pub element: NodeId,
    pub count: CountResolver,
    pub sort_key: Option<String>,
    pub parent: Option<NodeId>,
}

/// One node of a schema graph
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Field(FieldSchema),
    Composite(CompositeSchema),
    Run(RunSchema),
}

impl SchemaNode {
    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Field(f) => &f.name,
            SchemaNode::Composite(c) => &c.name,
            SchemaNode::Run(r) => &r.name,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            SchemaNode::Field(f) => f.parent,
            SchemaNode::Composite(c) => c.parent,
            SchemaNode::Run(r) => r.parent,
        }
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self {
            SchemaNode::Field(f) => Some(f.primitive),
            _ => None,
        }
    }

    /// Append the encoding of `element`, which must be an instance of this node
    ///
    /// Composites and runs concatenate their children in list order with no
    /// padding. A run does not check its length against any count field.
    pub fn encode(&self, element: &Element, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match (self, element.value()) {
            (SchemaNode::Field(f), Value::Scalar(s)) => f.primitive.encode(s, &f.name, out),
            (SchemaNode::Field(f), Value::List(_)) => Err(EncodeError::TypeMismatch {
                field: f.name.clone(),
                expected: "a scalar",
            }),
            (_, Value::List(children)) => {
                for child in children {
                    child.encode_into(out)?;
                }
                Ok(())
            }
            (node, Value::Scalar(_)) => Err(EncodeError::TypeMismatch {
                field: node.name().to_string(),
                expected: "child elements",
            }),
        }
    }
}

/// Declarative description of a schema, compiled by [`Schema::build`]
#[derive(Debug, Clone)]
pub enum NodeDef {
    Field {
        name: String,
        primitive: Primitive,
    },
    Composite {
        name: String,
        children: Vec<NodeDef>,
    },
    Run {
        name: String,
        element: Box<NodeDef>,
        count: CountResolver,
        sort_key: Option<String>,
    },
}

impl NodeDef {
    pub fn field(name: impl Into<String>, primitive: Primitive) -> Self {
        NodeDef::Field {
            name: name.into(),
            primitive,
        }
    }

    pub fn composite(name: impl Into<String>, children: Vec<NodeDef>) -> Self {
        NodeDef::Composite {
            name: name.into(),
            children,
        }
    }

    pub fn run(name: impl Into<String>, element: NodeDef, count: CountResolver) -> Self {
        NodeDef::Run {
            name: name.into(),
            element: Box::new(element),
            count,
            sort_key: None,
        }
    }

    /// A run kept sorted by the named field of its entries
    pub fn sorted_run(
        name: impl Into<String>,
        element: NodeDef,
        count: CountResolver,
        sort_key: impl Into<String>,
    ) -> Self {
        NodeDef::Run {
            name: name.into(),
            element: Box::new(element),
            count,
            sort_key: Some(sort_key.into()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            NodeDef::Field { name, .. }
            | NodeDef::Composite { name, .. }
            | NodeDef::Run { name, .. } => name,
        }
    }
}

/// Immutable compiled schema of one record type
#[derive(Debug)]
pub struct Schema {
    nodes: Vec<SchemaNode>,
    root: NodeId,
}

impl Schema {
    /// Compile a definition, checking count dependencies and sort keys
    pub fn build(def: NodeDef) -> Result<Arc<Schema>, SchemaError> {
        let mut nodes = Vec::new();
        let root = add_node(&mut nodes, def, None)?;
        Ok(Arc::new(Schema { nodes, root }))
    }

    pub fn name(&self) -> &str {
        self.root_node().name()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &SchemaNode {
        self.node(self.root)
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Handle to a node that keeps the schema alive
    pub fn node_ref(self: &Arc<Self>, id: NodeId) -> NodeRef {
        NodeRef::new(Arc::clone(self), id)
    }

    pub fn root_ref(self: &Arc<Self>) -> NodeRef {
        self.node_ref(self.root)
    }

    /// Encoded size of a node, if it does not depend on decoded data
    pub fn fixed_width(&self, id: NodeId) -> Option<usize> {
        match self.node(id) {
            SchemaNode::Field(f) => Some(f.primitive.width()),
            SchemaNode::Composite(c) => c
                .children
                .iter()
                .try_fold(0usize, |acc, &child| Some(acc + self.fixed_width(child)?)),
            SchemaNode::Run(r) => match r.count {
                CountResolver::Literal(n) => Some(n * self.fixed_width(r.element)?),
                CountResolver::Named(_) => None,
            },
        }
    }

    /// Byte offset of the node at `path` (composite child names from the root),
    /// if every node before it has a fixed width
    pub fn static_offset(&self, path: &[&str]) -> Option<usize> {
        self.static_offset_in(self.root, path)
    }

    /// Like [`Schema::static_offset`], relative to the start of node `start`
    pub fn static_offset_in(&self, start: NodeId, path: &[&str]) -> Option<usize> {
        let mut current = start;
        let mut offset = 0;
        for name in path {
            let SchemaNode::Composite(c) = self.node(current) else {
                return None;
            };
            let mut found = None;
            for &child in &c.children {
                if self.node(child).name() == *name {
                    found = Some(child);
                    break;
                }
                offset += self.fixed_width(child)?;
            }
            current = found?;
        }
        Some(offset)
    }

    /// Decode a whole record from the start of `bytes`
    ///
    /// Element offsets are relative to the start of `bytes`. Trailing bytes
    /// (such as the checksum) are left unread.
    pub fn decode(self: &Arc<Self>, bytes: &[u8]) -> Result<Element, DecodeError> {
        let mut cursor = Cursor::new(bytes);
        let mut ctx = DecodeContext::new(self);
        self.decode_node(self.root, &mut cursor, &mut ctx)
    }

    fn decode_node(
        self: &Arc<Self>,
        id: NodeId,
        cursor: &mut Cursor<'_>,
        ctx: &mut DecodeContext,
    ) -> Result<Element, DecodeError> {
        let offset = cursor.position();
        match self.node(id) {
            SchemaNode::Field(f) => {
                let value = f.primitive.decode(cursor.remaining_slice(), offset)?;
                cursor.advance(f.primitive.width());
                Ok(Element::decoded(self.node_ref(id), Value::Scalar(value), offset))
            }
            SchemaNode::Composite(c) => {
                let mut children = Vec::with_capacity(c.children.len());
                for &child in &c.children {
                    let element = self.decode_node(child, cursor, ctx)?;
                    if let Some(runs) = c.count_registry.get(element.name()) {
                        let value = element.as_int().unwrap_or_default();
                        let count =
                            usize::try_from(value).map_err(|_| DecodeError::InvalidCount {
                                field: element.name().to_string(),
                                value,
                            })?;
                        for &run in runs {
                            ctx.resolve(run, count);
                        }
                    }
                    children.push(element);
                }
                Ok(Element::decoded(self.node_ref(id), Value::List(children), offset))
            }
            SchemaNode::Run(r) => {
                let count = match &r.count {
                    CountResolver::Literal(n) => *n,
                    CountResolver::Named(_) => match ctx.state(id) {
                        CountState::Resolved(n) => n,
                        CountState::Unresolved => {
                            return Err(DecodeError::UnresolvedCount {
                                run: r.name.clone(),
                            })
                        }
                    },
                };
                // Never trust a count to size an allocation beyond the input.
                let mut entries = Vec::with_capacity(count.min(cursor.remaining()));
                for _ in 0..count {
                    entries.push(self.decode_node(r.element, cursor, ctx)?);
                }
                Ok(Element::decoded(self.node_ref(id), Value::List(entries), offset))
            }
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.describe(self.root, 0, f)
    }
}

impl Schema {
    fn describe(&self, id: NodeId, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self.node(id) {
            SchemaNode::Field(field) => writeln!(f, "{}{}: {}", pad, field.name, field.primitive),
            SchemaNode::Composite(c) => {
                writeln!(f, "{}{}:", pad, c.name)?;
                for &child in &c.children {
                    self.describe(child, depth + 1, f)?;
                }
                Ok(())
            }
            SchemaNode::Run(r) => {
                let count = match &r.count {
                    CountResolver::Literal(n) => n.to_string(),
                    CountResolver::Named(name) => name.clone(),
                };
                match &r.sort_key {
                    Some(key) => writeln!(f, "{}{}: [x {}, sorted by {}]", pad, r.name, count, key)?,
                    None => writeln!(f, "{}{}: [x {}]", pad, r.name, count)?,
                }
                self.describe(r.element, depth + 1, f)
            }
        }
    }
}

fn add_node(
    nodes: &mut Vec<SchemaNode>,
    def: NodeDef,
    parent: Option<NodeId>,
) -> Result<NodeId, SchemaError> {
    let id = NodeId(nodes.len());
    match def {
        NodeDef::Field { name, primitive } => {
            nodes.push(SchemaNode::Field(FieldSchema {
                name,
                primitive,
                parent,
            }));
        }
        NodeDef::Composite { name, children } => {
            nodes.push(SchemaNode::Composite(CompositeSchema {
                name: name.clone(),
                children: Vec::with_capacity(children.len()),
                parent,
                count_registry: HashMap::new(),
            }));

            let mut child_ids: Vec<NodeId> = Vec::with_capacity(children.len());
            let mut registry: HashMap<String, Vec<NodeId>> = HashMap::new();
            for child in children {
                if child_ids.iter().any(|&c| nodes[c.0].name() == child.name()) {
                    return Err(SchemaError::DuplicateChild {
                        parent: name,
                        name: child.name().to_string(),
                    });
                }
                let child_id = add_node(nodes, child, Some(id))?;
                if let SchemaNode::Run(run) = &nodes[child_id.0] {
                    if let CountResolver::Named(field) = &run.count {
                        // Count fields must come strictly before the run.
                        let source = child_ids
                            .iter()
                            .map(|&c| &nodes[c.0])
                            .find(|n| n.name() == field)
                            .ok_or_else(|| SchemaError::CountFieldNotDeclared {
                                run: run.name.clone(),
                                field: field.clone(),
                            })?;
                        if !source.primitive().is_some_and(|p| p.is_integer()) {
                            return Err(SchemaError::CountFieldNotInteger {
                                run: run.name.clone(),
                                field: field.clone(),
                            });
                        }
                        registry.entry(field.clone()).or_default().push(child_id);
                    }
                }
                child_ids.push(child_id);
            }

            if let SchemaNode::Composite(c) = &mut nodes[id.0] {
                c.children = child_ids;
                c.count_registry = registry;
            }
        }
        NodeDef::Run {
            name,
            element,
            count,
            sort_key,
        } => {
            if let (CountResolver::Named(field), None) = (&count, parent) {
                return Err(SchemaError::CountFieldNotDeclared {
                    run: name,
                    field: field.clone(),
                });
            }
            nodes.push(SchemaNode::Run(RunSchema {
                name: name.clone(),
                element: id,
                count,
                sort_key: sort_key.clone(),
                parent,
            }));
            let element_id = add_node(nodes, *element, Some(id))?;

            if let Some(key) = &sort_key {
                let keyed = match &nodes[element_id.0] {
                    SchemaNode::Composite(c) => c.children.iter().any(
                        |&child| matches!(&nodes[child.0], SchemaNode::Field(f) if &f.name == key),
                    ),
                    _ => false,
                };
                if !keyed {
                    return Err(SchemaError::UnknownSortKey {
                        run: name,
                        key: key.clone(),
                    });
                }
            }

            if let SchemaNode::Run(r) = &mut nodes[id.0] {
                r.element = element_id;
            }
        }
    }
    Ok(id)
}

/// Resolution state for one decode call
#[derive(Debug)]
pub struct DecodeContext {
    counts: Vec<CountState>,
}

impl DecodeContext {
    pub fn new(schema: &Schema) -> Self {
        Self {
            counts: vec![CountState::Unresolved; schema.len()],
        }
    }

    pub fn state(&self, run: NodeId) -> CountState {
        self.counts[run.0]
    }

    pub fn resolve(&mut self, run: NodeId, count: usize) {
        self.counts[run.0] = CountState::Resolved(count);
    }
}

/// Explicit read position threaded through decoding
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn remaining_slice(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    pub fn advance(&mut self, n: usize) {
        self.pos += n;
    }
}
