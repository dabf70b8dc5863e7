//! Metadata trees stored as groups, attributes and datasets

use crate::container::{self, Attr, ContainerFile, Group, LayoutRequest, Node};
use crate::error::{Error, Result};
use crate::parser::parse_literal;
use crate::types::{Buffer, Value};
use crate::writer::to_literal;
use std::collections::BTreeMap;

const META_TYPE: &str = "_metaType_";
const MAX_CHUNK: usize = 100_000;

/// A stored value is either an attribute or a child node
pub(crate) enum Stored {
    Attr(Attr),
    Node(Node),
}

impl Stored {
    pub fn insert_into(self, group: &mut Group, key: impl Into<String>) {
        match self {
            Stored::Attr(a) => {
                group.attrs.insert(key.into(), a);
            }
            Stored::Node(n) => {
                group.children.insert(key.into(), n);
            }
        }
    }
}

pub(crate) fn store(file: &mut ContainerFile, value: &Value) -> Result<Stored> {
    Ok(match value {
        Value::Int(i) => Stored::Attr(Attr::Int(*i)),
        Value::Float(f) => Stored::Attr(Attr::Float(*f)),
        Value::None | Value::Bool(_) | Value::Str(_) => Stored::Attr(Attr::Str(to_literal(value))),
        Value::Dict(d) => {
            let mut group = tagged("dict");
            for (key, v) in d {
                store(file, v)?.insert_into(&mut group, key.as_str());
            }
            Stored::Node(Node::Group(group))
        }
        Value::List(items) | Value::Tuple(items) => {
            let mut group = tagged(if matches!(value, Value::List(_)) { "list" } else { "tuple" });
            for (i, v) in items.iter().enumerate() {
                store(file, v)?.insert_into(&mut group, i.to_string());
            }
            Stored::Node(Node::Group(group))
        }
        Value::Array(b) => Stored::Node(Node::Dataset(store_array(file, b)?)),
    })
}

fn tagged(kind: &str) -> Group {
    let mut group = Group::default();
    group.attrs.insert(META_TYPE.into(), Attr::Str(kind.into()));
    group
}

/// Metadata arrays can grow along their first axis
pub(crate) fn store_array(file: &mut ContainerFile, data: &Buffer) -> Result<container::DatasetMeta> {
    let shape = data.shape();
    let maxshape = shape
        .iter()
        .enumerate()
        .map(|(i, &d)| (i > 0).then_some(d))
        .collect();
    let chunk = shape.iter().map(|&d| d.clamp(1, MAX_CHUNK)).collect();
    container::create(
        file,
        data,
        maxshape,
        LayoutRequest::Chunked {
            chunk,
            codec: container::Codec::None,
        },
    )
}

fn load_attr(path: &str, attr: &Attr) -> Result<Value> {
    match attr {
        Attr::Int(i) => Ok(Value::Int(*i)),
        Attr::Float(f) => Ok(Value::Float(*f)),
        Attr::Str(s) => parse_literal(s).map_err(|e| Error::MetadataDecodeError {
            key: path.to_string(),
            reason: e.to_string(),
        }),
    }
}

pub(crate) fn load_node(file: &ContainerFile, path: &str, node: &Node) -> Result<Value> {
    match node {
        Node::Dataset(meta) => Ok(Value::Array(container::read_all(file, meta)?)),
        Node::Group(group) => load_group(file, path, group),
    }
}

pub(crate) fn load_group(file: &ContainerFile, path: &str, group: &Group) -> Result<Value> {
    let mut entries = BTreeMap::new();
    for (key, attr) in &group.attrs {
        if key != META_TYPE {
            entries.insert(key.clone(), load_attr(&format!("{path}/{key}"), attr)?);
        }
    }
    for (key, node) in &group.children {
        entries.insert(key.clone(), load_node(file, &format!("{path}/{key}"), node)?);
    }

    let kind = group.attrs.get(META_TYPE).and_then(Attr::as_str).unwrap_or("dict");
    match kind {
        "dict" => Ok(Value::Dict(entries)),
        "list" | "tuple" => {
            let mut items = entries
                .into_iter()
                .map(|(key, v)| match key.parse::<usize>() {
                    Ok(i) => Ok((i, v)),
                    Err(_) => Err(Error::MetadataDecodeError {
                        key: format!("{path}/{key}"),
                        reason: format!("{kind} entries must be named by position"),
                    }),
                })
                .collect::<Result<Vec<_>>>()?;
            items.sort_by_key(|(i, _)| *i);
            let items = items.into_iter().map(|(_, v)| v).collect();
            Ok(if kind == "list" { Value::List(items) } else { Value::Tuple(items) })
        }
        other => Err(Error::MetadataDecodeError {
            key: path.to_string(),
            reason: format!("unknown {META_TYPE} {other:?}"),
        }),
    }
}
