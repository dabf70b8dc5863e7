//! Group/dataset tree and its binary encoding

use super::Codec;
use crate::error::{Error, Result};
use crate::parser::ByteCursor;
use crate::types::DType;
use crate::writer::ByteWriter;
use std::collections::BTreeMap;

/// Groups nested deeper than this are treated as damage
const MAX_DEPTH: usize = 64;
const UNLIMITED: u64 = u64::MAX;

mod tag {
    pub const GROUP: u8 = 0x01;
    pub const DATASET: u8 = 0x02;

    pub const ATTR_INT: u8 = 0x01;
    pub const ATTR_FLOAT: u8 = 0x02;
    pub const ATTR_STR: u8 = 0x03;

    pub const CONTIGUOUS: u8 = 0x00;
    pub const CHUNKED: u8 = 0x01;
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Attr {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Attr {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Byte range of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Extent {
    pub offset: u64,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Layout {
    /// Row-major little-endian elements in one extent
    Contiguous(Extent),
    /// Chunks of `chunk` shape keyed by grid position; missing chunks read as zeros
    Chunked {
        chunk: Vec<usize>,
        codec: Codec,
        index: BTreeMap<Vec<usize>, Extent>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DatasetMeta {
    pub dtype: DType,
    pub shape: Vec<usize>,
    /// `None` marks an unlimited axis
    pub maxshape: Vec<Option<usize>>,
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Group(Group),
    Dataset(DatasetMeta),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Group {
    pub attrs: BTreeMap<String, Attr>,
    pub children: BTreeMap<String, Node>,
}

impl Group {
    pub fn group(&self, name: &str) -> Option<&Group> {
        match self.children.get(name)? {
            Node::Group(g) => Some(g),
            Node::Dataset(_) => None,
        }
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        match self.children.get_mut(name)? {
            Node::Group(g) => Some(g),
            Node::Dataset(_) => None,
        }
    }

    pub fn dataset(&self, name: &str) -> Option<&DatasetMeta> {
        match self.children.get(name)? {
            Node::Dataset(d) => Some(d),
            Node::Group(_) => None,
        }
    }

    pub fn encode(&self, w: &mut ByteWriter) -> Result<()> {
        w.u32_le(self.attrs.len() as u32);
        for (key, attr) in &self.attrs {
            w.key(key)?;
            match attr {
                Attr::Int(v) => {
                    w.u8(tag::ATTR_INT);
                    w.i64_le(*v);
                }
                Attr::Float(v) => {
                    w.u8(tag::ATTR_FLOAT);
                    w.f64_le(*v);
                }
                Attr::Str(s) => {
                    w.u8(tag::ATTR_STR);
                    w.string(s)?;
                }
            }
        }
        w.u32_le(self.children.len() as u32);
        for (key, node) in &self.children {
            w.key(key)?;
            match node {
                Node::Group(g) => {
                    w.u8(tag::GROUP);
                    g.encode(w)?;
                }
                Node::Dataset(d) => {
                    w.u8(tag::DATASET);
                    d.encode(w);
                }
            }
        }
        Ok(())
    }

    pub fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        Self::decode_at(c, 0)
    }

    fn decode_at(c: &mut ByteCursor<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(Error::corrupt("groups nested too deeply", c.offset()));
        }
        let mut group = Group::default();
        for _ in 0..c.u32_le()? {
            let key = c.key()?.to_string();
            let at = c.offset();
            let attr = match c.u8()? {
                tag::ATTR_INT => Attr::Int(c.i64_le()?),
                tag::ATTR_FLOAT => Attr::Float(c.f64_le()?),
                tag::ATTR_STR => Attr::Str(c.string()?.to_string()),
                t => return Err(Error::corrupt(format!("unknown attribute tag 0x{t:02x}"), at)),
            };
            group.attrs.insert(key, attr);
        }
        for _ in 0..c.u32_le()? {
            let key = c.key()?.to_string();
            let at = c.offset();
            let node = match c.u8()? {
                tag::GROUP => Node::Group(Self::decode_at(c, depth + 1)?),
                tag::DATASET => Node::Dataset(DatasetMeta::decode(c)?),
                t => return Err(Error::corrupt(format!("unknown node tag 0x{t:02x}"), at)),
            };
            group.children.insert(key, node);
        }
        Ok(group)
    }
}

fn write_dims(w: &mut ByteWriter, dims: &[usize]) {
    w.u8(dims.len() as u8);
    for &d in dims {
        w.u64_le(d as u64);
    }
}

fn read_dims(c: &mut ByteCursor<'_>) -> Result<Vec<usize>> {
    let n = c.u8()?;
    (0..n).map(|_| Ok(c.u64_le()? as usize)).collect()
}

impl DatasetMeta {
    fn encode(&self, w: &mut ByteWriter) {
        w.u8(self.dtype as u8);
        write_dims(w, &self.shape);
        for m in &self.maxshape {
            w.u64_le(m.map_or(UNLIMITED, |m| m as u64));
        }
        match &self.layout {
            Layout::Contiguous(extent) => {
                w.u8(tag::CONTIGUOUS);
                w.u64_le(extent.offset);
                w.u64_le(extent.len);
            }
            Layout::Chunked { chunk, codec, index } => {
                w.u8(tag::CHUNKED);
                for &c in chunk {
                    w.u64_le(c as u64);
                }
                w.u8(codec.tag());
                w.i64_le(codec.level());
                w.u64_le(index.len() as u64);
                for (pos, extent) in index {
                    for &p in pos {
                        w.u64_le(p as u64);
                    }
                    w.u64_le(extent.offset);
                    w.u64_le(extent.len);
                }
            }
        }
    }

    fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        let at = c.offset();
        let raw = c.u8()?;
        let dtype = DType::from_u8(raw).ok_or_else(|| Error::corrupt(format!("unknown dtype tag 0x{raw:02x}"), at))?;
        let shape = read_dims(c)?;
        let maxshape = (0..shape.len())
            .map(|_| {
                let m = c.u64_le()?;
                Ok((m != UNLIMITED).then_some(m as usize))
            })
            .collect::<Result<Vec<_>>>()?;
        let ndim = shape.len();
        let at = c.offset();
        let layout = match c.u8()? {
            tag::CONTIGUOUS => Layout::Contiguous(Extent {
                offset: c.u64_le()?,
                len: c.u64_le()?,
            }),
            tag::CHUNKED => {
                let chunk = (0..ndim)
                    .map(|_| Ok(c.u64_le()? as usize))
                    .collect::<Result<Vec<_>>>()?;
                if chunk.contains(&0) {
                    return Err(Error::corrupt("zero chunk extent", at));
                }
                let codec_at = c.offset();
                let codec = Codec::from_tag(c.u8()?, c.i64_le()?)
                    .ok_or_else(|| Error::corrupt("unknown codec", codec_at))?;
                let mut index = BTreeMap::new();
                for _ in 0..c.u64_le()? {
                    let pos = (0..ndim)
                        .map(|_| Ok(c.u64_le()? as usize))
                        .collect::<Result<Vec<_>>>()?;
                    let extent = Extent {
                        offset: c.u64_le()?,
                        len: c.u64_le()?,
                    };
                    index.insert(pos, extent);
                }
                Layout::Chunked { chunk, codec, index }
            }
            t => return Err(Error::corrupt(format!("unknown layout tag 0x{t:02x}"), at)),
        };
        Ok(Self {
            dtype,
            shape,
            maxshape,
            layout,
        })
    }
}
