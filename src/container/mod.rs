//! Hierarchical container files
//!
//! ```text
//! [magic: 8 bytes] [tree offset: u64 LE]
//! [extents...]                 contiguous data (64-byte aligned), chunks
//! [tree length: u64 LE] [tree] root group, written last
//! ```
//!
//! The tree is a group of attributes (`Int`, `Float`, `Str`) and named
//! children, each either a group or a dataset. A commit appends a new tree
//! and only then rewrites the header offset, so a write that fails part way
//! leaves the previously committed tree readable.

mod codec;
mod dataset;
mod file;
mod tree;

pub(crate) use codec::Codec;
pub(crate) use dataset::{LayoutRequest, Placement, create, read_all, read_region, resize, write_region};
pub(crate) use file::ContainerFile;
pub(crate) use tree::{Attr, DatasetMeta, Group, Layout, Node};
