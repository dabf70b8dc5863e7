//! Loading and saving: format detection and read/write options

use crate::array::MetaArray;
use crate::error::{Error, Result};
use crate::index::Span;
use crate::types::{AxisRef, MAGIC};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Options for [`load_with`]
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Map the elements instead of reading them
    pub mmap: bool,
    /// Read only these spans, one per leading axis
    pub subset: Option<Vec<Span>>,
    /// Read everything and close the file; `None` decides by file size
    /// for hierarchical files and means `true` for flat ones
    pub read_all_data: Option<bool>,
    /// Keep a hierarchical file open for in-place writes
    pub writable: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mmap(mut self, mmap: bool) -> Self {
        self.mmap = mmap;
        self
    }

    pub fn subset(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.subset = Some(spans.into_iter().collect());
        self
    }

    pub fn read_all_data(mut self, read_all: bool) -> Self {
        self.read_all_data = Some(read_all);
        self
    }

    pub fn writable(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Span for `axis`, everything when unspecified
    pub(crate) fn span(&self, axis: usize) -> Span {
        self.subset
            .as_ref()
            .and_then(|s| s.get(axis).copied())
            .unwrap_or_default()
    }
}

/// On-disk layout chosen by [`MetaArray::write`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Hierarchical,
    Flat,
}

/// Chunk compression for hierarchical files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Level 0-9
    Gzip(u32),
    Zstd(i32),
}

impl Compression {
    /// Parse `gzip`, `gzip:5`, `zstd` or `zstd:3`
    pub fn from_name(name: &str) -> Result<Self> {
        let (codec, level) = match name.split_once(':') {
            Some((codec, level)) => (codec, Some(level)),
            None => (name, None),
        };
        let bad_level = || Error::InvalidOptions(format!("invalid compression level in {name:?}").into());
        match codec {
            "gzip" => {
                let level = level.map_or(Ok(4), |l| l.parse::<u32>().map_err(|_| bad_level()))?;
                if level > 9 {
                    return Err(bad_level());
                }
                Ok(Compression::Gzip(level))
            }
            "zstd" => {
                let level = level.map_or(Ok(3), |l| l.parse::<i32>().map_err(|_| bad_level()))?;
                Ok(Compression::Zstd(level))
            }
            other => Err(Error::InvalidOptions(format!("unknown compression {other:?}").into())),
        }
    }
}

/// Options for [`MetaArray::write`]
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub format: Format,
    /// Axis along which later writes append
    pub append_axis: Option<AxisRef>,
    /// Info keys of the append axis (besides `values`) grown on append
    pub append_keys: Vec<String>,
    pub compression: Option<Compression>,
    /// Chunk shape for the bulk dataset
    pub chunks: Option<Vec<usize>>,
    /// Store the bulk dataset contiguously so it can be memory-mapped
    pub mappable: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flat() -> Self {
        Self {
            format: Format::Flat,
            ..Self::default()
        }
    }

    pub fn append_axis(mut self, axis: impl Into<AxisRef>) -> Self {
        self.append_axis = Some(axis.into());
        self
    }

    pub fn append_keys(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.append_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn chunks(mut self, chunks: impl IntoIterator<Item = usize>) -> Self {
        self.chunks = Some(chunks.into_iter().collect());
        self
    }

    pub fn mappable(mut self, mappable: bool) -> Self {
        self.mappable = mappable;
        self
    }
}

/// Load an array with default options
pub fn load(path: impl AsRef<Path>) -> Result<MetaArray> {
    load_with(path, &ReadOptions::default())
}

/// Load an array, choosing the reader by the file's leading bytes
pub fn load_with(path: impl AsRef<Path>, opts: &ReadOptions) -> Result<MetaArray> {
    let path = path.as_ref();
    if opts.writable && opts.read_all_data == Some(true) {
        return Err(Error::IncompatibleAppendOptions);
    }
    if is_hierarchical(path)? {
        log::debug!("{}: hierarchical container", path.display());
        read_hierarchical(path, opts)
    } else {
        log::debug!("{}: flat file", path.display());
        crate::flat::read(path, opts)
    }
}

/// Whether the file starts with the container magic
pub fn is_hierarchical(path: impl AsRef<Path>) -> Result<bool> {
    let mut magic = [0u8; 8];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(&magic == MAGIC)
}

#[cfg(feature = "hierarchical")]
fn read_hierarchical(path: &Path, opts: &ReadOptions) -> Result<MetaArray> {
    crate::hierarchical::read(path, opts)
}

#[cfg(not(feature = "hierarchical"))]
fn read_hierarchical(_path: &Path, _opts: &ReadOptions) -> Result<MetaArray> {
    Err(Error::BackendUnavailable("hierarchical format"))
}

impl MetaArray {
    /// Write to `path` in the chosen format
    pub fn write(&self, path: impl AsRef<Path>, opts: &WriteOptions) -> Result<()> {
        let path = path.as_ref();
        match opts.format {
            Format::Flat => crate::flat::write(self, path, opts),
            #[cfg(feature = "hierarchical")]
            Format::Hierarchical => crate::hierarchical::write(self, path, opts),
            #[cfg(not(feature = "hierarchical"))]
            Format::Hierarchical => Err(Error::BackendUnavailable("hierarchical format")),
        }
    }

    /// Replace the info stored in an existing hierarchical file with this array's
    pub fn rewrite_info(&self, path: impl AsRef<Path>) -> Result<()> {
        #[cfg(feature = "hierarchical")]
        {
            crate::hierarchical::rewrite_info(self, path.as_ref())
        }
        #[cfg(not(feature = "hierarchical"))]
        {
            let _ = path;
            Err(Error::BackendUnavailable("hierarchical format"))
        }
    }
}
