//! Open dataset backing a streamed array

use super::DATA;
use crate::container::{self, ContainerFile, DatasetMeta, Node, Placement};
use crate::error::{Error, Result};
use crate::types::{Buffer, DType};
use std::fmt;

/// Bulk dataset of a container kept open for on-demand reads and, when
/// writable, in-place writes
///
/// Writes are committed on [`OpenDataset::close`] or, failing that, on drop.
pub(crate) struct OpenDataset {
    file: ContainerFile,
    meta: DatasetMeta,
    dirty: bool,
    closed: bool,
}

impl OpenDataset {
    pub fn new(file: ContainerFile, meta: DatasetMeta) -> Self {
        Self {
            file,
            meta,
            dirty: false,
            closed: false,
        }
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    pub fn is_writable(&self) -> bool {
        self.file.is_writable()
    }

    pub fn read_region(&self, start: &[usize], count: &[usize]) -> Result<Buffer> {
        container::read_region(&self.file, &self.meta, start, count)
    }

    pub fn read_all(&self) -> Result<Buffer> {
        container::read_all(&self.file, &self.meta)
    }

    pub fn write_region(&mut self, start: &[usize], value: &Buffer) -> Result<()> {
        if !self.is_writable() {
            return Err(Error::ReadOnly);
        }
        container::write_region(&mut self.file, &mut self.meta, start, value, Placement::InPlace)?;
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.file
            .root_mut()
            .children
            .insert(DATA.into(), Node::Dataset(self.meta.clone()));
        self.file.commit()?;
        self.dirty = false;
        Ok(())
    }

    /// Commit pending writes and release the file
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for OpenDataset {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            log::warn!("{}: pending writes were lost: {e}", self.file.path().display());
        }
    }
}

impl fmt::Debug for OpenDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenDataset")
            .field("path", &self.file.path())
            .field("dtype", &self.meta.dtype)
            .field("shape", &self.meta.shape)
            .field("writable", &self.is_writable())
            .finish()
    }
}
