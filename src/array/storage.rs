//! Where an array's elements live

use crate::error::{Error, Result};
use crate::index::AxisSelection;
use crate::mapped::MappedArray;
use crate::types::{Buffer, DType};

#[cfg(feature = "hierarchical")]
use crate::hierarchical::OpenDataset;

#[derive(Debug)]
pub(crate) enum Storage {
    Memory(Buffer),
    Mapped(MappedArray),
    #[cfg(feature = "hierarchical")]
    Dataset(OpenDataset),
}

impl Storage {
    pub fn dtype(&self) -> DType {
        match self {
            Storage::Memory(b) => b.dtype(),
            Storage::Mapped(m) => m.dtype(),
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => d.dtype(),
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Storage::Memory(b) => b.shape(),
            Storage::Mapped(m) => m.shape(),
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => d.shape(),
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self, Storage::Memory(_))
    }

    pub fn read_region(&self, start: &[usize], count: &[usize]) -> Result<Buffer> {
        match self {
            Storage::Memory(b) => Ok(b.region(start, count)),
            Storage::Mapped(m) => m.read_region(start, count),
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => d.read_region(start, count),
        }
    }

    pub fn to_buffer(&self) -> Result<Buffer> {
        match self {
            Storage::Memory(b) => Ok(b.clone()),
            Storage::Mapped(m) => m.to_buffer(),
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => d.read_all(),
        }
    }

    /// Extract a selection, reading only its bounding box from non-memory storage
    pub fn select(&self, sel: &[AxisSelection]) -> Result<Buffer> {
        if let Storage::Memory(b) = self {
            return Ok(b.select(sel));
        }
        let bounds: Vec<_> = sel.iter().map(AxisSelection::bounds).collect();
        let start: Vec<usize> = bounds.iter().map(|r| r.start).collect();
        let count: Vec<usize> = bounds.iter().map(|r| r.len()).collect();
        let region = self.read_region(&start, &count)?;
        let relative: Vec<AxisSelection> = sel
            .iter()
            .zip(&start)
            .map(|(s, &offset)| s.shifted(offset))
            .collect();
        Ok(region.select(&relative))
    }

    /// Assign `value` into a selection in place
    pub fn assign(&mut self, sel: &[AxisSelection], value: &Buffer) -> Result<()> {
        match self {
            Storage::Memory(b) => b.assign(sel, value),
            Storage::Mapped(_) => Err(Error::ReadOnly),
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => {
                if !d.is_writable() {
                    return Err(Error::ReadOnly);
                }
                let bounds: Vec<_> = sel.iter().map(AxisSelection::bounds).collect();
                let start: Vec<usize> = bounds.iter().map(|r| r.start).collect();
                let count: Vec<usize> = bounds.iter().map(|r| r.len()).collect();
                if count.contains(&0) {
                    return Ok(());
                }
                let mut region = d.read_region(&start, &count)?;
                let relative: Vec<AxisSelection> = sel
                    .iter()
                    .zip(&start)
                    .map(|(s, &offset)| s.shifted(offset))
                    .collect();
                region.assign(&relative, value)?;
                d.write_region(&start, &region)
            }
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            #[cfg(feature = "hierarchical")]
            Storage::Dataset(d) => d.close(),
            _ => Ok(()),
        }
    }
}
