//! Read-only memory-mapped arrays

use crate::error::{Error, Result};
use crate::types::{Buffer, DType, Plain};
use memmap2::{Mmap, MmapOptions};
use ndarray::{ArrayViewD, IxDyn};
use std::fs::File;

/// Plain-typed array stored contiguously in a file, row-major, little-endian
///
/// Nothing is read until a view, a region or a copy is requested.
pub struct MappedArray {
    // `None` for zero-length arrays, which can not be mapped
    map: Option<Mmap>,
    dtype: DType,
    shape: Vec<usize>,
}

impl MappedArray {
    /// Map `shape` elements of `dtype` starting at byte `offset` of `file`
    pub fn open(file: &File, offset: u64, dtype: DType, shape: &[usize]) -> Result<Self> {
        let size = dtype
            .element_size()
            .ok_or(Error::NotMappable("object arrays have no fixed-width layout".into()))?;
        let len = shape.iter().product::<usize>() * size;
        let file_len = file.metadata()?.len();
        if offset + len as u64 > file_len {
            return Err(Error::corrupt(
                format!("array of {len} bytes extends past end of file ({file_len} bytes)"),
                offset,
            ));
        }
        let map = if len == 0 {
            None
        } else {
            // SAFETY: the mapping is read-only; callers must not truncate the
            // file while the array is alive.
            Some(unsafe { MmapOptions::new().offset(offset).len(len).map(file)? })
        };
        log::debug!("mapped {len} bytes at offset {offset} as {dtype} {shape:?}");
        Ok(Self {
            map,
            dtype,
            shape: shape.to_vec(),
        })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Zero-copy typed view
    ///
    /// Fails with `NotAligned` when the mapped data does not start on an
    /// element boundary, and for `bool`, whose bytes are not validated.
    pub fn view<T: Plain>(&self) -> Result<ArrayViewD<'_, T>> {
        if T::DTYPE != self.dtype {
            return Err(Error::DTypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        if self.dtype == DType::Bool {
            return Err(Error::UnsupportedDType(DType::Bool));
        }
        if cfg!(target_endian = "big") {
            return Err(Error::NotMappable("host is big-endian".into()));
        }
        let bytes = self.bytes();
        let len = self.shape.iter().product::<usize>();
        let elements: &[T] = if len == 0 {
            &[]
        } else {
            if bytes.as_ptr() as usize % std::mem::align_of::<T>() != 0 {
                return Err(Error::NotAligned(self.dtype));
            }
            // SAFETY: length and alignment are checked above, the target is
            // little-endian and every bit pattern is a valid numeric T.
            unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<T>(), len) }
        };
        ArrayViewD::from_shape(IxDyn(&self.shape), elements).map_err(|e| Error::shape(e.to_string()))
    }

    /// Copy of the rectangular region `start..start+count`
    pub fn read_region(&self, start: &[usize], count: &[usize]) -> Result<Buffer> {
        let size = self.dtype.element_size().unwrap_or(1);
        let ndim = self.shape.len();
        for axis in 0..ndim {
            if start[axis] + count[axis] > self.shape[axis] {
                return Err(Error::shape(format!(
                    "region {start:?}+{count:?} exceeds shape {:?}",
                    self.shape
                )));
            }
        }
        if ndim == 0 {
            return self.to_buffer();
        }

        let bytes = self.bytes();
        let mut strides = vec![1usize; ndim];
        for axis in (0..ndim - 1).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        let row = count[ndim - 1] * size;
        let mut out = Vec::with_capacity(count.iter().product::<usize>() * size);
        if row > 0 {
            for outer in ndarray::indices(IxDyn(&count[..ndim - 1])) {
                let mut flat = start[ndim - 1];
                for axis in 0..ndim - 1 {
                    flat += (start[axis] + outer[axis]) * strides[axis];
                }
                out.extend_from_slice(&bytes[flat * size..flat * size + row]);
            }
        }
        Buffer::decode(self.dtype, count, &out)
    }

    /// Materialize the whole array
    pub fn to_buffer(&self) -> Result<Buffer> {
        Buffer::decode(self.dtype, &self.shape, self.bytes())
    }
}

impl std::fmt::Debug for MappedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedArray")
            .field("dtype", &self.dtype)
            .field("shape", &self.shape)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(prefix: usize, values: &[f64]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0u8; prefix]).unwrap();
        for v in values {
            f.write_all(&v.to_le_bytes()).unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_view_and_copy_agree() {
        let values: Vec<f64> = (0..12).map(f64::from).collect();
        let f = file_with(64, &values);
        let mapped = MappedArray::open(f.as_file(), 64, DType::F64, &[3, 4]).unwrap();
        let view = mapped.view::<f64>().unwrap();
        assert_eq!(view[[2, 1]], 9.0);
        assert_eq!(mapped.to_buffer().unwrap().to_f64_vec().unwrap(), values);
    }

    #[test]
    fn test_misaligned_view_is_rejected() {
        let f = file_with(3, &[1.0, 2.0]);
        let mapped = MappedArray::open(f.as_file(), 3, DType::F64, &[2]).unwrap();
        // Page-offset mappings keep the in-page misalignment of the offset
        assert!(matches!(mapped.view::<f64>(), Err(Error::NotAligned(DType::F64))));
        assert_eq!(mapped.to_buffer().unwrap().to_f64_vec().unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_region_reads_only_the_box() {
        let values: Vec<f64> = (0..24).map(f64::from).collect();
        let f = file_with(0, &values);
        let mapped = MappedArray::open(f.as_file(), 0, DType::F64, &[2, 3, 4]).unwrap();
        let region = mapped.read_region(&[1, 1, 2], &[1, 2, 2]).unwrap();
        assert_eq!(region.shape(), &[1, 2, 2]);
        assert_eq!(region.to_f64_vec().unwrap(), vec![18.0, 19.0, 22.0, 23.0]);
        assert!(mapped.read_region(&[1, 0, 0], &[2, 1, 1]).is_err());
    }

    #[test]
    fn test_rejects_short_files_and_objects() {
        let f = file_with(0, &[1.0]);
        assert!(matches!(
            MappedArray::open(f.as_file(), 0, DType::F64, &[2]),
            Err(Error::Corrupt { .. })
        ));
        assert!(matches!(
            MappedArray::open(f.as_file(), 0, DType::Object, &[1]),
            Err(Error::NotMappable(_))
        ));
    }
}
