//! Reading and writing dataset regions

use super::codec::Codec;
use super::file::ContainerFile;
use super::tree::{DatasetMeta, Extent, Layout};
use crate::error::{Error, Result};
use crate::types::{Buffer, DType};
use std::collections::BTreeMap;
use std::ops::Range;

/// Alignment of contiguous extents
pub(crate) const DATA_ALIGN: u64 = 64;
const CHUNK_ALIGN: u64 = 8;

/// Storage requested for a new dataset
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum LayoutRequest {
    Contiguous,
    Chunked { chunk: Vec<usize>, codec: Codec },
}

/// Whether rewritten chunks may reuse their extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    InPlace,
    /// Every touched chunk goes to a fresh extent, so the previous tree stays valid
    CopyOnWrite,
}

/// Store `data` as a new dataset
pub(crate) fn create(
    file: &mut ContainerFile,
    data: &Buffer,
    maxshape: Vec<Option<usize>>,
    request: LayoutRequest,
) -> Result<DatasetMeta> {
    let shape = data.shape().to_vec();
    if maxshape.len() != shape.len() {
        return Err(Error::shape(format!("max shape {maxshape:?} for shape {shape:?}")));
    }
    match request {
        LayoutRequest::Contiguous => {
            if !data.dtype().is_plain() {
                return Err(Error::InvalidOptions(
                    "object data can not be stored contiguously".into(),
                ));
            }
            let extent = file.append(&data.encode()?, DATA_ALIGN)?;
            Ok(DatasetMeta {
                dtype: data.dtype(),
                maxshape: shape.iter().map(|&d| Some(d)).collect(),
                shape,
                layout: Layout::Contiguous(extent),
            })
        }
        LayoutRequest::Chunked { chunk, codec } => {
            if chunk.len() != shape.len() || chunk.contains(&0) {
                return Err(Error::InvalidOptions(
                    format!("chunk shape {chunk:?} does not fit shape {shape:?}").into(),
                ));
            }
            let mut meta = DatasetMeta {
                dtype: data.dtype(),
                shape,
                maxshape,
                layout: Layout::Chunked {
                    chunk,
                    codec,
                    index: BTreeMap::new(),
                },
            };
            let origin = vec![0; meta.shape.len()];
            write_region(file, &mut meta, &origin, data, Placement::CopyOnWrite)?;
            Ok(meta)
        }
    }
}

fn check_bounds(meta: &DatasetMeta, start: &[usize], count: &[usize]) -> Result<()> {
    let fits = start.len() == meta.shape.len()
        && count.len() == meta.shape.len()
        && start
            .iter()
            .zip(count)
            .zip(&meta.shape)
            .all(|((&s, &c), &d)| s + c <= d);
    if fits {
        Ok(())
    } else {
        Err(Error::shape(format!(
            "region {start:?}+{count:?} is outside dataset of shape {:?}",
            meta.shape
        )))
    }
}

/// Copy of the region `start..start+count`
pub(crate) fn read_region(file: &ContainerFile, meta: &DatasetMeta, start: &[usize], count: &[usize]) -> Result<Buffer> {
    check_bounds(meta, start, count)?;
    if count.contains(&0) {
        return Ok(Buffer::zeros(meta.dtype, count));
    }
    match &meta.layout {
        Layout::Contiguous(extent) => {
            let slab = read_slab(file, meta, *extent, start, count)?;
            let mut inner = start.to_vec();
            if let Some(first) = inner.first_mut() {
                *first = 0;
            }
            Ok(slab.region(&inner, count))
        }
        Layout::Chunked { chunk, codec, index } => {
            let mut out = Buffer::zeros(meta.dtype, count);
            for pos in chunk_grid(start, count, chunk) {
                let Some(extent) = index.get(&pos) else {
                    continue;
                };
                let stored = read_chunk(file, meta.dtype, chunk, *codec, *extent)?;
                let (lo, n) = overlap(&pos, chunk, start, count);
                let origin: Vec<usize> = pos.iter().zip(chunk).map(|(p, c)| p * c).collect();
                let within: Vec<usize> = lo.iter().zip(&origin).map(|(l, o)| l - o).collect();
                let into: Vec<usize> = lo.iter().zip(start).map(|(l, s)| l - s).collect();
                out.assign_region(&into, &stored.region(&within, &n))?;
            }
            Ok(out)
        }
    }
}

pub(crate) fn read_all(file: &ContainerFile, meta: &DatasetMeta) -> Result<Buffer> {
    read_region(file, meta, &vec![0; meta.shape.len()], &meta.shape.clone())
}

/// Whole rows `start[0]..start[0]+count[0]` of a contiguous dataset
fn read_slab(file: &ContainerFile, meta: &DatasetMeta, extent: Extent, start: &[usize], count: &[usize]) -> Result<Buffer> {
    let size = meta.dtype.element_size().ok_or(Error::UnsupportedDType(DType::Object))?;
    let Some((&first, rest)) = meta.shape.split_first() else {
        let bytes = file.read_at(extent.offset, size)?;
        return Buffer::decode(meta.dtype, &[], &bytes);
    };
    let row = rest.iter().product::<usize>() * size;
    let mut shape = meta.shape.clone();
    shape[0] = count[0];
    if start[0] + count[0] > first {
        return Err(Error::shape("rows outside dataset"));
    }
    let bytes = file.read_at(extent.offset + (start[0] * row) as u64, count[0] * row)?;
    Buffer::decode(meta.dtype, &shape, &bytes)
}

fn read_chunk(file: &ContainerFile, dtype: DType, chunk: &[usize], codec: Codec, extent: Extent) -> Result<Buffer> {
    let raw = codec.decompress(&file.read_extent(extent)?)?;
    Buffer::decode(dtype, chunk, &raw).map_err(|e| match e {
        Error::ShapeMismatch(m) => Error::corrupt(format!("chunk does not decode: {m}"), extent.offset),
        other => other,
    })
}

/// Write `value` into the region starting at `start`
pub(crate) fn write_region(
    file: &mut ContainerFile,
    meta: &mut DatasetMeta,
    start: &[usize],
    value: &Buffer,
    placement: Placement,
) -> Result<()> {
    if value.dtype() != meta.dtype {
        return Err(Error::DTypeMismatch {
            expected: meta.dtype,
            actual: value.dtype(),
        });
    }
    let count = value.shape().to_vec();
    check_bounds(meta, start, &count)?;
    if count.contains(&0) {
        return Ok(());
    }
    let dtype = meta.dtype;
    if let Layout::Contiguous(extent) = meta.layout {
        let full: Vec<usize> = match meta.shape.split_first() {
            Some((_, rest)) => std::iter::once(count[0]).chain(rest.iter().copied()).collect(),
            None => Vec::new(),
        };
        let mut slab = read_slab(file, meta, extent, start, &full)?;
        let mut inner = start.to_vec();
        if let Some(first) = inner.first_mut() {
            *first = 0;
        }
        slab.assign_region(&inner, value)?;
        let row_offset = match meta.shape.split_first() {
            Some((_, rest)) => {
                let row = rest.iter().product::<usize>() * dtype.element_size().unwrap_or(0);
                (start[0] * row) as u64
            }
            None => 0,
        };
        return file.overwrite(extent.offset + row_offset, &slab.encode()?);
    }
    if let Layout::Chunked { chunk, codec, index } = &mut meta.layout {
        for pos in chunk_grid(start, &count, chunk) {
            let mut stored = match index.get(&pos) {
                Some(extent) => read_chunk(file, dtype, chunk, *codec, *extent)?,
                None => Buffer::zeros(dtype, chunk),
            };
            let (lo, n) = overlap(&pos, chunk, start, &count);
            let origin: Vec<usize> = pos.iter().zip(chunk.iter()).map(|(p, c)| p * c).collect();
            let within: Vec<usize> = lo.iter().zip(&origin).map(|(l, o)| l - o).collect();
            let from: Vec<usize> = lo.iter().zip(start).map(|(l, s)| l - s).collect();
            stored.assign_region(&within, &value.region(&from, &n))?;

            let bytes = codec.compress(&stored.encode()?)?;
            let extent = match (placement, index.get(&pos)) {
                (Placement::InPlace, Some(old)) if bytes.len() as u64 <= old.len => {
                    file.overwrite(old.offset, &bytes)?;
                    Extent {
                        offset: old.offset,
                        len: bytes.len() as u64,
                    }
                }
                _ => file.append(&bytes, CHUNK_ALIGN)?,
            };
            index.insert(pos, extent);
        }
    }
    Ok(())
}

/// Grow the dataset to `shape`, within its max shape
pub(crate) fn resize(meta: &mut DatasetMeta, shape: &[usize]) -> Result<()> {
    let allowed = shape.len() == meta.shape.len()
        && shape
            .iter()
            .zip(&meta.shape)
            .zip(&meta.maxshape)
            .all(|((&new, &old), max)| new >= old && max.is_none_or(|m| new <= m));
    if !allowed {
        return Err(Error::shape(format!(
            "can not resize dataset of shape {:?} (max {:?}) to {shape:?}",
            meta.shape, meta.maxshape
        )));
    }
    meta.shape = shape.to_vec();
    Ok(())
}

/// Grid positions of every chunk touching the region
fn chunk_grid(start: &[usize], count: &[usize], chunk: &[usize]) -> Vec<Vec<usize>> {
    if count.contains(&0) {
        return Vec::new();
    }
    let ranges: Vec<Range<usize>> = start
        .iter()
        .zip(count)
        .zip(chunk)
        .map(|((&s, &n), &c)| s / c..(s + n - 1) / c + 1)
        .collect();
    let mut grid = vec![Vec::new()];
    for r in ranges {
        grid = grid
            .into_iter()
            .flat_map(|pos: Vec<usize>| {
                r.clone().map(move |i| {
                    let mut next = pos.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    grid
}

/// Start and extent of the part of chunk `pos` inside the region
fn overlap(pos: &[usize], chunk: &[usize], start: &[usize], count: &[usize]) -> (Vec<usize>, Vec<usize>) {
    pos.iter()
        .zip(chunk)
        .zip(start.iter().zip(count))
        .map(|((&p, &c), (&s, &n))| {
            let lo = (p * c).max(s);
            let hi = ((p + 1) * c).min(s + n);
            (lo, hi - lo)
        })
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn grid(rows: usize, cols: usize) -> Buffer {
        Buffer::from_vec(&[rows, cols], (0..(rows * cols) as i32).collect()).unwrap()
    }

    fn scratch(dir: &TempDir) -> ContainerFile {
        ContainerFile::create(&dir.path().join("d.mta")).unwrap()
    }

    #[test]
    fn test_chunk_grid() {
        assert_eq!(
            chunk_grid(&[3, 0], &[4, 2], &[4, 2]),
            vec![vec![0, 0], vec![1, 0]]
        );
        assert_eq!(chunk_grid(&[], &[], &[]), vec![Vec::<usize>::new()]);
        assert!(chunk_grid(&[0], &[0], &[4]).is_empty());
    }

    #[test]
    fn test_chunked_regions() {
        let dir = TempDir::new().unwrap();
        let mut file = scratch(&dir);
        let data = grid(7, 5);
        let request = LayoutRequest::Chunked {
            chunk: vec![3, 2],
            codec: Codec::Gzip(1),
        };
        let meta = create(&mut file, &data, vec![None, Some(5)], request).unwrap();
        assert_eq!(read_all(&file, &meta).unwrap(), data);
        assert_eq!(
            read_region(&file, &meta, &[2, 1], &[3, 3]).unwrap(),
            data.region(&[2, 1], &[3, 3])
        );
    }

    #[test]
    fn test_contiguous_regions_and_rewrite() {
        let dir = TempDir::new().unwrap();
        let mut file = scratch(&dir);
        let data = grid(4, 3);
        let mut meta = create(&mut file, &data, vec![Some(4), Some(3)], LayoutRequest::Contiguous).unwrap();
        let Layout::Contiguous(extent) = meta.layout else {
            panic!("expected contiguous layout");
        };
        assert_eq!(extent.offset % DATA_ALIGN, 0);
        assert_eq!(
            read_region(&file, &meta, &[1, 1], &[2, 2]).unwrap(),
            data.region(&[1, 1], &[2, 2])
        );

        let patch = Buffer::from_vec(&[1, 2], vec![-1i32, -2]).unwrap();
        write_region(&mut file, &mut meta, &[2, 1], &patch, Placement::InPlace).unwrap();
        let back = read_all(&file, &meta).unwrap();
        assert_eq!(back.scalar(&[2, 1]), Some(crate::types::Value::Int(-1)));
        assert_eq!(back.scalar(&[2, 2]), Some(crate::types::Value::Int(-2)));
        assert_eq!(back.scalar(&[2, 0]), Some(crate::types::Value::Int(6)));
    }

    #[test]
    fn test_grow_and_fill() {
        let dir = TempDir::new().unwrap();
        let mut file = scratch(&dir);
        let request = LayoutRequest::Chunked {
            chunk: vec![1, 3],
            codec: Codec::None,
        };
        let mut meta = create(&mut file, &grid(2, 3), vec![None, Some(3)], request).unwrap();
        resize(&mut meta, &[4, 3]).unwrap();
        let tail = grid(2, 3);
        write_region(&mut file, &mut meta, &[2, 0], &tail, Placement::CopyOnWrite).unwrap();
        let all = read_all(&file, &meta).unwrap();
        assert_eq!(all.shape(), &[4, 3]);
        assert_eq!(all.region(&[2, 0], &[2, 3]), tail);

        assert!(resize(&mut meta, &[4, 4]).is_err());
        assert!(resize(&mut meta, &[3, 3]).is_err());
    }

    #[test]
    fn test_unwritten_chunks_read_as_zeros() {
        let dir = TempDir::new().unwrap();
        let mut file = scratch(&dir);
        let request = LayoutRequest::Chunked {
            chunk: vec![2],
            codec: Codec::None,
        };
        let mut meta = create(&mut file, &Buffer::from_elements(vec![1.0f64, 2.0]), vec![None], request).unwrap();
        resize(&mut meta, &[5]).unwrap();
        let all = read_all(&file, &meta).unwrap();
        assert_eq!(all.to_f64_vec().unwrap(), vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_dtype_and_bounds_checked() {
        let dir = TempDir::new().unwrap();
        let mut file = scratch(&dir);
        let request = LayoutRequest::Chunked {
            chunk: vec![2, 2],
            codec: Codec::None,
        };
        let mut meta = create(&mut file, &grid(2, 2), vec![Some(2), Some(2)], request).unwrap();
        let floats = Buffer::zeros(DType::F64, &[1, 1]);
        assert!(matches!(
            write_region(&mut file, &mut meta, &[0, 0], &floats, Placement::InPlace),
            Err(Error::DTypeMismatch { .. })
        ));
        assert!(matches!(
            read_region(&file, &meta, &[1, 1], &[2, 1]),
            Err(Error::ShapeMismatch(_))
        ));
    }
}
