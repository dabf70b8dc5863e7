//! Arrays stored in hierarchical container files
//!
//! The root group carries the format version in its `MetaArray` attribute,
//! the elements in the `data` dataset and the axis info as the `info` list.

mod handle;
mod meta;

pub(crate) use handle::OpenDataset;

use crate::array::{MetaArray, Storage};
use crate::container::{self, Attr, Codec, ContainerFile, Layout, LayoutRequest, Node, Placement};
use crate::error::{Error, Result};
use crate::index::AxisSelection;
use crate::io::{ReadOptions, WriteOptions};
use crate::mapped::MappedArray;
use crate::types::{AxisInfo, Buffer, FORMAT_VERSION, Value, axis_index};
use std::path::Path;

pub(crate) const DATA: &str = "data";
const INFO: &str = "info";
const VERSION_ATTR: &str = "MetaArray";

/// Larger datasets stay on disk unless `read_all_data` says otherwise
const READ_ALL_LIMIT: usize = 500_000_000;
const MAX_CHUNK: usize = 100_000;

pub(crate) fn read(path: &Path, opts: &ReadOptions) -> Result<MetaArray> {
    let file = ContainerFile::open(path, opts.writable)?;
    let version = file_version(&file)?;
    if is_newer(&version) {
        log::warn!(
            "{}: written with format version {version}, newer than {FORMAT_VERSION}; reading anyway",
            path.display()
        );
    }
    let mut info = read_info(&file)?;
    let meta = file
        .root()
        .dataset(DATA)
        .cloned()
        .ok_or_else(|| Error::corrupt("container has no data dataset", 0))?;

    if let Some(subset) = &opts.subset {
        if opts.writable {
            return Err(Error::InvalidOptions("subset reads can not be writable".into()));
        }
        let ndim = meta.shape.len();
        if subset.len() > ndim {
            return Err(Error::TooManySelectors {
                given: subset.len(),
                ndim,
            });
        }
        let ranges: Vec<_> = (0..ndim).map(|i| opts.span(i).range(meta.shape[i])).collect();
        let start: Vec<usize> = ranges.iter().map(|r| r.start).collect();
        let count: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
        let data = match (&meta.layout, opts.mmap) {
            (Layout::Contiguous(extent), true) => {
                MappedArray::open(file.file(), extent.offset, meta.dtype, &meta.shape)?.read_region(&start, &count)?
            }
            _ => container::read_region(&file, &meta, &start, &count)?,
        };
        if info.len() < ndim + 1 {
            info.resize_with(ndim + 1, AxisInfo::default);
        }
        for (slot, r) in info.iter_mut().zip(ranges) {
            let sel = AxisSelection::Range {
                start: r.start,
                stop: r.end,
                step: 1,
            };
            *slot = AxisInfo::from(slot.spec().slice(&sel));
        }
        return MetaArray::new(data, info);
    }

    if opts.mmap {
        if opts.writable {
            return Err(Error::InvalidOptions("mapped arrays are read-only".into()));
        }
        return match meta.layout {
            Layout::Contiguous(extent) => {
                let mapped = MappedArray::open(file.file(), extent.offset, meta.dtype, &meta.shape)?;
                MetaArray::from_mapped(mapped, info)
            }
            Layout::Chunked { .. } => Err(Error::NotMappable(
                "dataset is chunked; write it with `mappable` to map it".into(),
            )),
        };
    }

    let size = meta.shape.iter().product::<usize>() * meta.dtype.element_size().unwrap_or(8);
    let read_all = opts
        .read_all_data
        .unwrap_or(!opts.writable && size < READ_ALL_LIMIT);
    if read_all {
        let data = container::read_all(&file, &meta)?;
        MetaArray::new(data, info)
    } else {
        log::debug!(
            "{}: keeping {size} bytes on disk (writable: {})",
            path.display(),
            opts.writable
        );
        MetaArray::from_storage(Storage::Dataset(OpenDataset::new(file, meta)), info)
    }
}

pub(crate) fn write(array: &MetaArray, path: &Path, opts: &WriteOptions) -> Result<()> {
    if opts.mappable && opts.append_axis.is_some() {
        return Err(Error::InvalidOptions(
            "mappable datasets are contiguous and can not be appended to".into(),
        ));
    }
    let append = opts
        .append_axis
        .as_ref()
        .map(|axis| axis_index(array.info(), array.ndim(), axis))
        .transpose()?;
    if let Some(axis) = append {
        if path.metadata().map(|m| m.len() > 0).unwrap_or(false) {
            return append_to(array, path, axis, opts);
        }
    }

    let request = layout_for(array, append, opts)?;
    let data = array.to_buffer()?;
    let mut maxshape: Vec<Option<usize>> = array.shape().iter().map(|&d| Some(d)).collect();
    if let Some(axis) = append {
        maxshape[axis] = None;
    }

    let mut file = ContainerFile::create(path)?;
    file.root_mut()
        .attrs
        .insert(VERSION_ATTR.into(), Attr::Str(FORMAT_VERSION.into()));
    let meta = container::create(&mut file, &data, maxshape, request)?;
    file.root_mut().children.insert(DATA.into(), Node::Dataset(meta));
    write_info(&mut file, array.info())?;
    file.commit()
}

/// Replace the info tree of an existing file
pub(crate) fn rewrite_info(array: &MetaArray, path: &Path) -> Result<()> {
    let mut file = ContainerFile::open(path, true)?;
    check_same_version(&file)?;
    let shape = file
        .root()
        .dataset(DATA)
        .map(|d| d.shape.clone())
        .ok_or_else(|| Error::corrupt("container has no data dataset", 0))?;
    if shape != array.shape() {
        return Err(Error::shape(format!(
            "info for shape {:?} does not describe stored shape {shape:?}",
            array.shape()
        )));
    }
    write_info(&mut file, array.info())?;
    file.commit()
}

fn layout_for(array: &MetaArray, append: Option<usize>, opts: &WriteOptions) -> Result<LayoutRequest> {
    if opts.mappable {
        if array.dtype().is_plain() {
            if opts.compression.is_some() || opts.chunks.is_some() {
                log::warn!("mappable datasets are stored uncompressed and unchunked");
            }
            return Ok(LayoutRequest::Contiguous);
        }
        log::warn!("object data is always chunked and can not be mapped");
    }
    let chunk = match &opts.chunks {
        Some(chunk) => {
            if chunk.len() != array.ndim() || chunk.contains(&0) {
                return Err(Error::InvalidOptions(
                    format!("chunk shape {chunk:?} does not fit {} axes", array.ndim()).into(),
                ));
            }
            chunk.clone()
        }
        None => default_chunks(array, append),
    };
    Ok(LayoutRequest::Chunked {
        chunk,
        codec: Codec::for_compression(opts.compression)?,
    })
}

/// Full extent capped per axis, one position along the append axis or else
/// along every axis with columns
fn default_chunks(array: &MetaArray, append: Option<usize>) -> Vec<usize> {
    let mut chunk: Vec<usize> = array.shape().iter().map(|&d| d.clamp(1, MAX_CHUNK)).collect();
    match append {
        Some(axis) => chunk[axis] = 1,
        None => {
            for (axis, c) in chunk.iter_mut().enumerate() {
                if array.info()[axis].spec().cols.is_some() {
                    *c = 1;
                }
            }
        }
    }
    chunk
}

fn append_to(array: &MetaArray, path: &Path, axis: usize, opts: &WriteOptions) -> Result<()> {
    let mut file = ContainerFile::open(path, true)?;
    check_same_version(&file)?;
    let mut meta = file
        .root()
        .dataset(DATA)
        .cloned()
        .ok_or_else(|| Error::corrupt("container has no data dataset", 0))?;
    if meta.dtype != array.dtype() {
        return Err(Error::DTypeMismatch {
            expected: meta.dtype,
            actual: array.dtype(),
        });
    }
    let same_frame = meta.shape.len() == array.ndim()
        && meta
            .shape
            .iter()
            .zip(array.shape())
            .enumerate()
            .all(|(i, (a, b))| i == axis || a == b);
    if !same_frame {
        return Err(Error::shape(format!(
            "can not append shape {:?} to stored shape {:?} along axis {axis}",
            array.shape(),
            meta.shape
        )));
    }

    // Everything to grow along with the data, checked before any write
    let slot = axis.to_string();
    let spec = array.info()[axis].spec();
    let stored_info = file.root().group(INFO).and_then(|g| g.group(&slot));
    let stored_values = stored_info.and_then(|g| g.dataset("values")).is_some();
    if stored_values && spec.values.is_none() {
        return Err(Error::shape(format!(
            "file stores values for axis {axis} but the appended array has none"
        )));
    }
    let mut keys: Vec<String> = Vec::new();
    if spec.values.is_some() {
        keys.push("values".into());
    }
    keys.extend(opts.append_keys.iter().filter(|k| k.as_str() != "values").cloned());
    let mut grow = Vec::with_capacity(keys.len());
    for key in keys {
        let stored = stored_info
            .and_then(|g| g.dataset(&key))
            .cloned()
            .ok_or_else(|| Error::UnknownAppendKey(key.clone()))?;
        let values = match spec.key(&key) {
            Some(Value::Array(b)) => b,
            Some(Value::List(items)) | Some(Value::Tuple(items)) => Buffer::from_values_as(stored.dtype, &items)
                .ok_or_else(|| Error::InvalidOptions(format!("append key {key:?} does not fit {}", stored.dtype).into()))?,
            _ => {
                return Err(Error::InvalidOptions(
                    format!("append key {key:?} is not an array on axis {axis}").into(),
                ));
            }
        };
        if values.dtype() != stored.dtype {
            return Err(Error::DTypeMismatch {
                expected: stored.dtype,
                actual: values.dtype(),
            });
        }
        grow.push((key, stored, values));
    }

    let data = array.to_buffer()?;
    let mut start = vec![0; meta.shape.len()];
    start[axis] = meta.shape[axis];
    let mut shape = meta.shape.clone();
    shape[axis] += array.shape()[axis];
    container::resize(&mut meta, &shape)?;
    container::write_region(&mut file, &mut meta, &start, &data, Placement::CopyOnWrite)?;

    let mut grown = Vec::with_capacity(grow.len());
    for (key, mut stored, values) in grow {
        let mut start = vec![0; stored.shape.len()];
        let mut shape = stored.shape.clone();
        if let (Some(first), Some(extra)) = (shape.first_mut(), values.shape().first()) {
            start[0] = *first;
            *first += extra;
        }
        container::resize(&mut stored, &shape)?;
        container::write_region(&mut file, &mut stored, &start, &values, Placement::CopyOnWrite)?;
        grown.push((key, stored));
    }

    log::debug!(
        "{}: appended {} positions along axis {axis}, grew {} info keys",
        path.display(),
        array.shape()[axis],
        grown.len()
    );
    let root = file.root_mut();
    root.children.insert(DATA.into(), Node::Dataset(meta));
    if let Some(group) = root.group_mut(INFO).and_then(|g| g.group_mut(&slot)) {
        for (key, stored) in grown {
            group.children.insert(key, Node::Dataset(stored));
        }
    }
    file.commit()
}

fn write_info(file: &mut ContainerFile, info: &[AxisInfo]) -> Result<()> {
    let value = Value::List(info.iter().map(AxisInfo::to_value).collect());
    let stored = meta::store(file, &value)?;
    stored.insert_into(file.root_mut(), INFO);
    Ok(())
}

fn read_info(file: &ContainerFile) -> Result<Vec<AxisInfo>> {
    let Some(group) = file.root().group(INFO) else {
        return Ok(Vec::new());
    };
    match meta::load_group(file, INFO, group)? {
        Value::List(items) | Value::Tuple(items) => items.iter().map(AxisInfo::from_value).collect(),
        other => Err(Error::MetadataDecodeError {
            key: INFO.into(),
            reason: format!("expected a list, got {}", other.kind()),
        }),
    }
}

fn file_version(file: &ContainerFile) -> Result<String> {
    match file.root().attrs.get(VERSION_ATTR) {
        Some(Attr::Str(v)) => Ok(v.clone()),
        Some(Attr::Int(v)) => Ok(v.to_string()),
        _ => Err(Error::corrupt("container has no MetaArray version", 0)),
    }
}

fn check_same_version(file: &ContainerFile) -> Result<()> {
    let found = file_version(file)?;
    if found != FORMAT_VERSION {
        return Err(Error::VersionConflict {
            found,
            expected: FORMAT_VERSION.into(),
        });
    }
    Ok(())
}

fn is_newer(version: &str) -> bool {
    match (version.parse::<f64>(), FORMAT_VERSION.parse::<f64>()) {
        (Ok(v), Ok(current)) => v > current,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisSpec, ColumnSpec, DType};

    #[test]
    fn test_default_chunks() {
        let a = MetaArray::new(
            Buffer::zeros(DType::F32, &[200_000, 3, 0]),
            vec![
                AxisInfo::Empty,
                AxisSpec::default()
                    .with_cols([ColumnSpec::named("x"), ColumnSpec::named("y"), ColumnSpec::named("z")])
                    .into(),
            ],
        )
        .unwrap();
        assert_eq!(default_chunks(&a, None), vec![100_000, 1, 1]);
        assert_eq!(default_chunks(&a, Some(0)), vec![1, 3, 1]);
    }

    #[test]
    fn test_newer_versions() {
        assert!(!is_newer("2"));
        assert!(!is_newer("1"));
        assert!(is_newer("3"));
        assert!(is_newer("2.1"));
    }
}
