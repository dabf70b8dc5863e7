//! Flat-format decoding

use super::header::{DYNAMIC, Header, read_block, read_record};
use crate::array::MetaArray;
use crate::error::{Error, Result};
use crate::index::AxisSelection;
use crate::io::ReadOptions;
use crate::mapped::MappedArray;
use crate::parser::parse_literal;
use crate::types::{AxisInfo, AxisSpec, Buffer, DType, Value};
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Range;
use std::path::Path;

pub(crate) fn read(path: &Path, opts: &ReadOptions) -> Result<MetaArray> {
    if opts.writable {
        return Err(Error::InvalidOptions("flat files can not be opened writable".into()));
    }
    let mut reader = BufReader::new(File::open(path)?);
    let (text, mut offset) = read_block(&mut reader)?;
    let header = Header::decode(&text)?;
    let dynamic = header.dynamic_axis()?;
    log::debug!(
        "flat header: version {} {} {:?}, dynamic axis {:?}",
        header.version,
        header.dtype,
        header.shape,
        dynamic
    );

    let mut specs = Vec::with_capacity(header.info.len());
    let mut dynamic_type = DType::F64;
    for (axis, entry) in header.info.iter().enumerate() {
        let (spec, values_type) = read_axis(entry, &mut reader, &mut offset)?;
        if Some(axis) == dynamic {
            dynamic_type = values_type.unwrap_or(DType::F64);
        }
        specs.push(spec);
    }
    if specs.len() < header.shape.len() + 1 {
        specs.resize_with(header.shape.len() + 1, AxisSpec::default);
    }

    let lazy = opts.mmap || opts.read_all_data == Some(false);
    let (data, full_shape) = match dynamic {
        None => {
            let subset = (0..header.shape.len())
                .map(|i| opts.span(i).range(header.shape[i]))
                .collect::<Vec<_>>();
            match read_static(&header, reader, offset, lazy, opts.subset.as_ref().map(|_| subset))? {
                Static::Mapped(mapped) => {
                    let info = specs.into_iter().map(AxisInfo::from).collect();
                    return MetaArray::from_mapped(mapped, info);
                }
                Static::Loaded(buffer) => (buffer, header.shape.clone()),
            }
        }
        Some(axis) => {
            if lazy {
                return Err(Error::NotMappable(
                    "files with a dynamic axis are not contiguous".into(),
                ));
            }
            let frames = read_frames(&header, axis, &mut reader, opts)?;
            if !frames.xvals.is_empty() {
                let values = Buffer::from_values_as(dynamic_type, &frames.xvals).ok_or_else(|| {
                    Error::malformed(format!("frame xVals do not fit {dynamic_type}"), 0)
                })?;
                specs[axis].values = Some(values);
            }
            let mut full = header.shape.clone();
            full[axis] = frames.extent;
            (frames.data, full)
        }
    };

    if opts.subset.is_some() {
        for (axis, &len) in full_shape.iter().enumerate() {
            let r = opts.span(axis).range(len);
            if let Some(spec) = specs.get_mut(axis) {
                *spec = spec.slice(&range(r));
            }
        }
    }
    let info = specs.into_iter().map(AxisInfo::from).collect();
    MetaArray::new(data, info)
}

/// Decode one info entry, reading its value block if it has one
fn read_axis<R: Read>(entry: &Value, reader: &mut R, offset: &mut u64) -> Result<(AxisSpec, Option<DType>)> {
    let mut map = match entry {
        Value::None => return Ok((AxisSpec::default(), None)),
        Value::Dict(d) => d.clone(),
        other => {
            return Err(Error::InvalidInfo(format!(
                "axis entry must be a dict, got {}",
                other.kind()
            )));
        }
    };
    let values_type = match map.remove("values_type") {
        None => None,
        Some(Value::Str(name)) => Some(
            DType::from_name(&name)
                .ok_or_else(|| Error::malformed(format!("unknown values_type '{name}'"), 0))?,
        ),
        Some(_) => return Err(Error::malformed("values_type must be a string", 0)),
    };
    match map.remove("values_len") {
        None => {}
        Some(Value::Str(s)) if s == DYNAMIC => {}
        Some(Value::Int(len)) => {
            let len = usize::try_from(len).map_err(|_| Error::malformed("negative values_len", 0))?;
            let dtype = values_type.ok_or_else(|| Error::malformed("values_len without values_type", 0))?;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            *offset += len as u64;
            map.insert("values".into(), Value::Array(decode_values(dtype, &bytes)?));
        }
        Some(_) => return Err(Error::malformed("values_len must be an integer or 'dynamic'", 0)),
    }
    Ok((AxisSpec::from_value(&Value::Dict(map))?, values_type))
}

fn decode_values(dtype: DType, bytes: &[u8]) -> Result<Buffer> {
    match dtype.element_size() {
        Some(size) if bytes.len() % size == 0 => Buffer::decode(dtype, &[bytes.len() / size], bytes),
        Some(size) => Err(Error::shape(format!(
            "{} value bytes is not a multiple of the {size}-byte {dtype}",
            bytes.len()
        ))),
        None => {
            let items: Vec<Value> = serde_json::from_slice(bytes).map_err(|e| Error::MetadataDecodeError {
                key: "values".into(),
                reason: e.to_string(),
            })?;
            Ok(Buffer::from_elements(items))
        }
    }
}

enum Static {
    Mapped(MappedArray),
    Loaded(Buffer),
}

fn read_static(
    header: &Header,
    mut reader: BufReader<File>,
    offset: u64,
    lazy: bool,
    subset: Option<Vec<Range<usize>>>,
) -> Result<Static> {
    if header.dtype == DType::Object {
        if lazy {
            return Err(Error::NotMappable("object arrays have no fixed-width layout".into()));
        }
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let data = Buffer::decode(DType::Object, &header.shape, &bytes)?;
        return Ok(Static::Loaded(match subset {
            Some(ranges) => data.select(&ranges.into_iter().map(range).collect::<Vec<_>>()),
            None => data,
        }));
    }

    if lazy || subset.is_some() {
        let mapped = MappedArray::open(reader.get_ref(), offset, header.dtype, &header.shape)?;
        return match subset {
            Some(ranges) => {
                let start: Vec<usize> = ranges.iter().map(|r| r.start).collect();
                let count: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
                log::debug!("reading region {start:?}+{count:?} through a map");
                Ok(Static::Loaded(mapped.read_region(&start, &count)?))
            }
            None => Ok(Static::Mapped(mapped)),
        };
    }

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    Ok(Static::Loaded(Buffer::decode(header.dtype, &header.shape, &bytes)?))
}

struct Frames {
    data: Buffer,
    /// Extent of the dynamic axis over all frames
    extent: usize,
    xvals: Vec<Value>,
}

fn read_frames(header: &Header, axis: usize, reader: &mut BufReader<File>, opts: &ReadOptions) -> Result<Frames> {
    let span = opts.span(axis);
    let mut frame_shape = header.shape.clone();
    let mut parts = Vec::new();
    let mut xvals = Vec::new();
    let mut extent = 0usize;

    while let Some(record) = read_record(reader)? {
        let record = parse_literal(&record)?;
        let count = |key: &'static str| {
            record
                .get(key)
                .and_then(Value::as_int)
                .and_then(|v| usize::try_from(v).ok())
                .ok_or_else(|| Error::malformed(format!("frame record has no valid '{key}'"), 0))
        };
        let len = count("len")?;
        let frames = count("numFrames")?;

        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes)?;
        frame_shape[axis] = frames;
        let data = Buffer::decode(header.dtype, &frame_shape, &bytes).map_err(|e| match e {
            Error::ShapeMismatch(m) => Error::shape(format!("frame at extent {extent}: {m}")),
            other => other,
        })?;
        log::debug!("frame of {frames} along axis {axis} ({len} bytes)");

        let lo = span.start.map_or(0, |s| s.saturating_sub(extent));
        let hi = span.stop.map_or(frames, |s| s.saturating_sub(extent).min(frames));
        if hi > lo {
            let sel: Vec<AxisSelection> = (0..frame_shape.len())
                .map(|i| {
                    if i == axis {
                        range(lo..hi)
                    } else {
                        range(opts.span(i).range(frame_shape[i]))
                    }
                })
                .collect();
            parts.push(data.select(&sel));
        }
        if let Some(items) = record.get("xVals").and_then(Value::as_seq) {
            xvals.extend(items.iter().cloned());
        }
        extent += frames;
    }

    let data = if parts.is_empty() {
        let shape: Vec<usize> = (0..header.shape.len())
            .map(|i| if i == axis { 0 } else { opts.span(i).range(header.shape[i]).len() })
            .collect();
        Buffer::zeros(header.dtype, &shape)
    } else {
        Buffer::concatenate(axis, &parts)?
    };
    Ok(Frames { data, extent, xvals })
}

fn range(r: Range<usize>) -> AxisSelection {
    AxisSelection::Range {
        start: r.start,
        stop: r.end,
        step: 1,
    }
}
