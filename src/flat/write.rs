//! Flat-format encoding

use super::header::{DYNAMIC, Header, read_block};
use crate::array::MetaArray;
use crate::error::{Error, Result};
use crate::io::WriteOptions;
use crate::types::{DType, FORMAT_VERSION, Value, axis_index};
use crate::writer::to_literal;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub(crate) fn write(array: &MetaArray, path: &Path, opts: &WriteOptions) -> Result<()> {
    if opts.compression.is_some() || opts.chunks.is_some() {
        log::warn!("{}: flat files ignore compression and chunking", path.display());
    }
    let append = opts
        .append_axis
        .as_ref()
        .map(|axis| axis_index(array.info(), array.ndim(), axis))
        .transpose()?;
    if !opts.append_keys.is_empty() {
        log::warn!("{}: flat files only append axis values", path.display());
    }

    let header = build_header(array, append)?;
    let data = array.to_buffer()?;

    let existing = append.is_some() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let mut out = if existing {
        check_appendable(path, &header.header, append)?;
        log::debug!("{}: appending {:?}", path.display(), array.shape());
        BufWriter::new(OpenOptions::new().append(true).open(path)?)
    } else {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(header.header.encode().as_bytes())?;
        out.write_all(b"\n\n")?;
        for block in &header.blocks {
            out.write_all(block)?;
        }
        out
    };

    let payload = data.encode()?;
    if let Some(axis) = append {
        let mut record = BTreeMap::new();
        record.insert("len".to_string(), Value::from(payload.len()));
        record.insert("numFrames".to_string(), Value::from(array.shape()[axis]));
        if let Some(values) = &array.info()[axis].spec().values {
            record.insert("xVals".to_string(), Value::List(values.to_values()));
        }
        out.write_all(b"\n")?;
        out.write_all(to_literal(&Value::Dict(record)).as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.write_all(&payload)?;
    out.flush()?;
    Ok(())
}

struct Encoded {
    header: Header,
    /// Value blocks in axis order
    blocks: Vec<Vec<u8>>,
}

fn build_header(array: &MetaArray, append: Option<usize>) -> Result<Encoded> {
    let mut info = Vec::with_capacity(array.info().len());
    let mut blocks = Vec::new();
    for (i, slot) in array.info().iter().enumerate() {
        if slot.is_empty() && Some(i) != append {
            info.push(Value::None);
            continue;
        }
        let mut d = slot.spec().to_dict();
        d.remove("values");
        let values = slot.spec().values.as_ref();
        if Some(i) == append {
            d.insert("values_len".into(), Value::from(DYNAMIC));
            if let Some(values) = values {
                d.insert("values_type".into(), Value::from(values.dtype().name()));
            }
        } else if let Some(values) = values {
            let block = values.encode()?;
            d.insert("values_len".into(), Value::from(block.len()));
            d.insert("values_type".into(), Value::from(values.dtype().name()));
            blocks.push(block);
        }
        info.push(Value::Dict(d));
    }
    Ok(Encoded {
        header: Header {
            shape: array.shape().to_vec(),
            dtype: array.dtype(),
            info,
            version: FORMAT_VERSION.to_string(),
        },
        blocks,
    })
}

/// Refuse to append frames that would not read back as one array
fn check_appendable(path: &Path, new: &Header, axis: Option<usize>) -> Result<()> {
    let (text, _) = read_block(&mut BufReader::new(File::open(path)?))?;
    let old = Header::decode(&text)?;
    if old.version != FORMAT_VERSION {
        return Err(Error::VersionConflict {
            found: old.version,
            expected: FORMAT_VERSION.to_string(),
        });
    }
    let old_axis = old.dynamic_axis()?;
    if old_axis != axis {
        return Err(Error::shape(format!(
            "file appends along axis {old_axis:?}, not {axis:?}"
        )));
    }
    if old.dtype != new.dtype {
        return Err(Error::DTypeMismatch {
            expected: old.dtype,
            actual: new.dtype,
        });
    }
    let same_frame = old.shape.len() == new.shape.len()
        && old
            .shape
            .iter()
            .zip(&new.shape)
            .enumerate()
            .all(|(i, (a, b))| Some(i) == axis || a == b);
    if !same_frame {
        return Err(Error::shape(format!(
            "can not append shape {:?} to frames of shape {:?}",
            new.shape, old.shape
        )));
    }
    if let Some(axis) = axis {
        check_same_values(&old, new, axis)?;
    }
    Ok(())
}

/// Every frame carries axis values of one type, or none do
fn check_same_values(old: &Header, new: &Header, axis: usize) -> Result<()> {
    let values_type = |h: &Header| {
        h.info
            .get(axis)
            .and_then(|d| d.get("values_type"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match (values_type(old), values_type(new)) {
        (None, None) => Ok(()),
        (Some(a), Some(b)) if a == b => Ok(()),
        (Some(a), Some(b)) => match (DType::from_name(&a), DType::from_name(&b)) {
            (Some(expected), Some(actual)) => Err(Error::DTypeMismatch { expected, actual }),
            _ => Err(Error::malformed(format!("axis {axis} values are {a}, not {b}"), 0)),
        },
        (Some(_), None) => Err(Error::shape(format!(
            "frames carry values for axis {axis} but the appended array has none"
        ))),
        (None, Some(_)) => Err(Error::shape(format!(
            "frames carry no values for axis {axis} but the appended array does"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ReadOptions, WriteOptions};
    use crate::types::{AxisInfo, AxisSpec, Buffer, ColumnSpec};
    use tempfile::TempDir;

    fn sample(rows: usize, start: f64) -> MetaArray {
        let data: Vec<f64> = (0..rows * 2).map(|v| v as f64).collect();
        MetaArray::new(
            Buffer::from_vec(&[rows, 2], data).unwrap(),
            vec![
                AxisSpec::named("time")
                    .with_values(Buffer::from_elements((0..rows).map(|i| start + i as f64)))
                    .into(),
                AxisSpec::named("signal")
                    .with_cols([ColumnSpec::named("a"), ColumnSpec::named("b")])
                    .into(),
                AxisSpec::default().with_extra("note", "trace").into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_header_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.ma");
        sample(3, 0.0).write(&path, &WriteOptions::flat()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let split = bytes.windows(2).position(|w| w == b"\n\n").unwrap();
        let header = Header::decode(std::str::from_utf8(&bytes[..split]).unwrap()).unwrap();
        assert_eq!(header.version, "2");
        assert_eq!(header.shape, vec![3, 2]);
        assert_eq!(header.info[0].get("values_len"), Some(&Value::Int(24)));
        assert_eq!(header.info[0].get("values_type"), Some(&Value::from("float64")));
        // value block then data
        assert_eq!(bytes.len(), split + 2 + 24 + 48);
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plain.ma");
        let a = sample(3, 0.5);
        a.write(&path, &WriteOptions::flat()).unwrap();
        let b = crate::io::load(&path).unwrap();
        assert_eq!(b.info(), a.info());
        assert_eq!(b.to_buffer().unwrap(), a.to_buffer().unwrap());
    }

    #[test]
    fn test_append_frames() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.ma");
        let opts = WriteOptions::flat().append_axis("time");
        sample(3, 0.0).write(&path, &opts).unwrap();
        sample(2, 3.0).write(&path, &opts).unwrap();

        let b = crate::io::load(&path).unwrap();
        assert_eq!(b.shape(), &[5, 2]);
        assert_eq!(
            b.axis_values("time").unwrap().to_f64_vec().unwrap(),
            vec![0.0, 1.0, 2.0, 3.0, 4.0]
        );
        let sub = crate::io::load_with(
            &path,
            &ReadOptions::new().subset([crate::index::Span::new(2, 4)]),
        )
        .unwrap();
        assert_eq!(sub.shape(), &[2, 2]);
        assert_eq!(
            sub.axis_values("time").unwrap().to_f64_vec().unwrap(),
            vec![2.0, 3.0]
        );
        assert_eq!(
            sub.to_buffer().unwrap().to_f64_vec().unwrap(),
            vec![4.0, 5.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_append_rejects_other_frame_shapes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.ma");
        let opts = WriteOptions::flat().append_axis(0usize);
        sample(3, 0.0).write(&path, &opts).unwrap();
        let wide = MetaArray::new(Buffer::zeros(crate::types::DType::F64, &[1, 3]), vec![]).unwrap();
        assert!(matches!(wide.write(&path, &opts), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_append_requires_matching_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.ma");
        let opts = WriteOptions::flat().append_axis(0usize);
        sample(3, 0.0).write(&path, &opts).unwrap();
        let before = std::fs::read(&path).unwrap();

        let bare = MetaArray::new(Buffer::zeros(crate::types::DType::F64, &[2, 2]), vec![]).unwrap();
        assert!(matches!(bare.write(&path, &opts), Err(Error::ShapeMismatch(_))));
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(crate::io::load(&path).unwrap().shape(), &[3, 2]);
    }

    #[test]
    fn test_append_requires_same_values_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frames.ma");
        let opts = WriteOptions::flat().append_axis(0usize);
        let counted = |values: Buffer| {
            MetaArray::new(
                Buffer::zeros(crate::types::DType::F64, &[2, 2]),
                vec![AxisSpec::named("time").with_values(values).into()],
            )
            .unwrap()
        };
        counted(Buffer::from_elements(vec![1i64, 2])).write(&path, &opts).unwrap();
        let err = counted(Buffer::from_elements(vec![3.5f64, 4.5]))
            .write(&path, &opts)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DTypeMismatch {
                expected: crate::types::DType::I64,
                actual: crate::types::DType::F64,
            }
        ));
        assert_eq!(
            crate::io::load(&path).unwrap().axis_values(0usize).unwrap().to_values(),
            vec![Value::Int(1), Value::Int(2)]
        );
    }

    #[test]
    fn test_empty_slots_are_none() {
        let a = MetaArray::new(Buffer::from_elements(vec![1i32, 2]), vec![AxisInfo::Empty]).unwrap();
        let encoded = build_header(&a, None).unwrap();
        assert_eq!(encoded.header.info, vec![Value::None, Value::None]);
        assert!(encoded.blocks.is_empty());
    }
}
