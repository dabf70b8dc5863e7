//! Typed N-dimensional buffers

use super::element::{Element, Plain};
use super::{DType, Value};
use crate::error::{Error, Result};
use crate::index::AxisSelection;
use ndarray::{Array1, ArrayD, ArrayViewD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

/// Owned N-dimensional array of one element type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buffer {
    U8(ArrayD<u8>),
    I8(ArrayD<i8>),
    U16(ArrayD<u16>),
    I16(ArrayD<i16>),
    U32(ArrayD<u32>),
    I32(ArrayD<i32>),
    U64(ArrayD<u64>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
    Bool(ArrayD<bool>),
    Object(ArrayD<Value>),
}

/// Run `$body` with `$a` bound to the inner array of every variant
macro_rules! dispatch {
    ($buf:expr, $a:ident => $body:expr) => {
        match $buf {
            $crate::types::Buffer::U8($a) => $body,
            $crate::types::Buffer::I8($a) => $body,
            $crate::types::Buffer::U16($a) => $body,
            $crate::types::Buffer::I16($a) => $body,
            $crate::types::Buffer::U32($a) => $body,
            $crate::types::Buffer::I32($a) => $body,
            $crate::types::Buffer::U64($a) => $body,
            $crate::types::Buffer::I64($a) => $body,
            $crate::types::Buffer::F32($a) => $body,
            $crate::types::Buffer::F64($a) => $body,
            $crate::types::Buffer::Bool($a) => $body,
            $crate::types::Buffer::Object($a) => $body,
        }
    };
}

/// Like `dispatch!`, with a separate arm for `Object`
macro_rules! dispatch_plain {
    ($buf:expr, $a:ident => $body:expr, $o:ident => $obj:expr) => {
        match $buf {
            $crate::types::Buffer::U8($a) => $body,
            $crate::types::Buffer::I8($a) => $body,
            $crate::types::Buffer::U16($a) => $body,
            $crate::types::Buffer::I16($a) => $body,
            $crate::types::Buffer::U32($a) => $body,
            $crate::types::Buffer::I32($a) => $body,
            $crate::types::Buffer::U64($a) => $body,
            $crate::types::Buffer::I64($a) => $body,
            $crate::types::Buffer::F32($a) => $body,
            $crate::types::Buffer::F64($a) => $body,
            $crate::types::Buffer::Bool($a) => $body,
            $crate::types::Buffer::Object($o) => $obj,
        }
    };
}

/// Map every variant's inner array to a new array of the same type
macro_rules! map_same {
    ($buf:expr, $a:ident => $body:expr) => {
        match $buf {
            $crate::types::Buffer::U8($a) => $crate::types::Buffer::U8($body),
            $crate::types::Buffer::I8($a) => $crate::types::Buffer::I8($body),
            $crate::types::Buffer::U16($a) => $crate::types::Buffer::U16($body),
            $crate::types::Buffer::I16($a) => $crate::types::Buffer::I16($body),
            $crate::types::Buffer::U32($a) => $crate::types::Buffer::U32($body),
            $crate::types::Buffer::I32($a) => $crate::types::Buffer::I32($body),
            $crate::types::Buffer::U64($a) => $crate::types::Buffer::U64($body),
            $crate::types::Buffer::I64($a) => $crate::types::Buffer::I64($body),
            $crate::types::Buffer::F32($a) => $crate::types::Buffer::F32($body),
            $crate::types::Buffer::F64($a) => $crate::types::Buffer::F64($body),
            $crate::types::Buffer::Bool($a) => $crate::types::Buffer::Bool($body),
            $crate::types::Buffer::Object($a) => $crate::types::Buffer::Object($body),
        }
    };
}

pub(crate) use dispatch_plain;

impl Buffer {
    pub fn dtype(&self) -> DType {
        match self {
            Buffer::U8(_) => DType::U8,
            Buffer::I8(_) => DType::I8,
            Buffer::U16(_) => DType::U16,
            Buffer::I16(_) => DType::I16,
            Buffer::U32(_) => DType::U32,
            Buffer::I32(_) => DType::I32,
            Buffer::U64(_) => DType::U64,
            Buffer::I64(_) => DType::I64,
            Buffer::F32(_) => DType::F32,
            Buffer::F64(_) => DType::F64,
            Buffer::Bool(_) => DType::Bool,
            Buffer::Object(_) => DType::Object,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer of default elements (zero, `false`, `None`)
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match dtype {
            DType::U8 => Buffer::U8(ArrayD::default(dim)),
            DType::I8 => Buffer::I8(ArrayD::default(dim)),
            DType::U16 => Buffer::U16(ArrayD::default(dim)),
            DType::I16 => Buffer::I16(ArrayD::default(dim)),
            DType::U32 => Buffer::U32(ArrayD::default(dim)),
            DType::I32 => Buffer::I32(ArrayD::default(dim)),
            DType::U64 => Buffer::U64(ArrayD::default(dim)),
            DType::I64 => Buffer::I64(ArrayD::default(dim)),
            DType::F32 => Buffer::F32(ArrayD::default(dim)),
            DType::F64 => Buffer::F64(ArrayD::default(dim)),
            DType::Bool => Buffer::Bool(ArrayD::default(dim)),
            DType::Object => Buffer::Object(ArrayD::default(dim)),
        }
    }

    /// Build from a row-major element vector
    pub fn from_vec<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Self> {
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(shape), data)
            .map(T::into_buffer)
            .map_err(|_| Error::shape(format!("{len} elements can not have shape {shape:?}")))
    }

    /// 1-D buffer
    pub fn from_elements<T: Element>(items: impl IntoIterator<Item = T>) -> Self {
        let data: Vec<T> = items.into_iter().collect();
        T::into_buffer(Array1::from_vec(data).into_dyn())
    }

    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::from_buffer(self)
    }

    pub fn as_array_mut<T: Element>(&mut self) -> Option<&mut ArrayD<T>> {
        T::from_buffer_mut(self)
    }

    /// Decode from bytes: little-endian elements, or the JSON element list for `Object`
    pub fn decode(dtype: DType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        match dtype {
            DType::U8 => decode_plain::<u8>(shape, bytes),
            DType::I8 => decode_plain::<i8>(shape, bytes),
            DType::U16 => decode_plain::<u16>(shape, bytes),
            DType::I16 => decode_plain::<i16>(shape, bytes),
            DType::U32 => decode_plain::<u32>(shape, bytes),
            DType::I32 => decode_plain::<i32>(shape, bytes),
            DType::U64 => decode_plain::<u64>(shape, bytes),
            DType::I64 => decode_plain::<i64>(shape, bytes),
            DType::F32 => decode_plain::<f32>(shape, bytes),
            DType::F64 => decode_plain::<f64>(shape, bytes),
            DType::Bool => decode_plain::<bool>(shape, bytes),
            DType::Object => {
                let items: Vec<Value> =
                    serde_json::from_slice(bytes).map_err(|e| Error::MetadataDecodeError {
                        key: "data".into(),
                        reason: e.to_string(),
                    })?;
                Buffer::from_vec(shape, items)
            }
        }
    }

    /// Encode in logical row-major order (see [`Buffer::decode`])
    pub fn encode(&self) -> Result<Vec<u8>> {
        dispatch_plain!(self,
            a => Ok(encode_plain(a.view())),
            o => {
                let items: Vec<&Value> = o.iter().collect();
                Ok(serde_json::to_vec(&items)?)
            }
        )
    }

    /// Extract a selection (one entry per axis)
    pub fn select(&self, sel: &[AxisSelection]) -> Buffer {
        map_same!(self, a => select_array(a.view(), sel))
    }

    /// Copy of the rectangular region `start..start+count`
    pub fn region(&self, start: &[usize], count: &[usize]) -> Buffer {
        let sel: Vec<AxisSelection> = start
            .iter()
            .zip(count)
            .map(|(&s, &c)| AxisSelection::Range {
                start: s,
                stop: s + c,
                step: 1,
            })
            .collect();
        self.select(&sel)
    }

    /// Assign `value` (broadcast) into a selection
    pub fn assign(&mut self, sel: &[AxisSelection], value: &Buffer) -> Result<()> {
        dispatch!(self, a => assign_typed(a, sel, value))
    }

    /// Write `value` into the region starting at `start`
    pub fn assign_region(&mut self, start: &[usize], value: &Buffer) -> Result<()> {
        let sel: Vec<AxisSelection> = start
            .iter()
            .zip(value.shape())
            .map(|(&s, &c)| AxisSelection::Range {
                start: s,
                stop: s + c,
                step: 1,
            })
            .collect();
        self.assign(&sel, value)
    }

    /// Join buffers of one dtype along `axis`
    pub fn concatenate(axis: usize, parts: &[Buffer]) -> Result<Buffer> {
        let first = parts
            .first()
            .ok_or_else(|| Error::shape("nothing to concatenate"))?;
        dispatch!(first, a => concatenate_typed(a, axis, &parts[1..]))
    }

    /// Permute axes (result is in standard layout)
    pub fn transpose(&self, order: &[usize]) -> Buffer {
        map_same!(self, a => a
            .view()
            .permuted_axes(IxDyn(order))
            .as_standard_layout()
            .into_owned())
    }

    /// Element at a full index
    pub fn scalar(&self, index: &[usize]) -> Option<Value> {
        dispatch!(self, a => a.get(IxDyn(index)).map(|v| v.to_value()))
    }

    /// Elements as `f64` in row-major order
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        dispatch_plain!(self,
            a => Ok(a.iter().map(|v| v.to_f64()).collect()),
            _o => Err(Error::UnsupportedDType(DType::Object))
        )
    }

    /// Elements converted to `f64`
    pub fn to_f64_array(&self) -> Result<ArrayD<f64>> {
        dispatch_plain!(self,
            a => Ok(a.mapv(|v| v.to_f64())),
            _o => Err(Error::UnsupportedDType(DType::Object))
        )
    }

    /// Elements as metadata values in row-major order
    pub fn to_values(&self) -> Vec<Value> {
        dispatch!(self, a => a.iter().map(|v| v.to_value()).collect())
    }

    /// 1-D buffer from a list of values (`int64` when all are integers, else `float64`)
    pub fn from_values(items: &[Value]) -> Option<Buffer> {
        if items.iter().all(|v| matches!(v, Value::Int(_))) {
            let ints: Option<Vec<i64>> = items.iter().map(Value::as_int).collect();
            return ints.map(Buffer::from_elements);
        }
        let floats: Option<Vec<f64>> = items.iter().map(Value::as_float).collect();
        floats.map(Buffer::from_elements)
    }

    /// Convert a list of values to a 1-D buffer of `dtype`
    pub fn from_values_as(dtype: DType, items: &[Value]) -> Option<Buffer> {
        fn cast<T: Element>(items: &[Value], f: impl Fn(&Value) -> Option<T>) -> Option<Buffer> {
            let items: Option<Vec<T>> = items.iter().map(f).collect();
            items.map(Buffer::from_elements)
        }
        fn int(v: &Value) -> Option<i64> {
            v.as_int().or_else(|| v.as_float().map(|f| f as i64))
        }
        match dtype {
            DType::U8 => cast(items, |v| int(v).map(|i| i as u8)),
            DType::I8 => cast(items, |v| int(v).map(|i| i as i8)),
            DType::U16 => cast(items, |v| int(v).map(|i| i as u16)),
            DType::I16 => cast(items, |v| int(v).map(|i| i as i16)),
            DType::U32 => cast(items, |v| int(v).map(|i| i as u32)),
            DType::I32 => cast(items, |v| int(v).map(|i| i as i32)),
            DType::U64 => cast(items, |v| match v {
                Value::Float(f) => Some(*f as u64),
                other => int(other).map(|i| i as u64),
            }),
            DType::I64 => cast(items, int),
            DType::F32 => cast(items, |v| v.as_float().map(|f| f as f32)),
            DType::F64 => cast(items, Value::as_float),
            DType::Bool => cast(items, |v| v.as_bool().or_else(|| v.as_int().map(|i| i != 0))),
            DType::Object => Some(Buffer::from_elements(items.iter().cloned())),
        }
    }

    /// Same elements under a new row-major shape
    pub fn reshape(self, shape: &[usize]) -> Result<Buffer> {
        let len = self.len();
        let err = || Error::shape(format!("{len} elements can not have shape {shape:?}"));
        Ok(map_same!(self, a => a
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(IxDyn(shape))
            .map_err(|_| err())?))
    }
}

impl<T: Element> From<ArrayD<T>> for Buffer {
    fn from(array: ArrayD<T>) -> Self {
        T::into_buffer(array)
    }
}

fn assign_typed<T: Element>(
    target: &mut ArrayD<T>,
    sel: &[AxisSelection],
    value: &Buffer,
) -> Result<()> {
    let src = T::from_buffer(value).ok_or(Error::DTypeMismatch {
        expected: T::DTYPE,
        actual: value.dtype(),
    })?;
    assign_array(target, sel, src.view())
}

fn concatenate_typed<T: Element>(first: &ArrayD<T>, axis: usize, rest: &[Buffer]) -> Result<Buffer> {
    let mut views = vec![first.view()];
    for part in rest {
        let arr = T::from_buffer(part).ok_or(Error::DTypeMismatch {
            expected: T::DTYPE,
            actual: part.dtype(),
        })?;
        views.push(arr.view());
    }
    ndarray::concatenate(Axis(axis), &views)
        .map(T::into_buffer)
        .map_err(|e| Error::shape(e.to_string()))
}

fn decode_plain<T: Plain>(shape: &[usize], bytes: &[u8]) -> Result<Buffer> {
    let size = std::mem::size_of::<T>();
    let expected = shape.iter().product::<usize>() * size;
    if bytes.len() != expected {
        return Err(Error::shape(format!(
            "expected {expected} bytes for shape {shape:?}, got {}",
            bytes.len()
        )));
    }
    let items: Vec<T> = bytes.chunks_exact(size).map(T::read_le).collect();
    Buffer::from_vec(shape, items)
}

pub(crate) fn encode_plain<T: Plain>(a: ArrayViewD<'_, T>) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() * std::mem::size_of::<T>());
    for &v in a.iter() {
        v.write_le(&mut out);
    }
    out
}

/// Orthogonal selection: ranges and single indexes are views, index lists gather
pub(crate) fn select_array<T: Clone>(a: ArrayViewD<'_, T>, sel: &[AxisSelection]) -> ArrayD<T> {
    let mut view = a;
    for (axis, s) in sel.iter().enumerate() {
        match s {
            AxisSelection::Index(i) => view.slice_axis_inplace(Axis(axis), Slice::from(*i..*i + 1)),
            AxisSelection::Range { start, stop, step } => view.slice_axis_inplace(
                Axis(axis),
                Slice::new(*start as isize, Some(*stop as isize), *step as isize),
            ),
            AxisSelection::Indices(_) => {}
        }
    }

    let mut gathered: Option<ArrayD<T>> = None;
    for (axis, s) in sel.iter().enumerate() {
        if let AxisSelection::Indices(indices) = s {
            gathered = Some(match gathered {
                None => view.select(Axis(axis), indices),
                Some(g) => g.select(Axis(axis), indices),
            });
        }
    }

    let mut out = gathered.unwrap_or_else(|| view.to_owned());
    for (axis, s) in sel.iter().enumerate().rev() {
        if matches!(s, AxisSelection::Index(_)) {
            out = out.index_axis_move(Axis(axis), 0);
        }
    }
    out
}

pub(crate) fn assign_array<T: Clone>(
    target: &mut ArrayD<T>,
    sel: &[AxisSelection],
    value: ArrayViewD<'_, T>,
) -> Result<()> {
    let positions: Vec<Vec<usize>> = sel.iter().map(AxisSelection::positions).collect();
    let kept: Vec<usize> = sel
        .iter()
        .zip(&positions)
        .filter(|(s, _)| !matches!(s, AxisSelection::Index(_)))
        .map(|(_, p)| p.len())
        .collect();

    let src = value.broadcast(IxDyn(&kept)).ok_or_else(|| {
        Error::shape(format!(
            "could not broadcast value of shape {:?} into selection of shape {kept:?}",
            value.shape()
        ))
    })?;

    let mut full = vec![0usize; sel.len()];
    for (kept_index, v) in ndarray::indices(IxDyn(&kept)).into_iter().zip(src.iter()) {
        let mut k = 0;
        for (axis, s) in sel.iter().enumerate() {
            full[axis] = match s {
                AxisSelection::Index(i) => *i,
                _ => {
                    let p = positions[axis][kept_index[k]];
                    k += 1;
                    p
                }
            };
        }
        target[IxDyn(&full)] = v.clone();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn grid() -> Buffer {
        Buffer::from(ArrayD::from_shape_fn(IxDyn(&[3, 4]), |i| (i[0] * 4 + i[1]) as i32))
    }

    #[test]
    fn test_encode_decode() {
        let buf = grid();
        let bytes = buf.encode().unwrap();
        assert_eq!(bytes.len(), 48);
        let back = Buffer::decode(DType::I32, &[3, 4], &bytes).unwrap();
        assert_eq!(back, buf);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let result = Buffer::decode(DType::F64, &[2, 2], &[0u8; 31]);
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_object_encoding_is_structured() {
        let buf = Buffer::from_elements(vec![Value::from("a"), Value::Int(3), Value::None]);
        let bytes = buf.encode().unwrap();
        let back = Buffer::decode(DType::Object, &[3], &bytes).unwrap();
        assert_eq!(back, buf);

        let bad = Buffer::decode(DType::Object, &[1], b"not json");
        assert!(matches!(bad, Err(Error::MetadataDecodeError { .. })));
    }

    #[test]
    fn test_select_mixed() {
        let buf = grid();
        let sel = vec![
            AxisSelection::Indices(vec![2, 0]),
            AxisSelection::Index(1),
        ];
        let out = buf.select(&sel);
        assert_eq!(out, Buffer::from(array![9, 1].into_dyn()));

        let sel = vec![
            AxisSelection::Range {
                start: 0,
                stop: 3,
                step: 2,
            },
            AxisSelection::Indices(vec![3, 3]),
        ];
        let out = buf.select(&sel);
        assert_eq!(out, Buffer::from(array![[3, 3], [11, 11]].into_dyn()));
    }

    #[test]
    fn test_assign_broadcasts() {
        let mut buf = grid();
        let sel = vec![AxisSelection::Indices(vec![0, 2]), AxisSelection::all(4)];
        buf.assign(&sel, &Buffer::from(array![-1].into_dyn())).unwrap();
        let a = buf.as_array::<i32>().unwrap();
        assert_eq!(a[[0, 3]], -1);
        assert_eq!(a[[1, 3]], 7);
        assert_eq!(a[[2, 0]], -1);
    }

    #[test]
    fn test_assign_checks_dtype_and_shape() {
        let mut buf = grid();
        let sel = vec![AxisSelection::Index(0), AxisSelection::all(4)];
        let wrong_type = Buffer::from(array![1.0f64].into_dyn());
        assert!(matches!(
            buf.assign(&sel, &wrong_type),
            Err(Error::DTypeMismatch { .. })
        ));
        let wrong_shape = Buffer::from(array![1, 2, 3].into_dyn());
        assert!(matches!(
            buf.assign(&sel, &wrong_shape),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_concatenate_along_axis() {
        let a = Buffer::from(array![[1.0f64, 2.0]].into_dyn());
        let b = Buffer::from(array![[3.0f64, 4.0], [5.0, 6.0]].into_dyn());
        let c = Buffer::concatenate(0, &[a, b]).unwrap();
        assert_eq!(c.shape(), &[3, 2]);
        assert_eq!(c.to_f64_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_values_to_buffer() {
        let ints = Buffer::from_values(&[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(ints.dtype(), DType::I64);
        let floats = Buffer::from_values(&[Value::Int(1), Value::Float(2.5)]).unwrap();
        assert_eq!(floats.dtype(), DType::F64);
        assert!(Buffer::from_values(&[Value::from("x")]).is_none());
    }
}
