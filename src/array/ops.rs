//! Reductions, elementwise binary operators and transposition

use super::{Item, MetaArray};
use crate::error::{Error, Result};
use crate::types::{ArithOp, AxisRef, Buffer, DType, Plain, Value, dispatch_plain};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};

/// Elementwise binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }

    fn arith(self) -> Option<ArithOp> {
        match self {
            BinaryOp::Add => Some(ArithOp::Add),
            BinaryOp::Sub => Some(ArithOp::Sub),
            BinaryOp::Mul => Some(ArithOp::Mul),
            _ => None,
        }
    }

    fn compare<T: PartialOrd>(self, a: &T, b: &T) -> bool {
        match self {
            BinaryOp::Eq => a == b,
            BinaryOp::Ne => a != b,
            BinaryOp::Lt => a < b,
            BinaryOp::Le => a <= b,
            BinaryOp::Gt => a > b,
            BinaryOp::Ge => a >= b,
            _ => false,
        }
    }

    fn apply_f64(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            _ => f64::NAN,
        }
    }
}

/// Right-hand side of a binary operator
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Array(&'a MetaArray),
    Buffer(&'a Buffer),
    Scalar(f64),
}

impl<'a> From<&'a MetaArray> for Operand<'a> {
    fn from(v: &'a MetaArray) -> Self {
        Operand::Array(v)
    }
}

impl<'a> From<&'a Buffer> for Operand<'a> {
    fn from(v: &'a Buffer) -> Self {
        Operand::Buffer(v)
    }
}

impl From<f64> for Operand<'_> {
    fn from(v: f64) -> Self {
        Operand::Scalar(v)
    }
}

#[derive(Clone, Copy)]
enum Reduction {
    Mean,
    Min,
    Max,
}

impl MetaArray {
    // ========================================================================
    // Reductions
    // ========================================================================

    /// Mean over `axis` (as `float64`), or over all elements when `None`
    pub fn mean(&self, axis: Option<AxisRef>) -> Result<Item> {
        self.reduce(axis, Reduction::Mean)
    }

    /// Minimum over `axis`, keeping the dtype; NaN propagates
    pub fn min(&self, axis: Option<AxisRef>) -> Result<Item> {
        self.reduce(axis, Reduction::Min)
    }

    /// Maximum over `axis`, keeping the dtype; NaN propagates
    pub fn max(&self, axis: Option<AxisRef>) -> Result<Item> {
        self.reduce(axis, Reduction::Max)
    }

    fn reduce(&self, axis: Option<AxisRef>, kind: Reduction) -> Result<Item> {
        if self.dtype() == DType::Object {
            return Err(Error::UnsupportedDType(DType::Object));
        }
        let axis = axis.map(|a| self.axis_index(a)).transpose()?;
        let data = self.to_buffer()?;

        let Some(axis) = axis else {
            if data.is_empty() {
                return Err(Error::EmptyReduction);
            }
            let value = match kind {
                Reduction::Mean => {
                    let values = data.to_f64_vec()?;
                    Value::Float(values.iter().sum::<f64>() / values.len() as f64)
                }
                Reduction::Min | Reduction::Max => dispatch_plain!(&data,
                    a => fold_all(a, kind),
                    _o => return Err(Error::UnsupportedDType(DType::Object))
                ),
            };
            return Ok(Item::Scalar(value));
        };

        if self.shape()[axis] == 0 {
            return Err(Error::EmptyReduction);
        }
        let reduced = match kind {
            Reduction::Mean => {
                let values = data.to_f64_array()?;
                let mean = values.mean_axis(Axis(axis)).ok_or(Error::EmptyReduction)?;
                Buffer::from(mean)
            }
            Reduction::Min | Reduction::Max => dispatch_plain!(&data,
                a => fold_axis(a, axis, kind),
                _o => return Err(Error::UnsupportedDType(DType::Object))
            ),
        };
        let mut info = self.info_copy();
        info.remove(axis);
        Ok(Item::Array(MetaArray::derived(reduced, info)))
    }

    // ========================================================================
    // Binary operators
    // ========================================================================

    /// Apply `op` elementwise; the result has this array's shape and info
    pub fn binop<'a>(&self, op: BinaryOp, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        let lhs = self.to_buffer()?;
        let (rhs, scalar) = match rhs.into() {
            Operand::Array(a) => (a.to_buffer()?, false),
            Operand::Buffer(b) => (b.clone(), false),
            Operand::Scalar(v) => (Buffer::from(ArrayD::from_elem(IxDyn(&[]), v)), true),
        };
        let result = apply(op, &lhs, &rhs, scalar)?;
        if result.shape() != lhs.shape() {
            return Err(Error::shape(format!(
                "binary operator produced shape {:?} from an array of shape {:?}",
                result.shape(),
                lhs.shape()
            )));
        }
        Ok(MetaArray::derived(result, self.info_copy()))
    }

    pub fn add<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Add, rhs)
    }

    pub fn sub<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Sub, rhs)
    }

    pub fn mul<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Mul, rhs)
    }

    pub fn div<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Div, rhs)
    }

    pub fn eq<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Eq, rhs)
    }

    pub fn ne<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Ne, rhs)
    }

    pub fn lt<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Lt, rhs)
    }

    pub fn le<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Le, rhs)
    }

    pub fn gt<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Gt, rhs)
    }

    pub fn ge<'a>(&self, rhs: impl Into<Operand<'a>>) -> Result<MetaArray> {
        self.binop(BinaryOp::Ge, rhs)
    }

    // ========================================================================
    // Transpose
    // ========================================================================

    /// Permute axes and their info; the trailing descriptor stays last
    pub fn transpose(&self, order: &[usize]) -> Result<MetaArray> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        for &axis in order {
            if axis >= ndim || std::mem::replace(&mut seen[axis], true) {
                return Err(Error::InvalidOptions(
                    format!("{order:?} is not a permutation of {ndim} axes").into(),
                ));
            }
        }
        if order.len() != ndim {
            return Err(Error::InvalidOptions(
                format!("{order:?} is not a permutation of {ndim} axes").into(),
            ));
        }
        let data = self.to_buffer()?.transpose(order);
        let mut info: Vec<_> = order.iter().map(|&axis| self.info[axis].clone()).collect();
        info.push(self.info[ndim].clone());
        Ok(MetaArray::derived(data, info))
    }
}

fn fold_all<T: Plain>(a: &ArrayD<T>, kind: Reduction) -> Value {
    let init = a.iter().next().copied().unwrap_or_default();
    let f = extreme::<T>(kind);
    a.iter().fold(init, |acc, &v| f(acc, v)).to_value()
}

fn fold_axis<T: Plain>(a: &ArrayD<T>, axis: usize, kind: Reduction) -> Buffer {
    let f = extreme::<T>(kind);
    let reduced = a.map_axis(Axis(axis), |lane| {
        let init = lane.iter().next().copied().unwrap_or_default();
        lane.iter().fold(init, |acc, &v| f(acc, v))
    });
    T::into_buffer(reduced)
}

fn extreme<T: Plain>(kind: Reduction) -> fn(T, T) -> T {
    match kind {
        Reduction::Max => T::greater,
        _ => T::lesser,
    }
}

fn broadcast<'a, T>(b: &'a ArrayD<T>, shape: &[usize]) -> Result<ArrayViewD<'a, T>> {
    b.broadcast(IxDyn(shape)).ok_or_else(|| {
        Error::shape(format!(
            "operand of shape {:?} can not be broadcast to {shape:?}",
            b.shape()
        ))
    })
}

fn apply(op: BinaryOp, lhs: &Buffer, rhs: &Buffer, scalar: bool) -> Result<Buffer> {
    if lhs.dtype() == DType::Object || rhs.dtype() == DType::Object {
        return apply_object(op, lhs, rhs);
    }
    let same = lhs.dtype() == rhs.dtype() && !scalar;

    if op.is_comparison() {
        if same {
            return dispatch_plain!(lhs,
                a => compare_same(op, a, rhs),
                _o => Err(Error::UnsupportedDType(DType::Object))
            );
        }
        let a = lhs.to_f64_array()?;
        let b = rhs.to_f64_array()?;
        let b = broadcast(&b, a.shape())?;
        return Ok(Buffer::from(Zip::from(&a).and(b).map_collect(|x, y| op.compare(x, y))));
    }

    if let Some(arith) = op.arith() {
        if same && lhs.dtype() != DType::Bool {
            return dispatch_plain!(lhs,
                a => arith_same(arith, a, rhs),
                _o => Err(Error::UnsupportedDType(DType::Object))
            );
        }
    }
    let a = lhs.to_f64_array()?;
    let b = rhs.to_f64_array()?;
    let b = broadcast(&b, a.shape())?;
    Ok(Buffer::from(Zip::from(&a).and(b).map_collect(|&x, &y| op.apply_f64(x, y))))
}

fn arith_same<T: Plain>(op: ArithOp, a: &ArrayD<T>, rhs: &Buffer) -> Result<Buffer> {
    let b = T::from_buffer(rhs).ok_or(Error::DTypeMismatch {
        expected: T::DTYPE,
        actual: rhs.dtype(),
    })?;
    let b = broadcast(b, a.shape())?;
    Ok(T::into_buffer(Zip::from(a).and(b).map_collect(|&x, &y| T::arith(op, x, y))))
}

fn compare_same<T: Plain>(op: BinaryOp, a: &ArrayD<T>, rhs: &Buffer) -> Result<Buffer> {
    let b = T::from_buffer(rhs).ok_or(Error::DTypeMismatch {
        expected: T::DTYPE,
        actual: rhs.dtype(),
    })?;
    let b = broadcast(b, a.shape())?;
    Ok(Buffer::from(Zip::from(a).and(b).map_collect(|x, y| op.compare(x, y))))
}

/// Object arrays compare by value and support only `eq`/`ne`
fn apply_object(op: BinaryOp, lhs: &Buffer, rhs: &Buffer) -> Result<Buffer> {
    if !matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
        return Err(Error::UnsupportedDType(DType::Object));
    }
    let to_objects = |b: &Buffer| -> Result<ArrayD<Value>> {
        ArrayD::from_shape_vec(IxDyn(b.shape()), b.to_values()).map_err(|e| Error::shape(e.to_string()))
    };
    let a = to_objects(lhs)?;
    let b = to_objects(rhs)?;
    let b = broadcast(&b, a.shape())?;
    let equal = op == BinaryOp::Eq;
    Ok(Buffer::from(Zip::from(&a).and(b).map_collect(|x, y| (x == y) == equal)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AxisSpec;
    use ndarray::array;

    fn grid() -> MetaArray {
        MetaArray::new(
            array![[1i32, 5, 3], [4, 2, 6]].into_dyn(),
            vec![AxisSpec::named("row").into(), AxisSpec::named("col").into()],
        )
        .unwrap()
    }

    // ========================================================================
    // Reductions
    // ========================================================================

    #[test]
    fn test_reduce_over_named_axis() {
        let a = grid();
        let m = a.max(Some("row".into())).unwrap().into_array().unwrap();
        assert_eq!(m.dtype(), DType::I32);
        assert_eq!(m.to_buffer().unwrap().to_f64_vec().unwrap(), vec![4.0, 5.0, 6.0]);
        assert_eq!(m.info().len(), 2);
        assert_eq!(m.axis_name(0).to_string(), "col");

        let mean = a.mean(Some(1usize.into())).unwrap().into_array().unwrap();
        assert_eq!(mean.dtype(), DType::F64);
        assert_eq!(mean.to_buffer().unwrap().to_f64_vec().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_reduce_everything() {
        let a = grid();
        assert_eq!(a.min(None).unwrap().as_scalar(), Some(&Value::Int(1)));
        assert_eq!(a.mean(None).unwrap().as_scalar(), Some(&Value::Float(3.5)));
    }

    #[test]
    fn test_reductions_propagate_nan() {
        let a = MetaArray::from(Buffer::from_elements(vec![1.0, f64::NAN, -1.0]));
        let min = a.min(None).unwrap();
        assert!(min.as_scalar().and_then(Value::as_float).unwrap().is_nan());
    }

    #[test]
    fn test_empty_reduction_fails() {
        let a = MetaArray::from(Buffer::zeros(DType::F64, &[0, 3]));
        assert!(matches!(a.mean(Some(0usize.into())), Err(Error::EmptyReduction)));
        assert!(matches!(a.max(None), Err(Error::EmptyReduction)));
        assert!(a.mean(Some(1usize.into())).is_ok());
    }

    // ========================================================================
    // Binary operators
    // ========================================================================

    #[test]
    fn test_same_dtype_arithmetic_keeps_dtype() {
        let a = grid();
        let b = a.add(&a).unwrap();
        assert_eq!(b.dtype(), DType::I32);
        assert_eq!(b.info(), a.info());
        assert_eq!(b.to_buffer().unwrap().to_f64_vec().unwrap()[1], 10.0);
    }

    #[test]
    fn test_integer_arithmetic_wraps() {
        let a = MetaArray::from(Buffer::from_elements(vec![250u8]));
        let b = Buffer::from_elements(vec![10u8]);
        assert_eq!(
            a.add(&b).unwrap().to_buffer().unwrap(),
            Buffer::from_elements(vec![4u8])
        );
    }

    #[test]
    fn test_scalars_and_division_produce_float() {
        let a = grid();
        let half = a.div(2.0).unwrap();
        assert_eq!(half.dtype(), DType::F64);
        assert_eq!(half.to_buffer().unwrap().to_f64_vec().unwrap()[0], 0.5);
        assert_eq!(a.mul(1.0).unwrap().dtype(), DType::F64);
        assert_eq!(a.div(&a).unwrap().dtype(), DType::F64);
    }

    #[test]
    fn test_rows_broadcast() {
        let a = grid();
        let row = Buffer::from_elements(vec![1i32, 1, 1]);
        let out = a.sub(&row).unwrap();
        assert_eq!(
            out.to_buffer().unwrap().to_f64_vec().unwrap(),
            vec![0.0, 4.0, 2.0, 3.0, 1.0, 5.0]
        );
        let bad = Buffer::from_elements(vec![1i32, 1]);
        assert!(matches!(a.sub(&bad), Err(Error::ShapeMismatch(_))));
        let bigger = Buffer::zeros(DType::I32, &[3, 2, 3]);
        assert!(matches!(a.add(&bigger), Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_comparisons_produce_bool() {
        let a = grid();
        let gt = a.gt(3.0).unwrap();
        assert_eq!(gt.dtype(), DType::Bool);
        assert_eq!(
            gt.to_buffer().unwrap(),
            Buffer::from(array![[false, true, false], [true, false, true]].into_dyn())
        );
        assert_eq!(a.eq(&a).unwrap().to_buffer().unwrap().to_values()[0], Value::Bool(true));
    }

    #[test]
    fn test_object_arrays_only_compare_for_equality() {
        let a = MetaArray::from(Buffer::from_elements(vec![Value::from("x"), Value::Int(1)]));
        let b = Buffer::from_elements(vec![Value::from("x"), Value::Int(2)]);
        assert_eq!(
            a.ne(&b).unwrap().to_buffer().unwrap(),
            Buffer::from_elements(vec![false, true])
        );
        assert!(matches!(a.add(&b), Err(Error::UnsupportedDType(DType::Object))));
    }

    // ========================================================================
    // Transpose
    // ========================================================================

    #[test]
    fn test_transpose_moves_info() {
        let a = grid();
        let t = a.transpose(&[1, 0]).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.axis_index("row").unwrap(), 1);
        assert_eq!(t.info().len(), 3);
        assert_eq!(
            t.to_buffer().unwrap().to_f64_vec().unwrap(),
            vec![1.0, 4.0, 5.0, 2.0, 3.0, 6.0]
        );
        assert!(a.transpose(&[0, 0]).is_err());
        assert!(a.transpose(&[0]).is_err());
    }
}
