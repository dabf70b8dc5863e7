//! Rust element types that can live in a [`Buffer`]

use super::{Buffer, DType, Value};
use ndarray::ArrayD;
use std::fmt::Debug;

/// Trait for types that can be stored in a buffer
pub trait Element: Sized + Clone + Default + PartialEq + Debug + 'static {
    const DTYPE: DType;

    fn into_buffer(array: ArrayD<Self>) -> Buffer;

    fn from_buffer(buffer: &Buffer) -> Option<&ArrayD<Self>>;

    fn from_buffer_mut(buffer: &mut Buffer) -> Option<&mut ArrayD<Self>>;

    fn to_value(&self) -> Value;
}

/// Arithmetic operators applied elementwise
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

/// Fixed-width element with a little-endian byte encoding
pub trait Plain: Element + Copy + PartialOrd {
    fn write_le(self, out: &mut Vec<u8>);

    /// `bytes` holds exactly one encoded element
    fn read_le(bytes: &[u8]) -> Self;

    fn to_f64(self) -> f64;

    /// Integers wrap on overflow
    fn arith(op: ArithOp, a: Self, b: Self) -> Self;

    /// Smaller of two elements, NaN propagating
    fn lesser(a: Self, b: Self) -> Self {
        if b < a { b } else { a }
    }

    /// Larger of two elements, NaN propagating
    fn greater(a: Self, b: Self) -> Self {
        if b > a { b } else { a }
    }
}

macro_rules! element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn into_buffer(array: ArrayD<Self>) -> Buffer {
                Buffer::$variant(array)
            }

            fn from_buffer(buffer: &Buffer) -> Option<&ArrayD<Self>> {
                match buffer {
                    Buffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn from_buffer_mut(buffer: &mut Buffer) -> Option<&mut ArrayD<Self>> {
                match buffer {
                    Buffer::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn to_value(&self) -> Value {
                Value::from(*self)
            }
        }
    };
}

macro_rules! plain_int {
    ($t:ty, $variant:ident) => {
        element!($t, $variant);

        impl Plain for $t {
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn arith(op: ArithOp, a: Self, b: Self) -> Self {
                match op {
                    ArithOp::Add => a.wrapping_add(b),
                    ArithOp::Sub => a.wrapping_sub(b),
                    ArithOp::Mul => a.wrapping_mul(b),
                }
            }
        }
    };
}

macro_rules! plain_float {
    ($t:ty, $variant:ident) => {
        element!($t, $variant);

        impl Plain for $t {
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(bytes);
                <$t>::from_le_bytes(raw)
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn arith(op: ArithOp, a: Self, b: Self) -> Self {
                match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                }
            }

            fn lesser(a: Self, b: Self) -> Self {
                if a.is_nan() || b.is_nan() {
                    <$t>::NAN
                } else {
                    a.min(b)
                }
            }

            fn greater(a: Self, b: Self) -> Self {
                if a.is_nan() || b.is_nan() {
                    <$t>::NAN
                } else {
                    a.max(b)
                }
            }
        }
    };
}

plain_int!(u8, U8);
plain_int!(i8, I8);
plain_int!(u16, U16);
plain_int!(i16, I16);
plain_int!(u32, U32);
plain_int!(i32, I32);
plain_int!(u64, U64);
plain_int!(i64, I64);
plain_float!(f32, F32);
plain_float!(f64, F64);

element!(bool, Bool);

impl Plain for bool {
    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }

    fn to_f64(self) -> f64 {
        if self { 1.0 } else { 0.0 }
    }

    fn arith(op: ArithOp, a: Self, b: Self) -> Self {
        match op {
            ArithOp::Add => a | b,
            ArithOp::Sub => a ^ b,
            ArithOp::Mul => a & b,
        }
    }
}

impl Element for Value {
    const DTYPE: DType = DType::Object;

    fn into_buffer(array: ArrayD<Self>) -> Buffer {
        Buffer::Object(array)
    }

    fn from_buffer(buffer: &Buffer) -> Option<&ArrayD<Self>> {
        match buffer {
            Buffer::Object(a) => Some(a),
            _ => None,
        }
    }

    fn from_buffer_mut(buffer: &mut Buffer) -> Option<&mut ArrayD<Self>> {
        match buffer {
            Buffer::Object(a) => Some(a),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_le_roundtrip() {
        let mut out = Vec::new();
        (-2i16).write_le(&mut out);
        1.5f32.write_le(&mut out);
        true.write_le(&mut out);
        assert_eq!(out.len(), 7);
        assert_eq!(i16::read_le(&out[0..2]), -2);
        assert_eq!(f32::read_le(&out[2..6]), 1.5);
        assert!(bool::read_le(&out[6..7]));
    }

    #[test]
    fn test_integer_arith_wraps() {
        assert_eq!(u8::arith(ArithOp::Add, 250, 10), 4);
        assert_eq!(i8::arith(ArithOp::Sub, -128, 1), 127);
    }

    #[test]
    fn test_float_extrema_propagate_nan() {
        assert!(f64::lesser(1.0, f64::NAN).is_nan());
        assert!(f64::greater(f64::NAN, 1.0).is_nan());
        assert_eq!(f64::lesser(1.0, -2.0), -2.0);
        assert_eq!(i32::greater(3, 7), 7);
    }
}
