//! Decoders for header text and binary container structures
//!
//! Header literals are decoded by a strict grammar; binary structures are
//! read through a zero-copy [`ByteCursor`].

mod cursor;
mod literal;

pub use cursor::ByteCursor;
pub use literal::parse_literal;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Buffer, Value};
    use crate::writer::to_literal;
    use std::collections::BTreeMap;

    fn roundtrip(value: &Value) -> Value {
        parse_literal(&to_literal(value)).unwrap()
    }

    #[test]
    fn test_roundtrip_scalars() {
        for v in [
            Value::None,
            Value::Bool(true),
            Value::Int(i64::MIN),
            Value::Float(0.1),
            Value::Float(1e-300),
            Value::Float(-0.0),
            Value::Float(f64::INFINITY),
            Value::from("tab\there 'quoted' \\ back"),
        ] {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn test_roundtrip_nested() {
        let mut inner = BTreeMap::new();
        inner.insert("name".to_string(), Value::Tuple(vec![Value::from("a"), Value::Int(1)]));
        inner.insert("single".to_string(), Value::Tuple(vec![Value::Float(2.0)]));
        inner.insert(
            "array".to_string(),
            Value::Array(Buffer::from_vec(&[2, 2], vec![1u16, 2, 3, 4]).unwrap()),
        );
        inner.insert(
            "empty".to_string(),
            Value::Array(Buffer::from_vec::<f32>(&[0, 3], vec![]).unwrap()),
        );
        let value = Value::List(vec![Value::Dict(inner), Value::Tuple(vec![]), Value::List(vec![])]);
        assert_eq!(roundtrip(&value), value);
    }
}
