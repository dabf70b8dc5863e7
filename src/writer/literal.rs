//! Textual literal encoding, the inverse of [`crate::parser::parse_literal`]

use crate::types::{Buffer, Value};
use std::fmt::Write;

/// Render a value as a header literal
pub fn to_literal(value: &Value) -> String {
    let mut out = String::new();
    write_literal(&mut out, value);
    out
}

fn write_literal(out: &mut String, value: &Value) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Float(f) => write_float(out, *f),
        Value::Str(s) => write_string(out, s),
        Value::Tuple(items) => {
            out.push('(');
            write_items(out, items);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::List(items) => {
            out.push('[');
            write_items(out, items);
            out.push(']');
        }
        Value::Dict(entries) => {
            out.push('{');
            for (i, (key, v)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_literal(out, v);
            }
            out.push('}');
        }
        Value::Array(buffer) => write_array(out, buffer),
    }
}

fn write_items(out: &mut String, items: &[Value]) {
    for (i, v) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_literal(out, v);
    }
}

fn write_float(out: &mut String, f: f64) {
    if f.is_nan() {
        out.push_str("nan");
    } else if f.is_infinite() {
        out.push_str(if f > 0.0 { "inf" } else { "-inf" });
    } else {
        // Debug keeps a decimal point or exponent, so the text reads back as a float
        let _ = write!(out, "{f:?}");
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('\'');
}

fn write_array(out: &mut String, buffer: &Buffer) {
    let values = buffer.to_values();
    out.push_str("array(");
    if buffer.ndim() == 0 {
        out.push('[');
        write_items(out, &values);
        out.push(']');
    } else {
        write_nested(out, &values, buffer.shape());
    }
    let _ = write!(out, ", dtype='{}'", buffer.dtype());
    if buffer.ndim() != 1 && (buffer.ndim() == 0 || buffer.is_empty()) {
        let dims: Vec<Value> = buffer.shape().iter().map(|&d| Value::from(d)).collect();
        out.push_str(", shape=");
        write_literal(out, &Value::Tuple(dims));
    }
    out.push(')');
}

/// Row-major elements as nested lists following `shape`
fn write_nested(out: &mut String, values: &[Value], shape: &[usize]) {
    out.push('[');
    match shape {
        [] | [_] => write_items(out, values),
        [n, inner @ ..] => {
            let stride = inner.iter().product::<usize>();
            for i in 0..*n {
                if i > 0 {
                    out.push_str(", ");
                }
                let start = (i * stride).min(values.len());
                let end = (start + stride).min(values.len());
                write_nested(out, &values[start..end], inner);
            }
        }
    }
    out.push(']');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_scalars() {
        assert_eq!(to_literal(&Value::None), "None");
        assert_eq!(to_literal(&Value::Float(1.0)), "1.0");
        assert_eq!(to_literal(&Value::Float(f64::NAN)), "nan");
        assert_eq!(to_literal(&Value::from("it's")), r"'it\'s'");
    }

    #[test]
    fn test_single_tuple_keeps_comma() {
        assert_eq!(to_literal(&Value::Tuple(vec![Value::Int(5)])), "(5,)");
        assert_eq!(to_literal(&Value::Tuple(vec![Value::Int(3), Value::Int(4)])), "(3, 4)");
    }

    #[test]
    fn test_dict_is_sorted() {
        let mut d = BTreeMap::new();
        d.insert("version".to_string(), Value::from("2"));
        d.insert("shape".to_string(), Value::Tuple(vec![Value::Int(3)]));
        assert_eq!(to_literal(&Value::Dict(d)), "{'shape': (3,), 'version': '2'}");
    }

    #[test]
    fn test_arrays() {
        let a = Buffer::from_vec(&[2, 2], vec![1i32, 2, 3, 4]).unwrap();
        assert_eq!(to_literal(&Value::Array(a)), "array([[1, 2], [3, 4]], dtype='int32')");
        let empty = Buffer::from_vec::<f64>(&[2, 0], vec![]).unwrap();
        assert_eq!(
            to_literal(&Value::Array(empty)),
            "array([[], []], dtype='float64', shape=(2, 0))"
        );
    }
}
