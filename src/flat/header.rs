//! Flat-format header block

use crate::error::{Error, Result};
use crate::parser::parse_literal;
use crate::types::{DType, Value};
use crate::writer::to_literal;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Marker for an axis whose values travel in frame records
pub(crate) const DYNAMIC: &str = "dynamic";

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Header {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Raw info entries, `values_len`/`values_type` still present
    pub info: Vec<Value>,
    pub version: String,
}

impl Header {
    pub fn decode(text: &str) -> Result<Self> {
        let value = parse_literal(text)?;
        let map = value
            .as_dict()
            .ok_or_else(|| Error::malformed("header is not a mapping", 0))?;
        let field = |key: &'static str| {
            map.get(key)
                .ok_or_else(|| Error::malformed(format!("header has no '{key}' entry"), 0))
        };

        let shape = field("shape")?
            .as_seq()
            .and_then(|dims| {
                dims.iter()
                    .map(|d| d.as_int().and_then(|i| usize::try_from(i).ok()))
                    .collect::<Option<Vec<_>>>()
            })
            .ok_or_else(|| Error::malformed("'shape' must be a tuple of non-negative integers", 0))?;

        let type_name = field("type")?
            .as_str()
            .ok_or_else(|| Error::malformed("'type' must be a string", 0))?;
        let dtype = DType::from_name(type_name)
            .ok_or_else(|| Error::malformed(format!("unknown element type '{type_name}'"), 0))?;

        let info = field("info")?
            .as_seq()
            .ok_or_else(|| Error::malformed("'info' must be a list", 0))?
            .to_vec();

        let version = match map.get("version") {
            None => "1".to_string(),
            Some(Value::Str(v)) => v.clone(),
            Some(Value::Int(v)) => v.to_string(),
            Some(_) => return Err(Error::malformed("'version' must be a string", 0)),
        };
        if version != "1" && version != "2" {
            return Err(Error::UnsupportedVersion(version));
        }
        if version == "1" && dtype == DType::Object {
            return Err(Error::malformed("object arrays require format version 2", 0));
        }

        Ok(Self {
            shape,
            dtype,
            info,
            version,
        })
    }

    pub fn encode(&self) -> String {
        let mut map = BTreeMap::new();
        map.insert(
            "shape".to_string(),
            Value::Tuple(self.shape.iter().map(|&d| Value::from(d)).collect()),
        );
        map.insert("type".to_string(), Value::from(self.dtype.name()));
        map.insert("info".to_string(), Value::List(self.info.clone()));
        map.insert("version".to_string(), Value::from(self.version.as_str()));
        to_literal(&Value::Dict(map))
    }

    /// Index of the info entry marked dynamic
    pub fn dynamic_axis(&self) -> Result<Option<usize>> {
        let mut found = None;
        for (i, entry) in self.info.iter().enumerate() {
            if entry.get("values_len").and_then(Value::as_str) == Some(DYNAMIC) {
                if found.is_some() {
                    return Err(Error::MultipleDynamicAxes);
                }
                if self.version == "1" {
                    return Err(Error::malformed("dynamic axes require format version 2", 0));
                }
                found = Some(i);
            }
        }
        Ok(found)
    }
}

/// Read stripped lines up to the first blank one and join them
///
/// Returns the text and the number of bytes consumed.
pub(crate) fn read_block<R: BufRead>(reader: &mut R) -> Result<(String, u64)> {
    let mut text = String::new();
    let mut consumed = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        consumed += n as u64;
        let stripped = std::str::from_utf8(&line)
            .map_err(|_| Error::malformed("header is not valid UTF-8", text.len()))?
            .trim();
        if stripped.is_empty() {
            break;
        }
        text.push_str(stripped);
    }
    Ok((text, consumed))
}

/// Next non-blank line, `None` at end of input
pub(crate) fn read_record<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(None);
        }
        let text = std::str::from_utf8(&line)
            .map_err(|_| Error::malformed("frame record is not valid UTF-8", 0))?
            .trim();
        if !text.is_empty() {
            return Ok(Some(text.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_block_stops_at_blank_line() {
        let mut input = Cursor::new(b"{'a':\n  1}\n\nBINARY".to_vec());
        let (text, consumed) = read_block(&mut input).unwrap();
        assert_eq!(text, "{'a':1}");
        assert_eq!(consumed, 12);
    }

    #[test]
    fn test_decode_defaults_to_version_1() {
        let header = Header::decode("{'shape': (2, 3), 'type': 'int16', 'info': [{}, {}, {}]}").unwrap();
        assert_eq!(header.version, "1");
        assert_eq!(header.shape, vec![2, 3]);
        assert_eq!(header.dtype, DType::I16);
    }

    #[test]
    fn test_encode_decode() {
        let header = Header {
            shape: vec![4],
            dtype: DType::F32,
            info: vec![Value::Dict(BTreeMap::new()), Value::Dict(BTreeMap::new())],
            version: "2".into(),
        };
        assert_eq!(Header::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Header::decode("[1, 2]"),
            Err(Error::MalformedHeader { .. })
        ));
        assert!(matches!(
            Header::decode("{'shape': (2,), 'info': []}"),
            Err(Error::MalformedHeader { .. })
        ));
        assert!(matches!(
            Header::decode("{'shape': (2,), 'type': 'float64', 'info': [], 'version': '7'}"),
            Err(Error::UnsupportedVersion(v)) if v == "7"
        ));
    }

    #[test]
    fn test_multiple_dynamic_axes() {
        let header = Header::decode(
            "{'shape': (1, 1), 'type': 'float64', 'version': '2', \
             'info': [{'values_len': 'dynamic'}, {'values_len': 'dynamic'}, {}]}",
        )
        .unwrap();
        assert!(matches!(header.dynamic_axis(), Err(Error::MultipleDynamicAxes)));
    }
}
