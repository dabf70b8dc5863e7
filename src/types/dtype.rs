//! Element data types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a buffer
///
/// Tags are used by the hierarchical container; names follow the numpy
/// spelling used in flat-format headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DType {
    U8 = 0x01,
    I8 = 0x02,
    U16 = 0x03,
    I16 = 0x04,
    U32 = 0x05,
    I32 = 0x06,
    U64 = 0x07,
    I64 = 0x08,
    F32 = 0x09,
    F64 = 0x0A,
    Bool = 0x0B,
    Object = 0x0C,
}

impl DType {
    /// Size in bytes of a single element, `None` for `Object`
    pub fn element_size(self) -> Option<usize> {
        match self {
            DType::U8 | DType::I8 | DType::Bool => Some(1),
            DType::U16 | DType::I16 => Some(2),
            DType::U32 | DType::I32 | DType::F32 => Some(4),
            DType::U64 | DType::I64 | DType::F64 => Some(8),
            DType::Object => None,
        }
    }

    /// Whether elements have a fixed-width byte encoding
    pub fn is_plain(self) -> bool {
        self != DType::Object
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Try to convert from u8 tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(DType::U8),
            0x02 => Some(DType::I8),
            0x03 => Some(DType::U16),
            0x04 => Some(DType::I16),
            0x05 => Some(DType::U32),
            0x06 => Some(DType::I32),
            0x07 => Some(DType::U64),
            0x08 => Some(DType::I64),
            0x09 => Some(DType::F32),
            0x0A => Some(DType::F64),
            0x0B => Some(DType::Bool),
            0x0C => Some(DType::Object),
            _ => None,
        }
    }

    /// Header name of the type
    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "uint8",
            DType::I8 => "int8",
            DType::U16 => "uint16",
            DType::I16 => "int16",
            DType::U32 => "uint32",
            DType::I32 => "int32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::Bool => "bool",
            DType::Object => "object",
        }
    }

    /// Parse a header type name
    ///
    /// Accepts the numpy names and the little-endian type codes
    /// (`<f8`, `|u1`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        let dtype = match name {
            "uint8" | "|u1" | "<u1" | "u1" => DType::U8,
            "int8" | "|i1" | "<i1" | "i1" => DType::I8,
            "uint16" | "<u2" | "u2" => DType::U16,
            "int16" | "<i2" | "i2" => DType::I16,
            "uint32" | "<u4" | "u4" => DType::U32,
            "int32" | "<i4" | "i4" => DType::I32,
            "uint64" | "<u8" | "u8" => DType::U64,
            "int64" | "<i8" | "i8" => DType::I64,
            "float32" | "<f4" | "f4" => DType::F32,
            "float64" | "<f8" | "f8" => DType::F64,
            "bool" | "|b1" | "b1" => DType::Bool,
            "object" | "|O" | "O" => DType::Object,
            _ => return None,
        };
        Some(dtype)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
