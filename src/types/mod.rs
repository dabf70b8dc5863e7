//! Core types for metarray

mod axis;
mod buffer;
mod dtype;
mod element;
mod header;
mod value;

pub use axis::{AxisInfo, AxisRef, AxisSpec, ColumnSpec, Name, axis_index, column_index};
pub use buffer::Buffer;
pub(crate) use buffer::dispatch_plain;
pub use dtype::DType;
pub use element::{ArithOp, Element, Plain};
pub use header::{FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use value::Value;
