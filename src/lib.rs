//! metarray - Labeled N-dimensional arrays with per-axis metadata
//!
//! A [`MetaArray`] is an N-dimensional array where every axis may carry a
//! name, units, one value per position (e.g. time stamps) and per-position
//! columns, plus a trailing descriptor for the whole array. Arrays can be
//! indexed by position, by column name or by axis value, and stored in two
//! formats.
//!
//! # Features
//!
//! - Orthogonal indexing that keeps axis metadata in step with the data
//! - Flat single-file format with frame-by-frame appends
//! - Hierarchical container with chunked, compressed, growable datasets
//! - Memory-mapped reads of contiguous data
//! - Little-endian, portable across architectures
//!
//! # Example
//!
//! ```no_run
//! use metarray::{AxisSpec, Buffer, ColumnSpec, MetaArray, NamedSelector, Selector, WriteOptions};
//!
//! let trace = MetaArray::new(
//!     Buffer::from_vec(&[3, 2], vec![0.1f64, 1.0, 0.2, 2.0, 0.3, 3.0]).unwrap(),
//!     vec![
//!         AxisSpec::named("time")
//!             .with_units("s")
//!             .with_values(Buffer::from_elements(vec![0.0, 0.5, 1.0]))
//!             .into(),
//!         AxisSpec::named("signal")
//!             .with_cols([ColumnSpec::named("voltage"), ColumnSpec::named("current")])
//!             .into(),
//!     ],
//! )
//! .unwrap();
//!
//! // All voltages after t = 0.25 s
//! let late = trace
//!     .get_array(&[
//!         Selector::named("time", NamedSelector::Range(Some(0.25), None)),
//!         Selector::named("signal", NamedSelector::Column("voltage".into())),
//!     ])
//!     .unwrap();
//! assert_eq!(late.shape(), &[2]);
//!
//! trace.write("trace.ma", &WriteOptions::new()).unwrap();
//! let back = metarray::load("trace.ma").unwrap();
//! assert_eq!(back.info(), trace.info());
//! ```

pub mod array;
pub mod error;
pub mod index;
pub mod io;
pub mod mapped;
pub mod parser;
pub mod types;
pub mod writer;

mod csv_export;
mod flat;

#[cfg(feature = "hierarchical")]
mod container;
#[cfg(feature = "hierarchical")]
mod hierarchical;

// Re-export common types at crate root
pub use array::{BinaryOp, Item, MetaArray, Operand};
pub use error::{Error, Result};
pub use index::{AxisSelection, Entry, NamedSelector, Selector, Span, resolve};
pub use io::{Compression, Format, ReadOptions, WriteOptions, is_hierarchical, load, load_with};
pub use mapped::MappedArray;
pub use parser::parse_literal;
pub use types::{
    ArithOp, AxisInfo, AxisRef, AxisSpec, Buffer, ColumnSpec, DType, Element, FORMAT_VERSION, HEADER_SIZE, MAGIC,
    Name, Plain, Value,
};
pub use writer::to_literal;
