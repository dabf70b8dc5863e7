//! Flat single-file format
//!
//! A file is a header literal terminated by a blank line, followed by the
//! value blocks of every axis that has values (in axis order), followed by
//! the elements:
//!
//! ```text
//! {'info': [...], 'shape': (3, 2), 'type': 'float64', 'version': '2'}
//!
//! <values of axis 0><values of axis 1>...<elements>
//! ```
//!
//! An axis marked `values_len: 'dynamic'` instead grows by frames. Each frame
//! is a record line `{'len': N, 'numFrames': F, 'xVals': [...]}` followed by
//! `N` bytes of elements holding `F` positions along that axis.

mod header;
mod read;
mod write;

pub(crate) use read::read;
pub(crate) use write::write;
