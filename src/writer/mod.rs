//! Encoders for header text and binary container structures

mod binary;
mod literal;

pub use binary::ByteWriter;
pub use literal::to_literal;
