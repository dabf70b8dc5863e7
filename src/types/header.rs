//! File identification constants

/// Magic bytes identifying a hierarchical container file
pub const MAGIC: &[u8; 8] = b"\x89MTA\r\n\x1a\n";

/// Format version written by this crate (both formats)
pub const FORMAT_VERSION: &str = "2";

/// Container header size in bytes (magic + tree offset)
pub const HEADER_SIZE: usize = 16;
