//! Little-endian byte encoding for binary container structures

use crate::error::{Error, Result};

/// Growable output buffer, the counterpart of [`crate::parser::ByteCursor`]
#[derive(Debug, Default)]
pub struct ByteWriter {
    bytes: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn u16_le(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32_le(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64_le(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i64_le(&mut self, v: i64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64_le(&mut self, v: f64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// u32 length-prefixed string
    pub fn string(&mut self, s: &str) -> Result<()> {
        let len = u32::try_from(s.len())
            .map_err(|_| Error::InvalidOptions("string longer than 4 GiB".into()))?;
        self.u32_le(len);
        self.raw(s.as_bytes());
        Ok(())
    }

    /// u16 length-prefixed name; names may not contain '/'
    pub fn key(&mut self, key: &str) -> Result<()> {
        if key.contains('/') {
            return Err(Error::InvalidOptions(format!("key contains '/': {key:?}").into()));
        }
        let len = u16::try_from(key.len())
            .map_err(|_| Error::InvalidOptions(format!("key too long: {} bytes", key.len()).into()))?;
        self.u16_le(len);
        self.raw(key.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ByteCursor;

    #[test]
    fn test_reads_back_through_cursor() {
        let mut w = ByteWriter::new();
        w.u8(7);
        w.u32_le(0xDEADBEEF);
        w.f64_le(-1.25);
        w.key("info").unwrap();
        w.string("payload").unwrap();
        let bytes = w.into_bytes();

        let mut c = ByteCursor::new(&bytes, 0);
        assert_eq!(c.u8().unwrap(), 7);
        assert_eq!(c.u32_le().unwrap(), 0xDEADBEEF);
        assert_eq!(c.f64_le().unwrap(), -1.25);
        assert_eq!(c.key().unwrap(), "info");
        assert_eq!(c.string().unwrap(), "payload");
        assert!(c.eos());
    }

    #[test]
    fn test_key_with_slash_rejected() {
        let mut w = ByteWriter::new();
        let err = w.key("invalid/key").unwrap_err();
        assert!(err.to_string().contains('/'));
    }
}
