//! Byte cursor for binary container structures

use crate::error::{Error, Result};

/// Forward-only reader over a byte slice
///
/// Positions in errors are reported relative to `base`, the file offset of
/// the first byte.
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], base: u64) -> Self {
        Self {
            data,
            position: 0,
            base,
        }
    }

    pub fn offset(&self) -> u64 {
        self.base + self.position as u64
    }

    pub fn eos(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Take exactly `count` bytes as a zero-copy slice
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.data.len() - self.position {
            return Err(Error::corrupt("unexpected end of data", self.offset()));
        }
        let slice = &self.data[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64_le(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn i64_le(&mut self) -> Result<i64> {
        Ok(self.u64_le()? as i64)
    }

    pub fn f64_le(&mut self) -> Result<f64> {
        Ok(f64::from_bits(self.u64_le()?))
    }

    /// u32 length-prefixed UTF-8 string
    pub fn string(&mut self) -> Result<&'a str> {
        let len = self.u32_le()? as usize;
        self.utf8(len)
    }

    /// u16 length-prefixed UTF-8 string (for names)
    pub fn key(&mut self) -> Result<&'a str> {
        let len = self.u16_le()? as usize;
        self.utf8(len)
    }

    fn utf8(&mut self, len: usize) -> Result<&'a str> {
        let start = self.offset();
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes).map_err(|_| Error::corrupt("invalid UTF-8 in string", start))
    }
}
