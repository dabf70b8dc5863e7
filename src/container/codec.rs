//! Chunk compression

use crate::error::{Error, Result};
use crate::io::Compression;
use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Codec {
    #[default]
    None,
    Gzip(u32),
    Zstd(i32),
}

impl Codec {
    pub fn tag(self) -> u8 {
        match self {
            Codec::None => 0,
            Codec::Gzip(_) => 1,
            Codec::Zstd(_) => 2,
        }
    }

    pub fn level(self) -> i64 {
        match self {
            Codec::None => 0,
            Codec::Gzip(l) => l as i64,
            Codec::Zstd(l) => l as i64,
        }
    }

    pub fn from_tag(tag: u8, level: i64) -> Option<Self> {
        match tag {
            0 => Some(Codec::None),
            1 => u32::try_from(level).ok().filter(|l| *l <= 9).map(Codec::Gzip),
            2 => i32::try_from(level).ok().map(Codec::Zstd),
            _ => None,
        }
    }

    /// Codec for a write request, checking the build supports it
    pub fn for_compression(compression: Option<Compression>) -> Result<Self> {
        match compression {
            None => Ok(Codec::None),
            Some(Compression::Gzip(level)) => Ok(Codec::Gzip(level)),
            Some(Compression::Zstd(level)) => {
                if cfg!(feature = "zstd") {
                    Ok(Codec::Zstd(level))
                } else {
                    Err(Error::BackendUnavailable("zstd compression"))
                }
            }
        }
    }

    pub fn compress(self, raw: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::None => Ok(raw.to_vec()),
            Codec::Gzip(level) => {
                let mut enc = GzEncoder::new(Vec::new(), GzLevel::new(level));
                enc.write_all(raw)?;
                Ok(enc.finish()?)
            }
            Codec::Zstd(level) => zstd_compress(raw, level),
        }
    }

    pub fn decompress(self, stored: &[u8]) -> Result<Vec<u8>> {
        match self {
            Codec::None => Ok(stored.to_vec()),
            Codec::Gzip(_) => {
                let mut out = Vec::new();
                GzDecoder::new(stored).read_to_end(&mut out)?;
                Ok(out)
            }
            Codec::Zstd(_) => zstd_decompress(stored),
        }
    }
}

#[cfg(feature = "zstd")]
fn zstd_compress(raw: &[u8], level: i32) -> Result<Vec<u8>> {
    Ok(zstd::stream::encode_all(raw, level)?)
}

#[cfg(feature = "zstd")]
fn zstd_decompress(stored: &[u8]) -> Result<Vec<u8>> {
    Ok(zstd::stream::decode_all(stored)?)
}

#[cfg(not(feature = "zstd"))]
fn zstd_compress(_raw: &[u8], _level: i32) -> Result<Vec<u8>> {
    Err(Error::BackendUnavailable("zstd compression"))
}

#[cfg(not(feature = "zstd"))]
fn zstd_decompress(_stored: &[u8]) -> Result<Vec<u8>> {
    Err(Error::BackendUnavailable("zstd compression"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> Vec<u8> {
        (0..4096u32).flat_map(|v| (v % 17).to_le_bytes()).collect()
    }

    #[test]
    fn test_gzip() {
        let raw = payload();
        let packed = Codec::Gzip(6).compress(&raw).unwrap();
        assert!(packed.len() < raw.len());
        assert_eq!(Codec::Gzip(6).decompress(&packed).unwrap(), raw);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd() {
        let raw = payload();
        let packed = Codec::Zstd(3).compress(&raw).unwrap();
        assert!(packed.len() < raw.len());
        assert_eq!(Codec::Zstd(3).decompress(&packed).unwrap(), raw);
    }

    #[test]
    fn test_tags() {
        for codec in [Codec::None, Codec::Gzip(9), Codec::Zstd(-1)] {
            assert_eq!(Codec::from_tag(codec.tag(), codec.level()), Some(codec));
        }
        assert_eq!(Codec::from_tag(1, 12), None);
        assert_eq!(Codec::from_tag(9, 0), None);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        assert!(Codec::Gzip(4).decompress(b"not gzip at all").is_err());
    }
}
