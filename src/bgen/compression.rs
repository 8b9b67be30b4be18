//! Compression of per-variant probability payloads. The decompressed size
//! is always known from a preceding field, so both directions verify the
//! exact length.

use std::io::Read;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{BgenError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Zstd,
}

impl Compression {
    /// Decodes bits 0-1 of the header flags word.
    pub fn from_flags(flags: u32) -> Result<Self> {
        match flags & 0x3 {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zlib),
            2 => Ok(Compression::Zstd),
            other => Err(BgenError::UnsupportedCompression(other)),
        }
    }

    pub fn to_flag_bits(self) -> u32 {
        match self {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Zstd => 2,
        }
    }
}

pub fn compress(data: &[u8], kind: Compression, level: u32) -> Result<Vec<u8>> {
    match kind {
        Compression::None => Ok(data.to_vec()),
        Compression::Zlib => {
            use std::io::Write;
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .and_then(|_| encoder.finish())
                .map_err(|source| BgenError::WriteFailed {
                    what: "zlib stream",
                    source,
                })
        }
        Compression::Zstd => {
            zstd::bulk::compress(data, level as i32).map_err(|source| BgenError::WriteFailed {
                what: "zstd stream",
                source,
            })
        }
    }
}

pub fn decompress(data: &[u8], kind: Compression, expected_size: usize) -> Result<Vec<u8>> {
    let out = match kind {
        Compression::None => data.to_vec(),
        Compression::Zlib => {
            let mut out = Vec::with_capacity(expected_size);
            ZlibDecoder::new(data).read_to_end(&mut out).map_err(|source| {
                BgenError::TruncatedInput {
                    what: "zlib stream",
                    source,
                }
            })?;
            out
        }
        Compression::Zstd => {
            zstd::bulk::decompress(data, expected_size).map_err(|source| {
                BgenError::TruncatedInput {
                    what: "zstd stream",
                    source,
                }
            })?
        }
    };
    if out.len() != expected_size {
        return Err(BgenError::CompressionMismatch {
            expected: expected_size,
            actual: out.len(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zlib_round_trip() {
        let data: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let packed = compress(&data, Compression::Zlib, 6).unwrap();
        assert!(packed.len() < data.len());
        let unpacked = decompress(&packed, Compression::Zlib, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn zstd_round_trip() {
        let data = vec![7u8; 1000];
        let packed = compress(&data, Compression::Zstd, 3).unwrap();
        let unpacked = decompress(&packed, Compression::Zstd, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn size_mismatch_is_detected() {
        let packed = compress(b"hello world", Compression::Zlib, 6).unwrap();
        let err = decompress(&packed, Compression::Zlib, 5).unwrap_err();
        assert!(matches!(err, BgenError::CompressionMismatch { .. }));
    }

    #[test]
    fn flag_bits_round_trip() {
        for kind in [Compression::None, Compression::Zlib, Compression::Zstd] {
            assert_eq!(Compression::from_flags(kind.to_flag_bits()).unwrap(), kind);
        }
        assert!(Compression::from_flags(3).is_err());
    }
}
