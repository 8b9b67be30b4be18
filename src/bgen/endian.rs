//! Little-endian wire primitives. Every multi-byte integer in the bgen
//! format is little-endian on disk regardless of host.

use std::io::{Read, Write};

use crate::error::{BgenError, Result};

macro_rules! le_int {
    ($read:ident, $write:ident, $ty:ty) => {
        pub fn $read<R: Read>(reader: &mut R) -> Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            reader
                .read_exact(&mut buf)
                .map_err(|source| BgenError::TruncatedInput {
                    what: stringify!($ty),
                    source,
                })?;
            Ok(<$ty>::from_le_bytes(buf))
        }

        pub fn $write<W: Write>(writer: &mut W, value: $ty) -> Result<()> {
            writer
                .write_all(&value.to_le_bytes())
                .map_err(|source| BgenError::WriteFailed {
                    what: stringify!($ty),
                    source,
                })
        }
    };
}

le_int!(read_u8, write_u8, u8);
le_int!(read_u16, write_u16, u16);
le_int!(read_u32, write_u32, u32);
le_int!(read_u64, write_u64, u64);
le_int!(read_i32, write_i32, i32);
le_int!(read_i64, write_i64, i64);

pub fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], what: &'static str) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|source| BgenError::TruncatedInput { what, source })
}

pub fn write_all<W: Write>(writer: &mut W, bytes: &[u8], what: &'static str) -> Result<()> {
    writer
        .write_all(bytes)
        .map_err(|source| BgenError::WriteFailed { what, source })
}

/// Reads a string prefixed by a `u16` byte count.
pub fn read_string_u16<R: Read>(reader: &mut R, what: &'static str) -> Result<String> {
    let len = read_u16(reader)? as usize;
    read_string(reader, len, what)
}

/// Reads a string prefixed by a `u32` byte count (allele strings).
pub fn read_string_u32<R: Read>(reader: &mut R, what: &'static str) -> Result<String> {
    let len = read_u32(reader)? as usize;
    read_string(reader, len, what)
}

fn read_string<R: Read>(reader: &mut R, len: usize, what: &'static str) -> Result<String> {
    let mut buf = vec![0u8; len];
    read_exact(reader, &mut buf, what)?;
    String::from_utf8(buf)
        .map_err(|e| BgenError::InvalidVariantRecord(format!("{what} is not valid UTF-8: {e}")))
}

pub fn write_string_u16<W: Write>(writer: &mut W, s: &str, what: &'static str) -> Result<()> {
    write_u16(writer, s.len() as u16)?;
    write_all(writer, s.as_bytes(), what)
}

pub fn write_string_u32<W: Write>(writer: &mut W, s: &str, what: &'static str) -> Result<()> {
    write_u32(writer, s.len() as u32)?;
    write_all(writer, s.as_bytes(), what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn integer_round_trips() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 0xfe).unwrap();
        write_u16(&mut buf, 0xbeef).unwrap();
        write_u32(&mut buf, 0xdead_beef).unwrap();
        write_u64(&mut buf, 0x0123_4567_89ab_cdef).unwrap();
        write_i32(&mut buf, -42).unwrap();
        write_i64(&mut buf, i64::MIN + 1).unwrap();

        let mut cursor = Cursor::new(buf);
        assert_eq!(read_u8(&mut cursor).unwrap(), 0xfe);
        assert_eq!(read_u16(&mut cursor).unwrap(), 0xbeef);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xdead_beef);
        assert_eq!(read_u64(&mut cursor).unwrap(), 0x0123_4567_89ab_cdef);
        assert_eq!(read_i32(&mut cursor).unwrap(), -42);
        assert_eq!(read_i64(&mut cursor).unwrap(), i64::MIN + 1);
    }

    #[test]
    fn strings_round_trip() {
        let mut buf = Vec::new();
        write_string_u16(&mut buf, "rs123", "rsid").unwrap();
        write_string_u32(&mut buf, "ACGT", "allele").unwrap();
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_string_u16(&mut cursor, "rsid").unwrap(), "rs123");
        assert_eq!(read_string_u32(&mut cursor, "allele").unwrap(), "ACGT");
    }

    #[test]
    fn short_read_is_truncated_input() {
        let mut cursor = Cursor::new(vec![0u8; 3]);
        let err = read_u32(&mut cursor).unwrap_err();
        assert!(matches!(err, BgenError::TruncatedInput { .. }));
    }
}
