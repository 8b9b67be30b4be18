//! The fixed-size container header and its flags word.

use std::io::{Read, Write};

use crate::bgen::compression::Compression;
use crate::bgen::endian::{read_exact, read_u32, write_all, write_u32};
use crate::error::{BgenError, Result};

pub const MAGIC: [u8; 4] = *b"bgen";
/// Fixed part of the header block: four `u32` fields, magic, flags word.
pub const MIN_HEADER_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFlags {
    pub compression: Compression,
    pub layout_id: u8,
    pub sample_id_present: bool,
}

impl HeaderFlags {
    pub fn from_u32(flags: u32) -> Result<Self> {
        let compression = Compression::from_flags(flags)?;
        let layout_id = ((flags >> 2) & 0xf) as u8;
        if layout_id != 1 && layout_id != 2 {
            return Err(BgenError::UnsupportedLayout(layout_id));
        }
        Ok(HeaderFlags {
            compression,
            layout_id,
            sample_id_present: flags & (1 << 31) != 0,
        })
    }

    pub fn to_u32(self) -> u32 {
        let mut flags = self.compression.to_flag_bits();
        flags |= (self.layout_id as u32) << 2;
        if self.sample_id_present {
            flags |= 1 << 31;
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Byte count between the end of the leading offset field and the first
    /// variant block, i.e. header block plus sample-identifier block.
    pub start_data_offset: u32,
    pub variant_num: u32,
    pub sample_num: u32,
    pub free_data: Vec<u8>,
    pub header_flags: HeaderFlags,
}

impl Header {
    pub fn header_size(&self) -> u32 {
        MIN_HEADER_SIZE + self.free_data.len() as u32
    }

    /// Reads the leading offset field and the header block. Consumes
    /// `4 + header_size` bytes of the stream.
    pub fn read_header<R: Read>(reader: &mut R) -> Result<Header> {
        let start_data_offset = read_u32(reader)?;
        let header_size = read_u32(reader)?;
        if header_size < MIN_HEADER_SIZE {
            return Err(BgenError::InvalidVariantRecord(format!(
                "header size {header_size} is below the fixed minimum {MIN_HEADER_SIZE}"
            )));
        }
        let variant_num = read_u32(reader)?;
        let sample_num = read_u32(reader)?;
        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic, "header magic")?;
        if magic != MAGIC && magic != [0u8; 4] {
            return Err(BgenError::BadMagic(magic));
        }
        let mut free_data = vec![0u8; (header_size - MIN_HEADER_SIZE) as usize];
        read_exact(reader, &mut free_data, "header free data")?;
        let header_flags = HeaderFlags::from_u32(read_u32(reader)?)?;
        Ok(Header {
            start_data_offset,
            variant_num,
            sample_num,
            free_data,
            header_flags,
        })
    }

    /// Writes the leading offset field and the header block, returning the
    /// number of bytes written.
    pub fn write_header<W: Write>(&self, writer: &mut W) -> Result<usize> {
        write_u32(writer, self.start_data_offset)?;
        write_u32(writer, self.header_size())?;
        write_u32(writer, self.variant_num)?;
        write_u32(writer, self.sample_num)?;
        write_all(writer, &MAGIC, "header magic")?;
        write_all(writer, &self.free_data, "header free data")?;
        write_u32(writer, self.header_flags.to_u32())?;
        Ok(4 + self.header_size() as usize)
    }
}
