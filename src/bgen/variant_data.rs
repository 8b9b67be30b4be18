//! Per-variant identifying records and the probability data block encoder.

use std::io::{Read, Write};

use crate::bgen::compression::{self, Compression};
use crate::bgen::endian::{
    read_string_u16, read_string_u32, read_u16, read_u32, write_all, write_string_u16,
    write_string_u32, write_u16, write_u32,
};
use crate::bgen::header::{Header, HeaderFlags};
use crate::bgen::probability::{stored_entry_count, BitWriter};
use crate::error::{BgenError, Result};

/// Probability data of one variant, with probabilities kept as the raw
/// fixed-point integers that go on disk (layout 2: the stored entries of
/// each sample back to back; layout 1: three values per sample scaled by
/// 32768).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataBlock {
    pub number_individuals: u32,
    pub number_alleles: u16,
    pub minimum_ploidy: u8,
    pub maximum_ploidy: u8,
    /// Per sample: ploidy in the low 6 bits, missingness in the high bit.
    pub ploidy_missingness: Vec<u8>,
    pub phased: bool,
    pub bits_storage: u8,
    pub probabilities: Vec<u32>,
}

impl DataBlock {
    fn stored_probability_count(&self) -> u32 {
        self.ploidy_missingness
            .iter()
            .map(|b| stored_entry_count(b & 0x3f, self.number_alleles, self.phased))
            .sum()
    }

    /// Serializes the layout-2 payload that gets compressed.
    fn to_v12_payload(&self) -> Result<Vec<u8>> {
        if self.ploidy_missingness.len() != self.number_individuals as usize {
            return Err(BgenError::InvalidVariantRecord(format!(
                "{} ploidy bytes for {} samples",
                self.ploidy_missingness.len(),
                self.number_individuals
            )));
        }
        let expected = self.stored_probability_count() as usize;
        if self.probabilities.len() != expected {
            return Err(BgenError::InvalidVariantRecord(format!(
                "{} probabilities, expected {expected}",
                self.probabilities.len()
            )));
        }
        let mut payload = Vec::with_capacity(10 + self.ploidy_missingness.len());
        payload.extend_from_slice(&self.number_individuals.to_le_bytes());
        payload.extend_from_slice(&self.number_alleles.to_le_bytes());
        payload.push(self.minimum_ploidy);
        payload.push(self.maximum_ploidy);
        payload.extend_from_slice(&self.ploidy_missingness);
        payload.push(self.phased as u8);
        payload.push(self.bits_storage);
        let mut bits = BitWriter::new();
        for &value in &self.probabilities {
            bits.push(value, self.bits_storage);
        }
        payload.extend_from_slice(&bits.into_bytes());
        Ok(payload)
    }

    /// Serializes the layout-1 payload (`6 * N` bytes) that gets compressed.
    fn to_v11_payload(&self) -> Result<Vec<u8>> {
        let expected = self.number_individuals as usize * 3;
        if self.probabilities.len() != expected {
            return Err(BgenError::InvalidVariantRecord(format!(
                "{} probabilities, expected {expected} for layout 1",
                self.probabilities.len()
            )));
        }
        let mut payload = Vec::with_capacity(expected * 2);
        for &value in &self.probabilities {
            payload.extend_from_slice(&(value as u16).to_le_bytes());
        }
        Ok(payload)
    }
}

/// The identifying tuple of one variant plus its probability data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantData {
    /// Sample count repeated in the layout-1 identifying block.
    pub number_individuals: Option<u32>,
    pub variants_id: String,
    pub rsid: String,
    pub chr: String,
    pub pos: u32,
    pub number_alleles: u16,
    pub alleles: Vec<String>,
    /// Byte offset of the identifying block in the source file.
    pub file_start_position: u64,
    /// Identifying block plus probability block.
    pub size_in_bytes: u64,
    pub data_block: DataBlock,
}

impl VariantData {
    /// Reads one identifying block, leaving the reader at the start of the
    /// probability block. `file_start_position` and `size_in_bytes` are
    /// left for the caller, which knows the cursor.
    pub fn read_identifying_data<R: Read>(reader: &mut R, header: &Header) -> Result<VariantData> {
        let number_individuals = if header.header_flags.layout_id == 1 {
            let n = read_u32(reader)?;
            if n != header.sample_num {
                return Err(BgenError::InvalidVariantRecord(format!(
                    "variant carries {n} samples, header says {}",
                    header.sample_num
                )));
            }
            Some(n)
        } else {
            None
        };
        let variants_id = read_string_u16(reader, "variant id")?;
        let rsid = read_string_u16(reader, "rsid")?;
        let chr = read_string_u16(reader, "chromosome")?;
        let pos = read_u32(reader)?;
        let number_alleles = if header.header_flags.layout_id == 2 {
            read_u16(reader)?
        } else {
            2
        };
        if number_alleles < 2 {
            return Err(BgenError::InvalidVariantRecord(format!(
                "variant {rsid} has {number_alleles} alleles"
            )));
        }
        let alleles = (0..number_alleles)
            .map(|_| read_string_u32(reader, "allele"))
            .collect::<Result<Vec<_>>>()?;
        Ok(VariantData {
            number_individuals,
            variants_id,
            rsid,
            chr,
            pos,
            number_alleles,
            alleles,
            ..VariantData::default()
        })
    }

    /// Writes the identifying block and the probability block in the
    /// dialect selected by `flags`, returning the bytes written.
    pub fn write_self<W: Write>(
        &self,
        writer: &mut W,
        flags: HeaderFlags,
        compression_level: u32,
    ) -> Result<u64> {
        let id_bytes = write_snp_identifying_data(
            writer,
            flags,
            self.number_individuals
                .unwrap_or(self.data_block.number_individuals),
            &self.variants_id,
            &self.rsid,
            &self.chr,
            self.pos,
            self.number_alleles,
            |i| self.alleles[i].as_str(),
        )?;
        let data_bytes = match flags.layout_id {
            1 => write_v11_data_block(writer, &self.data_block, flags.compression, compression_level)?,
            2 => write_v12_data_block(writer, &self.data_block, flags.compression, compression_level)?,
            other => return Err(BgenError::UnsupportedLayout(other)),
        };
        Ok(id_bytes + data_bytes)
    }
}

/// Writes one identifying block. The `allele` callback yields the i-th
/// allele so callers need not materialize a collection. Returns the bytes
/// written.
#[allow(clippy::too_many_arguments)]
pub fn write_snp_identifying_data<W, S, F>(
    writer: &mut W,
    flags: HeaderFlags,
    sample_num: u32,
    variants_id: &str,
    rsid: &str,
    chr: &str,
    pos: u32,
    number_alleles: u16,
    allele: F,
) -> Result<u64>
where
    W: Write,
    S: AsRef<str>,
    F: Fn(usize) -> S,
{
    if number_alleles < 2 {
        return Err(BgenError::InvalidVariantRecord(format!(
            "variant {rsid} has {number_alleles} alleles"
        )));
    }
    let mut written = 0u64;
    match flags.layout_id {
        1 => {
            if number_alleles != 2 {
                return Err(BgenError::InvalidVariantRecord(format!(
                    "layout 1 implies two alleles, got {number_alleles}"
                )));
            }
            write_u32(writer, sample_num)?;
            written += 4;
        }
        2 => {}
        other => return Err(BgenError::UnsupportedLayout(other)),
    }
    write_string_u16(writer, variants_id, "variant id")?;
    write_string_u16(writer, rsid, "rsid")?;
    write_string_u16(writer, chr, "chromosome")?;
    write_u32(writer, pos)?;
    written += 6 + variants_id.len() as u64 + rsid.len() as u64 + chr.len() as u64 + 4;
    if flags.layout_id == 2 {
        write_u16(writer, number_alleles)?;
        written += 2;
    }
    for i in 0..number_alleles as usize {
        let allele = allele(i);
        write_string_u32(writer, allele.as_ref(), "allele")?;
        written += 4 + allele.as_ref().len() as u64;
    }
    Ok(written)
}

/// Layout-2 probability block: `u32 compressed_size`, `u32
/// uncompressed_size`, then the payload. Returns the bytes written.
pub fn write_v12_data_block<W: Write>(
    writer: &mut W,
    data_block: &DataBlock,
    kind: Compression,
    level: u32,
) -> Result<u64> {
    let payload = data_block.to_v12_payload()?;
    let packed = compression::compress(&payload, kind, level)?;
    write_u32(writer, packed.len() as u32)?;
    write_u32(writer, payload.len() as u32)?;
    write_all(writer, &packed, "probability block")?;
    Ok(8 + packed.len() as u64)
}

/// Layout-1 probability block: zlib framing with a `u32 compressed_size`
/// prefix, or the bare `6 * N` bytes when uncompressed.
pub fn write_v11_data_block<W: Write>(
    writer: &mut W,
    data_block: &DataBlock,
    kind: Compression,
    level: u32,
) -> Result<u64> {
    let payload = data_block.to_v11_payload()?;
    match kind {
        Compression::None => {
            write_all(writer, &payload, "probability block")?;
            Ok(payload.len() as u64)
        }
        Compression::Zlib => {
            let packed = compression::compress(&payload, kind, level)?;
            write_u32(writer, packed.len() as u32)?;
            write_all(writer, &packed, "probability block")?;
            Ok(4 + packed.len() as u64)
        }
        Compression::Zstd => Err(BgenError::UnsupportedCompression(kind.to_flag_bits())),
    }
}
