//! Fast layout-2 to layout-1 transcoding for 8-bit unphased diploid
//! biallelic variants.
//!
//! A 65536-entry table maps the 16-bit packed pair of one sample directly
//! to the three 16-bit layout-1 probabilities, so the per-sample work is a
//! table load and three little-endian stores.

use std::io::Write;

use crate::bgen::compression::{self, Compression};
use crate::bgen::endian::{write_all, write_u32};
use crate::bgen::header::HeaderFlags;
use crate::bgen::probability::PackedDataBlock;
use crate::bgen::variant_data::{write_snp_identifying_data, VariantData};
use crate::error::{BgenError, Result};

const V11_SCALE: f64 = 32768.0;
const V12_MAX: f64 = 255.0;

pub struct V11Transcoder {
    /// 16-bit packed `(x, y)` pair to 48-bit `(a, b, c)`.
    table: Vec<u64>,
    compression_level: u32,
}

impl V11Transcoder {
    pub fn new(compression_level: u32) -> V11Transcoder {
        let mut table = vec![0u64; 1 << 16];
        for (key, entry) in table.iter_mut().enumerate() {
            let x = (key & 0xff) as f64;
            let y = (key >> 8) as f64;
            let remainder = (V12_MAX - x - y).max(0.0);
            let a = (x * V11_SCALE / V12_MAX).round() as u64;
            let b = (y * V11_SCALE / V12_MAX).round() as u64;
            let c = (remainder * V11_SCALE / V12_MAX).round() as u64;
            *entry = a | (b << 16) | (c << 32);
        }
        V11Transcoder {
            table,
            compression_level,
        }
    }

    /// The flags word of the produced file.
    pub fn output_flags(sample_id_present: bool) -> HeaderFlags {
        HeaderFlags {
            compression: Compression::Zlib,
            layout_id: 1,
            sample_id_present,
        }
    }

    fn check_eligible(variant: &VariantData, block: &PackedDataBlock) -> Result<()> {
        let reject = |what: String| {
            Err(BgenError::UnsupportedTranscode(format!(
                "{} at {}:{} {what}; layout-1 output needs unphased diploid biallelic \
                 8-bit variants",
                variant.rsid, variant.chr, variant.pos
            )))
        };
        if variant.number_alleles != 2 || block.number_alleles != 2 {
            return reject(format!("has {} alleles", variant.number_alleles));
        }
        if block.phased {
            return reject("is phased".into());
        }
        if block.minimum_ploidy != 2 || block.maximum_ploidy != 2 {
            return reject(format!(
                "has ploidy {}..{}",
                block.minimum_ploidy, block.maximum_ploidy
            ));
        }
        if block.bits_storage != 8 {
            return reject(format!("stores {} bits per probability", block.bits_storage));
        }
        Ok(())
    }

    /// Writes one variant in the layout-1 dialect: identifying block, then
    /// the zlib-compressed 6-byte-per-sample probability block. Missing
    /// samples emit six zero bytes.
    pub fn transcode_variant<W: Write>(
        &self,
        writer: &mut W,
        variant: &VariantData,
        block: &PackedDataBlock,
    ) -> Result<u64> {
        Self::check_eligible(variant, block)?;
        let id_bytes = write_snp_identifying_data(
            writer,
            Self::output_flags(false),
            block.number_individuals,
            &variant.variants_id,
            &variant.rsid,
            &variant.chr,
            variant.pos,
            2,
            |i| variant.alleles[i].as_str(),
        )?;

        let packed = block.packed();
        if packed.len() < block.number_individuals as usize * 2 {
            return Err(BgenError::InvalidVariantRecord(format!(
                "{} bytes of packed probabilities for {} samples",
                packed.len(),
                block.number_individuals
            )));
        }
        let mut payload = Vec::with_capacity(block.number_individuals as usize * 6);
        for (i, &ploidy_byte) in block.ploidy_missingness().iter().enumerate() {
            if ploidy_byte & 0x80 != 0 {
                payload.extend_from_slice(&[0u8; 6]);
                continue;
            }
            let key = u16::from_le_bytes([packed[2 * i], packed[2 * i + 1]]);
            let entry = self.table[key as usize];
            payload.extend_from_slice(&(entry as u16).to_le_bytes());
            payload.extend_from_slice(&((entry >> 16) as u16).to_le_bytes());
            payload.extend_from_slice(&((entry >> 32) as u16).to_le_bytes());
        }
        let compressed = compression::compress(&payload, Compression::Zlib, self.compression_level)?;
        write_u32(writer, compressed.len() as u32)?;
        write_all(writer, &compressed, "probability block")?;
        Ok(id_bytes + 4 + compressed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_sum_to_scale_within_rounding() {
        let transcoder = V11Transcoder::new(6);
        for x in 0u16..=255 {
            for y in 0u16..=255 {
                if x + y > 255 {
                    continue;
                }
                let entry = transcoder.table[(x | (y << 8)) as usize];
                let a = entry & 0xffff;
                let b = (entry >> 16) & 0xffff;
                let c = (entry >> 32) & 0xffff;
                let sum = a + b + c;
                assert!(
                    (32767..=32769).contains(&sum),
                    "x={x} y={y} sums to {sum}"
                );
            }
        }
    }

    #[test]
    fn table_scales_each_component() {
        let transcoder = V11Transcoder::new(6);
        let entry = transcoder.table[(255u16) as usize]; // x=255, y=0
        assert_eq!(entry & 0xffff, 32768);
        assert_eq!((entry >> 16) & 0xffff, 0);
        assert_eq!((entry >> 32) & 0xffff, 0);
    }
}
