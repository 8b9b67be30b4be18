//! Decoding of per-variant probability payloads (after decompression).
//!
//! The generic path drives a [`ProbabilitySink`] with every probability as
//! a float, reconstructing the implicit final value of each genotype or
//! haplotype group. The fast path hands transcoders a [`PackedDataBlock`]
//! that still holds the bit-packed buffer, so lookup-table transcoders
//! never touch floating point.

use crate::error::{BgenError, Result};

/// Serialization order of the probabilities of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Per haplotype, per allele.
    Phased,
    /// Per genotype multiset, in colex order.
    Colex,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Probability(f64),
    Missing,
}

/// Receiver for a decoded probability block.
pub trait ProbabilitySink {
    fn initialise(&mut self, number_of_samples: u32, number_of_alleles: u16) -> Result<()>;

    fn set_min_max_ploidy(
        &mut self,
        _min_ploidy: u8,
        _max_ploidy: u8,
        _min_entries: u32,
        _max_entries: u32,
    ) -> Result<()> {
        Ok(())
    }

    /// Returns false to skip the sample entirely.
    fn set_sample(&mut self, sample_index: usize) -> Result<bool>;

    fn set_number_of_entries(
        &mut self,
        ploidy: u8,
        number_of_entries: u32,
        order: OrderType,
    ) -> Result<()>;

    fn set_value(&mut self, entry_index: u32, value: Value) -> Result<()>;

    fn finalise(&mut self) -> Result<()>;
}

/// Number of genotype multisets for `ploidy` chromosomes over `n_alleles`
/// alleles: C(ploidy + n_alleles - 1, n_alleles - 1).
pub fn n_genotype_combinations(ploidy: u8, n_alleles: u16) -> u32 {
    let n = ploidy as u64 + n_alleles as u64 - 1;
    let k = n_alleles as u64 - 1;
    let k = k.min(n - k);
    let mut result = 1u64;
    for i in 0..k {
        result = result * (n - i) / (i + 1);
    }
    result as u32
}

/// Probabilities stored on disk for one sample (the final value of each
/// group is implicit).
pub fn stored_entry_count(ploidy: u8, n_alleles: u16, phased: bool) -> u32 {
    if phased {
        ploidy as u32 * (n_alleles as u32 - 1)
    } else {
        n_genotype_combinations(ploidy, n_alleles) - 1
    }
}

/// Probabilities reported to the sink for one sample.
pub fn full_entry_count(ploidy: u8, n_alleles: u16, phased: bool) -> u32 {
    if phased {
        ploidy as u32 * n_alleles as u32
    } else {
        n_genotype_combinations(ploidy, n_alleles)
    }
}

pub struct BitReader<'a> {
    data: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, bit_offset: 0 }
    }

    /// Reads `bits` bits (1..=32) starting at the current bit offset,
    /// little-endian within the packed stream.
    pub fn read(&mut self, bits: u8) -> Result<u32> {
        let start_byte = self.bit_offset / 8;
        let shift = self.bit_offset % 8;
        let end_byte = (self.bit_offset + bits as usize + 7) / 8;
        if end_byte > self.data.len() {
            return Err(BgenError::InvalidVariantRecord(format!(
                "packed probability data ends at byte {} but entry needs byte {}",
                self.data.len(),
                end_byte
            )));
        }
        let mut window = 0u64;
        for (i, &byte) in self.data[start_byte..end_byte].iter().enumerate() {
            window |= (byte as u64) << (8 * i);
        }
        let mask = if bits == 32 { u32::MAX as u64 } else { (1u64 << bits) - 1 };
        self.bit_offset += bits as usize;
        Ok(((window >> shift) & mask) as u32)
    }
}

#[derive(Debug, Default)]
pub struct BitWriter {
    out: Vec<u8>,
    bit_offset: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        BitWriter::default()
    }

    pub fn push(&mut self, value: u32, bits: u8) {
        let end_byte = (self.bit_offset + bits as usize + 7) / 8;
        self.out.resize(end_byte, 0);
        let shift = self.bit_offset % 8;
        let window = (value as u64) << shift;
        let start_byte = self.bit_offset / 8;
        for (i, byte) in self.out[start_byte..end_byte].iter_mut().enumerate() {
            *byte |= (window >> (8 * i)) as u8;
        }
        self.bit_offset += bits as usize;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }
}

/// A layout-2 probability payload with the probability bits still packed.
///
/// Preamble layout (all little-endian):
/// `u32 N, u16 K, u8 min_ploidy, u8 max_ploidy, N ploidy/missingness
/// bytes, u8 phased, u8 bits`, then the packed probabilities.
#[derive(Debug, Clone)]
pub struct PackedDataBlock {
    pub number_individuals: u32,
    pub number_alleles: u16,
    pub minimum_ploidy: u8,
    pub maximum_ploidy: u8,
    pub phased: bool,
    pub bits_storage: u8,
    data: Vec<u8>,
    packed_offset: usize,
}

impl PackedDataBlock {
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < 10 {
            return Err(BgenError::InvalidVariantRecord(format!(
                "probability block preamble needs 10 bytes, got {}",
                data.len()
            )));
        }
        let number_individuals = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let number_alleles = u16::from_le_bytes(data[4..6].try_into().unwrap());
        if number_alleles == 0 {
            return Err(BgenError::InvalidVariantRecord(
                "probability block reports zero alleles".into(),
            ));
        }
        let minimum_ploidy = data[6];
        let maximum_ploidy = data[7];
        let n = number_individuals as usize;
        if data.len() < 10 + n {
            return Err(BgenError::InvalidVariantRecord(format!(
                "probability block truncated in ploidy bytes ({} samples, {} bytes)",
                n,
                data.len()
            )));
        }
        let phased = match data[8 + n] {
            0 => false,
            1 => true,
            other => {
                return Err(BgenError::InvalidVariantRecord(format!(
                    "phased byte must be 0 or 1, got {other}"
                )))
            }
        };
        let bits_storage = data[9 + n];
        if !(1..=32).contains(&bits_storage) {
            return Err(BgenError::InvalidVariantRecord(format!(
                "bits per probability must be in 1..=32, got {bits_storage}"
            )));
        }
        Ok(PackedDataBlock {
            number_individuals,
            number_alleles,
            minimum_ploidy,
            maximum_ploidy,
            phased,
            bits_storage,
            data,
            packed_offset: 10 + n,
        })
    }

    pub fn ploidy_missingness(&self) -> &[u8] {
        &self.data[8..8 + self.number_individuals as usize]
    }

    /// The still-packed probability bits.
    pub fn packed(&self) -> &[u8] {
        &self.data[self.packed_offset..]
    }

    /// Drives `sink` with every probability of every sample.
    pub fn decode(&self, sink: &mut impl ProbabilitySink) -> Result<()> {
        sink.initialise(self.number_individuals, self.number_alleles)?;
        sink.set_min_max_ploidy(
            self.minimum_ploidy,
            self.maximum_ploidy,
            full_entry_count(self.minimum_ploidy, self.number_alleles, self.phased),
            full_entry_count(self.maximum_ploidy, self.number_alleles, self.phased),
        )?;
        let order = if self.phased { OrderType::Phased } else { OrderType::Colex };
        let denominator = ((1u64 << self.bits_storage) - 1) as f64;
        let mut bit_reader = BitReader::new(self.packed());
        for (i, &ploidy_byte) in self.ploidy_missingness().iter().enumerate() {
            let ploidy = ploidy_byte & 0x3f;
            let missing = ploidy_byte & 0x80 != 0;
            let stored = stored_entry_count(ploidy, self.number_alleles, self.phased);
            if !sink.set_sample(i)? {
                for _ in 0..stored {
                    bit_reader.read(self.bits_storage)?;
                }
                continue;
            }
            sink.set_number_of_entries(
                ploidy,
                full_entry_count(ploidy, self.number_alleles, self.phased),
                order,
            )?;
            if self.phased {
                let mut entry = 0u32;
                for _hap in 0..ploidy {
                    self.decode_group(
                        self.number_alleles as u32 - 1,
                        &mut bit_reader,
                        denominator,
                        missing,
                        &mut entry,
                        sink,
                    )?;
                }
            } else {
                let mut entry = 0u32;
                self.decode_group(stored, &mut bit_reader, denominator, missing, &mut entry, sink)?;
            }
        }
        sink.finalise()
    }

    /// Emits one group of `stored` explicit values plus the implicit final
    /// value (`1 - sum`).
    fn decode_group(
        &self,
        stored: u32,
        bit_reader: &mut BitReader<'_>,
        denominator: f64,
        missing: bool,
        entry: &mut u32,
        sink: &mut impl ProbabilitySink,
    ) -> Result<()> {
        let mut sum = 0.0;
        for _ in 0..stored {
            let raw = bit_reader.read(self.bits_storage)?;
            let p = raw as f64 / denominator;
            sum += p;
            let value = if missing { Value::Missing } else { Value::Probability(p) };
            sink.set_value(*entry, value)?;
            *entry += 1;
        }
        let value = if missing {
            Value::Missing
        } else {
            Value::Probability((1.0 - sum).max(0.0))
        };
        sink.set_value(*entry, value)?;
        *entry += 1;
        Ok(())
    }
}

/// Scale denominator of layout-1 probabilities.
pub const V11_DENOMINATOR: f64 = 32768.0;

/// Decodes a layout-1 payload (`6 * N` bytes, three `u16`s per sample).
/// A sample whose three probabilities are all zero is reported missing.
pub fn parse_v11_probability_data(
    payload: &[u8],
    expected_samples: u32,
    sink: &mut impl ProbabilitySink,
) -> Result<()> {
    if payload.len() != expected_samples as usize * 6 {
        return Err(BgenError::InvalidVariantRecord(format!(
            "layout-1 probability block is {} bytes, expected {}",
            payload.len(),
            expected_samples * 6
        )));
    }
    sink.initialise(expected_samples, 2)?;
    sink.set_min_max_ploidy(2, 2, 3, 3)?;
    for i in 0..expected_samples as usize {
        if !sink.set_sample(i)? {
            continue;
        }
        sink.set_number_of_entries(2, 3, OrderType::Colex)?;
        let chunk = &payload[i * 6..i * 6 + 6];
        let raw = [
            u16::from_le_bytes([chunk[0], chunk[1]]),
            u16::from_le_bytes([chunk[2], chunk[3]]),
            u16::from_le_bytes([chunk[4], chunk[5]]),
        ];
        let missing = raw == [0, 0, 0];
        for (entry, &value) in raw.iter().enumerate() {
            let value = if missing {
                Value::Missing
            } else {
                Value::Probability(value as f64 / V11_DENOMINATOR)
            };
            sink.set_value(entry as u32, value)?;
        }
    }
    sink.finalise()
}

/// Decodes a decompressed probability payload of either layout.
pub fn parse_probability_data(
    payload: &[u8],
    layout_id: u8,
    expected_samples: u32,
    sink: &mut impl ProbabilitySink,
) -> Result<()> {
    match layout_id {
        1 => parse_v11_probability_data(payload, expected_samples, sink),
        2 => {
            let block = PackedDataBlock::parse(payload.to_vec())?;
            if block.number_individuals != expected_samples {
                return Err(BgenError::InvalidVariantRecord(format!(
                    "probability block carries {} samples, header says {}",
                    block.number_individuals, expected_samples
                )));
            }
            block.decode(sink)
        }
        other => Err(BgenError::UnsupportedLayout(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        samples: Vec<Vec<Value>>,
        current: Vec<Value>,
        finalised: bool,
    }

    impl ProbabilitySink for CollectingSink {
        fn initialise(&mut self, _n: u32, _k: u16) -> Result<()> {
            Ok(())
        }

        fn set_sample(&mut self, _i: usize) -> Result<bool> {
            if !self.current.is_empty() {
                self.samples.push(std::mem::take(&mut self.current));
            }
            Ok(true)
        }

        fn set_number_of_entries(&mut self, _p: u8, _n: u32, _o: OrderType) -> Result<()> {
            Ok(())
        }

        fn set_value(&mut self, _entry: u32, value: Value) -> Result<()> {
            self.current.push(value);
            Ok(())
        }

        fn finalise(&mut self) -> Result<()> {
            if !self.current.is_empty() {
                self.samples.push(std::mem::take(&mut self.current));
            }
            self.finalised = true;
            Ok(())
        }
    }

    #[test]
    fn bit_round_trip_all_widths() {
        for bits in 1..=32u8 {
            let max = if bits == 32 { u32::MAX } else { (1 << bits) - 1 };
            let values = [0, 1, max / 2, max];
            let mut writer = BitWriter::new();
            for &v in &values {
                writer.push(v, bits);
            }
            let bytes = writer.into_bytes();
            let mut reader = BitReader::new(&bytes);
            for &v in &values {
                assert_eq!(reader.read(bits).unwrap(), v, "width {bits}");
            }
        }
    }

    #[test]
    fn genotype_combinations() {
        // diploid biallelic: AA, AB, BB
        assert_eq!(n_genotype_combinations(2, 2), 3);
        // diploid triallelic
        assert_eq!(n_genotype_combinations(2, 3), 6);
        // tetraploid biallelic
        assert_eq!(n_genotype_combinations(4, 2), 5);
        assert_eq!(stored_entry_count(2, 2, false), 2);
        assert_eq!(stored_entry_count(2, 2, true), 2);
        assert_eq!(full_entry_count(2, 2, true), 4);
    }

    fn build_payload(
        n_alleles: u16,
        ploidy_bytes: &[u8],
        phased: bool,
        bits: u8,
        values: &[u32],
    ) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(ploidy_bytes.len() as u32).to_le_bytes());
        payload.extend_from_slice(&n_alleles.to_le_bytes());
        let ploidies: Vec<u8> = ploidy_bytes.iter().map(|b| b & 0x3f).collect();
        payload.push(*ploidies.iter().min().unwrap());
        payload.push(*ploidies.iter().max().unwrap());
        payload.extend_from_slice(ploidy_bytes);
        payload.push(phased as u8);
        payload.push(bits);
        let mut writer = BitWriter::new();
        for &v in values {
            writer.push(v, bits);
        }
        payload.extend_from_slice(&writer.into_bytes());
        payload
    }

    #[test]
    fn unphased_decoding_reconstructs_implicit_value() {
        // two diploid biallelic samples, 8 bits: (p_AA, p_AB) stored
        let payload = build_payload(2, &[2, 2], false, 8, &[255, 0, 0, 255]);
        let mut sink = CollectingSink::default();
        parse_probability_data(&payload, 2, 2, &mut sink).unwrap();
        assert!(sink.finalised);
        assert_eq!(sink.samples.len(), 2);
        assert_eq!(
            sink.samples[0],
            vec![
                Value::Probability(1.0),
                Value::Probability(0.0),
                Value::Probability(0.0)
            ]
        );
        match sink.samples[1][2] {
            Value::Probability(p) => assert!(p.abs() < 1e-9),
            Value::Missing => panic!("expected implicit probability"),
        }
    }

    #[test]
    fn missing_sample_is_reported_missing() {
        let payload = build_payload(2, &[2, 0x82], false, 8, &[255, 0, 0, 0]);
        let mut sink = CollectingSink::default();
        parse_probability_data(&payload, 2, 2, &mut sink).unwrap();
        assert_eq!(sink.samples[1], vec![Value::Missing; 3]);
    }

    #[test]
    fn phased_decoding_emits_per_haplotype_groups() {
        // one diploid biallelic phased sample, 4 bits: one stored value per
        // haplotype
        let payload = build_payload(2, &[2], true, 4, &[15, 0]);
        let mut sink = CollectingSink::default();
        parse_probability_data(&payload, 2, 1, &mut sink).unwrap();
        assert_eq!(
            sink.samples[0],
            vec![
                Value::Probability(1.0),
                Value::Probability(0.0),
                Value::Probability(0.0),
                Value::Probability(1.0)
            ]
        );
    }

    #[test]
    fn v11_decoding_scales_and_flags_missing() {
        let mut payload = Vec::new();
        for value in [16384u16, 16384, 0, 0, 0, 0] {
            payload.extend_from_slice(&value.to_le_bytes());
        }
        let mut sink = CollectingSink::default();
        parse_v11_probability_data(&payload, 2, &mut sink).unwrap();
        assert_eq!(
            sink.samples[0],
            vec![
                Value::Probability(0.5),
                Value::Probability(0.5),
                Value::Probability(0.0)
            ]
        );
        assert_eq!(sink.samples[1], vec![Value::Missing; 3]);
    }

    #[test]
    fn quantization_error_is_bounded() {
        for bits in [1u8, 2, 4, 8, 16] {
            let max = (1u32 << bits) - 1;
            let raw = max / 3;
            let payload = build_payload(2, &[2], false, bits, &[raw, max - raw]);
            let mut sink = CollectingSink::default();
            parse_probability_data(&payload, 2, 1, &mut sink).unwrap();
            let expected = raw as f64 / max as f64;
            match sink.samples[0][0] {
                Value::Probability(p) => {
                    assert!((p - expected).abs() <= 1.0 / max as f64, "bits {bits}")
                }
                Value::Missing => panic!("unexpected missing"),
            }
        }
    }
}
