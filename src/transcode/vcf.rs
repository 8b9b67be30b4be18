//! VCF text output: a table-driven fast path for the common diploid
//! biallelic unphased case and a sink-driven generic path for everything
//! else.

use std::collections::HashMap;
use std::io::Write;

use crate::bgen::bgen_stream::BgenStream;
use crate::bgen::probability::{
    BitReader, OrderType, PackedDataBlock, ProbabilitySink, Value,
};
use crate::bgen::variant_data::VariantData;
use crate::error::{BgenError, Result};

/// Hard call threshold: a genotype is emitted only when its probability
/// exceeds this.
const CALL_THRESHOLD: f64 = 0.9;

fn write_text<W: Write>(writer: &mut W, text: &str) -> Result<()> {
    writer
        .write_all(text.as_bytes())
        .map_err(|source| BgenError::WriteFailed {
            what: "vcf output",
            source,
        })
}

/// All genotype multisets of `ploidy` alleles drawn from `n_alleles`, as
/// sorted allele-index tuples, in the colex order of their count vectors
/// (the order probabilities are serialized in).
fn enumerate_genotypes(ploidy: u8, n_alleles: u16) -> Vec<Vec<u16>> {
    if ploidy == 0 {
        return vec![Vec::new()];
    }
    let mut genotypes = Vec::new();
    for b in 0..n_alleles {
        for mut genotype in enumerate_genotypes(ploidy - 1, b + 1) {
            genotype.push(b);
            genotypes.push(genotype);
        }
    }
    genotypes
}

fn format_probability(value: Value) -> String {
    match value {
        Value::Missing => ".".to_string(),
        Value::Probability(p) => {
            let rounded = (p * 10000.0).round() / 10000.0;
            format!("{rounded}")
        }
    }
}

/// Accumulates the per-sample `GT:GP` fields of one variant while a
/// probability block is decoded through it.
#[derive(Default)]
pub struct VcfSampleSink {
    n_alleles: u16,
    ploidy: u8,
    order: Option<OrderType>,
    entries: Vec<Value>,
    fields: String,
    pending: bool,
    genotype_cache: HashMap<u8, Vec<Vec<u16>>>,
}

impl VcfSampleSink {
    pub fn new() -> VcfSampleSink {
        VcfSampleSink::default()
    }

    /// The accumulated sample fields, leaving the sink ready for the next
    /// variant.
    pub fn take_fields(&mut self) -> String {
        self.pending = false;
        self.entries.clear();
        std::mem::take(&mut self.fields)
    }

    fn flush_sample(&mut self) {
        if !self.pending {
            return;
        }
        self.fields.push('\t');
        let genotype = match self.order {
            Some(OrderType::Phased) => self.phased_genotype(),
            _ => self.unphased_genotype(),
        };
        self.fields.push_str(&genotype);
        self.fields.push(':');
        let probabilities = self
            .entries
            .iter()
            .map(|&v| format_probability(v))
            .collect::<Vec<_>>()
            .join(",");
        self.fields.push_str(&probabilities);
        self.entries.clear();
    }

    fn phased_genotype(&self) -> String {
        let k = self.n_alleles as usize;
        (0..self.ploidy as usize)
            .map(|hap| {
                let group = &self.entries[hap * k..(hap + 1) * k];
                group
                    .iter()
                    .position(|&v| matches!(v, Value::Probability(p) if p > CALL_THRESHOLD))
                    .map(|j| j.to_string())
                    .unwrap_or_else(|| ".".to_string())
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    fn unphased_genotype(&mut self) -> String {
        let called = self.entries.iter().position(
            |&v| matches!(v, Value::Probability(p) if p > CALL_THRESHOLD),
        );
        match called {
            Some(index) => {
                let genotypes = self
                    .genotype_cache
                    .entry(self.ploidy)
                    .or_insert_with(|| enumerate_genotypes(self.ploidy, self.n_alleles));
                genotypes[index]
                    .iter()
                    .map(|allele| allele.to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            }
            None => vec!["."; self.ploidy as usize].join("/"),
        }
    }
}

impl ProbabilitySink for VcfSampleSink {
    fn initialise(&mut self, _number_of_samples: u32, number_of_alleles: u16) -> Result<()> {
        self.n_alleles = number_of_alleles;
        // allele count changes invalidate cached genotype enumerations
        self.genotype_cache.clear();
        Ok(())
    }

    fn set_sample(&mut self, _sample_index: usize) -> Result<bool> {
        self.flush_sample();
        self.pending = true;
        Ok(true)
    }

    fn set_number_of_entries(
        &mut self,
        ploidy: u8,
        number_of_entries: u32,
        order: OrderType,
    ) -> Result<()> {
        self.ploidy = ploidy;
        self.order = Some(order);
        self.entries.clear();
        self.entries.reserve(number_of_entries as usize);
        Ok(())
    }

    fn set_value(&mut self, _entry_index: u32, value: Value) -> Result<()> {
        self.entries.push(value);
        Ok(())
    }

    fn finalise(&mut self) -> Result<()> {
        self.flush_sample();
        Ok(())
    }
}

struct FastTable {
    entries: Vec<String>,
}

/// Per-bit-width lookup from the packed `(x, y)` key of one sample to its
/// complete `\tGT:GP` field, sidestepping per-value floating point.
fn build_fast_table(bits: u8) -> FastTable {
    let max = (1u32 << bits) - 1;
    let decimals = match bits {
        1 => 0,
        2 => 2,
        4 => 3,
        _ => 4,
    };
    let mut entries = Vec::with_capacity(1 << (2 * bits));
    for y in 0..=max {
        for x in 0..=max {
            let p_aa = x as f64 / max as f64;
            let p_ab = y as f64 / max as f64;
            let p_bb = max.saturating_sub(x + y) as f64 / max as f64;
            let gt = if p_aa > CALL_THRESHOLD {
                "0/0"
            } else if p_ab > CALL_THRESHOLD {
                "0/1"
            } else if p_bb > CALL_THRESHOLD {
                "1/1"
            } else {
                "./."
            };
            entries.push(format!(
                "\t{gt}:{p_aa:.decimals$},{p_ab:.decimals$},{p_bb:.decimals$}"
            ));
        }
    }
    FastTable { entries }
}

pub struct VcfTranscoder<W: Write> {
    writer: W,
    tables: HashMap<u8, FastTable>,
    sink: VcfSampleSink,
}

impl<W: Write> VcfTranscoder<W> {
    pub fn new(writer: W) -> VcfTranscoder<W> {
        VcfTranscoder {
            writer,
            tables: HashMap::new(),
            sink: VcfSampleSink::new(),
        }
    }

    pub fn write_header(&mut self, samples: &[String]) -> Result<()> {
        write_text(&mut self.writer, "##fileformat=VCFv4.2\n")?;
        write_text(
            &mut self.writer,
            "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype called from the \
             highest probability\">\n",
        )?;
        write_text(
            &mut self.writer,
            "##FORMAT=<ID=GP,Number=G,Type=Float,Description=\"Genotype probabilities\">\n",
        )?;
        write_text(
            &mut self.writer,
            "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT",
        )?;
        for sample in samples {
            write_text(&mut self.writer, "\t")?;
            write_text(&mut self.writer, sample)?;
        }
        write_text(&mut self.writer, "\n")
    }

    fn write_prefix(&mut self, variant: &VariantData) -> Result<()> {
        let id = if variant.rsid.is_empty() { "." } else { &variant.rsid };
        let alt = variant.alleles[1..].join(",");
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t.\t.\t.\tGT:GP",
            variant.chr, variant.pos, id, variant.alleles[0], alt
        );
        write_text(&mut self.writer, &line)
    }

    fn fast_eligible(block: &PackedDataBlock) -> bool {
        block.number_alleles == 2
            && !block.phased
            && block.minimum_ploidy == 2
            && block.maximum_ploidy == 2
            && matches!(block.bits_storage, 1 | 2 | 4 | 8)
    }

    fn write_fast(&mut self, block: &PackedDataBlock) -> Result<()> {
        let bits = block.bits_storage;
        let table = self
            .tables
            .entry(bits)
            .or_insert_with(|| build_fast_table(bits));
        let mut bit_reader = BitReader::new(block.packed());
        for &ploidy_byte in block.ploidy_missingness() {
            let x = bit_reader.read(bits)?;
            let y = bit_reader.read(bits)?;
            if ploidy_byte & 0x80 != 0 {
                write_text(&mut self.writer, "\t./.")?;
                continue;
            }
            let key = (x | (y << bits)) as usize;
            self.writer
                .write_all(table.entries[key].as_bytes())
                .map_err(|source| BgenError::WriteFailed {
                    what: "vcf output",
                    source,
                })?;
        }
        Ok(())
    }

    /// Transcodes the variant whose probability block is pending on
    /// `stream`.
    pub fn write_variant(&mut self, stream: &mut BgenStream, variant: &VariantData) -> Result<()> {
        self.write_prefix(variant)?;
        if stream.header.header_flags.layout_id == 2 {
            let block = stream.read_packed_data_block()?;
            if Self::fast_eligible(&block) {
                self.write_fast(&block)?;
            } else {
                block.decode(&mut self.sink)?;
                let fields = self.sink.take_fields();
                write_text(&mut self.writer, &fields)?;
            }
        } else {
            stream.read_data_block(&mut self.sink)?;
            let fields = self.sink.take_fields();
            write_text(&mut self.writer, &fields)?;
        }
        write_text(&mut self.writer, "\n")
    }
}
