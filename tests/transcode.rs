mod common;

use std::fs;
use std::io::Write;

use bgen_tools::bgen::bgen_stream::BgenStream;
use bgen_tools::bgen::compression::Compression;
use bgen_tools::bgen::probability::{OrderType, ProbabilitySink, Value};
use bgen_tools::error::{BgenError, Result};
use bgen_tools::index::query::{Range, VariantQuery};
use bgen_tools::index::store::{build_index, IndexStore, DEFAULT_TABLE};
use bgen_tools::transcode::v11::V11Transcoder;
use bgen_tools::transcode::vcf::VcfTranscoder;
use bgen_tools::transcode::{read_sample_block_bytes, write_filtered_bgen};

fn indexed_fixture(label: &str) -> (std::path::PathBuf, std::path::PathBuf) {
    let dir = common::scratch_dir(label);
    let bgen = dir.join("f.bgen");
    let index = dir.join("f.bgen.bgi");
    common::write_bgen(&bgen, &common::test_samples(), &common::test_variants());
    build_index(&bgen, &index, DEFAULT_TABLE, false, false).unwrap();
    (bgen, index)
}

fn full_plan(index: &std::path::Path) -> bgen_tools::index::query::Plan {
    let store = IndexStore::open(index, DEFAULT_TABLE).unwrap();
    VariantQuery::new(store).initialise().unwrap()
}

#[derive(Default)]
struct ProbCollector {
    samples: Vec<Vec<Value>>,
    current: Vec<Value>,
}

impl ProbCollector {
    fn finish_current(&mut self) {
        if !self.current.is_empty() {
            self.samples.push(std::mem::take(&mut self.current));
        }
    }
}

impl ProbabilitySink for ProbCollector {
    fn initialise(&mut self, _n: u32, _k: u16) -> Result<()> {
        Ok(())
    }

    fn set_sample(&mut self, _i: usize) -> Result<bool> {
        self.finish_current();
        Ok(true)
    }

    fn set_number_of_entries(&mut self, _ploidy: u8, _n: u32, _order: OrderType) -> Result<()> {
        Ok(())
    }

    fn set_value(&mut self, _entry: u32, value: Value) -> Result<()> {
        self.current.push(value);
        Ok(())
    }

    fn finalise(&mut self) -> Result<()> {
        self.finish_current();
        Ok(())
    }
}

#[test]
fn unfiltered_raw_copy_reproduces_the_file() {
    let (bgen, index) = indexed_fixture("copy-identity");
    let plan = full_plan(&index);
    let header = BgenStream::from_path(&bgen).unwrap().header.clone();

    let mut output = Vec::new();
    write_filtered_bgen(&bgen, &header, &plan, &mut output).unwrap();
    assert_eq!(output, fs::read(&bgen).unwrap());
}

#[test]
fn filtered_raw_copy_patches_the_variant_count() {
    let (bgen, index) = indexed_fixture("copy-filtered");
    let store = IndexStore::open(&index, DEFAULT_TABLE).unwrap();
    let mut query = VariantQuery::new(store);
    query.include_range(Range::parse("01:150-250").unwrap());
    let plan = query.initialise().unwrap();
    let header = BgenStream::from_path(&bgen).unwrap().header.clone();

    let dir = common::scratch_dir("copy-filtered-out");
    let out_path = dir.join("filtered.bgen");
    let mut out_file = fs::File::create(&out_path).unwrap();
    write_filtered_bgen(&bgen, &header, &plan, &mut out_file).unwrap();
    out_file.flush().unwrap();
    drop(out_file);

    let mut stream = BgenStream::from_path(&out_path).unwrap();
    assert_eq!(stream.header.variant_num, 1);
    assert_eq!(stream.sample_ids(), common::test_samples().as_slice());
    let variant = stream.read_variant().unwrap().unwrap();
    assert_eq!(variant.rsid, "rs200");
    stream.ignore_data_block().unwrap();
    assert!(stream.read_variant().unwrap().is_none());
}

#[test]
fn v11_transcode_produces_a_readable_layout1_file() {
    let (bgen, index) = indexed_fixture("v11");
    let plan = full_plan(&index);
    let mut stream = BgenStream::from_path(&bgen).unwrap();
    let source_header = stream.header.clone();

    let dir = common::scratch_dir("v11-out");
    let out_path = dir.join("out.bgen");
    let mut out = fs::File::create(&out_path).unwrap();
    let mut out_header = source_header.clone();
    out_header.variant_num = plan.number_of_variants() as u32;
    out_header.header_flags = V11Transcoder::output_flags(true);
    out_header.write_header(&mut out).unwrap();
    out.write_all(&read_sample_block_bytes(&bgen, &source_header).unwrap())
        .unwrap();
    let transcoder = V11Transcoder::new(6);
    stream.set_query(plan);
    while let Some(variant) = stream.read_variant().unwrap() {
        let block = stream.read_packed_data_block().unwrap();
        transcoder.transcode_variant(&mut out, &variant, &block).unwrap();
    }
    drop(out);

    let mut reread = BgenStream::from_path(&out_path).unwrap();
    assert_eq!(reread.header.header_flags.layout_id, 1);
    assert_eq!(reread.header.sample_num, 3);
    assert_eq!(reread.header.variant_num, 2);

    // first variant: certain AA, certain AB, certain BB
    let variant = reread.read_variant().unwrap().unwrap();
    assert_eq!(variant.rsid, "rs100");
    assert_eq!(variant.number_individuals, Some(3));
    let mut collector = ProbCollector::default();
    reread.read_data_block(&mut collector).unwrap();
    for (sample, certain_entry) in [(0usize, 0usize), (1, 1), (2, 2)] {
        match collector.samples[sample][certain_entry] {
            Value::Probability(p) => assert!(
                (p - 1.0).abs() <= 1.0 / 32768.0,
                "sample {sample} entry {certain_entry} is {p}"
            ),
            Value::Missing => panic!("unexpected missing"),
        }
    }

    // second variant: its missing sample becomes six zero bytes
    reread.read_variant().unwrap().unwrap();
    let mut collector = ProbCollector::default();
    reread.read_data_block(&mut collector).unwrap();
    assert_eq!(collector.samples[2], vec![Value::Missing; 3]);
}

#[test]
fn v11_transcode_rejects_multiallelic_variants() {
    let dir = common::scratch_dir("v11-multiallelic");
    let bgen = dir.join("f.bgen");
    let mut variant = common::test_variant("rs1", 50, [[255, 0], [0, 255], [0, 0]], [2, 2, 2]);
    variant.number_alleles = 3;
    variant.alleles = vec!["A".into(), "G".into(), "T".into()];
    variant.data_block.number_alleles = 3;
    // three alleles store five entries per diploid sample
    variant.data_block.probabilities = vec![255, 0, 0, 0, 0, 0, 255, 0, 0, 0, 0, 0, 0, 0, 0];
    common::write_bgen(&bgen, &common::test_samples(), &[variant]);

    let mut stream = BgenStream::from_path(&bgen).unwrap();
    let variant = stream.read_variant().unwrap().unwrap();
    let block = stream.read_packed_data_block().unwrap();
    let err = V11Transcoder::new(6)
        .transcode_variant(&mut Vec::new(), &variant, &block)
        .unwrap_err();
    assert!(matches!(err, BgenError::UnsupportedTranscode(_)));
}

#[test]
fn vcf_fast_path_calls_genotypes_by_threshold() {
    let (bgen, index) = indexed_fixture("vcf-fast");
    let plan = full_plan(&index);
    let mut stream = BgenStream::from_path(&bgen).unwrap();

    let mut output = Vec::new();
    let mut transcoder = VcfTranscoder::new(&mut output);
    transcoder.write_header(stream.sample_ids().to_vec().as_slice()).unwrap();
    stream.set_query(plan);
    while let Some(variant) = stream.read_variant().unwrap() {
        transcoder.write_variant(&mut stream, &variant).unwrap();
    }

    let text = String::from_utf8(output).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("##fileformat=VCFv4.2"));
    assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3"));
    let data_lines: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(data_lines.len(), 2);
    assert_eq!(
        data_lines[0],
        "01\t100\trs100\tA\tG\t.\t.\t.\tGT:GP\
         \t0/0:1.0000,0.0000,0.0000\t0/1:0.0000,1.0000,0.0000\t1/1:0.0000,0.0000,1.0000"
    );
    // missing sample renders as a bare ./.
    assert!(data_lines[1].ends_with("\t./."));
    assert!(data_lines[1].starts_with("01\t200\trs200\tA\tG\t.\t.\t.\tGT:GP\t1/1:"));
}

#[test]
fn vcf_generic_path_handles_wide_bit_depths() {
    let dir = common::scratch_dir("vcf-generic");
    let bgen = dir.join("f.bgen");
    let mut variant = common::test_variant("rs9", 900, [[0, 0], [0, 0], [0, 0]], [2, 2, 2]);
    variant.data_block.bits_storage = 16;
    variant.data_block.probabilities = vec![65535, 0, 0, 65535, 0, 0];
    common::write_bgen(&bgen, &common::test_samples(), &[variant]);

    let mut stream = BgenStream::from_path(&bgen).unwrap();
    let mut output = Vec::new();
    let mut transcoder = VcfTranscoder::new(&mut output);
    let variant = stream.read_variant().unwrap().unwrap();
    transcoder.write_variant(&mut stream, &variant).unwrap();

    let text = String::from_utf8(output).unwrap();
    assert_eq!(text, "01\t900\trs9\tA\tG\t.\t.\t.\tGT:GP\t0/0:1,0,0\t0/1:0,1,0\t1/1:0,0,1\n");
}
