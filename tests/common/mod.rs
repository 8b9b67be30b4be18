use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use bgen_tools::bgen::bgen_stream::{sample_block_length, write_samples};
use bgen_tools::bgen::compression::Compression;
use bgen_tools::bgen::header::{Header, HeaderFlags};
use bgen_tools::bgen::variant_data::{DataBlock, VariantData};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

pub fn scratch_dir(label: &str) -> PathBuf {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join("bgen-tools-tests").join(format!(
        "{}-{}-{}",
        std::process::id(),
        id,
        label
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn test_samples() -> Vec<String> {
    vec!["S1".to_string(), "S2".to_string(), "S3".to_string()]
}

/// An 8-bit unphased diploid biallelic layout-2 variant over three samples.
/// `pairs` holds the two stored probabilities of each sample; a high bit in
/// `ploidy_missingness` marks the sample missing.
pub fn test_variant(
    rsid: &str,
    pos: u32,
    pairs: [[u32; 2]; 3],
    ploidy_missingness: [u8; 3],
) -> VariantData {
    VariantData {
        number_individuals: None,
        variants_id: format!("SNP_{rsid}"),
        rsid: rsid.to_string(),
        chr: "01".to_string(),
        pos,
        number_alleles: 2,
        alleles: vec!["A".to_string(), "G".to_string()],
        file_start_position: 0,
        size_in_bytes: 0,
        data_block: DataBlock {
            number_individuals: 3,
            number_alleles: 2,
            minimum_ploidy: 2,
            maximum_ploidy: 2,
            ploidy_missingness: ploidy_missingness.to_vec(),
            phased: false,
            bits_storage: 8,
            probabilities: pairs.iter().flatten().copied().collect(),
        },
    }
}

/// The standard two-variant fixture: `rs100` at 01:100 and `rs200` at
/// 01:200, the second with a missing third sample.
pub fn test_variants() -> Vec<VariantData> {
    vec![
        test_variant("rs100", 100, [[255, 0], [0, 255], [0, 0]], [2, 2, 2]),
        test_variant("rs200", 200, [[0, 0], [255, 0], [0, 0]], [2, 2, 0x82]),
    ]
}

pub fn write_bgen(path: &PathBuf, samples: &[String], variants: &[VariantData]) {
    write_bgen_with(path, samples, variants, b"", Compression::Zlib)
}

pub fn write_bgen_with(
    path: &PathBuf,
    samples: &[String],
    variants: &[VariantData],
    free_data: &[u8],
    compression: Compression,
) {
    let len_sample_block = sample_block_length(samples);
    let header_flags = HeaderFlags {
        compression,
        layout_id: 2,
        sample_id_present: true,
    };
    let header = Header {
        start_data_offset: 20 + free_data.len() as u32 + len_sample_block,
        variant_num: variants.len() as u32,
        sample_num: samples.len() as u32,
        free_data: free_data.to_vec(),
        header_flags,
    };
    let mut writer = BufWriter::new(File::create(path).unwrap());
    header.write_header(&mut writer).unwrap();
    write_samples(samples, &mut writer, len_sample_block).unwrap();
    for variant in variants {
        variant.write_self(&mut writer, header_flags, 6).unwrap();
    }
    writer.into_inner().unwrap();
}
