use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use log::info;

use bgen_tools::bgen::bgen_stream::BgenStream;
use bgen_tools::cli::normalize_single_dash_flags;
use bgen_tools::error::BgenError;
use bgen_tools::index::query::{Range, VariantQuery};
use bgen_tools::index::store::{build_index, IndexStore, DEFAULT_TABLE};
use bgen_tools::transcode::v11::V11Transcoder;
use bgen_tools::transcode::vcf::VcfTranscoder;
use bgen_tools::transcode::{read_sample_block_bytes, write_filtered_bgen};

#[derive(Parser, Debug)]
#[command(name = "bgenix", about = "Index and query bgen files")]
struct Args {
    /// Path to the bgen file
    #[arg(short = 'g', long = "bgen")]
    bgen: PathBuf,

    /// Path to the index file (defaults to <bgen>.bgi)
    #[arg(short = 'i', long = "index-file")]
    index_file: Option<PathBuf>,

    /// Name of the variant table in the index
    #[arg(long, default_value = DEFAULT_TABLE)]
    table: String,

    /// Build the index instead of querying
    #[arg(long)]
    index: bool,

    /// Overwrite an existing index
    #[arg(long)]
    clobber: bool,

    /// Build the variant table with an implicit rowid
    #[arg(long = "with-rowid", requires = "index")]
    with_rowid: bool,

    /// Ranges to include, as chr:start-end (either bound may be omitted; an
    /// argument naming a readable file stands for its whitespace-separated
    /// tokens)
    #[arg(long = "incl-range", num_args = 1..)]
    incl_range: Vec<String>,

    /// Ranges to exclude
    #[arg(long = "excl-range", num_args = 1..)]
    excl_range: Vec<String>,

    /// rsids to include
    #[arg(long = "incl-rsids", num_args = 1..)]
    incl_rsids: Vec<String>,

    /// rsids to exclude
    #[arg(long = "excl-rsids", num_args = 1..)]
    excl_rsids: Vec<String>,

    /// List matching variants as text
    #[arg(long, group = "output")]
    list: bool,

    /// Write matching variants as VCF
    #[arg(long, group = "output")]
    vcf: bool,

    /// Transcode matching variants to a layout-1 bgen file
    #[arg(long, group = "output")]
    v11: bool,

    /// zlib level for --v11 probability blocks
    #[arg(long = "compression-level", default_value_t = 6)]
    compression_level: u32,
}

/// Long flags also accepted in the classic single-dash spelling.
const LONG_FLAGS: &[&str] = &[
    "bgen",
    "index-file",
    "table",
    "index",
    "clobber",
    "with-rowid",
    "incl-range",
    "excl-range",
    "incl-rsids",
    "excl-rsids",
    "list",
    "vcf",
    "v11",
    "compression-level",
    "help",
];

fn main() {
    env_logger::init();
    if let Err(report) = run() {
        eprintln!("!! {report:#}");
        std::process::exit(-1);
    }
}

/// Arguments naming a readable file stand for the whitespace-separated
/// tokens of that file.
fn expand_arguments(arguments: &[String]) -> std::io::Result<Vec<String>> {
    let mut tokens = Vec::with_capacity(arguments.len());
    for argument in arguments {
        let path = Path::new(argument);
        if path.is_file() {
            let contents = fs::read_to_string(path)?;
            tokens.extend(contents.split_whitespace().map(str::to_string));
        } else {
            tokens.push(argument.clone());
        }
    }
    Ok(tokens)
}

fn default_index_path(bgen: &Path) -> PathBuf {
    PathBuf::from(format!("{}.bgi", bgen.display()))
}

fn display_or_dot(text: &str) -> &str {
    if text.is_empty() {
        "."
    } else {
        text
    }
}

fn run() -> color_eyre::Result<()> {
    let args = Args::parse_from(normalize_single_dash_flags(std::env::args_os(), LONG_FLAGS));
    let index_path = args
        .index_file
        .clone()
        .unwrap_or_else(|| default_index_path(&args.bgen));

    if args.index {
        build_index(
            &args.bgen,
            &index_path,
            &args.table,
            args.clobber,
            args.with_rowid,
        )?;
        return Ok(());
    }

    let mut stream = BgenStream::from_path(&args.bgen)
        .wrap_err_with(|| format!("could not open {}", args.bgen.display()))?;
    if !index_path.exists() {
        return Err(BgenError::OptionError(format!(
            "no index file {}; build one with `bgenix -g {} --index`",
            index_path.display(),
            args.bgen.display()
        ))
        .into());
    }
    let store = IndexStore::open(&index_path, &args.table)?;
    store.file_metadata()?.verify_against(&stream.metadata)?;

    let mut query = VariantQuery::new(store);
    for token in expand_arguments(&args.incl_range)? {
        query.include_range(Range::parse(&token)?);
    }
    for token in expand_arguments(&args.excl_range)? {
        query.exclude_range(Range::parse(&token)?);
    }
    query.include_rsids(expand_arguments(&args.incl_rsids)?);
    query.exclude_rsids(expand_arguments(&args.excl_rsids)?);
    let plan = query.initialise()?;
    info!("query plan covers {} variant(s)", plan.number_of_variants());

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if args.list {
        stream.set_query(plan);
        writeln!(
            out,
            "alternate_ids\trsid\tchromosome\tposition\tnumber_of_alleles\tfirst_allele\talternative_alleles"
        )?;
        while let Some(variant) = stream.read_variant()? {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                display_or_dot(&variant.variants_id),
                display_or_dot(&variant.rsid),
                variant.chr,
                variant.pos,
                variant.number_alleles,
                variant.alleles[0],
                variant.alleles[1..].join(",")
            )?;
        }
    } else if args.vcf {
        let sample_names: Vec<String> = if stream.sample_ids().is_empty() {
            (1..=stream.header.sample_num)
                .map(|i| format!("sample_{i}"))
                .collect()
        } else {
            stream.sample_ids().to_vec()
        };
        let mut transcoder = VcfTranscoder::new(&mut out);
        transcoder.write_header(&sample_names)?;
        stream.set_query(plan);
        while let Some(variant) = stream.read_variant()? {
            transcoder.write_variant(&mut stream, &variant)?;
        }
    } else if args.v11 {
        let source_header = stream.header.clone();
        let mut out_header = source_header.clone();
        out_header.variant_num = plan.number_of_variants() as u32;
        out_header.header_flags =
            V11Transcoder::output_flags(source_header.header_flags.sample_id_present);
        out_header.write_header(&mut out)?;
        out.write_all(&read_sample_block_bytes(&args.bgen, &source_header)?)?;
        let transcoder = V11Transcoder::new(args.compression_level);
        stream.set_query(plan);
        while let Some(variant) = stream.read_variant()? {
            let block = stream.read_packed_data_block()?;
            transcoder.transcode_variant(&mut out, &variant, &block)?;
        }
    } else {
        let header = stream.header.clone();
        write_filtered_bgen(&args.bgen, &header, &plan, &mut out)?;
    }
    out.flush()?;
    Ok(())
}
