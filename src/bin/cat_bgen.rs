use std::path::PathBuf;

use clap::Parser;

use bgen_tools::cli::normalize_single_dash_flags;
use bgen_tools::edit::concatenate;

#[derive(Parser, Debug)]
#[command(name = "cat-bgen", about = "Concatenate bgen files")]
struct Args {
    /// Input bgen files, in output order
    #[arg(short = 'g', long = "bgen", num_args = 1.., required = true)]
    inputs: Vec<PathBuf>,

    /// Output bgen file
    #[arg(long = "og")]
    output: PathBuf,

    /// Overwrite the output file if it exists
    #[arg(long)]
    clobber: bool,

    /// Replace the free-data blob in the output header
    #[arg(long = "set-free-data")]
    set_free_data: Option<String>,

    /// Drop the sample-identifier block from the output
    #[arg(long = "omit-sample-identifier-block")]
    omit_sample_identifier_block: bool,
}

/// Long flags also accepted in the classic single-dash spelling.
const LONG_FLAGS: &[&str] = &[
    "bgen",
    "og",
    "clobber",
    "set-free-data",
    "omit-sample-identifier-block",
    "help",
];

fn main() {
    env_logger::init();
    if let Err(report) = run() {
        eprintln!("!! {report:#}");
        std::process::exit(-1);
    }
}

fn run() -> color_eyre::Result<()> {
    let args = Args::parse_from(normalize_single_dash_flags(std::env::args_os(), LONG_FLAGS));
    concatenate(
        &args.inputs,
        &args.output,
        args.clobber,
        args.set_free_data.as_deref(),
        args.omit_sample_identifier_block,
    )?;
    Ok(())
}
