use std::path::PathBuf;

use clap::Parser;

use bgen_tools::cli::normalize_single_dash_flags;
use bgen_tools::edit::{edit_free_data, remove_sample_identifiers};
use bgen_tools::error::BgenError;

#[derive(Parser, Debug)]
#[command(
    name = "edit-bgen",
    about = "Edit bgen header metadata in place (dry run unless --really is given)"
)]
struct Args {
    /// bgen files to edit
    #[arg(short = 'g', long = "bgen", num_args = 1.., required = true)]
    files: Vec<PathBuf>,

    /// Replace the free-data blob (same length as the existing one)
    #[arg(long = "set-free-data")]
    set_free_data: Option<String>,

    /// Clear the sample-identifier flag and zero the identifier block
    #[arg(long = "remove-sample-identifiers")]
    remove_sample_identifiers: bool,

    /// Apply the edits instead of reporting them
    #[arg(long)]
    really: bool,
}

/// Long flags also accepted in the classic single-dash spelling.
const LONG_FLAGS: &[&str] = &[
    "bgen",
    "set-free-data",
    "remove-sample-identifiers",
    "really",
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
    if args.set_free_data.is_none() && !args.remove_sample_identifiers {
        return Err(BgenError::OptionError(
            "nothing to do: pass --set-free-data and/or --remove-sample-identifiers".into(),
        )
        .into());
    }
    for file in &args.files {
        if let Some(free_data) = &args.set_free_data {
            if args.really {
                edit_free_data(file, free_data)?;
                println!("set free data of {}", file.display());
            } else {
                println!(
                    "dry run: would set free data of {} (pass --really to apply)",
                    file.display()
                );
            }
        }
        if args.remove_sample_identifiers {
            if args.really {
                if remove_sample_identifiers(file)? {
                    println!("removed sample identifiers from {}", file.display());
                } else {
                    println!("{} carries no sample identifiers", file.display());
                }
            } else {
                println!(
                    "dry run: would remove sample identifiers from {} (pass --really to apply)",
                    file.display()
                );
            }
        }
    }
    Ok(())
}
