//! Whole-file operations: concatenation, free-data replacement, and
//! sample-identifier removal.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::info;

use crate::bgen::header::Header;
use crate::error::{BgenError, Result};

/// Concatenates the variant streams of `inputs` into `output`. Every input
/// must agree with the first on sample count and flags; the output header
/// reports the summed variant count.
pub fn concatenate(
    inputs: &[impl AsRef<Path>],
    output: &Path,
    clobber: bool,
    set_free_data: Option<&str>,
    omit_sample_identifier_block: bool,
) -> Result<()> {
    let first_path = inputs
        .first()
        .ok_or_else(|| BgenError::OptionError("no input files given".into()))?
        .as_ref();
    if output.exists() && !clobber {
        return Err(BgenError::OptionError(format!(
            "output file {} already exists (pass --clobber to overwrite)",
            output.display()
        )));
    }

    let mut first = BufReader::new(File::open(first_path)?);
    let first_header = Header::read_header(&mut first)?;

    let mut out_header = first_header.clone();
    if let Some(free_data) = set_free_data {
        out_header.free_data = free_data.as_bytes().to_vec();
    }
    let sample_block_length = if omit_sample_identifier_block {
        out_header.header_flags.sample_id_present = false;
        0
    } else {
        first_header.start_data_offset - first_header.header_size()
    };
    out_header.start_data_offset = out_header.header_size() + sample_block_length;

    let mut writer = BufWriter::new(File::create(output)?);
    out_header.write_header(&mut writer)?;
    if !omit_sample_identifier_block {
        let mut sample_block = vec![0u8; sample_block_length as usize];
        first.read_exact(&mut sample_block)?;
        writer.write_all(&sample_block)?;
    }
    drop(first);

    let mut variant_total = 0u32;
    for input in inputs {
        let input = input.as_ref();
        let mut reader = BufReader::new(File::open(input)?);
        let header = Header::read_header(&mut reader)?;
        if header.sample_num != first_header.sample_num {
            return Err(BgenError::OptionError(format!(
                "{} has {} samples, {} has {}",
                input.display(),
                header.sample_num,
                first_path.display(),
                first_header.sample_num
            )));
        }
        if header.header_flags != first_header.header_flags {
            return Err(BgenError::OptionError(format!(
                "{} and {} disagree on layout, compression, or sample identifiers",
                input.display(),
                first_path.display()
            )));
        }
        variant_total = variant_total
            .checked_add(header.variant_num)
            .ok_or_else(|| BgenError::OptionError("variant count overflows u32".into()))?;
        reader.seek(SeekFrom::Start(4 + header.start_data_offset as u64))?;
        std::io::copy(&mut reader, &mut writer)?;
    }

    // Patch the summed count; the free-data length is unchanged since the
    // header was first written, so the block is rewritten in place.
    out_header.variant_num = variant_total;
    let mut file = writer.into_inner().map_err(|e| e.into_error())?;
    file.seek(SeekFrom::Start(0))?;
    out_header.write_header(&mut file)?;
    info!(
        "wrote {} with {variant_total} variants from {} input file(s)",
        output.display(),
        inputs.len()
    );
    Ok(())
}

/// Overwrites the free-data blob in place. The replacement must have the
/// same length as the existing blob.
pub fn edit_free_data(path: &Path, new_value: &str) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let header = Header::read_header(&mut BufReader::new(&mut file))?;
    if new_value.len() != header.free_data.len() {
        return Err(BgenError::OptionError(format!(
            "free data in {} is {} bytes; replacement is {} (use cat-bgen to change the length)",
            path.display(),
            header.free_data.len(),
            new_value.len()
        )));
    }
    file.seek(SeekFrom::Start(20))?;
    file.write_all(new_value.as_bytes())?;
    Ok(())
}

/// Clears the sample-identifier flag and zeroes the identifier block.
/// Returns false (and changes nothing) when the file has no identifiers.
pub fn remove_sample_identifiers(path: &Path) -> Result<bool> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut header = Header::read_header(&mut BufReader::new(&mut file))?;
    if !header.header_flags.sample_id_present {
        return Ok(false);
    }
    header.header_flags.sample_id_present = false;
    // the flags word is the last field of the header block
    file.seek(SeekFrom::Start(header.header_size() as u64))?;
    crate::bgen::endian::write_u32(&mut file, header.header_flags.to_u32())?;
    let block_length = header.start_data_offset - header.header_size();
    file.seek(SeekFrom::Start(4 + header.header_size() as u64))?;
    file.write_all(&vec![0u8; block_length as usize])?;
    Ok(true)
}
