//! Output paths for queried variants: raw byte-range copy (no transcode),
//! layout-2 to layout-1, and VCF text.

pub mod v11;
pub mod vcf;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::bgen::endian::write_all;
use crate::bgen::header::Header;
use crate::error::{BgenError, Result};
use crate::index::query::Plan;

/// Reads the verbatim sample-identifier block bytes (possibly empty) that
/// sit between the header block and the variant stream.
pub fn read_sample_block_bytes(source: &Path, header: &Header) -> Result<Vec<u8>> {
    let mut file = File::open(source)?;
    file.seek(SeekFrom::Start(4 + header.header_size() as u64))?;
    let length = (header.start_data_offset - header.header_size()) as usize;
    let mut bytes = vec![0u8; length];
    file.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// The no-transcode path: copies the header (with the variant count
/// replaced by the plan's size), the sample-identifier block, and every
/// plan entry's raw bytes. Pays no decode cost.
pub fn write_filtered_bgen<W: Write>(
    source: &Path,
    header: &Header,
    plan: &Plan,
    writer: &mut W,
) -> Result<()> {
    let mut out_header = header.clone();
    out_header.variant_num = plan.number_of_variants() as u32;
    out_header.write_header(writer)?;
    write_all(writer, &read_sample_block_bytes(source, header)?, "sample block")?;

    let mut file = File::open(source)?;
    for &(file_start, length) in plan.entries() {
        file.seek(SeekFrom::Start(file_start))?;
        let copied = std::io::copy(&mut (&mut file).take(length), writer)?;
        if copied != length {
            return Err(BgenError::TruncatedInput {
                what: "variant byte range",
                source: std::io::Error::from(std::io::ErrorKind::UnexpectedEof),
            });
        }
    }
    Ok(())
}
