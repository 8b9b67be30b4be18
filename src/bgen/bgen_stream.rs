//! Stateful reader over a bgen file: header once, then a cursor advancing
//! through variants, optionally driven by an index query plan.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::UNIX_EPOCH;

use log::warn;

use crate::bgen::compression::Compression;
use crate::bgen::endian::{read_string_u16, read_u32, write_string_u16, write_u32};
use crate::bgen::header::Header;
use crate::bgen::probability::{parse_probability_data, PackedDataBlock, ProbabilitySink};
use crate::bgen::variant_data::VariantData;
use crate::error::{BgenError, Result};
use crate::index::query::Plan;

/// Identity of a data file, bound into the index at build time and
/// re-verified at query time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub file_size: u64,
    pub last_write_time: i64,
    pub first_1000_bytes: Vec<u8>,
}

impl FileMetadata {
    pub fn capture(path: &Path) -> Result<FileMetadata> {
        let meta = std::fs::metadata(path)?;
        let last_write_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let mut file = File::open(path)?;
        let mut first_1000_bytes = vec![0u8; meta.len().min(1000) as usize];
        file.read_exact(&mut first_1000_bytes)?;
        Ok(FileMetadata {
            filename: path.display().to_string(),
            file_size: meta.len(),
            last_write_time,
            first_1000_bytes,
        })
    }

    /// Checks a stored fingerprint (`self`) against the data file's current
    /// one. Size and leading bytes are authoritative; the write time alone
    /// only warrants a warning.
    pub fn verify_against(&self, current: &FileMetadata) -> Result<()> {
        if self.file_size != current.file_size {
            return Err(BgenError::IndexStale(format!(
                "{} is {} bytes, index was built over {} bytes",
                current.filename, current.file_size, self.file_size
            )));
        }
        if self.first_1000_bytes != current.first_1000_bytes {
            return Err(BgenError::IndexStale(format!(
                "the first bytes of {} changed since the index was built",
                current.filename
            )));
        }
        if self.last_write_time != current.last_write_time {
            warn!(
                "{} was touched since its index was built (mtime {} vs {}); contents look unchanged",
                current.filename, current.last_write_time, self.last_write_time
            );
        }
        Ok(())
    }
}

pub fn sample_block_length(samples: &[String]) -> u32 {
    8 + samples.len() as u32 * 2 + samples.iter().map(|s| s.len() as u32).sum::<u32>()
}

/// Writes the sample-identifier block: its byte length, the sample count,
/// then one length-prefixed identifier per sample.
pub fn write_samples<W: std::io::Write>(
    samples: &[String],
    writer: &mut W,
    len_sample_block: u32,
) -> Result<()> {
    write_u32(writer, len_sample_block)?;
    write_u32(writer, samples.len() as u32)?;
    for sample in samples {
        write_string_u16(writer, sample, "sample identifier")?;
    }
    Ok(())
}

fn read_samples<R: Read>(reader: &mut R, expected: u32) -> Result<Vec<String>> {
    let _block_length = read_u32(reader)?;
    let count = read_u32(reader)?;
    if count != expected {
        return Err(BgenError::InvalidVariantRecord(format!(
            "sample block lists {count} samples, header says {expected}"
        )));
    }
    (0..count)
        .map(|_| read_string_u16(reader, "sample identifier"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    AtVariantId,
    AtDataBlock,
}

/// Reader over one bgen file.
pub struct BgenStream {
    reader: BufReader<File>,
    pub header: Header,
    pub metadata: FileMetadata,
    samples: Vec<String>,
    state: StreamState,
    plan: Option<Plan>,
    next_plan_entry: usize,
}

impl BgenStream {
    pub fn from_path(path: impl AsRef<Path>) -> Result<BgenStream> {
        let path = path.as_ref();
        let metadata = FileMetadata::capture(path)?;
        let mut reader = BufReader::new(File::open(path)?);
        let header = Header::read_header(&mut reader)?;
        let samples = if header.header_flags.sample_id_present {
            read_samples(&mut reader, header.sample_num)?
        } else {
            Vec::new()
        };
        // The variant stream starts at a fixed offset from the header, so a
        // zeroed-out sample block is simply skipped.
        reader.seek(SeekFrom::Start(4 + header.start_data_offset as u64))?;
        Ok(BgenStream {
            reader,
            header,
            metadata,
            samples,
            state: StreamState::AtVariantId,
            plan: None,
            next_plan_entry: 0,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.samples
    }

    pub fn has_sample_identifiers(&self) -> bool {
        self.header.header_flags.sample_id_present
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.reader.stream_position()?)
    }

    /// Subsequent `read_variant` calls serve the plan's entries in order,
    /// seeking before each one.
    pub fn set_query(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.next_plan_entry = 0;
        self.state = StreamState::AtVariantId;
    }

    /// Advances past the next variant's identifying block, leaving the
    /// cursor at the start of its probability block. Returns `None` when
    /// the file (or the attached plan) is exhausted.
    pub fn read_variant(&mut self) -> Result<Option<VariantData>> {
        if let Some(plan) = &self.plan {
            let Some((file_start, length)) = plan.locate_variant(self.next_plan_entry) else {
                return Ok(None);
            };
            self.next_plan_entry += 1;
            self.reader.seek(SeekFrom::Start(file_start))?;
            let mut variant = VariantData::read_identifying_data(&mut self.reader, &self.header)?;
            variant.file_start_position = file_start;
            variant.size_in_bytes = length;
            self.state = StreamState::AtDataBlock;
            return Ok(Some(variant));
        }
        if self.state != StreamState::AtVariantId {
            return Err(BgenError::StateViolation(
                "read_variant called while a probability block is pending",
            ));
        }
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let file_start = self.reader.stream_position()?;
        let mut variant = VariantData::read_identifying_data(&mut self.reader, &self.header)?;
        variant.file_start_position = file_start;
        self.state = StreamState::AtDataBlock;
        Ok(Some(variant))
    }

    /// Skips the pending probability block using its length prefix, without
    /// decompression. Returns the number of bytes skipped.
    pub fn ignore_data_block(&mut self) -> Result<u64> {
        if self.state != StreamState::AtDataBlock {
            return Err(BgenError::StateViolation(
                "no probability block is pending",
            ));
        }
        let skipped = match self.header.header_flags.layout_id {
            1 => match self.header.header_flags.compression {
                Compression::None => {
                    let len = self.header.sample_num as u64 * 6;
                    self.reader.seek_relative(len as i64)?;
                    len
                }
                Compression::Zlib => {
                    let len = read_u32(&mut self.reader)? as u64;
                    self.reader.seek_relative(len as i64)?;
                    4 + len
                }
                Compression::Zstd => {
                    return Err(BgenError::UnsupportedCompression(
                        Compression::Zstd.to_flag_bits(),
                    ))
                }
            },
            _ => {
                let compressed_size = read_u32(&mut self.reader)? as u64;
                self.reader.seek_relative(4 + compressed_size as i64)?;
                8 + compressed_size
            }
        };
        self.state = StreamState::AtVariantId;
        Ok(skipped)
    }

    /// Reads and decompresses the pending probability block.
    fn read_data_block_payload(&mut self) -> Result<Vec<u8>> {
        if self.state != StreamState::AtDataBlock {
            return Err(BgenError::StateViolation(
                "no probability block is pending",
            ));
        }
        let flags = self.header.header_flags;
        let payload = match flags.layout_id {
            1 => {
                let expected = self.header.sample_num as usize * 6;
                match flags.compression {
                    Compression::None => {
                        let mut payload = vec![0u8; expected];
                        crate::bgen::endian::read_exact(
                            &mut self.reader,
                            &mut payload,
                            "probability block",
                        )?;
                        payload
                    }
                    Compression::Zlib => {
                        let compressed_size = read_u32(&mut self.reader)? as usize;
                        let mut packed = vec![0u8; compressed_size];
                        crate::bgen::endian::read_exact(
                            &mut self.reader,
                            &mut packed,
                            "probability block",
                        )?;
                        crate::bgen::compression::decompress(&packed, flags.compression, expected)?
                    }
                    Compression::Zstd => {
                        return Err(BgenError::UnsupportedCompression(
                            Compression::Zstd.to_flag_bits(),
                        ))
                    }
                }
            }
            _ => {
                let compressed_size = read_u32(&mut self.reader)? as usize;
                let uncompressed_size = read_u32(&mut self.reader)? as usize;
                let mut packed = vec![0u8; compressed_size];
                crate::bgen::endian::read_exact(
                    &mut self.reader,
                    &mut packed,
                    "probability block",
                )?;
                crate::bgen::compression::decompress(&packed, flags.compression, uncompressed_size)?
            }
        };
        self.state = StreamState::AtVariantId;
        Ok(payload)
    }

    /// Drives the full probability decode of the pending block against a
    /// sink.
    pub fn read_data_block(&mut self, sink: &mut impl ProbabilitySink) -> Result<()> {
        let payload = self.read_data_block_payload()?;
        parse_probability_data(
            &payload,
            self.header.header_flags.layout_id,
            self.header.sample_num,
            sink,
        )
    }

    /// Fast path: decompresses the pending layout-2 block into a
    /// [`PackedDataBlock`] without unpacking the probabilities.
    pub fn read_packed_data_block(&mut self) -> Result<PackedDataBlock> {
        if self.header.header_flags.layout_id != 2 {
            return Err(BgenError::UnsupportedLayout(
                self.header.header_flags.layout_id,
            ));
        }
        let payload = self.read_data_block_payload()?;
        let block = PackedDataBlock::parse(payload)?;
        if block.number_individuals != self.header.sample_num {
            return Err(BgenError::InvalidVariantRecord(format!(
                "probability block carries {} samples, header says {}",
                block.number_individuals, self.header.sample_num
            )));
        }
        Ok(block)
    }
}
