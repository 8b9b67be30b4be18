use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BgenError {
    #[error("unexpected end of input while reading {what}")]
    TruncatedInput {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {what}")]
    WriteFailed {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported bgen layout: {0}")]
    UnsupportedLayout(u8),

    #[error("unsupported compression kind in flags word: {0}")]
    UnsupportedCompression(u32),

    #[error("variant cannot be transcoded: {0}")]
    UnsupportedTranscode(String),

    #[error("invalid variant record: {0}")]
    InvalidVariantRecord(String),

    #[error("not a bgen file: bad magic bytes {0:?}")]
    BadMagic([u8; 4]),

    #[error("decompressed size mismatch (expected {expected} bytes, got {actual})")]
    CompressionMismatch { expected: usize, actual: usize },

    #[error("operation out of sequence: {0}")]
    StateViolation(&'static str),

    #[error("index file {0} already exists (pass --clobber to overwrite)")]
    IndexExists(PathBuf),

    #[error("index is stale: {0}; rebuild it with `bgenix -g FILE --index --clobber`")]
    IndexStale(String),

    #[error("index is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("bad option: {0}")]
    OptionError(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("index database error")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, BgenError>;
