//! Persistent index sidecar: a sqlite file with a `Metadata` fingerprint
//! row and one `Variant` row per variant of the data file.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags};

use crate::bgen::bgen_stream::{BgenStream, FileMetadata};
use crate::error::{BgenError, Result};

pub const DEFAULT_TABLE: &str = "Variant";
/// Variants inserted per transaction during a build.
const COMMIT_CHUNK: u32 = 10;

pub struct IndexStore {
    conn: Connection,
    table: String,
}

fn validated_table_name(table: &str) -> Result<String> {
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(BgenError::OptionError(format!(
            "table name '{table}' must be alphanumeric"
        )));
    }
    Ok(table.to_string())
}

impl IndexStore {
    /// Opens an existing index read-only.
    pub fn open(path: &Path, table: &str) -> Result<IndexStore> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(IndexStore {
            conn,
            table: validated_table_name(table)?,
        })
    }

    /// Creates a fresh index database with build pragmas applied. Crash
    /// recovery is delete-and-retry, so durability of a partial build has
    /// no value.
    fn create(path: &Path, table: &str, with_rowid: bool) -> Result<IndexStore> {
        let conn = Connection::open(path)?;
        conn.query_row("PRAGMA locking_mode = EXCLUSIVE", [], |_| Ok(()))?;
        conn.query_row("PRAGMA journal_mode = MEMORY", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = OFF")?;
        let table = validated_table_name(table)?;
        let rowid_clause = if with_rowid { "" } else { " WITHOUT ROWID" };
        conn.execute_batch(&format!(
            "CREATE TABLE Metadata (
                filename TEXT NOT NULL,
                file_size INT NOT NULL,
                last_write_time INT NOT NULL,
                first_1000_bytes BLOB NOT NULL,
                index_creation_time TEXT NOT NULL
            );
            CREATE TABLE {table} (
                chromosome TEXT NOT NULL,
                position INT NOT NULL,
                rsid TEXT NOT NULL,
                number_of_alleles INT NOT NULL,
                allele1 TEXT NOT NULL,
                allele2 TEXT NOT NULL,
                file_start_position INT NOT NULL,
                size_in_bytes INT NOT NULL,
                PRIMARY KEY (chromosome, position, rsid, allele1, allele2, file_start_position)
            ){rowid_clause};"
        ))?;
        Ok(IndexStore { conn, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn write_metadata(&self, metadata: &FileMetadata) -> Result<()> {
        self.conn.execute(
            "INSERT INTO Metadata (filename, file_size, last_write_time, first_1000_bytes,
                                   index_creation_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                metadata.filename,
                metadata.file_size as i64,
                metadata.last_write_time,
                metadata.first_1000_bytes,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The fingerprint of the data file this index was built over.
    pub fn file_metadata(&self) -> Result<FileMetadata> {
        self.conn
            .query_row(
                "SELECT filename, file_size, last_write_time, first_1000_bytes FROM Metadata",
                [],
                |row| {
                    Ok(FileMetadata {
                        filename: row.get(0)?,
                        file_size: row.get::<_, i64>(1)? as u64,
                        last_write_time: row.get(2)?,
                        first_1000_bytes: row.get(3)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    BgenError::IndexCorrupt("the Metadata table is empty".into())
                }
                other => BgenError::Sqlite(other),
            })
    }
}

/// Streams the data file and writes its index under a temporary name,
/// renaming into place on success. Returns the number of variants indexed.
pub fn build_index(
    bgen_path: &Path,
    index_path: &Path,
    table: &str,
    clobber: bool,
    with_rowid: bool,
) -> Result<u64> {
    let tmp_path = PathBuf::from(format!("{}.tmp", index_path.display()));
    if !clobber {
        if index_path.exists() {
            return Err(BgenError::IndexExists(index_path.to_path_buf()));
        }
        if tmp_path.exists() {
            return Err(BgenError::IndexExists(tmp_path.clone()));
        }
    }
    if tmp_path.exists() {
        std::fs::remove_file(&tmp_path)?;
    }

    let result = build_into(bgen_path, &tmp_path, table, with_rowid);
    match result {
        Ok(count) => {
            std::fs::rename(&tmp_path, index_path)?;
            info!(
                "indexed {count} variants from {} into {}",
                bgen_path.display(),
                index_path.display()
            );
            Ok(count)
        }
        Err(e) => {
            // a partial index is worthless
            let _ = std::fs::remove_file(&tmp_path);
            Err(e)
        }
    }
}

fn build_into(bgen_path: &Path, tmp_path: &Path, table: &str, with_rowid: bool) -> Result<u64> {
    let mut stream = BgenStream::from_path(bgen_path)?;
    let store = IndexStore::create(tmp_path, table, with_rowid)?;
    store.write_metadata(&stream.metadata)?;

    let insert_sql = format!(
        "INSERT INTO {} (chromosome, position, rsid, number_of_alleles, allele1, allele2,
                         file_start_position, size_in_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        store.table()
    );
    let bar = ProgressBar::new(stream.header.variant_num as u64);
    let mut count = 0u64;
    let mut in_transaction = 0u32;
    let mut tx = store.conn.unchecked_transaction()?;
    loop {
        let file_start = stream.position()?;
        let variant = match stream.read_variant() {
            Ok(Some(variant)) => variant,
            Ok(None) => break,
            Err(e) => {
                return Err(BgenError::InvalidVariantRecord(format!(
                    "while indexing the variant at byte {file_start}: {e}"
                )))
            }
        };
        stream.ignore_data_block().map_err(|e| {
            BgenError::InvalidVariantRecord(format!(
                "while indexing {} at byte {file_start}: {e}",
                variant.rsid
            ))
        })?;
        let size_in_bytes = stream.position()? - file_start;
        debug!(
            "indexing {} {}:{} at {file_start} ({size_in_bytes} bytes)",
            variant.rsid, variant.chr, variant.pos
        );
        tx.prepare_cached(&insert_sql)?.execute(params![
            variant.chr,
            variant.pos as i64,
            variant.rsid,
            variant.number_alleles as i64,
            variant.alleles[0],
            variant.alleles[1],
            file_start as i64,
            size_in_bytes as i64,
        ])?;
        count += 1;
        in_transaction += 1;
        if in_transaction == COMMIT_CHUNK {
            tx.commit()?;
            tx = store.conn.unchecked_transaction()?;
            in_transaction = 0;
        }
        bar.inc(1);
    }
    tx.commit()?;
    bar.finish();
    Ok(count)
}
