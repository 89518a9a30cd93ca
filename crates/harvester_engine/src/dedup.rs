//! Crash-safe record persistence.
//!
//! Accepted records are appended to a per-run NDJSON log and synced one line
//! at a time. At the end of the run the log is compacted into a single
//! document keyed by identifier, and the log is removed.
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, SecondsFormat, Utc};
use engine_logging::{engine_debug, engine_info, engine_warn};
use harvester_core::PersistedRecord;
use serde::{Deserialize, Serialize};

use crate::persist::{ensure_output_dir, AtomicFileWriter, PersistError};

/// The compacted run document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactedDocument {
    pub scraped_at: String,
    pub record_count: usize,
    pub records: Vec<PersistedRecord>,
}

/// Unique records read from a log, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compaction {
    pub records: Vec<PersistedRecord>,
    pub total_lines: usize,
    pub malformed_lines: usize,
}

impl Compaction {
    pub fn identifiers(&self) -> Vec<&str> {
        self.records.iter().map(PersistedRecord::identifier).collect()
    }

    pub fn into_document(self) -> CompactedDocument {
        CompactedDocument {
            scraped_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            record_count: self.records.len(),
            records: self.records,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub document: CompactedDocument,
    pub output_path: PathBuf,
}

/// `{tmp_dir}/{prefix}_{YYYY-MM-DD}.ndjson`
pub fn log_path(tmp_dir: &Path, prefix: &str, target_date: NaiveDate) -> PathBuf {
    tmp_dir.join(format!("{prefix}_{}.ndjson", target_date.format("%Y-%m-%d")))
}

/// `{prefix}_{YYYY-MM-DD}_meta.json`
pub fn document_filename(prefix: &str, target_date: NaiveDate) -> String {
    format!("{prefix}_{}_meta.json", target_date.format("%Y-%m-%d"))
}

/// Append side of the log. Identifier uniqueness is checked by the caller
/// before [`DedupPersistence::accept`].
#[derive(Debug)]
pub struct DedupPersistence {
    path: PathBuf,
    file: File,
    lines_written: usize,
}

impl DedupPersistence {
    /// Opens `path` for appending; lines from an earlier attempt are kept.
    pub fn open(path: PathBuf) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent() {
            ensure_output_dir(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            lines_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines appended through this handle.
    pub fn lines_written(&self) -> usize {
        self.lines_written
    }

    pub fn accept(&mut self, record: &PersistedRecord) -> Result<(), PersistError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()?;
        self.lines_written += 1;
        Ok(())
    }
}

/// Reads the log and keeps one record per identifier (the last one written).
/// Blank and malformed lines are skipped. A missing log compacts to nothing.
pub fn compact(path: &Path) -> Result<Compaction, PersistError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            engine_warn!("No NDJSON log at {:?}; compacting an empty run", path);
            return Ok(Compaction {
                records: Vec::new(),
                total_lines: 0,
                malformed_lines: 0,
            });
        }
        Err(err) => return Err(err.into()),
    };

    let mut records: Vec<PersistedRecord> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut total_lines = 0;
    let mut malformed_lines = 0;

    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        total_lines += 1;
        let record: PersistedRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(err) => {
                engine_debug!("Skipping malformed NDJSON line in {:?}: {}", path, err);
                malformed_lines += 1;
                continue;
            }
        };
        match positions.get(record.identifier()) {
            Some(&index) => records[index] = record,
            None => {
                positions.insert(record.identifier().to_string(), records.len());
                records.push(record);
            }
        }
    }

    Ok(Compaction {
        records,
        total_lines,
        malformed_lines,
    })
}

/// Compacts the log into `{writer dir}/{filename}` and removes the log.
/// Removal is best effort.
pub fn finalize(
    log_path: &Path,
    writer: &AtomicFileWriter,
    filename: &str,
) -> Result<Finalized, PersistError> {
    let compaction = compact(log_path)?;
    let total_lines = compaction.total_lines;
    let document = compaction.into_document();
    let output_path = writer.write_json(filename, &document)?;
    engine_info!(
        "Wrote run document to {:?} (raw_ndjson_total={} unique={})",
        output_path,
        total_lines,
        document.record_count
    );

    match fs::remove_file(log_path) {
        Ok(()) => engine_debug!("Removed NDJSON log {:?}", log_path),
        Err(err) => engine_warn!("Could not remove NDJSON log {:?}: {}", log_path, err),
    }

    Ok(Finalized {
        document,
        output_path,
    })
}
