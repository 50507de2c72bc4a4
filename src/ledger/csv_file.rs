use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{LedgerError, LedgerOutcome, LedgerSchema, ReconcilePolicy};
use crate::models::{Reading, Snapshot, TimestampFormat};

/// Raw contents of a ledger file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerContents {
    /// `None` when the file is missing or empty.
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

/// A ledger stored as a CSV file.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
    schema: LedgerSchema,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>, schema: LedgerSchema) -> Self {
        Self {
            path: path.into(),
            schema,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &LedgerSchema {
        &self.schema
    }

    /// Read every record. A missing file reads as empty contents.
    pub fn read(&self) -> Result<LedgerContents, LedgerError> {
        if !self.path.exists() {
            return Ok(LedgerContents::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.read_err(source))?;

        let mut records = reader.records();
        let header = match records.next() {
            Some(record) => Some(
                record
                    .map_err(|source| self.read_err(source))?
                    .iter()
                    .map(str::to_string)
                    .collect(),
            ),
            None => None,
        };

        let mut rows = Vec::new();
        for record in records {
            let record = record.map_err(|source| self.read_err(source))?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(LedgerContents { header, rows })
    }

    /// The last data row read back as a snapshot.
    pub fn last_snapshot(&self) -> Result<Option<Snapshot>, LedgerError> {
        let contents = self.read()?;
        Ok(contents
            .rows
            .last()
            .and_then(|row| self.schema.from_row(row)))
    }

    /// Merge `snapshot` into the ledger according to `policy`.
    pub fn record(
        &self,
        snapshot: &Snapshot,
        policy: ReconcilePolicy,
    ) -> Result<LedgerOutcome, LedgerError> {
        let row = self.schema.to_row(snapshot)?;

        let contents = match self.read() {
            Ok(contents) => contents,
            Err(err) if policy != ReconcilePolicy::OverwriteSameDay => {
                warn!(error = %err, "Unreadable ledger; appending without reconciliation");
                self.append_row(&row)?;
                return Ok(LedgerOutcome::Appended);
            }
            Err(err) => return Err(err),
        };

        let Some(found_header) = contents.header else {
            self.write_all(&[row])?;
            return Ok(LedgerOutcome::Created);
        };

        if !self.schema.header_matches(&found_header) {
            if policy == ReconcilePolicy::OverwriteSameDay {
                return Err(LedgerError::HeaderMismatch {
                    path: self.path.display().to_string(),
                    expected: self.schema.header(),
                    found: found_header,
                });
            }
            warn!(
                path = %self.path.display(),
                found = ?found_header,
                "Ledger header does not match configured columns; appending"
            );
            self.append_row(&row)?;
            return Ok(LedgerOutcome::Appended);
        }

        let Some(last) = contents.rows.last() else {
            self.append_row(&row)?;
            return Ok(LedgerOutcome::Created);
        };

        match policy {
            ReconcilePolicy::AlwaysAppend => {
                self.append_row(&row)?;
                Ok(LedgerOutcome::Appended)
            }
            ReconcilePolicy::OverwriteSameDay => {
                let last_ts = last.first().and_then(|cell| TimestampFormat::parse_any(cell));
                match last_ts {
                    Some(ts) if ts.date() == snapshot.date() => {
                        let mut rows = contents.rows;
                        if let Some(slot) = rows.last_mut() {
                            *slot = row;
                        }
                        self.write_all(&rows)?;
                        Ok(LedgerOutcome::Overwritten)
                    }
                    Some(_) => {
                        self.append_row(&row)?;
                        Ok(LedgerOutcome::Appended)
                    }
                    None => {
                        warn!(
                            cell = ?last.first(),
                            "Could not parse last ledger timestamp; appending"
                        );
                        self.append_row(&row)?;
                        Ok(LedgerOutcome::Appended)
                    }
                }
            }
            ReconcilePolicy::AppendOnChange => {
                if values_match(&last[1..], &row[1..]) {
                    debug!("Snapshot matches last ledger row; skipping");
                    Ok(LedgerOutcome::Skipped)
                } else {
                    self.append_row(&row)?;
                    Ok(LedgerOutcome::Appended)
                }
            }
        }
    }

    fn append_row(&self, row: &[String]) -> Result<(), LedgerError> {
        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        if needs_header {
            return self.write_all(&[row.to_vec()]);
        }

        let write = || -> io::Result<()> {
            let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
            if !ends_with_newline(&mut file)? {
                file.write_all(b"\n")?;
            }
            let mut writer = csv::Writer::from_writer(file);
            writer.write_record(row)?;
            writer.flush()?;
            Ok(())
        };
        write().map_err(|source| self.write_err(source))
    }

    /// Replace the file with the header followed by `rows`.
    ///
    /// Goes through a temp file in the same directory so a crash never
    /// leaves a truncated ledger behind.
    fn write_all(&self, rows: &[Vec<String>]) -> Result<(), LedgerError> {
        let write = || -> io::Result<()> {
            let dir = self
                .path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            fs::create_dir_all(dir)?;

            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            {
                let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
                writer.write_record(self.schema.header())?;
                for row in rows {
                    writer.write_record(row)?;
                }
                writer.flush()?;
            }
            if let Ok(existing) = fs::metadata(&self.path) {
                tmp.as_file().set_permissions(existing.permissions())?;
            }
            tmp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|source| self.write_err(source))
    }

    fn read_err(&self, source: csv::Error) -> LedgerError {
        LedgerError::Read {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn write_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Write {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn values_match(previous: &[String], current: &[String]) -> bool {
    previous.len() == current.len()
        && previous
            .iter()
            .zip(current)
            .all(|(a, b)| Reading::from_cell(a).same_value(&Reading::from_cell(b)))
}

fn ends_with_newline(file: &mut fs::File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
