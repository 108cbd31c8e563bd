//! Append-only CSV store of evaluation rows (`all_course_stats.csv`).
//!
//! Metadata columns come first, then one column per question title. Question
//! cells hold the histogram as a tuple-list literal, `[(1, 3), (2, 7)]`, which
//! the analytics side reads back with a literal parser.

use crate::extract::row::{EvaluationRow, META_COLUMNS};
use crate::extract::rules::ResponseCount;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("CSV store {path} has a header that doesn't start with the metadata columns")]
    ForeignHeader { path: PathBuf },
    #[error("CSV error in {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Rows and header read back from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContents {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StoreContents {
    /// Question column names, in header order.
    pub fn question_columns(&self) -> &[String] {
        self.header.get(META_COLUMNS.len()..).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is new or has no
    /// header (an empty or truncated file).
    ///
    /// Rows are never updated. If `row` has question titles the header lacks,
    /// the file is first rewritten with those columns added (existing rows get
    /// empty cells), so every row stays aligned with the header.
    pub fn append(&self, row: &EvaluationRow) -> Result<(), StoreError> {
        let header = if let Some(current) = self.read_header()? {
            let missing: Vec<String> = row
                .questions
                .keys()
                .filter(|title| !current.contains(title))
                .cloned()
                .collect();
            if missing.is_empty() {
                current
            } else {
                self.widen(current, &missing)?
            }
        } else {
            let header: Vec<String> = META_COLUMNS
                .iter()
                .map(|c| c.to_string())
                .chain(row.questions.keys().cloned())
                .collect();
            self.write_all(&header, &[])?;
            info!(path = %self.path.display(), columns = header.len(), "Created CSV store");
            header
        };

        let record = align_row(row, &header);
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer
            .write_record(&record)
            .map_err(|source| self.csv_error(source))?;
        writer.flush().map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// Read every row. A missing file reads as empty.
    pub fn read_all(&self) -> Result<StoreContents, StoreError> {
        if !self.path.exists() {
            return Ok(StoreContents::default());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.csv_error(source))?;
        let header = reader
            .headers()
            .map_err(|source| self.csv_error(source))?
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(str::to_string).collect())
                    .map_err(|source| self.csv_error(source))
            })
            .collect::<Result<Vec<Vec<String>>, _>>()?;

        Ok(StoreContents { header, rows })
    }

    /// The existing header, or `None` when there is no file or no header row.
    fn read_header(&self) -> Result<Option<Vec<String>>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|source| self.csv_error(source))?;
        let header: Vec<String> = reader
            .headers()
            .map_err(|source| self.csv_error(source))?
            .iter()
            .map(str::to_string)
            .collect();

        if header.iter().all(|column| column.trim().is_empty()) {
            debug!(path = %self.path.display(), "CSV store has no header yet");
            return Ok(None);
        }
        if !header.iter().map(String::as_str).take(META_COLUMNS.len()).eq(META_COLUMNS) {
            return Err(StoreError::ForeignHeader {
                path: self.path.clone(),
            });
        }
        Ok(Some(header))
    }

    /// Rewrite the store with `missing` appended to the header.
    fn widen(&self, mut header: Vec<String>, missing: &[String]) -> Result<Vec<String>, StoreError> {
        let contents = self.read_all()?;
        header.extend_from_slice(missing);

        let rows: Vec<Vec<String>> = contents
            .rows
            .into_iter()
            .map(|mut r| {
                r.resize(header.len(), String::new());
                r
            })
            .collect();
        self.write_all(&header, &rows)?;

        debug!(path = %self.path.display(), added = ?missing, "Widened CSV header");
        Ok(header)
    }

    /// Write header and rows to a sibling temp file, then rename over the store.
    fn write_all(&self, header: &[String], rows: &[Vec<String>]) -> Result<(), StoreError> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = self.path.with_file_name(tmp_name);

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let mut writer = csv::Writer::from_path(&tmp).map_err(|source| self.csv_error(source))?;
        writer
            .write_record(header)
            .map_err(|source| self.csv_error(source))?;
        for row in rows {
            writer
                .write_record(row)
                .map_err(|source| self.csv_error(source))?;
        }
        writer.flush().map_err(|source| self.io_error(source))?;
        drop(writer);

        fs::rename(&tmp, &self.path).map_err(|source| self.io_error(source))
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Lay the row out along `header`; questions the row lacks get empty cells.
fn align_row(row: &EvaluationRow, header: &[String]) -> Vec<String> {
    let questions = header[META_COLUMNS.len()..].iter().map(|column| {
        row.questions
            .get(column)
            .map(|pairs| format_pairs(pairs))
            .unwrap_or_default()
    });
    row.meta_values().into_iter().chain(questions).collect()
}

/// `[(1, 3), (2, 7)]`
pub fn format_pairs(pairs: &[ResponseCount]) -> String {
    let inner: Vec<String> = pairs
        .iter()
        .map(|(weight, count)| format!("({weight}, {count})"))
        .collect();
    format!("[{}]", inner.join(", "))
}

/// Parse a tuple-list cell back into pairs. Empty cells parse as `None`.
pub fn parse_pairs(cell: &str) -> Option<Vec<ResponseCount>> {
    static PAIR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\(\s*(\d+)\s*,\s*(\d+)\s*\)").unwrap());

    let cell = cell.trim();
    if !(cell.starts_with('[') && cell.ends_with(']')) {
        return None;
    }

    PAIR_RE
        .captures_iter(cell)
        .map(|caps| Some((caps[1].parse().ok()?, caps[2].parse().ok()?)))
        .collect()
}
