//! Reading script rows from CSV.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

/// One raw row and the line it started on (1-based).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    pub cells: Vec<String>,
}

/// Ordered source of raw rows. The header row is already skipped.
pub struct RecordSource<R: Read> {
    reader: csv::Reader<R>,
    label: String,
}

impl RecordSource<File> {
    pub fn open(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Ok(Self::from_reader(file, delimiter, path.display().to_string()))
    }
}

impl<R: Read> RecordSource<R> {
    /// Wrap any reader; `label` names the input in error messages.
    pub fn from_reader(reader: R, delimiter: u8, label: impl Into<String>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);
        Self {
            reader,
            label: label.into(),
        }
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => {
                let line = record.position().map_or(0, csv::Position::line);
                Some(Ok(RawRow {
                    line,
                    cells: record.iter().map(str::to_string).collect(),
                }))
            }
            Err(err) => {
                let line = err.position().map_or(0, csv::Position::line);
                Some(Err(anyhow::Error::new(err)
                    .context(format!("parse CSV row at {}:{}", self.label, line))))
            }
        }
    }
}
