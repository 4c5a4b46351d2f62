use std::collections::HashSet;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::text::squash;

const BOM: char = '\u{feff}';

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordsError {
    #[error("unbalanced quote: quoted field opened on line {line} is never closed")]
    UnbalancedQuote { line: u64 },
    #[error("invalid CSV at line {line}: {reason}")]
    Csv { line: u64, reason: String },
    #[error("failed to write CSV: {0}")]
    Write(String),
}

/// One row of tabular input: `(label, value)` pairs in column order.
///
/// Schema columns come first (in schema order), followed by any extra input columns in the
/// order they appeared in the header line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DataRecord {
    fields: Vec<(String, String)>,
}

impl DataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut record = Self::new();
        for (k, v) in pairs {
            record.set(k, v);
        }
        record
    }

    /// Value for `label`, or `""` when the record has no such column.
    pub fn get(&self, label: &str) -> &str {
        self.fields
            .iter()
            .find(|(k, _)| k == label)
            .map(|(_, v)| v.as_str())
            .unwrap_or("")
    }

    pub fn set(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == label) {
            Some((_, v)) => *v = value,
            None => self.fields.push((label, value)),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when every value is the empty string.
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_empty())
    }
}

impl Serialize for DataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Parse comma-separated text into records keyed by `columns`.
///
/// The first non-blank line is the header. Header labels bind to `columns` by exact match,
/// then by [`squash`]ed match for columns still unbound; other labels are kept under their own
/// name. Missing columns read as `""`. Values are trimmed and all-empty rows are dropped.
pub fn parse_records(text: &str, columns: &[&str]) -> Result<Vec<DataRecord>, RecordsError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    check_quotes(text)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut bindings: Option<Vec<Option<String>>> = None;
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(map_csv_error)?;
        let fields: Vec<&str> = row.iter().map(str::trim).collect();
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }

        let Some(bound) = bindings.as_ref() else {
            bindings = Some(bind_headers(&fields, columns));
            continue;
        };

        let mut record = DataRecord::new();
        for column in columns {
            record.set(*column, "");
        }
        for (idx, label) in bound.iter().enumerate() {
            if let Some(label) = label {
                record.set(label.as_str(), fields.get(idx).copied().unwrap_or(""));
            }
        }
        if !record.is_blank() {
            records.push(record);
        }
    }

    log::debug!("parsed {} records", records.len());
    Ok(records)
}

/// Header line plus one line per record.
///
/// `columns` are written first, in order; labels only present in records follow in first-seen
/// order. Fields are quoted only when needed and every line ends with `\n`.
pub fn write_records(records: &[DataRecord], columns: &[&str]) -> Result<String, RecordsError> {
    let mut header: Vec<&str> = columns.to_vec();
    for record in records {
        for label in record.labels() {
            if !header.contains(&label) {
                header.push(label);
            }
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(&header)
        .map_err(|e| RecordsError::Write(e.to_string()))?;
    for record in records {
        writer
            .write_record(header.iter().map(|label| record.get(label)))
            .map_err(|e| RecordsError::Write(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| RecordsError::Write(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RecordsError::Write(e.to_string()))
}

fn bind_headers(headers: &[&str], columns: &[&str]) -> Vec<Option<String>> {
    let mut bound: Vec<Option<String>> = vec![None; headers.len()];
    let mut taken: HashSet<&str> = HashSet::new();

    for (idx, header) in headers.iter().enumerate() {
        if let Some(column) = columns.iter().find(|c| **c == *header) {
            if taken.insert(*column) {
                bound[idx] = Some((*column).to_string());
            }
        }
    }

    for column in columns {
        if taken.contains(column) {
            continue;
        }
        let key = squash(column);
        if key.is_empty() {
            continue;
        }
        let found = headers
            .iter()
            .enumerate()
            .find(|(idx, header)| bound[*idx].is_none() && squash(header) == key);
        if let Some((idx, header)) = found {
            log::debug!("CSV header {header:?} bound to column {column:?}");
            bound[idx] = Some((*column).to_string());
            taken.insert(*column);
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        if bound[idx].is_none() && !header.is_empty() && taken.insert(*header) {
            bound[idx] = Some((*header).to_string());
        }
    }
    bound
}

/// Rejects a quoted field that never closes.
///
/// The `csv` reader accepts such input and swallows the rest of the text into one field, which
/// would silently lose rows.
fn check_quotes(text: &str) -> Result<(), RecordsError> {
    let mut line: u64 = 1;
    let mut opened_on: Option<u64> = None;
    let mut at_field_start = true;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if opened_on.is_some() {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                }
                '"' => opened_on = None,
                '\n' => line += 1,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if at_field_start => {
                opened_on = Some(line);
                at_field_start = false;
            }
            ',' => at_field_start = true,
            '\n' => {
                line += 1;
                at_field_start = true;
            }
            '\r' => {}
            _ => at_field_start = false,
        }
    }

    match opened_on {
        Some(line) => Err(RecordsError::UnbalancedQuote { line }),
        None => Ok(()),
    }
}

fn map_csv_error(err: csv::Error) -> RecordsError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    RecordsError::Csv {
        line,
        reason: err.to_string(),
    }
}
