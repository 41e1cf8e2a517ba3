//! Sort / Group / Batch pre-processor
//!
//! Delimited-field extraction uses the `csv` crate instead of
//! hand-rolled delimiter splitting, for correctness with quoted
//! fields; structured (JSON-line) extraction uses `serde_json::Value`.

use std::cmp::Ordering;
use std::io::Cursor;

use crate::config::{SortConfig, SortKey};

/// Reorder `lines` (already split on `\n`, no terminators) according
/// to `spec`, honoring per-key numeric-vs-lexicographic comparison.
/// An empty input returns an empty output. Multi-field comparison is
/// stable: ties on all declared keys preserve input order.
pub fn order(lines: &[Vec<u8>], spec: &SortConfig) -> Vec<Vec<u8>> {
    if spec.by.is_empty() || lines.is_empty() {
        return lines.to_vec();
    }

    let keyed: Vec<(Vec<Field>, &Vec<u8>)> = lines
        .iter()
        .map(|line| (extract_keys(line, spec), line))
        .collect();

    let mut indices: Vec<usize> = (0..keyed.len()).collect();
    indices.sort_by(|&a, &b| compare_fields(&keyed[a].0, &keyed[b].0));
    indices.into_iter().map(|i| keyed[i].1.clone()).collect()
}

/// A parsed sort-key value: either a numeric or a string comparison key.
enum Field {
    Numeric(i64),
    Text(String),
}

fn extract_keys(line: &[u8], spec: &SortConfig) -> Vec<Field> {
    spec.by
        .iter()
        .map(|key| extract_key(line, key, &spec.delimiter))
        .collect()
}

fn extract_key(line: &[u8], key: &SortKey, delimiter: &str) -> Field {
    let raw = if key.name.is_empty() {
        delimited_field(line, key.index, delimiter)
    } else {
        structured_field(line, &key.name).unwrap_or_else(|| delimited_field(line, key.index, delimiter))
    };

    if key.is_numeric {
        Field::Numeric(raw.trim().parse().unwrap_or(0))
    } else {
        Field::Text(raw)
    }
}

fn delimited_field(line: &[u8], index: usize, delimiter: &str) -> String {
    let delim_byte = delimiter.as_bytes().first().copied().unwrap_or(b',');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delim_byte)
        .has_headers(false)
        .from_reader(Cursor::new(line));
    if let Some(Ok(record)) = reader.records().next() {
        record.get(index).unwrap_or("").to_string()
    } else {
        String::new()
    }
}

fn structured_field(line: &[u8], name: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(line).ok()?;
    value.get(name).map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn compare_fields(a: &[Field], b: &[Field]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x, y) {
            (Field::Numeric(x), Field::Numeric(y)) => x.cmp(y),
            (Field::Text(x), Field::Text(y)) => x.cmp(y),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// The first key's raw string value for `line`, used by the
/// group-by-first-key batcher to detect key changes.
pub fn first_key_value(line: &[u8], spec: &SortConfig) -> Option<String> {
    let key = spec.by.first()?;
    Some(match extract_key(line, key, &spec.delimiter) {
        Field::Numeric(n) => n.to_string(),
        Field::Text(s) => s,
    })
}

/// Accumulates records into batches, either by fixed `batch_size` or
/// by contiguous runs sharing the first sort key's value: the prior
/// group is emitted *before* the new record starts a fresh group.
pub struct Batcher {
    batch_size: usize,
    group_by_key: bool,
    current_key: Option<String>,
    pending: Vec<Vec<u8>>,
}

impl Batcher {
    /// Construct a batcher from a [`SortConfig`] and the configured batch size.
    pub fn new(spec: &SortConfig, batch_size: usize) -> Self {
        Self {
            batch_size,
            group_by_key: spec.batch && !spec.by.is_empty(),
            current_key: None,
            pending: Vec::new(),
        }
    }

    /// Feed one record. Returns a completed batch (joined by `\n`) if
    /// this record closed one out, otherwise `None`.
    pub fn push(&mut self, line: Vec<u8>, spec: &SortConfig) -> Option<Vec<u8>> {
        if self.group_by_key {
            let key = first_key_value(&line, spec);
            if self.current_key.is_some() && self.current_key != key && !self.pending.is_empty() {
                let flushed = self.flush();
                self.current_key = key;
                self.pending.push(line);
                return Some(flushed);
            }
            self.current_key = key;
            self.pending.push(line);
            if self.batch_size > 0 && self.pending.len() >= self.batch_size {
                return Some(self.flush());
            }
            None
        } else if self.batch_size > 0 {
            self.pending.push(line);
            if self.pending.len() >= self.batch_size {
                Some(self.flush())
            } else {
                None
            }
        } else {
            Some(line)
        }
    }

    /// Flush any remaining partial batch (called once the loader reaches end-of-stream).
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }

    fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending).join(&b'\n')
    }
}
