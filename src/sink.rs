//! Lazy, mutex-serialized sink writer
//!
//! Backed by a single `object_store::put` on close rather than a
//! streaming multipart upload: `object_store` has no standard
//! "append a line, keep the file open" primitive, so records are
//! buffered in memory and flushed once. The observable contract stays
//! simple (no artifact until the first successful write, newline-joined
//! records, optional gzip) at the cost of holding a request's full sink
//! output in memory — see DESIGN.md for the tradeoff this accepts.

use std::io::Write;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::store;
use crate::url::is_gz;

/// A lazily-opened, newline-delimited, optionally gzip-compressed sink.
///
/// Safe for concurrent producers: `write` serializes through an
/// internal `tokio::sync::Mutex`.
pub struct SinkWriter {
    url: String,
    gzip: bool,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    records: Vec<Vec<u8>>,
}

impl SinkWriter {
    /// Create a writer targeting `url`. The codec is derived from the
    /// URL's `.gz` suffix; no I/O happens until the first `write`.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let gzip = is_gz(&url);
        Self {
            url,
            gzip,
            state: Mutex::new(State::default()),
        }
    }

    /// Append `data` as one record. The first call opens the writer
    /// (lazily, on `close`); subsequent calls are separated by a
    /// single newline.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().await;
        state.records.push(data.to_vec());
        Ok(())
    }

    /// Number of records written so far.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    /// Whether no record has been written yet.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Flush buffered records to the backing URL. A no-op (no artifact
    /// produced) if zero records were written.
    pub async fn close(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.records.is_empty() {
            return Ok(());
        }

        let joined = state.records.join(&b'\n');
        let bytes = if self.gzip {
            compress(&joined)?
        } else {
            joined
        };

        let (store, path) = store::resolve(&self.url)?;
        store
            .put(&path, bytes.into())
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    /// The backing URL this writer targets.
    pub fn url(&self) -> &str {
        &self.url
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::GzEncoder;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[tokio::test]
    async fn writer_with_zero_records_produces_no_artifact() {
        let url = format!("mem://sink-test/{}.txt", uuid::Uuid::new_v4());
        let writer = SinkWriter::new(&url);
        writer.close().await.unwrap();

        let (store, path) = store::resolve(&url).unwrap();
        assert!(store.get(&path).await.is_err(), "no artifact should exist");
    }

    #[tokio::test]
    async fn writer_joins_records_with_single_newlines() {
        let url = format!("mem://sink-test/{}.txt", uuid::Uuid::new_v4());
        let writer = SinkWriter::new(&url);
        writer.write(b"a").await.unwrap();
        writer.write(b"b").await.unwrap();
        writer.write(b"c").await.unwrap();
        writer.close().await.unwrap();

        let (store, path) = store::resolve(&url).unwrap();
        let bytes = store.get(&path).await.unwrap().bytes().await.unwrap();
        assert_eq!(&bytes[..], b"a\nb\nc");
    }

    #[tokio::test]
    async fn writer_compresses_when_url_ends_in_gz() {
        let url = format!("mem://sink-test/{}.txt.gz", uuid::Uuid::new_v4());
        let writer = SinkWriter::new(&url);
        writer.write(b"hello").await.unwrap();
        writer.close().await.unwrap();

        let (store, path) = store::resolve(&url).unwrap();
        let bytes = store.get(&path).await.unwrap().bytes().await.unwrap();
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = String::new();
        decoder.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn is_empty_reflects_write_count() {
        let writer = SinkWriter::new("mem://sink-test/empty.txt");
        assert!(writer.is_empty().await);
        writer.write(b"x").await.unwrap();
        assert!(!writer.is_empty().await);
        assert_eq!(writer.len().await, 1);
    }
}
