//! Loader
//!
//! Reads a [`Request`]'s source into [`Record`]s and pushes them onto
//! the worker pool's channel, applying sort/group/batch pre-processing
//! to line-oriented sources and honoring the loader deadline: once
//! `Deadlines::loader` has passed, further records are redirected to
//! the retry sink and counted via `Reporter::add_load_timeout` instead
//! of being admitted to the channel.

use std::sync::Arc;
use std::time::Instant;

use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

use crate::config::SortConfig;
use crate::deadline::Deadlines;
use crate::error::{Error, ProcessError, Result};
use crate::record::{Record, RowTypeRegistry};
use crate::reporter::{ErrorKindBit, Reporter};
use crate::request::{Request, Source};
use crate::sink::SinkWriter;
use crate::sort::{self, Batcher};

/// Read `request`'s source to completion, sending [`Record`]s onto `tx`.
///
/// Always closes `tx` (by dropping it) before returning, whether the
/// source was exhausted, the loader deadline passed partway through,
/// or an error aborted the read.
pub async fn run(
    request: Request,
    sort_config: &SortConfig,
    batch_size: usize,
    deadlines: &Deadlines,
    registry: &RowTypeRegistry,
    tx: mpsc::Sender<Record>,
    retry_sink: &SinkWriter,
    reporter: &dyn Reporter,
) -> Result<()> {
    let Request {
        source, row_type, ..
    } = request;

    match source {
        Source::Stream(reader) => {
            run_stream(
                reader,
                row_type,
                sort_config,
                batch_size,
                deadlines,
                registry,
                tx,
                retry_sink,
                reporter,
            )
            .await
        }
        Source::Columnar(store, path) => {
            run_columnar(store, path, row_type, deadlines, registry, tx, retry_sink, reporter).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stream(
    mut reader: Box<dyn tokio::io::AsyncBufRead + Unpin + Send>,
    row_type: Option<String>,
    sort_config: &SortConfig,
    batch_size: usize,
    deadlines: &Deadlines,
    registry: &RowTypeRegistry,
    tx: mpsc::Sender<Record>,
    retry_sink: &SinkWriter,
    reporter: &dyn Reporter,
) -> Result<()> {
    let mut raw_lines: Vec<Vec<u8>> = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.is_empty() {
            continue;
        }

        reporter.add_loaded(1);

        if deadlines.loader_expired(Instant::now()) {
            reporter.add_load_timeout();
            retry_sink.write(&buf).await?;
            continue;
        }

        raw_lines.push(std::mem::take(&mut buf));
    }

    // Structured (json-line) sources with a declared row type are
    // decoded record-by-record; lines that fail to decode are a load
    // error, logged and dropped before sort/batch ever sees them.
    let decoded_lines = if let Some(name) = row_type.as_deref() {
        decode_structured(raw_lines, name, registry, reporter).await?
    } else {
        raw_lines
    };

    let ordered = sort::order(&decoded_lines, sort_config);

    let mut batcher = Batcher::new(sort_config, batch_size);
    for line in ordered {
        if let Some(batch) = batcher.push(line, sort_config) {
            reporter.add_batched(1);
            if tx.send(Record::Line(batch)).await.is_err() {
                return Ok(());
            }
        }
    }
    if let Some(batch) = batcher.finish() {
        reporter.add_batched(1);
        let _ = tx.send(Record::Line(batch)).await;
    }

    Ok(())
}

/// Decode each raw line via the registered `name` decoder. Lines that
/// fail to decode are a loader/decode error, not a processor-rejected
/// record — they are logged as a process error and dropped from the
/// returned set (skipping the record) rather than routed to the
/// corruption sink or propagating an `Err` for the whole load.
async fn decode_structured(
    raw_lines: Vec<Vec<u8>>,
    name: &str,
    registry: &RowTypeRegistry,
    reporter: &dyn Reporter,
) -> Result<Vec<Vec<u8>>> {
    let decoder = registry
        .get(name)
        .ok_or_else(|| Error::UnknownRowType(name.to_string()))?;

    let mut kept = Vec::with_capacity(raw_lines.len());
    for line in raw_lines {
        match decoder(&line) {
            Ok(typed) => kept.push(typed.to_line()),
            Err(err) => {
                reporter.add_skipped(1);
                reporter.record_error(ErrorKindBit::Process, &err.to_string());
            }
        }
    }
    Ok(kept)
}

#[allow(clippy::too_many_arguments)]
async fn run_columnar(
    store: Arc<dyn object_store::ObjectStore>,
    path: object_store::path::Path,
    row_type: Option<String>,
    deadlines: &Deadlines,
    registry: &RowTypeRegistry,
    tx: mpsc::Sender<Record>,
    retry_sink: &SinkWriter,
    reporter: &dyn Reporter,
) -> Result<()> {
    use futures::StreamExt;
    use parquet::arrow::ParquetRecordBatchStreamBuilder;
    use parquet::arrow::async_reader::ParquetObjectReader;

    let name = row_type.ok_or_else(|| Error::UnknownRowType("<none>".to_string()))?;
    let decoder = registry
        .get(&name)
        .ok_or_else(|| Error::UnknownRowType(name.clone()))?;

    let meta = store.head(&path).await.map_err(Error::Store)?;
    let reader = ParquetObjectReader::new(store, path.clone()).with_file_size(meta.size as u64);
    let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;
    let mut stream = builder.build()?;

    while let Some(batch) = stream.next().await {
        let batch = batch?;
        for line in batch_to_json_lines(&batch)? {
            reporter.add_loaded(1);

            if deadlines.loader_expired(Instant::now()) {
                reporter.add_load_timeout();
                retry_sink.write(&line).await?;
                continue;
            }

            match decoder(&line) {
                Ok(typed) => {
                    if tx.send(Record::Typed(typed)).await.is_err() {
                        return Ok(());
                    }
                }
                Err(err) => {
                    reporter.add_skipped(1);
                    reporter.record_error(ErrorKindBit::Process, &err.to_string());
                }
            }
        }
    }

    Ok(())
}

/// Serialize a `RecordBatch` to newline-delimited JSON rows.
fn batch_to_json_lines(batch: &arrow_array::RecordBatch) -> Result<Vec<Vec<u8>>> {
    let mut buf = Vec::new();
    {
        let mut writer = arrow::json::LineDelimitedWriter::new(&mut buf);
        writer.write_batches(&[batch])?;
        writer.finish()?;
    }
    Ok(buf
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| line.to_vec())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::any::Any;
    use std::fmt;
    use tokio::io::BufReader;

    #[derive(Debug)]
    struct RawClick(Vec<u8>);
    impl crate::record::TypedRecord for RawClick {
        fn to_line(&self) -> Vec<u8> {
            self.0.clone()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    impl fmt::Display for RawClick {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }

    fn stub_request(data: &[u8]) -> Request {
        let reader = BufReader::new(std::io::Cursor::new(data.to_vec()));
        Request::new_line_stub("mem://src/data.csv", Box::new(reader))
    }

    #[tokio::test]
    async fn loads_raw_lines_without_sort_or_batch() {
        let request = stub_request(b"a\nb\nc\n");
        let config = Config::default();
        let deadlines = Deadlines {
            request: None,
            worker: None,
            loader: None,
        };
        let registry = RowTypeRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let retry_sink = SinkWriter::new(format!("mem://loader-test/{}-retry.txt", uuid::Uuid::new_v4()));
        let reporter = crate::reporter::BaseReporter::new("mem://src/data.csv");

        run(request, &config.sort, 0, &deadlines, &registry, tx, &retry_sink, &reporter)
            .await
            .unwrap();

        let mut received = Vec::new();
        while let Some(record) = rx.recv().await {
            received.push(record.to_line());
        }
        assert_eq!(received, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(reporter.finish().loaded, 3);
    }

    #[tokio::test]
    async fn redirects_to_retry_sink_once_loader_deadline_passed() {
        let request = stub_request(b"a\nb\n");
        let config = Config::default();
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let deadlines = Deadlines {
            request: Some(past),
            worker: Some(past),
            loader: Some(past),
        };
        let registry = RowTypeRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let retry_url = format!("mem://loader-test/{}-retry.txt", uuid::Uuid::new_v4());
        let retry_sink = SinkWriter::new(&retry_url);
        let reporter = crate::reporter::BaseReporter::new("mem://src/data.csv");

        run(request, &config.sort, 0, &deadlines, &registry, tx, &retry_sink, &reporter)
            .await
            .unwrap();
        retry_sink.close().await.unwrap();

        assert!(rx.recv().await.is_none());
        let resp = reporter.finish();
        assert_eq!(resp.load_timeouts, 2);
        assert_eq!(resp.skipped, 2);
        assert_eq!(retry_sink.len().await, 2);
    }

    #[tokio::test]
    async fn batches_fixed_size_groups() {
        let request = stub_request(b"1\n2\n3\n4\n5\n");
        let mut config = Config::default();
        config.batch_size = 2;
        let deadlines = Deadlines {
            request: None,
            worker: None,
            loader: None,
        };
        let registry = RowTypeRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        let retry_sink = SinkWriter::new(format!("mem://loader-test/{}-retry.txt", uuid::Uuid::new_v4()));
        let reporter = crate::reporter::BaseReporter::new("mem://src/data.csv");

        run(
            request,
            &config.sort,
            config.batch_size,
            &deadlines,
            &registry,
            tx,
            &retry_sink,
            &reporter,
        )
        .await
        .unwrap();

        let mut batches = Vec::new();
        while let Some(record) = rx.recv().await {
            batches.push(record.to_line());
        }
        assert_eq!(
            batches,
            vec![b"1\n2".to_vec(), b"3\n4".to_vec(), b"5".to_vec()]
        );
        assert_eq!(reporter.finish().batched, 3);
    }

    #[tokio::test]
    async fn structured_decode_failure_is_a_process_error_not_corruption() {
        // A loader-side decode failure (spec §4.4/§7: a `load` error) is
        // logged as a process error and the record is skipped — it is
        // never routed to the corruption sink, which is reserved for
        // records the user processor itself rejects as `DataCorruption`.
        let request_url = "mem://src/data.json";
        let reader = BufReader::new(std::io::Cursor::new(
            b"{\"v\":1}\nbroken\n{\"v\":2}\n".to_vec(),
        ));
        let request = Request::from_stream(request_url, Some("click".to_string()), Box::new(reader));

        let mut registry = RowTypeRegistry::new();
        registry.register("click", |bytes| {
            if bytes == b"broken" {
                Err(ProcessError::corruption("not decodable").into())
            } else {
                Ok(Arc::new(RawClick(bytes.to_vec())) as Arc<dyn crate::record::TypedRecord>)
            }
        });

        let config = Config::default();
        let deadlines = Deadlines {
            request: None,
            worker: None,
            loader: None,
        };
        let (tx, mut rx) = mpsc::channel(8);
        let retry_sink = SinkWriter::new(format!("mem://loader-test/{}-retry.txt", uuid::Uuid::new_v4()));
        let reporter = crate::reporter::BaseReporter::new(request_url);

        run(request, &config.sort, 0, &deadlines, &registry, tx, &retry_sink, &reporter)
            .await
            .unwrap();

        let mut lines = Vec::new();
        while let Some(record) = rx.recv().await {
            lines.push(record.to_line());
        }
        assert_eq!(lines.len(), 2);
        let resp = reporter.finish();
        assert_eq!(resp.loaded, 3);
        assert_eq!(resp.skipped, 1);
        assert_eq!(resp.corruption_errors, 0);
        assert_eq!(resp.process_errors, 1);
        assert_eq!(resp.status, "error");
    }
}
