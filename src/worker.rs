//! Fixed-size concurrent worker pool
//!
//! `Concurrency` workers share one `mpsc::Receiver<Record>` behind a
//! `tokio::sync::Mutex`; each free worker slot pulls the next record
//! off the channel rather than a dispatcher assigning work. Deadline
//! enforcement is cooperative and between-records only: before calling
//! the processor, a worker checks whether the worker deadline has
//! passed and diverts the record to retry without invoking it. A
//! processor call already in flight is never raced against the
//! deadline or aborted — it always runs to completion; only the next
//! record pulled from the channel observes a passed deadline.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};

use crate::deadline::Deadlines;
use crate::error::ErrorKind;
use crate::processor::Processor;
use crate::record::Record;
use crate::reporter::{ErrorKindBit, Reporter};
use crate::sink::SinkWriter;

/// Run `concurrency` workers draining `rx`, routing each record's
/// outcome to `retry_sink`/`corruption_sink`. Returns once every
/// worker has observed a closed channel and drained.
pub async fn run_pool(
    rx: mpsc::Receiver<Record>,
    concurrency: usize,
    deadlines: Deadlines,
    processor: Arc<dyn Processor>,
    retry_sink: Arc<SinkWriter>,
    corruption_sink: Arc<SinkWriter>,
    reporter: Arc<dyn Reporter>,
) {
    let rx = Arc::new(Mutex::new(rx));
    let mut handles = Vec::with_capacity(concurrency);

    for _ in 0..concurrency {
        let rx = rx.clone();
        let processor = processor.clone();
        let retry_sink = retry_sink.clone();
        let corruption_sink = corruption_sink.clone();
        let reporter = reporter.clone();

        handles.push(tokio::spawn(async move {
            worker_loop(rx, deadlines, processor, retry_sink, corruption_sink, reporter).await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn worker_loop(
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
    deadlines: Deadlines,
    processor: Arc<dyn Processor>,
    retry_sink: Arc<SinkWriter>,
    corruption_sink: Arc<SinkWriter>,
    reporter: Arc<dyn Reporter>,
) {
    loop {
        let record = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(record) = record else { break };

        process_one(
            &record,
            &deadlines,
            processor.as_ref(),
            &retry_sink,
            &corruption_sink,
            reporter.as_ref(),
        )
        .await;
    }
}

/// The per-record protocol: diverts records arriving after the worker
/// deadline, otherwise invokes the processor and classifies its
/// outcome into the destination/retry/corruption split. The deadline
/// check only ever gates *admission* of a record between iterations —
/// an in-flight processor call always runs to completion; the next
/// record pulled after the deadline is what gets diverted.
async fn process_one(
    record: &Record,
    deadlines: &Deadlines,
    processor: &dyn Processor,
    retry_sink: &SinkWriter,
    corruption_sink: &SinkWriter,
    reporter: &dyn Reporter,
) {
    if deadlines.worker_expired(Instant::now()) {
        divert_on_deadline(record, retry_sink, reporter).await;
        return;
    }

    match processor.process(record, reporter).await {
        Ok(()) => reporter.add_processed(1),
        Err(err) => classify(record, err, retry_sink, corruption_sink, reporter).await,
    }
}

async fn divert_on_deadline(record: &Record, retry_sink: &SinkWriter, reporter: &dyn Reporter) {
    reporter.record_error(ErrorKindBit::Retry, "worker deadline exceeded");
    if let Err(err) = retry_sink.write(&record.to_line()).await {
        reporter.add_retry_write_error(&err.to_string());
    }
}

async fn classify(
    record: &Record,
    err: crate::error::ProcessError,
    retry_sink: &SinkWriter,
    corruption_sink: &SinkWriter,
    reporter: &dyn Reporter,
) {
    use crate::error::ProcessError;

    match err {
        ProcessError::DataCorruption(message) => {
            reporter.record_error(ErrorKindBit::Corrupted, &message);
            if let Err(write_err) = corruption_sink.write(&record.to_line()).await {
                reporter.add_corruption_write_error(&write_err.to_string());
            }
        }
        ProcessError::PartialRetry {
            message,
            data: Some(replacement),
        } => {
            reporter.add_processed(1);
            reporter.record_error(ErrorKindBit::Retry, &message);
            if let Err(write_err) = retry_sink.write(&replacement).await {
                reporter.add_retry_write_error(&write_err.to_string());
            }
        }
        ProcessError::PartialRetry { message, data: None } => {
            reporter.record_error(ErrorKindBit::Retry, &message);
            if let Err(write_err) = retry_sink.write(&record.to_line()).await {
                reporter.add_retry_write_error(&write_err.to_string());
            }
        }
        ProcessError::Retriable(message) => {
            debug_assert_eq!(ProcessError::Retriable(message.clone()).kind(), ErrorKind::Retry);
            reporter.record_error(ErrorKindBit::Retry, &message);
            if let Err(write_err) = retry_sink.write(&record.to_line()).await {
                reporter.add_retry_write_error(&write_err.to_string());
            }
        }
    }
}
