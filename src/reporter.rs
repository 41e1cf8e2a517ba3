//! Reporter: per-record counters and bounded error log
//!
//! Every mutation is either an atomic counter increment or guarded by
//! the reporter's own mutex. `HandlerReporter` composes a base
//! [`Reporter`] with the selected [`Processor`], a field plus `Deref`
//! standing in for struct embedding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use utoipa::ToSchema;

use crate::error::ErrorKind;
use crate::processor::Processor;

const MAX_ERROR_MESSAGE_BYTES: usize = 256;

/// One bit of the status bitset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKindBit {
    /// A record was routed to retry
    Retry,
    /// A record was routed to corruption
    Corrupted,
    /// A processor error occurred that doesn't map to retry/corrupted directly
    Process,
    /// An error kind that doesn't fit the other three (loader/unknown errors)
    Unknown,
}

impl ErrorKindBit {
    fn label(self) -> &'static str {
        match self {
            ErrorKindBit::Retry => "retry",
            ErrorKindBit::Corrupted => "corrupted",
            ErrorKindBit::Process => "process",
            ErrorKindBit::Unknown => "error",
        }
    }
}

/// Final, publicly-reported outcome of one request.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Response {
    /// Status bitset string: "ok", "error", or a `|`-joined combination
    /// of "retry"/"corrupted"
    pub status: String,
    /// Request start time (UTC)
    pub start_time: DateTime<Utc>,
    /// Elapsed milliseconds once the request completes
    pub elapsed_ms: u64,
    /// The source URL this request was reading from
    pub source_url: String,
    /// Resolved destination URL (after template expansion)
    pub destination_url: Option<String>,
    /// Resolved retry URL
    pub retry_url: Option<String>,
    /// Resolved corruption URL
    pub corruption_url: Option<String>,
    /// Resolved mirror URL, written alongside the destination when configured
    pub mirror_url: Option<String>,

    /// Number of records read from the source
    pub loaded: i64,
    /// Number of records the user processor returned `Ok` for
    pub processed: i64,
    /// Number of batches pushed to the work channel
    pub batched: i64,
    /// Number of records skipped (includes load-timeout records)
    pub skipped: i64,
    /// Number of records redirected to retry because the loader deadline had passed
    pub load_timeouts: i64,
    /// Number of sink-write failures on the retry path
    pub retry_errors: i64,
    /// Number of records classified as retriable by the user processor
    pub retriable_errors: i64,
    /// Number of records classified as data corruption
    pub corruption_errors: i64,
    /// Number of loader/post-processor failures that don't map to a
    /// retry or corruption sink (`ErrorKindBit::Process`/`Unknown`);
    /// any of these forces the overall status to `"error"`
    pub process_errors: i64,

    /// Bounded, deduplicated-by-kind error messages (each ≤ 256 bytes)
    pub errors: Vec<String>,
}

impl Response {
    fn new(source_url: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_string(),
            start_time,
            elapsed_ms: 0,
            source_url: source_url.into(),
            destination_url: None,
            retry_url: None,
            corruption_url: None,
            mirror_url: None,
            loaded: 0,
            processed: 0,
            batched: 0,
            skipped: 0,
            load_timeouts: 0,
            retry_errors: 0,
            retriable_errors: 0,
            corruption_errors: 0,
            process_errors: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Default)]
struct Counters {
    loaded: AtomicI64,
    processed: AtomicI64,
    batched: AtomicI64,
    skipped: AtomicI64,
    load_timeouts: AtomicI64,
    retry_errors: AtomicI64,
    retriable_errors: AtomicI64,
    corruption_errors: AtomicI64,
    process_errors: AtomicI64,
}

/// Behavior shared by every reporter variant: access to the response
/// under construction, atomic counter bumps, and the bounded error log.
pub trait Reporter: Send + Sync {
    /// Increment `Loaded`.
    fn add_loaded(&self, n: i64);
    /// Increment `Processed`.
    fn add_processed(&self, n: i64);
    /// Increment `Batched`.
    fn add_batched(&self, n: i64);
    /// Increment `Skipped`.
    fn add_skipped(&self, n: i64);
    /// Increment `LoadTimeouts` (and `Skipped` alongside it).
    fn add_load_timeout(&self);
    /// Record a sink-write failure on the retry path — not fatal.
    fn add_retry_write_error(&self, message: &str);
    /// Record a sink-write failure on the corruption path — not fatal.
    fn add_corruption_write_error(&self, message: &str);
    /// Record a per-record error of the given kind, bumping its counter
    /// and (on the kind's first occurrence) appending a truncated message.
    fn record_error(&self, kind: ErrorKindBit, message: &str);
    /// Snapshot the response as it stands right now.
    fn snapshot(&self) -> Response;
    /// Finalize the response (status string, elapsed time) and return it.
    fn finish(&self) -> Response;
}

/// Default [`Reporter`] implementation: one response under
/// construction, atomic counters, and a mutex-guarded bounded error log.
pub struct BaseReporter {
    response: Mutex<Response>,
    counters: Counters,
    seen_kinds: Mutex<std::collections::HashSet<&'static str>>,
    start_instant: std::time::Instant,
}

impl BaseReporter {
    /// Start a new reporter for a request reading from `source_url`.
    pub fn new(source_url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            response: Mutex::new(Response::new(source_url, now)),
            counters: Counters::default(),
            seen_kinds: Mutex::new(std::collections::HashSet::new()),
            start_instant: std::time::Instant::now(),
        }
    }

    /// Set the resolved destination/retry/corruption URLs, as resolved
    /// at request start.
    pub async fn set_resolved_urls(
        &self,
        destination_url: Option<String>,
        retry_url: Option<String>,
        corruption_url: Option<String>,
        mirror_url: Option<String>,
    ) {
        let mut resp = self.response.lock().await;
        resp.destination_url = destination_url;
        resp.retry_url = retry_url;
        resp.corruption_url = corruption_url;
        resp.mirror_url = mirror_url;
    }

    /// Mark this request as quorum-skipped: status becomes
    /// `QuorumSkipped`, no records are loaded.
    pub async fn mark_quorum_skipped(&self) {
        let mut resp = self.response.lock().await;
        resp.status = "QuorumSkipped".to_string();
    }

    /// Append `message` (truncated) to the error log on the first
    /// occurrence of `kind`; a blocking `try_lock` is sufficient since
    /// this is called from synchronous `Reporter` trait methods.
    fn log_once(&self, kind: ErrorKindBit, message: &str) {
        if let Ok(mut seen) = self.seen_kinds.try_lock() {
            if seen.insert(kind.label()) {
                let truncated = truncate_utf8(message, MAX_ERROR_MESSAGE_BYTES);
                if let Ok(mut resp) = self.response.try_lock() {
                    resp.errors.push(truncated);
                }
            }
        }
    }
}

/// Truncates `message` to at most `max_bytes` bytes, backing off to the
/// nearest preceding UTF-8 character boundary so the result is never a
/// sliced-in-half multibyte character.
fn truncate_utf8(message: &str, max_bytes: usize) -> String {
    if message.len() <= max_bytes {
        return message.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    message[..end].to_string()
}

impl Reporter for BaseReporter {
    fn add_loaded(&self, n: i64) {
        self.counters.loaded.fetch_add(n, Ordering::Relaxed);
    }

    fn add_processed(&self, n: i64) {
        self.counters.processed.fetch_add(n, Ordering::Relaxed);
    }

    fn add_batched(&self, n: i64) {
        self.counters.batched.fetch_add(n, Ordering::Relaxed);
    }

    fn add_skipped(&self, n: i64) {
        self.counters.skipped.fetch_add(n, Ordering::Relaxed);
    }

    fn add_load_timeout(&self) {
        self.counters.load_timeouts.fetch_add(1, Ordering::Relaxed);
        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn add_retry_write_error(&self, message: &str) {
        self.counters.retry_errors.fetch_add(1, Ordering::Relaxed);
        self.log_once(ErrorKindBit::Retry, message);
    }

    fn add_corruption_write_error(&self, message: &str) {
        self.counters
            .corruption_errors
            .fetch_add(1, Ordering::Relaxed);
        self.log_once(ErrorKindBit::Corrupted, message);
    }

    fn record_error(&self, kind: ErrorKindBit, message: &str) {
        match kind {
            ErrorKindBit::Retry => self.counters.retriable_errors.fetch_add(1, Ordering::Relaxed),
            ErrorKindBit::Corrupted => self
                .counters
                .corruption_errors
                .fetch_add(1, Ordering::Relaxed),
            ErrorKindBit::Process | ErrorKindBit::Unknown => {
                self.counters.process_errors.fetch_add(1, Ordering::Relaxed)
            }
        };
        self.log_once(kind, message);
    }

    fn snapshot(&self) -> Response {
        // try_lock is sufficient here: snapshots are only ever taken
        // from the same task that owns request completion, never
        // concurrently with record_error's try_lock above under load
        // low enough that this API remains best-effort for mid-flight
        // introspection (e.g. the metrics endpoint).
        self.response
            .try_lock()
            .map(|r| r.clone())
            .unwrap_or_else(|_| Response::new("", Utc::now()))
    }

    fn finish(&self) -> Response {
        let mut resp = self.snapshot();
        resp.loaded = self.counters.loaded.load(Ordering::Relaxed);
        resp.processed = self.counters.processed.load(Ordering::Relaxed);
        resp.batched = self.counters.batched.load(Ordering::Relaxed);
        resp.skipped = self.counters.skipped.load(Ordering::Relaxed);
        resp.load_timeouts = self.counters.load_timeouts.load(Ordering::Relaxed);
        resp.retry_errors = self.counters.retry_errors.load(Ordering::Relaxed);
        resp.retriable_errors = self.counters.retriable_errors.load(Ordering::Relaxed);
        resp.corruption_errors = self.counters.corruption_errors.load(Ordering::Relaxed);
        resp.process_errors = self.counters.process_errors.load(Ordering::Relaxed);
        resp.elapsed_ms = self.start_instant.elapsed().as_millis() as u64;
        resp.status = status_string(&resp);
        resp
    }
}

fn status_string(resp: &Response) -> String {
    if resp.status == "QuorumSkipped" {
        return resp.status.clone();
    }
    if resp.process_errors > 0 {
        return "error".to_string();
    }
    let mut bits = Vec::new();
    if resp.retriable_errors > 0 || resp.retry_errors > 0 {
        bits.push("retry");
    }
    if resp.corruption_errors > 0 {
        bits.push("corrupted");
    }
    if bits.is_empty() {
        "ok".to_string()
    } else {
        let mut joined = String::from("ok");
        for bit in bits {
            joined.push('|');
            joined.push_str(bit);
        }
        joined
    }
}

/// Maps a [`ErrorKind`] to the reporter's status bit.
pub fn kind_to_bit(kind: ErrorKind) -> ErrorKindBit {
    match kind {
        ErrorKind::Corrupted => ErrorKindBit::Corrupted,
        ErrorKind::Retry => ErrorKindBit::Retry,
    }
}

/// A reporter that additionally carries the per-request [`Processor`]
/// selected for a [`crate::processor::Handler`]; mirrors the Go
/// `HandlerReporter{ Reporter; Processor }` embedding via a field plus
/// `Deref` to the inner `BaseReporter`.
pub struct HandlerReporter {
    inner: Arc<BaseReporter>,
    /// The sub-processor selected for this request
    pub processor: Arc<dyn Processor>,
}

impl HandlerReporter {
    /// Wrap `inner` with the sub-processor selected for this request.
    pub fn new(inner: Arc<BaseReporter>, processor: Arc<dyn Processor>) -> Self {
        Self { inner, processor }
    }
}

impl Deref for HandlerReporter {
    type Target = BaseReporter;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Reporter for HandlerReporter {
    fn add_loaded(&self, n: i64) {
        self.inner.add_loaded(n)
    }
    fn add_processed(&self, n: i64) {
        self.inner.add_processed(n)
    }
    fn add_batched(&self, n: i64) {
        self.inner.add_batched(n)
    }
    fn add_skipped(&self, n: i64) {
        self.inner.add_skipped(n)
    }
    fn add_load_timeout(&self) {
        self.inner.add_load_timeout()
    }
    fn add_retry_write_error(&self, message: &str) {
        self.inner.add_retry_write_error(message)
    }
    fn add_corruption_write_error(&self, message: &str) {
        self.inner.add_corruption_write_error(message)
    }
    fn record_error(&self, kind: ErrorKindBit, message: &str) {
        self.inner.record_error(kind, message)
    }
    fn snapshot(&self) -> Response {
        self.inner.snapshot()
    }
    fn finish(&self) -> Response {
        self.inner.finish()
    }
}
