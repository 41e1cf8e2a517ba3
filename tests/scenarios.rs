//! End-to-end scenarios against the public `Service` API, one per
//! literal scenario in spec.md's testable-properties section: a happy
//! sum, a corrupt line, a deadline miss, sort/batch grouping, retry
//! fragment exhaustion, and quorum skip.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::BufReader;

use streamproc::config::{DestinationConfig, SinkConfig, SortConfig, SortKey};
use streamproc::{Config, PostProcessor, ProcessError, Processor, Record, Reporter, Request, Service};

fn base_config(retry: &str, failed: &str, corruption: &str, destination: &str) -> Config {
    Config {
        sink: SinkConfig {
            retry_url: retry.to_string(),
            failed_url: failed.to_string(),
            corruption_url: corruption.to_string(),
        },
        destination: DestinationConfig {
            url: destination.to_string(),
            ..Default::default()
        },
        concurrency: 5,
        ..Config::default()
    }
}

fn line_request(url: &str, data: &[u8]) -> Request {
    let reader = BufReader::new(std::io::Cursor::new(data.to_vec()));
    Request::new_line_stub(url, Box::new(reader))
}

async fn read_object(url: &str) -> Vec<u8> {
    let (store, path) = streamproc::store::resolve(url).unwrap();
    store.get(&path).await.unwrap().bytes().await.unwrap().to_vec()
}

struct SummingProcessor {
    sum: AtomicI64,
    destination_url: String,
}

impl SummingProcessor {
    fn new(destination_url: impl Into<String>) -> Self {
        Self {
            sum: AtomicI64::new(0),
            destination_url: destination_url.into(),
        }
    }
}

#[async_trait]
impl Processor for SummingProcessor {
    async fn process(&self, record: &Record, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let line = String::from_utf8_lossy(&record.to_line()).into_owned();
        let mut total = 0i64;
        for field in line.split('\n') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            let n: i64 = field
                .parse()
                .map_err(|_| ProcessError::corruption(format!("not an integer: {field}")))?;
            total += n;
        }
        self.sum.fetch_add(total, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl PostProcessor for SummingProcessor {
    async fn post(&self, _row_type: Option<&str>, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let total = self.sum.load(Ordering::Relaxed);
        let (store, path) =
            streamproc::store::resolve(&self.destination_url).map_err(|e| ProcessError::Retriable(e.to_string()))?;
        store
            .put(&path, Bytes::from(total.to_string()).into())
            .await
            .map_err(|e| ProcessError::Retriable(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn happy_path_sum() {
    let destination = format!("mem://scenarios/{}-dest.txt", uuid::Uuid::new_v4());
    let config = base_config("mem://scenarios/r1", "mem://scenarios/f1", "mem://scenarios/c1", &destination);
    let service = Service::new(config).unwrap();
    let processor = Arc::new(SummingProcessor::new(&destination));

    let request = line_request("mem://scenarios/in1.csv", b"1\n2\n3\n4\n5\n6\n7\n8\n9\n0");
    let response = service
        .process(request, processor.clone(), None, Some(processor.clone() as Arc<dyn PostProcessor>))
        .await
        .unwrap();

    assert_eq!(response.processed, 10);
    assert_eq!(response.status, "ok");
    assert_eq!(read_object(&destination).await, b"45");
}

#[tokio::test]
async fn corruption_routes_bad_line_and_keeps_processing() {
    let destination = format!("mem://scenarios/{}-dest.txt", uuid::Uuid::new_v4());
    let retry = format!("mem://scenarios/{}-r.txt", uuid::Uuid::new_v4());
    let failed = format!("mem://scenarios/{}-f.txt", uuid::Uuid::new_v4());
    let corruption = format!("mem://scenarios/{}-c.txt", uuid::Uuid::new_v4());
    let config = base_config(&retry, &failed, &corruption, &destination);
    let service = Service::new(config).unwrap();
    let processor = Arc::new(SummingProcessor::new(&destination));

    let request = line_request("mem://scenarios/in2.csv", b"1\n2\nasd\n373\n23");
    let response = service
        .process(request, processor.clone(), None, Some(processor.clone() as Arc<dyn PostProcessor>))
        .await
        .unwrap();

    assert_eq!(response.processed, 4);
    assert_eq!(response.corruption_errors, 1);
    assert_eq!(response.status, "ok|corrupted");
    assert_eq!(read_object(&corruption).await, b"asd");
}

struct SleepsOnMatch {
    sleep_on: &'static str,
    sleep_for: std::time::Duration,
}

#[async_trait]
impl Processor for SleepsOnMatch {
    async fn process(&self, record: &Record, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let line = record.to_line();
        if line == self.sleep_on.as_bytes() {
            tokio::time::sleep(self.sleep_for).await;
        }
        Ok(())
    }
}

#[tokio::test]
async fn deadline_miss_diverts_the_slow_record_to_retry() {
    // Scaled to milliseconds rather than spec.md's literal seconds so the
    // suite stays fast; the ratio between worker deadline and the slow
    // record's processing time is preserved.
    let retry = format!("mem://scenarios/{}-r.txt", uuid::Uuid::new_v4());
    let config = Config {
        deadline: streamproc::config::DeadlineConfig {
            max_exec_time_ms: 300,
            deadline_reduction_ms: 100,
            loader_deadline_lag_ms: 0,
        },
        ..base_config(&retry, "mem://scenarios/f3", "mem://scenarios/c3", "mem://scenarios/d3.txt")
    };
    let service = Service::new(config).unwrap();
    let processor = Arc::new(SleepsOnMatch {
        sleep_on: "8",
        sleep_for: std::time::Duration::from_millis(800),
    });

    let request = line_request("mem://scenarios/in3.csv", b"1\n2\n3\n4\n5\n6\n7\n8\n9\n0");
    let response = service.process(request, processor, None, None).await.unwrap();

    assert_eq!(response.processed, 9);
    assert_eq!(response.retriable_errors, 1);
    assert_eq!(response.status, "ok|retry");
    assert_eq!(read_object(&retry).await, b"8");
}

struct GroupSummingProcessor {
    sum: AtomicI64,
    destination_url: String,
}

#[async_trait]
impl Processor for GroupSummingProcessor {
    async fn process(&self, record: &Record, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let line = String::from_utf8_lossy(&record.to_line()).into_owned();
        let total: i64 = line.split('\n').filter_map(|f| f.trim().parse::<i64>().ok()).sum();
        self.sum.fetch_add(total, Ordering::Relaxed);
        Ok(())
    }
}

#[async_trait]
impl PostProcessor for GroupSummingProcessor {
    async fn post(&self, _row_type: Option<&str>, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let total = self.sum.load(Ordering::Relaxed);
        let (store, path) =
            streamproc::store::resolve(&self.destination_url).map_err(|e| ProcessError::Retriable(e.to_string()))?;
        store
            .put(&path, Bytes::from(total.to_string()).into())
            .await
            .map_err(|e| ProcessError::Retriable(e.to_string()))?;
        Ok(())
    }
}

#[tokio::test]
async fn sort_batch_groups_contiguous_keys() {
    let destination = format!("mem://scenarios/{}-dest.txt", uuid::Uuid::new_v4());
    let config = Config {
        sort: SortConfig {
            by: vec![SortKey {
                name: String::new(),
                index: 0,
                is_numeric: true,
            }],
            batch: true,
            ..SortConfig::default()
        },
        ..base_config("mem://scenarios/r4", "mem://scenarios/f4", "mem://scenarios/c4", &destination)
    };
    let service = Service::new(config).unwrap();
    let processor = Arc::new(GroupSummingProcessor {
        sum: AtomicI64::new(0),
        destination_url: destination.clone(),
    });

    let request = line_request("mem://scenarios/in4.csv", b"1\n1\n1\n1\n2\n2\n2\n1\n3\n3\n3\n1");
    let response = service
        .process(request, processor.clone(), None, Some(processor.clone() as Arc<dyn PostProcessor>))
        .await
        .unwrap();

    // `Sort.By` is non-empty, so the pre-processor fully reorders before
    // grouping: all six `1`s, three `2`s, three `3`s become one
    // contiguous group apiece.
    assert_eq!(response.processed, 3);
    assert_eq!(read_object(&destination).await, b"21");
}

#[tokio::test]
async fn retry_fragment_advances_and_redirects_past_max_retries() {
    let failed = format!("mem://scenarios/{}-failed.txt", uuid::Uuid::new_v4());
    let config = Config {
        max_retries: 5,
        ..base_config(
            "mem://scenarios/retry-unused",
            &failed,
            "mem://scenarios/corrupt-unused",
            "mem://scenarios/dest-unused.txt",
        )
    };
    let service = Service::new(config).unwrap();

    struct AlwaysFails;
    #[async_trait]
    impl Processor for AlwaysFails {
        async fn process(&self, _record: &Record, _reporter: &dyn Reporter) -> Result<(), ProcessError> {
            Err(ProcessError::Retriable("boom".to_string()))
        }
    }

    let request = line_request("mem://scenarios/data-retry05.txt", b"x");
    let response = service.process(request, Arc::new(AlwaysFails), None, None).await.unwrap();

    let retry_url = response.retry_url.unwrap();
    let failed_stem = failed.trim_end_matches(".txt");
    assert!(retry_url.ends_with("-retry06.txt"), "got {retry_url}");
    assert!(retry_url.starts_with(failed_stem), "expected redirect to failed_url, got {retry_url}");
}

#[tokio::test]
async fn quorum_merges_marked_sibling_and_skips_plain_source() {
    let config = Config {
        quorum_ext: ".q".to_string(),
        ..base_config("mem://scenarios/r6", "mem://scenarios/f6", "mem://scenarios/c6", "mem://scenarios/d6.txt")
    };
    let service = Service::new(config).unwrap();

    // A source carrying the quorum marker proceeds to load the merged
    // artifact: the merger skips files whose name still bears the
    // marker (including the marked file itself, emptied below) and
    // concatenates the remaining siblings' raw bytes.
    let dir = uuid::Uuid::new_v4();
    let marked_url = format!("mem://scenarios/{dir}/part-1.q.csv");
    let sibling_url = format!("mem://scenarios/{dir}/part-2.csv");
    let (store, marked_path) = streamproc::store::resolve(&marked_url).unwrap();
    let (_, sibling_path) = streamproc::store::resolve(&sibling_url).unwrap();
    store.put(&marked_path, Bytes::from_static(b"").into()).await.unwrap();
    store.put(&sibling_path, Bytes::from_static(b"1\n2\n3").into()).await.unwrap();

    let destination = format!("mem://scenarios/{}-merged-dest.txt", uuid::Uuid::new_v4());
    let merge_processor = Arc::new(SummingProcessor::new(&destination));
    let request = streamproc::adapter::from_url(marked_url, None).await.unwrap();
    let merged_response = service
        .process(
            request,
            merge_processor.clone(),
            None,
            Some(merge_processor.clone() as Arc<dyn PostProcessor>),
        )
        .await
        .unwrap();
    assert_ne!(merged_response.status, "QuorumSkipped");
    assert_eq!(merged_response.loaded, 3);
    assert_eq!(read_object(&destination).await, b"6");

    // A source without the marker is skipped without loading anything.
    let plain_url = format!("mem://scenarios/{}-plain.csv", uuid::Uuid::new_v4());
    let (store, plain_path) = streamproc::store::resolve(&plain_url).unwrap();
    store.put(&plain_path, Bytes::from_static(b"1\n2").into()).await.unwrap();

    let plain_request = streamproc::adapter::from_url(plain_url, None).await.unwrap();
    let skip_processor = Arc::new(SummingProcessor::new("mem://scenarios/unused.txt"));
    let skip_response = service.process(plain_request, skip_processor, None, None).await.unwrap();

    assert_eq!(skip_response.status, "QuorumSkipped");
    assert_eq!(skip_response.loaded, 0);
}
