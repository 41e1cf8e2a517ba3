//! Object-store URL resolution (the `afs.Service` analogue)
//!
//! Every URL in this crate (`mem://...`, `file://...`, and, behind
//! Cargo features, `s3://...`/`gs://...`) is resolved through
//! [`object_store`] rather than hand-rolled per-scheme I/O, grounded in
//! the combined `object_store`/`parquet`/`arrow` stack used by the
//! `otel-arrow` pack repo's dataflow engine.

use object_store::{ObjectStore, memory::InMemory, path::Path};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufRead, BufReader};

use crate::error::{Error, Result};

/// A process-wide in-memory store shared by every `mem://` URL.
///
/// `mem://` URLs have no host/bucket to disambiguate stores by, so one
/// instance backs every reference to the scheme within a process —
/// this is what lets tests and the `adapter::mem` reference adapter
/// round-trip through the same namespace.
fn shared_memory_store() -> Arc<InMemory> {
    static STORE: OnceLock<Arc<InMemory>> = OnceLock::new();
    STORE.get_or_init(|| Arc::new(InMemory::new())).clone()
}

/// Resolve a `scheme://host/path...` URL into an `(ObjectStore, Path)`
/// pair. `mem://` and `file://` are always available; `s3://`/`gs://`
/// require the `aws`/`gcp` Cargo features respectively.
pub fn resolve(url: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
    let (scheme, rest) = split_scheme(url)?;
    match scheme {
        "mem" => {
            let path = Path::from(rest.trim_start_matches('/'));
            Ok((shared_memory_store() as Arc<dyn ObjectStore>, path))
        }
        "file" => {
            let store = object_store::local::LocalFileSystem::new_with_prefix("/")
                .map_err(|e| Error::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            let path = Path::from(rest);
            Ok((Arc::new(store) as Arc<dyn ObjectStore>, path))
        }
        #[cfg(feature = "aws")]
        "s3" => {
            let (bucket, key) = split_bucket(rest);
            let store = object_store::aws::AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            Ok((Arc::new(store) as Arc<dyn ObjectStore>, Path::from(key)))
        }
        #[cfg(feature = "gcp")]
        "gs" => {
            let (bucket, key) = split_bucket(rest);
            let store = object_store::gcp::GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .map_err(|e| Error::InvalidUrl {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
            Ok((Arc::new(store) as Arc<dyn ObjectStore>, Path::from(key)))
        }
        other => Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

/// Resolve the directory containing `url` (everything up to the final
/// path segment), used by the quorum merger to list siblings.
pub fn resolve_parent(url: &str) -> Result<(Arc<dyn ObjectStore>, Path)> {
    let (store, path) = resolve(url)?;
    let parts: Vec<_> = path.parts().collect();
    let parent = if parts.is_empty() {
        path
    } else {
        Path::from_iter(parts[..parts.len() - 1].iter().map(|p| p.as_ref()))
    };
    Ok((store, parent))
}

fn split_scheme(url: &str) -> Result<(&str, &str)> {
    url.split_once("://").ok_or_else(|| Error::InvalidUrl {
        url: url.to_string(),
        reason: "missing scheme separator \"://\"".to_string(),
    })
}

#[allow(dead_code)]
fn split_bucket(rest: &str) -> (&str, &str) {
    match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    }
}

/// Open `url` as a byte-stream reader, for line-oriented (csv/json)
/// sources. Buffers the whole object into memory up front rather than
/// streaming it chunk-by-chunk — the same simplification the sink
/// writer makes on the write side (see `sink.rs`), acceptable since
/// `object_store::GetResult` has no standard incremental-read adapter
/// that implements `AsyncBufRead` across every backend.
pub async fn open_stream(url: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    let (store, path) = resolve(url)?;
    let bytes = store.get(&path).await.map_err(Error::Store)?.bytes().await.map_err(Error::Store)?;
    Ok(Box::new(BufReader::new(std::io::Cursor::new(bytes.to_vec()))))
}

/// Join a directory `Path` and a file name into a full object path.
pub fn join(dir: &Path, name: &str) -> Path {
    let mut parts: Vec<String> = dir.parts().map(|p| p.as_ref().to_string()).collect();
    parts.push(name.to_string());
    Path::from_iter(parts)
}

/// The final path segment (file name) of a `Path`.
pub fn file_name(path: &Path) -> Option<String> {
    path.parts().last().map(|p| p.as_ref().to_string())
}
