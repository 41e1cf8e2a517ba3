//! Reference request adapters
//!
//! Real cloud adapters — S3/GS object-storage event parsing, SQS/PubSub
//! consume loops — are left as traits embedders implement against their
//! own trigger source. This module ships the one adapter built into
//! this crate directly: building a [`Request`] from a plain
//! `mem://`/`file://` URL, useful for tests and for embedders that
//! already have their own trigger loop and just need the
//! URL-to-`Request` plumbing.

use crate::config::SourceType;
use crate::error::{Error, Result};
use crate::request::Request;
use crate::store;

/// Build a `Request` from `source_url`, inferring [`SourceType`] from
/// its suffix (`*.parquet` → columnar, `*.json{,.gz}` → structured
/// line, else → delimited line) and opening the backing reader through
/// the object-store abstraction.
///
/// `row_type` is required for parquet sources (the loader cannot
/// decode columnar rows without a registered row-type name) and
/// optional for json/csv.
pub async fn from_url(source_url: impl Into<String>, row_type: Option<String>) -> Result<Request> {
    let source_url = source_url.into();
    match SourceType::from_url(&source_url) {
        SourceType::Parquet => {
            let row_type = row_type.ok_or_else(|| Error::UnknownRowType("<none>".to_string()))?;
            Request::from_columnar(source_url, row_type)
        }
        _ => {
            let reader = store::open_stream(&source_url).await?;
            Ok(Request::from_stream(source_url, row_type, reader))
        }
    }
}
