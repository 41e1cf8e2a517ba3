//! Request type
//!
//! A `Request` owns either a byte-stream reader (csv/json) or a
//! random-access columnar source (parquet, via `object_store` +
//! `parquet::arrow`), tagged with a [`SourceType`], alongside the
//! metadata an adapter attaches.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::AsyncBufRead;

use crate::config::SourceType;
use crate::store;

/// The input side of one request: either a byte-stream reader
/// (delimited/structured line formats) or a random-access columnar
/// source (parquet, read through `object_store`).
pub enum Source {
    /// Line-oriented byte stream (csv or json-line)
    Stream(Box<dyn AsyncBufRead + Unpin + Send>),
    /// Random-access columnar source, opened lazily by the loader via
    /// `object_store`/`parquet::arrow` against this URL
    Columnar(Arc<dyn object_store::ObjectStore>, object_store::path::Path),
}

/// One unit of work presented to [`crate::service::Service::process`]:
/// a source to read, decoded according to `source_type`/`row_type`.
pub struct Request {
    /// The source URL this request was built from
    pub source_url: String,
    /// When this request was created (UTC) — feeds URL template expansion
    pub start_time: DateTime<Utc>,
    /// Delimited, structured, or columnar
    pub source_type: SourceType,
    /// Declared row type name; required for parquet, optional for json
    pub row_type: Option<String>,
    /// Free-form attribute bag for adapter metadata
    pub attrs: HashMap<String, Value>,
    /// The input itself
    pub source: Source,
}

impl Request {
    /// Build a request over a line-oriented byte stream, inferring
    /// `source_type` from `source_url`'s suffix.
    pub fn from_stream(
        source_url: impl Into<String>,
        row_type: Option<String>,
        reader: Box<dyn AsyncBufRead + Unpin + Send>,
    ) -> Self {
        let source_url = source_url.into();
        let source_type = SourceType::from_url(&source_url);
        Self {
            source_type,
            source_url,
            start_time: Utc::now(),
            row_type,
            attrs: HashMap::new(),
            source: Source::Stream(reader),
        }
    }

    /// Build a request over a columnar (parquet) source identified by `source_url`.
    pub fn from_columnar(source_url: impl Into<String>, row_type: impl Into<String>) -> crate::error::Result<Self> {
        let source_url = source_url.into();
        let (store, path) = store::resolve(&source_url)?;
        Ok(Self {
            source_type: SourceType::Parquet,
            source_url,
            start_time: Utc::now(),
            row_type: Some(row_type.into()),
            attrs: HashMap::new(),
            source: Source::Columnar(store, path),
        })
    }

    /// Test/demo helper: a stub request over an explicit stream reader,
    /// bypassing URL resolution entirely.
    #[doc(hidden)]
    pub fn new_line_stub(
        source_url: impl Into<String>,
        reader: Box<dyn AsyncBufRead + Unpin + Send>,
    ) -> Self {
        Self::from_stream(source_url, None, reader)
    }
}
