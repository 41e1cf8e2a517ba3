//! Configuration types for streamproc

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Error, Result};

/// Source encoding of the request body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Delimited line format (csv-style, default `,`)
    #[default]
    Csv,
    /// One JSON object per line
    Json,
    /// Random-access columnar format
    Parquet,
}

impl SourceType {
    /// Infer a `SourceType` from a source URL's suffix:
    /// `*.parquet` → columnar, `*.json{,.gz}` → structured line, else → delimited line.
    pub fn from_url(url: &str) -> Self {
        let stripped = url.strip_suffix(".gz").unwrap_or(url);
        if stripped.ends_with(".parquet") {
            SourceType::Parquet
        } else if stripped.ends_with(".json") {
            SourceType::Json
        } else {
            SourceType::Csv
        }
    }
}

/// Action to take with the source artifact once a request completes successfully.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDoneAction {
    /// Leave the source in place (default)
    #[default]
    None,
    /// Delete the source artifact
    Delete,
    /// Move the source artifact to `on_done_url`
    Move,
}

/// Deadline budgets governing loader admission and worker drain.
///
/// See the [`crate::deadline`] module for how these combine with a
/// context deadline or `FUNCTION_TIMEOUT_SEC` into concrete instants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadlineConfig {
    /// Overall execution budget in milliseconds, used when no context deadline is present (default: 0 = unbounded)
    #[serde(default)]
    pub max_exec_time_ms: u64,

    /// How much earlier than the request deadline the worker pool stops processing (default: 0)
    #[serde(default)]
    pub deadline_reduction_ms: u64,

    /// How much earlier than the worker deadline the loader stops admitting records (default: 0)
    #[serde(default)]
    pub loader_deadline_lag_ms: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            max_exec_time_ms: 0,
            deadline_reduction_ms: 0,
            loader_deadline_lag_ms: 0,
        }
    }
}

/// Sink URL templates for retry, exhausted-retry, and corrupted records.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SinkConfig {
    /// URL template for records that should be retried (required)
    #[serde(default)]
    pub retry_url: String,

    /// URL template used once `max_retries` is exceeded (required)
    #[serde(default)]
    pub failed_url: String,

    /// URL template for structurally invalid records (required)
    #[serde(default)]
    pub corruption_url: String,
}

/// Destination (success sink) and post-completion disposition of the source.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Destination URL template (may contain `$UUID` / time-path markers)
    #[serde(default)]
    pub url: String,

    /// Optional rotation URL template; when set and `url` is empty, `url` is
    /// taken from this template at request start
    #[serde(default)]
    pub rotation_url: Option<String>,

    /// Optional mirror URL written alongside the destination
    #[serde(default)]
    pub mirror_url: Option<String>,

    /// What to do with the source artifact once the request completes
    #[serde(default)]
    pub on_done: OnDoneAction,

    /// Target URL for `OnDoneAction::Move`
    #[serde(default)]
    pub on_done_url: Option<String>,
}

/// One key field in a [`SortConfig`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortKey {
    /// Field name, used for structured (JSON-line) records
    #[serde(default)]
    pub name: String,

    /// Zero-based column index, used for delimited records
    #[serde(default)]
    pub index: usize,

    /// Compare this key's values as decimal integers rather than lexicographically
    #[serde(default)]
    pub is_numeric: bool,
}

/// Sort/group/batch pre-processing configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SortConfig {
    /// Delimiter for delimited records (default: `,`)
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Ordered key fields; empty means "no sorting"
    #[serde(default)]
    pub by: Vec<SortKey>,

    /// Group contiguous records sharing the first key's value into one batch,
    /// flushing on key change or when `batch_size` is reached, whichever is first
    #[serde(default)]
    pub batch: bool,
}

fn default_delimiter() -> String {
    ",".to_string()
}

/// Main configuration for a streamproc [`crate::service::Service`]
///
/// Sub-configs are flattened into this top-level `Config` via
/// `#[serde(flatten)]`, so the JSON/YAML representation stays a single
/// flat-ish object rather than nesting every sub-struct under its own key.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deadline budgets (loader lag, worker reduction, overall exec time)
    #[serde(flatten)]
    pub deadline: DeadlineConfig,

    /// Retry/failed/corruption sink URL templates
    #[serde(flatten)]
    pub sink: SinkConfig,

    /// Destination URL, rotation, mirror, on-done disposition
    #[serde(flatten)]
    pub destination: DestinationConfig,

    /// Sort/group/batch pre-processing configuration
    #[serde(default)]
    pub sort: SortConfig,

    /// Number of concurrent workers (default: 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum number of times a record may be retried before routing to `failed_url`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// When > 0 and no sort-group is active, records are joined into batches of this size
    #[serde(default)]
    pub batch_size: usize,

    /// Scanner buffer size in megabytes for line-oriented sources (default: 1)
    #[serde(default = "default_scanner_buffer_mb")]
    pub scanner_buffer_mb: usize,

    /// Port for the metrics HTTP endpoint; 0 disables it
    #[serde(default)]
    pub metric_port: u16,

    /// Extension substring whose presence in the source filename triggers quorum merging; empty disables it
    #[serde(default)]
    pub quorum_ext: String,

    /// Declared row type name for structured/columnar sources
    #[serde(default)]
    pub row_type_name: Option<String>,
}

impl Config {
    /// Validate required fields: a missing `retry_url`, `failed_url`, or
    /// `corruption_url` is a fatal configuration error that aborts before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.sink.retry_url.is_empty() {
            return Err(Error::Config {
                message: "retry_url must not be empty".into(),
                key: Some("retry_url".into()),
            });
        }
        if self.sink.failed_url.is_empty() {
            return Err(Error::Config {
                message: "failed_url must not be empty".into(),
                key: Some("failed_url".into()),
            });
        }
        if self.sink.corruption_url.is_empty() {
            return Err(Error::Config {
                message: "corruption_url must not be empty".into(),
                key: Some("corruption_url".into()),
            });
        }
        if self.concurrency == 0 {
            return Err(Error::Config {
                message: "concurrency must be at least 1".into(),
                key: Some("concurrency".into()),
            });
        }
        Ok(())
    }

    /// Overall execution budget as a `Duration`, or `None` when `max_exec_time_ms` is 0
    /// and no other source of a deadline applies.
    pub fn max_exec_time(&self) -> Option<Duration> {
        if self.deadline.max_exec_time_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.deadline.max_exec_time_ms))
        }
    }

    /// Amount by which the worker deadline precedes the overall request deadline.
    pub fn deadline_reduction(&self) -> Duration {
        Duration::from_millis(self.deadline.deadline_reduction_ms)
    }

    /// Amount by which the loader deadline precedes the worker deadline.
    pub fn loader_deadline_lag(&self) -> Duration {
        Duration::from_millis(self.deadline.loader_deadline_lag_ms)
    }
}

fn default_concurrency() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_scanner_buffer_mb() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            sink: SinkConfig {
                retry_url: "mem://r".into(),
                failed_url: "mem://f".into(),
                corruption_url: "mem://c".into(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn validate_rejects_missing_retry_url() {
        let mut cfg = valid_config();
        cfg.sink.retry_url.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("retry_url"));
    }

    #[test]
    fn validate_rejects_missing_failed_url() {
        let mut cfg = valid_config();
        cfg.sink.failed_url.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_corruption_url() {
        let mut cfg = valid_config();
        cfg.sink.corruption_url.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        let cfg = valid_config();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn default_concurrency_is_one() {
        assert_eq!(Config::default().concurrency, 1);
    }

    #[test]
    fn max_exec_time_none_when_zero() {
        let cfg = Config::default();
        assert_eq!(cfg.max_exec_time(), None);
    }

    #[test]
    fn max_exec_time_some_when_nonzero() {
        let mut cfg = Config::default();
        cfg.deadline.max_exec_time_ms = 2000;
        assert_eq!(cfg.max_exec_time(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn source_type_from_url_detects_parquet() {
        assert_eq!(SourceType::from_url("mem://a/b.parquet"), SourceType::Parquet);
    }

    #[test]
    fn source_type_from_url_detects_json_with_gz() {
        assert_eq!(SourceType::from_url("mem://a/b.json.gz"), SourceType::Json);
    }

    #[test]
    fn source_type_from_url_defaults_to_csv() {
        assert_eq!(SourceType::from_url("mem://a/b.txt"), SourceType::Csv);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = valid_config();
        let json = serde_json::to_string(&cfg).unwrap();
        let restored: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.sink.retry_url, cfg.sink.retry_url);
        assert_eq!(restored.concurrency, cfg.concurrency);
    }
}
