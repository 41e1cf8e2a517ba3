//! URL template expansion and retry-fragment accounting
//!
//! A small, pure utility module: free functions, no shared state,
//! exhaustively unit tested.

use chrono::{DateTime, Utc};
use uuid::Uuid;

const RETRY_MARKER: &str = "-retry";
const GZ_SUFFIX: &str = ".gz";

/// Replace `$UUID` with a fresh v4 identifier and `$TIME_PATH` with a
/// `yyyy/MM/dd/HH` (UTC) path segment derived from `time`.
pub fn expand(template: &str, time: DateTime<Utc>) -> String {
    let time_path = time.format("%Y/%m/%d/%H").to_string();
    template
        .replace("$UUID", &Uuid::new_v4().to_string())
        .replace("$TIME_PATH", &time_path)
}

/// Expand `template`, then strip any existing `-retryNN` fragment
/// (preserving the extension) and append `-retry{retry_count + 1:02}`
/// before the extension.
pub fn expand_retry(template: &str, time: DateTime<Utc>, retry_count: u32) -> String {
    let expanded = expand(template, time);
    let stripped = strip_retry_fragment(&expanded);
    let (stem, ext) = split_extension(&stripped);
    format!("{stem}-retry{:02}{ext}", retry_count + 1)
}

/// Locate the last `-retryNN` fragment in `url` and parse the following
/// two characters as an integer. Returns 0 if the fragment is absent.
pub fn retry_count(url: &str) -> u32 {
    match url.rfind(RETRY_MARKER) {
        Some(idx) => {
            let digits: String = url[idx + RETRY_MARKER.len()..]
                .chars()
                .take(2)
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(0)
        }
        None => 0,
    }
}

/// Ensure `url` carries the `.gz` suffix (for gzip-codec destinations),
/// appending it if absent. Idempotent.
pub fn ensure_gz_suffix(url: &str) -> String {
    if url.ends_with(GZ_SUFFIX) {
        url.to_string()
    } else {
        format!("{url}{GZ_SUFFIX}")
    }
}

/// Whether a URL's codec (by suffix) is gzip.
pub fn is_gz(url: &str) -> bool {
    url.ends_with(GZ_SUFFIX)
}

fn strip_retry_fragment(url: &str) -> String {
    let (stem, ext) = split_extension(url);
    match stem.rfind(RETRY_MARKER) {
        Some(idx) => {
            let tail = &stem[idx + RETRY_MARKER.len()..];
            if tail.len() >= 2 && tail.chars().take(2).all(|c| c.is_ascii_digit()) {
                format!("{}{ext}", &stem[..idx])
            } else {
                format!("{stem}{ext}")
            }
        }
        None => format!("{stem}{ext}"),
    }
}

/// Split `path` into `(stem, ext)` where `ext` includes the leading dot
/// and any trailing `.gz` (so `.json.gz` is treated as one extension).
fn split_extension(path: &str) -> (&str, &str) {
    let without_gz = path.strip_suffix(GZ_SUFFIX).unwrap_or(path);
    match without_gz.rfind('.') {
        Some(idx) if idx > without_gz.rfind('/').unwrap_or(0) => {
            (&path[..idx], &path[idx..])
        }
        _ => (path, ""),
    }
}
