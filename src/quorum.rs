//! Quorum-merge precondition step
//!
//! Built on the same `object_store` list/put/delete primitives used
//! elsewhere in this crate (see DESIGN.md).

use bytes::Bytes;
use object_store::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reporter::BaseReporter;
use crate::store;
use crate::url::is_gz;

/// Outcome of the quorum-merge precondition: either the source is
/// untouched (no quorum marker, or marker absent from the extension)
/// or a new, merged source URL replaces the original.
pub enum QuorumOutcome {
    /// `Config.quorum_ext` is empty, or the marker is absent from the
    /// source extension — request proceeds unchanged.
    Skipped,
    /// Sibling files were merged into this new source URL; the caller
    /// should re-open a request against it.
    Merged(String),
}

/// Run the quorum-merge precondition against `source_url`.
///
/// Precondition: `config.quorum_ext` is non-empty. If the source URL's
/// extension does not contain the marker, returns
/// [`QuorumOutcome::Skipped`] and the reporter's status is set to
/// `QuorumSkipped`. Otherwise: lists the containing directory
/// (direct children only — `list_with_delimiter`, not a recursive
/// `list`, so nested sub-directories are left alone), merges every
/// sibling file (skipping files still bearing the marker) into a
/// writer at the marker-stripped URL, decompressing on the fly where
/// the suffix indicates gzip, deletes every merged sibling plus the
/// original, and returns the merged URL.
pub async fn merge(
    source_url: &str,
    config: &Config,
    reporter: &BaseReporter,
) -> Result<QuorumOutcome> {
    if config.quorum_ext.is_empty() || !source_url.contains(&config.quorum_ext) {
        reporter.mark_quorum_skipped().await;
        return Ok(QuorumOutcome::Skipped);
    }

    let (store, source_path) = store::resolve(source_url)?;
    let (_, dir_path) = store::resolve_parent(source_url)?;

    let merged_url = source_url.replacen(&config.quorum_ext, "", 1);
    let merged_path = Path::from(merged_url.trim_start_matches(|c: char| c == '/'));

    // list_with_delimiter restricts to the direct children of dir_path;
    // a plain list() would recurse through every nested key on real
    // (S3/GCS/local) backends, pulling in siblings' sub-directories.
    let listing = store
        .list_with_delimiter(Some(&dir_path))
        .await
        .map_err(Error::Store)?;
    let mut merged_bytes: Vec<u8> = Vec::new();
    let mut to_delete: Vec<Path> = Vec::new();

    for meta in listing.objects {
        let name = store::file_name(&meta.location).unwrap_or_default();
        if name.is_empty() || name.contains(&config.quorum_ext) {
            continue;
        }

        let bytes = store
            .get(&meta.location)
            .await
            .map_err(Error::Store)?
            .bytes()
            .await
            .map_err(Error::Store)?;

        let decoded = decompress_if_needed(&name, bytes)?;
        merged_bytes.extend_from_slice(&decoded);
        to_delete.push(meta.location);
    }

    store
        .put(&merged_path, Bytes::from(merged_bytes).into())
        .await
        .map_err(Error::Store)?;

    for path in to_delete {
        store.delete(&path).await.map_err(Error::Store)?;
    }
    store.delete(&source_path).await.map_err(Error::Store)?;

    Ok(QuorumOutcome::Merged(merged_url))
}

fn decompress_if_needed(name: &str, bytes: Bytes) -> Result<Vec<u8>> {
    if is_gz(name) {
        use flate2::read::GzDecoder;
        use std::io::Read;
        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}
