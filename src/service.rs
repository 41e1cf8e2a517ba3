//! Top-level orchestration
//!
//! `Service::process` is the crate's single entry point: quorum check →
//! destination/retry/corruption URL resolution → `Pre` → loader+workers
//! running concurrently → `Post` → sink flush → `OnDone` disposition of
//! the source. One method threads a request through every pipeline
//! stage and always returns a result; a missed deadline diverts records
//! to retry rather than aborting in-flight work.

use std::sync::Arc;
use std::time::Instant;

use object_store::ObjectStore;
use tokio::sync::mpsc;

use crate::config::{Config, OnDoneAction};
use crate::deadline;
use crate::error::{Error, Result};
use crate::loader;
use crate::processor::{PostProcessor, PreProcessor, Processor};
use crate::quorum::{self, QuorumOutcome};
use crate::record::{Record, RowTypeRegistry};
use crate::reporter::{BaseReporter, ErrorKindBit, Reporter, Response};
use crate::request::Request;
use crate::sink::SinkWriter;
use crate::store;
use crate::url;
use crate::worker;

/// Owns a validated [`Config`] and the [`RowTypeRegistry`] used to
/// decode structured/columnar records, and runs requests through the
/// full pipeline.
pub struct Service {
    config: Config,
    registry: RowTypeRegistry,
}

impl Service {
    /// Build a service from a validated `config`, with an empty row-type registry.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            registry: RowTypeRegistry::new(),
        })
    }

    /// Build a service with a pre-populated row-type registry, required
    /// for structured/columnar sources.
    pub fn with_registry(config: Config, registry: RowTypeRegistry) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, registry })
    }

    /// The validated configuration this service was built with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable access to the row-type registry, for registering
    /// decoders after construction.
    pub fn registry_mut(&mut self) -> &mut RowTypeRegistry {
        &mut self.registry
    }

    /// Run `request` through quorum check, loader/worker pipeline, and
    /// `OnDone` disposition, with no externally-supplied deadline
    /// (the deadline comes from `Config.max_exec_time_ms` or
    /// `FUNCTION_TIMEOUT_SEC` alone).
    pub async fn process(
        &self,
        request: Request,
        processor: Arc<dyn Processor>,
        pre: Option<Arc<dyn PreProcessor>>,
        post: Option<Arc<dyn PostProcessor>>,
    ) -> Result<Response> {
        self.process_with_deadline(request, processor, pre, post, None)
            .await
    }

    /// Same as [`Service::process`], but honors an externally-supplied
    /// `context_deadline` (e.g. from a caller's own context/timeout),
    /// which takes precedence over `Config.max_exec_time_ms`.
    pub async fn process_with_deadline(
        &self,
        mut request: Request,
        processor: Arc<dyn Processor>,
        pre: Option<Arc<dyn PreProcessor>>,
        post: Option<Arc<dyn PostProcessor>>,
        context_deadline: Option<Instant>,
    ) -> Result<Response> {
        let reporter = Arc::new(BaseReporter::new(request.source_url.clone()));

        if !self.config.quorum_ext.is_empty() {
            match quorum::merge(&request.source_url, &self.config, &reporter).await? {
                QuorumOutcome::Skipped => return Ok(reporter.finish()),
                QuorumOutcome::Merged(merged_url) => {
                    let row_type = request.row_type.clone().or_else(|| self.config.row_type_name.clone());
                    request = crate::adapter::from_url(merged_url, row_type).await?;
                }
            }
        }

        let destination_url = if !self.config.destination.url.is_empty() {
            Some(url::expand(&self.config.destination.url, request.start_time))
        } else {
            self.config
                .destination
                .rotation_url
                .as_ref()
                .map(|rotation| url::expand(rotation, request.start_time))
        };
        let mirror_url = self
            .config
            .destination
            .mirror_url
            .as_ref()
            .map(|mirror| url::expand(mirror, request.start_time));

        let source_retry_count = url::retry_count(&request.source_url);
        let next_retry = source_retry_count + 1;
        let retry_template = if next_retry > self.config.max_retries {
            &self.config.sink.failed_url
        } else {
            &self.config.sink.retry_url
        };
        let retry_url = url::expand_retry(retry_template, request.start_time, source_retry_count);
        let corruption_url = url::expand(&self.config.sink.corruption_url, request.start_time);

        reporter
            .set_resolved_urls(
                destination_url,
                Some(retry_url.clone()),
                Some(corruption_url.clone()),
                mirror_url,
            )
            .await;

        let retry_sink = Arc::new(SinkWriter::new(retry_url));
        let corruption_sink = Arc::new(SinkWriter::new(corruption_url));

        let deadlines = deadline::compute(context_deadline, &self.config, Instant::now());

        if let Some(pre) = &pre {
            pre.pre(&request, reporter.as_ref()).await?;
        }

        let channel_capacity = 10 * self.config.concurrency + 1;
        let (tx, rx) = mpsc::channel::<Record>(channel_capacity);

        let worker_handle = {
            let processor = processor.clone();
            let retry_sink = retry_sink.clone();
            let corruption_sink = corruption_sink.clone();
            let reporter: Arc<dyn Reporter> = reporter.clone();
            let concurrency = self.config.concurrency;
            tokio::spawn(async move {
                worker::run_pool(rx, concurrency, deadlines, processor, retry_sink, corruption_sink, reporter).await;
            })
        };

        let effective_source_url = request.source_url.clone();
        let effective_row_type = request.row_type.clone();

        let loader_result = loader::run(
            request,
            &self.config.sort,
            self.config.batch_size,
            &deadlines,
            &self.registry,
            tx,
            &retry_sink,
            reporter.as_ref(),
        )
        .await;

        if let Err(err) = loader_result {
            reporter.record_error(ErrorKindBit::Unknown, &err.to_string());
        }

        let _ = worker_handle.await;

        if let Some(post) = &post {
            if let Err(err) = post.post(effective_row_type.as_deref(), reporter.as_ref()).await {
                reporter.record_error(ErrorKindBit::Process, &err.to_string());
            }
        }

        if let Err(err) = retry_sink.close().await {
            reporter.add_retry_write_error(&err.to_string());
        }
        if let Err(err) = corruption_sink.close().await {
            reporter.add_corruption_write_error(&err.to_string());
        }

        self.apply_on_done(&effective_source_url).await;

        Ok(reporter.finish())
    }

    /// Post-success disposition of the source artifact via `OnDone`:
    /// leaves it in place, deletes it, or moves it to `on_done_url`.
    /// Failures here are logged, not propagated — the request has
    /// already completed by the time this runs.
    async fn apply_on_done(&self, source_url: &str) {
        match self.config.destination.on_done {
            OnDoneAction::None => {}
            OnDoneAction::Delete => {
                if let Ok((store, path)) = store::resolve(source_url) {
                    if let Err(err) = store.delete(&path).await {
                        tracing::warn!(source_url, error = %err, "on_done delete failed");
                    }
                }
            }
            OnDoneAction::Move => {
                let Some(target_url) = &self.config.destination.on_done_url else {
                    tracing::warn!(source_url, "on_done=move configured without on_done_url");
                    return;
                };
                if let Err(err) = move_object(source_url, target_url).await {
                    tracing::warn!(source_url, target_url, error = %err, "on_done move failed");
                }
            }
        }
    }
}

async fn move_object(source_url: &str, target_url: &str) -> Result<()> {
    let (source_store, source_path) = store::resolve(source_url)?;
    let (target_store, target_path) = store::resolve(target_url)?;
    let bytes = source_store.get(&source_path).await.map_err(Error::Store)?.bytes().await.map_err(Error::Store)?;
    target_store.put(&target_path, bytes.into()).await.map_err(Error::Store)?;
    source_store.delete(&source_path).await.map_err(Error::Store)?;
    Ok(())
}
