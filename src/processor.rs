//! Processor interface
//!
//! `Processor` is `#[async_trait]` so it can be stored as
//! `Arc<dyn Processor>`. `PreProcessor`/`PostProcessor` are separate
//! optional traits; a caller wires up the optional hooks it wants via
//! `Option<Arc<dyn ...>>` fields, resolved statically at construction
//! time rather than via a runtime interface check.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ProcessError;
use crate::record::Record;
use crate::reporter::Reporter;
use crate::request::Request;

/// The required user-supplied callback: transform one record.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Process one record. Returning `Ok(())` counts it as processed;
    /// an `Err` is classified by [`crate::error::ProcessError::kind`]
    /// and routed to the retry or corruption sink.
    async fn process(&self, record: &Record, reporter: &dyn Reporter) -> Result<(), ProcessError>;
}

/// Optional hook run once before workers start. Takes the request
/// itself (not yet consumed by the loader at this point in
/// [`crate::service::Service::process`]), so a hook can inspect the
/// source URL or row type to decide what to do.
#[async_trait]
pub trait PreProcessor: Send + Sync {
    /// Run once before any worker is spawned; errors abort the request.
    async fn pre(&self, request: &Request, reporter: &dyn Reporter) -> Result<(), ProcessError>;
}

/// Optional hook run once after the worker pool has fully drained. By
/// this point the request's reader has been consumed by the loader, so
/// only its row type is still available.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Run once after every worker has returned.
    async fn post(&self, row_type: Option<&str>, reporter: &dyn Reporter) -> Result<(), ProcessError>;
}

/// Selects a per-request sub-processor by inspecting the request's
/// source URL. The factory is consulted once, in `Pre`.
pub trait ProcessorFactory: Send + Sync {
    /// Select a sub-processor for `request`.
    fn select(&self, request: &Request) -> Arc<dyn Processor>;
}

/// A [`Processor`] whose `process` dispatches to a per-request
/// sub-processor selected by a [`ProcessorFactory`]. The factory is
/// consulted once in [`Handler::pre`]; the selected sub-processor's own
/// `Pre`/`Post` are forwarded when present.
pub struct Handler {
    factory: Arc<dyn ProcessorFactory>,
    selected: tokio::sync::RwLock<Option<Arc<dyn Processor>>>,
    pre_hooks: HashMap<String, Arc<dyn PreProcessor>>,
    post_hooks: HashMap<String, Arc<dyn PostProcessor>>,
}

impl Handler {
    /// Build a handler dispatching via `factory`. `pre_hooks`/`post_hooks`
    /// are keyed by the same name the factory uses to identify a
    /// sub-processor, so `Pre`/`Post` can be forwarded when registered.
    pub fn new(
        factory: Arc<dyn ProcessorFactory>,
        pre_hooks: HashMap<String, Arc<dyn PreProcessor>>,
        post_hooks: HashMap<String, Arc<dyn PostProcessor>>,
    ) -> Self {
        Self {
            factory,
            selected: tokio::sync::RwLock::new(None),
            pre_hooks,
            post_hooks,
        }
    }
}

#[async_trait]
impl Processor for Handler {
    async fn process(&self, record: &Record, reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let guard = self.selected.read().await;
        match guard.as_ref() {
            Some(processor) => processor.process(record, reporter).await,
            None => Err(ProcessError::Retriable(
                "handler has no selected sub-processor; select() was not called".to_string(),
            )),
        }
    }
}

/// Selects and caches the sub-processor for `request`, running its
/// `Pre` hook (by name) if one is registered. Wired into
/// [`crate::service::Service::process`] via the `pre` slot, so a
/// `Handler` satisfies the processor interface's request-driven
/// dispatch without any special-casing in the service.
#[async_trait]
impl PreProcessor for Handler {
    async fn pre(&self, request: &Request, reporter: &dyn Reporter) -> Result<(), ProcessError> {
        let processor = self.factory.select(request);
        if let Some(name) = &request.row_type {
            if let Some(pre) = self.pre_hooks.get(name) {
                pre.pre(request, reporter).await?;
            }
        }
        *self.selected.write().await = Some(processor);
        Ok(())
    }
}

/// Runs the registered `Post` hook for the selected sub-processor's
/// name, if any. Wired into `Service::process` via the `post` slot.
#[async_trait]
impl PostProcessor for Handler {
    async fn post(&self, row_type: Option<&str>, reporter: &dyn Reporter) -> Result<(), ProcessError> {
        if let Some(name) = row_type {
            if let Some(post) = self.post_hooks.get(name) {
                return post.post(row_type, reporter).await;
            }
        }
        Ok(())
    }
}
