//! Deadline computation: request deadline, worker deadline, loader deadline
//!
//! The request deadline is derived from a context deadline if present,
//! else from `Config.max_exec_time_ms`, optionally capped by the
//! `FUNCTION_TIMEOUT_SEC` environment variable. Two sub-deadlines are
//! derived from it: the worker deadline (`deadline - deadline_reduction_ms`)
//! and the loader deadline (`worker_deadline - loader_deadline_lag_ms`).

use std::time::{Duration, Instant};

use crate::config::Config;

/// The three instants governing one request's admission/drain window.
#[derive(Clone, Copy, Debug)]
pub struct Deadlines {
    /// The overall request deadline, if any
    pub request: Option<Instant>,
    /// The instant beyond which the worker pool diverts records to retry
    pub worker: Option<Instant>,
    /// The instant beyond which the loader diverts records to retry
    pub loader: Option<Instant>,
}

impl Deadlines {
    /// Whether `now` is past the worker deadline.
    pub fn worker_expired(&self, now: Instant) -> bool {
        self.worker.is_some_and(|d| now > d)
    }

    /// Whether `now` is past the loader deadline.
    pub fn loader_expired(&self, now: Instant) -> bool {
        self.loader.is_some_and(|d| now > d)
    }
}

/// Compute the deadline window for a request starting "now", given an
/// optional externally-supplied deadline (e.g. from a context/caller)
/// and the crate's [`Config`].
///
/// Precedence: an explicit `context_deadline` wins; else
/// `Config.max_exec_time_ms`; else `FUNCTION_TIMEOUT_SEC` (one second
/// less than its value) when set; else the request has no deadline.
pub fn compute(context_deadline: Option<Instant>, config: &Config, now: Instant) -> Deadlines {
    let request = context_deadline
        .or_else(|| config.max_exec_time().map(|d| now + d))
        .or_else(|| function_timeout_deadline(now));

    let worker = request.map(|d| {
        d.checked_sub(config.deadline_reduction())
            .unwrap_or(now)
    });
    let loader = worker.map(|d| d.checked_sub(config.loader_deadline_lag()).unwrap_or(now));

    Deadlines {
        request,
        worker,
        loader,
    }
}

fn function_timeout_deadline(now: Instant) -> Option<Instant> {
    let secs: u64 = std::env::var("FUNCTION_TIMEOUT_SEC").ok()?.parse().ok()?;
    let secs = secs.saturating_sub(1);
    Some(now + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_deadline_when_nothing_configured() {
        // SAFETY: test-local env var, no other test in this crate reads it concurrently.
        unsafe { std::env::remove_var("FUNCTION_TIMEOUT_SEC") };
        let config = Config::default();
        let d = compute(None, &config, Instant::now());
        assert!(d.request.is_none());
        assert!(d.worker.is_none());
        assert!(d.loader.is_none());
    }

    #[test]
    fn context_deadline_takes_precedence() {
        let now = Instant::now();
        let explicit = now + Duration::from_secs(10);
        let mut config = Config::default();
        config.deadline.max_exec_time_ms = 1000;
        let d = compute(Some(explicit), &config, now);
        assert_eq!(d.request, Some(explicit));
    }

    #[test]
    fn worker_deadline_precedes_request_deadline_by_reduction() {
        let now = Instant::now();
        let mut config = Config::default();
        config.deadline.max_exec_time_ms = 2000;
        config.deadline.deadline_reduction_ms = 500;
        let d = compute(None, &config, now);
        let request = d.request.unwrap();
        let worker = d.worker.unwrap();
        assert_eq!(request - worker, Duration::from_millis(500));
    }

    #[test]
    fn loader_deadline_precedes_worker_deadline_by_lag() {
        let now = Instant::now();
        let mut config = Config::default();
        config.deadline.max_exec_time_ms = 2000;
        config.deadline.deadline_reduction_ms = 500;
        config.deadline.loader_deadline_lag_ms = 200;
        let d = compute(None, &config, now);
        let worker = d.worker.unwrap();
        let loader = d.loader.unwrap();
        assert_eq!(worker - loader, Duration::from_millis(200));
    }

    #[test]
    fn worker_expired_detects_past_deadline() {
        let now = Instant::now();
        let deadlines = Deadlines {
            request: Some(now),
            worker: Some(now),
            loader: Some(now),
        };
        assert!(deadlines.worker_expired(now + Duration::from_millis(1)));
        assert!(!deadlines.worker_expired(now - Duration::from_millis(1)));
    }
}
