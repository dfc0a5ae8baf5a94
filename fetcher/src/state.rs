use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::warn;

use crate::config::{USER_AGENT, upstream_connect_timeout, upstream_http_timeout};

#[derive(Clone)]
pub struct FetcherState {
    pub http_client: reqwest::Client,
    pub counters: Arc<FetchCounters>,
}

#[derive(Debug, Default)]
pub struct FetchCounters {
    loaded_total: AtomicU64,
    failed_total: AtomicU64,
    cancelled_total: AtomicU64,
    stale_completions_total: AtomicU64,
    cache_dispatched_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchCountersSnapshot {
    pub loaded_total: u64,
    pub failed_total: u64,
    pub cancelled_total: u64,
    pub stale_completions_total: u64,
    pub cache_dispatched_total: u64,
}

impl FetchCounters {
    pub fn snapshot(&self) -> FetchCountersSnapshot {
        FetchCountersSnapshot {
            loaded_total: self.loaded_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
            cancelled_total: self.cancelled_total.load(Ordering::Relaxed),
            stale_completions_total: self.stale_completions_total.load(Ordering::Relaxed),
            cache_dispatched_total: self.cache_dispatched_total.load(Ordering::Relaxed),
        }
    }

    pub fn record_loaded(&self) {
        self.loaded_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled_total.fetch_add(1, Ordering::Relaxed);
    }

    /// A transfer settled after its tile had already left the view.
    pub fn record_stale_completion(&self) {
        self.stale_completions_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_dispatched(&self) {
        self.cache_dispatched_total
            .fetch_add(1, Ordering::Relaxed);
    }
}

impl FetcherState {
    pub fn new() -> Result<Self, reqwest::Error> {
        let request_timeout = upstream_http_timeout();
        let connect_timeout = upstream_connect_timeout();
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .or_else(|e| {
                warn!(
                    error = %e,
                    "failed to build configured HTTP client, retrying without custom user-agent"
                );
                reqwest::Client::builder()
                    .timeout(request_timeout)
                    .connect_timeout(connect_timeout)
                    .build()
            })?;
        Ok(Self {
            http_client,
            counters: Arc::new(FetchCounters::default()),
        })
    }
}
