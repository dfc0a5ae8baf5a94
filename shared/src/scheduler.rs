//! Admission control for tile fetches.
//!
//! The viewport layer enqueues a request for every tile that enters view and
//! cancels the ones that leave, then calls [`LoadScheduler::process`]. Each
//! pass admits the highest-priority pending requests until the concurrency
//! ceiling is reached. Hosts report transfer outcomes through
//! [`LoadScheduler::complete`] and process again to backfill the freed slot.
//!
//! All operations are synchronous and expected to run on one logical thread;
//! transfer completions must be delivered back onto that thread.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::request::{LoadRequest, LoadTarget};
use crate::session::SessionCache;

pub const DEFAULT_MAX_CONCURRENT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on simultaneously active transfers. Zero is treated as one.
    pub max_concurrent: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    pub fn ceiling(&self) -> usize {
        self.max_concurrent.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError<I: Debug> {
    #[error("request {id:?} is already scheduled")]
    DuplicateRequest { id: I },
}

/// What `enqueue` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Waiting for admission by `process`.
    Queued,
    /// The URL was already loaded this session, so the transfer was begun
    /// immediately and the scheduler does not track it.
    Dispatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Loaded,
    Failed,
}

/// Settlement of an admitted request, delivered at most once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<I> {
    pub id: I,
    pub url: String,
    pub success: bool,
}

#[derive(Debug)]
struct Queued<I, T> {
    seq: u64,
    request: LoadRequest<I, T>,
}

#[derive(Debug)]
pub struct LoadScheduler<I, T> {
    config: SchedulerConfig,
    pending: HashMap<I, Queued<I, T>>,
    active: HashMap<I, LoadRequest<I, T>>,
    session: SessionCache,
    next_seq: u64,
}

impl<I, T> LoadScheduler<I, T>
where
    I: Eq + Hash + Clone + Debug,
    T: LoadTarget,
{
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_session(config, SessionCache::new())
    }

    pub fn with_session(config: SchedulerConfig, session: SessionCache) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            active: HashMap::new(),
            session,
            next_seq: 0,
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_pending(&self, id: &I) -> bool {
        self.pending.contains_key(id)
    }

    pub fn is_active(&self, id: &I) -> bool {
        self.active.contains_key(id)
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.active.is_empty()
    }

    /// Register a tile fetch. Admission waits for the next `process` call,
    /// unless the URL is already session-cached, in which case the transfer
    /// begins right away and bypasses the queue.
    pub fn enqueue(
        &mut self,
        id: I,
        priority: i32,
        url: impl Into<String>,
        mut target: T,
    ) -> Result<Enqueued, SchedulerError<I>> {
        if self.pending.contains_key(&id) || self.active.contains_key(&id) {
            return Err(SchedulerError::DuplicateRequest { id });
        }

        let url = url.into();
        if self.session.seen(&url) {
            trace!(?id, %url, "session cache hit, dispatching immediately");
            target.begin(&url);
            return Ok(Enqueued::Dispatched);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        let request = LoadRequest::new(id.clone(), priority, url, target);
        self.pending.insert(id, Queued { seq, request });
        Ok(Enqueued::Queued)
    }

    /// Withdraw a request wherever it is. An active request gives up its slot
    /// immediately; its transfer may still finish, but the eventual `complete`
    /// is ignored. Returns `false` if the id was unknown.
    pub fn cancel(&mut self, id: &I) -> bool {
        if let Some(mut queued) = self.pending.remove(id) {
            queued.request.deny();
            trace!(?id, "cancelled pending request");
            return true;
        }
        if let Some(mut request) = self.active.remove(id) {
            request.deny();
            debug!(?id, url = request.source(), "cancelled in-flight request");
            return true;
        }
        false
    }

    /// Report a transfer outcome. Returns the settlement for active requests
    /// and `None` for anything cancelled, denied or unknown.
    pub fn complete(&mut self, id: &I, outcome: Outcome) -> Option<Settled<I>> {
        let Some(mut request) = self.active.remove(id) else {
            trace!(?id, ?outcome, "ignoring completion of untracked request");
            return None;
        };
        request.finish();

        let success = outcome == Outcome::Loaded;
        if success {
            self.session.record(request.source());
        } else {
            debug!(?id, url = request.source(), "tile transfer failed");
        }

        Some(Settled {
            id: id.clone(),
            url: request.source().to_string(),
            success,
        })
    }

    /// Admit pending requests, highest priority first and earliest enqueued
    /// among equals, until the ceiling is reached. Requests whose target has
    /// detached are dropped without using a slot. Returns how many started.
    pub fn process(&mut self) -> usize {
        let ceiling = self.config.ceiling();
        if self.active.len() >= ceiling || self.pending.is_empty() {
            return 0;
        }

        let mut order: Vec<(i32, u64, I)> = self
            .pending
            .iter()
            .map(|(id, queued)| (queued.request.priority(), queued.seq, id.clone()))
            .collect();
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        let mut admitted = 0;
        for (_, _, id) in order {
            if self.active.len() >= ceiling {
                break;
            }
            let Some(Queued { mut request, .. }) = self.pending.remove(&id) else {
                continue;
            };
            if request.start() {
                trace!(?id, url = request.source(), "admitted");
                self.active.insert(id, request);
                admitted += 1;
            } else {
                trace!(?id, "dropped stale request with detached target");
            }
        }

        debug_assert!(self.active.len() <= ceiling);
        admitted
    }
}
