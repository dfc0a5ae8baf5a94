/// The render slot a tile fetch lands in: an image element, a scene node,
/// a file on disk.
pub trait LoadTarget {
    /// Whether the slot still exists. A detached slot is never started.
    fn is_attached(&self) -> bool;

    /// Kick off the asynchronous transfer of `url` into this slot. The host
    /// reports the outcome back through the scheduler's `complete`.
    fn begin(&mut self, url: &str);
}

/// Lifecycle of one [`LoadRequest`]. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// One scheduling unit: a tile fetch waiting for, or holding, a concurrency
/// slot.
#[derive(Debug)]
pub struct LoadRequest<I, T> {
    id: I,
    priority: i32,
    source: String,
    state: RequestState,
    target: Option<T>,
}

impl<I, T: LoadTarget> LoadRequest<I, T> {
    pub fn new(id: I, priority: i32, source: impl Into<String>, target: T) -> Self {
        Self {
            id,
            priority,
            source: source.into(),
            state: RequestState::Pending,
            target: Some(target),
        }
    }

    pub fn id(&self) -> &I {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Release the target so nothing can start or complete into it anymore.
    /// Safe to call repeatedly and after the transfer has begun; an in-flight
    /// transfer keeps running but its result belongs to no one.
    pub fn deny(&mut self) {
        self.target = None;
        if !self.state.is_terminal() {
            self.state = RequestState::Cancelled;
        }
    }

    /// Begin the transfer. Returns `false` without touching the target if the
    /// request was denied or its slot has been detached.
    pub fn start(&mut self) -> bool {
        if self.state != RequestState::Pending {
            return false;
        }
        match self.target.as_mut() {
            Some(target) if target.is_attached() => {
                target.begin(&self.source);
                self.state = RequestState::Active;
                true
            }
            _ => {
                self.deny();
                false
            }
        }
    }

    /// Mark an active transfer as settled. Returns `false` for any other state.
    pub fn finish(&mut self) -> bool {
        if self.state != RequestState::Active {
            return false;
        }
        self.state = RequestState::Completed;
        self.target = None;
        true
    }
}
