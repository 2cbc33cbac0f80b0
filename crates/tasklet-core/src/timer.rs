use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Scheduled<A> {
    handle: TimerHandle,
    due: Instant,
    action: A,
}

/// One-shot deferred actions, polled by the host event loop.
#[derive(Debug)]
pub struct DeferredQueue<A> {
    next_handle: u64,
    pending: Vec<Scheduled<A>>,
}

impl<A> Default for DeferredQueue<A> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            pending: Vec::new(),
        }
    }
}

impl<A> DeferredQueue<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, now: Instant, delay: Duration, action: A) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        let due = now + delay;
        trace!(handle = handle.0, ?delay, "scheduled deferred action");
        self.pending.push(Scheduled {
            handle,
            due,
            action,
        });
        handle
    }

    /// Returns the action if it had not fired yet.
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<A> {
        let idx = self.pending.iter().position(|s| s.handle == handle)?;
        Some(self.pending.remove(idx).action)
    }

    /// Removes and returns every action due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(TimerHandle, A)> {
        let (mut due, rest): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|s| s.due <= now);
        self.pending = rest;
        due.sort_by_key(|s| (s.due, s.handle));
        due.into_iter().map(|s| (s.handle, s.action)).collect()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|s| s.due).min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
