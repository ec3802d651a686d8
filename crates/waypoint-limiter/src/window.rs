use jiff::{SignedDuration, Timestamp};
use std::collections::VecDeque;

/// The per-identity window state: timestamps of past admitted requests,
/// ordered oldest first, bounded to a trailing interval.
///
/// All methods take `now` explicitly so the arithmetic stays pure and
/// testable; the limiter supplies it from its clock.
#[derive(Debug, Default)]
pub(crate) struct SlidingWindow {
    admitted: VecDeque<Timestamp>,
}

impl SlidingWindow {
    /// Drops timestamps that have exited the trailing window.
    ///
    /// A timestamp exits exactly at `ts + window`: at that instant the
    /// slot it occupied frees up again.
    pub(crate) fn purge(&mut self, now: Timestamp, window: SignedDuration) {
        let cutoff = now - window;
        while self
            .admitted
            .front()
            .is_some_and(|&oldest| oldest <= cutoff)
        {
            self.admitted.pop_front();
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.admitted.len()
    }

    pub(crate) fn oldest(&self) -> Option<Timestamp> {
        self.admitted.front().copied()
    }

    pub(crate) fn push(&mut self, now: Timestamp) {
        self.admitted.push_back(now);
    }
}
