//! Sliding-window admission control for the Waypoint registry.
//!
//! The limiter is keyed: every decision is scoped to an identity string
//! (a client key, an API token, or just `"global"` in the single-tenant
//! deployment). Windows are advisory gates in front of link creation, not
//! a security boundary.

mod window;

use dashmap::DashMap;
use jiff::{SignedDuration, Timestamp};
use std::sync::Mutex;
use tracing::debug;
use typed_builder::TypedBuilder;
use waypoint_core::{Clock, SystemClock};
use window::SlidingWindow;

/// Configures a [`SlidingWindowLimiter`].
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct RateLimitSettings {
    /// Length of the trailing window.
    #[builder(default = SignedDuration::from_secs(60))]
    pub window: SignedDuration,
    /// Maximum admitted requests per window.
    #[builder(default = 10)]
    pub max_requests: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Slots still free in the current window.
    pub remaining: usize,
    /// Time until the oldest admitted request exits the window
    /// (zero when the window is empty).
    pub reset_in: SignedDuration,
    /// When blocked, the exact instant the next slot frees up.
    pub next_available_at: Option<Timestamp>,
}

/// Keyed sliding-window rate limiter.
///
/// Each identity's window sits behind its own mutex, so a `check` plus
/// `record` performed inside [`admit`](Self::admit) is serialized against
/// concurrent bursts for the same identity without blocking others.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    settings: RateLimitSettings,
    clock: C,
    windows: DashMap<String, Mutex<SlidingWindow>>,
}

impl SlidingWindowLimiter<SystemClock> {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    pub fn with_clock(settings: RateLimitSettings, clock: C) -> Self {
        Self {
            settings,
            clock,
            windows: DashMap::new(),
        }
    }

    fn decide(&self, state: &mut SlidingWindow, now: Timestamp) -> RateLimitDecision {
        state.purge(now, self.settings.window);

        let count = state.count();
        let allowed = count < self.settings.max_requests;
        let reset_in = state
            .oldest()
            .map(|oldest| (oldest + self.settings.window).duration_since(now))
            .unwrap_or(SignedDuration::ZERO);
        let next_available_at = if allowed {
            None
        } else {
            state.oldest().map(|oldest| oldest + self.settings.window)
        };

        RateLimitDecision {
            allowed,
            remaining: self.settings.max_requests - count,
            reset_in,
            next_available_at,
        }
    }

    fn with_window<T>(&self, identity: &str, f: impl FnOnce(&mut SlidingWindow) -> T) -> T {
        let entry = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| Mutex::new(SlidingWindow::default()));
        let mut state = entry.lock().expect("rate limit window lock");
        f(&mut state)
    }

    /// Reports the current admission state without consuming a slot.
    pub fn check(&self, identity: &str) -> RateLimitDecision {
        let now = self.clock.now();
        self.with_window(identity, |state| self.decide(state, now))
    }

    /// Consumes a slot for an admitted request.
    ///
    /// Must only be called after a `check` that allowed the request, and
    /// once per admitted request; prefer [`admit`](Self::admit), which
    /// does both under one lock.
    pub fn record(&self, identity: &str) {
        let now = self.clock.now();
        self.with_window(identity, |state| state.push(now));
    }

    /// Check-and-record under one lock: if the identity has a free slot it
    /// is consumed atomically, so concurrent bursts cannot over-admit.
    pub fn admit(&self, identity: &str) -> RateLimitDecision {
        let now = self.clock.now();
        self.with_window(identity, |state| {
            let mut decision = self.decide(state, now);
            if decision.allowed {
                state.push(now);
                decision.remaining -= 1;
            } else {
                debug!(
                    identity,
                    next_available_at = ?decision.next_available_at,
                    "rate limit window exhausted"
                );
            }
            decision
        })
    }
}
