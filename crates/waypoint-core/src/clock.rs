use jiff::{SignedDuration, Timestamp};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A source of time for components whose behavior depends on "now".
///
/// The rate limiter, the id generator and the lifecycle sweeper all take a
/// `Clock` parameter so their time arithmetic can be exercised in tests
/// without sleeping.
pub trait Clock: Send + Sync {
    /// Returns the current time of the clock.
    fn now(&self) -> Timestamp;
    /// Block and wait until the clock reaches the target time.
    fn wait_until(&self, target: Timestamp);
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    fn wait_until(&self, target: Timestamp) {
        // Re-evaluate after each sleep so spurious wakeups don't overshoot.
        loop {
            let now = Timestamp::now();
            if now >= target {
                return;
            }
            let remaining = target.duration_since(now);
            let millis = remaining.as_millis().max(1) as u64;
            std::thread::sleep(Duration::from_millis(millis));
        }
    }
}

/// A hand-driven clock that only moves when told to.
///
/// Intended for tests: `advance` moves time forward, and `wait_until`
/// jumps straight to the target instead of sleeping.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Creates a clock starting at the given number of unix seconds.
    pub fn at_second(second: i64) -> Self {
        Self::new(Timestamp::from_second(second).expect("valid unix second"))
    }

    pub fn advance(&self, by: SignedDuration) {
        let mut now = self.now.lock().expect("manual clock lock");
        *now += by;
    }

    pub fn set(&self, to: Timestamp) {
        let mut now = self.now.lock().expect("manual clock lock");
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().expect("manual clock lock")
    }

    fn wait_until(&self, target: Timestamp) {
        let mut now = self.now.lock().expect("manual clock lock");
        if *now < target {
            *now = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at_second(100);
        assert_eq!(clock.now().as_second(), 100);

        clock.advance(SignedDuration::from_secs(5));
        assert_eq!(clock.now().as_second(), 105);
    }

    #[test]
    fn manual_clock_wait_until_jumps_forward() {
        let clock = ManualClock::at_second(100);
        let target = Timestamp::from_second(200).unwrap();

        clock.wait_until(target);
        assert_eq!(clock.now(), target);

        // Waiting for a past instant does not move the clock backward.
        clock.wait_until(Timestamp::from_second(50).unwrap());
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
