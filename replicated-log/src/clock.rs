//! Election timer bookkeeping.
//!
//! The timer itself is a spawned task that sleeps for a randomized duration.
//! [`ElectionClock`] only tracks which sleeper is the live one: every reset
//! bumps a generation counter and aborts the previous sleeper, and a sleeper
//! is allowed to act only if its generation is still current when it wakes.
//! That way a late wake-up from a superseded timer can never start an
//! election on state that has moved on.

use std::time::Duration;

use rand::Rng;
use tokio::task::AbortHandle;

/// Picks an election timeout uniformly from `[min, max]`.
pub fn random_election_timeout(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}

#[derive(Debug, Default)]
pub struct ElectionClock {
    generation: u64,
    armed: bool,
    pending: bool,
    task: Option<AbortHandle>,
}

impl ElectionClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidates the running timer and requests a fresh one.
    ///
    /// The runtime picks the request up through [`ElectionClock::take_pending`]
    /// and spawns the sleeper.
    pub fn reset(&mut self) -> u64 {
        self.cancel();
        self.generation += 1;
        self.armed = true;
        self.pending = true;
        self.generation
    }

    /// Invalidates the running timer without scheduling another one.
    pub fn stop(&mut self) {
        self.cancel();
        self.generation += 1;
        self.armed = false;
        self.pending = false;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True if a sleeper of this generation is still the live timer.
    pub fn is_current(&self, generation: u64) -> bool {
        self.armed && self.generation == generation
    }

    /// Returns the generation that still needs a sleeper, at most once.
    pub fn take_pending(&mut self) -> Option<u64> {
        if std::mem::take(&mut self.pending) {
            Some(self.generation)
        } else {
            None
        }
    }

    /// Records the sleeper spawned for `generation`.
    ///
    /// A sleeper for an already superseded generation is aborted right away.
    pub fn attach(&mut self, generation: u64, task: AbortHandle) {
        if self.is_current(generation) {
            if let Some(previous) = self.task.replace(task) {
                previous.abort();
            }
        } else {
            task.abort();
        }
    }

    /// Consumes the timer on behalf of a sleeper that just woke up.
    ///
    /// Returns false when the sleeper is stale. On success the sleeper's own
    /// abort handle is dropped rather than aborted, so the caller can keep
    /// running (and reset the clock) from inside that task.
    pub fn fire(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.task = None;
        self.armed = false;
        true
    }

    fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_timeout_stays_in_bounds() {
        let min = Duration::from_millis(150);
        let max = Duration::from_millis(300);
        for _ in 0..200 {
            let timeout = random_election_timeout(min, max);
            assert!(timeout >= min && timeout <= max, "{timeout:?} out of bounds");
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let d = Duration::from_millis(200);
        assert_eq!(random_election_timeout(d, d), d);
    }

    #[test]
    fn reset_supersedes_previous_generation() {
        let mut clock = ElectionClock::new();
        let first = clock.reset();
        let second = clock.reset();

        assert!(second > first);
        assert!(!clock.is_current(first));
        assert!(clock.is_current(second));
    }

    #[test]
    fn pending_request_is_taken_once() {
        let mut clock = ElectionClock::new();
        let generation = clock.reset();

        assert_eq!(clock.take_pending(), Some(generation));
        assert_eq!(clock.take_pending(), None);
    }

    #[test]
    fn stop_disarms_without_pending_request() {
        let mut clock = ElectionClock::new();
        let generation = clock.reset();
        clock.stop();

        assert!(!clock.is_armed());
        assert!(!clock.is_current(generation));
        assert_eq!(clock.take_pending(), None);
    }

    #[test]
    fn fire_consumes_the_live_generation_only() {
        let mut clock = ElectionClock::new();
        let stale = clock.reset();
        let live = clock.reset();

        assert!(!clock.fire(stale));
        assert!(clock.fire(live));
        // A second wake-up for the same generation is a no-op.
        assert!(!clock.fire(live));
    }

    #[tokio::test]
    async fn attach_aborts_superseded_sleeper() {
        let mut clock = ElectionClock::new();
        let stale = clock.reset();
        clock.reset();

        let task = tokio::spawn(std::future::pending::<()>());
        clock.attach(stale, task.abort_handle());

        let err = task.await.expect_err("stale sleeper should be aborted");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn reset_aborts_attached_sleeper() {
        let mut clock = ElectionClock::new();
        let generation = clock.reset();
        let task = tokio::spawn(std::future::pending::<()>());
        clock.attach(generation, task.abort_handle());

        clock.reset();

        let err = task.await.expect_err("reset should abort the sleeper");
        assert!(err.is_cancelled());
    }
}
