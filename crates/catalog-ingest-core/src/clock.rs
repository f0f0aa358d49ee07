//! Update timestamps for product writes.
//!
//! `UpdateClock` wraps a wall-clock source and hands out timestamps that:
//! - never go backwards within a run, even if the wall clock does
//! - always land strictly after a given floor (the previous `updated_at`)
//!
//! The second rule is what makes an update observable: a product whose
//! fields changed always ends up with a later timestamp than it had.

use chrono::{DateTime, Duration, Utc};

/// Smallest step the clock advances by when the wall clock has not moved.
fn step() -> Duration {
    Duration::microseconds(1)
}

/// A source of wall-clock time.
pub trait TimeSource {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> TimeSource for F
where
    F: Fn() -> DateTime<Utc>,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// Monotonic timestamp generator for `updated_at` values.
#[derive(Debug, Clone)]
pub struct UpdateClock<T = WallClock> {
    source: T,
    last: Option<DateTime<Utc>>,
}

impl UpdateClock<WallClock> {
    /// Create a clock backed by the system wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_source(WallClock)
    }
}

impl Default for UpdateClock<WallClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeSource> UpdateClock<T> {
    /// Create a clock backed by an arbitrary time source.
    #[must_use]
    pub fn with_source(source: T) -> Self {
        Self { source, last: None }
    }

    /// Generate a timestamp for a local write.
    ///
    /// Guarantees the returned timestamp is greater than any previously
    /// generated one.
    pub fn tick(&mut self) -> DateTime<Utc> {
        let now = self.source.now();

        let next = match self.last {
            Some(last) if now <= last => last + step(),
            _ => now,
        };

        self.last = Some(next);
        next
    }

    /// Generate a timestamp strictly after `floor`.
    ///
    /// Used when overwriting a product so the new `updated_at` advances
    /// past the stored one even under clock skew between invocations.
    pub fn tick_after(&mut self, floor: DateTime<Utc>) -> DateTime<Utc> {
        let ticked = self.tick();
        if ticked > floor {
            return ticked;
        }

        let next = floor + step();
        self.last = Some(next);
        next
    }
}
