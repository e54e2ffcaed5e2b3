use std::time::{Duration, Instant};

/// A fixed-period deadline the runtime loop waits on.
///
/// Missed deadlines do not queue up: if the loop was busy past one or more
/// periods, the next deadline is one period from when it finally fired.
#[derive(Debug, Clone, Copy)]
pub struct Cadence {
    period: Duration,
    next_due: Instant,
}

impl Cadence {
    /// A cadence whose first deadline is `now`.
    #[must_use]
    pub const fn immediate(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now,
        }
    }

    /// A cadence whose first deadline is one period after `now`.
    #[must_use]
    pub fn delayed(period: Duration, now: Instant) -> Self {
        Self {
            period,
            next_due: now + period,
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Record a firing and schedule the next deadline.
    pub fn fire(&mut self, now: Instant) {
        self.next_due += self.period;
        if self.next_due <= now {
            self.next_due = now + self.period;
        }
    }

    #[must_use]
    pub fn time_until(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }

    /// Fraction of the current period already elapsed, in `[0, 1]`.
    #[must_use]
    pub fn progress(&self, now: Instant) -> f64 {
        if self.period.is_zero() {
            return 1.0;
        }
        let remaining = self.time_until(now).as_secs_f64() / self.period.as_secs_f64();
        (1.0 - remaining).clamp(0.0, 1.0)
    }
}
