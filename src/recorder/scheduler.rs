use tokio::time::{Duration, Instant};

/// Fires at most once per `period` of elapsed time.
///
/// A cadence that falls behind (e.g. the controller was busy in a slow
/// scanner query) fires once and is rescheduled from the current time
/// instead of firing a burst to catch up.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    next_due: Option<Instant>,
}

impl Cadence {
    /// A cadence that is due on its first check.
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the cadence fires at `now`. Firing schedules the next one.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            Some(due) => {
                let next = due + self.period;
                self.next_due = Some(if next <= now { now + self.period } else { next });
                true
            }
            None => {
                self.next_due = Some(now + self.period);
                true
            }
        }
    }

    /// Time left until the cadence fires; zero when already due.
    pub fn until_due(&self, now: Instant) -> Duration {
        self.next_due
            .map(|due| due.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }
}
