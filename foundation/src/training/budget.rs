use std::time::{Duration, Instant};

/// A shared, advisory wall-clock budget.
///
/// Long running loops poll [`Budget::expired`] at their safe checkpoints and wind down
/// when it returns `true`; nothing is interrupted preemptively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Budget {
    deadline: Option<Instant>,
}

impl Budget {
    /// A budget that never expires.
    pub fn unlimited() -> Self {
        Self { deadline: None }
    }

    /// A budget that expires `limit` from now. Limits past what an `Instant` can
    /// represent never expire.
    pub fn within(limit: Duration) -> Self {
        Instant::now()
            .checked_add(limit)
            .map_or_else(Self::unlimited, Self::until)
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// `None` when there's no limit.
    pub fn from_limit(limit: Option<Duration>) -> Self {
        limit.map_or_else(Self::unlimited, Self::within)
    }

    pub fn is_limited(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// The time left, `None` when unlimited.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }
}
