use std::time::Instant;

/// A single pending deadline. Arming replaces whatever was pending, so at
/// most one task of a given slot is ever live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSlot<T> {
    pending: Option<(Instant, T)>,
}

impl<T> Default for TimerSlot<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> TimerSlot<T> {
    pub fn arm(&mut self, at: Instant, task: T) -> Option<T> {
        self.pending.replace((at, task)).map(|(_, task)| task)
    }

    pub fn cancel(&mut self) -> Option<T> {
        self.pending.take().map(|(_, task)| task)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(at, _)| *at)
    }

    pub fn peek(&self) -> Option<&T> {
        self.pending.as_ref().map(|(_, task)| task)
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Remove and return the task if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((at, _)) if *at <= now => self.cancel(),
            _ => None,
        }
    }
}
