//! Time source abstraction.
//!
//! Expiry checks on one-time tokens and sessions read the clock through
//! [`TimeProvider`] so tests can move time forward without sleeping.

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};

pub trait TimeProvider: Send + Sync + fmt::Debug + 'static {
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock shifted by an adjustable offset.
#[derive(Clone, Debug, Default)]
pub struct VirtualTimeProvider {
    offset: Arc<Mutex<Duration>>,
}

impl VirtualTimeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += by;
    }

    pub fn offset(&self) -> Duration {
        *self
            .offset
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TimeProvider for VirtualTimeProvider {
    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now() + self.offset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_moves_forward() {
        let clock = VirtualTimeProvider::new();
        let before = clock.utc_now();
        clock.advance(Duration::hours(25));
        assert!(clock.utc_now() - before >= Duration::hours(25));
    }

    #[test]
    fn clones_share_offset() {
        let clock = VirtualTimeProvider::new();
        let shared = clock.clone();
        clock.advance(Duration::minutes(5));
        assert_eq!(shared.offset(), Duration::minutes(5));
    }
}
