use chrono::{DateTime, Duration, Utc};
use std::fmt::Debug;
use std::sync::{Arc, Mutex, PoisonError};

/// Clock provides the current wall-clock time to the stores.
///
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// SystemClock reads the operating system clock.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// ManualClock only moves when told to.
/// Clones share the same instant.
///
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock forward by given duration.
    ///
    pub fn advance(&self, by: Duration) {
        let mut instant = self.instant.lock().unwrap_or_else(PoisonError::into_inner);
        *instant += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
