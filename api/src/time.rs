use jiff::Timestamp;
use jiff::civil::{Date, Time};
use jiff::tz::TimeZone;
#[cfg(feature = "mock-time")]
use std::sync::{Arc, Mutex};

/// Source of "now" for everything time dependent: ledger stamps, maturity,
/// and scheduler backoff. Tests build it with `mock-time` to drive the
/// clock by hand.
#[derive(Clone)]
pub struct TimeSource {
    #[cfg(feature = "mock-time")]
    time: Arc<Mutex<Timestamp>>,
}

impl TimeSource {
    #[allow(clippy::new_without_default)]
    #[cfg(not(feature = "mock-time"))]
    pub fn new() -> Self {
        Self {}
    }

    #[cfg(feature = "mock-time")]
    pub fn new(initial_time: Timestamp) -> Self {
        Self {
            time: Arc::new(Mutex::new(initial_time)),
        }
    }

    #[cfg(not(feature = "mock-time"))]
    pub fn now(&self) -> Timestamp {
        Timestamp::now()
    }

    #[cfg(feature = "mock-time")]
    pub fn now(&self) -> Timestamp {
        *self.time.lock().unwrap()
    }

    #[cfg(feature = "mock-time")]
    pub fn advance(&self, duration: jiff::Span) {
        *self.time.lock().unwrap() += duration;
    }

    #[cfg(feature = "mock-time")]
    pub fn set(&self, time: Timestamp) {
        *self.time.lock().unwrap() = time;
    }

    /// The UTC calendar date and wall-clock time (whole seconds) that ledger
    /// rows are stamped with.
    pub fn ledger_stamp(&self) -> (Date, Time) {
        let now = self.now().to_zoned(TimeZone::UTC);
        let time =
            jiff::civil::time(now.hour(), now.minute(), now.second(), 0);
        (now.date(), time)
    }
}
