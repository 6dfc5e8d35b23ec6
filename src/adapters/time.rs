//! Monotonic clock adapter.
//!
//! The cooperative loop reads the clock once per tick and threads the
//! millisecond value into `has_work`/`work`, so the state machine itself
//! never touches platform time.
//!
//! - **`target_os = "espidf"`** — `esp_timer_get_time()` (microsecond
//!   precision, monotonic since boot).
//! - **all other targets** — `std::time::Instant`.

use crate::net::Millis;

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Milliseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> Millis {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as Millis / 1_000
    }

    /// Milliseconds since clock creation (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}
