use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Length of one admission window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// First rejection in the current window; the caller reports it once.
    RejectedFirst,
    /// Further rejections in a window that has already been reported.
    Rejected,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start: Instant,
    count: u32,
    rejected: u32,
}

/// Fixed-window admission counter.
///
/// The window resets lazily on the first call after it expires; there is no
/// background timer. Counting happens under a short synchronous lock so
/// concurrent writers never interleave an increment.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: u32,
    window: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self::starting_at(max_per_minute, Instant::now())
    }

    pub fn starting_at(max_per_minute: u32, now: Instant) -> Self {
        Self {
            max_per_window: max_per_minute,
            window: Mutex::new(RateWindow {
                window_start: now,
                count: 0,
                rejected: 0,
            }),
        }
    }

    pub fn try_admit(&self) -> bool {
        self.check(Instant::now()).is_admitted()
    }

    pub fn try_admit_at(&self, now: Instant) -> bool {
        self.check(now).is_admitted()
    }

    pub fn check(&self, now: Instant) -> Admission {
        let mut window = self.window.lock();

        if now.saturating_duration_since(window.window_start) >= RATE_WINDOW {
            *window = RateWindow {
                window_start: now,
                count: 0,
                rejected: 0,
            };
        }

        if window.count < self.max_per_window {
            window.count += 1;
            return Admission::Admitted;
        }

        window.rejected += 1;
        if window.rejected == 1 {
            Admission::RejectedFirst
        } else {
            Admission::Rejected
        }
    }

    pub fn limit(&self) -> u32 {
        self.max_per_window
    }

    /// Events admitted in the current window.
    pub fn current_count(&self) -> u32 {
        self.window.lock().count
    }
}
