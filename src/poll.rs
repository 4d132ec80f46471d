//! Deadline-bounded polling
//!
//! Every busy-wait in the firmware (mode-ready, packet-sent, acknowledgement
//! wait, scratch-register probes, measurements) goes through [`poll_until`].

use crate::hal::Clock;

/// How long a blocking operation may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Give up once this many milliseconds have elapsed
    Ms(u32),
    /// Wait without bound
    Forever,
}

impl Timeout {
    /// True once `elapsed_ms` has reached the bound
    pub fn expired(self, elapsed_ms: u32) -> bool {
        match self {
            Timeout::Ms(limit) => elapsed_ms >= limit,
            Timeout::Forever => false,
        }
    }
}

impl From<u32> for Timeout {
    fn from(ms: u32) -> Self {
        Timeout::Ms(ms)
    }
}

/// Milliseconds elapsed since `start`, tolerant of tick wrap-around.
pub fn elapsed_since<C: Clock + ?Sized>(clock: &C, start: u32) -> u32 {
    clock.now_ms().wrapping_sub(start)
}

/// Poll `predicate` until it returns true or `timeout` expires.
///
/// The predicate is evaluated at least once, so a zero timeout still
/// performs a single check. Returns whether the predicate succeeded.
pub fn poll_until<C, F>(clock: &C, timeout: Timeout, mut predicate: F) -> bool
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let start = clock.now_ms();
    loop {
        if predicate() {
            return true;
        }
        if timeout.expired(elapsed_since(clock, start)) {
            return false;
        }
    }
}
