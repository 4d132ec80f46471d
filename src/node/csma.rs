//! Listen-before-talk
//!
//! A sensor may transmit once the channel has been quiet for a window that
//! grows with its node id, so nodes woken by the same event back off in a
//! fixed order. The whole phase is capped; past the cap the sensor transmits
//! anyway.

/// Outcome of one channel observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Keep listening
    Listening,
    /// The channel stayed quiet for the full window
    Clear,
    /// The cap expired before a quiet window was seen
    GaveUp,
}

/// Tracks the current run of quiet observations
#[derive(Debug, Clone, Copy)]
pub struct QuietWindow {
    started: u32,
    quiet_since: u32,
    window_ms: u32,
    limit_ms: u32,
}

impl QuietWindow {
    pub fn new(now: u32, window_ms: u32, limit_ms: u32) -> Self {
        Self {
            started: now,
            quiet_since: now,
            window_ms,
            limit_ms,
        }
    }

    /// Feed one observation taken at `now`
    ///
    /// Any busy observation restarts the quiet run. The channel counts as
    /// clear once the run is strictly longer than the window.
    pub fn observe(&mut self, now: u32, busy: bool) -> ChannelState {
        if busy {
            self.quiet_since = now;
        }
        if now.wrapping_sub(self.quiet_since) > self.window_ms {
            ChannelState::Clear
        } else if now.wrapping_sub(self.started) >= self.limit_ms {
            ChannelState::GaveUp
        } else {
            ChannelState::Listening
        }
    }

    /// Length of the current quiet run
    pub fn quiet_for(&self, now: u32) -> u32 {
        now.wrapping_sub(self.quiet_since)
    }
}
