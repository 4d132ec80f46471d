//! Operating mode state machine
//!
//! Every mode change goes through [`plan`], which decides whether the
//! change is a no-op, has to pass through standby first, or can be
//! committed directly with an optional high power amplifier switch.

use super::registers::opmode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Sleep,
    Standby,
    Synthesizer,
    Receive,
    Transmit,
}

impl RadioMode {
    /// OPMODE mode field for this mode
    pub fn opmode_bits(self) -> u8 {
        match self {
            RadioMode::Sleep => opmode::SLEEP,
            RadioMode::Standby => opmode::STANDBY,
            RadioMode::Synthesizer => opmode::SYNTHESIZER,
            RadioMode::Receive => opmode::RECEIVER,
            RadioMode::Transmit => opmode::TRANSMITTER,
        }
    }
}

/// How to get from one mode to another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Already there
    Stay,
    /// Enter standby first, then plan again from there
    ViaStandby,
    /// Write the new mode; switch the PA boost registers beforehand if set
    Direct { pa_boost: Option<bool> },
}

/// Plan the change `from` -> `to`
///
/// Receive and transmit never switch into each other directly. With the
/// high power path enabled, the boost registers are on only while
/// transmitting.
pub fn plan(from: RadioMode, to: RadioMode, high_power: bool) -> Step {
    use self::RadioMode::*;

    if from == to {
        return Step::Stay;
    }

    if matches!((from, to), (Receive, Transmit) | (Transmit, Receive)) {
        return Step::ViaStandby;
    }

    let pa_boost = match (high_power, from, to) {
        (false, _, _) => None,
        (true, _, Transmit) => Some(true),
        (true, Transmit, _) | (true, _, Receive) => Some(false),
        (true, _, _) => None,
    };

    Step::Direct { pa_boost }
}

/// OPMODE value for `mode`, keeping the unrelated bits of `current`
pub fn opmode_value(current: u8, mode: RadioMode) -> u8 {
    (current & opmode::KEEP_MASK) | mode.opmode_bits()
}
