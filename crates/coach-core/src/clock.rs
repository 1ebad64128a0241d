//! Dual countdown clock
//!
//! Two whole-second counters share a single tick source. Each tick charges
//! only the side to move, and only while the pair is `Running`.
//!
//! ```text
//! Stopped → Running ↔ Frozen → Stopped
//! ```
//!
//! Freezing never compensates: a frozen interval simply does not exist as far
//! as the counters are concerned. Reaching zero stops the pair for good.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::side::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    Stopped,
    Running,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was charged (stopped or frozen)
    Idle,
    Decremented { side: Side, remaining: u32 },
    /// `loser` ran out of time
    Timeout { loser: Side },
}

/// Display-only countdown shown while the predictor "thinks".
///
/// The opponent's clock is shown dropping by `simulated_secs` over
/// `duration_ms` of real time, starting from `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingOverlay {
    pub side: Side,
    pub from: u32,
    pub simulated_secs: u32,
    pub duration_ms: u64,
}

impl ThinkingOverlay {
    pub fn new(side: Side, from: u32, delay: Duration, acceleration: u32) -> Self {
        let duration_ms = delay.as_millis() as u64;
        let simulated_secs = ((duration_ms * acceleration as u64) / 1000) as u32;
        Self {
            side,
            from,
            simulated_secs: simulated_secs.min(from),
            duration_ms,
        }
    }

    /// Seconds to display after `elapsed` of thinking.
    pub fn displayed(&self, elapsed: Duration) -> u32 {
        if self.duration_ms == 0 {
            return self.target();
        }
        let elapsed_ms = (elapsed.as_millis() as u64).min(self.duration_ms);
        let shown = self.simulated_secs as u64 * elapsed_ms / self.duration_ms;
        self.from.saturating_sub(shown as u32)
    }

    /// Counter value once thinking is over
    pub fn target(&self) -> u32 {
        self.from.saturating_sub(self.simulated_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockPair {
    white: u32,
    black: u32,
    state: ClockState,
    /// Side whose flag fell, once it has
    flagged: Option<Side>,
}

impl ClockPair {
    pub fn new(seconds: u32) -> Self {
        Self {
            white: seconds,
            black: seconds,
            state: ClockState::Stopped,
            flagged: None,
        }
    }

    pub fn remaining(&self, side: Side) -> u32 {
        match side {
            Side::White => self.white,
            Side::Black => self.black,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn flagged(&self) -> Option<Side> {
        self.flagged
    }

    pub fn is_paused(&self) -> bool {
        self.state != ClockState::Running
    }

    /// Begin ticking. A clock whose flag has fallen cannot restart.
    pub fn start(&mut self) {
        if self.state == ClockState::Stopped && self.flagged.is_none() {
            self.state = ClockState::Running;
        }
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Mirror the freeze flag. Only moves between `Running` and `Frozen`.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.state = match (self.state, frozen) {
            (ClockState::Running, true) => ClockState::Frozen,
            (ClockState::Frozen, false) => ClockState::Running,
            (state, _) => state,
        };
    }

    /// One second elapsed with `side` to move.
    pub fn tick(&mut self, side: Side) -> TickOutcome {
        if self.state != ClockState::Running {
            return TickOutcome::Idle;
        }
        let counter = self.counter_mut(side);
        *counter = counter.saturating_sub(1);
        let remaining = *counter;
        if remaining == 0 {
            self.flag(side)
        } else {
            TickOutcome::Decremented { side, remaining }
        }
    }

    /// Bring the thinking side's real counter down to what the overlay ended
    /// on. Never raises a counter and does nothing unless running.
    pub fn settle_thinking(&mut self, overlay: &ThinkingOverlay) -> TickOutcome {
        if self.state != ClockState::Running {
            return TickOutcome::Idle;
        }
        let side = overlay.side;
        let target = overlay.target();
        let counter = self.counter_mut(side);
        if *counter <= target {
            return TickOutcome::Idle;
        }
        *counter = target;
        if target == 0 {
            self.flag(side)
        } else {
            TickOutcome::Decremented {
                side,
                remaining: target,
            }
        }
    }

    fn flag(&mut self, side: Side) -> TickOutcome {
        self.state = ClockState::Stopped;
        self.flagged = Some(side);
        TickOutcome::Timeout { loser: side }
    }

    fn counter_mut(&mut self, side: Side) -> &mut u32 {
        match side {
            Side::White => &mut self.white,
            Side::Black => &mut self.black,
        }
    }
}
