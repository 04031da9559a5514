//! Global tester-cycle clock.

use serde::{Deserialize, Serialize};

/// Deterministic cycle clock owned by the scheduler.
///
/// `cycle` is the only authoritative notion of time in a sequence. `tick`
/// counts scheduler loop iterations, several of which may pass without any
/// cycle being emitted (e.g. while branches rendezvous).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleClock {
    /// Tester cycles emitted so far.
    pub cycle: u64,
    /// Scheduler ticks executed so far.
    pub tick: u64,
}

impl CycleClock {
    /// Create a clock at cycle 0, tick 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new scheduler tick.
    pub fn begin_tick(&mut self) {
        self.tick += 1;
    }

    /// Advance the clock by `cycles` emitted cycles.
    pub fn advance(&mut self, cycles: u64) {
        self.cycle += cycles;
    }
}
