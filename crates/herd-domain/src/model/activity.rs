//! Activity phases - The life of a per-user activity record
//!
//! ```text
//! Idle ──record──▶ Accumulating ──flush tick──▶ Draining ──┬──▶ Idle
//!                        ▲                                  │
//!                        └──────── PartialCarryover ◀───────┘
//! ```
//!
//! `PartialCarryover` happens only when the per-cycle cap truncates the
//! drained count; the leftover goes back into the accumulator.

/// Where a user's activity record is in the settlement cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityPhase {
    /// No pending messages
    Idle,
    /// Messages recorded since the last drain
    Accumulating,
    /// Pending count taken by a settlement pass
    Draining,
    /// Settled up to the cap, leftover re-queued for the next cycle
    PartialCarryover,
}

impl ActivityPhase {
    /// Next phase for an event; invalid transitions leave the phase unchanged
    pub fn on_record(self) -> Self {
        match self {
            ActivityPhase::Idle | ActivityPhase::Accumulating | ActivityPhase::PartialCarryover => {
                ActivityPhase::Accumulating
            }
            ActivityPhase::Draining => ActivityPhase::Draining,
        }
    }

    /// Phase of the snapshot a settlement pass takes; an idle record has nothing to drain
    pub fn on_drain(self) -> Self {
        match self {
            ActivityPhase::Idle => ActivityPhase::Idle,
            _ => ActivityPhase::Draining,
        }
    }

    /// Phase after unsettled messages are put back
    ///
    /// Messages recorded since the drain keep the record `Accumulating`.
    pub fn on_restore(self) -> Self {
        match self {
            ActivityPhase::Accumulating => ActivityPhase::Accumulating,
            _ => ActivityPhase::PartialCarryover,
        }
    }
}

/// A drained message count split by the per-cycle cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSplit {
    /// Messages settled this cycle
    pub applied: u64,
    /// Messages carried over to the next cycle
    pub carried: u64,
}

impl CycleSplit {
    /// Split `drained` so that at most `max_per_cycle` are applied
    pub fn cap(drained: u64, max_per_cycle: u64) -> Self {
        let applied = drained.min(max_per_cycle);
        Self {
            applied,
            carried: drained - applied,
        }
    }

    /// Phase the record ends up in once this split is settled
    pub fn phase_after(&self) -> ActivityPhase {
        if self.carried > 0 {
            ActivityPhase::PartialCarryover
        } else {
            ActivityPhase::Idle
        }
    }
}
