//! Spawn counter arithmetic
//!
//! A channel accumulates community messages until its target is reached.
//! Reaching (or passing) the target fires a spawn and resets the counter to
//! zero; any overshoot is not carried into the next round.

/// What happens to a channel's counter after adding messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnCounterOutcome {
    /// Target reached: the counter resets and a spawn fires
    Fired { total_messages: u64 },
    /// Below target: persist the new counter
    Pending { current_messages: u64 },
    /// Target of zero means the channel has no configured target
    Unconfigured,
}

impl SpawnCounterOutcome {
    pub fn is_fired(&self) -> bool {
        matches!(self, SpawnCounterOutcome::Fired { .. })
    }
}

/// Add `added` messages to a channel counter
pub fn advance_spawn_counter(current: u64, target: u64, added: u64) -> SpawnCounterOutcome {
    if target == 0 {
        return SpawnCounterOutcome::Unconfigured;
    }
    let total = current.saturating_add(added);
    if total >= target {
        SpawnCounterOutcome::Fired {
            total_messages: total,
        }
    } else {
        SpawnCounterOutcome::Pending {
            current_messages: total,
        }
    }
}
