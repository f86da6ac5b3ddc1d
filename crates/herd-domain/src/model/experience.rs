//! Experience State - What a companion's total experience means
//!
//! ExperienceState is a Value Object derived from a single number, the
//! companion's cumulative experience. It is never persisted; the store only
//! keeps the total (and the level as a denormalised copy for queries).

/// Level and progress derived from a cumulative experience total
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceState {
    /// Cumulative experience
    pub total_experience: u64,
    /// Current level, `1..=max_level`
    pub level: u32,
    /// Experience earned since reaching `level`
    pub current_level_experience: u64,
    /// Experience still needed for `level + 1` (0 at max level)
    pub experience_to_next_level: u64,
    /// Progress towards the next level in `[0, 1]` (1 at max level)
    pub progress_fraction: f64,
}

impl ExperienceState {
    /// Whether this state is capped at the curve's last level
    pub fn is_max_level(&self) -> bool {
        self.experience_to_next_level == 0 && self.progress_fraction >= 1.0
    }
}

/// The result of applying an experience delta to a total
#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceGain {
    pub old_state: ExperienceState,
    pub new_state: ExperienceState,
    pub leveled_up: bool,
}

impl ExperienceGain {
    /// Number of levels gained (may be more than one)
    pub fn levels_gained(&self) -> u32 {
        self.new_state.level.saturating_sub(self.old_state.level)
    }

    /// Milestone levels reached by this gain, i.e. those in `(old, new]`
    ///
    /// Returned in ascending order regardless of the input order.
    pub fn milestones_crossed(&self, milestones: &[u32]) -> Vec<u32> {
        let old = self.old_state.level;
        let new = self.new_state.level;
        let mut crossed: Vec<u32> = milestones
            .iter()
            .copied()
            .filter(|&m| m > old && m <= new)
            .collect();
        crossed.sort_unstable();
        crossed.dedup();
        crossed
    }
}
