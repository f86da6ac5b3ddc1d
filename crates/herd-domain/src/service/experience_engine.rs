//! ExperienceEngine - The single source of truth for the level curve
//!
//! The curve is integer-only so that a fixed set of constants always yields
//! the same boundary table on every platform:
//!
//! ```text
//! required(L)   = base * (L - 1) + quadratic * (L - 1)^2     (L > 1)
//! cumulative(L) = required(2) + required(3) + ... + required(L)
//! ```
//!
//! `cumulative` is the boundary table: a companion is level `L` while
//! `cumulative(L) <= total < cumulative(L + 1)`.

use crate::model::experience::{ExperienceGain, ExperienceState};

/// Upper bound on `max_level`; keeps the boundary table small.
pub const MAX_SUPPORTED_LEVEL: u32 = 10_000;

/// Constants of the leveling curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelCurve {
    base: u64,
    quadratic: u64,
    max_level: u32,
}

impl LevelCurve {
    /// Create a curve, rejecting constants that are not strictly increasing
    pub fn new(base: u64, quadratic: u64, max_level: u32) -> Result<Self, CurveError> {
        if base == 0 && quadratic == 0 {
            return Err(CurveError::NotIncreasing);
        }
        if max_level == 0 {
            return Err(CurveError::NoLevels);
        }
        if max_level > MAX_SUPPORTED_LEVEL {
            return Err(CurveError::TooManyLevels { max_level });
        }
        Ok(Self {
            base,
            quadratic,
            max_level,
        })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn quadratic(&self) -> u64 {
        self.quadratic
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self {
            base: 100,
            quadratic: 25,
            max_level: 100,
        }
    }
}

/// Errors for an invalid curve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CurveError {
    NotIncreasing,
    NoLevels,
    TooManyLevels { max_level: u32 },
}

impl core::fmt::Display for CurveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CurveError::NotIncreasing => {
                write!(f, "Level curve must be strictly increasing (base + quadratic > 0)")
            }
            CurveError::NoLevels => write!(f, "Level curve needs max_level >= 1"),
            CurveError::TooManyLevels { max_level } => write!(
                f,
                "max_level {} exceeds the supported maximum of {}",
                max_level, MAX_SUPPORTED_LEVEL
            ),
        }
    }
}

/// ExperienceEngine - Pure conversions between totals and levels
///
/// Holds a precomputed boundary table; every query is a lookup or a binary
/// search over it.
#[derive(Debug, Clone)]
pub struct ExperienceEngine {
    curve: LevelCurve,
    /// `cumulative[L]` for `L` in `0..=max_level` (index 0 is unused and 0)
    cumulative: Vec<u64>,
}

impl ExperienceEngine {
    /// Build the engine and its boundary table
    pub fn new(curve: LevelCurve) -> Self {
        let cumulative = (0..=curve.max_level)
            .map(|level| cumulative_for(&curve, level))
            .collect();
        Self { curve, cumulative }
    }

    pub fn curve(&self) -> &LevelCurve {
        &self.curve
    }

    pub fn max_level(&self) -> u32 {
        self.curve.max_level
    }

    /// Experience needed to go from `level - 1` to `level`
    pub fn required_experience_for_level(&self, level: u32) -> u64 {
        required_for(&self.curve, level)
    }

    /// Total experience at which `level` is reached
    pub fn cumulative_experience_for_level(&self, level: u32) -> u64 {
        match self.cumulative.get(level as usize) {
            Some(&value) => value,
            None => cumulative_for(&self.curve, level),
        }
    }

    /// Derive level and progress from a cumulative total
    pub fn state_from_total_experience(&self, total: u64) -> ExperienceState {
        // Levels 1..=max_level; cumulative(1) == 0 so at least one matches.
        let reached = self.cumulative[1..].partition_point(|&boundary| boundary <= total);
        let level = (reached as u32).clamp(1, self.curve.max_level);
        let floor = self.cumulative[level as usize];

        if level >= self.curve.max_level {
            return ExperienceState {
                total_experience: total,
                level,
                current_level_experience: total - floor,
                experience_to_next_level: 0,
                progress_fraction: 1.0,
            };
        }

        let ceiling = self.cumulative[level as usize + 1];
        let span = ceiling - floor;
        let current = total - floor;

        ExperienceState {
            total_experience: total,
            level,
            current_level_experience: current,
            experience_to_next_level: ceiling - total,
            progress_fraction: (current as f64 / span as f64).clamp(0.0, 1.0),
        }
    }

    /// Add `delta` to `total` and report the before/after states
    pub fn apply_experience(&self, total: u64, delta: u64) -> ExperienceGain {
        let old_state = self.state_from_total_experience(total);
        let new_state = self.state_from_total_experience(total.saturating_add(delta));
        let leveled_up = new_state.level > old_state.level;

        ExperienceGain {
            old_state,
            new_state,
            leveled_up,
        }
    }
}

impl Default for ExperienceEngine {
    fn default() -> Self {
        Self::new(LevelCurve::default())
    }
}

fn required_for(curve: &LevelCurve, level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    let n = u64::from(level - 1);
    curve
        .base
        .saturating_mul(n)
        .saturating_add(curve.quadratic.saturating_mul(n).saturating_mul(n))
}

fn cumulative_for(curve: &LevelCurve, level: u32) -> u64 {
    if level <= 1 {
        return 0;
    }
    // Closed form over n = 1..=m: base * m(m+1)/2 + quadratic * m(m+1)(2m+1)/6
    let m = u128::from(level - 1);
    let linear = u128::from(curve.base) * (m * (m + 1) / 2);
    let square = u128::from(curve.quadratic) * (m * (m + 1) * (2 * m + 1) / 6);
    u64::try_from(linear.saturating_add(square)).unwrap_or(u64::MAX)
}
