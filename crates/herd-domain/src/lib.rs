//! # Herd Domain Layer
//!
//! Pure settlement rules with zero external dependencies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Domain Layer (This Crate)                     │
//! │  ┌─────────────────────────────────────────────────────────────┐│
//! │  │  model/   - Experience state, activity phases               ││
//! │  │  service/ - ExperienceEngine, spawn counter, quest batching ││
//! │  └─────────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here is deterministic: the same inputs always produce the
//! same outputs. Time is passed in as a plain `Duration`, never read.

pub mod model;
pub mod service;

pub use model::{
    activity::{ActivityPhase, CycleSplit},
    experience::{ExperienceGain, ExperienceState},
};

pub use service::{
    experience_engine::{CurveError, ExperienceEngine, LevelCurve},
    quest_policy::QuestBatchPolicy,
    spawn_counter::{advance_spawn_counter, SpawnCounterOutcome},
};
