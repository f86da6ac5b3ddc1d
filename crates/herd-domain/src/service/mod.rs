//! Domain Services - Settlement rules that don't belong to a single value
//!
//! Each service is a pure function (or a struct of pure functions) that the
//! settlement engine calls with data it has already loaded.

pub mod experience_engine;
pub mod quest_policy;
pub mod spawn_counter;
