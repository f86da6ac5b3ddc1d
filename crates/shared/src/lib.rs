//! # Herd Shared
//!
//! Identifiers, records, configuration and error types used across all
//! Herd crates.

pub mod config;
pub mod error;
pub mod ids;
pub mod records;

// Re-exports
pub use config::*;
pub use error::*;
pub use ids::*;
pub use records::*;
