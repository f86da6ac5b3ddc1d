//! Domain Models - The vocabulary of settlement
//!
//! Values here are derived, never stored: the persistent store keeps the
//! authoritative totals and these types describe what a total means.

pub mod activity;
pub mod experience;
