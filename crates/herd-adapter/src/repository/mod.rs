//! Persistence Adapters - Store implementations
//!
//! These implement `herd_core::PersistentStore`.

pub mod in_memory;
