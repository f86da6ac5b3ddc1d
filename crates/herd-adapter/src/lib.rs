//! # Herd Adapter Layer
//!
//! Implementations of the `herd-core` collaborator ports.
//!
//! ## Structure
//!
//! - `repository/` - Persistent store implementations
//! - `notifications` - Outbound level-up / milestone notices
//! - `spawn` - Spawn trigger receiving threshold events

pub mod notifications;
pub mod repository;
pub mod spawn;

pub use notifications::{NotificationEntry, NotificationKind, NotificationLog};
pub use repository::in_memory::InMemoryStore;
pub use spawn::RecordingSpawnTrigger;
