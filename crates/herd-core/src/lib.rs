//! # Herd Core
//!
//! Activity aggregation and deferred settlement. Chat events are counted in
//! memory and written to the persistent store in periodic batches.

mod activity;
mod aggregator_store;
mod lookup_cache;
mod ports;
mod quest_queue;
mod runtime;
mod scheduler;
mod settlement;
mod spawn_evaluator;

#[cfg(test)]
mod testing;

pub use activity::{ActivityAggregator, CommunityActivityRecord, UserActivityRecord};
pub use aggregator_store::{AggregatorStore, CompanionCache, MembershipCache};
pub use lookup_cache::{CacheStatsSnapshot, LookupCache};
pub use ports::{Collaborators, NotificationSink, PersistentStore, SpawnTrigger};
pub use quest_queue::{QuestIncrement, QuestKey, QuestPassReport, QuestProgressQueue};
pub use runtime::{start, ProducerHandle, Runtime};
pub use scheduler::{LoopKind, SchedulerHandle, SettlementScheduler};
pub use settlement::{ActivityPassReport, FlushReport, MaintenanceReport, SettlementEngine};
pub use spawn_evaluator::SpawnThresholdEvaluator;
