//! Lifecycle - Wiring the engine once per process
//!
//! `start` builds the single `AggregatorStore`, spawns the settlement loops
//! and hands back two things: a cloneable `ProducerHandle` for the chat
//! event handlers and the `SchedulerHandle` that owns shutdown.

use shared::{
    ChannelHandle, ChannelId, CommunityId, MembershipRole, QuestKind, SettlementConfig,
    SettlementError, StoreError, UserId,
};
use std::sync::Arc;
use tracing::info;

use crate::aggregator_store::AggregatorStore;
use crate::ports::{Collaborators, PersistentStore};
use crate::scheduler::{SchedulerHandle, SettlementScheduler};
use crate::settlement::SettlementEngine;

/// A started settlement engine
pub struct Runtime {
    pub producer: ProducerHandle,
    pub scheduler: SchedulerHandle,
}

/// Validate `config`, create the shared state and spawn the loops
///
/// Must be called from within a Tokio runtime.
pub fn start(
    config: SettlementConfig,
    collaborators: Collaborators,
) -> Result<Runtime, SettlementError> {
    config.validate()?;
    let state = Arc::new(AggregatorStore::new(&config));
    let store = collaborators.store.clone();

    let engine = Arc::new(SettlementEngine::new(
        config.clone(),
        state.clone(),
        collaborators,
    )?);
    let scheduler = SettlementScheduler::new(engine, &config).start();

    info!(
        activity_interval_secs = config.activity_interval_secs,
        quest_interval_secs = config.quest_interval_secs,
        max_messages_per_cycle = config.max_messages_per_cycle,
        "Settlement engine started"
    );

    Ok(Runtime {
        producer: ProducerHandle { state, store },
        scheduler,
    })
}

/// Hot-path entry points for event handlers; never touches the store
/// except for `membership_role` on a cache miss
#[derive(Clone)]
pub struct ProducerHandle {
    state: Arc<AggregatorStore>,
    store: Arc<dyn PersistentStore>,
}

impl ProducerHandle {
    /// Count one chat message; level-up notices go to this channel
    pub fn record_activity(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        channel_id: ChannelId,
    ) -> Result<(), SettlementError> {
        self.state.activity.record_activity(
            user_id,
            community_id,
            channel_id,
            ChannelHandle::new(community_id, channel_id),
        )
    }

    pub fn enqueue_quest(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
        increment: i64,
    ) -> Result<(), SettlementError> {
        self.state
            .quests
            .enqueue(user_id, community_id, kind, increment)
    }

    /// `enqueue_quest` with the kind given by name, e.g. `"bits_earned"`
    pub fn enqueue_quest_named(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: &str,
        increment: i64,
    ) -> Result<(), SettlementError> {
        self.state
            .quests
            .enqueue_named(user_id, community_id, kind, increment)
    }

    /// Forget the cached companion after an out-of-band change
    /// (adoption, release, admin edit)
    pub fn invalidate_companion(&self, user_id: UserId) -> bool {
        self.state.companions.invalidate(&user_id)
    }

    /// Cached membership role lookup
    pub async fn membership_role(
        &self,
        user_id: UserId,
    ) -> Result<Option<MembershipRole>, StoreError> {
        self.state
            .membership_role(self.store.as_ref(), user_id)
            .await
    }

    pub fn pending_messages(&self, user_id: UserId) -> u64 {
        self.state.activity.pending_user_count(user_id)
    }

    pub fn pending_quest_entries(&self) -> usize {
        self.state.quests.len()
    }
}
