//! Collaborator ports - What the settlement engine needs from the outside
//!
//! ```text
//! herd-core              │  herd-adapter (or the bot)
//! ───────────────────────┼──────────────────────────────
//! trait PersistentStore  │  InMemoryStore, SQL store
//! trait NotificationSink │  NotificationLog, chat client
//! trait SpawnTrigger     │  RecordingSpawnTrigger, spawner
//! ```
//!
//! All store calls are plain request/response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    ChannelHandle, ChannelId, CommunityId, CompanionRecord, MembershipRole, QuestKind, RecordId,
    SpawnChannelTarget, StoreError, ThresholdEvent, UserId,
};
use std::sync::Arc;

/// The authoritative store of totals
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// The user's active companion, `None` if they have none
    async fn companion_record(&self, user_id: UserId)
        -> Result<Option<CompanionRecord>, StoreError>;

    async fn update_experience(
        &self,
        record_id: &RecordId,
        total_experience: u64,
        level: u32,
    ) -> Result<(), StoreError>;

    async fn channel_targets(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<SpawnChannelTarget>, StoreError>;

    /// `last_spawn_at` is `Some` only when the target fired
    async fn update_channel_target(
        &self,
        channel_id: ChannelId,
        current_messages: u64,
        last_spawn_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn apply_quest_increment(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
        count: u64,
    ) -> Result<(), StoreError>;

    async fn membership_role(&self, user_id: UserId) -> Result<Option<MembershipRole>, StoreError>;
}

/// Outbound notices; delivery failures stay inside the sink
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_level_up(
        &self,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        new_level: u32,
    );

    async fn send_milestone(
        &self,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        milestone_level: u32,
    );
}

/// Receives all threshold events of one settlement pass at once
#[async_trait]
pub trait SpawnTrigger: Send + Sync {
    async fn on_threshold_reached(&self, events: Vec<ThresholdEvent>);
}

/// The three collaborators, bundled for wiring
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn PersistentStore>,
    pub notifications: Arc<dyn NotificationSink>,
    pub spawns: Arc<dyn SpawnTrigger>,
}

impl Collaborators {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        notifications: Arc<dyn NotificationSink>,
        spawns: Arc<dyn SpawnTrigger>,
    ) -> Self {
        Self {
            store,
            notifications,
            spawns,
        }
    }
}
