//! In-Memory Store Implementation
//!
//! Simple in-memory implementation of `PersistentStore`.
//! Useful for testing, development and the demo binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use herd_core::PersistentStore;
use shared::{
    ChannelId, CommunityId, CompanionRecord, MembershipRole, QuestKind, RecordId,
    SpawnChannelTarget, StoreError, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    /// Active companion per user
    companions: HashMap<UserId, CompanionRecord>,
    roles: HashMap<UserId, MembershipRole>,
    targets: HashMap<ChannelId, SpawnChannelTarget>,
    quests: HashMap<(UserId, CommunityId, QuestKind), u64>,
}

/// In-memory persistent store
///
/// Thread-safe implementation using RwLock. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::transient("Failed to acquire read lock"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::transient("Failed to acquire write lock"))
    }

    /// Give `user_id` a fresh level 1 companion, replacing any previous one
    pub fn adopt_companion(&self, user_id: UserId, name: &str) -> Result<RecordId, StoreError> {
        let id = RecordId::new(Uuid::new_v4().to_string());
        self.write()?.companions.insert(
            user_id,
            CompanionRecord {
                id: id.clone(),
                user_id,
                name: name.to_string(),
                total_experience: 0,
                level: 1,
            },
        );
        Ok(id)
    }

    pub fn release_companion(&self, user_id: UserId) -> Result<bool, StoreError> {
        Ok(self.write()?.companions.remove(&user_id).is_some())
    }

    pub fn set_role(&self, user_id: UserId, role: &str) -> Result<(), StoreError> {
        self.write()?
            .roles
            .insert(user_id, MembershipRole::new(role));
        Ok(())
    }

    /// Register an active spawn channel with an empty counter
    pub fn configure_spawn_channel(
        &self,
        community_id: CommunityId,
        channel_id: ChannelId,
        target_messages: u64,
    ) -> Result<(), StoreError> {
        self.write()?.targets.insert(
            channel_id,
            SpawnChannelTarget {
                channel_id,
                community_id,
                target_messages,
                current_messages: 0,
                active: true,
                last_spawn_at: None,
            },
        );
        Ok(())
    }

    pub fn set_spawn_channel_active(
        &self,
        channel_id: ChannelId,
        active: bool,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let target = tables
            .targets
            .get_mut(&channel_id)
            .ok_or_else(|| not_found("spawn channel", channel_id))?;
        target.active = active;
        Ok(())
    }

    pub fn companion(&self, user_id: UserId) -> Result<Option<CompanionRecord>, StoreError> {
        Ok(self.read()?.companions.get(&user_id).cloned())
    }

    pub fn channel_target(
        &self,
        channel_id: ChannelId,
    ) -> Result<Option<SpawnChannelTarget>, StoreError> {
        Ok(self.read()?.targets.get(&channel_id).cloned())
    }

    pub fn quest_progress(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
    ) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .quests
            .get(&(user_id, community_id, kind))
            .copied()
            .unwrap_or(0))
    }

    /// Community-wide progress for one quest kind
    pub fn community_quest_total(
        &self,
        community_id: CommunityId,
        kind: QuestKind,
    ) -> Result<u64, StoreError> {
        Ok(self
            .read()?
            .quests
            .iter()
            .filter(|((_, c, k), _)| *c == community_id && *k == kind)
            .map(|(_, count)| *count)
            .sum())
    }

    pub fn companion_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.companions.len())
    }
}

fn not_found(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn companion_record(
        &self,
        user_id: UserId,
    ) -> Result<Option<CompanionRecord>, StoreError> {
        self.companion(user_id)
    }

    async fn update_experience(
        &self,
        record_id: &RecordId,
        total_experience: u64,
        level: u32,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let record = tables
            .companions
            .values_mut()
            .find(|c| &c.id == record_id)
            .ok_or_else(|| not_found("companion", record_id))?;
        record.total_experience = total_experience;
        record.level = level;
        Ok(())
    }

    async fn channel_targets(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<SpawnChannelTarget>, StoreError> {
        let mut targets: Vec<SpawnChannelTarget> = self
            .read()?
            .targets
            .values()
            .filter(|t| t.community_id == community_id)
            .cloned()
            .collect();
        targets.sort_by_key(|t| t.channel_id);
        Ok(targets)
    }

    async fn update_channel_target(
        &self,
        channel_id: ChannelId,
        current_messages: u64,
        last_spawn_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let target = tables
            .targets
            .get_mut(&channel_id)
            .ok_or_else(|| not_found("spawn channel", channel_id))?;
        target.current_messages = current_messages;
        if last_spawn_at.is_some() {
            target.last_spawn_at = last_spawn_at;
        }
        Ok(())
    }

    async fn apply_quest_increment(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
        count: u64,
    ) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let progress = tables
            .quests
            .entry((user_id, community_id, kind))
            .or_insert(0);
        *progress = progress.saturating_add(count);
        Ok(())
    }

    async fn membership_role(&self, user_id: UserId) -> Result<Option<MembershipRole>, StoreError> {
        Ok(self.read()?.roles.get(&user_id).cloned())
    }
}
