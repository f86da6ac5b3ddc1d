//! Test doubles for the collaborator ports

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    ChannelHandle, ChannelId, CommunityId, CompanionRecord, MembershipRole, QuestKind, RecordId,
    SpawnChannelTarget, StoreError, ThresholdEvent, UserId,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ports::{NotificationSink, PersistentStore, SpawnTrigger};

/// In-memory store with per-key failure injection
#[derive(Default)]
pub(crate) struct FakeStore {
    companions: Mutex<HashMap<UserId, CompanionRecord>>,
    roles: Mutex<HashMap<UserId, MembershipRole>>,
    targets: Mutex<HashMap<ChannelId, SpawnChannelTarget>>,
    quests: Mutex<HashMap<(UserId, CommunityId, QuestKind), u64>>,
    failing_companion_reads: Mutex<HashSet<UserId>>,
    failing_experience_writes: Mutex<HashSet<RecordId>>,
    failing_quests: Mutex<HashSet<UserId>>,
    failing_targets: Mutex<HashSet<CommunityId>>,
    failing_channel_writes: Mutex<HashSet<ChannelId>>,
    companion_reads: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_companion(&self, user: UserId, name: &str, total_experience: u64, level: u32) {
        self.companions.lock().unwrap().insert(
            user,
            CompanionRecord {
                id: RecordId::new(format!("rec-{}", user)),
                user_id: user,
                name: name.to_string(),
                total_experience,
                level,
            },
        );
    }

    pub fn set_role(&self, user: UserId, role: &str) {
        self.roles
            .lock()
            .unwrap()
            .insert(user, MembershipRole::new(role));
    }

    pub fn add_target(
        &self,
        community: CommunityId,
        channel: ChannelId,
        target_messages: u64,
        current_messages: u64,
        active: bool,
    ) {
        self.targets.lock().unwrap().insert(
            channel,
            SpawnChannelTarget {
                channel_id: channel,
                community_id: community,
                target_messages,
                current_messages,
                active,
                last_spawn_at: None,
            },
        );
    }

    pub fn companion(&self, user: UserId) -> Option<CompanionRecord> {
        self.companions.lock().unwrap().get(&user).cloned()
    }

    pub fn release_companion(&self, user: UserId) {
        self.companions.lock().unwrap().remove(&user);
    }

    pub fn target(&self, channel: ChannelId) -> Option<SpawnChannelTarget> {
        self.targets.lock().unwrap().get(&channel).cloned()
    }

    pub fn quest_total(&self, user: UserId, community: CommunityId, kind: QuestKind) -> u64 {
        self.quests
            .lock()
            .unwrap()
            .get(&(user, community, kind))
            .copied()
            .unwrap_or(0)
    }

    pub fn companion_reads(&self) -> usize {
        self.companion_reads.load(Ordering::SeqCst)
    }

    pub fn fail_companion_reads_for(&self, user: UserId) {
        self.failing_companion_reads.lock().unwrap().insert(user);
    }

    pub fn fail_experience_writes_for(&self, user: UserId) {
        self.failing_experience_writes
            .lock()
            .unwrap()
            .insert(RecordId::new(format!("rec-{}", user)));
    }

    pub fn heal_experience_writes(&self) {
        self.failing_experience_writes.lock().unwrap().clear();
    }

    pub fn fail_quests_for(&self, user: UserId) {
        self.failing_quests.lock().unwrap().insert(user);
    }

    pub fn fail_targets_for(&self, community: CommunityId) {
        self.failing_targets.lock().unwrap().insert(community);
    }

    pub fn fail_channel_writes_for(&self, channel: ChannelId) {
        self.failing_channel_writes.lock().unwrap().insert(channel);
    }

    pub fn heal_channel_writes(&self) {
        self.failing_channel_writes.lock().unwrap().clear();
    }
}

#[async_trait]
impl PersistentStore for FakeStore {
    async fn companion_record(
        &self,
        user_id: UserId,
    ) -> Result<Option<CompanionRecord>, StoreError> {
        self.companion_reads.fetch_add(1, Ordering::SeqCst);
        if self.failing_companion_reads.lock().unwrap().contains(&user_id) {
            return Err(StoreError::transient("companion read failed"));
        }
        Ok(self.companion(user_id))
    }

    async fn update_experience(
        &self,
        record_id: &RecordId,
        total_experience: u64,
        level: u32,
    ) -> Result<(), StoreError> {
        if self.failing_experience_writes.lock().unwrap().contains(record_id) {
            return Err(StoreError::transient("experience write failed"));
        }
        let mut companions = self.companions.lock().unwrap();
        let record = companions
            .values_mut()
            .find(|c| &c.id == record_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "companion",
                id: record_id.to_string(),
            })?;
        record.total_experience = total_experience;
        record.level = level;
        Ok(())
    }

    async fn channel_targets(
        &self,
        community_id: CommunityId,
    ) -> Result<Vec<SpawnChannelTarget>, StoreError> {
        if self.failing_targets.lock().unwrap().contains(&community_id) {
            return Err(StoreError::transient("target read failed"));
        }
        let mut targets: Vec<_> = self
            .targets
            .lock()
            .unwrap()
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
        if self.failing_channel_writes.lock().unwrap().contains(&channel_id) {
            return Err(StoreError::transient("channel write failed"));
        }
        let mut targets = self.targets.lock().unwrap();
        let target = targets.get_mut(&channel_id).ok_or_else(|| StoreError::NotFound {
            entity: "spawn channel",
            id: channel_id.to_string(),
        })?;
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
        if self.failing_quests.lock().unwrap().contains(&user_id) {
            return Err(StoreError::transient("quest write failed"));
        }
        *self
            .quests
            .lock()
            .unwrap()
            .entry((user_id, community_id, kind))
            .or_insert(0) += count;
        Ok(())
    }

    async fn membership_role(&self, user_id: UserId) -> Result<Option<MembershipRole>, StoreError> {
        Ok(self.roles.lock().unwrap().get(&user_id).cloned())
    }
}

/// A notification captured by `RecordingSink`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notice {
    LevelUp {
        channel: ChannelHandle,
        user: UserId,
        companion: String,
        level: u32,
    },
    Milestone {
        user: UserId,
        level: u32,
    },
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send_level_up(
        &self,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        new_level: u32,
    ) {
        self.notices.lock().unwrap().push(Notice::LevelUp {
            channel,
            user: user_id,
            companion: companion_name.to_string(),
            level: new_level,
        });
    }

    async fn send_milestone(
        &self,
        _channel: ChannelHandle,
        user_id: UserId,
        _companion_name: &str,
        milestone_level: u32,
    ) {
        self.notices.lock().unwrap().push(Notice::Milestone {
            user: user_id,
            level: milestone_level,
        });
    }
}

#[derive(Default)]
pub(crate) struct RecordingTrigger {
    batches: Mutex<Vec<Vec<ThresholdEvent>>>,
}

impl RecordingTrigger {
    pub fn batches(&self) -> Vec<Vec<ThresholdEvent>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpawnTrigger for RecordingTrigger {
    async fn on_threshold_reached(&self, events: Vec<ThresholdEvent>) {
        self.batches.lock().unwrap().push(events);
    }
}
