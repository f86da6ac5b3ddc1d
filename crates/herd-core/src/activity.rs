//! ActivityAggregator - Write-coalescing buffer for chat activity
//!
//! Producers call `record_activity` once per chat message; the activity
//! settlement pass drains the buffered counts on a timer. Both maps are
//! sharded (`DashMap`), so a producer only ever locks the shard holding its
//! own user or community.
//!
//! Drains are single map operations: the count is taken and reset while the
//! shard lock is held, so an increment racing with a drain lands either in
//! the drained value or in the next cycle, never nowhere.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herd_domain::ActivityPhase;
use shared::{ChannelHandle, ChannelId, CommunityId, SettlementError, UserId};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Pending activity of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserActivityRecord {
    pub user_id: UserId,
    pub pending_message_count: u64,
    pub touched_channels: HashSet<ChannelId>,
    pub last_activity_at: Option<DateTime<Utc>>,
    /// Last channel the user spoke in; level-up notices go here
    pub notify_target: Option<ChannelHandle>,
    phase: ActivityPhase,
    last_touched: Option<Instant>,
}

impl UserActivityRecord {
    /// A record with nothing pending
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            pending_message_count: 0,
            touched_channels: HashSet::new(),
            last_activity_at: None,
            notify_target: None,
            phase: ActivityPhase::Idle,
            last_touched: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending_message_count == 0
    }

    pub fn phase(&self) -> ActivityPhase {
        self.phase
    }

    /// Copy out the pending state and reset the record in place
    fn take(&mut self) -> Self {
        let drained = Self {
            user_id: self.user_id,
            pending_message_count: self.pending_message_count,
            touched_channels: std::mem::take(&mut self.touched_channels),
            last_activity_at: self.last_activity_at,
            notify_target: self.notify_target,
            phase: self.phase.on_drain(),
            last_touched: self.last_touched,
        };
        self.pending_message_count = 0;
        self.phase = ActivityPhase::Idle;
        drained
    }
}

/// Pending activity of one community, for one settlement cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityActivityRecord {
    pub community_id: CommunityId,
    pub pending_message_count: u64,
    pub participants: HashSet<UserId>,
    pub touched_channels: HashSet<ChannelId>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl CommunityActivityRecord {
    pub fn empty(community_id: CommunityId) -> Self {
        Self {
            community_id,
            pending_message_count: 0,
            participants: HashSet::new(),
            touched_channels: HashSet::new(),
            last_message_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending_message_count == 0
    }
}

/// In-memory accumulation of per-user and per-community message counts
#[derive(Debug, Default)]
pub struct ActivityAggregator {
    users: DashMap<UserId, UserActivityRecord>,
    communities: DashMap<CommunityId, CommunityActivityRecord>,
}

impl ActivityAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one message from `user_id` in `channel_id`
    ///
    /// Never performs I/O. Zero ids are rejected.
    pub fn record_activity(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        channel_id: ChannelId,
        notify_target: ChannelHandle,
    ) -> Result<(), SettlementError> {
        if !user_id.is_valid() || !community_id.is_valid() || !channel_id.is_valid() {
            return Err(SettlementError::MalformedInput(format!(
                "activity ids must be non-zero (user {}, community {}, channel {})",
                user_id, community_id, channel_id
            )));
        }

        let now = Utc::now();
        let touched = Instant::now();

        {
            let mut user = self
                .users
                .entry(user_id)
                .or_insert_with(|| UserActivityRecord::empty(user_id));
            user.pending_message_count = user.pending_message_count.saturating_add(1);
            user.touched_channels.insert(channel_id);
            user.last_activity_at = Some(now);
            user.notify_target = Some(notify_target);
            user.phase = user.phase.on_record();
            user.last_touched = Some(touched);
        }

        let mut community = self
            .communities
            .entry(community_id)
            .or_insert_with(|| CommunityActivityRecord::empty(community_id));
        community.pending_message_count = community.pending_message_count.saturating_add(1);
        community.participants.insert(user_id);
        community.touched_channels.insert(channel_id);
        community.last_message_at = Some(now);

        Ok(())
    }

    /// Atomically read and reset a user's pending count
    ///
    /// The record itself stays (with count zero) so the notify target
    /// survives. Unknown users yield an empty record.
    pub fn drain_user(&self, user_id: UserId) -> UserActivityRecord {
        match self.users.get_mut(&user_id) {
            Some(mut record) => record.take(),
            None => UserActivityRecord::empty(user_id),
        }
    }

    /// Atomically read and remove a community's record
    pub fn drain_community(&self, community_id: CommunityId) -> CommunityActivityRecord {
        self.communities
            .remove(&community_id)
            .map(|(_, record)| record)
            .unwrap_or_else(|| CommunityActivityRecord::empty(community_id))
    }

    /// Put back `count` messages that could not be settled this cycle
    pub fn restore_user(&self, user_id: UserId, count: u64, notify_target: Option<ChannelHandle>) {
        if count == 0 {
            return;
        }
        let mut record = self
            .users
            .entry(user_id)
            .or_insert_with(|| UserActivityRecord::empty(user_id));
        record.pending_message_count = record.pending_message_count.saturating_add(count);
        record.phase = record.phase.on_restore();
        if record.notify_target.is_none() {
            record.notify_target = notify_target;
        }
        if record.last_touched.is_none() {
            record.last_touched = Some(Instant::now());
        }
    }

    /// Put back a community delta whose spawn evaluation failed
    pub fn restore_community(&self, record: CommunityActivityRecord) {
        if record.is_empty() {
            return;
        }
        let community_id = record.community_id;
        let mut current = self
            .communities
            .entry(community_id)
            .or_insert_with(|| CommunityActivityRecord::empty(community_id));
        current.pending_message_count = current
            .pending_message_count
            .saturating_add(record.pending_message_count);
        current.participants.extend(record.participants);
        current.touched_channels.extend(record.touched_channels);
        current.last_message_at = current.last_message_at.max(record.last_message_at);
    }

    /// Users with a record, taken without holding any lock afterwards
    pub fn snapshot_user_keys(&self) -> Vec<UserId> {
        self.users.iter().map(|entry| *entry.key()).collect()
    }

    /// Communities with a record in the current cycle
    pub fn snapshot_community_keys(&self) -> Vec<CommunityId> {
        self.communities.iter().map(|entry| *entry.key()).collect()
    }

    pub fn pending_user_count(&self, user_id: UserId) -> u64 {
        self.users
            .get(&user_id)
            .map(|record| record.pending_message_count)
            .unwrap_or(0)
    }

    pub fn user_phase(&self, user_id: UserId) -> ActivityPhase {
        self.users
            .get(&user_id)
            .map(|record| record.phase())
            .unwrap_or(ActivityPhase::Idle)
    }

    pub fn pending_community_count(&self, community_id: CommunityId) -> u64 {
        self.communities
            .get(&community_id)
            .map(|record| record.pending_message_count)
            .unwrap_or(0)
    }

    /// Remove zero-count user records not touched within `idle_for`
    pub fn prune_idle(&self, now: Instant, idle_for: Duration) -> usize {
        let mut pruned = 0usize;
        self.users.retain(|_, record| {
            let idle = record.pending_message_count == 0
                && record
                    .last_touched
                    .map(|t| now.saturating_duration_since(t) >= idle_for)
                    .unwrap_or(true);
            if idle {
                pruned += 1;
            }
            !idle
        });
        pruned
    }

    pub fn user_record_count(&self) -> usize {
        self.users.len()
    }

    pub fn community_record_count(&self) -> usize {
        self.communities.len()
    }
}
