//! NotificationLog - Level-up and milestone notices kept in memory
//!
//! Stands in for the chat client: every notice is logged through `tracing`
//! and kept in a bounded ring so it can be inspected or exported as JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use herd_core::NotificationSink;
use shared::{ChannelHandle, ChannelId, CommunityId, UserId};

/// Types of notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LevelUp,
    Milestone,
}

/// One delivered notice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEntry {
    pub timestamp: String,
    pub kind: NotificationKind,
    pub community_id: CommunityId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub companion_name: String,
    pub level: u32,
}

#[derive(Debug)]
pub struct NotificationLog {
    entries: Mutex<VecDeque<NotificationEntry>>,
    max_entries: usize,
}

impl NotificationLog {
    /// Create a log keeping at most `max_entries` notices
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries)),
            max_entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<NotificationEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, entry: NotificationEntry) {
        let mut entries = self.lock();
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    fn record(
        &self,
        kind: NotificationKind,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        level: u32,
    ) {
        self.push(NotificationEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            community_id: channel.community_id,
            channel_id: channel.channel_id,
            user_id,
            companion_name: companion_name.to_string(),
            level,
        });
    }

    /// Get all entries, oldest first
    pub fn entries(&self) -> Vec<NotificationEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Get the most recent `count` entries
    pub fn recent(&self, count: usize) -> Vec<NotificationEntry> {
        let entries = self.lock();
        entries
            .iter()
            .skip(entries.len().saturating_sub(count))
            .cloned()
            .collect()
    }

    pub fn count_of(&self, kind: NotificationKind) -> usize {
        self.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Export entries as JSON
    pub fn export_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }
}

impl Default for NotificationLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl NotificationSink for NotificationLog {
    async fn send_level_up(
        &self,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        new_level: u32,
    ) {
        info!(
            channel = %channel,
            user = %user_id,
            companion = companion_name,
            level = new_level,
            "Companion leveled up"
        );
        self.record(NotificationKind::LevelUp, channel, user_id, companion_name, new_level);
    }

    async fn send_milestone(
        &self,
        channel: ChannelHandle,
        user_id: UserId,
        companion_name: &str,
        milestone_level: u32,
    ) {
        info!(
            channel = %channel,
            user = %user_id,
            companion = companion_name,
            milestone = milestone_level,
            "Companion reached a milestone"
        );
        self.record(
            NotificationKind::Milestone,
            channel,
            user_id,
            companion_name,
            milestone_level,
        );
    }
}
