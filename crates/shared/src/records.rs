//! Records exchanged with the persistent store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::SettlementError;
use crate::ids::{ChannelId, CommunityId, RecordId, UserId};

/// A user's active companion as persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanionRecord {
    pub id: RecordId,
    pub user_id: UserId,
    /// Display name used in notifications
    pub name: String,
    pub total_experience: u64,
    pub level: u32,
}

/// A user's membership role in the community (e.g. "booster")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MembershipRole(String);

impl MembershipRole {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Per-channel spawn target, persisted in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnChannelTarget {
    pub channel_id: ChannelId,
    pub community_id: CommunityId,
    pub target_messages: u64,
    pub current_messages: u64,
    pub active: bool,
    pub last_spawn_at: Option<DateTime<Utc>>,
}

/// A channel reached its spawn target during a settlement pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdEvent {
    pub channel_id: ChannelId,
    pub community_id: CommunityId,
    /// Counter value (before reset) that crossed the target
    pub total_messages: u64,
}

/// Kinds of community-quest progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestKind {
    BitsEarned,
    PoniesObtained,
    GamesWon,
    MessagesSent,
    TradesCompleted,
}

impl QuestKind {
    pub const ALL: [QuestKind; 5] = [
        QuestKind::BitsEarned,
        QuestKind::PoniesObtained,
        QuestKind::GamesWon,
        QuestKind::MessagesSent,
        QuestKind::TradesCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestKind::BitsEarned => "bits_earned",
            QuestKind::PoniesObtained => "ponies_obtained",
            QuestKind::GamesWon => "games_won",
            QuestKind::MessagesSent => "messages_sent",
            QuestKind::TradesCompleted => "trades_completed",
        }
    }
}

impl core::fmt::Display for QuestKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestKind {
    type Err = SettlementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        QuestKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SettlementError::MalformedInput(format!("unknown quest kind '{}'", s)))
    }
}
