//! Configuration types for Herd
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration. Balance numbers live here, not in code.

use herd_domain::{LevelCurve, QuestBatchPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::SettlementError;

/// Level curve constants (see `herd_domain::ExperienceEngine`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LevelCurveConfig {
    pub base: u64,
    pub quadratic: u64,
    pub max_level: u32,
}

impl Default for LevelCurveConfig {
    fn default() -> Self {
        let curve = LevelCurve::default();
        Self {
            base: curve.base(),
            quadratic: curve.quadratic(),
            max_level: curve.max_level(),
        }
    }
}

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettlementConfig {
    /// Activity flush period
    pub activity_interval_secs: u64,
    /// Quest flush period
    pub quest_interval_secs: u64,
    /// Cache sweep / idle pruning period
    pub maintenance_interval_secs: u64,

    pub companion_cache_ttl_secs: u64,
    pub membership_cache_ttl_secs: u64,

    pub experience_per_message: u64,
    /// Messages settled per user per activity cycle; the rest carries over
    pub max_messages_per_cycle: u64,

    pub quest_max_latency_secs: u64,
    pub quest_max_batch: u64,

    /// Zero-count activity records untouched this long are pruned
    pub idle_record_ttl_secs: u64,

    pub level_curve: LevelCurveConfig,
    pub milestone_levels: Vec<u32>,

    /// Membership role name -> experience bonus in percent
    pub role_bonus_percent: HashMap<String, u32>,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            activity_interval_secs: 15,
            quest_interval_secs: 30,
            maintenance_interval_secs: 60,
            companion_cache_ttl_secs: 300,
            membership_cache_ttl_secs: 300,
            experience_per_message: 15,
            max_messages_per_cycle: 10,
            quest_max_latency_secs: 60,
            quest_max_batch: 25,
            idle_record_ttl_secs: 3600,
            level_curve: LevelCurveConfig::default(),
            milestone_levels: vec![10, 25, 50, 75, 100],
            role_bonus_percent: HashMap::new(),
        }
    }
}

impl SettlementConfig {
    /// Load configuration from a JSON or YAML file (by extension)
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler or the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let intervals = [
            ("activityIntervalSecs", self.activity_interval_secs),
            ("questIntervalSecs", self.quest_interval_secs),
            ("maintenanceIntervalSecs", self.maintenance_interval_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SettlementError::Config(format!("{} must be > 0", name)));
            }
        }
        if self.max_messages_per_cycle == 0 {
            return Err(SettlementError::Config(
                "maxMessagesPerCycle must be > 0".to_string(),
            ));
        }
        if self.quest_max_batch == 0 {
            return Err(SettlementError::Config("questMaxBatch must be > 0".to_string()));
        }
        self.level_curve()?;
        Ok(())
    }

    pub fn level_curve(&self) -> crate::Result<LevelCurve> {
        let c = &self.level_curve;
        Ok(LevelCurve::new(c.base, c.quadratic, c.max_level)?)
    }

    pub fn quest_policy(&self) -> QuestBatchPolicy {
        QuestBatchPolicy::new(
            Duration::from_secs(self.quest_max_latency_secs),
            self.quest_max_batch,
        )
    }

    pub fn activity_interval(&self) -> Duration {
        Duration::from_secs(self.activity_interval_secs)
    }

    pub fn quest_interval(&self) -> Duration {
        Duration::from_secs(self.quest_interval_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn companion_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.companion_cache_ttl_secs)
    }

    pub fn membership_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.membership_cache_ttl_secs)
    }

    pub fn idle_record_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_record_ttl_secs)
    }

    /// Bonus percent for a role, 0 when the role has none
    pub fn bonus_percent_for(&self, role: &str) -> u32 {
        self.role_bonus_percent.get(role).copied().unwrap_or(0)
    }
}
