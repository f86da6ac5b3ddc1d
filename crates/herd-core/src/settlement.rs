//! Settlement passes - Moving buffered deltas into the persistent store
//!
//! ```text
//! activity pass:  drain user ─▶ cap ─▶ companion ─▶ bonus ─▶ apply ─▶ persist ─▶ notify
//!                 drain community ─▶ spawn thresholds ─▶ one trigger call
//! quest pass:     eligible increments ─▶ store
//! maintenance:    sweep caches, prune idle activity records
//! ```
//!
//! Every key is settled independently. A transient store failure re-queues
//! that key's delta and the pass moves on; nothing here is fatal.

use chrono::{DateTime, Utc};
use herd_domain::{CycleSplit, ExperienceEngine};
use shared::{SettlementConfig, SettlementError, ThresholdEvent, UserId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::UserActivityRecord;
use crate::aggregator_store::AggregatorStore;
use crate::ports::Collaborators;
use crate::quest_queue::QuestPassReport;
use crate::spawn_evaluator::SpawnThresholdEvaluator;

/// Outcome of one activity pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityPassReport {
    pub users_settled: usize,
    pub messages_applied: u64,
    pub messages_carried: u64,
    pub experience_applied: u64,
    pub level_ups: usize,
    /// Users whose drained count was discarded because they have no companion
    pub users_without_companion: usize,
    /// Users whose delta went back to the aggregator after a store failure
    pub users_deferred: usize,
    pub communities_evaluated: usize,
    pub communities_deferred: usize,
    /// Spawn channels whose counter write failed; their delta waits for the next pass
    pub spawn_channels_carried: usize,
    pub threshold_events: usize,
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub companions_swept: usize,
    pub memberships_swept: usize,
    pub idle_records_pruned: usize,
}

/// Outcome of the shutdown flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub activity: ActivityPassReport,
    pub quests: QuestPassReport,
}

enum UserOutcome {
    Idle,
    NoCompanion,
    Deferred,
    Settled {
        applied: u64,
        carried: u64,
        experience: u64,
        leveled_up: bool,
    },
}

/// Runs the settlement passes over a shared `AggregatorStore`
pub struct SettlementEngine {
    state: Arc<AggregatorStore>,
    collaborators: Collaborators,
    experience: ExperienceEngine,
    evaluator: SpawnThresholdEvaluator,
    config: SettlementConfig,
}

impl SettlementEngine {
    pub fn new(
        config: SettlementConfig,
        state: Arc<AggregatorStore>,
        collaborators: Collaborators,
    ) -> Result<Self, SettlementError> {
        config.validate()?;
        let experience = ExperienceEngine::new(config.level_curve()?);
        let evaluator = SpawnThresholdEvaluator::new(collaborators.store.clone());
        Ok(Self {
            state,
            collaborators,
            experience,
            evaluator,
            config,
        })
    }

    pub fn state(&self) -> &Arc<AggregatorStore> {
        &self.state
    }

    pub fn experience(&self) -> &ExperienceEngine {
        &self.experience
    }

    /// Settle buffered chat activity: experience first, then spawn counters
    pub async fn run_activity_pass(&self) -> ActivityPassReport {
        self.run_activity_pass_at(Utc::now()).await
    }

    /// `run_activity_pass` stamping fired spawn targets with `now`
    pub async fn run_activity_pass_at(&self, now: DateTime<Utc>) -> ActivityPassReport {
        let mut report = ActivityPassReport::default();

        for user_id in self.state.activity.snapshot_user_keys() {
            match self.settle_user(user_id).await {
                UserOutcome::Idle => {}
                UserOutcome::NoCompanion => report.users_without_companion += 1,
                UserOutcome::Deferred => report.users_deferred += 1,
                UserOutcome::Settled {
                    applied,
                    carried,
                    experience,
                    leveled_up,
                } => {
                    report.users_settled += 1;
                    report.messages_applied += applied;
                    report.messages_carried += carried;
                    report.experience_applied += experience;
                    if leveled_up {
                        report.level_ups += 1;
                    }
                }
            }
        }

        // Communities with only carried channel deltas are evaluated too.
        let mut communities = self.evaluator.carried_communities();
        communities.extend(self.state.activity.snapshot_community_keys());

        let mut events: Vec<ThresholdEvent> = Vec::new();
        for community_id in communities {
            let record = self.state.activity.drain_community(community_id);
            if record.is_empty() && !self.evaluator.has_carry_for(community_id) {
                continue;
            }
            match self
                .evaluator
                .evaluate_at(community_id, record.pending_message_count, now)
                .await
            {
                Ok(fired) => {
                    report.communities_evaluated += 1;
                    events.extend(fired);
                }
                Err(e) => {
                    warn!(
                        community = %community_id,
                        messages = record.pending_message_count,
                        error = %e,
                        "Spawn evaluation failed, re-queued"
                    );
                    report.communities_deferred += 1;
                    self.state.activity.restore_community(record);
                }
            }
        }

        report.spawn_channels_carried = self.evaluator.carried_channel_count();

        if !events.is_empty() {
            report.threshold_events = events.len();
            self.collaborators.spawns.on_threshold_reached(events).await;
        }

        report
    }

    async fn settle_user(&self, user_id: UserId) -> UserOutcome {
        let drained = self.state.activity.drain_user(user_id);
        if drained.is_empty() {
            return UserOutcome::Idle;
        }

        let split = CycleSplit::cap(
            drained.pending_message_count,
            self.config.max_messages_per_cycle,
        );
        if split.carried > 0 {
            self.state
                .activity
                .restore_user(user_id, split.carried, drained.notify_target);
        }

        let store = self.collaborators.store.as_ref();
        let companion = match self.state.companion(store, user_id).await {
            Ok(Some(companion)) => companion,
            Ok(None) => {
                debug!(
                    user = %user_id,
                    messages = split.applied,
                    "No active companion, activity discarded"
                );
                return UserOutcome::NoCompanion;
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "Companion lookup failed, re-queued");
                self.defer(&drained, split.applied);
                return UserOutcome::Deferred;
            }
        };

        let delta = self.experience_for(user_id, split.applied).await;
        let gain = self
            .experience
            .apply_experience(companion.total_experience, delta);

        if let Err(e) = store
            .update_experience(
                &companion.id,
                gain.new_state.total_experience,
                gain.new_state.level,
            )
            .await
        {
            warn!(
                user = %user_id,
                companion = %companion.id,
                experience = delta,
                error = %e,
                "Experience write failed, re-queued"
            );
            // The cached record may be gone or stale; read it afresh next cycle.
            self.state.companions.invalidate(&user_id);
            self.defer(&drained, split.applied);
            return UserOutcome::Deferred;
        }
        self.state.companions.invalidate(&user_id);

        debug!(
            user = %user_id,
            applied = split.applied,
            carried = split.carried,
            experience = delta,
            level = gain.new_state.level,
            phase = ?split.phase_after(),
            "Settled activity"
        );

        if gain.leveled_up {
            match drained.notify_target {
                Some(channel) => {
                    let notices = &self.collaborators.notifications;
                    notices
                        .send_level_up(channel, user_id, &companion.name, gain.new_state.level)
                        .await;
                    for milestone in gain.milestones_crossed(&self.config.milestone_levels) {
                        notices
                            .send_milestone(channel, user_id, &companion.name, milestone)
                            .await;
                    }
                }
                None => {
                    debug!(user = %user_id, "Level up without a known channel, not announced");
                }
            }
        }

        UserOutcome::Settled {
            applied: split.applied,
            carried: split.carried,
            experience: delta,
            leveled_up: gain.leveled_up,
        }
    }

    fn defer(&self, drained: &UserActivityRecord, count: u64) {
        self.state
            .activity
            .restore_user(drained.user_id, count, drained.notify_target);
    }

    /// Experience for `messages`, including the membership-role bonus
    async fn experience_for(&self, user_id: UserId, messages: u64) -> u64 {
        let base = messages.saturating_mul(self.config.experience_per_message);
        if self.config.role_bonus_percent.is_empty() {
            return base;
        }

        let percent = match self
            .state
            .membership_role(self.collaborators.store.as_ref(), user_id)
            .await
        {
            Ok(Some(role)) => self.config.bonus_percent_for(role.as_str()),
            Ok(None) => 0,
            Err(e) => {
                warn!(user = %user_id, error = %e, "Membership lookup failed, no bonus applied");
                0
            }
        };

        base.saturating_add(base.saturating_mul(u64::from(percent)) / 100)
    }

    /// Apply every eligible quest increment
    pub async fn run_quest_pass(&self) -> QuestPassReport {
        self.state
            .quests
            .settle(self.collaborators.store.as_ref())
            .await
    }

    /// Sweep expired cache entries and prune idle activity records
    pub fn run_maintenance(&self) -> MaintenanceReport {
        self.run_maintenance_at(Instant::now())
    }

    pub fn run_maintenance_at(&self, now: Instant) -> MaintenanceReport {
        MaintenanceReport {
            companions_swept: self.state.companions.sweep_expired_at(now),
            memberships_swept: self.state.memberships.sweep_expired_at(now),
            idle_records_pruned: self
                .state
                .activity
                .prune_idle(now, self.config.idle_record_ttl()),
        }
    }

    /// Best-effort final flush: one activity pass, then every quest entry
    pub async fn flush_all(&self) -> FlushReport {
        let activity = self.run_activity_pass().await;
        let quests = self
            .state
            .quests
            .flush_all(self.collaborators.store.as_ref())
            .await;

        info!(
            users = activity.users_settled,
            carried = activity.messages_carried,
            deferred = activity.users_deferred,
            quests_applied = quests.applied,
            quests_failed = quests.failed,
            "Final settlement flush complete"
        );

        FlushReport { activity, quests }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, Notice, RecordingSink, RecordingTrigger};
    use herd_domain::ActivityPhase;
    use shared::{ChannelHandle, ChannelId, CommunityId, QuestKind};
    use std::collections::HashMap;
    use std::time::Duration;

    const GUILD: CommunityId = CommunityId::new(1);
    const GENERAL: ChannelId = ChannelId::new(2);
    const MEADOW: ChannelId = ChannelId::new(3);
    const TWILIGHT: UserId = UserId::new(10);
    const RARITY: UserId = UserId::new(11);

    struct Harness {
        engine: SettlementEngine,
        store: Arc<FakeStore>,
        sink: Arc<RecordingSink>,
        trigger: Arc<RecordingTrigger>,
    }

    fn harness(config: SettlementConfig) -> Harness {
        let store = Arc::new(FakeStore::new());
        let sink = Arc::new(RecordingSink::default());
        let trigger = Arc::new(RecordingTrigger::default());
        let collaborators = Collaborators::new(store.clone(), sink.clone(), trigger.clone());
        let state = Arc::new(AggregatorStore::new(&config));
        let engine = SettlementEngine::new(config, state, collaborators).unwrap();
        Harness {
            engine,
            store,
            sink,
            trigger,
        }
    }

    fn chat(h: &Harness, user: UserId, messages: u64) {
        for _ in 0..messages {
            h.engine
                .state()
                .activity
                .record_activity(user, GUILD, GENERAL, ChannelHandle::new(GUILD, GENERAL))
                .unwrap();
        }
    }

    // ============== Activity Pass Tests ==============

    #[tokio::test]
    async fn test_cap_applies_and_carries_over() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 12);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 150);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 2);
        assert_eq!(
            h.engine.state().activity.user_phase(TWILIGHT),
            ActivityPhase::PartialCarryover
        );
        assert_eq!(report.messages_applied, 10);
        assert_eq!(report.messages_carried, 2);
        assert_eq!(report.experience_applied, 150);

        // The carry-over is settled next cycle
        h.engine.run_activity_pass().await;
        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 180);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 0);
    }

    #[tokio::test]
    async fn test_level_up_announced_in_last_channel() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 10);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.level_ups, 1);
        assert_eq!(h.store.companion(TWILIGHT).unwrap().level, 2);
        assert_eq!(
            h.sink.notices(),
            vec![Notice::LevelUp {
                channel: ChannelHandle::new(GUILD, GENERAL),
                user: TWILIGHT,
                companion: "Owlowiscious".to_string(),
                level: 2,
            }]
        );
    }

    #[tokio::test]
    async fn test_milestone_follows_level_up() {
        let h = harness(SettlementConfig {
            milestone_levels: vec![2, 5],
            ..Default::default()
        });
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 10);

        h.engine.run_activity_pass().await;

        let notices = h.sink.notices();
        assert_eq!(notices.len(), 2);
        assert!(matches!(notices[0], Notice::LevelUp { level: 2, .. }));
        assert_eq!(
            notices[1],
            Notice::Milestone {
                user: TWILIGHT,
                level: 2
            }
        );
    }

    #[tokio::test]
    async fn test_no_level_up_no_notice() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 1);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.level_ups, 0);
        assert!(h.sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_user_without_companion_discarded() {
        let h = harness(SettlementConfig::default());
        chat(&h, RARITY, 4);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.users_without_companion, 1);
        assert_eq!(h.engine.state().activity.pending_user_count(RARITY), 0);
    }

    #[tokio::test]
    async fn test_write_failure_requeues_only_that_user() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        h.store.add_companion(RARITY, "Opalescence", 0, 1);
        h.store.fail_experience_writes_for(TWILIGHT);
        chat(&h, TWILIGHT, 12);
        chat(&h, RARITY, 3);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.users_deferred, 1);
        assert_eq!(report.users_settled, 1);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 12);
        assert_eq!(h.store.companion(RARITY).unwrap().total_experience, 45);

        h.store.heal_experience_writes();
        h.engine.run_activity_pass().await;
        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 150);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 2);
    }

    #[tokio::test]
    async fn test_write_failure_drops_cached_companion() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        h.store.fail_experience_writes_for(TWILIGHT);
        chat(&h, TWILIGHT, 3);

        h.engine.run_activity_pass().await;
        assert!(h.engine.state().companions.is_empty());

        h.store.heal_experience_writes();
        h.engine.run_activity_pass().await;

        // Re-read from the store instead of trusting the cached record
        assert_eq!(h.store.companion_reads(), 2);
        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 45);
    }

    #[tokio::test]
    async fn test_released_companion_not_written_again() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        // Cache the record, then release the companion behind the cache
        h.engine
            .state()
            .companion(h.store.as_ref(), TWILIGHT)
            .await
            .unwrap();
        h.store.release_companion(TWILIGHT);
        chat(&h, TWILIGHT, 3);

        let first = h.engine.run_activity_pass().await;
        assert_eq!(first.users_deferred, 1);

        let second = h.engine.run_activity_pass().await;
        assert_eq!(second.users_without_companion, 1);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 0);
    }

    #[tokio::test]
    async fn test_companion_read_failure_requeues() {
        let h = harness(SettlementConfig::default());
        h.store.fail_companion_reads_for(TWILIGHT);
        chat(&h, TWILIGHT, 3);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.users_deferred, 1);
        assert_eq!(h.engine.state().activity.pending_user_count(TWILIGHT), 3);
    }

    #[tokio::test]
    async fn test_companion_cache_invalidated_after_write() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);

        chat(&h, TWILIGHT, 1);
        h.engine.run_activity_pass().await;
        chat(&h, TWILIGHT, 1);
        h.engine.run_activity_pass().await;

        // Second pass must read the updated total, not a cached stale one
        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 30);
        assert_eq!(h.store.companion_reads(), 2);
    }

    #[tokio::test]
    async fn test_role_bonus_applied() {
        let h = harness(SettlementConfig {
            role_bonus_percent: HashMap::from([("booster".to_string(), 20)]),
            ..Default::default()
        });
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        h.store.add_companion(RARITY, "Opalescence", 0, 1);
        h.store.set_role(TWILIGHT, "booster");
        chat(&h, TWILIGHT, 5);
        chat(&h, RARITY, 5);

        h.engine.run_activity_pass().await;

        assert_eq!(h.store.companion(TWILIGHT).unwrap().total_experience, 90);
        assert_eq!(h.store.companion(RARITY).unwrap().total_experience, 75);
    }

    // ============== Spawn Tests ==============

    #[tokio::test]
    async fn test_threshold_events_dispatched_once_per_pass() {
        let h = harness(SettlementConfig::default());
        h.store.add_target(GUILD, GENERAL, 10, 8, true);
        h.store.add_target(GUILD, MEADOW, 4, 0, true);
        chat(&h, RARITY, 5);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.threshold_events, 2);
        let batches = h.trigger.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(h.engine.state().activity.community_record_count(), 0);
    }

    #[tokio::test]
    async fn test_no_events_no_trigger_call() {
        let h = harness(SettlementConfig::default());
        h.store.add_target(GUILD, GENERAL, 100, 0, true);
        chat(&h, RARITY, 5);

        h.engine.run_activity_pass().await;

        assert!(h.trigger.batches().is_empty());
        assert_eq!(h.store.target(GENERAL).unwrap().current_messages, 5);
    }

    #[tokio::test]
    async fn test_target_read_failure_requeues_community() {
        let h = harness(SettlementConfig::default());
        h.store.add_target(GUILD, GENERAL, 10, 8, true);
        h.store.fail_targets_for(GUILD);
        chat(&h, RARITY, 5);

        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.communities_deferred, 1);
        assert_eq!(h.engine.state().activity.pending_community_count(GUILD), 5);
        assert!(h.trigger.batches().is_empty());
    }

    #[tokio::test]
    async fn test_failed_counter_write_settled_next_pass() {
        let h = harness(SettlementConfig::default());
        h.store.add_target(GUILD, GENERAL, 10, 2, true);
        h.store.add_target(GUILD, MEADOW, 100, 0, true);
        h.store.fail_channel_writes_for(GENERAL);
        chat(&h, RARITY, 5);

        let first = h.engine.run_activity_pass().await;
        assert_eq!(first.spawn_channels_carried, 1);
        assert_eq!(h.store.target(GENERAL).unwrap().current_messages, 2);
        assert_eq!(h.store.target(MEADOW).unwrap().current_messages, 5);

        // No new traffic: the carried delta alone brings the community back
        h.store.heal_channel_writes();
        let second = h.engine.run_activity_pass().await;

        assert_eq!(second.communities_evaluated, 1);
        assert_eq!(second.spawn_channels_carried, 0);
        assert_eq!(h.store.target(GENERAL).unwrap().current_messages, 7);
        assert_eq!(h.store.target(MEADOW).unwrap().current_messages, 5);
    }

    #[tokio::test]
    async fn test_failed_reset_fires_on_next_pass() {
        let h = harness(SettlementConfig::default());
        h.store.add_target(GUILD, GENERAL, 10, 8, true);
        h.store.fail_channel_writes_for(GENERAL);
        chat(&h, RARITY, 5);

        h.engine.run_activity_pass().await;
        assert!(h.trigger.batches().is_empty());

        h.store.heal_channel_writes();
        let report = h.engine.run_activity_pass().await;

        assert_eq!(report.threshold_events, 1);
        assert_eq!(h.trigger.batches()[0][0].total_messages, 13);
        assert_eq!(h.store.target(GENERAL).unwrap().current_messages, 0);
    }

    // ============== Quest / Maintenance / Flush Tests ==============

    #[tokio::test]
    async fn test_quest_pass_applies_large_batches() {
        let h = harness(SettlementConfig::default());
        let quests = &h.engine.state().quests;
        quests.enqueue(TWILIGHT, GUILD, QuestKind::BitsEarned, 30).unwrap();
        quests.enqueue(RARITY, GUILD, QuestKind::GamesWon, 1).unwrap();

        let report = h.engine.run_quest_pass().await;

        assert_eq!(report.applied, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(h.store.quest_total(TWILIGHT, GUILD, QuestKind::BitsEarned), 30);
        assert_eq!(h.store.quest_total(RARITY, GUILD, QuestKind::GamesWon), 0);
    }

    #[tokio::test]
    async fn test_maintenance_prunes_idle_records() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 1);
        h.engine.run_activity_pass().await;
        assert_eq!(h.engine.state().activity.user_record_count(), 1);

        let later = Instant::now() + Duration::from_secs(3600);
        let report = h.engine.run_maintenance_at(later);

        assert_eq!(report.idle_records_pruned, 1);
        assert_eq!(h.engine.state().activity.user_record_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_all_forces_quests() {
        let h = harness(SettlementConfig::default());
        h.store.add_companion(TWILIGHT, "Owlowiscious", 0, 1);
        chat(&h, TWILIGHT, 2);
        h.engine
            .state()
            .quests
            .enqueue(TWILIGHT, GUILD, QuestKind::MessagesSent, 2)
            .unwrap();

        let report = h.engine.flush_all().await;

        assert_eq!(report.activity.users_settled, 1);
        assert_eq!(report.quests.applied, 1);
        assert_eq!(h.store.quest_total(TWILIGHT, GUILD, QuestKind::MessagesSent), 2);
        assert!(h.engine.state().quests.is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let store = Arc::new(FakeStore::new());
        let collaborators = Collaborators::new(
            store,
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingTrigger::default()),
        );
        let config = SettlementConfig {
            max_messages_per_cycle: 0,
            ..Default::default()
        };
        let state = Arc::new(AggregatorStore::new(&config));

        assert!(SettlementEngine::new(config, state, collaborators).is_err());
    }
}
