//! QuestProgressQueue - Coalescing buffer for community-quest counters
//!
//! Increments for the same (user, community, kind) are summed in memory and
//! written to the store once they are old enough or large enough. Each entry
//! is its own unit of work: a failed write puts that entry back and the pass
//! moves on.

use dashmap::DashMap;
use herd_domain::QuestBatchPolicy;
use shared::{CommunityId, QuestKind, SettlementError, UserId};
use std::time::Instant;
use tracing::{debug, warn};

use crate::ports::PersistentStore;

/// Composite key of a pending quest counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuestKey {
    pub user_id: UserId,
    pub community_id: CommunityId,
    pub kind: QuestKind,
}

impl QuestKey {
    pub fn new(user_id: UserId, community_id: CommunityId, kind: QuestKind) -> Self {
        Self {
            user_id,
            community_id,
            kind,
        }
    }
}

/// Summed, not-yet-applied progress for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestIncrement {
    pub key: QuestKey,
    pub count: u64,
    /// When the oldest unapplied increment arrived; drives the latency bound
    pub first_queued_at: Instant,
    pub last_updated_at: Instant,
}

impl QuestIncrement {
    fn merge(&mut self, other: &QuestIncrement) {
        self.count = self.count.saturating_add(other.count);
        self.first_queued_at = self.first_queued_at.min(other.first_queued_at);
        self.last_updated_at = self.last_updated_at.max(other.last_updated_at);
    }

    fn is_eligible(&self, policy: &QuestBatchPolicy, now: Instant) -> bool {
        policy.is_eligible(now.saturating_duration_since(self.first_queued_at), self.count)
    }
}

/// Outcome of one quest settlement pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuestPassReport {
    pub applied: usize,
    pub deferred: usize,
    pub failed: usize,
}

/// Pending quest increments keyed by `QuestKey`
#[derive(Debug)]
pub struct QuestProgressQueue {
    pending: DashMap<QuestKey, QuestIncrement>,
    policy: QuestBatchPolicy,
}

impl QuestProgressQueue {
    pub fn new(policy: QuestBatchPolicy) -> Self {
        Self {
            pending: DashMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> &QuestBatchPolicy {
        &self.policy
    }

    /// Add `increment` to the pending counter for the key
    ///
    /// Negative increments are rejected; zero is accepted and ignored.
    pub fn enqueue(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
        increment: i64,
    ) -> Result<(), SettlementError> {
        self.enqueue_at(user_id, community_id, kind, increment, Instant::now())
    }

    /// `enqueue` with the kind given by name (e.g. `"games_won"`)
    pub fn enqueue_named(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: &str,
        increment: i64,
    ) -> Result<(), SettlementError> {
        let kind: QuestKind = kind.parse()?;
        self.enqueue(user_id, community_id, kind, increment)
    }

    /// `enqueue` stamped with `now`
    pub fn enqueue_at(
        &self,
        user_id: UserId,
        community_id: CommunityId,
        kind: QuestKind,
        increment: i64,
        now: Instant,
    ) -> Result<(), SettlementError> {
        if increment < 0 {
            return Err(SettlementError::MalformedInput(format!(
                "quest increment must not be negative (got {} for {})",
                increment, kind
            )));
        }
        if !user_id.is_valid() || !community_id.is_valid() {
            return Err(SettlementError::MalformedInput(format!(
                "quest ids must be non-zero (user {}, community {})",
                user_id, community_id
            )));
        }
        if increment == 0 {
            return Ok(());
        }

        let key = QuestKey::new(user_id, community_id, kind);
        self.merge(QuestIncrement {
            key,
            count: increment as u64,
            first_queued_at: now,
            last_updated_at: now,
        });
        Ok(())
    }

    fn merge(&self, increment: QuestIncrement) {
        self.pending
            .entry(increment.key)
            .and_modify(|existing| existing.merge(&increment))
            .or_insert(increment);
    }

    pub fn pending(&self, key: &QuestKey) -> Option<QuestIncrement> {
        self.pending.get(key).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply every eligible entry to the store
    pub async fn settle(&self, store: &dyn PersistentStore) -> QuestPassReport {
        self.settle_at(store, Instant::now(), false).await
    }

    /// Apply every entry regardless of eligibility (shutdown flush)
    pub async fn flush_all(&self, store: &dyn PersistentStore) -> QuestPassReport {
        self.settle_at(store, Instant::now(), true).await
    }

    /// Settlement pass as seen at `now`
    pub async fn settle_at(
        &self,
        store: &dyn PersistentStore,
        now: Instant,
        force: bool,
    ) -> QuestPassReport {
        let mut report = QuestPassReport::default();
        let keys: Vec<QuestKey> = self.pending.iter().map(|entry| *entry.key()).collect();

        for key in keys {
            let taken = if force {
                self.pending.remove(&key)
            } else {
                let policy = self.policy;
                self.pending
                    .remove_if(&key, |_, entry| entry.is_eligible(&policy, now))
            };

            let Some((_, increment)) = taken else {
                report.deferred += 1;
                continue;
            };

            match store
                .apply_quest_increment(key.user_id, key.community_id, key.kind, increment.count)
                .await
            {
                Ok(()) => {
                    debug!(
                        user = %key.user_id,
                        community = %key.community_id,
                        kind = %key.kind,
                        count = increment.count,
                        "Applied quest progress"
                    );
                    report.applied += 1;
                }
                Err(e) => {
                    warn!(
                        user = %key.user_id,
                        kind = %key.kind,
                        count = increment.count,
                        error = %e,
                        "Quest progress write failed, re-queued"
                    );
                    report.failed += 1;
                    self.merge(increment);
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;
    use std::time::Duration;

    const GUILD: CommunityId = CommunityId::new(10);

    fn queue() -> QuestProgressQueue {
        QuestProgressQueue::new(QuestBatchPolicy::new(Duration::from_secs(60), 25))
    }

    fn key(user: u64, kind: QuestKind) -> QuestKey {
        QuestKey::new(UserId::new(user), GUILD, kind)
    }

    // ============== Enqueue Tests ==============

    #[test]
    fn test_same_key_merges() {
        let q = queue();
        q.enqueue(UserId::new(1), GUILD, QuestKind::BitsEarned, 3).unwrap();
        q.enqueue(UserId::new(1), GUILD, QuestKind::BitsEarned, 4).unwrap();

        assert_eq!(q.len(), 1);
        assert_eq!(q.pending(&key(1, QuestKind::BitsEarned)).unwrap().count, 7);
    }

    #[test]
    fn test_distinct_kinds_stay_separate() {
        let q = queue();
        q.enqueue(UserId::new(1), GUILD, QuestKind::BitsEarned, 3).unwrap();
        q.enqueue(UserId::new(1), GUILD, QuestKind::GamesWon, 1).unwrap();
        q.enqueue(UserId::new(2), GUILD, QuestKind::BitsEarned, 1).unwrap();

        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_merge_keeps_first_queued_at() {
        let q = queue();
        let t0 = Instant::now();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::GamesWon, 1, t0).unwrap();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::GamesWon, 1, t0 + Duration::from_secs(5))
            .unwrap();

        let pending = q.pending(&key(1, QuestKind::GamesWon)).unwrap();
        assert_eq!(pending.first_queued_at, t0);
        assert_eq!(pending.last_updated_at, t0 + Duration::from_secs(5));
    }

    #[test]
    fn test_negative_increment_rejected() {
        let q = queue();
        let result = q.enqueue(UserId::new(1), GUILD, QuestKind::BitsEarned, -2);

        assert!(matches!(result, Err(SettlementError::MalformedInput(_))));
        assert!(q.is_empty());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let q = queue();
        let result = q.enqueue_named(UserId::new(1), GUILD, "cupcakes_eaten", 1);

        assert!(matches!(result, Err(SettlementError::MalformedInput(_))));
        assert!(q.is_empty());
    }

    #[test]
    fn test_named_kind_accepted() {
        let q = queue();
        q.enqueue_named(UserId::new(1), GUILD, "ponies_obtained", 2).unwrap();
        assert_eq!(q.pending(&key(1, QuestKind::PoniesObtained)).unwrap().count, 2);
    }

    #[test]
    fn test_zero_increment_ignored() {
        let q = queue();
        q.enqueue(UserId::new(1), GUILD, QuestKind::BitsEarned, 0).unwrap();
        assert!(q.is_empty());
    }

    // ============== Settlement Tests ==============

    #[tokio::test]
    async fn test_young_small_entries_stay_queued() {
        let q = queue();
        let store = FakeStore::new();
        let t0 = Instant::now();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::BitsEarned, 5, t0).unwrap();

        let report = q.settle_at(&store, t0 + Duration::from_secs(10), false).await;

        assert_eq!(report, QuestPassReport { applied: 0, deferred: 1, failed: 0 });
        assert_eq!(q.len(), 1);
        assert_eq!(store.quest_total(UserId::new(1), GUILD, QuestKind::BitsEarned), 0);
    }

    #[tokio::test]
    async fn test_old_entry_applied_by_age() {
        let q = queue();
        let store = FakeStore::new();
        let t0 = Instant::now();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::BitsEarned, 5, t0).unwrap();

        let report = q.settle_at(&store, t0 + Duration::from_secs(60), false).await;

        assert_eq!(report.applied, 1);
        assert!(q.is_empty());
        assert_eq!(store.quest_total(UserId::new(1), GUILD, QuestKind::BitsEarned), 5);
    }

    #[tokio::test]
    async fn test_large_entry_applied_by_size() {
        let q = queue();
        let store = FakeStore::new();
        let t0 = Instant::now();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::BitsEarned, 30, t0).unwrap();
        q.enqueue_at(UserId::new(2), GUILD, QuestKind::BitsEarned, 3, t0).unwrap();

        let report = q.settle_at(&store, t0, false).await;

        assert_eq!(report.applied, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(store.quest_total(UserId::new(1), GUILD, QuestKind::BitsEarned), 30);
        assert!(q.pending(&key(2, QuestKind::BitsEarned)).is_some());
    }

    #[tokio::test]
    async fn test_failure_requeues_without_blocking_siblings() {
        let q = queue();
        let store = FakeStore::new();
        store.fail_quests_for(UserId::new(1));
        let t0 = Instant::now();
        q.enqueue_at(UserId::new(1), GUILD, QuestKind::GamesWon, 30, t0).unwrap();
        q.enqueue_at(UserId::new(2), GUILD, QuestKind::GamesWon, 30, t0).unwrap();

        let report = q.settle_at(&store, t0, false).await;

        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(store.quest_total(UserId::new(2), GUILD, QuestKind::GamesWon), 30);
        let requeued = q.pending(&key(1, QuestKind::GamesWon)).unwrap();
        assert_eq!(requeued.count, 30);
        assert_eq!(requeued.first_queued_at, t0);
    }

    #[tokio::test]
    async fn test_flush_all_ignores_eligibility() {
        let q = queue();
        let store = FakeStore::new();
        q.enqueue(UserId::new(1), GUILD, QuestKind::TradesCompleted, 1).unwrap();

        let report = q.flush_all(&store).await;

        assert_eq!(report.applied, 1);
        assert!(q.is_empty());
    }
}
