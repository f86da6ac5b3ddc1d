//! AggregatorStore - The process-wide in-memory settlement state
//!
//! Created once by `start` and shared by `Arc` between the producer handle
//! and the settlement loops.

use shared::{CompanionRecord, MembershipRole, SettlementConfig, StoreError, UserId};

use crate::activity::ActivityAggregator;
use crate::lookup_cache::LookupCache;
use crate::ports::PersistentStore;
use crate::quest_queue::QuestProgressQueue;

pub type CompanionCache = LookupCache<UserId, CompanionRecord>;
/// `None` is cached too: "this user has no role" is a valid answer
pub type MembershipCache = LookupCache<UserId, Option<MembershipRole>>;

pub struct AggregatorStore {
    pub activity: ActivityAggregator,
    pub quests: QuestProgressQueue,
    pub companions: CompanionCache,
    pub memberships: MembershipCache,
}

impl AggregatorStore {
    pub fn new(config: &SettlementConfig) -> Self {
        Self {
            activity: ActivityAggregator::new(),
            quests: QuestProgressQueue::new(config.quest_policy()),
            companions: LookupCache::new(config.companion_cache_ttl()),
            memberships: LookupCache::new(config.membership_cache_ttl()),
        }
    }

    /// The user's companion, served from the cache when fresh
    ///
    /// A user without a companion is not cached; they may adopt one at any
    /// time.
    pub async fn companion(
        &self,
        store: &dyn PersistentStore,
        user_id: UserId,
    ) -> Result<Option<CompanionRecord>, StoreError> {
        if let Some(record) = self.companions.get(&user_id) {
            return Ok(Some(record));
        }
        let record = store.companion_record(user_id).await?;
        if let Some(record) = &record {
            self.companions.put(user_id, record.clone());
        }
        Ok(record)
    }

    /// The user's membership role, served from the cache when fresh
    pub async fn membership_role(
        &self,
        store: &dyn PersistentStore,
        user_id: UserId,
    ) -> Result<Option<MembershipRole>, StoreError> {
        if let Some(role) = self.memberships.get(&user_id) {
            return Ok(role);
        }
        let role = store.membership_role(user_id).await?;
        self.memberships.put(user_id, role.clone());
        Ok(role)
    }
}
