//! SpawnThresholdEvaluator - Community activity against channel targets
//!
//! Every active spawn channel of a community counts the community's
//! messages. When a channel's counter reaches its target the counter is
//! reset and a `ThresholdEvent` is emitted for the spawn trigger.
//!
//! One store read for the community, then one read-modify-write per channel.
//! Channels are independent: a failed counter write keeps that channel's
//! delta in a per-channel carry, added to the channel's next evaluation.
//! Sibling channels whose writes succeeded are not re-counted.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herd_domain::{advance_spawn_counter, SpawnCounterOutcome};
use shared::{ChannelId, CommunityId, StoreError, ThresholdEvent};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ports::PersistentStore;

/// Messages a channel counted but could not persist yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpawnCarry {
    community_id: CommunityId,
    messages: u64,
}

pub struct SpawnThresholdEvaluator {
    store: Arc<dyn PersistentStore>,
    carry: DashMap<ChannelId, SpawnCarry>,
}

impl SpawnThresholdEvaluator {
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            carry: DashMap::new(),
        }
    }

    /// Add `added_messages` to every active target of the community
    ///
    /// Fails only if the community's targets cannot be read; the caller can
    /// then re-queue the whole delta. Carried channel deltas stay untouched.
    pub async fn evaluate(
        &self,
        community_id: CommunityId,
        added_messages: u64,
    ) -> Result<Vec<ThresholdEvent>, StoreError> {
        self.evaluate_at(community_id, added_messages, Utc::now()).await
    }

    /// `evaluate` stamping fired targets with `now`
    pub async fn evaluate_at(
        &self,
        community_id: CommunityId,
        added_messages: u64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ThresholdEvent>, StoreError> {
        let targets = self.store.channel_targets(community_id).await?;
        let mut events = Vec::new();

        for target in targets
            .into_iter()
            .filter(|t| t.community_id == community_id)
        {
            let channel_id = target.channel_id;
            let carried = self
                .carry
                .remove(&channel_id)
                .map(|(_, carry)| carry.messages)
                .unwrap_or(0);

            if !target.active {
                if carried > 0 {
                    debug!(channel = %channel_id, carried, "Spawn channel inactive, carry dropped");
                }
                continue;
            }
            let added = added_messages.saturating_add(carried);

            match advance_spawn_counter(target.current_messages, target.target_messages, added) {
                SpawnCounterOutcome::Unconfigured => {
                    debug!(channel = %channel_id, "Spawn channel has no target, skipping");
                }
                SpawnCounterOutcome::Pending { current_messages } => {
                    if current_messages == target.current_messages {
                        continue;
                    }
                    if let Err(e) = self
                        .store
                        .update_channel_target(channel_id, current_messages, None)
                        .await
                    {
                        warn!(
                            channel = %channel_id,
                            added,
                            error = %e,
                            "Failed to persist spawn counter, carried over"
                        );
                        self.carry_over(community_id, channel_id, added);
                    }
                }
                SpawnCounterOutcome::Fired { total_messages } => {
                    match self
                        .store
                        .update_channel_target(channel_id, 0, Some(now))
                        .await
                    {
                        Ok(()) => {
                            debug!(
                                channel = %channel_id,
                                total = total_messages,
                                target = target.target_messages,
                                "Spawn threshold reached"
                            );
                            events.push(ThresholdEvent {
                                channel_id,
                                community_id,
                                total_messages,
                            });
                        }
                        Err(e) => {
                            // Counter not reset in the store, so no event either.
                            warn!(
                                channel = %channel_id,
                                added,
                                error = %e,
                                "Failed to reset spawn counter, carried over"
                            );
                            self.carry_over(community_id, channel_id, added);
                        }
                    }
                }
            }
        }

        Ok(events)
    }

    fn carry_over(&self, community_id: CommunityId, channel_id: ChannelId, messages: u64) {
        self.carry
            .entry(channel_id)
            .and_modify(|carry| carry.messages = carry.messages.saturating_add(messages))
            .or_insert(SpawnCarry {
                community_id,
                messages,
            });
    }

    /// Messages waiting to be added to `channel_id` on its next evaluation
    pub fn carried_messages(&self, channel_id: ChannelId) -> u64 {
        self.carry
            .get(&channel_id)
            .map(|carry| carry.messages)
            .unwrap_or(0)
    }

    pub fn carried_channel_count(&self) -> usize {
        self.carry.len()
    }

    pub fn has_carry_for(&self, community_id: CommunityId) -> bool {
        self.carry
            .iter()
            .any(|entry| entry.value().community_id == community_id)
    }

    /// Communities with at least one carried channel delta
    pub fn carried_communities(&self) -> BTreeSet<CommunityId> {
        self.carry
            .iter()
            .map(|entry| entry.value().community_id)
            .collect()
    }
}
