//! Simulated chat traffic for the demo binary

use std::time::Duration;

use anyhow::Context;
use herd_adapter::InMemoryStore;
use herd_core::ProducerHandle;
use shared::{ChannelId, CommunityId, QuestKind, UserId};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

const COMPANION_NAMES: [&str; 6] = [
    "Winona",
    "Angel",
    "Gummy",
    "Opalescence",
    "Owlowiscious",
    "Tank",
];

/// Shape of the simulated community
#[derive(Debug, Clone)]
pub struct TrafficPlan {
    pub community_id: CommunityId,
    pub users: u64,
    pub channels: u64,
    pub messages_per_second: u64,
    pub spawn_target: u64,
    /// Role granted to the first user, if any
    pub bonus_role: Option<String>,
}

impl TrafficPlan {
    pub fn user(&self, index: u64) -> UserId {
        UserId::new(1000 + index)
    }

    pub fn channel(&self, index: u64) -> ChannelId {
        ChannelId::new(10 + index)
    }
}

/// Adopt a companion for every user and register every channel as a spawn channel
pub fn seed(store: &InMemoryStore, plan: &TrafficPlan) -> anyhow::Result<()> {
    for i in 0..plan.users {
        let name = COMPANION_NAMES[(i as usize) % COMPANION_NAMES.len()];
        store
            .adopt_companion(plan.user(i), name)
            .context("Failed to seed companion")?;
    }
    for c in 0..plan.channels {
        store
            .configure_spawn_channel(plan.community_id, plan.channel(c), plan.spawn_target)
            .context("Failed to seed spawn channel")?;
    }
    if let Some(role) = &plan.bonus_role {
        store
            .set_role(plan.user(0), role)
            .context("Failed to seed membership role")?;
    }

    info!(
        users = plan.users,
        channels = plan.channels,
        spawn_target = plan.spawn_target,
        "Seeded demo community"
    );
    Ok(())
}

/// Interval between simulated messages; never zero, `interval` rejects that
fn tick_period(messages_per_second: u64) -> Duration {
    Duration::from_micros((1_000_000 / messages_per_second.max(1)).max(1))
}

/// Produce messages until `shutdown_rx` fires; returns the number sent
pub async fn run(
    producer: ProducerHandle,
    plan: TrafficPlan,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> u64 {
    let mut tick = interval(tick_period(plan.messages_per_second));
    let mut sent = 0u64;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let user = plan.user(sent % plan.users.max(1));
                let channel = plan.channel((sent / 3) % plan.channels.max(1));

                if let Err(e) = producer.record_activity(user, plan.community_id, channel) {
                    warn!(user = %user, error = %e, "Rejected activity");
                    continue;
                }
                if let Err(e) =
                    producer.enqueue_quest(user, plan.community_id, QuestKind::MessagesSent, 1)
                {
                    warn!(user = %user, error = %e, "Rejected quest progress");
                }
                if sent % 7 == 0 {
                    if let Err(e) =
                        producer.enqueue_quest_named(user, plan.community_id, "bits_earned", 5)
                    {
                        warn!(user = %user, error = %e, "Rejected quest progress");
                    }
                }
                sent += 1;
                debug!(user = %user, channel = %channel, sent, "Simulated message");
            }
            _ = shutdown_rx.recv() => {
                info!(sent, "Traffic simulation stopped");
                break;
            }
        }
    }

    sent
}
