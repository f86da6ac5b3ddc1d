//! RecordingSpawnTrigger - Keeps every threshold batch it receives

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

use herd_core::SpawnTrigger;
use shared::ThresholdEvent;

#[derive(Debug, Default)]
pub struct RecordingSpawnTrigger {
    batches: Mutex<Vec<Vec<ThresholdEvent>>>,
}

impl RecordingSpawnTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<ThresholdEvent>>> {
        self.batches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One entry per settlement pass that fired at least one channel
    pub fn batches(&self) -> Vec<Vec<ThresholdEvent>> {
        self.lock().clone()
    }

    pub fn events(&self) -> Vec<ThresholdEvent> {
        self.lock().iter().flatten().cloned().collect()
    }

    pub fn total_events(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl SpawnTrigger for RecordingSpawnTrigger {
    async fn on_threshold_reached(&self, events: Vec<ThresholdEvent>) {
        for event in &events {
            info!(
                community = %event.community_id,
                channel = %event.channel_id,
                messages = event.total_messages,
                "Spawn threshold reached"
            );
        }
        self.lock().push(events);
    }
}
