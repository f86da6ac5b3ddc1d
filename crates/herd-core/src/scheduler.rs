//! SettlementScheduler - The periodic flush loops
//!
//! Three independent tasks, each on its own `tokio::time::interval`:
//!
//! | Loop        | Default | Pass                                  |
//! |-------------|---------|---------------------------------------|
//! | Activity    | 15s     | `SettlementEngine::run_activity_pass` |
//! | Quest       | 30s     | `SettlementEngine::run_quest_pass`    |
//! | Maintenance | 60s     | `SettlementEngine::run_maintenance`   |
//!
//! A loop awaits its pass before waiting for the next tick, so passes of
//! one loop never overlap. Missed ticks are delayed, not bunched up. Each
//! loop has its own shutdown channel and can be stopped on its own.

use shared::SettlementConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::settlement::{FlushReport, SettlementEngine};

/// The scheduler's loops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Activity,
    Quest,
    Maintenance,
}

impl LoopKind {
    pub const ALL: [LoopKind; 3] = [LoopKind::Activity, LoopKind::Quest, LoopKind::Maintenance];
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopKind::Activity => "activity",
            LoopKind::Quest => "quest",
            LoopKind::Maintenance => "maintenance",
        };
        write!(f, "{}", name)
    }
}

struct LoopTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct SettlementScheduler {
    engine: Arc<SettlementEngine>,
    periods: HashMap<LoopKind, Duration>,
}

impl SettlementScheduler {
    /// Scheduler with the intervals from `config`
    pub fn new(engine: Arc<SettlementEngine>, config: &SettlementConfig) -> Self {
        Self::with_intervals(
            engine,
            config.activity_interval(),
            config.quest_interval(),
            config.maintenance_interval(),
        )
    }

    pub fn with_intervals(
        engine: Arc<SettlementEngine>,
        activity: Duration,
        quest: Duration,
        maintenance: Duration,
    ) -> Self {
        let periods = HashMap::from([
            (LoopKind::Activity, activity),
            (LoopKind::Quest, quest),
            (LoopKind::Maintenance, maintenance),
        ]);
        Self { engine, periods }
    }

    /// Spawn all loops; must be called from within a Tokio runtime
    pub fn start(self) -> SchedulerHandle {
        let mut loops = HashMap::new();
        for kind in LoopKind::ALL {
            let period = self
                .periods
                .get(&kind)
                .copied()
                .unwrap_or(Duration::from_secs(60));
            loops.insert(kind, spawn_loop(kind, period, self.engine.clone()));
            info!(loop_kind = %kind, interval_ms = period.as_millis() as u64, "Settlement loop started");
        }

        SchedulerHandle {
            engine: self.engine,
            loops: Mutex::new(loops),
        }
    }
}

fn spawn_loop(kind: LoopKind, period: Duration, engine: Arc<SettlementEngine>) -> LoopTask {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let handle = tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first pass runs one period in.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => run_pass(kind, &engine).await,
                _ = shutdown_rx.recv() => {
                    debug!(loop_kind = %kind, "Settlement loop shutting down");
                    break;
                }
            }
        }
    });

    LoopTask {
        shutdown_tx,
        handle,
    }
}

async fn run_pass(kind: LoopKind, engine: &SettlementEngine) {
    match kind {
        LoopKind::Activity => {
            let report = engine.run_activity_pass().await;
            debug!(?report, "Activity pass complete");
        }
        LoopKind::Quest => {
            let report = engine.run_quest_pass().await;
            debug!(?report, "Quest pass complete");
        }
        LoopKind::Maintenance => {
            let report = engine.run_maintenance();
            debug!(?report, "Maintenance pass complete");
        }
    }
}

/// Control over the running loops
pub struct SchedulerHandle {
    engine: Arc<SettlementEngine>,
    loops: Mutex<HashMap<LoopKind, LoopTask>>,
}

impl SchedulerHandle {
    pub fn engine(&self) -> &Arc<SettlementEngine> {
        &self.engine
    }

    pub async fn is_running(&self, kind: LoopKind) -> bool {
        self.loops.lock().await.contains_key(&kind)
    }

    /// Stop one loop and wait for its in-flight pass to finish
    ///
    /// Returns `false` if the loop was already stopped.
    pub async fn stop_loop(&self, kind: LoopKind) -> bool {
        let task = self.loops.lock().await.remove(&kind);
        let Some(task) = task else {
            return false;
        };

        let _ = task.shutdown_tx.send(()).await;
        if let Err(e) = task.handle.await {
            warn!(loop_kind = %kind, error = %e, "Settlement loop ended abnormally");
        }
        info!(loop_kind = %kind, "Settlement loop stopped");
        true
    }

    /// Stop every loop, then run a best-effort final flush
    pub async fn shutdown(self) -> FlushReport {
        for kind in LoopKind::ALL {
            self.stop_loop(kind).await;
        }
        self.engine.flush_all().await
    }
}
