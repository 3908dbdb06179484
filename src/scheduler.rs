// ⏱️ Ingestion Scheduler
//
//            start
//              │
//              ▼
//   ┌──────► Running ──── error ───► CoolingDown
//   │          │                        │     │
//   │       success                  cancel   │ cooldown elapsed
//   │          ▼                        ▼     │
//   └─ tick ─ Idle ───── cancel ───► Stopped  │
//              ▲                              │
//              └──────────────────────────────┘
//
// A failed cycle is retried after the cooldown plus one regular tick.
// A cycle always runs to completion; cancellation is only seen while waiting.

use crate::error::IngestError;
use crate::pipeline::CycleReport;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One fetch→reconcile pass, as seen by the scheduler
#[async_trait]
pub trait CycleRunner: Send + Sync {
    async fn run_cycle(&self) -> Result<CycleReport, IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// One cycle in flight
    Running,
    /// Waiting for the next regular tick
    Idle,
    /// Waiting out the error cooldown before going idle
    CoolingDown,
    /// Terminal
    Stopped,
}

impl SchedulerState {
    /// Where a finished cycle leads
    pub fn after_cycle(succeeded: bool) -> Self {
        if succeeded {
            SchedulerState::Idle
        } else {
            SchedulerState::CoolingDown
        }
    }

    /// Where an uninterrupted wait leads
    pub fn after_wait(self) -> Self {
        match self {
            SchedulerState::CoolingDown => SchedulerState::Idle,
            SchedulerState::Idle => SchedulerState::Running,
            other => other,
        }
    }
}

/// Counters returned when the scheduler stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub succeeded: u64,
    pub failed: u64,
}

pub struct IngestionScheduler<R> {
    runner: R,
    tick_interval: Duration,
    error_cooldown: Duration,
}

impl<R: CycleRunner> IngestionScheduler<R> {
    pub fn new(runner: R, tick_interval: Duration, error_cooldown: Duration) -> Self {
        Self {
            runner,
            tick_interval,
            error_cooldown,
        }
    }

    /// How long a waiting state lasts; `None` for states that do not wait
    pub fn wait_for(&self, state: SchedulerState) -> Option<Duration> {
        match state {
            SchedulerState::Idle => Some(self.tick_interval),
            SchedulerState::CoolingDown => Some(self.error_cooldown),
            SchedulerState::Running | SchedulerState::Stopped => None,
        }
    }

    /// Drive cycles until `cancel` fires during a wait
    pub async fn run(&self, cancel: CancellationToken) -> SchedulerStats {
        info!(
            tick_secs = self.tick_interval.as_secs(),
            cooldown_secs = self.error_cooldown.as_secs(),
            "ingestion scheduler started"
        );

        let mut stats = SchedulerStats::default();
        let mut state = SchedulerState::Running;

        loop {
            state = match state {
                SchedulerState::Running => {
                    stats.cycles += 1;
                    match self.runner.run_cycle().await {
                        Ok(_) => {
                            stats.succeeded += 1;
                            SchedulerState::after_cycle(true)
                        }
                        Err(e) => {
                            stats.failed += 1;
                            error!(
                                kind = e.kind(),
                                error = %e,
                                retry_in_secs = (self.error_cooldown + self.tick_interval).as_secs(),
                                "ingestion cycle failed"
                            );
                            SchedulerState::after_cycle(false)
                        }
                    }
                }
                SchedulerState::Idle | SchedulerState::CoolingDown => {
                    let wait = self.wait_for(state).unwrap_or(self.tick_interval);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => SchedulerState::Stopped,
                        _ = tokio::time::sleep(wait) => state.after_wait(),
                    }
                }
                SchedulerState::Stopped => break,
            };
        }

        info!(
            cycles = stats.cycles,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "ingestion scheduler stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::ReconcileSummary;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    const TICK: Duration = Duration::from_secs(3600);
    const COOLDOWN: Duration = Duration::from_secs(300);

    /// Plays back scripted outcomes and cancels after the last one
    struct ScriptedRunner {
        outcomes: Mutex<VecDeque<bool>>,
        calls: Arc<Mutex<Vec<Instant>>>,
        cancel: CancellationToken,
    }

    impl ScriptedRunner {
        fn new(outcomes: &[bool], cancel: CancellationToken) -> (Self, Arc<Mutex<Vec<Instant>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let runner = Self {
                outcomes: Mutex::new(outcomes.iter().copied().collect()),
                calls: calls.clone(),
                cancel,
            };
            (runner, calls)
        }
    }

    #[async_trait]
    impl CycleRunner for ScriptedRunner {
        async fn run_cycle(&self) -> Result<CycleReport, IngestError> {
            self.calls.lock().unwrap().push(Instant::now());
            let mut outcomes = self.outcomes.lock().unwrap();
            let ok = outcomes.pop_front().unwrap_or(true);
            if outcomes.is_empty() {
                self.cancel.cancel();
            }

            if ok {
                Ok(CycleReport {
                    bytes: 0,
                    digest: String::new(),
                    parsed: 0,
                    summary: ReconcileSummary::default(),
                    elapsed_ms: 0,
                })
            } else {
                Err(IngestError::Transport {
                    url: "http://feed.local/daily".to_string(),
                    reason: "connection refused".to_string(),
                })
            }
        }
    }

    fn gaps(calls: &[Instant]) -> Vec<Duration> {
        calls.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[test]
    fn test_transitions() {
        assert_eq!(SchedulerState::after_cycle(true), SchedulerState::Idle);
        assert_eq!(SchedulerState::after_cycle(false), SchedulerState::CoolingDown);
        assert_eq!(SchedulerState::CoolingDown.after_wait(), SchedulerState::Idle);
        assert_eq!(SchedulerState::Idle.after_wait(), SchedulerState::Running);
    }

    #[test]
    fn test_wait_durations() {
        let (runner, _) = ScriptedRunner::new(&[true], CancellationToken::new());
        let scheduler = IngestionScheduler::new(runner, TICK, COOLDOWN);

        assert_eq!(scheduler.wait_for(SchedulerState::Idle), Some(TICK));
        assert_eq!(scheduler.wait_for(SchedulerState::CoolingDown), Some(COOLDOWN));
        assert_eq!(scheduler.wait_for(SchedulerState::Running), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately() {
        let cancel = CancellationToken::new();
        let (runner, calls) = ScriptedRunner::new(&[true], cancel.clone());
        let scheduler = IngestionScheduler::new(runner, TICK, COOLDOWN);
        let start = Instant::now();

        let stats = scheduler.run(cancel).await;

        assert_eq!(stats, SchedulerStats { cycles: 1, succeeded: 1, failed: 0 });
        assert_eq!(calls.lock().unwrap()[0], start);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_waits_full_tick() {
        let cancel = CancellationToken::new();
        let (runner, calls) = ScriptedRunner::new(&[true, true, true], cancel.clone());
        let scheduler = IngestionScheduler::new(runner, TICK, COOLDOWN);

        let stats = scheduler.run(cancel).await;

        assert_eq!(stats.succeeded, 3);
        assert_eq!(gaps(&calls.lock().unwrap()), vec![TICK, TICK]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_cools_down_then_waits_a_tick() {
        let cancel = CancellationToken::new();
        let (runner, calls) = ScriptedRunner::new(&[false, false, true, true], cancel.clone());
        let scheduler = IngestionScheduler::new(runner, TICK, COOLDOWN);

        let stats = scheduler.run(cancel).await;

        assert_eq!(stats, SchedulerStats { cycles: 4, succeeded: 2, failed: 2 });
        assert_eq!(
            gaps(&calls.lock().unwrap()),
            vec![COOLDOWN + TICK, COOLDOWN + TICK, TICK]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_idle_stops() {
        let cancel = CancellationToken::new();
        let (runner, calls) = ScriptedRunner::new(&[true, true], CancellationToken::new());
        let scheduler = Arc::new(IngestionScheduler::new(runner, TICK, COOLDOWN));

        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(TICK / 2).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.cycles, 1);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_cooldown_stops() {
        let cancel = CancellationToken::new();
        let (runner, _) = ScriptedRunner::new(&[false], cancel.clone());
        let scheduler = IngestionScheduler::new(runner, TICK, COOLDOWN);

        let stats = scheduler.run(cancel).await;

        assert_eq!(stats, SchedulerStats { cycles: 1, succeeded: 0, failed: 1 });
    }
}
