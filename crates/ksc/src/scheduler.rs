//! 🕰️ Clock & Scheduler — the part that never stops. Literally. That's the feature.
//!
//! The scheduler runs one cycle, waits, runs the next one. Forever. The wait starts only
//! after the cycle has finished, so two cycles can never overlap, no matter how slow
//! Elasticsearch is feeling. No jitter. No skipped ticks. No catching up.
//!
//! A [`CancellationToken`] can end the loop, but only between cycles. A cycle in
//! flight always runs to completion. 🦆

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::app_config::RuntimeConfig;
use crate::connector::Connector;
use crate::reconciler::{CycleOutcome, Reconciler};

/// ⏰ Where "now" comes from.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock. The real one. The one that keeps moving.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<F> Clock for F
where
    F: Fn() -> DateTime<Utc> + Send + Sync,
{
    fn now(&self) -> DateTime<Utc> {
        self()
    }
}

/// 🔁 Cycle, sleep, repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_runtime(runtime: &RuntimeConfig) -> Self {
        Self::new(runtime.cycle_interval())
    }

    /// 🚀 Drive `reconciler` until `shutdown` fires. Returns how many cycles ran.
    pub async fn run<C: Connector, K: Clock>(
        &self,
        reconciler: &Reconciler<C, K>,
        shutdown: CancellationToken,
    ) -> u64 {
        info!(
            "🕰️ Scheduler started: one cycle every {}s against '{}'",
            self.interval.as_secs(),
            reconciler.endpoint()
        );
        let mut cycles = 0u64;
        while !shutdown.is_cancelled() {
            cycles += 1;
            let outcome = reconciler
                .run_cycle()
                .instrument(info_span!("cycle", number = cycles))
                .await;
            log_outcome(cycles, &outcome);

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("🛑 Scheduler stopped after {cycles} cycle(s)");
        cycles
    }
}

fn log_outcome(cycle: u64, outcome: &CycleOutcome) {
    if !outcome.is_complete() {
        error!(
            "💀 Cycle {cycle} failed in state {:?} after {} connection attempt(s), trying again next interval",
            outcome.state, outcome.connection_attempts
        );
    } else if outcome.document_failures() == 0 {
        info!(
            "✅ Cycle {cycle} complete after {} connection attempt(s), Kibana configuration is where we left it",
            outcome.connection_attempts
        );
    } else {
        warn!(
            "⚠️ Cycle {cycle} complete with {} document write failure(s)",
            outcome.document_failures()
        );
    }
}
