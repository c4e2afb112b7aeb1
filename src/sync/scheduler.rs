//! Repeats sync cycles with a fixed pause between them.

use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use crate::lemmy::api::LemmyApi;

use super::engine::{CycleReport, SyncEngine};

/// Runs a cycle, sleeps `interval`, and repeats until shutdown is signalled.
///
/// Shutdown is only observed between cycles; a cycle in progress always runs
/// to completion.
pub struct Scheduler<A: LemmyApi> {
  engine: SyncEngine<A>,
  interval: Duration,
  shutdown: watch::Receiver<bool>,
  cycles: u64,
}

impl<A: LemmyApi> Scheduler<A> {
  pub fn new(engine: SyncEngine<A>, interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
    Self {
      engine,
      interval,
      shutdown,
      cycles: 0,
    }
  }

  #[cfg(test)]
  pub fn engine(&self) -> &SyncEngine<A> {
    &self.engine
  }

  pub fn cycles(&self) -> u64 {
    self.cycles
  }

  /// Run a single cycle and log its summary.
  pub async fn tick(&mut self) -> CycleReport {
    self.cycles += 1;
    info!(cycle = self.cycles, "Starting sync cycle");
    let report = self.engine.run_cycle().await;
    info!(
      cycle = self.cycles,
      communities = report.communities.len(),
      stored = report.accepted(),
      failures = report.failures(),
      "Sync cycle finished"
    );
    report
  }

  pub async fn run(&mut self) {
    loop {
      if *self.shutdown.borrow() {
        break;
      }

      self.tick().await;

      info!(
        "Next sync in {}h{:02}m",
        self.interval.as_secs() / 3600,
        self.interval.as_secs() % 3600 / 60
      );
      tokio::select! {
        _ = tokio::time::sleep(self.interval) => {}
        changed = self.shutdown.changed() => {
          // A dropped sender can never signal again, so stop as well.
          if changed.is_err() || *self.shutdown.borrow() {
            break;
          }
        }
      }
    }
    info!(cycles = self.cycles, "Scheduler stopped");
  }
}
