//! Global spacing between remote calls.

use std::time::Duration;
use tokio::time::Instant;

/// Enforces a minimum interval between the starts of consecutive calls.
///
/// There is a single interval shared by every endpoint. The first call is
/// never delayed.
#[derive(Debug)]
pub struct RateLimiter {
  interval: Duration,
  last_call: Option<Instant>,
}

impl RateLimiter {
  pub fn new(interval: Duration) -> Self {
    Self {
      interval,
      last_call: None,
    }
  }

  /// Sleep until the interval since the previous call has elapsed, then
  /// mark the current instant as the start of a new call.
  pub async fn acquire(&mut self) {
    if let Some(last) = self.last_call {
      let elapsed = last.elapsed();
      if elapsed < self.interval {
        tokio::time::sleep(self.interval - elapsed).await;
      }
    }
    self.last_call = Some(Instant::now());
  }
}
