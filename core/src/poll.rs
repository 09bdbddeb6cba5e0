// nfviz/src/poll.rs

//! A single poll-until-done loop shared by every step that waits on an
//! external long-running operation.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{event, Level};

/// Fixed polling interval and wall-clock upper bound for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
  pub interval: Duration,
  pub max_wait: Duration,
}

impl PollBudget {
  pub fn new(interval: Duration, max_wait: Duration) -> Self {
    Self { interval, max_wait }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
  Done(T),
  /// The budget ran out before the accessor reported completion.
  TimedOut { waited: Duration },
}

impl<T> PollOutcome<T> {
  pub fn is_done(&self) -> bool {
    matches!(self, PollOutcome::Done(_))
  }
}

/// Calls `check` until it yields `Some`, sleeping `budget.interval` between
/// attempts. Errors from `check` end the wait immediately.
///
/// The first check happens right away. The loop never sleeps past
/// `budget.max_wait`; once the budget is spent it returns `TimedOut` instead
/// of waiting indefinitely.
pub async fn poll_until_done<T, E, F, Fut>(budget: PollBudget, mut check: F) -> Result<PollOutcome<T>, E>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<Option<T>, E>>,
{
  let started = Instant::now();
  let mut attempts: u32 = 0;
  loop {
    attempts += 1;
    if let Some(value) = check().await? {
      event!(Level::DEBUG, attempts, waited_ms = started.elapsed().as_millis() as u64, "Operation done.");
      return Ok(PollOutcome::Done(value));
    }

    let waited = started.elapsed();
    if waited >= budget.max_wait {
      event!(Level::WARN, attempts, waited_secs = waited.as_secs(), "Poll budget exhausted.");
      return Ok(PollOutcome::TimedOut { waited });
    }
    let remaining = budget.max_wait - waited;
    sleep(budget.interval.min(remaining)).await;
  }
}
