//! Bounded readiness polling with exponential backoff.

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

use super::{BrowserError, PageDriver};

const MAX_POLL_DELAY: Duration = Duration::from_secs(2);

/// Deadline plus a backoff schedule: 100ms, 200ms, 400ms … capped at 2s.
pub struct Poll {
    deadline: Instant,
    delays: ExponentialBackoff,
}

impl Poll {
    pub fn new(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            delays: ExponentialBackoff::from_millis(2)
                .factor(50)
                .max_delay(MAX_POLL_DELAY),
        }
    }

    /// Sleep until the next probe. Returns false once the deadline has passed.
    pub async fn tick(&mut self) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let next = self.delays.next().unwrap_or(MAX_POLL_DELAY);
        sleep(next.min(self.deadline - now)).await;
        true
    }
}

/// A probe that failed while the document was being replaced. Only a closed
/// tab is final; anything else is kept as the latest failure and retried.
pub fn probe_failure(probe: &str, err: BrowserError) -> Result<BrowserError, BrowserError> {
    if matches!(err, BrowserError::Closed) {
        return Err(err);
    }
    debug!("Probe for {} failed, retrying: {}", probe, err);
    Ok(err)
}

/// Poll until `selector` matches. `Ok(false)` on timeout; the last probe
/// error if every probe up to the deadline failed.
pub async fn wait_for_selector<D: PageDriver + ?Sized>(
    page: &mut D,
    selector: &str,
    timeout: Duration,
) -> Result<bool, BrowserError> {
    let mut poll = Poll::new(timeout);
    loop {
        let failure = match page.exists(selector).await {
            Ok(true) => return Ok(true),
            Ok(false) => None,
            Err(e) => Some(probe_failure(selector, e)?),
        };
        if !poll.tick().await {
            return match failure {
                Some(e) => Err(e),
                None => Ok(false),
            };
        }
    }
}
