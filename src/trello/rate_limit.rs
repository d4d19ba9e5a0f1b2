use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window limiter for outbound Trello calls. `wait` admits a caller
/// once one more call would not exceed `max_requests` within the trailing
/// window, recording the grant timestamp on admission.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            grants: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn wait(&self) {
        loop {
            // The lock covers only the decision-and-record step; the sleep
            // happens with the lock released and the decision is re-checked.
            let wake_at = {
                let mut grants = self.grants.lock();
                let now = Instant::now();
                while let Some(oldest) = grants.front() {
                    if now.duration_since(*oldest) >= self.window {
                        grants.pop_front();
                    } else {
                        break;
                    }
                }

                if grants.len() < self.max_requests {
                    grants.push_back(now);
                    return;
                }

                match grants.front().copied() {
                    Some(oldest) => oldest + self.window,
                    None => {
                        grants.push_back(now);
                        return;
                    }
                }
            };

            debug!(
                "rate limiter at capacity, sleeping {:?} before next trello call",
                wake_at.saturating_duration_since(Instant::now())
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }
}
