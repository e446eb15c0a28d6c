use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError};
use tokio::time;

/// Caps how many requests may be issued per time window.
///
/// Permits are replenished by a background task at the start of each
/// window; acquired permits are forgotten so they only come back with
/// the refill. Must be created within a tokio runtime.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let permits = Arc::new(Semaphore::new(max_requests));
        let refill = permits.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(window);
            tick.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
            tick.tick().await; // first tick completes immediately
            loop {
                tick.tick().await;
                let missing = max_requests.saturating_sub(refill.available_permits());
                refill.add_permits(missing);
            }
        });
        Self { permits }
    }

    /// Waits for an issuance permit; the permit is consumed for the
    /// remainder of the current window.
    pub async fn throttle(&self) {
        if let Ok(permit) = self.permits.clone().acquire_owned().await {
            permit.forget();
        }
    }

    pub fn try_throttle(&self) -> Result<(), TryAcquireError> {
        self.permits
            .clone()
            .try_acquire_owned()
            .map(|permit| permit.forget())
    }
}
