use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use crate::settings::RateLimitSettings;

/// Entries kept before expired windows are swept.
const EVICTION_THRESHOLD: usize = 10_000;

/// Per-device doorbell event limiter.
///
/// Uses a simple fixed window counter.
#[derive(Clone, Debug)]
pub struct DeviceRateLimiter {
    state: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    limit: u32,
    window: Duration,
}

impl DeviceRateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(HashMap::new())),
            limit: settings.max_events,
            window: settings.window,
        }
    }

    /// Counts one event for `device_id`.
    ///
    /// Returns `true` if allowed, `false` if the device is over its limit.
    pub fn check(&self, device_id: &str) -> bool {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                // The worst a poisoned guard can hold is a stale counter.
                tracing::error!("rate limiter lock poisoned, recovering with stale state");
                poisoned.into_inner()
            }
        };
        let now = Instant::now();

        // Evict only expired windows so active limits survive the sweep.
        if state.len() > EVICTION_THRESHOLD {
            let window = self.window;
            state.retain(|_, (_, start)| now.duration_since(*start) <= window);
        }

        let (count, start) = state
            .entry(device_id.to_string())
            .or_insert((0, now));

        if now.duration_since(*start) > self.window {
            *count = 1;
            *start = now;
            true
        } else {
            *count += 1;
            *count <= self.limit
        }
    }
}
