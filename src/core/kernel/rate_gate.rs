use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Streaming connections the exchange accepts per client IP
pub const FEED_CONNECTIONS_PER_WINDOW: NonZeroU32 = nonzero_ext::nonzero!(1u32);
pub const FEED_CONNECTION_WINDOW: Duration = Duration::from_secs(4);

/// Sliding-window limiter admitting at most `occurrences` grants per `time_unit`.
///
/// Waiters queue on a fair mutex, so grants are issued in arrival order.
/// The holder of the lock sleeps until the oldest grant leaves the window;
/// dropping a pending `wait_to_proceed` future records nothing.
#[derive(Debug)]
pub struct RateGate {
    occurrences: usize,
    time_unit: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateGate {
    pub fn new(occurrences: NonZeroU32, time_unit: Duration) -> Self {
        let occurrences = occurrences.get() as usize;
        Self {
            occurrences,
            time_unit,
            grants: Mutex::new(VecDeque::with_capacity(occurrences)),
        }
    }

    /// Gate for realtime feed connection attempts (1 per 4 seconds)
    pub fn for_feed_connections() -> Self {
        Self::new(FEED_CONNECTIONS_PER_WINDOW, FEED_CONNECTION_WINDOW)
    }

    /// Process-wide feed gate; the exchange limit applies per IP, not per subscription
    pub fn shared_feed_gate() -> Arc<Self> {
        static GATE: OnceLock<Arc<RateGate>> = OnceLock::new();
        GATE.get_or_init(|| Arc::new(Self::for_feed_connections()))
            .clone()
    }

    pub fn occurrences(&self) -> usize {
        self.occurrences
    }

    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }

    /// Wait until a slot in the window is free, then take it
    pub async fn wait_to_proceed(&self) {
        let mut grants = self.grants.lock().await;

        loop {
            let now = Instant::now();
            while grants
                .front()
                .is_some_and(|&granted| now.duration_since(granted) >= self.time_unit)
            {
                grants.pop_front();
            }

            if grants.len() < self.occurrences {
                break;
            }

            if let Some(&oldest) = grants.front() {
                let release_at = oldest + self.time_unit;
                debug!(
                    wait_ms = release_at.saturating_duration_since(now).as_millis() as u64,
                    "Rate gate full, waiting for slot"
                );
                sleep_until(release_at).await;
            }
        }

        grants.push_back(Instant::now());
    }

    /// Take a slot only if one can be taken without waiting.
    ///
    /// `false` means "not immediately", not "window full": while another
    /// caller holds the gate this returns `false` even if a slot is free.
    pub fn try_proceed(&self) -> bool {
        let Ok(mut grants) = self.grants.try_lock() else {
            return false;
        };

        let now = Instant::now();
        while grants
            .front()
            .is_some_and(|&granted| now.duration_since(granted) >= self.time_unit)
        {
            grants.pop_front();
        }

        if grants.len() < self.occurrences {
            grants.push_back(now);
            true
        } else {
            false
        }
    }
}
