//! Bandwidth throttling for sync transfers.
//!
//! Token bucket shared by every worker: one token per byte. A transfer pays
//! for its size before it starts, in chunks of at most one burst.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Largest single wait; also the bucket's burst size.
const MAX_CHUNK: u32 = 64 * 1024;

/// Bandwidth limit configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthLimit {
    /// Bytes per second; 0 means unlimited.
    pub bytes_per_second: u64,
}

impl BandwidthLimit {
    pub fn new(bytes_per_second: u64) -> Self {
        Self { bytes_per_second }
    }

    pub fn unlimited() -> Self {
        Self { bytes_per_second: 0 }
    }

    pub fn is_limited(&self) -> bool {
        self.bytes_per_second > 0
    }

    /// Format as human-readable string.
    pub fn display(&self) -> String {
        if !self.is_limited() {
            return "unlimited".to_string();
        }
        format!(
            "{}/s",
            humansize::format_size(self.bytes_per_second, humansize::BINARY)
        )
    }
}

/// Bandwidth limiter using token bucket algorithm.
#[derive(Clone, Default)]
pub struct BandwidthLimiter {
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
    limit: BandwidthLimit,
    burst: u32,
}

impl BandwidthLimiter {
    pub fn new(limit: BandwidthLimit) -> Self {
        let rate = limit.bytes_per_second.min(u64::from(u32::MAX)) as u32;
        let burst = rate.min(MAX_CHUNK);
        let limiter = match (NonZeroU32::new(rate), NonZeroU32::new(burst)) {
            (Some(rate), Some(burst)) => Some(Arc::new(RateLimiter::direct(
                Quota::per_second(rate).allow_burst(burst),
            ))),
            _ => None,
        };

        Self {
            limiter,
            limit,
            burst,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(BandwidthLimit::unlimited())
    }

    pub fn limit(&self) -> BandwidthLimit {
        self.limit
    }

    /// Wait for permission to transfer `bytes` bytes.
    /// This is a no-op if no limit is set.
    pub async fn acquire(&self, bytes: u64) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        let mut remaining = bytes;
        while remaining > 0 {
            let chunk = remaining.min(u64::from(self.burst)) as u32;
            let Some(n) = NonZeroU32::new(chunk) else {
                break;
            };
            // chunk never exceeds the burst, so capacity is always sufficient
            if limiter.until_n_ready(n).await.is_err() {
                break;
            }
            remaining -= u64::from(chunk);
        }
    }
}

impl std::fmt::Debug for BandwidthLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BandwidthLimiter")
            .field("limit", &self.limit)
            .finish()
    }
}
