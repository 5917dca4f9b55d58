use std::time::Instant;

use parking_lot::Mutex;
use qos_common::conf::PoliceAction;

/// Time-windowed token bucket policing bytes per second.
///
/// Tokens accrue with elapsed wall-clock time, saturate at `burst`, and
/// every admitted packet consumes its size in bytes. Refill arithmetic is
/// integer nanoseconds with a u128 intermediate, so multi-hour idle periods
/// cannot overflow. The clock is monotonic.
pub struct TokenBucket {
    /// Refill rate in tokens (bytes) per second.
    rate: u64,
    /// Saturation cap for accumulated tokens.
    burst: u64,
    /// Verdict returned when the bucket cannot cover a packet.
    over_rate_action: PoliceAction,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket that starts full and holds at most one second of `rate`.
    pub fn new(rate: u64, over_rate_action: PoliceAction) -> Self {
        Self::with_burst(rate, rate.max(1), over_rate_action)
    }

    pub fn with_burst(rate: u64, burst: u64, over_rate_action: PoliceAction) -> Self {
        Self {
            rate,
            burst,
            over_rate_action,
            state: Mutex::new(BucketState { tokens: burst, last_refill: Instant::now() }),
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn burst(&self) -> u64 {
        self.burst
    }

    /// Polices a packet of `size` bytes against the current fill.
    pub fn police(&self, size: u32) -> PoliceAction {
        self.police_at(Instant::now(), size)
    }

    /// Same as [`TokenBucket::police`] with an explicit clock, for
    /// deterministic tests.
    pub fn police_at(&self, now: Instant, size: u32) -> PoliceAction {
        let mut state = self.state.lock();

        let elapsed = now.saturating_duration_since(state.last_refill);
        let added = elapsed.as_nanos().saturating_mul(u128::from(self.rate)) / 1_000_000_000;
        state.tokens = (u128::from(state.tokens) + added).min(u128::from(self.burst)) as u64;
        state.last_refill = now;

        if state.tokens >= u64::from(size) {
            state.tokens -= u64::from(size);
            PoliceAction::Pass
        } else {
            self.over_rate_action
        }
    }
}
