//! Adaptive concurrency limit
//!
//! [`ConcurrencyGovernor`] shrinks the number of chunks allowed in flight when the
//! endpoint keeps throttling us. The limit only ever decreases during a call; it is
//! restored to its initial value with [`ConcurrencyGovernor::reset`].

/// Consecutive rate-limit hits that trigger a reduction
pub const RATE_LIMIT_HIT_THRESHOLD: u32 = 3;

/// Factor applied to the limit on each reduction (floored, never below 1)
pub const REDUCTION_FACTOR: f64 = 0.7;

/// Tracks the effective concurrency limit and consecutive rate-limit hits
///
/// The governor is plain data; the executor shares it between tasks behind a mutex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcurrencyGovernor {
    initial_limit: usize,
    current_limit: usize,
    consecutive_hits: u32,
}

impl ConcurrencyGovernor {
    /// Create a governor starting at `limit` (clamped to at least 1)
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            initial_limit: limit,
            current_limit: limit,
            consecutive_hits: 0,
        }
    }

    /// Maximum number of tasks that may be in flight right now
    pub fn current_limit(&self) -> usize {
        self.current_limit
    }

    /// Limit the governor was created with
    pub fn initial_limit(&self) -> usize {
        self.initial_limit
    }

    /// Rate-limit hits since the last success or reduction
    pub fn consecutive_hits(&self) -> u32 {
        self.consecutive_hits
    }

    /// Record a rate-limited failure
    ///
    /// Returns `Some((old, new))` when this hit reduced the limit. Once the limit is 1,
    /// hits keep accumulating but nothing changes.
    pub fn record_rate_limit_hit(&mut self) -> Option<(usize, usize)> {
        self.consecutive_hits = self.consecutive_hits.saturating_add(1);
        if self.consecutive_hits < RATE_LIMIT_HIT_THRESHOLD || self.current_limit <= 1 {
            return None;
        }

        let old = self.current_limit;
        let reduced = (old as f64 * REDUCTION_FACTOR).floor() as usize;
        self.current_limit = reduced.max(1);
        self.consecutive_hits = 0;

        tracing::warn!(
            old_limit = old,
            new_limit = self.current_limit,
            "rate limit detected repeatedly, reducing concurrency"
        );
        Some((old, self.current_limit))
    }

    /// Record a successful attempt; clears the hit counter but keeps the limit
    pub fn record_success(&mut self) {
        self.consecutive_hits = 0;
    }

    /// Restore the initial limit and clear the hit counter
    pub fn reset(&mut self) {
        self.current_limit = self.initial_limit;
        self.consecutive_hits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_is_clamped_to_one() {
        assert_eq!(ConcurrencyGovernor::new(0).current_limit(), 1);
    }

    #[test]
    fn three_hits_reduce_five_to_three() {
        let mut gov = ConcurrencyGovernor::new(5);
        assert_eq!(gov.record_rate_limit_hit(), None);
        assert_eq!(gov.record_rate_limit_hit(), None);
        assert_eq!(gov.record_rate_limit_hit(), Some((5, 3)));
        assert_eq!(gov.current_limit(), 3);
        assert_eq!(gov.consecutive_hits(), 0, "counter resets after reduction");
    }

    #[test]
    fn repeated_throttling_keeps_reducing_down_to_one() {
        let mut gov = ConcurrencyGovernor::new(5);
        let mut limits = Vec::new();
        for _ in 0..12 {
            if let Some((_, new)) = gov.record_rate_limit_hit() {
                limits.push(new);
            }
        }
        // 5 -> 3 -> 2 -> 1, then no further change
        assert_eq!(limits, vec![3, 2, 1]);
        assert_eq!(gov.current_limit(), 1);
    }

    #[test]
    fn limit_of_one_never_changes() {
        let mut gov = ConcurrencyGovernor::new(1);
        for _ in 0..10 {
            assert_eq!(gov.record_rate_limit_hit(), None);
        }
        assert_eq!(gov.current_limit(), 1);
        assert_eq!(gov.consecutive_hits(), 10);
    }

    #[test]
    fn success_clears_hits_without_restoring_limit() {
        let mut gov = ConcurrencyGovernor::new(10);
        for _ in 0..3 {
            gov.record_rate_limit_hit();
        }
        assert_eq!(gov.current_limit(), 7);

        gov.record_rate_limit_hit();
        gov.record_rate_limit_hit();
        gov.record_success();
        assert_eq!(gov.consecutive_hits(), 0);
        assert_eq!(gov.current_limit(), 7);

        // Two more hits are not enough after the counter was cleared
        gov.record_rate_limit_hit();
        gov.record_rate_limit_hit();
        assert_eq!(gov.current_limit(), 7);
    }

    #[test]
    fn reset_restores_initial_limit() {
        let mut gov = ConcurrencyGovernor::new(4);
        for _ in 0..3 {
            gov.record_rate_limit_hit();
        }
        assert_eq!(gov.current_limit(), 2);

        gov.reset();
        assert_eq!(gov.current_limit(), 4);
        assert_eq!(gov.initial_limit(), 4);
        assert_eq!(gov.consecutive_hits(), 0);
    }
}
