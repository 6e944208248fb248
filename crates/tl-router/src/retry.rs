//! Retry tier selection.

use tl_common::RetryRoute;

/// Outcome of routing one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub route: RetryRoute,
}

/// Maps an attempt count onto the escalating delay staircase.
///
/// `≤0 → 10s, 1 → 1m, 2 → 5m, 3 → 30m, ≥4 → dead`. There is no jitter and no
/// separate attempt limit; dead-lettering happens by walking off the end of the tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryRouter;

impl RetryRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn decide(&self, attempt: i64) -> RetryDecision {
        let route = match attempt {
            i64::MIN..=0 => RetryRoute::Retry10s,
            1 => RetryRoute::Retry1m,
            2 => RetryRoute::Retry5m,
            3 => RetryRoute::Retry30m,
            _ => RetryRoute::Dead,
        };
        RetryDecision { route }
    }

    /// Processing attempts a delivery entering at `x-attempt = 0` gets before it is
    /// dead-lettered. Each failure routes on the next attempt count, so the first
    /// count that routes `Dead` is also the number of attempts made.
    pub fn max_attempts(&self) -> usize {
        let mut next: i64 = 1;
        while self.decide(next).route != RetryRoute::Dead {
            next += 1;
        }
        next as usize
    }
}
