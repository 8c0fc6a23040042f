//! Backoff policy for probe retry loops.

use std::time::Duration;

/// Retry delay steps in milliseconds. Attempts past the end of the table
/// keep using the last step.
const DEFAULT_STEPS_MS: &[u64] = &[
    0, 10, 10, 100, 100, 500, 500, 3000, 3000, 5000, 5000, 10000, 10000, 20000, 20000, 40000,
    40000,
];

/// Maps an attempt counter to a randomized delay.
#[derive(Debug, Clone)]
pub struct Policy {
    steps_ms: Vec<u64>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            steps_ms: DEFAULT_STEPS_MS.to_vec(),
        }
    }
}

impl Policy {
    /// Policy with custom steps, mostly useful in tests.
    pub fn with_steps(steps_ms: Vec<u64>) -> Self {
        Self { steps_ms }
    }

    /// How long to wait before the given attempt (0-based).
    ///
    /// Non-zero steps are jittered uniformly over `[step/2, 3*step/2)` so
    /// that many targets probing the same site do not fall into lockstep.
    pub fn delay(&self, attempt: usize) -> Duration {
        if self.steps_ms.is_empty() {
            return Duration::ZERO;
        }
        let idx = attempt.min(self.steps_ms.len() - 1);
        let base = self.steps_ms[idx];
        if base == 0 {
            return Duration::ZERO;
        }
        let jittered = base / 2 + rand::random::<u64>() % base;
        Duration::from_millis(jittered)
    }
}
