use crate::utils::process_info::count_processes_named;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Source of the number of worker processes the server currently owns.
pub trait ProcessInventory {
    fn count_workers(&self) -> std::io::Result<usize>;
}

/// Counts worker processes by name through `/proc`.
#[derive(Debug, Clone)]
pub struct ProcfsInventory {
    process_name: String,
}

impl ProcfsInventory {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }
}

impl ProcessInventory for ProcfsInventory {
    fn count_workers(&self) -> std::io::Result<usize> {
        count_processes_named(&self.process_name)
    }
}

impl<T: ProcessInventory + ?Sized> ProcessInventory for &T {
    fn count_workers(&self) -> std::io::Result<usize> {
        (**self).count_workers()
    }
}

/// Bounded settle window for worker counts. Workers start and exit
/// asynchronously to the document operations that trigger them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettlePolicy {
    /// Total readings taken before giving up (at least one)
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for SettlePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
        }
    }
}

impl SettlePolicy {
    /// Single reading, no waiting.
    pub fn immediate() -> Self {
        Self {
            attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Delay before reading number `attempt + 1` (zero-based): doubles from
    /// the initial delay up to the cap.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    /// Upper bound on the time one `count` call may spend sleeping.
    pub fn max_wait(&self) -> Duration {
        (0..self.attempts.saturating_sub(1))
            .map(|attempt| self.delay_after(attempt))
            .sum()
    }
}

pub struct WorkerCountProbe<I> {
    inventory: I,
    policy: SettlePolicy,
}

impl<I: ProcessInventory> WorkerCountProbe<I> {
    pub fn new(inventory: I, policy: SettlePolicy) -> Self {
        Self { inventory, policy }
    }

    /// Current worker count, polling until it equals `expected_hint` or the
    /// settle window runs out. Never fails: on exhaustion the last reading is
    /// returned and the caller decides.
    pub async fn count(&self, expected_hint: usize) -> usize {
        let attempts = self.policy.attempts.max(1);
        let mut reading = 0;

        for attempt in 0..attempts {
            reading = self.read_once();
            if reading == expected_hint {
                debug!(workers = reading, attempt, "worker count settled");
                return reading;
            }

            if attempt + 1 < attempts {
                let delay = self.policy.delay_after(attempt);
                debug!(
                    workers = reading,
                    expected = expected_hint,
                    "worker count not settled, retrying in {:?}",
                    delay
                );
                sleep(delay).await;
            }
        }

        warn!(
            workers = reading,
            expected = expected_hint,
            "worker count did not settle after {} readings within {:?}",
            attempts,
            self.policy.max_wait()
        );
        reading
    }

    fn read_once(&self) -> usize {
        match self.inventory.count_workers() {
            Ok(count) => count,
            Err(e) => {
                warn!("failed to read worker processes: {}", e);
                0
            }
        }
    }
}
