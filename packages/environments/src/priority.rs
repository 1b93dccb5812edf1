// ABOUTME: Listener rule priority allocation for the shared load balancer listener
// ABOUTME: Provides a process-local atomic allocator; the durable allocator lives in storage

use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::RoutingError;

/// Highest priority a listener rule may use
pub const MAX_RULE_PRIORITY: i32 = 50_000;

/// Upper bound of the random seed of the process-local allocator
const PROCESS_SEED_RANGE: i32 = 40_000;

/// Source of listener rule priorities
#[async_trait]
pub trait RulePriorityAllocator: Send + Sync {
    /// Return a priority in `1..=MAX_RULE_PRIORITY` not handed out recently
    async fn next_priority(&self) -> Result<i32, RoutingError>;
}

/// Map any positive counter value into the valid priority range
pub(crate) fn wrap_priority(value: i64) -> i32 {
    ((value - 1).rem_euclid(MAX_RULE_PRIORITY as i64) + 1) as i32
}

/// Counter seeded once per process from a random odd value
///
/// Unique only within one process lifetime; collisions with rules created by
/// other processes surface as `RoutingError::PriorityInUse` and are retried by
/// the routing manager.
#[derive(Debug)]
pub struct ProcessPriorityAllocator {
    next: AtomicI32,
}

impl ProcessPriorityAllocator {
    pub fn new() -> Self {
        // Odd values in [1, PROCESS_SEED_RANGE]
        let seed = 2 * rand::thread_rng().gen_range(0..PROCESS_SEED_RANGE / 2) + 1;
        Self::with_seed(seed)
    }

    pub fn with_seed(seed: i32) -> Self {
        Self {
            next: AtomicI32::new(seed),
        }
    }
}

impl Default for ProcessPriorityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RulePriorityAllocator for ProcessPriorityAllocator {
    async fn next_priority(&self) -> Result<i32, RoutingError> {
        let raw = self.next.fetch_add(1, Ordering::SeqCst);
        Ok(wrap_priority(raw as i64))
    }
}
