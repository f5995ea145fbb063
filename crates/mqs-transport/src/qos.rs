//! Prefetch-window tracking and the bulk-fetch slot estimator.

use crate::envelope::DeliveryInfo;
use std::collections::HashMap;

/// Tracks delivered-but-unacked messages against the consumer's prefetch
/// window and allocates delivery tags.
///
/// A prefetch count of zero means the window is unlimited.
#[derive(Debug, Default)]
pub struct QosTracker {
    prefetch_count: u32,
    delivered: HashMap<u64, DeliveryInfo>,
    tag_counter: u64,
}

impl QosTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_prefetch(&mut self, prefetch_count: u32) {
        self.prefetch_count = prefetch_count;
    }

    pub fn prefetch_count(&self) -> u32 {
        self.prefetch_count
    }

    /// Whether at least one consumption slot is available
    pub fn can_consume(&self) -> bool {
        self.prefetch_count == 0 || (self.delivered.len() as u32) < self.prefetch_count
    }

    /// Max messages consumable right now; `None` when unlimited
    pub fn can_consume_max_estimate(&self) -> Option<u32> {
        if self.prefetch_count == 0 {
            None
        } else {
            Some(self.prefetch_count.saturating_sub(self.delivered.len() as u32))
        }
    }

    /// How many messages the next bulk fetch may request.
    ///
    /// Bounded above by `max_cap` (the remote per-call batch ceiling) and
    /// below by 1: the caller must already hold a guarantee that at least
    /// one slot is available before fetching.
    pub fn estimate(&self, max_cap: u32) -> u32 {
        match self.can_consume_max_estimate() {
            None => max_cap,
            Some(n) => n.clamp(1, max_cap),
        }
    }

    /// Allocate the next delivery tag
    pub fn next_delivery_tag(&mut self) -> u64 {
        self.tag_counter += 1;
        self.tag_counter
    }

    /// Record an ack-tracked delivery under its tag
    pub fn track(&mut self, tag: u64, info: DeliveryInfo) {
        self.delivered.insert(tag, info);
    }

    pub fn get(&self, tag: u64) -> Option<&DeliveryInfo> {
        self.delivered.get(&tag)
    }

    /// Settle a delivery, returning its info if it was tracked
    pub fn ack(&mut self, tag: u64) -> Option<DeliveryInfo> {
        self.delivered.remove(&tag)
    }

    pub fn unacked(&self) -> usize {
        self.delivered.len()
    }
}

#[cfg(test)]
#[path = "qos_tests.rs"]
mod tests;
