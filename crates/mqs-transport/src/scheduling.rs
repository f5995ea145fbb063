//! Fair round-robin rotation over actively-consumed queues.

/// An ordered rotation over queue names.
///
/// Within one full rotation every queue is visited exactly once before any
/// queue is visited a second time, so one busy queue cannot starve the
/// others. The retry-on-empty loop lives in the channel's poll path; this
/// type only owns rotation order and position.
#[derive(Debug, Default)]
pub struct FairCycle {
    resources: Vec<String>,
    pos: usize,
}

impl FairCycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the rotation over a new active set.
    ///
    /// The set is sorted so rotation order is stable regardless of how the
    /// active set was accumulated, and the position restarts at the front:
    /// no queue is skipped or double-served within the next rotation.
    pub fn reset(&mut self, active: impl IntoIterator<Item = String>) {
        self.resources = active.into_iter().collect();
        self.resources.sort();
        self.resources.dedup();
        self.pos = 0;
    }

    /// Advance to the next queue in rotation
    pub fn advance(&mut self) -> Option<String> {
        if self.resources.is_empty() {
            return None;
        }
        let name = self.resources[self.pos].clone();
        self.pos = (self.pos + 1) % self.resources.len();
        Some(name)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Current rotation order
    pub fn items(&self) -> &[String] {
        &self.resources
    }
}

#[cfg(test)]
#[path = "scheduling_tests.rs"]
mod tests;
