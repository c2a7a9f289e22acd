//! Sink component: unbounded accumulator of finished product.

use std::collections::VecDeque;

use crate::fixed::Fixed64;

/// How many control instants of sink history are retained.
const HISTORY_DEPTH: usize = 10;

/// Collects finished product from a line-terminal machine.
///
/// The rolling count history is appended at each control instant, so the
/// difference of its last two entries is the throughput produced between
/// consecutive control events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Sink {
    product_count: Fixed64,
    count_history: VecDeque<Fixed64>,
}

impl Default for Sink {
    fn default() -> Self {
        Self::new()
    }
}

impl Sink {
    pub fn new() -> Self {
        let mut count_history = VecDeque::with_capacity(HISTORY_DEPTH);
        // Seed entries so deltas are well defined before the first control
        // instant.
        count_history.extend([Fixed64::ZERO; 3]);
        Self {
            product_count: Fixed64::ZERO,
            count_history,
        }
    }

    pub fn product_count(&self) -> Fixed64 {
        self.product_count
    }

    /// Add product produced during one tick.
    pub fn accumulate(&mut self, delta: Fixed64) {
        self.product_count += delta;
    }

    /// Record the running count at a control instant.
    pub fn record_history(&mut self) {
        if self.count_history.len() == HISTORY_DEPTH {
            self.count_history.pop_front();
        }
        self.count_history.push_back(self.product_count);
    }

    /// Most recent recorded count.
    pub fn throughput_absolute(&self) -> Fixed64 {
        self.count_history.back().copied().unwrap_or(Fixed64::ZERO)
    }

    /// Count produced between the last two control instants.
    pub fn throughput_delta(&self) -> Fixed64 {
        let mut iter = self.count_history.iter().rev();
        match (iter.next(), iter.next()) {
            (Some(&last), Some(&prev)) => last - prev,
            _ => Fixed64::ZERO,
        }
    }
}
