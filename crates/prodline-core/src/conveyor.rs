//! Conveyor component: a fixed-rate belt discretized into bins.
//!
//! Bin 0 is the receiving end (fed by the upstream machine); the last bin is
//! the draw end the downstream machine consumes from. Repacking fills bins
//! from the draw end toward the receiving end, modeling product sliding to
//! the end of the belt, so sensor taps near the draw end respond first to
//! starvation and taps near the receiving end to congestion.

use crate::config::LineConfig;
use crate::fixed::Fixed64;

/// Conveyor lifecycle state. Conveyors run at a fixed transport rate in the
/// converged line design, so in practice they stay active; the state exists
/// for snapshot parity and future fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConveyorState {
    Active,
    Idle,
    Down,
}

impl ConveyorState {
    /// Integer encoding used in state snapshots.
    pub fn code(self) -> i32 {
        match self {
            Self::Active => 1,
            Self::Idle => 0,
            Self::Down => -1,
        }
    }
}

/// One conveyor of the line.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Conveyor {
    speed: Fixed64,
    state: ConveyorState,
    bin_capacity: Fixed64,
    bins: Vec<Fixed64>,
    /// Bin levels at the previous tick, for edge-triggered sensor logic.
    previous_bins: Vec<Fixed64>,
}

impl Conveyor {
    pub fn new(config: &LineConfig) -> Self {
        let state = if config.conveyor_speed == Fixed64::ZERO {
            ConveyorState::Idle
        } else {
            ConveyorState::Active
        };
        Self {
            speed: config.conveyor_speed,
            state,
            bin_capacity: config.bin_capacity,
            bins: vec![config.initial_bin_level; config.bin_count],
            previous_bins: vec![Fixed64::ZERO; config.bin_count],
        }
    }

    pub fn speed(&self) -> Fixed64 {
        self.speed
    }

    pub fn state(&self) -> ConveyorState {
        self.state
    }

    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_capacity(&self) -> Fixed64 {
        self.bin_capacity
    }

    pub fn bins(&self) -> &[Fixed64] {
        &self.bins
    }

    pub fn previous_bins(&self) -> &[Fixed64] {
        &self.previous_bins
    }

    pub fn bin(&self, index: usize) -> Fixed64 {
        self.bins[index]
    }

    /// Total capacity in products.
    pub fn capacity(&self) -> Fixed64 {
        self.bin_capacity * Fixed64::from_num(self.bins.len() as i64)
    }

    /// Total product currently on the belt.
    pub fn level(&self) -> Fixed64 {
        self.bins.iter().copied().sum()
    }

    /// Total product at the previous tick.
    pub fn previous_level(&self) -> Fixed64 {
        self.previous_bins.iter().copied().sum()
    }

    /// Remaining empty space.
    pub fn free_capacity(&self) -> Fixed64 {
        self.capacity() - self.level()
    }

    /// Redistribute a new total level across the bins, draw end first: each
    /// bin nearer the draw end is filled to capacity before any product
    /// lands in the next one. Totals below zero clamp to zero; spill beyond
    /// total capacity is discarded (callers clamp flow before packing).
    pub fn pack(&mut self, total: Fixed64) {
        let mut remaining = total.max(Fixed64::ZERO);
        for bin in self.bins.iter_mut().rev() {
            let level = remaining.min(self.bin_capacity);
            *bin = level;
            remaining -= level;
            if remaining <= Fixed64::ZERO {
                remaining = Fixed64::ZERO;
            }
        }
    }

    /// Record current bin levels as the previous-tick snapshot.
    pub fn snapshot_previous(&mut self) {
        self.previous_bins.copy_from_slice(&self.bins);
    }

    // -----------------------------------------------------------------------
    // Sensor taps
    // -----------------------------------------------------------------------

    /// Bin index of an infeed tap: `offset` bins from the draw end, 1-based.
    pub fn infeed_bin(&self, offset: usize) -> usize {
        self.bins.len() - offset
    }

    /// Infeed tap reads "empty": the tapped bin is at or below the threshold.
    pub fn infeed_empty(&self, offset: usize, threshold: Fixed64) -> bool {
        self.bins[self.infeed_bin(offset)] <= threshold
    }

    /// Infeed tap reading at the previous tick.
    pub fn previous_infeed_empty(&self, offset: usize, threshold: Fixed64) -> bool {
        self.previous_bins[self.infeed_bin(offset)] <= threshold
    }

    /// Discharge tap reads "full": the tapped bin is at or above the
    /// threshold. `index` counts from the receiving end, 0-based.
    pub fn discharge_full(&self, index: usize, threshold: Fixed64) -> bool {
        self.bins[index] >= threshold
    }

    /// Discharge tap reading at the previous tick.
    pub fn previous_discharge_full(&self, index: usize, threshold: Fixed64) -> bool {
        self.previous_bins[index] >= threshold
    }
}
