//! Downtime generation: machine failures and the bookkeeping around them.
//!
//! Each generator is a resumable state machine interleaved by the event
//! clock. The engine owns the component arenas, so the phases here only
//! describe what a generator does next; the engine performs the mutations
//! when a generator wake fires.

use std::collections::VecDeque;

use crate::config::{LineConfig, MachineParams};
use crate::fixed::{Fixed64, SimTime};
use crate::id::MachineId;
use crate::rng::SimRng;

/// How many downtime events are retained in the history.
const EVENT_HISTORY_DEPTH: usize = 10;

// ---------------------------------------------------------------------------
// Generator phases
// ---------------------------------------------------------------------------

/// Where one downtime generator is in its cycle.
///
/// `WarmUp` waits out the global delay before the first-ever failure.
/// `Select` fires a failure on wake. `Hold { .. }` waits out the sampled
/// outage and restores the machine on wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DowntimePhase {
    WarmUp,
    Select,
    Hold { machine: MachineId },
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DowntimeEvent {
    pub at: SimTime,
    /// Line index of the failed machine.
    pub machine: usize,
    /// Sampled outage duration, whole seconds.
    pub duration: u32,
}

/// Bounded history of recent failures.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct DowntimeHistory {
    events: VecDeque<DowntimeEvent>,
}

impl DowntimeHistory {
    pub fn record(&mut self, event: DowntimeEvent) {
        if self.events.len() == EVENT_HISTORY_DEPTH {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn events(&self) -> impl Iterator<Item = &DowntimeEvent> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&DowntimeEvent> {
        self.events.back()
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Sample an outage duration for one machine: uniform over
/// [mean - dev, mean + dev], floored at zero.
pub fn sample_duration(rng: &mut SimRng, params: &MachineParams) -> u32 {
    let lo = params
        .downtime_duration_mean
        .saturating_sub(params.downtime_duration_dev);
    let hi = params.downtime_duration_mean + params.downtime_duration_dev;
    rng.uniform_range(lo, hi)
}

/// Sample the quiet interval before a generator's next failure.
pub fn sample_interval(rng: &mut SimRng, config: &LineConfig) -> u32 {
    let lo = config
        .interval_downtime_event_mean
        .saturating_sub(config.interval_downtime_event_dev);
    let hi = config.interval_downtime_event_mean + config.interval_downtime_event_dev;
    rng.uniform_range(lo, hi)
}

/// Pick the next machine to fail from the eligible candidates, given as
/// (line index, failure weight) pairs.
///
/// A configured fixed index wins when it is still eligible; otherwise the
/// pick is weighted-random. `None` means no machine can fail and the
/// calling generator should retire.
pub fn select_target(
    rng: &mut SimRng,
    down_machine_index: Option<usize>,
    eligible: &[(usize, u32)],
) -> Option<usize> {
    if eligible.is_empty() {
        return None;
    }
    if let Some(fixed) = down_machine_index {
        if eligible.iter().any(|&(index, _)| index == fixed) {
            return Some(fixed);
        }
    }
    let weights: Vec<u32> = eligible.iter().map(|&(_, w)| w).collect();
    let pick = rng.weighted_index(&weights)?;
    Some(eligible[pick].0)
}

// ---------------------------------------------------------------------------
// Remaining-downtime tracker
// ---------------------------------------------------------------------------

/// Per-machine remaining-downtime estimates, refreshed every tick.
///
/// The controller cannot observe a sampled outage duration directly; it sees
/// offsets from the configured mean and maximum durations, which shrink as
/// the outage wears on (and may go negative when the sample ran long).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DowntimeTracker {
    elapsed_down: Vec<SimTime>,
    mean_offset: Vec<Fixed64>,
    max_offset: Vec<Fixed64>,
}

impl DowntimeTracker {
    pub fn new(machine_count: usize) -> Self {
        Self {
            elapsed_down: vec![SimTime::ZERO; machine_count],
            mean_offset: vec![Fixed64::ZERO; machine_count],
            max_offset: vec![Fixed64::ZERO; machine_count],
        }
    }

    /// Refresh the estimate for one machine. Called once per machine per
    /// tick, after the physical update.
    pub fn refresh(&mut self, index: usize, is_down: bool, params: &MachineParams, dt: SimTime) {
        if is_down {
            let mean = Fixed64::from_num(params.downtime_duration_mean);
            let max = Fixed64::from_num(params.downtime_duration_mean + params.downtime_duration_dev);
            self.mean_offset[index] = mean - self.elapsed_down[index];
            self.max_offset[index] = max - self.elapsed_down[index];
            self.elapsed_down[index] += dt;
        } else {
            self.elapsed_down[index] = SimTime::ZERO;
            self.mean_offset[index] = Fixed64::ZERO;
            self.max_offset[index] = Fixed64::ZERO;
        }
    }

    pub fn mean_offsets(&self) -> &[Fixed64] {
        &self.mean_offset
    }

    pub fn max_offsets(&self) -> &[Fixed64] {
        &self.max_offset
    }
}
