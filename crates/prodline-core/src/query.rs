//! State snapshots published to external controllers.

use crate::fixed::{Fixed64, SimTime};

/// Immutable snapshot of the whole line at a control instant.
///
/// Built by value after each step, so a logger or renderer can never observe
/// a mid-update state. Machine and conveyor vectors are in line order;
/// lifecycle codes use the external encoding (active=1, idle=0, down=-1,
/// startup=2).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LineState {
    pub iteration_count: u64,
    /// Simulated seconds since episode start.
    pub env_time: SimTime,
    /// Simulated seconds between the last two control instants.
    pub control_delta_t: SimTime,

    pub machine_states: Vec<i32>,
    /// Buffer-clamped speeds the machines actually ran at.
    pub machine_actual_speeds: Vec<Fixed64>,
    /// Speeds the controller asked for.
    pub machine_commanded_speeds: Vec<Fixed64>,
    /// True where actual differs from commanded.
    pub illegal_machine_actions: Vec<bool>,

    pub conveyor_speeds: Vec<Fixed64>,
    pub conveyor_states: Vec<i32>,
    /// One row of bin levels per conveyor, receiving end first.
    pub conveyor_buffers: Vec<Vec<Fixed64>>,
    /// True where a bin sits at full capacity.
    pub conveyor_buffers_full: Vec<Vec<bool>>,
    pub conveyor_levels: Vec<Fixed64>,
    pub conveyor_previous_levels: Vec<Fixed64>,
    /// Sensor-edge estimates of the conveyor levels.
    pub conveyor_level_estimates: Vec<Fixed64>,

    pub infeed_primary_empty: Vec<bool>,
    pub infeed_secondary_empty: Vec<bool>,
    pub discharge_primary_full: Vec<bool>,
    pub discharge_secondary_full: Vec<bool>,
    pub previous_infeed_primary_empty: Vec<bool>,
    pub previous_infeed_secondary_empty: Vec<bool>,
    pub previous_discharge_primary_full: Vec<bool>,
    pub previous_discharge_secondary_full: Vec<bool>,

    /// Actual speed of each line-terminal machine.
    pub sink_machine_rates: Vec<Fixed64>,
    pub sink_machine_rate_sum: Fixed64,
    /// Product collected per sink since the previous control instant.
    pub sink_throughput_delta: Vec<Fixed64>,
    pub sink_throughput_delta_sum: Fixed64,
    pub sink_throughput_absolute_sum: Fixed64,

    pub mean_downtime_offsets: Vec<Fixed64>,
    pub max_downtime_offsets: Vec<Fixed64>,
}
