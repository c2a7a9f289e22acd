//! Episode configuration.
//!
//! One immutable [`LineConfig`] value is handed to the engine at construction
//! and never mutated afterwards, so concurrent simulations cannot contaminate
//! each other through shared settings.

use crate::fixed::{Fixed64, SimTime, f64_to_fixed64};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors detected while validating a configuration. Fatal at reset time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown control type code: {0}")]
    UnknownControlType(i32),
    #[error("{field} has {got} entries but the line has {expected} machines")]
    MachineArrayLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("bin count must be positive")]
    ZeroBinCount,
    #[error("bin capacity must be positive")]
    NonPositiveBinCapacity,
    #[error("initial bin level {level} outside [0, {capacity}]")]
    InitialBinLevel { level: f64, capacity: f64 },
    #[error("infeed sensor offset {offset} outside 1..={bins}")]
    InfeedOffsetOutOfRange { offset: usize, bins: usize },
    #[error("discharge sensor index {index} outside 0..{bins}")]
    DischargeIndexOutOfRange { index: usize, bins: usize },
    #[error("machine {machine}: initial speed {speed} outside [0, {max}]")]
    InitialSpeedOutOfRange {
        machine: usize,
        speed: f64,
        max: f64,
    },
    #[error("forced down machine index {index} outside 0..{machines}")]
    DownMachineOutOfRange { index: usize, machines: usize },
    #[error("time step must be positive")]
    NonPositiveTimeStep,
    #[error("control frequency must be positive")]
    NonPositiveControlFrequency,
}

// ---------------------------------------------------------------------------
// Control type
// ---------------------------------------------------------------------------

/// Gate policy deciding when an external `step` call regains control.
///
/// Wire encoding matches the integer codes external controllers send:
/// -1, 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ControlType {
    /// Fixed control frequency, downtime generators disabled.
    FixedFrequencyNoDowntime,
    /// Fixed control frequency with downtime events running in the background.
    FixedFrequency,
    /// Event driven: control returns only on downtime transitions.
    DowntimeEvent,
    /// Control returns on either a frequency tick or a downtime transition.
    Either,
}

impl ControlType {
    /// Decode the external integer code.
    pub fn from_code(code: i32) -> Result<Self, ConfigError> {
        match code {
            -1 => Ok(Self::FixedFrequencyNoDowntime),
            0 => Ok(Self::FixedFrequency),
            1 => Ok(Self::DowntimeEvent),
            2 => Ok(Self::Either),
            other => Err(ConfigError::UnknownControlType(other)),
        }
    }

    /// The external integer code for this policy.
    pub fn code(self) -> i32 {
        match self {
            Self::FixedFrequencyNoDowntime => -1,
            Self::FixedFrequency => 0,
            Self::DowntimeEvent => 1,
            Self::Either => 2,
        }
    }

    /// Whether downtime generator processes run under this policy.
    pub fn downtime_enabled(self) -> bool {
        !matches!(self, Self::FixedFrequencyNoDowntime)
    }

    /// Whether the gate releases on a control-frequency tick.
    pub fn releases_on_frequency(self) -> bool {
        !matches!(self, Self::DowntimeEvent)
    }

    /// Whether the gate releases on a downtime transition.
    pub fn releases_on_downtime(self) -> bool {
        matches!(self, Self::DowntimeEvent | Self::Either)
    }
}

// ---------------------------------------------------------------------------
// Per-machine parameters
// ---------------------------------------------------------------------------

/// Static parameters of one machine.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MachineParams {
    /// Lowest useful running speed, products per second. Informational; the
    /// controller may still command any value in [0, max_speed].
    pub min_speed: Fixed64,
    /// Hard upper bound on commanded speed.
    pub max_speed: Fixed64,
    /// Speed applied at episode start.
    pub initial_speed: Fixed64,
    /// Center of the uniform downtime-duration range, whole seconds.
    pub downtime_duration_mean: u32,
    /// Half-width of the uniform downtime-duration range, whole seconds.
    pub downtime_duration_dev: u32,
    /// Relative weight when the failing machine is picked at random.
    pub downtime_weight: u32,
    /// Seconds a machine spends in startup before returning to active.
    pub startup_duration: Fixed64,
}

// ---------------------------------------------------------------------------
// Line configuration
// ---------------------------------------------------------------------------

/// Complete, immutable configuration for one episode.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LineConfig {
    /// Granularity of physical accounting, simulated seconds.
    pub time_step: SimTime,
    pub control_type: ControlType,
    /// Interval between control-frequency events, simulated seconds.
    pub control_frequency: SimTime,
    /// Global warm-up delay before the first-ever downtime event, seconds.
    pub interval_first_down_event: u32,
    /// Center of the uniform inter-failure interval, whole seconds.
    pub interval_downtime_event_mean: u32,
    /// Half-width of the uniform inter-failure interval, whole seconds.
    pub interval_downtime_event_dev: u32,
    /// Number of concurrent downtime generator processes.
    pub number_parallel_downtime_events: usize,
    /// `Some(i)` forces machine `i` to be the one that fails; `None` picks a
    /// weighted-random eligible machine per event.
    pub down_machine_index: Option<usize>,
    /// Level every bin starts at.
    pub initial_bin_level: Fixed64,
    /// Maximum products per bin.
    pub bin_capacity: Fixed64,
    /// Bins per conveyor.
    pub bin_count: usize,
    /// Fixed transport rate of every conveyor, products per second. Not
    /// controllable by the external agent.
    pub conveyor_speed: Fixed64,
    /// Per-machine parameters, one entry per machine in topology order.
    pub machines: Vec<MachineParams>,
    /// Primary infeed sensor: offset from the conveyor's draw end, 1-based
    /// (1 means the bin the downstream machine draws from).
    pub infeed_offset_primary: usize,
    /// Secondary infeed sensor offset, same convention.
    pub infeed_offset_secondary: usize,
    /// Primary discharge sensor: bin index from the receiving end, 0-based.
    pub discharge_index_primary: usize,
    /// Secondary discharge sensor index, same convention.
    pub discharge_index_secondary: usize,
    /// A bin at or below this level reads "empty" at the primary infeed tap.
    pub infeed_threshold_primary: Fixed64,
    /// Empty threshold for the secondary infeed tap.
    pub infeed_threshold_secondary: Fixed64,
    /// A bin at or above this level reads "full" at the primary discharge tap.
    pub discharge_threshold_primary: Fixed64,
    /// Full threshold for the secondary discharge tap.
    pub discharge_threshold_secondary: Fixed64,
    /// Seed for the downtime RNG.
    pub seed: u64,
}

impl Default for LineConfig {
    /// The canonical six-machine serial line.
    fn default() -> Self {
        let max_speeds = [170, 190, 180, 180, 180, 300];
        let min_speeds = [100, 30, 60, 40, 80, 80];
        let initial_speeds = [110, 50, 70, 70, 100, 120];
        let duration_means = [11, 12, 6, 15, 9, 12];
        let duration_devs = [2, 4, 1, 3, 3, 4];
        let weights = [70, 10, 5, 30, 60, 10];
        let startup_durations = [6, 10, 5, 7, 12, 8];

        let machines = (0..6)
            .map(|i| MachineParams {
                min_speed: Fixed64::from_num(min_speeds[i]),
                max_speed: Fixed64::from_num(max_speeds[i]),
                initial_speed: Fixed64::from_num(initial_speeds[i]),
                downtime_duration_mean: duration_means[i],
                downtime_duration_dev: duration_devs[i],
                downtime_weight: weights[i],
                startup_duration: Fixed64::from_num(startup_durations[i]),
            })
            .collect();

        Self {
            time_step: SimTime::from_num(1),
            control_type: ControlType::FixedFrequency,
            control_frequency: SimTime::from_num(1),
            interval_first_down_event: 50,
            interval_downtime_event_mean: 20,
            interval_downtime_event_dev: 5,
            number_parallel_downtime_events: 4,
            down_machine_index: None,
            initial_bin_level: Fixed64::from_num(60),
            bin_capacity: Fixed64::from_num(100),
            bin_count: 10,
            conveyor_speed: Fixed64::from_num(1000),
            machines,
            infeed_offset_primary: 1,
            infeed_offset_secondary: 4,
            discharge_index_primary: 0,
            discharge_index_secondary: 3,
            infeed_threshold_primary: Fixed64::from_num(50),
            infeed_threshold_secondary: Fixed64::from_num(50),
            discharge_threshold_primary: Fixed64::from_num(50),
            discharge_threshold_secondary: Fixed64::from_num(50),
            seed: 10,
        }
    }
}

impl LineConfig {
    /// Total capacity of one conveyor, products.
    pub fn conveyor_capacity(&self) -> Fixed64 {
        self.bin_capacity * Fixed64::from_num(self.bin_count as i64)
    }

    /// Number of machines this configuration describes.
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Effective physical time step. The step must not exceed the control
    /// frequency; when it does, it is clamped down and a warning is logged,
    /// matching long-standing controller expectations.
    pub fn effective_time_step(&self) -> SimTime {
        if self.control_frequency < self.time_step {
            tracing::warn!(
                time_step = %self.time_step,
                control_frequency = %self.control_frequency,
                "time step exceeds control frequency, clamping down"
            );
            self.control_frequency
        } else {
            self.time_step
        }
    }

    /// Validate against the machine count the topology resolved to.
    /// Fail fast: the engine constructs no state before this passes.
    pub fn validate(&self, machine_count: usize) -> Result<(), ConfigError> {
        if self.machines.len() != machine_count {
            return Err(ConfigError::MachineArrayLength {
                field: "machines",
                expected: machine_count,
                got: self.machines.len(),
            });
        }
        if self.time_step <= SimTime::ZERO {
            return Err(ConfigError::NonPositiveTimeStep);
        }
        if self.control_frequency <= SimTime::ZERO {
            return Err(ConfigError::NonPositiveControlFrequency);
        }
        if self.bin_count == 0 {
            return Err(ConfigError::ZeroBinCount);
        }
        if self.bin_capacity <= Fixed64::ZERO {
            return Err(ConfigError::NonPositiveBinCapacity);
        }
        if self.initial_bin_level < Fixed64::ZERO || self.initial_bin_level > self.bin_capacity {
            return Err(ConfigError::InitialBinLevel {
                level: self.initial_bin_level.to_num(),
                capacity: self.bin_capacity.to_num(),
            });
        }
        for offset in [self.infeed_offset_primary, self.infeed_offset_secondary] {
            if offset < 1 || offset > self.bin_count {
                return Err(ConfigError::InfeedOffsetOutOfRange {
                    offset,
                    bins: self.bin_count,
                });
            }
        }
        for index in [self.discharge_index_primary, self.discharge_index_secondary] {
            if index >= self.bin_count {
                return Err(ConfigError::DischargeIndexOutOfRange {
                    index,
                    bins: self.bin_count,
                });
            }
        }
        for (i, params) in self.machines.iter().enumerate() {
            if params.initial_speed < Fixed64::ZERO || params.initial_speed > params.max_speed {
                return Err(ConfigError::InitialSpeedOutOfRange {
                    machine: i,
                    speed: params.initial_speed.to_num(),
                    max: params.max_speed.to_num(),
                });
            }
        }
        if let Some(index) = self.down_machine_index {
            if index >= machine_count {
                return Err(ConfigError::DownMachineOutOfRange {
                    index,
                    machines: machine_count,
                });
            }
        }
        Ok(())
    }

    /// Convenience for tests and scenario files that carry plain floats.
    pub fn set_initial_speeds(&mut self, speeds: &[f64]) {
        for (params, &speed) in self.machines.iter_mut().zip(speeds) {
            params.initial_speed = f64_to_fixed64(speed);
        }
    }
}
