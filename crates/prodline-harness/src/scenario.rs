//! Scenario files: everything needed to start one episode, as JSON.
//!
//! External controllers send a flat map of named scalar and array
//! parameters. The scenario layer keeps that shape as plain numbers and
//! converts to the engine's fixed-point [`LineConfig`] when an episode is
//! built; omitted fields fall back to the canonical six-machine defaults,
//! unknown fields are rejected so a typo never silently runs the default.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use prodline_core::config::{ConfigError, ControlType, MachineParams};
use prodline_core::fixed::f64_to_fixed64;
use prodline_core::{BuildError, LineConfig, LineEngine, SimTime, serial};

use crate::error::HarnessError;

/// One episode scenario, in external (plain-number) form.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Scenario {
    pub machine_count: usize,
    pub simulation_time_step: f64,
    /// Gate policy code: -1, 0, 1, or 2.
    pub control_type: i32,
    pub control_frequency: f64,
    pub interval_first_down_event: u32,
    pub interval_downtime_event_mean: u32,
    pub interval_downtime_event_dev: u32,
    pub number_parallel_downtime_events: usize,
    /// -1 picks a weighted-random machine per failure; 0..K forces one.
    pub down_machine_index: i64,
    pub initial_bin_level: f64,
    pub bin_maximum_capacity: f64,
    pub num_conveyor_bins: usize,
    pub conveyor_speed: f64,
    pub machine_min_speeds: Vec<f64>,
    pub machine_max_speeds: Vec<f64>,
    pub machine_initial_speeds: Vec<f64>,
    pub downtime_duration_means: Vec<u32>,
    pub downtime_duration_devs: Vec<u32>,
    pub downtime_weights: Vec<u32>,
    pub startup_durations: Vec<f64>,
    pub infeed_offset_primary: usize,
    pub infeed_offset_secondary: usize,
    pub discharge_index_primary: usize,
    pub discharge_index_secondary: usize,
    pub infeed_threshold_primary: f64,
    pub infeed_threshold_secondary: f64,
    pub discharge_threshold_primary: f64,
    pub discharge_threshold_secondary: f64,
    pub seed: u64,
}

impl Default for Scenario {
    /// The canonical six-machine serial line.
    fn default() -> Self {
        Self {
            machine_count: 6,
            simulation_time_step: 1.0,
            control_type: 0,
            control_frequency: 1.0,
            interval_first_down_event: 50,
            interval_downtime_event_mean: 20,
            interval_downtime_event_dev: 5,
            number_parallel_downtime_events: 4,
            down_machine_index: -1,
            initial_bin_level: 60.0,
            bin_maximum_capacity: 100.0,
            num_conveyor_bins: 10,
            conveyor_speed: 1000.0,
            machine_min_speeds: vec![100.0, 30.0, 60.0, 40.0, 80.0, 80.0],
            machine_max_speeds: vec![170.0, 190.0, 180.0, 180.0, 180.0, 300.0],
            machine_initial_speeds: vec![110.0, 50.0, 70.0, 70.0, 100.0, 120.0],
            downtime_duration_means: vec![11, 12, 6, 15, 9, 12],
            downtime_duration_devs: vec![2, 4, 1, 3, 3, 4],
            downtime_weights: vec![70, 10, 5, 30, 60, 10],
            startup_durations: vec![6.0, 10.0, 5.0, 7.0, 12.0, 8.0],
            infeed_offset_primary: 1,
            infeed_offset_secondary: 4,
            discharge_index_primary: 0,
            discharge_index_secondary: 3,
            infeed_threshold_primary: 50.0,
            infeed_threshold_secondary: 50.0,
            discharge_threshold_primary: 50.0,
            discharge_threshold_secondary: 50.0,
            seed: 10,
        }
    }
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            HarnessError::ScenarioParse {
                file: path.to_owned(),
                source,
            }
        })
    }

    fn machine_array_len(&self, field: &'static str, len: usize) -> Result<(), ConfigError> {
        if len != self.machine_count {
            return Err(ConfigError::MachineArrayLength {
                field,
                expected: self.machine_count,
                got: len,
            });
        }
        Ok(())
    }

    /// Convert to the engine's fixed-point configuration.
    pub fn to_config(&self) -> Result<LineConfig, HarnessError> {
        let convert = || -> Result<LineConfig, ConfigError> {
            self.machine_array_len("machine_min_speeds", self.machine_min_speeds.len())?;
            self.machine_array_len("machine_max_speeds", self.machine_max_speeds.len())?;
            self.machine_array_len("machine_initial_speeds", self.machine_initial_speeds.len())?;
            self.machine_array_len("downtime_duration_means", self.downtime_duration_means.len())?;
            self.machine_array_len("downtime_duration_devs", self.downtime_duration_devs.len())?;
            self.machine_array_len("downtime_weights", self.downtime_weights.len())?;
            self.machine_array_len("startup_durations", self.startup_durations.len())?;

            let machines = (0..self.machine_count)
                .map(|i| MachineParams {
                    min_speed: f64_to_fixed64(self.machine_min_speeds[i]),
                    max_speed: f64_to_fixed64(self.machine_max_speeds[i]),
                    initial_speed: f64_to_fixed64(self.machine_initial_speeds[i]),
                    downtime_duration_mean: self.downtime_duration_means[i],
                    downtime_duration_dev: self.downtime_duration_devs[i],
                    downtime_weight: self.downtime_weights[i],
                    startup_duration: f64_to_fixed64(self.startup_durations[i]),
                })
                .collect();

            Ok(LineConfig {
                time_step: f64_to_fixed64(self.simulation_time_step),
                control_type: ControlType::from_code(self.control_type)?,
                control_frequency: f64_to_fixed64(self.control_frequency),
                interval_first_down_event: self.interval_first_down_event,
                interval_downtime_event_mean: self.interval_downtime_event_mean,
                interval_downtime_event_dev: self.interval_downtime_event_dev,
                number_parallel_downtime_events: self.number_parallel_downtime_events,
                down_machine_index: usize::try_from(self.down_machine_index).ok(),
                initial_bin_level: f64_to_fixed64(self.initial_bin_level),
                bin_capacity: f64_to_fixed64(self.bin_maximum_capacity),
                bin_count: self.num_conveyor_bins,
                conveyor_speed: f64_to_fixed64(self.conveyor_speed),
                machines,
                infeed_offset_primary: self.infeed_offset_primary,
                infeed_offset_secondary: self.infeed_offset_secondary,
                discharge_index_primary: self.discharge_index_primary,
                discharge_index_secondary: self.discharge_index_secondary,
                infeed_threshold_primary: f64_to_fixed64(self.infeed_threshold_primary),
                infeed_threshold_secondary: f64_to_fixed64(self.infeed_threshold_secondary),
                discharge_threshold_primary: f64_to_fixed64(self.discharge_threshold_primary),
                discharge_threshold_secondary: f64_to_fixed64(self.discharge_threshold_secondary),
                seed: self.seed,
            })
        };
        convert().map_err(|e| HarnessError::Build(BuildError::Config(e)))
    }

    /// Build a fresh engine for this scenario's serial line.
    pub fn build_engine(&self) -> Result<LineEngine, HarnessError> {
        let adjacency = serial(self.machine_count);
        Ok(LineEngine::new(&adjacency, self.to_config()?)?)
    }

    /// The control-frequency interval as simulated time.
    pub fn control_frequency(&self) -> SimTime {
        f64_to_fixed64(self.control_frequency)
    }
}
