//! CSV episode logs, one row per control step.
//!
//! Columns carry a prefix naming their origin: `action_` for commanded
//! speeds, `state_` for the observation, `config_` for the scenario scalars
//! repeated on every row so a log file is self-describing when sliced.
//! The header is fixed at construction from the scenario's line shape;
//! every row is checked against it.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use prodline_core::LineState;
use prodline_core::fixed::fixed64_to_f64;

use crate::error::HarnessError;
use crate::scenario::Scenario;

pub struct EpisodeLogger<W: Write> {
    writer: csv::Writer<W>,
    machine_count: usize,
    conveyor_count: usize,
    bin_count: usize,
    sink_count: usize,
    config_cells: Vec<String>,
    rows_written: u64,
}

impl EpisodeLogger<File> {
    /// Create a log file at `path`, truncating any existing file, and write
    /// the header.
    pub fn create(path: &Path, scenario: &Scenario) -> Result<Self, HarnessError> {
        Self::new(File::create(path)?, scenario)
    }
}

impl<W: Write> EpisodeLogger<W> {
    pub fn new(inner: W, scenario: &Scenario) -> Result<Self, HarnessError> {
        let machine_count = scenario.machine_count;
        let conveyor_count = machine_count.saturating_sub(1);
        let bin_count = scenario.num_conveyor_bins;
        // A serial line always terminates in exactly one sink machine.
        let sink_count = 1;

        let config_cells = vec![
            scenario.seed.to_string(),
            scenario.control_type.to_string(),
            scenario.control_frequency.to_string(),
            scenario.simulation_time_step.to_string(),
            scenario.interval_first_down_event.to_string(),
            scenario.interval_downtime_event_mean.to_string(),
            scenario.interval_downtime_event_dev.to_string(),
        ];

        let mut logger = Self {
            writer: csv::Writer::from_writer(inner),
            machine_count,
            conveyor_count,
            bin_count,
            sink_count,
            config_cells,
            rows_written: 0,
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> Result<(), HarnessError> {
        let mut columns = vec!["iteration".to_owned(), "env_time".to_owned()];

        for i in 0..self.machine_count {
            columns.push(format!("action_m{i}_speed"));
        }

        columns.push("config_seed".to_owned());
        columns.push("config_control_type".to_owned());
        columns.push("config_control_frequency".to_owned());
        columns.push("config_time_step".to_owned());
        columns.push("config_interval_first_down_event".to_owned());
        columns.push("config_interval_downtime_event_mean".to_owned());
        columns.push("config_interval_downtime_event_dev".to_owned());

        columns.push("state_control_delta_t".to_owned());
        for i in 0..self.machine_count {
            columns.push(format!("state_machine{i}_state"));
            columns.push(format!("state_machine{i}_actual_speed"));
            columns.push(format!("state_machine{i}_commanded_speed"));
            columns.push(format!("state_machine{i}_illegal"));
            columns.push(format!("state_machine{i}_mean_downtime_offset"));
            columns.push(format!("state_machine{i}_max_downtime_offset"));
        }
        for j in 0..self.conveyor_count {
            columns.push(format!("state_conveyor{j}_speed"));
            columns.push(format!("state_conveyor{j}_state"));
            columns.push(format!("state_conveyor{j}_level"));
            columns.push(format!("state_conveyor{j}_level_estimate"));
            columns.push(format!("state_conveyor{j}_infeed_primary_empty"));
            columns.push(format!("state_conveyor{j}_infeed_secondary_empty"));
            columns.push(format!("state_conveyor{j}_discharge_primary_full"));
            columns.push(format!("state_conveyor{j}_discharge_secondary_full"));
            for b in 0..self.bin_count {
                columns.push(format!("state_conveyor{j}_bin{b}"));
            }
        }
        for s in 0..self.sink_count {
            columns.push(format!("state_sink{s}_rate"));
            columns.push(format!("state_sink{s}_throughput_delta"));
        }
        columns.push("state_sink_throughput_delta_sum".to_owned());
        columns.push("state_sink_throughput_absolute_sum".to_owned());

        self.writer.write_record(&columns)?;
        Ok(())
    }

    /// Append one row for the control step that produced `state` under
    /// `commands`.
    pub fn log_step(
        &mut self,
        commands: &BTreeMap<String, f64>,
        state: &LineState,
    ) -> Result<(), HarnessError> {
        let mut cells = Vec::new();
        cells.push(state.iteration_count.to_string());
        cells.push(fixed64_to_f64(state.env_time).to_string());

        for i in 0..self.machine_count {
            let speed = commands.get(&format!("m{i}")).copied().unwrap_or(0.0);
            cells.push(speed.to_string());
        }

        cells.extend(self.config_cells.iter().cloned());

        cells.push(fixed64_to_f64(state.control_delta_t).to_string());
        for i in 0..self.machine_count {
            cells.push(state.machine_states[i].to_string());
            cells.push(fixed64_to_f64(state.machine_actual_speeds[i]).to_string());
            cells.push(fixed64_to_f64(state.machine_commanded_speeds[i]).to_string());
            cells.push(state.illegal_machine_actions[i].to_string());
            cells.push(fixed64_to_f64(state.mean_downtime_offsets[i]).to_string());
            cells.push(fixed64_to_f64(state.max_downtime_offsets[i]).to_string());
        }
        for j in 0..self.conveyor_count {
            cells.push(fixed64_to_f64(state.conveyor_speeds[j]).to_string());
            cells.push(state.conveyor_states[j].to_string());
            cells.push(fixed64_to_f64(state.conveyor_levels[j]).to_string());
            cells.push(fixed64_to_f64(state.conveyor_level_estimates[j]).to_string());
            cells.push(state.infeed_primary_empty[j].to_string());
            cells.push(state.infeed_secondary_empty[j].to_string());
            cells.push(state.discharge_primary_full[j].to_string());
            cells.push(state.discharge_secondary_full[j].to_string());
            for b in 0..self.bin_count {
                cells.push(fixed64_to_f64(state.conveyor_buffers[j][b]).to_string());
            }
        }
        for s in 0..self.sink_count {
            cells.push(fixed64_to_f64(state.sink_machine_rates[s]).to_string());
            cells.push(fixed64_to_f64(state.sink_throughput_delta[s]).to_string());
        }
        cells.push(fixed64_to_f64(state.sink_throughput_delta_sum).to_string());
        cells.push(fixed64_to_f64(state.sink_throughput_absolute_sum).to_string());

        self.writer.write_record(&cells)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and close the log. Rows written after a failed flush would be
    /// silently lost, so this consumes the logger.
    pub fn finish(mut self) -> Result<(), HarnessError> {
        self.writer.flush()?;
        tracing::debug!(rows = self.rows_written, "episode log flushed");
        Ok(())
    }
}
