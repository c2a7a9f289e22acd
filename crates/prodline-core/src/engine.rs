//! Line update engine and control synchronization gate.
//!
//! `LineEngine` owns every entity of one episode: the resolved topology, the
//! component arenas, the event clock, and the downtime machinery. All
//! processes are resumable state machines resumed by the clock; the external
//! `step` call advances the clock one wake at a time until the gate condition
//! for the configured control type holds.

use std::collections::{BTreeMap, VecDeque};

use slotmap::SecondaryMap;
use tracing::{debug, trace};

use crate::clock::{EventClock, Wake};
use crate::config::{ConfigError, ControlType, LineConfig};
use crate::conveyor::Conveyor;
use crate::downtime::{
    DowntimeEvent, DowntimeHistory, DowntimePhase, DowntimeTracker, sample_duration,
    sample_interval, select_target,
};
use crate::estimator::LevelEstimator;
use crate::fixed::{Fixed64, SimTime};
use crate::id::{ConveyorId, MachineId};
use crate::machine::{Machine, MachineState};
use crate::query::LineState;
use crate::rng::SimRng;
use crate::sink::Sink;
use crate::topology::{Adjacency, LineTopology, TopologyError};

/// How many control instants are retained for delta-time computation.
const CONTROL_HISTORY_DEPTH: usize = 10;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors aborting engine construction. Fail fast: no partial state.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Errors raised by the external step operation.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("machine {machine}: commanded speed {requested} outside [0, {max}]")]
    SpeedOutOfRange {
        machine: String,
        requested: Fixed64,
        max: Fixed64,
    },
    #[error("no active downtime source; an event-driven gate would never release")]
    NoDowntimeSources,
    #[error("event queue drained without releasing the gate")]
    ClockDrained,
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// Process tokens resumed by the event clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Process {
    /// Fixed-step physical update.
    LineTick,
    /// Control-frequency event.
    ControlTick,
    /// One downtime generator, at its current phase.
    Downtime(DowntimePhase),
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One episode of the manufacturing line.
#[derive(Debug)]
pub struct LineEngine {
    config: LineConfig,
    /// Effective physical time step (config step clamped to the control
    /// frequency).
    dt: SimTime,
    topology: LineTopology,
    machines: SecondaryMap<MachineId, Machine>,
    conveyors: SecondaryMap<ConveyorId, Conveyor>,
    /// Sinks keyed by the line-terminal machine feeding them.
    sinks: SecondaryMap<MachineId, Sink>,
    /// Last externally commanded speed per machine.
    commanded: SecondaryMap<MachineId, Fixed64>,
    clock: EventClock<Process>,
    control_frequency_due: bool,
    downtime_due: bool,
    rng: SimRng,
    tracker: DowntimeTracker,
    estimator: LevelEstimator,
    downtime_history: DowntimeHistory,
    /// Recent gate-release instants, for inter-control delta time.
    control_instants: VecDeque<SimTime>,
    iteration: u64,
    /// Downtime generators still cycling; a generator retires for good when
    /// it finds no eligible machine.
    active_generators: usize,
}

impl LineEngine {
    /// Build a fresh episode: resolve the topology, validate the
    /// configuration against it, construct all entities, register the
    /// background processes, and run one priming pass.
    pub fn new(adjacency: &Adjacency, config: LineConfig) -> Result<Self, BuildError> {
        let topology = LineTopology::resolve(adjacency)?;
        config.validate(topology.machine_count())?;
        let dt = config.effective_time_step();

        let mut machines = SecondaryMap::new();
        let mut commanded = SecondaryMap::new();
        for (i, &m) in topology.machines().iter().enumerate() {
            let params = &config.machines[i];
            machines.insert(m, Machine::new(params.max_speed, params.initial_speed));
            commanded.insert(m, params.initial_speed);
        }

        let mut conveyors = SecondaryMap::new();
        for &c in topology.conveyors() {
            conveyors.insert(c, Conveyor::new(&config));
        }

        let mut sinks = SecondaryMap::new();
        for m in topology.sink_machines() {
            sinks.insert(m, Sink::new());
        }

        // Registration order fixes the deterministic tie-break at coincident
        // instants: the control event fires first, then the physics tick,
        // then any downtime generator scheduled later.
        let mut clock = EventClock::new();
        if config.control_type.releases_on_frequency() {
            clock.schedule(config.control_frequency, Process::ControlTick);
        }
        clock.schedule(dt, Process::LineTick);
        let mut active_generators = 0;
        if config.control_type.downtime_enabled() {
            for _ in 0..config.number_parallel_downtime_events {
                clock.schedule(
                    SimTime::from_num(config.interval_first_down_event),
                    Process::Downtime(DowntimePhase::WarmUp),
                );
            }
            active_generators = config.number_parallel_downtime_events;
        }

        let tracker = DowntimeTracker::new(topology.machine_count());
        let estimator = LevelEstimator::new(&config, topology.conveyor_count());
        let rng = SimRng::new(config.seed);

        let mut control_instants = VecDeque::with_capacity(CONTROL_HISTORY_DEPTH);
        control_instants.extend([SimTime::ZERO; 3]);

        let mut engine = Self {
            config,
            dt,
            topology,
            machines,
            conveyors,
            sinks,
            commanded,
            clock,
            control_frequency_due: false,
            downtime_due: false,
            rng,
            tracker,
            estimator,
            downtime_history: DowntimeHistory::default(),
            control_instants,
            iteration: 0,
            active_generators,
        };
        engine.prime();
        Ok(engine)
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    pub fn topology(&self) -> &LineTopology {
        &self.topology
    }

    /// Current simulated time.
    pub fn env_time(&self) -> SimTime {
        self.clock.now()
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn downtime_history(&self) -> &DowntimeHistory {
        &self.downtime_history
    }

    /// Machine at a line position. Panics on an out-of-range index; tests
    /// and diagnostics only.
    pub fn machine(&self, index: usize) -> &Machine {
        &self.machines[self.topology.machine_at(index)]
    }

    /// Conveyor at a line position.
    pub fn conveyor(&self, index: usize) -> &Conveyor {
        &self.conveyors[self.topology.conveyors()[index]]
    }

    /// True only in an unrecoverable state. The base line design has none;
    /// this is the hook future fault conditions report through.
    pub fn halted(&self) -> bool {
        false
    }

    // -----------------------------------------------------------------------
    // Control synchronization gate
    // -----------------------------------------------------------------------

    /// Submit commanded speeds and advance the clock until the next
    /// control-eligible instant.
    ///
    /// Commands are keyed by machine name; machines missing from the map are
    /// commanded to 0, unknown keys are ignored. All commands are validated
    /// against [0, max] before any state changes.
    pub fn step(&mut self, commands: &BTreeMap<String, Fixed64>) -> Result<(), ControlError> {
        self.iteration += 1;

        let order: Vec<MachineId> = self.topology.machines().to_vec();
        let mut requested = Vec::with_capacity(order.len());
        for &m in &order {
            let name = &self.topology.machine_links(m).name;
            let value = commands.get(name).copied().unwrap_or(Fixed64::ZERO);
            let max = self.machines[m].max_speed();
            if value < Fixed64::ZERO || (value > max && value != Fixed64::ZERO) {
                return Err(ControlError::SpeedOutOfRange {
                    machine: name.clone(),
                    requested: value,
                    max,
                });
            }
            requested.push(value);
        }
        for (&m, &value) in order.iter().zip(&requested) {
            self.commanded[m] = value;
            // Range-checked above; down/idle/startup machines clamp to 0
            // inside the setter.
            let applied = self.machines[m].set_speed(value);
            debug_assert!(applied.is_ok());
        }

        if self.config.control_type == ControlType::DowntimeEvent && self.active_generators == 0 {
            return Err(ControlError::NoDowntimeSources);
        }

        let policy = self.config.control_type;
        loop {
            let Some(wake) = self.clock.step() else {
                return Err(ControlError::ClockDrained);
            };
            self.dispatch(wake);
            let released = (policy.releases_on_frequency() && self.control_frequency_due)
                || (policy.releases_on_downtime() && self.downtime_due);
            if released {
                break;
            }
            if policy == ControlType::DowntimeEvent && self.active_generators == 0 {
                return Err(ControlError::NoDowntimeSources);
            }
        }

        // Consume the flags and record the control instant.
        self.control_frequency_due = false;
        self.downtime_due = false;
        debug!(now = %self.clock.now(), iteration = self.iteration, "control gate released");

        if self.control_instants.len() == CONTROL_HISTORY_DEPTH {
            self.control_instants.pop_front();
        }
        self.control_instants.push_back(self.clock.now());
        for sink in self.sinks.values_mut() {
            sink.record_history();
        }
        Ok(())
    }

    fn dispatch(&mut self, wake: Wake<Process>) {
        match wake.process {
            Process::LineTick => {
                self.run_tick();
                self.clock.schedule(self.dt, Process::LineTick);
            }
            Process::ControlTick => {
                self.control_frequency_due = true;
                self.downtime_due = false;
                trace!(now = %self.clock.now(), "control frequency event");
                self.clock
                    .schedule(self.config.control_frequency, Process::ControlTick);
            }
            Process::Downtime(DowntimePhase::WarmUp | DowntimePhase::Select) => {
                self.fire_downtime();
            }
            Process::Downtime(DowntimePhase::Hold { machine }) => {
                self.recover(machine);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Downtime generator
    // -----------------------------------------------------------------------

    fn fire_downtime(&mut self) {
        // Machines already down or starting up cannot fail again; each
        // generator re-reads the lifecycle states at its own wake, so
        // concurrent generators never double-select.
        let eligible: Vec<(usize, u32)> = self
            .topology
            .machines()
            .iter()
            .enumerate()
            .filter(|&(_, &m)| {
                !matches!(
                    self.machines[m].state(),
                    MachineState::Down | MachineState::Startup
                )
            })
            .map(|(i, _)| (i, self.config.machines[i].downtime_weight))
            .collect();

        let target = select_target(&mut self.rng, self.config.down_machine_index, &eligible);
        let Some(index) = target else {
            self.active_generators -= 1;
            debug!(
                remaining = self.active_generators,
                "no eligible machine, downtime generator retired"
            );
            return;
        };

        let id = self.topology.machine_at(index);
        self.machines[id].set_state(MachineState::Down);
        let duration = sample_duration(&mut self.rng, &self.config.machines[index]);
        self.downtime_history.record(DowntimeEvent {
            at: self.clock.now(),
            machine: index,
            duration,
        });
        self.downtime_due = true;
        self.control_frequency_due = false;
        debug!(machine = index, duration, now = %self.clock.now(), "machine down");
        self.clock.schedule(
            SimTime::from_num(duration),
            Process::Downtime(DowntimePhase::Hold { machine: id }),
        );
    }

    fn recover(&mut self, id: MachineId) {
        let index = self.topology.machine_index(id);
        self.machines[id].set_state(MachineState::Active);
        let applied = self.machines[id].set_speed(self.commanded[id]);
        debug_assert!(applied.is_ok());
        self.downtime_due = true;
        self.control_frequency_due = false;
        debug!(machine = index, now = %self.clock.now(), "machine recovered");
        let interval = sample_interval(&mut self.rng, &self.config);
        self.clock.schedule(
            SimTime::from_num(interval),
            Process::Downtime(DowntimePhase::Select),
        );
    }

    // -----------------------------------------------------------------------
    // Line update
    // -----------------------------------------------------------------------

    /// One priming pass at reset: level accounting, actual-speed clamping,
    /// bin repack, interlock evaluation, tracker refresh. Gives the first
    /// step a consistent pre-tick state to start from.
    fn prime(&mut self) {
        let levels = self.collect_levels();
        self.clamp_actual_speeds(&levels);
        self.repack(&levels);
        self.apply_interlocks();
        self.refresh_trackers();
    }

    /// The five ordered phases of one physical tick, plus snapshot and
    /// estimator upkeep. Order is significant: later phases consume values
    /// computed earlier in the same tick.
    fn run_tick(&mut self) {
        trace!(now = %self.clock.now(), "line tick");
        for conveyor in self.conveyors.values_mut() {
            conveyor.snapshot_previous();
        }
        let levels = self.collect_levels();
        self.apply_interlocks();
        self.clamp_actual_speeds(&levels);
        self.repack(&levels);
        self.accumulate_sinks();
        self.refresh_trackers();
        self.refresh_estimates();
    }

    /// Phase 1: total product per conveyor.
    fn collect_levels(&self) -> SecondaryMap<ConveyorId, Fixed64> {
        let mut levels = SecondaryMap::new();
        for &c in self.topology.conveyors() {
            levels.insert(c, self.conveyors[c].level());
        }
        levels
    }

    /// Phase 2: PLC interlocks and the startup timer.
    ///
    /// An active machine stops when its upstream infeed tap reads empty or
    /// its downstream discharge tap reads full; an idle machine whose
    /// blocking condition cleared enters startup; a machine finishing its
    /// startup delay goes active at its last commanded speed. Down machines
    /// belong to the downtime generator and are left untouched.
    fn apply_interlocks(&mut self) {
        for (i, &m) in self.topology.machines().iter().enumerate() {
            let links = self.topology.machine_links(m);
            match self.machines[m].state() {
                MachineState::Down => continue,
                MachineState::Startup => {
                    let done = self.machines[m]
                        .tick_startup(self.dt, self.config.machines[i].startup_duration);
                    if done {
                        self.machines[m].set_state(MachineState::Active);
                        let applied = self.machines[m].set_speed(self.commanded[m]);
                        debug_assert!(applied.is_ok());
                        trace!(machine = i, "startup complete");
                    }
                    continue;
                }
                MachineState::Active | MachineState::Idle => {}
            }

            // Boundary machines only check the side that exists.
            let starved = links.upstream.is_some_and(|c| {
                self.conveyors[c].infeed_empty(
                    self.config.infeed_offset_primary,
                    self.config.infeed_threshold_primary,
                )
            });
            let blocked = links.downstream.is_some_and(|c| {
                self.conveyors[c].discharge_full(
                    self.config.discharge_index_primary,
                    self.config.discharge_threshold_primary,
                )
            });

            match self.machines[m].state() {
                MachineState::Active if starved || blocked => {
                    self.machines[m].set_state(MachineState::Idle);
                    trace!(machine = i, starved, blocked, "interlock idled machine");
                }
                MachineState::Idle if !starved && !blocked => {
                    self.machines[m].set_state(MachineState::Startup);
                    trace!(machine = i, "interlock cleared, machine starting up");
                }
                _ => {}
            }
        }
    }

    /// Phase 3: clamp each active machine's commanded speed against upstream
    /// availability and downstream free capacity. The clamped value is the
    /// actual speed; non-active machines already sit at 0.
    fn clamp_actual_speeds(&mut self, levels: &SecondaryMap<ConveyorId, Fixed64>) {
        let capacity = self.config.conveyor_capacity();
        for &m in self.topology.machines() {
            if self.machines[m].state() != MachineState::Active {
                continue;
            }
            let links = self.topology.machine_links(m);
            let mut limit = self.commanded[m];
            if let Some(c) = links.upstream {
                limit = limit.min(levels[c]);
            }
            if let Some(c) = links.downstream {
                limit = limit.min(capacity - levels[c]);
            }
            self.machines[m].apply_actual(limit.max(Fixed64::ZERO));
        }
    }

    /// Phase 4: apply each conveyor's net flow and repack its bins toward
    /// the draw end.
    fn repack(&mut self, levels: &SecondaryMap<ConveyorId, Fixed64>) {
        for &c in self.topology.conveyors() {
            let links = self.topology.conveyor_links(c);
            let inflow = self.machines[links.feeder].speed();
            let outflow = self.machines[links.drainer].speed();
            let total = levels[c] + (inflow - outflow) * self.dt;
            self.conveyors[c].pack(total.max(Fixed64::ZERO));
        }
    }

    /// Phase 5: product leaving a line-terminal machine lands in its sink.
    fn accumulate_sinks(&mut self) {
        for (m, sink) in &mut self.sinks {
            sink.accumulate(self.machines[m].speed() * self.dt);
        }
    }

    fn refresh_trackers(&mut self) {
        for (i, &m) in self.topology.machines().iter().enumerate() {
            let is_down = self.machines[m].state() == MachineState::Down;
            self.tracker
                .refresh(i, is_down, &self.config.machines[i], self.dt);
        }
    }

    fn refresh_estimates(&mut self) {
        for (i, &c) in self.topology.conveyors().iter().enumerate() {
            let links = self.topology.conveyor_links(c);
            let inflow = self.machines[links.feeder].speed();
            let outflow = self.machines[links.drainer].speed();
            self.estimator
                .refresh(i, &self.conveyors[c], inflow, outflow, self.dt);
        }
    }

    // -----------------------------------------------------------------------
    // State snapshot
    // -----------------------------------------------------------------------

    /// Build the immutable state snapshot for the current instant.
    pub fn states(&self) -> LineState {
        let machine_order = self.topology.machines();
        let conveyor_order = self.topology.conveyors();

        let mut machine_states = Vec::with_capacity(machine_order.len());
        let mut machine_actual_speeds = Vec::with_capacity(machine_order.len());
        let mut machine_commanded_speeds = Vec::with_capacity(machine_order.len());
        let mut illegal_machine_actions = Vec::with_capacity(machine_order.len());
        for &m in machine_order {
            let machine = &self.machines[m];
            machine_states.push(machine.state().code());
            machine_actual_speeds.push(machine.speed());
            machine_commanded_speeds.push(self.commanded[m]);
            illegal_machine_actions.push(machine.speed() != self.commanded[m]);
        }

        let mut conveyor_speeds = Vec::with_capacity(conveyor_order.len());
        let mut conveyor_states = Vec::with_capacity(conveyor_order.len());
        let mut conveyor_buffers = Vec::with_capacity(conveyor_order.len());
        let mut conveyor_buffers_full = Vec::with_capacity(conveyor_order.len());
        let mut conveyor_levels = Vec::with_capacity(conveyor_order.len());
        let mut conveyor_previous_levels = Vec::with_capacity(conveyor_order.len());
        let mut infeed_primary_empty = Vec::with_capacity(conveyor_order.len());
        let mut infeed_secondary_empty = Vec::with_capacity(conveyor_order.len());
        let mut discharge_primary_full = Vec::with_capacity(conveyor_order.len());
        let mut discharge_secondary_full = Vec::with_capacity(conveyor_order.len());
        let mut previous_infeed_primary_empty = Vec::with_capacity(conveyor_order.len());
        let mut previous_infeed_secondary_empty = Vec::with_capacity(conveyor_order.len());
        let mut previous_discharge_primary_full = Vec::with_capacity(conveyor_order.len());
        let mut previous_discharge_secondary_full = Vec::with_capacity(conveyor_order.len());
        for &c in conveyor_order {
            let conveyor = &self.conveyors[c];
            conveyor_speeds.push(conveyor.speed());
            conveyor_states.push(conveyor.state().code());
            conveyor_buffers.push(conveyor.bins().to_vec());
            conveyor_buffers_full.push(
                conveyor
                    .bins()
                    .iter()
                    .map(|&level| level == conveyor.bin_capacity())
                    .collect(),
            );
            conveyor_levels.push(conveyor.level());
            conveyor_previous_levels.push(conveyor.previous_level());
            infeed_primary_empty.push(conveyor.infeed_empty(
                self.config.infeed_offset_primary,
                self.config.infeed_threshold_primary,
            ));
            infeed_secondary_empty.push(conveyor.infeed_empty(
                self.config.infeed_offset_secondary,
                self.config.infeed_threshold_secondary,
            ));
            discharge_primary_full.push(conveyor.discharge_full(
                self.config.discharge_index_primary,
                self.config.discharge_threshold_primary,
            ));
            discharge_secondary_full.push(conveyor.discharge_full(
                self.config.discharge_index_secondary,
                self.config.discharge_threshold_secondary,
            ));
            previous_infeed_primary_empty.push(conveyor.previous_infeed_empty(
                self.config.infeed_offset_primary,
                self.config.infeed_threshold_primary,
            ));
            previous_infeed_secondary_empty.push(conveyor.previous_infeed_empty(
                self.config.infeed_offset_secondary,
                self.config.infeed_threshold_secondary,
            ));
            previous_discharge_primary_full.push(conveyor.previous_discharge_full(
                self.config.discharge_index_primary,
                self.config.discharge_threshold_primary,
            ));
            previous_discharge_secondary_full.push(conveyor.previous_discharge_full(
                self.config.discharge_index_secondary,
                self.config.discharge_threshold_secondary,
            ));
        }

        let mut sink_machine_rates = Vec::new();
        let mut sink_throughput_delta = Vec::new();
        let mut sink_throughput_absolute_sum = Fixed64::ZERO;
        for m in self.topology.sink_machines() {
            sink_machine_rates.push(self.machines[m].speed());
            let sink = &self.sinks[m];
            sink_throughput_delta.push(sink.throughput_delta());
            sink_throughput_absolute_sum += sink.throughput_absolute();
        }
        let sink_machine_rate_sum = sink_machine_rates.iter().copied().sum();
        let sink_throughput_delta_sum = sink_throughput_delta.iter().copied().sum();

        let control_delta_t = {
            let mut iter = self.control_instants.iter().rev();
            match (iter.next(), iter.next()) {
                (Some(&last), Some(&prev)) => last - prev,
                _ => SimTime::ZERO,
            }
        };

        LineState {
            iteration_count: self.iteration,
            env_time: self.clock.now(),
            control_delta_t,
            machine_states,
            machine_actual_speeds,
            machine_commanded_speeds,
            illegal_machine_actions,
            conveyor_speeds,
            conveyor_states,
            conveyor_buffers,
            conveyor_buffers_full,
            conveyor_levels,
            conveyor_previous_levels,
            conveyor_level_estimates: self.estimator.estimates().to_vec(),
            infeed_primary_empty,
            infeed_secondary_empty,
            discharge_primary_full,
            discharge_secondary_full,
            previous_infeed_primary_empty,
            previous_infeed_secondary_empty,
            previous_discharge_primary_full,
            previous_discharge_secondary_full,
            sink_machine_rates,
            sink_machine_rate_sum,
            sink_throughput_delta,
            sink_throughput_delta_sum,
            sink_throughput_absolute_sum,
            mean_downtime_offsets: self.tracker.mean_offsets().to_vec(),
            max_downtime_offsets: self.tracker.max_offsets().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::serial;

    fn fx(v: i64) -> Fixed64 {
        Fixed64::from_num(v)
    }

    fn no_downtime_config() -> LineConfig {
        LineConfig {
            control_type: ControlType::FixedFrequencyNoDowntime,
            ..LineConfig::default()
        }
    }

    fn commands(speeds: &[(&str, i64)]) -> BTreeMap<String, Fixed64> {
        speeds
            .iter()
            .map(|&(name, v)| (name.to_owned(), fx(v)))
            .collect()
    }

    fn initial_commands(engine: &LineEngine) -> BTreeMap<String, Fixed64> {
        engine
            .topology()
            .machines()
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                (
                    engine.topology().machine_links(m).name.clone(),
                    engine.config().machines[i].initial_speed,
                )
            })
            .collect()
    }

    #[test]
    fn priming_leaves_machines_active() {
        let engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        for i in 0..6 {
            assert_eq!(engine.machine(i).state(), MachineState::Active, "machine {i}");
        }
        // The priming repack concentrated product at the draw end.
        assert_eq!(engine.conveyor(0).bin(9), fx(100));
        assert_eq!(engine.conveyor(0).bin(0), fx(0));
    }

    #[test]
    fn fixed_frequency_steps_advance_exactly_one_interval() {
        let mut engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        let actions = initial_commands(&engine);
        let mut previous = engine.env_time();
        for _ in 0..10 {
            engine.step(&actions).unwrap();
            let now = engine.env_time();
            assert_eq!(now - previous, engine.config().control_frequency);
            previous = now;
        }
    }

    #[test]
    fn all_stop_yields_idle_machines_and_frozen_bins() {
        let mut config = no_downtime_config();
        config.initial_bin_level = fx(50);
        for params in &mut config.machines {
            params.initial_speed = params.max_speed;
        }
        let mut engine = LineEngine::new(&serial(6), config).unwrap();
        let bins_before: Vec<Vec<Fixed64>> =
            (0..5).map(|i| engine.conveyor(i).bins().to_vec()).collect();

        engine.step(&BTreeMap::new()).unwrap();

        let state = engine.states();
        assert!(state.machine_states.iter().all(|&s| s == 0), "{:?}", state.machine_states);
        for (i, before) in bins_before.iter().enumerate() {
            assert_eq!(engine.conveyor(i).bins(), &before[..], "conveyor {i}");
        }
        assert_eq!(state.sink_throughput_delta_sum, Fixed64::ZERO);
    }

    #[test]
    fn conservation_across_steps() {
        let mut engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        let cruise = initial_commands(&engine);
        let flood: BTreeMap<String, Fixed64> = engine
            .topology()
            .machines()
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                (
                    engine.topology().machine_links(m).name.clone(),
                    engine.config().machines[i].max_speed,
                )
            })
            .collect();
        let capacity = engine.config().conveyor_capacity();
        let dt = engine.config().effective_time_step();

        // The first release precedes the first physics tick; every later
        // step runs exactly one tick whose clamped speeds the snapshot
        // reports.
        engine.step(&cruise).unwrap();
        for step in 0..60 {
            // Alternate cruising and flooding so buffers fill, drain, and
            // trip the interlocks.
            let actions = if step % 7 < 4 { &cruise } else { &flood };
            let levels_before: Vec<Fixed64> =
                (0..5).map(|i| engine.conveyor(i).level()).collect();
            engine.step(actions).unwrap();

            let state = engine.states();
            let topology = engine.topology();
            for (i, &c) in topology.conveyors().iter().enumerate() {
                let links = topology.conveyor_links(c);
                let inflow =
                    state.machine_actual_speeds[topology.machine_index(links.feeder)];
                let outflow =
                    state.machine_actual_speeds[topology.machine_index(links.drainer)];
                let expected = (levels_before[i] + (inflow - outflow) * dt)
                    .max(Fixed64::ZERO)
                    .min(capacity);
                assert_eq!(
                    state.conveyor_levels[i], expected,
                    "conveyor {i} balance at step {step}"
                );
            }
        }
    }

    #[test]
    fn speed_state_invariant_holds_throughout() {
        let mut engine = LineEngine::new(&serial(6), LineConfig::default()).unwrap();
        let actions = initial_commands(&engine);
        for _ in 0..100 {
            engine.step(&actions).unwrap();
            let state = engine.states();
            for (code, &speed) in state
                .machine_states
                .iter()
                .zip(&state.machine_actual_speeds)
            {
                if speed > Fixed64::ZERO {
                    assert_eq!(*code, 1, "speed {speed} with state {code}");
                }
                if *code != 1 {
                    assert_eq!(speed, Fixed64::ZERO);
                }
            }
        }
    }

    #[test]
    fn forced_down_machine_is_uncommandable() {
        let mut config = LineConfig::default();
        config.control_type = ControlType::Either;
        config.down_machine_index = Some(2);
        config.interval_first_down_event = 1;
        let mut engine = LineEngine::new(&serial(6), config).unwrap();
        let actions = initial_commands(&engine);

        // Step until the forced failure lands.
        for _ in 0..10 {
            engine.step(&actions).unwrap();
            if engine.machine(2).state() == MachineState::Down {
                break;
            }
        }
        assert_eq!(engine.machine(2).state(), MachineState::Down);

        // The minimum outage is mean - dev = 5 seconds, so the step right
        // after the failure still finds the machine down.
        engine.step(&commands(&[("m2", 100)])).unwrap();
        let state = engine.states();
        assert_eq!(state.machine_states[2], -1);
        assert_eq!(state.machine_actual_speeds[2], Fixed64::ZERO);
        assert!(state.illegal_machine_actions[2]);
    }

    #[test]
    fn startup_delay_holds_machine_at_zero() {
        let mut engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        // Stop everything, then command speeds again: the idle machines must
        // pass through startup and hold speed 0 for their configured delay.
        engine.step(&BTreeMap::new()).unwrap();
        assert_eq!(engine.machine(0).state(), MachineState::Idle);

        let actions = initial_commands(&engine);
        let startup_duration = engine.config().machines[0].startup_duration;
        let mut entered_startup = None;
        let mut went_active = None;
        for step in 0..30u32 {
            engine.step(&actions).unwrap();
            match engine.machine(0).state() {
                MachineState::Startup if entered_startup.is_none() => {
                    entered_startup = Some(step);
                }
                MachineState::Active => {
                    went_active = Some(step);
                    break;
                }
                _ => {}
            }
            assert_eq!(engine.machine(0).speed(), Fixed64::ZERO, "step {step}");
        }

        let entered = entered_startup.expect("machine never entered startup");
        let active = went_active.expect("machine never returned to active");
        let held = SimTime::from_num(active - entered);
        assert!(held >= startup_duration, "held {held} < {startup_duration}");
        // The last commanded speed is re-applied on exit from startup.
        assert_eq!(engine.machine(0).speed(), engine.config().machines[0].initial_speed);
    }

    #[test]
    fn downtime_gate_without_sources_errors() {
        let mut config = LineConfig::default();
        config.control_type = ControlType::DowntimeEvent;
        config.number_parallel_downtime_events = 0;
        let mut engine = LineEngine::new(&serial(6), config).unwrap();
        assert!(matches!(
            engine.step(&BTreeMap::new()),
            Err(ControlError::NoDowntimeSources)
        ));
    }

    #[test]
    fn command_above_max_rejected_before_any_mutation() {
        let mut engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        let before = engine.states();
        let err = engine.step(&commands(&[("m0", 5_000)])).unwrap_err();
        assert!(matches!(err, ControlError::SpeedOutOfRange { .. }));
        // Time did not advance.
        assert_eq!(engine.env_time(), before.env_time);
    }

    #[test]
    fn event_driven_gate_releases_on_downtime_transitions() {
        let mut config = LineConfig::default();
        config.control_type = ControlType::DowntimeEvent;
        config.number_parallel_downtime_events = 1;
        config.interval_first_down_event = 7;
        let mut engine = LineEngine::new(&serial(6), config).unwrap();
        let actions = initial_commands(&engine);

        engine.step(&actions).unwrap();
        // First release is the warm-up failure.
        assert_eq!(engine.env_time(), SimTime::from_num(7));
        let failure = engine.downtime_history().last().unwrap().clone();

        engine.step(&actions).unwrap();
        // Second release is that machine's recovery.
        assert_eq!(
            engine.env_time(),
            SimTime::from_num(7 + i64::from(failure.duration))
        );
        assert_ne!(engine.machine(failure.machine).state(), MachineState::Down);
    }

    #[test]
    fn illegal_flags_track_actual_vs_commanded() {
        let mut engine = LineEngine::new(&serial(6), no_downtime_config()).unwrap();
        let actions = initial_commands(&engine);
        for _ in 0..30 {
            engine.step(&actions).unwrap();
            let state = engine.states();
            for i in 0..6 {
                let expected =
                    state.machine_actual_speeds[i] != state.machine_commanded_speeds[i];
                assert_eq!(state.illegal_machine_actions[i], expected, "machine {i}");
            }
        }
    }
}
