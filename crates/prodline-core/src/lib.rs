//! Prodline Core -- discrete-event simulation of a multi-machine
//! manufacturing line.
//!
//! Machines produce at controllable speeds, intermediate product accumulates
//! on conveyors discretized into bins, and an external controller adjusts
//! machine speeds at scheduled control points. The crate covers the event
//! scheduler, the per-tick line update, PLC-style interlocks, downtime
//! injection, and the control-synchronization gate that blocks an external
//! stepping caller until a control-worthy event occurs.
//!
//! # Five-Phase Tick
//!
//! Each fired line tick advances the physical state through ordered phases:
//!
//! 1. **Level accounting** -- Sum each conveyor's bins.
//! 2. **Interlocks** -- PLC rules and the startup timer move machines
//!    between active, idle, and startup.
//! 3. **Speed clamping** -- Commanded speeds are clamped against upstream
//!    availability and downstream free capacity.
//! 4. **Bin repack** -- Net flow is applied and bins refill from the draw
//!    end toward the receiving end.
//! 5. **Sink accumulation** -- Line-terminal machines deposit product.
//!
//! # Control Synchronization
//!
//! [`engine::LineEngine::step`] writes commanded speeds and single-steps the
//! event clock until the gate condition of the configured
//! [`config::ControlType`] holds, then the caller queries
//! [`engine::LineEngine::states`].
//!
//! # Key Types
//!
//! - [`engine::LineEngine`] -- Owns one episode: entities, clock, processes.
//! - [`topology::LineTopology`] -- Resolved machine/conveyor adjacency.
//! - [`config::LineConfig`] -- Immutable per-episode configuration.
//! - [`clock::EventClock`] -- FIFO-tie-broken priority-queue scheduler.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

pub mod clock;
pub mod config;
pub mod conveyor;
pub mod downtime;
pub mod engine;
pub mod estimator;
pub mod fixed;
pub mod id;
pub mod machine;
pub mod query;
pub mod rng;
pub mod sink;
pub mod topology;

pub use config::{ConfigError, ControlType, LineConfig, MachineParams};
pub use engine::{BuildError, ControlError, LineEngine};
pub use fixed::{Fixed64, SimTime};
pub use machine::MachineState;
pub use query::LineState;
pub use topology::{Adjacency, Link, LineTopology, TopologyError, serial};
