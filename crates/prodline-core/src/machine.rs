//! Machine component: speed and lifecycle state, coupled through setters.
//!
//! Coupling the two through setters centralizes the invariant that a machine
//! which is down, idle, or starting up moves no product, so call sites never
//! re-check it.

use crate::fixed::{Fixed64, SimTime};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised by the speed setter contract.
#[derive(Debug, thiserror::Error)]
pub enum SpeedError {
    #[error("speed {requested} outside [0, {max}]")]
    OutOfRange { requested: Fixed64, max: Fixed64 },
}

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Machine lifecycle state.
///
/// Idle means the PLC stopped the machine because a neighboring conveyor is
/// overloaded or underloaded. Down means a failure injected by the downtime
/// generator. Startup is the restart delay between idle and active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MachineState {
    Active,
    Idle,
    Down,
    Startup,
}

impl MachineState {
    /// Integer encoding used in state snapshots: active=1, idle=0, down=-1,
    /// startup=2.
    pub fn code(self) -> i32 {
        match self {
            Self::Active => 1,
            Self::Idle => 0,
            Self::Down => -1,
            Self::Startup => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Machine
// ---------------------------------------------------------------------------

/// One machine of the line.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Machine {
    max_speed: Fixed64,
    speed: Fixed64,
    state: MachineState,
    /// Seconds spent in the current startup phase.
    startup_elapsed: SimTime,
}

impl Machine {
    /// A machine at its initial speed: idle if 0, active otherwise.
    pub fn new(max_speed: Fixed64, initial_speed: Fixed64) -> Self {
        let state = if initial_speed == Fixed64::ZERO {
            MachineState::Idle
        } else {
            MachineState::Active
        };
        Self {
            max_speed,
            speed: initial_speed,
            state,
            startup_elapsed: SimTime::ZERO,
        }
    }

    pub fn speed(&self) -> Fixed64 {
        self.speed
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn max_speed(&self) -> Fixed64 {
        self.max_speed
    }

    /// Command a target speed.
    ///
    /// Values outside [0, max_speed] (other than exactly 0) are rejected.
    /// A down, idle, or starting-up machine silently keeps speed 0 whatever
    /// was requested. Otherwise 0 sends the machine idle and a positive
    /// value makes it active at that speed.
    pub fn set_speed(&mut self, value: Fixed64) -> Result<(), SpeedError> {
        if value < Fixed64::ZERO || (value > self.max_speed && value != Fixed64::ZERO) {
            return Err(SpeedError::OutOfRange {
                requested: value,
                max: self.max_speed,
            });
        }
        match self.state {
            MachineState::Down | MachineState::Idle | MachineState::Startup => {
                self.speed = Fixed64::ZERO;
            }
            MachineState::Active => {
                if value == Fixed64::ZERO {
                    self.set_state(MachineState::Idle);
                } else {
                    self.speed = value;
                }
            }
        }
        Ok(())
    }

    /// Force a lifecycle state. Entering any non-active state zeroes the
    /// speed; entering startup also restarts the startup timer.
    pub fn set_state(&mut self, state: MachineState) {
        self.state = state;
        match state {
            MachineState::Down | MachineState::Idle => {
                self.speed = Fixed64::ZERO;
            }
            MachineState::Startup => {
                self.speed = Fixed64::ZERO;
                self.startup_elapsed = SimTime::ZERO;
            }
            MachineState::Active => {}
        }
    }

    /// Write the buffer-clamped actual speed. Bypasses the state coupling:
    /// only valid for an active machine, and the engine's clamping phase is
    /// the only caller.
    pub fn apply_actual(&mut self, value: Fixed64) {
        debug_assert_eq!(self.state, MachineState::Active);
        self.speed = value;
    }

    /// Advance the startup timer by one tick. Returns true once the
    /// configured duration has elapsed and the machine may go active.
    pub fn tick_startup(&mut self, dt: SimTime, duration: SimTime) -> bool {
        debug_assert_eq!(self.state, MachineState::Startup);
        self.startup_elapsed += dt;
        self.startup_elapsed >= duration
    }
}
