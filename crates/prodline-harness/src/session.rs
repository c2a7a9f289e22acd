//! Episode lifecycle for an external stepping controller.
//!
//! A session owns at most one live engine. `episode_start` builds a fresh
//! engine from a scenario and returns the initial observation;
//! `episode_step` forwards one command set and returns the observation at
//! the next control instant. Stepping without a live episode is an error,
//! not a panic.

use std::collections::BTreeMap;

use prodline_core::fixed::f64_to_fixed64;
use prodline_core::{LineEngine, LineState};

use crate::error::HarnessError;
use crate::scenario::Scenario;

/// One controller-facing simulation session.
#[derive(Debug, Default)]
pub struct EpisodeSession {
    engine: Option<LineEngine>,
    episodes_started: u64,
}

impl EpisodeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of episodes started over the session's lifetime.
    pub fn episodes_started(&self) -> u64 {
        self.episodes_started
    }

    /// Whether an episode is currently live.
    pub fn is_active(&self) -> bool {
        self.engine.is_some()
    }

    /// Start a fresh episode, discarding any previous one, and return the
    /// initial observation.
    pub fn episode_start(&mut self, scenario: &Scenario) -> Result<LineState, HarnessError> {
        let engine = scenario.build_engine()?;
        self.episodes_started += 1;
        let state = engine.states();
        tracing::info!(
            episode = self.episodes_started,
            machines = engine.topology().machine_count(),
            "episode started"
        );
        self.engine = Some(engine);
        Ok(state)
    }

    /// Apply one command set, run the engine to the next control instant,
    /// and return the resulting observation. Commands are plain numbers
    /// keyed by machine name.
    pub fn episode_step(
        &mut self,
        commands: &BTreeMap<String, f64>,
    ) -> Result<LineState, HarnessError> {
        let engine = self.engine.as_mut().ok_or(HarnessError::NoActiveEpisode)?;
        let commands: BTreeMap<String, _> = commands
            .iter()
            .map(|(name, speed)| (name.clone(), f64_to_fixed64(*speed)))
            .collect();
        engine.step(&commands)?;
        Ok(engine.states())
    }

    /// Current observation without advancing time.
    pub fn state(&self) -> Result<LineState, HarnessError> {
        let engine = self.engine.as_ref().ok_or(HarnessError::NoActiveEpisode)?;
        Ok(engine.states())
    }

    /// Whether the live episode has reached a terminal condition. The line
    /// itself never terminates; episode length is the controller's choice.
    pub fn halted(&self) -> Result<bool, HarnessError> {
        let engine = self.engine.as_ref().ok_or(HarnessError::NoActiveEpisode)?;
        Ok(engine.halted())
    }

    /// Direct access to the live engine, if any.
    pub fn engine(&self) -> Option<&LineEngine> {
        self.engine.as_ref()
    }

    /// End the live episode, if any.
    pub fn episode_end(&mut self) {
        if self.engine.take().is_some() {
            tracing::info!(episode = self.episodes_started, "episode ended");
        }
    }
}
