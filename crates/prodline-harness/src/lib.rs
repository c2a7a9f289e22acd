//! Controller-facing harness for the production-line engine.
//!
//! Wraps `prodline-core` in the episode protocol an external stepping
//! controller speaks: load a scenario from JSON, start an episode, apply
//! one command set per control instant, read back a full observation, and
//! optionally log every step to CSV.
//!
//! # Usage
//!
//! ```rust,ignore
//! use prodline_harness::{EpisodeSession, Scenario};
//!
//! let scenario = Scenario::from_file("scenarios/baseline.json".as_ref())?;
//! let mut session = EpisodeSession::new();
//! let mut state = session.episode_start(&scenario)?;
//! for _ in 0..100 {
//!     state = session.episode_step(&commands)?;
//! }
//! ```

pub mod error;
pub mod logger;
pub mod scenario;
pub mod session;

pub use error::HarnessError;
pub use logger::EpisodeLogger;
pub use scenario::Scenario;
pub use session::EpisodeSession;
