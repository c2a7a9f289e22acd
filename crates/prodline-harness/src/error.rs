use std::path::PathBuf;

/// Errors that can occur in the episode harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// No episode has been started yet.
    #[error("no active episode; call episode_start first")]
    NoActiveEpisode,

    /// Failed to parse a scenario file.
    #[error("scenario parse error in {file}: {source}")]
    ScenarioParse {
        file: PathBuf,
        source: serde_json::Error,
    },

    /// The scenario's configuration or topology was rejected by the engine.
    #[error(transparent)]
    Build(#[from] prodline_core::BuildError),

    /// A step was rejected by the engine.
    #[error(transparent)]
    Control(#[from] prodline_core::ControlError),

    /// CSV logging failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
