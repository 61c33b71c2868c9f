use std::{io, path::PathBuf};

use thiserror::Error;

use crate::service::ServiceError;

/// Errors that prevent a run from starting.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn thread for {name}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{name} failed to start")]
    Startup {
        name: String,
        #[source]
        source: ServiceError,
    },
}

/// Errors loading a [`RunnerConfig`](crate::runner::RunnerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid runner config")]
    Parse(#[from] serde_json::Error),
}
