use std::time::Duration;

use thiserror::Error;

use crate::model::ModelError;

/// Runtime errors.
///
/// Only `Connection` is meant to end a conversation; the orchestration
/// loops fold every other kind back into the transcript.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The tool host cannot be started or reached.
    #[error("cannot reach tool host: {0}")]
    Connection(String),

    /// The tool host answered with something that is not valid MCP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The tool ran and reported a failure.
    #[error("tool error: {0}")]
    Tool(String),

    /// No answer arrived within the bounded wait.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Invalid runtime settings, such as a backend without credentials.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, Error>;
