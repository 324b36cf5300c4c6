use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PacerError>;

#[derive(Debug, Error)]
pub enum PacerError {
    /// Container limit was requested but no limit source could be read.
    #[error("failed to read container memory limit: {0}")]
    LimitSource(#[source] io::Error),
    #[error("failed to query total physical memory: {0}")]
    TotalMemory(#[source] io::Error),
    #[error("no tuning parameter has been stored")]
    MissingParameter,
    #[error("invalid tuning parameter: {reason}")]
    InvalidParameter { reason: String },
    #[error("failed to spawn background task `{name}`: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: io::Error,
    },
}
