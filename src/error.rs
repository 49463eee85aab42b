use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("failed to run {command}: {source}")]
    Command {
        command: String,
        source:  io::Error,
    },

    #[error("{command} did not exit within {timeout:?}")]
    Timeout {
        command: String,
        timeout: Duration,
    },

    #[error("geolocation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid json: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("marker table {}: {source}", path.display())]
    Persistence {
        path:   PathBuf,
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}
