//! Error types for Parley.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid agent id: {0}")]
    InvalidAgentId(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Agent already hosted: {0}")]
    AgentExists(String),

    #[error("Dispatch loop is closed")]
    DispatchClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}
