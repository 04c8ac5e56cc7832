//! Error types for ptaflow

use thiserror::Error;

/// ptaflow error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Program construction error: {0}")]
    Builder(String),

    #[error("split point {at} outside block {block} (instructions {begin}..{end})")]
    SplitOutOfRange {
        block: String,
        at: u32,
        begin: u32,
        end: u32,
    },

    #[error("call instruction {inst} is not the last instruction of block {block}")]
    CallNotAtBlockEnd { block: String, inst: u32 },

    #[error("function '{0}' has no body")]
    MissingBody(String),

    #[error("function '{0}' has no designated exit block")]
    NoExitBlock(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Unknown value: {0}")]
    UnknownValue(String),

    #[error("block visit limit of {0} exceeded before reaching a fixed point")]
    VisitLimitExceeded(usize),

    #[error("Unsupported: {0}")]
    Unsupported(&'static str),
}

/// Result type alias for ptaflow
pub type Result<T> = std::result::Result<T, Error>;
