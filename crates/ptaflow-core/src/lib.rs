//! ptaflow Core
//!
//! Program model, configuration and error types shared by the ptaflow
//! analysis engine and its command-line front end.
//!
//! ## Modules
//!
//! - `program` - Function/block/instruction arena with splittable blocks
//! - `builder` - Incremental construction of a [`Program`]
//! - `desc` - YAML/JSON program descriptions
//! - `config` - Analysis configuration

pub mod builder;
pub mod config;
pub mod desc;
pub mod error;
pub mod program;

pub use builder::ProgramBuilder;
pub use config::{AnalysisConfig, Config, LoadMode};
pub use error::{Error, Result};
pub use program::*;
