//! Configuration types

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ptaflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Function analyzed when no entry is given on the command line
    pub entry: Option<String>,

    /// Analysis configuration
    pub analysis: AnalysisConfig,
}

impl Config {
    /// Load a configuration file.
    ///
    /// `.yaml`/`.yml` files are read as YAML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
            _ => serde_json::from_str(&text)?,
        };
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Check the configuration for values the analysis cannot use
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()
    }
}

/// How a load `r = *p` computes the points-to set of `r`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Union of `pts(o)` for every `o` in `pts(p)`
    #[default]
    Dereference,
    /// `pts(p)` itself: `p` is read as a memory cell whose content a store redefined
    Contents,
}

/// Analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Names of allocation primitives; calls to them are reported but not followed
    pub allocators: Vec<String>,

    /// Regex matching intrinsic function names (ignored by the analysis)
    pub intrinsic_pattern: String,

    /// Load semantics
    pub load_mode: LoadMode,

    /// Abort after this many block visits in one fixpoint run
    pub max_block_visits: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            allocators: vec!["malloc".into()],
            intrinsic_pattern: r"^llvm\.".into(),
            load_mode: LoadMode::default(),
            max_block_visits: None,
        }
    }
}

impl AnalysisConfig {
    /// Compile the intrinsic pattern
    pub fn intrinsic_regex(&self) -> Result<Regex> {
        Regex::new(&self.intrinsic_pattern)
            .map_err(|e| Error::Config(format!("invalid intrinsic_pattern: {}", e)))
    }

    /// Reject values the analysis cannot use
    pub fn validate(&self) -> Result<()> {
        self.intrinsic_regex()?;
        if self.allocators.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::Config("allocator names must not be empty".into()));
        }
        if self.max_block_visits == Some(0) {
            return Err(Error::Config("max_block_visits must be positive".into()));
        }
        Ok(())
    }
}
