//! `rulesift.toml` loading.
//!
//! ```toml
//! sort = "combined"
//! jobs = 8
//! infer = ["known-bits", "non-zero"]
//!
//! [stages]
//! weaken = true
//! merge = true
//!
//! [oracle]
//! command = "souper-check"
//! args = ["-solver-timeout=15"]
//! timeout-secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::oracle::InferenceMode;
use crate::pipeline::Options;
use crate::rank::RankBy;
use crate::tools::ToolCommand;

/// File name searched for next to the cache snapshot.
pub const CONFIG_FILE: &str = "rulesift.toml";
pub const DEFAULT_ORACLE: &str = "souper-check";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One external program.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct ToolConfig {
    pub command: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ToolConfig {
    pub fn named(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn command(&self) -> ToolCommand {
        ToolCommand::new(self.command.clone(), self.args.clone(), self.timeout())
    }

    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("[{}] command is empty", section)));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "[{}] timeout-secs must be positive",
                section
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct StageConfig {
    pub verify: bool,
    pub reduce: bool,
    pub triage: bool,
    pub weaken: bool,
    pub merge: bool,
    pub ensure_all_parse: bool,
    pub dump_non_optimizations: bool,
}

/// Everything a run can be configured with.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    pub sort: RankBy,
    pub jobs: usize,
    pub infer: Vec<InferenceMode>,
    pub stages: StageConfig,
    pub oracle: ToolConfig,
    pub reducer: Option<ToolConfig>,
    pub triage: Option<ToolConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sort: RankBy::default(),
            jobs: 0,
            infer: Vec::new(),
            stages: StageConfig::default(),
            oracle: ToolConfig::named(DEFAULT_ORACLE),
            reducer: None,
            triage: None,
        }
    }
}

impl Config {
    /// Parse and validate a config file's text. `origin` names it in errors.
    pub fn parse(text: &str, origin: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Find `rulesift.toml` in `start_dir` or one of its ancestors.
    pub fn find(start_dir: &Path) -> Option<PathBuf> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            if !dir.pop() {
                return None;
            }
        }
    }

    /// Load `explicit` if given, else the nearest config above `cache`,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>, cache: &Path) -> Result<Config, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let start = match cache.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        match Self::find(&start) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "using config file");
                Self::load(&path)
            }
            None => Ok(Config::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.oracle.validate("oracle")?;
        if let Some(reducer) = &self.reducer {
            reducer.validate("reducer")?;
        }
        if let Some(triage) = &self.triage {
            triage.validate("triage")?;
        }
        Ok(())
    }

    /// Apply one timeout to every tool.
    pub fn set_timeout(&mut self, secs: u64) {
        self.oracle.timeout_secs = secs;
        for tool in [&mut self.reducer, &mut self.triage].into_iter().flatten() {
            tool.timeout_secs = secs;
        }
    }

    pub fn options(&self) -> Options {
        Options {
            dump_non_optimizations: self.stages.dump_non_optimizations,
            verify: self.stages.verify,
            reduce: self.stages.reduce,
            triage: self.stages.triage,
            weaken: self.stages.weaken,
            merge: self.stages.merge,
            ensure_all_parse: self.stages.ensure_all_parse,
            infer: self.infer.clone(),
            sort: self.sort,
            jobs: self.jobs,
        }
    }
}
