//! In-process oracles for tests.

use std::sync::Mutex;

use super::{InferenceMode, Oracle, OracleError, OracleMode, Verdict};

/// Accepts a pattern exactly when it still contains every required
/// fragment, answering with a fixed replacement. Every query is logged.
pub(crate) struct FragmentOracle {
    required: Vec<String>,
    replacement: String,
    pub(crate) log: Mutex<Vec<String>>,
}

impl FragmentOracle {
    pub(crate) fn new(required: &[&str], replacement: &str) -> Self {
        Self {
            required: required.iter().map(|s| s.to_string()).collect(),
            replacement: replacement.to_string(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl Oracle for FragmentOracle {
    fn verify(&self, pattern: &str, mode: OracleMode) -> Result<Verdict, OracleError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(pattern.to_string());
        }
        if !self.required.iter().all(|f| pattern.contains(f.as_str())) {
            return Ok(Verdict::reject());
        }
        Ok(match mode {
            OracleMode::ParseOnly => Verdict::accept(""),
            OracleMode::InferReplacement => Verdict::accept(self.replacement.clone()),
        })
    }

    fn infer(&self, _pattern: &str, mode: InferenceMode) -> Result<String, OracleError> {
        Ok(format!("{}-fact", mode.name()))
    }
}

/// Oracle defined by a closure.
pub(crate) struct FnOracle<F>(F);

impl<F> FnOracle<F>
where
    F: Fn(&str, OracleMode) -> Result<Verdict, OracleError> + Sync,
{
    pub(crate) fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Oracle for FnOracle<F>
where
    F: Fn(&str, OracleMode) -> Result<Verdict, OracleError> + Sync,
{
    fn verify(&self, pattern: &str, mode: OracleMode) -> Result<Verdict, OracleError> {
        (self.0)(pattern, mode)
    }

    fn infer(&self, _pattern: &str, _mode: InferenceMode) -> Result<String, OracleError> {
        Ok(String::new())
    }
}
