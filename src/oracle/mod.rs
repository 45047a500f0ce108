//! The verifier interface.
//!
//! The oracle is the only authority on whether a pattern is a valid rule.
//! Everything the pipeline knows about validity comes through [`Oracle`];
//! [`CommandOracle`] drives an external verifier process.

mod command;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use command::CommandOracle;

/// What the oracle is asked to establish about a pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OracleMode {
    /// Only parse and type-check the pattern.
    ParseOnly,
    /// Derive the canonical replacement for the pattern.
    InferReplacement,
}

/// The oracle's answer for one pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    /// Canonical replacement; empty in parse-only mode or on rejection.
    pub replacement: String,
}

impl Verdict {
    pub fn accept(replacement: impl Into<String>) -> Self {
        Self {
            accepted: true,
            replacement: replacement.into(),
        }
    }

    pub fn reject() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    /// The verifier cannot be reached at all.
    #[error("verifier unavailable: {0}")]
    Unavailable(String),
    /// One query ran past its time budget.
    #[error("verifier timed out after {}s", .0.as_secs_f64())]
    TimedOut(Duration),
}

/// Dataflow facts the oracle can infer about a pattern's root value.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum InferenceMode {
    #[value(name = "non-neg")]
    #[serde(rename = "non-neg")]
    NonNegative,
    #[value(name = "neg")]
    #[serde(rename = "neg")]
    Negative,
    KnownBits,
    PowerOfTwo,
    NonZero,
    SignBits,
    DemandedBits,
}

impl InferenceMode {
    pub const ALL: [InferenceMode; 7] = [
        InferenceMode::NonNegative,
        InferenceMode::Negative,
        InferenceMode::KnownBits,
        InferenceMode::PowerOfTwo,
        InferenceMode::NonZero,
        InferenceMode::SignBits,
        InferenceMode::DemandedBits,
    ];

    pub fn name(self) -> &'static str {
        match self {
            InferenceMode::NonNegative => "non-neg",
            InferenceMode::Negative => "neg",
            InferenceMode::KnownBits => "known-bits",
            InferenceMode::PowerOfTwo => "power-of-two",
            InferenceMode::NonZero => "non-zero",
            InferenceMode::SignBits => "sign-bits",
            InferenceMode::DemandedBits => "demanded-bits",
        }
    }

    /// Verifier flag selecting this inference.
    pub fn flag(self) -> &'static str {
        match self {
            InferenceMode::NonNegative => "-infer-non-neg",
            InferenceMode::Negative => "-infer-neg",
            InferenceMode::KnownBits => "-infer-known-bits",
            InferenceMode::PowerOfTwo => "-infer-power-two",
            InferenceMode::NonZero => "-infer-non-zero",
            InferenceMode::SignBits => "-infer-sign-bits",
            InferenceMode::DemandedBits => "-infer-demanded-bits",
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InferenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InferenceMode::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| format!("unknown inference mode '{}'", s))
    }
}

/// A verifier.
pub trait Oracle: Sync {
    fn verify(&self, pattern: &str, mode: OracleMode) -> Result<Verdict, OracleError>;

    /// Infer one dataflow fact; the answer is free-form text.
    fn infer(&self, pattern: &str, mode: InferenceMode) -> Result<String, OracleError>;
}

impl<O: Oracle + ?Sized> Oracle for &O {
    fn verify(&self, pattern: &str, mode: OracleMode) -> Result<Verdict, OracleError> {
        (**self).verify(pattern, mode)
    }

    fn infer(&self, pattern: &str, mode: InferenceMode) -> Result<String, OracleError> {
        (**self).infer(pattern, mode)
    }
}

/// What a pattern must satisfy to count as still valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expectation<'a> {
    /// The oracle only has to parse the pattern.
    Parses,
    /// The oracle's canonical replacement must equal this text.
    Replacement(&'a str),
}

impl<'a> Expectation<'a> {
    /// Rules without a replacement can only be held to parsing.
    pub fn for_replacement(replacement: &'a str) -> Self {
        if replacement.is_empty() {
            Expectation::Parses
        } else {
            Expectation::Replacement(replacement)
        }
    }
}

/// Ask `oracle` whether `pattern` meets `expect`.
///
/// A timed-out query counts as a rejection; only an unreachable verifier is
/// an error.
pub fn check<O: Oracle + ?Sized>(
    oracle: &O,
    pattern: &str,
    expect: Expectation<'_>,
) -> Result<bool, OracleError> {
    let mode = match expect {
        Expectation::Parses => OracleMode::ParseOnly,
        Expectation::Replacement(_) => OracleMode::InferReplacement,
    };
    let verdict = match oracle.verify(pattern, mode) {
        Ok(v) => v,
        Err(OracleError::TimedOut(after)) => {
            tracing::warn!(
                "verifier timed out after {:.1}s; treating as rejection",
                after.as_secs_f64()
            );
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    Ok(match expect {
        Expectation::Parses => verdict.accepted,
        Expectation::Replacement(expected) => {
            verdict.accepted && same_replacement(&verdict.replacement, expected)
        }
    })
}

/// Replacement texts compare equal modulo trailing whitespace.
pub fn same_replacement(a: &str, b: &str) -> bool {
    a.trim_end() == b.trim_end()
}

#[cfg(test)]
pub(crate) mod testing;
