//! Greedy weakening of rule patterns.
//!
//! Walks the candidate constraints of a pattern in ordinal order and drops
//! each one the oracle agrees is unnecessary. An accepted edit keeps the
//! scan at the same ordinal, since the candidates after it shift down by
//! one; a rejected edit moves on to the next ordinal. There is no
//! backtracking, so the result is locally irreducible along this scan order
//! rather than globally minimal.

pub mod scan;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::oracle::{check, Expectation, Oracle, OracleError};
pub use scan::{Candidate, CandidateKind};

/// Attempt and success counts per candidate kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeakenStats {
    pub bit_attempts: u64,
    pub bit_successes: u64,
    pub instruction_attempts: u64,
    pub instruction_successes: u64,
}

impl WeakenStats {
    pub fn record(&mut self, kind: CandidateKind, accepted: bool) {
        let (attempts, successes) = match kind {
            CandidateKind::LiteralBit => (&mut self.bit_attempts, &mut self.bit_successes),
            CandidateKind::QualifiedMnemonic => (
                &mut self.instruction_attempts,
                &mut self.instruction_successes,
            ),
        };
        *attempts += 1;
        if accepted {
            *successes += 1;
        }
    }

    pub fn absorb(&mut self, other: &WeakenStats) {
        self.bit_attempts += other.bit_attempts;
        self.bit_successes += other.bit_successes;
        self.instruction_attempts += other.instruction_attempts;
        self.instruction_successes += other.instruction_successes;
    }

    /// Fraction of bit weakenings accepted, `None` before any attempt.
    pub fn bit_success_rate(&self) -> Option<f64> {
        rate(self.bit_successes, self.bit_attempts)
    }

    /// Fraction of qualifier weakenings accepted, `None` before any attempt.
    pub fn instruction_success_rate(&self) -> Option<f64> {
        rate(self.instruction_successes, self.instruction_attempts)
    }
}

fn rate(successes: u64, attempts: u64) -> Option<f64> {
    if attempts == 0 {
        None
    } else {
        Some(successes as f64 / attempts as f64)
    }
}

/// One accept/reject decision, in the order it was made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeakenEvent {
    Accepted { kind: CandidateKind, ordinal: usize },
    Rejected { kind: CandidateKind, ordinal: usize },
}

impl fmt::Display for WeakenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sign, kind, ordinal) = match self {
            WeakenEvent::Accepted { kind, ordinal } => ('+', kind, ordinal),
            WeakenEvent::Rejected { kind, ordinal } => ('-', kind, ordinal),
        };
        write!(f, "{}{}#{}", sign, kind.name(), ordinal)
    }
}

/// Result of weakening one pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Weakening {
    pub pattern: String,
    pub events: Vec<WeakenEvent>,
    pub stats: WeakenStats,
}

impl Weakening {
    /// The decisions in order, e.g. `-bit#0 +instruction#1`.
    pub fn trace(&self) -> String {
        self.events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Error)]
pub enum WeakenError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// The cleaned-up pattern failed re-verification even though every
    /// step leading to it was accepted.
    #[error("weakened pattern failed re-verification")]
    Inconsistent { pattern: String },
}

/// Weaken `pattern` against `oracle`.
///
/// With a non-empty `replacement` every accepted step must still infer that
/// replacement; without one, parsing is all that is asked.
pub fn weaken<O: Oracle + ?Sized>(
    oracle: &O,
    pattern: &str,
    replacement: &str,
) -> Result<Weakening, WeakenError> {
    let expect = Expectation::for_replacement(replacement);
    let mut current = pattern.to_string();
    let mut events = Vec::new();
    let mut stats = WeakenStats::default();
    let mut index = 0;

    while let Some(candidate) = scan::nth_candidate(&current, index) {
        let trial = candidate.apply(&current);
        let accepted = check(oracle, &trial, expect)?;
        stats.record(candidate.kind, accepted);
        if accepted {
            debug!(
                kind = candidate.kind.name(),
                ordinal = index,
                "weakening accepted"
            );
            events.push(WeakenEvent::Accepted {
                kind: candidate.kind,
                ordinal: index,
            });
            current = trial;
        } else {
            debug!(
                kind = candidate.kind.name(),
                ordinal = index,
                "weakening rejected"
            );
            events.push(WeakenEvent::Rejected {
                kind: candidate.kind,
                ordinal: index,
            });
            index += 1;
        }
    }

    let cleaned = scan::strip_wildcard_groups(&current);
    if cleaned != pattern && !check(oracle, &cleaned, expect)? {
        return Err(WeakenError::Inconsistent { pattern: cleaned });
    }

    Ok(Weakening {
        pattern: cleaned,
        events,
        stats,
    })
}

#[cfg(test)]
mod tests;
