//! Run-level error kinds.
//!
//! [`PipelineError`] covers everything that aborts a run; each rule-scoped
//! variant names the offending rule's key. Per-rule problems that the run
//! survives are [`RuleFailure`]s and only get logged and counted.

use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("verifier unavailable: {reason}")]
    OracleUnavailable { key: String, reason: String },
    #[error("rule pattern does not parse")]
    ParseRejected { key: String },
    #[error("verifier disagrees with the cached replacement")]
    ReplacementMismatch {
        key: String,
        expected: String,
        found: String,
    },
    #[error("weakened pattern no longer verifies")]
    WeakenInternalInconsistency { key: String, pattern: String },
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Key of the rule that caused the error, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            PipelineError::OracleUnavailable { key, .. }
            | PipelineError::ParseRejected { key }
            | PipelineError::ReplacementMismatch { key, .. }
            | PipelineError::WeakenInternalInconsistency { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Diagnostic pointing at the offending rule's key.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let span = self.key().map(Span::covering).unwrap_or_else(Span::dummy);
        let diag = Diagnostic::error(self.to_string(), span);
        match self {
            PipelineError::ParseRejected { .. } => diag.with_help(
                "drop --ensure-all-parse to pass unparsable rules through unchanged".to_string(),
            ),
            PipelineError::ReplacementMismatch {
                expected, found, ..
            } => diag
                .with_note(format!("cached replacement: {}", expected.trim_end()))
                .with_note(format!("verifier replacement: {}", found.trim_end())),
            PipelineError::WeakenInternalInconsistency { pattern, .. } => diag
                .with_note(format!("weakened pattern:\n{}", pattern.trim_end()))
                .with_help("every accepted step verified; this is a weakener bug".to_string()),
            _ => diag,
        }
    }
}

/// A per-rule failure the run survives.
#[derive(Debug, Error)]
pub enum RuleFailure {
    /// The rule is dropped from the working set.
    #[error("reduction failed: {0}")]
    ReductionFailed(ToolError),
    /// The rule is kept; it was not shown to be redundant.
    #[error("triage failed: {0}")]
    TriageFailed(ToolError),
    /// The rule passes through weakening and merging unchanged.
    #[error("pattern does not parse; passing it through unchanged")]
    ParseRejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_errors_carry_key() {
        let err = PipelineError::ParseRejected {
            key: "bad\n".to_string(),
        };
        assert_eq!(err.key(), Some("bad\n"));
        let diag = err.to_diagnostic();
        assert_eq!(diag.span, Span::new(0, 4));
        assert!(diag.help.is_some());
    }

    #[test]
    fn test_mismatch_diagnostic_notes_both_sides() {
        let err = PipelineError::ReplacementMismatch {
            key: "k".to_string(),
            expected: "result %1\n".to_string(),
            found: "result %2\n".to_string(),
        };
        let diag = err.to_diagnostic();
        assert_eq!(diag.notes.len(), 2);
        assert!(diag.notes[0].ends_with("result %1"));
        assert!(diag.notes[1].ends_with("result %2"));
    }
}
