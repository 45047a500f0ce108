use std::time::Duration;

use super::*;
use crate::oracle::testing::{FnOracle, FragmentOracle};
use crate::oracle::{OracleMode, Verdict};

const ADD_NSW: &str = "%0:i8 = var (knownBits=1)\n%1:i8 = addnsw %0, 5:i8\ninfer %1\n";
const ADD_RESULT: &str = "result %2\n";

#[test]
fn test_qualifier_dropped_literal_kept() {
    let oracle = FragmentOracle::new(&["(knownBits=1)"], ADD_RESULT);
    let w = weaken(&oracle, ADD_NSW, ADD_RESULT).unwrap();
    assert_eq!(
        w.pattern,
        "%0:i8 = var (knownBits=1)\n%1:i8 = add %0, 5:i8\ninfer %1\n"
    );
    assert_eq!(
        w.events,
        vec![
            WeakenEvent::Rejected {
                kind: CandidateKind::LiteralBit,
                ordinal: 0
            },
            WeakenEvent::Accepted {
                kind: CandidateKind::QualifiedMnemonic,
                ordinal: 1
            },
        ]
    );
    assert_eq!(
        w.stats,
        WeakenStats {
            bit_attempts: 1,
            bit_successes: 0,
            instruction_attempts: 1,
            instruction_successes: 1,
        }
    );
    assert_eq!(w.stats.instruction_success_rate(), Some(1.0));
    assert_eq!(w.stats.bit_success_rate(), Some(0.0));
}

#[test]
fn test_trace_lists_decisions_in_order() {
    let oracle = FragmentOracle::new(&["(knownBits=1)"], ADD_RESULT);
    let w = weaken(&oracle, ADD_NSW, ADD_RESULT).unwrap();
    assert_eq!(w.trace(), "-bit#0 +instruction#1");
    assert_eq!(Weakening::default().trace(), "");
}

#[test]
fn test_accepted_edit_rescans_same_ordinal() {
    let oracle = FragmentOracle::new(&[], "");
    let w = weaken(&oracle, "%0 = var (10)", "").unwrap();
    assert_eq!(w.pattern, "%0 = var");
    assert_eq!(
        oracle.queries(),
        vec!["%0 = var (x0)", "%0 = var (xx)", "%0 = var"]
    );
    assert!(w
        .events
        .iter()
        .all(|e| matches!(e, WeakenEvent::Accepted { ordinal: 0, .. })));
}

#[test]
fn test_rejected_edit_leaves_pattern_untouched() {
    let pattern = "%0:i8 = var (knownBits=01)\n%1:i8 = mulnuw %0, %0\ninfer %1\n";
    let oracle = FragmentOracle::new(&["=01", "mulnuw"], "result %0\n");
    let w = weaken(&oracle, pattern, "result %0\n").unwrap();
    assert_eq!(w.pattern, pattern);
    assert_eq!(w.stats.bit_attempts, 2);
    assert_eq!(w.stats.instruction_attempts, 1);
    assert_eq!(w.stats.bit_successes + w.stats.instruction_successes, 0);
    // Every trial differs from the original by exactly one edit.
    for query in oracle.queries() {
        assert_eq!(query.len(), pattern.len() - usize::from(query.contains(" mul ")) * 3);
        assert_ne!(query, pattern);
    }
}

#[test]
fn test_every_accepted_step_was_accepted_by_oracle() {
    let pattern = "%0:i8 = var (knownBits=1010)\n%1:i8 = lshrexact %0, 1:i8\ninfer %1\n";
    let oracle = FragmentOracle::new(&["=1", "lshrexact"], "result 5:i8\n");
    let w = weaken(&oracle, pattern, "result 5:i8\n").unwrap();
    assert_eq!(
        w.pattern,
        "%0:i8 = var (knownBits=1xxx)\n%1:i8 = lshrexact %0, 1:i8\ninfer %1\n"
    );
    assert_eq!(w.stats.bit_attempts, 4);
    assert_eq!(w.stats.bit_successes, 3);
    assert!(check(&oracle, &w.pattern, Expectation::Replacement("result 5:i8\n")).unwrap());
}

#[test]
fn test_weakening_is_idempotent() {
    let pattern = "%0:i16 = var (knownBits=0110)\n%1:i16 = var (knownBits=1x)\n%2:i16 = subnsw %0, %1\n%3:i16 = sdivexact %2, 2:i16\ninfer %3\n";
    let oracle = FragmentOracle::new(&["=0", "sdivexact"], "result %1\n");
    let once = weaken(&oracle, pattern, "result %1\n").unwrap();
    let twice = weaken(&oracle, &once.pattern, "result %1\n").unwrap();
    assert_eq!(once.pattern, twice.pattern);
    assert_eq!(twice.stats.bit_successes, 0);
    assert_eq!(twice.stats.instruction_successes, 0);
    assert_eq!(
        once.pattern,
        "%0:i16 = var (knownBits=0xxx)\n%1:i16 = var\n%2:i16 = sub %0, %1\n%3:i16 = sdivexact %2, 2:i16\ninfer %3\n"
    );
}

#[test]
fn test_wrong_replacement_is_rejection() {
    let oracle = FnOracle::new(|pattern, mode| {
        assert_eq!(mode, OracleMode::InferReplacement);
        if pattern.contains("addnsw") {
            Ok(Verdict::accept("result %1\n"))
        } else {
            Ok(Verdict::accept("result %9\n"))
        }
    });
    let w = weaken(&oracle, ADD_NSW, "result %1\n").unwrap();
    assert!(w.pattern.contains("addnsw"));
    assert_eq!(w.stats.instruction_successes, 0);
}

#[test]
fn test_cleanup_failure_is_inconsistency() {
    // Accepts any single wildcard but not the pattern once the group is gone.
    let oracle = FnOracle::new(|pattern, _| {
        if pattern.contains('(') {
            Ok(Verdict::accept(""))
        } else {
            Ok(Verdict::reject())
        }
    });
    let err = weaken(&oracle, "%0 = var (1)\ninfer %0\n", "").unwrap_err();
    match err {
        WeakenError::Inconsistent { pattern } => assert_eq!(pattern, "%0 = var\ninfer %0\n"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_timeouts_are_rejections() {
    let oracle = FnOracle::new(|_, _| Err(OracleError::TimedOut(Duration::from_millis(1))));
    let w = weaken(&oracle, ADD_NSW, ADD_RESULT).unwrap();
    assert_eq!(w.pattern, ADD_NSW);
    assert_eq!(w.stats.bit_attempts + w.stats.instruction_attempts, 2);
}

#[test]
fn test_unavailable_oracle_aborts() {
    let oracle = FnOracle::new(|_, _| Err(OracleError::Unavailable("no verifier".into())));
    assert!(matches!(
        weaken(&oracle, ADD_NSW, ADD_RESULT),
        Err(WeakenError::Oracle(OracleError::Unavailable(_)))
    ));
}

#[test]
fn test_pattern_without_candidates_makes_no_queries() {
    let oracle = FragmentOracle::new(&[], "r");
    let w = weaken(&oracle, "%0:i8 = var\ninfer %0\n", "r").unwrap();
    assert_eq!(w.pattern, "%0:i8 = var\ninfer %0\n");
    assert!(w.events.is_empty());
    assert!(oracle.queries().is_empty());
}

#[test]
fn test_stats_absorb() {
    let mut total = WeakenStats::default();
    let mut one = WeakenStats::default();
    one.record(CandidateKind::LiteralBit, true);
    one.record(CandidateKind::LiteralBit, false);
    one.record(CandidateKind::QualifiedMnemonic, true);
    total.absorb(&one);
    total.absorb(&one);
    assert_eq!(total.bit_attempts, 4);
    assert_eq!(total.bit_successes, 2);
    assert_eq!(total.bit_success_rate(), Some(0.5));
    assert_eq!(total.instruction_success_rate(), Some(1.0));
    assert_eq!(WeakenStats::default().bit_success_rate(), None);
}
