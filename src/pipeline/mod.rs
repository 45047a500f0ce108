//! The run driver.
//!
//! Each stage takes the [`RunState`] by value and hands back the next one,
//! so a stage can be exercised on its own and nothing lives in globals.
//! Per-rule work fans out on the current rayon pool; results come back in
//! key order and are folded sequentially, which keeps a run deterministic
//! regardless of the worker count.

use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::{CacheSnapshot, RESULT_FIELD, TAG_FIELD};
use crate::error::{PipelineError, RuleFailure};
use crate::merge;
use crate::oracle::{
    check, same_replacement, Expectation, InferenceMode, Oracle, OracleError, OracleMode,
};
use crate::profile;
use crate::rank::{self, RankBy};
use crate::rule::{Rule, WorkingSet};
use crate::tools::{Reducer, Triage};
use crate::weaken::{self, WeakenError, WeakenStats};

/// Which stages run and how the result is ordered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Options {
    /// Report only non-optimizations instead of only optimizations.
    pub dump_non_optimizations: bool,
    /// Re-derive every cached replacement and abort on disagreement.
    pub verify: bool,
    pub reduce: bool,
    pub triage: bool,
    pub weaken: bool,
    pub merge: bool,
    /// Abort when any pattern fails to parse.
    pub ensure_all_parse: bool,
    pub infer: Vec<InferenceMode>,
    pub sort: RankBy,
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
}

/// The external parties a run talks to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub oracle: &'a dyn Oracle,
    pub reducer: Option<&'a dyn Reducer>,
    pub triage: Option<&'a dyn Triage>,
}

/// Counters reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub tagged: usize,
    pub untagged: usize,
    pub discarded_non_optimizations: usize,
    pub discarded_optimizations: usize,
    pub reduction_dropped: usize,
    pub triage_dropped: usize,
    pub triage_failed: usize,
    pub unparsed: usize,
    pub weakened_rules: usize,
    /// Present once the weakening stage has run.
    pub weaken: Option<WeakenStats>,
}

/// Everything a run carries from stage to stage.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub rules: WorkingSet,
    /// Keys of rules that failed the parse check.
    pub passthrough: BTreeSet<String>,
    pub stats: RunStats,
}

/// Ranked survivors of a run plus its counters.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub rules: Vec<Rule>,
    pub stats: RunStats,
    pub dump_non_optimizations: bool,
}

/// Apply `f` to every rule on the rayon pool. Results come back paired
/// with the rule's key, in key order.
fn per_rule<T, F>(rules: &WorkingSet, f: F) -> Vec<(String, T)>
where
    T: Send,
    F: Fn(&Rule) -> T + Sync + Send,
{
    let rules: Vec<&Rule> = rules.iter().collect();
    rules
        .into_par_iter()
        .map(|rule| (rule.key(), f(rule)))
        .collect()
}

fn unavailable(key: &str, err: OracleError) -> PipelineError {
    PipelineError::OracleUnavailable {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

// ─── Load ──────────────────────────────────────────────────────────

/// Materialize the working set from a cache snapshot.
///
/// Baseline ranks are computed over every record before anything is
/// filtered out, then the set is narrowed to optimizations (or, when
/// dumping, to non-optimizations).
pub fn load(snapshot: &CacheSnapshot, dump_non_optimizations: bool) -> RunState {
    let mut stats = RunStats::default();
    let mut loaded: Vec<Rule> = Vec::with_capacity(snapshot.len());

    for (key, record) in &snapshot.records {
        let replacement = record.get(RESULT_FIELD).cloned().unwrap_or_default();
        let profiles = profile::aggregate(record);
        let mut rule = Rule::new(key.clone(), replacement);
        rule.static_profile = profiles.static_profile;
        rule.dynamic_profile = profiles.dynamic_profile;
        rule.tagged = record.contains_key(TAG_FIELD);
        if rule.tagged {
            stats.tagged += 1;
        } else {
            stats.untagged += 1;
        }
        loaded.push(rule);
    }

    rank::assign_baseline_ranks(&mut loaded);

    let mut rules = WorkingSet::new();
    for rule in loaded {
        match (rule.is_optimization(), dump_non_optimizations) {
            (true, false) | (false, true) => rules.insert(rule),
            (false, false) => stats.discarded_non_optimizations += 1,
            (true, true) => stats.discarded_optimizations += 1,
        }
    }

    if snapshot.is_empty() {
        warn!("cache snapshot has no records");
    }
    info!(
        records = snapshot.len(),
        kept = rules.len(),
        static_weight = rules.static_weight(),
        "loaded cache snapshot"
    );
    RunState {
        rules,
        passthrough: BTreeSet::new(),
        stats,
    }
}

// ─── Per-rule stages ───────────────────────────────────────────────

/// Ask the oracle for every optimization's replacement and abort on the
/// first disagreement.
pub fn verify_replacements(
    state: RunState,
    oracle: &dyn Oracle,
) -> Result<RunState, PipelineError> {
    let results = per_rule(&state.rules, |rule| {
        if !rule.is_optimization() {
            return Ok(());
        }
        let found = match oracle.verify(&rule.pattern, OracleMode::InferReplacement) {
            Ok(v) if v.accepted && same_replacement(&v.replacement, &rule.replacement) => {
                return Ok(())
            }
            Ok(v) => v.replacement,
            Err(OracleError::TimedOut(_)) => String::new(),
            Err(e) => return Err(unavailable(&rule.key(), e)),
        };
        Err(PipelineError::ReplacementMismatch {
            key: rule.key(),
            expected: rule.replacement.clone(),
            found,
        })
    });

    for (_, result) in results {
        result?;
    }
    info!(rules = state.rules.len(), "replacements verified");
    Ok(state)
}

/// Shrink every pattern with the external reducer. Rules the reducer
/// cannot handle are dropped.
pub fn reduce(mut state: RunState, reducer: &dyn Reducer) -> RunState {
    let results = per_rule(&state.rules, |rule| reducer.reduce(&rule.pattern));

    let mut moves = Vec::with_capacity(results.len());
    for (key, result) in results {
        match result {
            Ok(pattern) => moves.push((key, pattern)),
            Err(e) => {
                warn!(key = %key, "{}", RuleFailure::ReductionFailed(e));
                state.rules.remove(&key);
                state.stats.reduction_dropped += 1;
            }
        }
    }
    state.rules.rekey(moves);
    info!(
        kept = state.rules.len(),
        dropped = state.stats.reduction_dropped,
        "reduction finished"
    );
    state
}

/// Drop optimizations the standard optimizer already subsumes. A failed
/// triage keeps the rule.
pub fn triage(mut state: RunState, triage: &dyn Triage) -> RunState {
    let results = per_rule(&state.rules, |rule| {
        rule.is_optimization().then(|| triage.counts(rule))
    });

    for (key, result) in results {
        match result {
            Some(Ok(counts)) if counts.is_redundant() => {
                state.rules.remove(&key);
                state.stats.triage_dropped += 1;
            }
            Some(Err(e)) => {
                warn!(key = %key, "{}", RuleFailure::TriageFailed(e));
                state.stats.triage_failed += 1;
            }
            _ => {}
        }
    }
    info!(
        kept = state.rules.len(),
        dropped = state.stats.triage_dropped,
        "triage finished"
    );
    state
}

/// Parse-check every pattern. Under `strict` the first failure aborts the
/// run; otherwise failing rules are marked to pass through unchanged.
pub fn check_parse(
    mut state: RunState,
    oracle: &dyn Oracle,
    strict: bool,
) -> Result<RunState, PipelineError> {
    let results = per_rule(&state.rules, |rule| {
        check(oracle, &rule.pattern, Expectation::Parses)
    });

    for (key, result) in results {
        match result {
            Ok(true) => {}
            Ok(false) if strict => return Err(PipelineError::ParseRejected { key }),
            Ok(false) => {
                warn!(key = %key, "{}", RuleFailure::ParseRejected);
                state.stats.unparsed += 1;
                state.passthrough.insert(key);
            }
            Err(e) => return Err(unavailable(&key, e)),
        }
    }
    Ok(state)
}

/// Weaken every rule that parsed, rekeying those whose pattern changed.
pub fn weaken(mut state: RunState, oracle: &dyn Oracle) -> Result<RunState, PipelineError> {
    let passthrough = &state.passthrough;
    let results = per_rule(&state.rules, |rule| {
        if passthrough.contains(&rule.key()) {
            return Ok(None);
        }
        weaken::weaken(oracle, &rule.pattern, &rule.replacement).map(Some)
    });

    let mut totals = state.stats.weaken.unwrap_or_default();
    let mut moves = Vec::new();
    for (key, result) in results {
        let weakening = match result {
            Ok(None) => continue,
            Ok(Some(w)) => w,
            Err(WeakenError::Oracle(e)) => return Err(unavailable(&key, e)),
            Err(WeakenError::Inconsistent { pattern }) => {
                return Err(PipelineError::WeakenInternalInconsistency { key, pattern })
            }
        };
        totals.absorb(&weakening.stats);
        if !weakening.events.is_empty() {
            debug!(key = %key, trace = %weakening.trace(), "weakening decisions");
        }
        let unchanged = state
            .rules
            .get(&key)
            .is_some_and(|rule| rule.pattern == weakening.pattern);
        if !unchanged {
            moves.push((key, weakening.pattern));
        }
    }
    state.stats.weakened_rules += state.rules.rekey(moves);

    info!(
        weakened = state.stats.weakened_rules,
        bits = %format!("{}/{}", totals.bit_successes, totals.bit_attempts),
        instructions = %format!(
            "{}/{}",
            totals.instruction_successes, totals.instruction_attempts
        ),
        "weakening finished"
    );
    state.stats.weaken = Some(totals);
    Ok(state)
}

/// Fold rules that differ only in widths and constants.
pub fn merge(state: RunState) -> RunState {
    let before = state.rules.len();
    let rules = merge::merge(state.rules, &state.passthrough);
    info!(before, after = rules.len(), "merge finished");
    RunState { rules, ..state }
}

/// Attach one oracle inference per enabled mode to every rule.
pub fn annotate(
    mut state: RunState,
    oracle: &dyn Oracle,
    modes: &[InferenceMode],
) -> Result<RunState, PipelineError> {
    if modes.is_empty() {
        return Ok(state);
    }
    let results = per_rule(&state.rules, |rule| {
        let mut found = Vec::with_capacity(modes.len());
        for &mode in modes {
            match oracle.infer(&rule.pattern, mode) {
                Ok(text) => found.push((mode, text)),
                Err(OracleError::TimedOut(_)) => {
                    warn!(key = %rule.key(), mode = %mode, "inference timed out");
                }
                Err(e) => return Err(unavailable(&rule.key(), e)),
            }
        }
        Ok(found)
    });

    for (key, result) in results {
        let found = result?;
        if let Some(rule) = state.rules.get_mut(&key) {
            rule.annotations = found;
        }
    }
    Ok(state)
}

// ─── Driver ────────────────────────────────────────────────────────

/// Run every enabled stage over `snapshot` and rank the survivors.
pub fn run(
    snapshot: &CacheSnapshot,
    options: &Options,
    with: Collaborators<'_>,
) -> Result<Outcome, PipelineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.jobs)
        .build()?;
    pool.install(|| run_stages(snapshot, options, with))
}

fn run_stages(
    snapshot: &CacheSnapshot,
    options: &Options,
    with: Collaborators<'_>,
) -> Result<Outcome, PipelineError> {
    let mut state = load(snapshot, options.dump_non_optimizations);

    if options.verify {
        state = verify_replacements(state, with.oracle)?;
    }
    if options.reduce {
        match with.reducer {
            Some(reducer) => state = reduce(state, reducer),
            None => warn!("reduction requested but no reducer configured; skipping"),
        }
    }
    if options.triage {
        match with.triage {
            Some(t) => state = triage(state, t),
            None => warn!("triage requested but no triage tool configured; skipping"),
        }
    }
    if options.weaken || options.merge || options.ensure_all_parse {
        state = check_parse(state, with.oracle, options.ensure_all_parse)?;
    }
    if options.weaken {
        state = weaken(state, with.oracle)?;
    }
    if options.merge {
        state = merge(state);
    }
    state = annotate(state, with.oracle, &options.infer)?;

    let ranked = rank::rank(state.rules.into_rules(), options.sort);
    Ok(Outcome {
        rules: ranked,
        stats: state.stats,
        dump_non_optimizations: options.dump_non_optimizations,
    })
}
