//! Text report of a finished run.

use crate::pipeline::{Outcome, RunStats};
use crate::rule::{Profile, Rule};

/// Line separating rules in the report.
pub const DELIMITER: &str = "------------------------------------------------------------";

// ─── Report formatting ─────────────────────────────────────────────

fn push_line(out: &mut String, line: &str) {
    out.push_str(line);
    out.push('\n');
}

/// `; <label> <total> (<loc>: <count>, ...)`, heaviest location first.
pub fn format_profile(label: &str, profile: &Profile) -> String {
    let mut line = format!("; {} {}", label, profile.total);
    let locations = profile.ranked_locations();
    if !locations.is_empty() {
        let parts: Vec<String> = locations
            .iter()
            .map(|(loc, count)| format!("{}: {}", loc, count))
            .collect();
        line.push_str(&format!(" ({})", parts.join(", ")));
    }
    line
}

/// One rule's block, delimiter included.
pub fn format_rule(rule: &Rule) -> String {
    let mut out = String::new();
    out.push_str(&rule.key());
    if !out.ends_with('\n') {
        out.push('\n');
    }
    for (mode, value) in &rule.annotations {
        push_line(&mut out, &format!("; {}: {}", mode, value));
    }
    push_line(&mut out, &format_profile("static profile", &rule.static_profile));
    push_line(&mut out, &format_profile("dynamic profile", &rule.dynamic_profile));
    push_line(&mut out, DELIMITER);
    out
}

fn format_rate(label: &str, successes: u64, attempts: u64, rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!(
            "; {}: {}/{} accepted ({:.1}%)",
            label,
            successes,
            attempts,
            r * 100.0
        ),
        None => format!("; {}: {}/{} accepted", label, successes, attempts),
    }
}

/// Trailing summary lines.
pub fn format_summary(stats: &RunStats, rules: &[Rule], dump_non_optimizations: bool) -> String {
    let mut out = String::new();
    let weight = rules
        .iter()
        .fold(0u64, |sum, r| sum.saturating_add(r.static_profile.total));

    if dump_non_optimizations {
        push_line(
            &mut out,
            &format!("; discarded {} optimizations", stats.discarded_optimizations),
        );
        push_line(&mut out, &format!("; {} non-optimizations", rules.len()));
    } else {
        push_line(
            &mut out,
            &format!(
                "; discarded {} non-optimizations",
                stats.discarded_non_optimizations
            ),
        );
        push_line(&mut out, &format!("; {} optimizations", rules.len()));
    }
    push_line(
        &mut out,
        &format!("; overall static profile weight = {}", weight),
    );
    push_line(
        &mut out,
        &format!("; {} tagged, {} untagged", stats.tagged, stats.untagged),
    );
    if stats.reduction_dropped > 0 {
        push_line(
            &mut out,
            &format!("; {} dropped by reduction", stats.reduction_dropped),
        );
    }
    if stats.triage_dropped > 0 || stats.triage_failed > 0 {
        push_line(
            &mut out,
            &format!(
                "; {} dropped by triage, {} triage failures",
                stats.triage_dropped, stats.triage_failed
            ),
        );
    }
    if stats.unparsed > 0 {
        push_line(
            &mut out,
            &format!("; {} passed through unparsed", stats.unparsed),
        );
    }
    if let Some(w) = &stats.weaken {
        push_line(
            &mut out,
            &format_rate(
                "bit weakening",
                w.bit_successes,
                w.bit_attempts,
                w.bit_success_rate(),
            ),
        );
        push_line(
            &mut out,
            &format_rate(
                "instruction weakening",
                w.instruction_successes,
                w.instruction_attempts,
                w.instruction_success_rate(),
            ),
        );
    }
    out
}

impl Outcome {
    /// Every rule in ranked order followed by the summary.
    pub fn format_report(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            out.push_str(&format_rule(rule));
        }
        out.push_str(&format_summary(
            &self.stats,
            &self.rules,
            self.dump_non_optimizations,
        ));
        out
    }
}
