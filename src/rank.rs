//! Ordering of the final working set.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;

use crate::rule::{BaselineRank, Rule};

/// How the report is ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RankBy {
    /// Shortest pattern first.
    #[default]
    Size,
    /// Heaviest static profile first.
    Static,
    /// Heaviest dynamic profile first.
    Dynamic,
    /// Smallest sum of static and dynamic baseline ordinals first.
    Combined,
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RankBy::Size => "size",
            RankBy::Static => "static",
            RankBy::Dynamic => "dynamic",
            RankBy::Combined => "combined",
        })
    }
}

/// Compute static and dynamic ordinals over `rules` (rank 0 = heaviest,
/// ties broken by key) and store them on each rule.
pub fn assign_baseline_ranks(rules: &mut [Rule]) {
    let keys: Vec<String> = rules.iter().map(Rule::key).collect();

    let ordinals = |weight: &dyn Fn(&Rule) -> u64| -> Vec<usize> {
        let mut order: Vec<usize> = (0..rules.len()).collect();
        order.sort_by(|&a, &b| {
            weight(&rules[b])
                .cmp(&weight(&rules[a]))
                .then_with(|| keys[a].cmp(&keys[b]))
        });
        let mut rank = vec![0; rules.len()];
        for (position, &index) in order.iter().enumerate() {
            rank[index] = position;
        }
        rank
    };

    let static_ranks = ordinals(&|r: &Rule| r.static_profile.total);
    let dynamic_ranks = ordinals(&|r: &Rule| r.dynamic_profile.total);

    for (i, rule) in rules.iter_mut().enumerate() {
        rule.baseline_rank = Some(BaselineRank {
            static_rank: static_ranks[i],
            dynamic_rank: dynamic_ranks[i],
        });
    }
}

fn combined_rank(rule: &Rule) -> usize {
    // Rules that never went through the baseline pass sort last.
    rule.baseline_rank
        .map(|r| r.combined())
        .unwrap_or(usize::MAX)
}

/// Comparator for one ordering. Ties fall back to the rule key, so the
/// order is total over a working set.
pub fn comparator(by: RankBy) -> impl Fn(&Rule, &Rule) -> Ordering {
    move |a: &Rule, b: &Rule| {
        let primary = match by {
            RankBy::Size => a.pattern.len().cmp(&b.pattern.len()),
            RankBy::Static => b.static_profile.total.cmp(&a.static_profile.total),
            RankBy::Dynamic => b.dynamic_profile.total.cmp(&a.dynamic_profile.total),
            RankBy::Combined => combined_rank(a).cmp(&combined_rank(b)),
        };
        primary.then_with(|| a.key().cmp(&b.key()))
    }
}

pub fn rank(mut rules: Vec<Rule>, by: RankBy) -> Vec<Rule> {
    let cmp = comparator(by);
    rules.sort_by(|a, b| cmp(a, b));
    rules
}
