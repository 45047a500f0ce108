//! Rules and the working set they live in.
//!
//! A rule is identified by its key, the pattern text immediately followed by
//! the replacement text. Stages that rewrite patterns move rules with
//! [`WorkingSet::rekey`]; whenever two rules land on the same key,
//! [`WorkingSet::insert`] folds their profiles additively.

use std::collections::BTreeMap;

use crate::oracle::InferenceMode;

/// Usage counts for one rule: a total plus the per-location breakdown it
/// was summed from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub total: u64,
    pub by_location: BTreeMap<String, u64>,
}

impl Profile {
    /// Add `count` at `location`. Counts saturate at `u64::MAX`.
    pub fn record(&mut self, location: &str, count: u64) {
        self.total = self.total.saturating_add(count);
        let entry = self.by_location.entry(location.to_string()).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Fold another profile into this one.
    pub fn absorb(&mut self, other: &Profile) {
        for (location, count) in &other.by_location {
            self.record(location, *count);
        }
        // Totals are authoritative even if a breakdown was never recorded.
        let recorded = other
            .by_location
            .values()
            .fold(0u64, |sum, count| sum.saturating_add(*count));
        self.total = self.total.saturating_add(other.total.saturating_sub(recorded));
    }

    /// Locations sorted by descending count, ties by location name.
    pub fn ranked_locations(&self) -> Vec<(&str, u64)> {
        let mut locations: Vec<(&str, u64)> = self
            .by_location
            .iter()
            .map(|(loc, count)| (loc.as_str(), *count))
            .collect();
        locations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        locations
    }
}

/// Ordinal position of a rule under the static and dynamic orderings of the
/// loaded set. Rank 0 is the heaviest rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BaselineRank {
    pub static_rank: usize,
    pub dynamic_rank: usize,
}

impl BaselineRank {
    pub fn combined(&self) -> usize {
        self.static_rank + self.dynamic_rank
    }

    /// Best ordinal of each kind; used when two rules become one.
    pub fn best_of(self, other: BaselineRank) -> BaselineRank {
        BaselineRank {
            static_rank: self.static_rank.min(other.static_rank),
            dynamic_rank: self.dynamic_rank.min(other.dynamic_rank),
        }
    }
}

/// One optimization candidate plus its metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    /// Empty when the cached record is not an optimization.
    pub replacement: String,
    pub static_profile: Profile,
    pub dynamic_profile: Profile,
    pub tagged: bool,
    pub baseline_rank: Option<BaselineRank>,
    pub annotations: Vec<(InferenceMode, String)>,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        format!("{}{}", self.pattern, self.replacement)
    }

    pub fn is_optimization(&self) -> bool {
        !self.replacement.is_empty()
    }

    /// Fold `other`'s metrics into this rule. Provenance is never lost:
    /// profiles add up, tags combine, and the better baseline ordinal wins.
    pub fn absorb(&mut self, other: Rule) {
        self.static_profile.absorb(&other.static_profile);
        self.dynamic_profile.absorb(&other.dynamic_profile);
        self.tagged |= other.tagged;
        self.baseline_rank = match (self.baseline_rank, other.baseline_rank) {
            (Some(a), Some(b)) => Some(a.best_of(b)),
            (a, b) => a.or(b),
        };
        for annotation in other.annotations {
            if !self.annotations.contains(&annotation) {
                self.annotations.push(annotation);
            }
        }
    }
}

/// The rules of one run, keyed by [`Rule::key`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkingSet {
    rules: BTreeMap<String, Rule>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a rule, folding it into an existing rule with the same key.
    pub fn insert(&mut self, rule: Rule) {
        let key = rule.key();
        match self.rules.get_mut(&key) {
            Some(existing) => existing.absorb(rule),
            None => {
                self.rules.insert(key, rule);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Rule> {
        self.rules.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Rule> {
        self.rules.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Rule> {
        self.rules.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.rules.contains_key(key)
    }

    /// Move rules to new patterns. Each entry names a rule by its current
    /// key and gives the pattern it should carry. Every moving rule leaves
    /// the set before any is reinserted, so a rule moving onto a key that is
    /// itself moving away folds only into what stays there. Returns how many
    /// rules were moved; unknown keys are skipped.
    pub fn rekey<I>(&mut self, moves: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut moving = Vec::new();
        for (key, pattern) in moves {
            if let Some(mut rule) = self.rules.remove(&key) {
                rule.pattern = pattern;
                moving.push(rule);
            }
        }
        let moved = moving.len();
        for rule in moving {
            self.insert(rule);
        }
        moved
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn into_rules(self) -> Vec<Rule> {
        self.rules.into_values().collect()
    }

    /// Total static weight of the set.
    pub fn static_weight(&self) -> u64 {
        self.rules
            .values()
            .fold(0u64, |sum, r| sum.saturating_add(r.static_profile.total))
    }
}

impl FromIterator<Rule> for WorkingSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = WorkingSet::new();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profiled(pattern: &str, replacement: &str, loc: &str, s: u64, d: u64) -> Rule {
        let mut rule = Rule::new(pattern, replacement);
        rule.static_profile.record(loc, s);
        rule.dynamic_profile.record(loc, d);
        rule
    }

    #[test]
    fn test_key_concatenates_pattern_and_replacement() {
        let rule = Rule::new("%0:i8 = var\ninfer %0\n", "result 0:i8\n");
        assert_eq!(rule.key(), "%0:i8 = var\ninfer %0\nresult 0:i8\n");
        assert!(rule.is_optimization());
        assert!(!Rule::new("p", "").is_optimization());
    }

    #[test]
    fn test_insert_same_key_adds_profiles() {
        let mut set = WorkingSet::new();
        set.insert(profiled("p", "r", "a.c:1", 2, 10));
        set.insert(profiled("p", "r", "a.c:1", 3, 5));
        set.insert(profiled("p", "r", "b.c:7", 1, 1));
        assert_eq!(set.len(), 1);
        let rule = set.get("pr").unwrap();
        assert_eq!(rule.static_profile.total, 6);
        assert_eq!(rule.dynamic_profile.total, 16);
        assert_eq!(rule.static_profile.by_location["a.c:1"], 5);
        assert_eq!(rule.static_profile.by_location["b.c:7"], 1);
    }

    #[test]
    fn test_different_replacements_are_distinct() {
        let mut set = WorkingSet::new();
        set.insert(Rule::new("p", "r1"));
        set.insert(Rule::new("p", "r2"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_rekey_moves_and_folds() {
        let mut set = WorkingSet::new();
        set.insert(profiled("old", "r", "x", 4, 4));
        set.insert(profiled("new", "r", "y", 1, 2));
        let moved = set.rekey(vec![
            ("oldr".to_string(), "new".to_string()),
            ("missing".to_string(), "z".to_string()),
        ]);
        assert_eq!(moved, 1);
        assert!(!set.contains("oldr"));
        let rule = set.get("newr").unwrap();
        assert_eq!(rule.static_profile.total, 5);
        assert_eq!(rule.dynamic_profile.total, 6);
    }

    #[test]
    fn test_rekey_onto_a_vacating_key() {
        // a moves to b's old pattern while b moves on to c.
        let mut set = WorkingSet::new();
        set.insert(profiled("a", "r", "x", 1, 0));
        set.insert(profiled("b", "r", "y", 10, 0));
        set.rekey(vec![
            ("ar".to_string(), "b".to_string()),
            ("br".to_string(), "c".to_string()),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("br").unwrap().static_profile.total, 1);
        assert_eq!(set.get("cr").unwrap().static_profile.total, 10);
    }

    #[test]
    fn test_absorb_keeps_best_baseline_and_tag() {
        let mut a = Rule::new("a", "r");
        a.baseline_rank = Some(BaselineRank {
            static_rank: 3,
            dynamic_rank: 0,
        });
        let mut b = Rule::new("a", "r");
        b.tagged = true;
        b.baseline_rank = Some(BaselineRank {
            static_rank: 1,
            dynamic_rank: 5,
        });
        a.absorb(b);
        assert!(a.tagged);
        assert_eq!(
            a.baseline_rank,
            Some(BaselineRank {
                static_rank: 1,
                dynamic_rank: 0
            })
        );
    }

    #[test]
    fn test_huge_counts_saturate() {
        let mut profile = Profile::default();
        profile.record("a", u64::MAX - 1);
        profile.record("a", 5);
        profile.record("b", 5);
        assert_eq!(profile.total, u64::MAX);
        assert_eq!(profile.by_location["a"], u64::MAX);

        let mut sum = Profile::default();
        sum.absorb(&profile);
        sum.absorb(&profile);
        assert_eq!(sum.total, u64::MAX);
    }

    #[test]
    fn test_ranked_locations_descending() {
        let mut profile = Profile::default();
        profile.record("b", 2);
        profile.record("a", 9);
        profile.record("c", 2);
        assert_eq!(profile.ranked_locations(), vec![("a", 9), ("b", 2), ("c", 2)]);
    }
}
