//! Syntactic merging of rules that differ only in widths or constants.
//!
//! The merged text drops every `:iN` width annotation and replaces each
//! standalone integer literal outside parenthesized bit groups with `C`.
//! Merged rules are not re-verified: the pipeline takes it as given that
//! erasing widths and constants yields a more general law rather than a
//! different one.

use std::collections::BTreeSet;

use crate::rule::{Rule, WorkingSet};

/// Placeholder that replaces integer literals.
pub const CONSTANT_WILDCARD: &str = "C";

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Remove `:i<digits>` annotations together with blanks directly before them.
fn erase_widths(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b':' && bytes.get(i + 1) == Some(&b'i') {
            let mut end = i + 2;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            let has_digits = end > i + 2;
            let token_ends = bytes.get(end).map_or(true, |b| !is_ident_byte(*b));
            if has_digits && token_ends {
                let mut from = i;
                while from > cursor && matches!(bytes[from - 1], b' ' | b'\t') {
                    from -= 1;
                }
                out.push_str(&text[cursor..from]);
                cursor = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Replace standalone digit runs with [`CONSTANT_WILDCARD`]. Digits that
/// belong to an identifier or a `%` value reference are left alone, and so
/// is everything inside a parenthesized group: those digits are literal bit
/// preconditions, not constants.
fn erase_constants(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if depth > 0 {
            continue;
        }
        let attached_before =
            start > 0 && (is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'%');
        let attached_after = i < bytes.len() && is_ident_byte(bytes[i]);
        if !attached_before && !attached_after {
            out.push_str(&text[cursor..start]);
            out.push_str(CONSTANT_WILDCARD);
            cursor = i;
        }
    }
    out.push_str(&text[cursor..]);
    out
}

/// The width- and constant-free form of a pattern or replacement.
pub fn merged_text(text: &str) -> String {
    erase_constants(&erase_widths(text))
}

/// The merged form of a rule. Metrics carry over unchanged.
pub fn merged_rule(rule: Rule) -> Rule {
    Rule {
        pattern: merged_text(&rule.pattern),
        replacement: merged_text(&rule.replacement),
        ..rule
    }
}

/// Merge a collection of rules. Rules whose key is in `passthrough` keep
/// their original text.
pub fn merge_rules<I>(rules: I, passthrough: &BTreeSet<String>) -> WorkingSet
where
    I: IntoIterator<Item = Rule>,
{
    rules
        .into_iter()
        .map(|rule| {
            if passthrough.contains(&rule.key()) {
                rule
            } else {
                merged_rule(rule)
            }
        })
        .collect()
}

/// Merge a working set; see [`merge_rules`].
pub fn merge(set: WorkingSet, passthrough: &BTreeSet<String>) -> WorkingSet {
    merge_rules(set.into_rules(), passthrough)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn rule(pattern: &str, replacement: &str, loc: &str, s: u64, d: u64) -> Rule {
        let mut r = Rule::new(pattern, replacement);
        r.static_profile.record(loc, s);
        r.dynamic_profile.record(loc, d);
        r
    }

    #[test]
    fn test_widths_and_constants_collapse() {
        let a = rule("x :i32 + 7", "", "a.c:1", 2, 20);
        let b = rule("x :i64 + 3", "", "b.c:9", 5, 1);
        let set = merge_rules(vec![a, b], &BTreeSet::new());
        assert_eq!(set.len(), 1);
        let merged = set.get("x + C").unwrap();
        assert_eq!(merged.static_profile.total, 7);
        assert_eq!(merged.dynamic_profile.total, 21);
        assert_eq!(merged.static_profile.by_location["a.c:1"], 2);
        assert_eq!(merged.static_profile.by_location["b.c:9"], 5);
    }

    #[test]
    fn test_value_references_survive() {
        assert_eq!(
            merged_text("%0:i8 = var\n%1:i8 = add %0, 5:i8\ninfer %1\n"),
            "%0 = var\n%1 = add %0, C\ninfer %1\n"
        );
        assert_eq!(merged_text("result 255:i8\n"), "result C\n");
    }

    #[test]
    fn test_identifier_digits_survive() {
        assert_eq!(merged_text("call f2 x1, 10"), "call f2 x1, C");
        assert_eq!(merged_text("x:i32abc 4"), "x:i32abc C");
        assert_eq!(merged_text("x :i + 1"), "x :i + C");
    }

    #[test]
    fn test_bit_groups_are_not_constants() {
        let ones = rule("%0:i8 = var (knownBits=11)\ninfer %0\n", "result 3:i8\n", "a", 1, 1);
        let zeros = rule("%0:i8 = var (knownBits=00)\ninfer %0\n", "result 0:i8\n", "b", 1, 1);
        assert_eq!(
            merged_text(&ones.pattern),
            "%0 = var (knownBits=11)\ninfer %0\n"
        );
        let set = merge_rules(vec![ones, zeros], &BTreeSet::new());
        assert_eq!(set.len(), 2);
        assert!(set.contains("%0 = var (knownBits=11)\ninfer %0\nresult C\n"));
        assert!(set.contains("%0 = var (knownBits=00)\ninfer %0\nresult C\n"));
        assert_eq!(merged_text("(knownBits=1x) + 4"), "(knownBits=1x) + C");
    }

    #[test]
    fn test_replacements_merge_too() {
        let a = rule("%0:i8 = var\ninfer %0\n", "result 0:i8\n", "a", 1, 1);
        let b = rule("%0:i16 = var\ninfer %0\n", "result 7:i16\n", "b", 1, 1);
        let set = merge_rules(vec![a, b], &BTreeSet::new());
        assert_eq!(set.len(), 1);
        assert!(set.contains("%0 = var\ninfer %0\nresult C\n"));
    }

    #[test]
    fn test_passthrough_rules_keep_text() {
        let a = rule("x :i32 + 7", "r", "a", 1, 1);
        let b = rule("x :i64 + 3", "r", "b", 1, 1);
        let skip: BTreeSet<String> = [b.key()].into_iter().collect();
        let set = merge_rules(vec![a, b], &skip);
        assert_eq!(set.len(), 2);
        assert!(set.contains("x + Cr"));
        assert!(set.contains("x :i64 + 3r"));
    }

    fn arb_rule() -> impl Strategy<Value = Rule> {
        (
            prop::sample::select(vec!["x :i8 + ", "x :i16 + ", "y :i8 * ", "y :i32 * "]),
            0u32..20,
            prop::sample::select(vec!["f.c:1", "f.c:2", "g.c:7"]),
            0u64..50,
            0u64..500,
        )
            .prop_map(|(head, constant, loc, s, d)| {
                rule(&format!("{}{}", head, constant), "", loc, s, d)
            })
    }

    proptest! {
        #[test]
        fn merge_is_order_independent(rules in prop::collection::vec(arb_rule(), 0..12)) {
            let forward = merge_rules(rules.clone(), &BTreeSet::new());
            let backward = merge_rules(rules.iter().rev().cloned(), &BTreeSet::new());
            prop_assert_eq!(forward, backward);
        }

        #[test]
        fn merge_preserves_profile_weight(rules in prop::collection::vec(arb_rule(), 0..12)) {
            let before_static: u64 = rules.iter().map(|r| r.static_profile.total).sum();
            let before_dynamic: u64 = rules.iter().map(|r| r.dynamic_profile.total).sum();
            let set = merge_rules(rules, &BTreeSet::new());
            prop_assert_eq!(set.static_weight(), before_static);
            let after_dynamic: u64 = set.iter().map(|r| r.dynamic_profile.total).sum();
            prop_assert_eq!(after_dynamic, before_dynamic);
            prop_assert!(set.len() <= 2);
        }
    }
}
