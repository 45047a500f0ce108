//! Candidate constraints in a pattern.
//!
//! A pattern carries two kinds of removable constraints: literal `0`/`1`
//! bits inside parenthesized groups, and qualified instruction mnemonics
//! outside them. Both share one left-to-right ordinal sequence.

use crate::span::Span;

/// Wildcard that replaces a literal bit.
pub const WILDCARD: char = 'x';

/// Qualified mnemonics and the unqualified base each weakens to.
pub const QUALIFIED_MNEMONICS: &[(&str, &str)] = &[
    ("addnsw", "add"),
    ("addnuw", "add"),
    ("addnw", "add"),
    ("subnsw", "sub"),
    ("subnuw", "sub"),
    ("subnw", "sub"),
    ("mulnsw", "mul"),
    ("mulnuw", "mul"),
    ("mulnw", "mul"),
    ("shlnsw", "shl"),
    ("shlnuw", "shl"),
    ("shlnw", "shl"),
    ("udivexact", "udiv"),
    ("sdivexact", "sdiv"),
    ("lshrexact", "lshr"),
    ("ashrexact", "ashr"),
];

pub fn base_mnemonic(word: &str) -> Option<&'static str> {
    QUALIFIED_MNEMONICS
        .iter()
        .find(|(qualified, _)| *qualified == word)
        .map(|(_, base)| *base)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    LiteralBit,
    QualifiedMnemonic,
}

impl CandidateKind {
    pub fn name(self) -> &'static str {
        match self {
            CandidateKind::LiteralBit => "bit",
            CandidateKind::QualifiedMnemonic => "instruction",
        }
    }
}

/// One removable constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub ordinal: usize,
    pub span: Span,
    /// Text the span is replaced with when the constraint is dropped.
    pub weakened: &'static str,
}

impl Candidate {
    /// The pattern with this constraint dropped.
    pub fn apply(&self, pattern: &str) -> String {
        let mut out = String::with_capacity(pattern.len());
        out.push_str(&pattern[..self.span.start]);
        out.push_str(self.weakened);
        out.push_str(&pattern[self.span.end..]);
        out
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.'
}

/// Left-to-right scanner over the candidates of a pattern.
pub struct Candidates<'src> {
    text: &'src str,
    pos: usize,
    depth: usize,
    ordinal: usize,
}

impl<'src> Candidates<'src> {
    pub fn new(text: &'src str) -> Self {
        Self {
            text,
            pos: 0,
            depth: 0,
            ordinal: 0,
        }
    }

    fn emit(
        &mut self,
        kind: CandidateKind,
        start: usize,
        end: usize,
        weakened: &'static str,
    ) -> Candidate {
        let candidate = Candidate {
            kind,
            ordinal: self.ordinal,
            span: Span::new(start, end),
            weakened,
        };
        self.ordinal += 1;
        candidate
    }
}

impl Iterator for Candidates<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        let bytes = self.text.as_bytes();
        while self.pos < bytes.len() {
            let start = self.pos;
            let b = bytes[start];
            match b {
                b'(' => {
                    self.depth += 1;
                    self.pos += 1;
                }
                b')' => {
                    self.depth = self.depth.saturating_sub(1);
                    self.pos += 1;
                }
                b'0' | b'1' if self.depth > 0 => {
                    self.pos += 1;
                    return Some(self.emit(CandidateKind::LiteralBit, start, start + 1, "x"));
                }
                _ if self.depth == 0 && is_ident_byte(b) => {
                    let mut end = start;
                    while end < bytes.len() && is_ident_byte(bytes[end]) {
                        end += 1;
                    }
                    self.pos = end;
                    // `%addnsw` would be a value name, not an instruction.
                    if start > 0 && bytes[start - 1] == b'%' {
                        continue;
                    }
                    if let Some(base) = base_mnemonic(&self.text[start..end]) {
                        let kind = CandidateKind::QualifiedMnemonic;
                        return Some(self.emit(kind, start, end, base));
                    }
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}

/// All candidates of `pattern` in ordinal order.
pub fn candidates(pattern: &str) -> Vec<Candidate> {
    Candidates::new(pattern).collect()
}

/// The candidate with ordinal `n`, if the pattern has that many.
pub fn nth_candidate(pattern: &str, n: usize) -> Option<Candidate> {
    Candidates::new(pattern).nth(n)
}

/// Delete parenthesized groups that no longer constrain anything: the
/// payload, after an optional `label=` prefix, is all wildcards. Blanks
/// directly before a deleted group go with it.
pub fn strip_wildcard_groups(pattern: &str) -> String {
    let bytes = pattern.as_bytes();
    let mut open: Vec<usize> = Vec::new();
    let mut doomed: Vec<(usize, usize)> = Vec::new();

    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'(' => open.push(i),
            b')' => {
                let Some(start) = open.pop() else { continue };
                if is_wildcard_payload(&pattern[start + 1..i]) {
                    let mut from = start;
                    while from > 0 && matches!(bytes[from - 1], b' ' | b'\t') {
                        from -= 1;
                    }
                    doomed.push((from, i + 1));
                }
            }
            _ => {}
        }
    }

    if doomed.is_empty() {
        return pattern.to_string();
    }
    doomed.sort_unstable();
    let mut out = String::with_capacity(pattern.len());
    let mut cursor = 0;
    for (from, to) in doomed {
        if from < cursor {
            continue;
        }
        out.push_str(&pattern[cursor..from]);
        cursor = to;
    }
    out.push_str(&pattern[cursor..]);
    out
}

fn is_wildcard_payload(group: &str) -> bool {
    let payload = match group.split_once('=') {
        Some((label, rest)) if !label.is_empty() && label.bytes().all(is_ident_byte) => rest,
        _ => group,
    };
    !payload.is_empty() && payload.chars().all(|c| c == WILDCARD)
}
