/// Byte range into a rule's text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Placeholder span for diagnostics that are not tied to any text.
    pub fn dummy() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Span covering all of `text`.
    pub fn covering(text: &str) -> Self {
        Self {
            start: 0,
            end: text.len(),
        }
    }
}
