use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::span::Span;

/// A fatal pipeline error pointing into one rule's key.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Span) -> Self {
        Self {
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Print to stderr against `key`, labelled with `origin`.
    pub fn render(&self, origin: &str, key: &str) {
        // A span past the end of the key would panic inside ariadne.
        let end = self.span.end.min(key.len());
        let range = self.span.start.min(end)..end;

        let report = self.notes.iter().fold(
            Report::build(ReportKind::Error, origin, range.start)
                .with_message(&self.message)
                .with_label(Label::new((origin, range)).with_color(Color::Red)),
            |report, note| report.with_note(note),
        );
        let report = match &self.help {
            Some(help) => report.with_help(help),
            None => report,
        };

        if report.finish().eprint((origin, Source::from(key))).is_err() {
            eprintln!("error: {}", self.message);
        }
    }
}
