pub mod codes;
#[cfg(test)]
mod test;

use crate::reporter::CompilerError;
use crate::utils::Location;
use ariadne::{Color, Label, Report, ReportKind, Source};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Hint => "hint",
        };
        f.write_str(name)
    }
}

/// `(file, row, col, severity, message)` plus the code it was registered under.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub location: Option<Location>,
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn warning(location: Location, message: impl Into<String>) -> Self {
        Self { location: Some(location), severity: Severity::Warning, code: "W0001", message: message.into() }
    }

    pub fn hint(location: Location, message: impl Into<String>) -> Self {
        Self { location: Some(location), severity: Severity::Hint, code: "H0001", message: message.into() }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {}: {}", loc, self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

// --- DiagnosticBag ---

/// Collects diagnostics for one compilation and renders them against the
/// sources they point into.
#[derive(Debug, Default)]
pub struct DiagnosticBag {
    sources: HashMap<Arc<str>, String>,
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the text of a file so diagnostics in it can be annotated.
    pub fn add_source(&mut self, file: impl Into<Arc<str>>, text: impl Into<String>) {
        self.sources.insert(file.into(), text.into());
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend_errors(&mut self, errors: &[CompilerError]) {
        for error in errors {
            self.diagnostics.extend(error.to_diagnostics());
        }
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    /// Renders every diagnostic to stderr and empties the bag.
    pub fn print(&mut self) {
        for diag in std::mem::take(&mut self.diagnostics) {
            self.print_one(&diag);
        }
    }

    fn print_one(&self, diag: &Diagnostic) {
        let (Some(loc), Some(text)) = (
            diag.location.as_ref(),
            diag.location.as_ref().and_then(|l| self.sources.get(&l.file)),
        ) else {
            // Nothing to annotate: fall back to the one-line form.
            eprintln!("{}", diag);
            return;
        };

        let (kind, color) = match diag.severity {
            Severity::Error => (ReportKind::Error, Color::Red),
            Severity::Warning => (ReportKind::Warning, Color::Yellow),
            Severity::Hint => (ReportKind::Advice, Color::Cyan),
        };
        let file: &str = &loc.file;
        let span = clamp(loc.span(), text.len());

        let report = Report::build(kind, (file, span.clone()))
            .with_code(diag.code)
            .with_message(&diag.message)
            .with_label(Label::new((file, span)).with_message(&diag.message).with_color(color))
            .finish();
        if report.eprint((file, Source::from(text.as_str()))).is_err() {
            eprintln!("{}", diag);
        }
    }
}

fn clamp(span: std::ops::Range<usize>, len: usize) -> std::ops::Range<usize> {
    let start = span.start.min(len);
    start..span.end.clamp(start, len)
}
