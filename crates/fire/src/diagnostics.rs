//! Severity-tagged diagnostics with chained notes and caret rendering
//! (spec.md §6, "Diagnostics").

use crate::source::{Span, SourceMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
        }
    }

    fn ansi_color(self) -> &'static str {
        match self {
            Self::Error => "\x1b[31m",
            Self::Warning => "\x1b[33m",
            Self::Note => "\x1b[36m",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub span: Span,
    pub message: String,
    pub notes: Vec<(Span, String)>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            span,
            message: message.into(),
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, span: Span, note: impl Into<String>) -> Self {
        self.notes.push((span, note.into()));
        self
    }

    /// Renders as:
    /// ```text
    /// path:line:col: error: message
    ///       | <prev line>
    ///   line| <offending line>
    ///       |       ^
    ///       | <next line>
    /// ```
    pub fn render(&self, sources: &SourceMap, use_color: bool) -> String {
        let mut out = String::new();
        render_one(&mut out, sources, self.severity, self.span, &self.message, use_color);
        for (span, note) in &self.notes {
            render_one(&mut out, sources, Severity::Note, *span, note, use_color);
        }
        out
    }
}

fn render_one(out: &mut String, sources: &SourceMap, severity: Severity, span: Span, message: &str, use_color: bool) {
    use std::fmt::Write as _;
    let file = sources.file(span.file);
    let loc = file.line_col(span.start);
    let path = sources.path(span.file).display();

    let (color, reset) = if use_color { (severity.ansi_color(), "\x1b[0m") } else { ("", "") };

    let _ = writeln!(out, "{path}:{loc}: {color}{}{reset}: {message}", severity.label());

    let gutter_width = loc.line.to_string().len().max(1);
    if loc.line > 1 {
        if let Some(prev) = file.line_text(loc.line - 1) {
            let _ = writeln!(out, "{:width$} | {prev}", "", width = gutter_width);
        }
    }
    if let Some(line) = file.line_text(loc.line) {
        let _ = writeln!(out, "{:>width$} | {line}", loc.line, width = gutter_width);
    }
    let caret_offset = (loc.column as usize).saturating_sub(1);
    let caret_len = span.len().max(1) as usize;
    let _ = writeln!(
        out,
        "{:width$} | {}{}",
        "",
        " ".repeat(caret_offset),
        "^".repeat(caret_len),
        width = gutter_width
    );
    if let Some(next) = file.line_text(loc.line + 1) {
        let _ = writeln!(out, "{:width$} | {next}", "", width = gutter_width);
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.label(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_caret_under_span() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("t.fire", "let a = 1;\nlet b = c;\n".to_string());
        let span = Span::new(file, 19, 20); // the `c`
        let diag = Diagnostic::error(span, "unknown name `c`");
        let rendered = diag.render(&sources, false);
        assert!(rendered.contains("t.fire:2:9: error: unknown name `c`"));
        assert!(rendered.contains('^'));
    }
}
