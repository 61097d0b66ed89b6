//! Span-aware diagnostics rendered through ariadne.
//!
//! Every compiler pass accumulates its own error enum and converts it into
//! `Diagnostic` for rendering: error code, one-line summary, underlined
//! source snippet, optional help text.

use crate::span::Span;
use ariadne::{Color, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A renderable diagnostic with a stable error code.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
    pub help: Option<String>,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span,
            help: None,
            severity: Severity::Error,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            code,
            message: message.into(),
            span,
            help: None,
            severity: Severity::Warning,
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render to a string with an underlined snippet of `source`.
    pub fn render(&self, source: &str, filename: &str) -> String {
        let kind = match self.severity {
            Severity::Error => ReportKind::Error,
            Severity::Warning => ReportKind::Warning,
        };
        let color = match self.severity {
            Severity::Error => Color::Red,
            Severity::Warning => Color::Yellow,
        };
        // Clamp the span so a diagnostic at EOF still renders.
        let end = (self.span.end as usize).min(source.len());
        let start = (self.span.start as usize).min(end);

        let mut report = Report::build(kind, (filename, start..end))
            .with_code(self.code)
            .with_message(&self.message)
            .with_label(
                Label::new((filename, start..end))
                    .with_message(&self.message)
                    .with_color(color),
            );
        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        let mut buf = Vec::new();
        let _ = report
            .finish()
            .write((filename, Source::from(source)), &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Edit distance between two names.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Closest candidate to `name` within the fuzzy-suggestion cutoff, used for
/// "did you mean" help text. The cutoff scales with name length so short
/// names only match near-exact candidates.
pub fn suggest_similar<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let cutoff = 1 + name.chars().count() / 4;
    candidates
        .into_iter()
        .filter(|c| !c.is_empty())
        .map(|c| (levenshtein(name, c), c))
        .filter(|&(d, _)| d <= cutoff && d > 0)
        .min_by_key(|&(d, _)| d)
        .map(|(_, c)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn suggests_close_names_only() {
        let candidates = ["helper", "handle", "distance"];
        assert_eq!(
            suggest_similar("helpr", candidates),
            Some("helper".to_string())
        );
        assert_eq!(suggest_similar("zzz", candidates), None);
    }

    #[test]
    fn exact_match_is_not_a_suggestion() {
        assert_eq!(suggest_similar("helper", ["helper"]), None);
    }

    #[test]
    fn render_includes_code_and_message() {
        let src = "let x = missing_fn()\n";
        let d = Diagnostic::error("E0001", "unknown name `missing_fn`", Span::new(8, 18))
            .with_help("did you mean `missing`?");
        let out = d.render(src, "main.snow");
        assert!(out.contains("E0001"));
        assert!(out.contains("unknown name"));
    }
}
