//! One error shape for every way a render can fail.
//!
//! Failures are checked in a fixed order (validation, then data parsing, then
//! the template itself) so the caller sees the earliest problem, not whichever
//! stage happened to notice something first.

use std::fmt::Write as _;

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::executor::{EvalError, EvalErrorKind};
use crate::parser::ParseError;

/// Which stage a render failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The request did not have the expected shape
    Validation,
    /// The data document is not valid JSON
    Parse,
    /// The template is structurally broken or its script does not parse
    Compile,
    /// Template script threw while running
    Runtime,
    /// Anything else; a bug in the engine
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Parse => "parse",
            ErrorKind::Compile => "compile",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RenderError {
    pub kind: ErrorKind,
    pub message: String,
    /// 1-based template line, when one could be determined
    pub line: Option<u32>,
    pub column: Option<u32>,
    /// Set when `line` came from the source map rather than from the
    /// evaluator's own diagnostics, so it may be off
    pub line_is_estimate: bool,
    /// Underlying cause text, e.g. the JSON parser's message
    pub cause: Option<String>,
    /// Context snippet around the failing line, or a stack trace
    pub raw: Option<String>,
}

impl RenderError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
            column: None,
            line_is_estimate: false,
            cause: None,
            raw: None,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// The data field is not valid JSON.
    pub fn invalid_data(err: &serde_json::Error) -> Self {
        let mut error = Self::new(ErrorKind::Parse, "Invalid JSON data");
        error.cause = Some(err.to_string());
        error
    }

    pub fn internal(cause: impl Into<String>) -> Self {
        let mut error = Self::new(ErrorKind::Internal, "Internal server error");
        error.cause = Some(cause.into());
        error
    }

    pub(crate) fn unclosed_tag(err: &ParseError) -> Self {
        let mut error = Self::new(ErrorKind::Compile, err.to_string());
        error.line = Some(err.line);
        error.column = Some(err.column);
        error
    }

    /// Convert an evaluator failure. `fallback_line` is used when the
    /// evaluator could not say where it failed.
    pub(crate) fn from_eval(err: EvalError, fallback_line: Option<u32>) -> Self {
        let kind = match err.kind {
            EvalErrorKind::Syntax => ErrorKind::Compile,
            EvalErrorKind::Runtime => ErrorKind::Runtime,
        };
        let mut error = Self::new(kind, err.message);
        match err.line {
            Some(line) => {
                error.line = Some(line);
                error.column = err.column;
            }
            None => {
                error.line = fallback_line;
                error.line_is_estimate = fallback_line.is_some();
            }
        }
        error.cause = err.stack;
        error
    }

    /// Attach a context snippet of `source` around the error line.
    pub fn with_snippet(mut self, source: &str) -> Self {
        if let Some(line) = self.line {
            self.raw = Some(snippet(source, line, &self.message));
        }
        self
    }

    /// Short detail line for the wire format and notifications.
    pub fn details(&self) -> Option<String> {
        match self.kind {
            ErrorKind::Parse | ErrorKind::Internal => self.cause.clone(),
            ErrorKind::Compile | ErrorKind::Runtime => self.line.map(|line| {
                if self.line_is_estimate {
                    format!("Error near line {line}")
                } else {
                    format!("Error on line {line}")
                }
            }),
            ErrorKind::Validation => None,
        }
    }

    /// Build a miette diagnostic pointing into `source`.
    pub fn to_diagnostic(&self, name: &str, source: &str) -> RenderDiagnostic {
        let span = self
            .line
            .and_then(|line| span_of(source, line, self.column.unwrap_or(1)));
        let help = match self.kind {
            ErrorKind::Runtime => self.cause.clone(),
            _ => self.details().filter(|_| span.is_none()),
        };
        RenderDiagnostic {
            message: self.message.clone(),
            kind: self.kind,
            help,
            label: if self.line_is_estimate {
                "somewhere around here"
            } else {
                "here"
            },
            span,
            src: NamedSource::new(name, source.to_string()),
        }
    }
}

/// Terminal-friendly view of a [`RenderError`].
#[derive(Debug, Error, Diagnostic)]
#[error("{kind} error: {message}")]
#[diagnostic(code(kiln::render))]
pub struct RenderDiagnostic {
    pub message: String,
    pub kind: ErrorKind,
    /// Script stack trace for runtime failures, otherwise the detail line
    /// when there is no span to point at
    #[help]
    pub help: Option<String>,
    pub label: &'static str,
    #[label("{label}")]
    pub span: Option<SourceSpan>,
    #[source_code]
    pub src: NamedSource<String>,
}

/// Byte span covering `line` from `column` to the end of the line.
fn span_of(source: &str, line: u32, column: u32) -> Option<SourceSpan> {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line as usize {
            let content = text.trim_end_matches(['\n', '\r']);
            let start = content
                .char_indices()
                .nth(column.saturating_sub(1) as usize)
                .map(|(i, _)| i)
                .unwrap_or(0);
            let len = (content.len() - start).max(1);
            return Some(SourceSpan::from((offset + start, len)));
        }
        offset += text.len();
    }
    None
}

/// Up to three lines either side of `line`, with the failing one marked.
pub fn snippet(source: &str, line: u32, message: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let line = line as usize;
    let start = line.saturating_sub(3).max(1);
    let end = (line + 3).min(lines.len());
    let width = end.to_string().len();

    let mut out = format!("template:{line}\n");
    for number in start..=end {
        let marker = if number == line { ">>" } else { "  " };
        let text = lines.get(number - 1).copied().unwrap_or("");
        let _ = writeln!(out, " {marker} {number:>width$}| {text}");
    }
    out.push('\n');
    out.push_str(message);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn details_follow_the_error_kind() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let parse = RenderError::invalid_data(&json_err);
        assert_eq!(parse.message, "Invalid JSON data");
        assert!(parse.details().unwrap().contains("line 1"));

        let eval = EvalError::runtime("ReferenceError: x is not defined").at(4, 7);
        let runtime = RenderError::from_eval(eval, Some(9));
        assert_eq!(runtime.line, Some(4));
        assert_eq!(runtime.details().as_deref(), Some("Error on line 4"));

        let lost = RenderError::from_eval(EvalError::runtime("boom"), Some(9));
        assert!(lost.line_is_estimate);
        assert_eq!(lost.details().as_deref(), Some("Error near line 9"));

        assert_eq!(RenderError::validation("Template must be a string").details(), None);
    }

    #[test]
    fn snippet_marks_the_failing_line() {
        let source = "<ul>\n<% items.forEach(i => { %>\n  <li><%= i.nme.x %></li>\n<% }) %>\n</ul>";
        insta::assert_snapshot!(snippet(source, 3, "TypeError: boom"), @r"
        template:3
            1| <ul>
            2| <% items.forEach(i => { %>
         >> 3|   <li><%= i.nme.x %></li>
            4| <% }) %>
            5| </ul>

        TypeError: boom
        ");
    }

    #[test]
    fn diagnostic_span_points_at_the_column() {
        let source = "one\ntwo <%= x %>\n";
        let mut error = RenderError::new(ErrorKind::Runtime, "boom");
        error.line = Some(2);
        error.column = Some(9);
        let diagnostic = error.to_diagnostic("page.ejs", source);
        let span = diagnostic.span.unwrap();
        assert_eq!(&source[span.offset()..span.offset() + span.len()], "x %>");
    }
}
