//! User-facing rendering of [`mdx_ast::Error`] (spec.md §7), grounded on the
//! teacher's `error_message.rs`. Simplified for a single source string: the
//! pipeline only ever compiles one query at a time, so there's no
//! multi-file `SourceTree`/cache to thread through, just the original MDX
//! text the error's span indexes into.

use std::fmt::{self, Debug, Display, Formatter};
use std::io::stderr;
use std::ops::Range;

use anstream::adapter::strip_str;
use ariadne::{Cache, Config, Label, Report, ReportKind, Source};
use serde::Serialize;

use mdx_ast::{Error, Errors, MessageKind};

/// Line/column location of an error within the source, 0-based on both
/// axes to match the teacher's convention.
#[derive(Debug, Clone, Serialize)]
pub struct SourceLocation {
    pub start: (usize, usize),
    pub end: (usize, usize),
}

#[derive(Clone, Serialize)]
pub struct ErrorMessage {
    pub kind: MessageKind,
    pub code: Option<String>,
    pub reason: String,
    pub hints: Vec<String>,
    pub span: Option<mdx_ast::Span>,
    pub display: Option<String>,
    pub location: Option<SourceLocation>,
}

impl From<Error> for ErrorMessage {
    fn from(e: Error) -> Self {
        log::debug!("{:#?}", e);
        ErrorMessage {
            code: e.code.map(str::to_string),
            kind: e.kind,
            reason: e.reason.to_string(),
            hints: e.hints,
            span: e.span,
            display: None,
            location: None,
        }
    }
}

impl Display for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // https://github.com/zesterer/ariadne/issues/52
        if let Some(display) = &self.display {
            let trimmed = display
                .split('\n')
                .map(str::trim_end)
                .collect::<Vec<_>>()
                .join("\n");
            f.write_str(&trimmed)?;
        } else {
            let code = (self.code.as_ref())
                .map(|c| format!("[{c}] "))
                .unwrap_or_default();
            writeln!(f, "{}Error: {}", code, &self.reason)?;
            for hint in &self.hints {
                writeln!(f, "  Hint: {}", hint)?;
            }
        }
        Ok(())
    }
}

impl Debug for ErrorMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessages {
    pub inner: Vec<ErrorMessage>,
}

impl std::error::Error for ErrorMessages {}

impl Display for ErrorMessages {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for e in &self.inner {
            Display::fmt(e, f)?;
        }
        Ok(())
    }
}

impl From<ErrorMessage> for ErrorMessages {
    fn from(e: ErrorMessage) -> Self {
        ErrorMessages { inner: vec![e] }
    }
}

impl From<Error> for ErrorMessages {
    fn from(e: Error) -> Self {
        ErrorMessages {
            inner: vec![ErrorMessage::from(e)],
        }
    }
}

impl From<Errors> for ErrorMessages {
    fn from(errs: Errors) -> Self {
        ErrorMessages {
            inner: errs.0.into_iter().map(ErrorMessage::from).collect(),
        }
    }
}

impl ErrorMessages {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }

    /// Computes each message's location and ariadne-rendered display
    /// against `source`, the original MDX text.
    pub fn composed(mut self, source_name: &str, source: &str) -> Self {
        let mut cache = SingleFileCache::new(source_name, source);

        for e in &mut self.inner {
            let Some(span) = e.span else {
                continue;
            };
            e.location = compose_location(source, span);
            e.display = compose_display(e, source_name, &mut cache);
        }
        self
    }
}

fn compose_location(source: &str, span: mdx_ast::Span) -> Option<SourceLocation> {
    let src = Source::from(source);
    let start = src.get_offset_line(span.start)?;
    let end = src.get_offset_line(span.end)?;
    Some(SourceLocation {
        start: (start.1, start.2),
        end: (end.1, end.2),
    })
}

fn compose_display(
    e: &ErrorMessage,
    source_name: &str,
    cache: &mut SingleFileCache,
) -> Option<String> {
    let config = Config::default().with_color(true);
    let span = Range::from(e.span?);

    let mut report = Report::build(ReportKind::Error, source_name.to_string(), span.start)
        .with_config(config)
        .with_label(Label::new((source_name.to_string(), span)).with_message(&e.reason));

    if let Some(code) = &e.code {
        report = report.with_code(code);
    }
    if !e.hints.is_empty() {
        report.set_help(&e.hints[0]);
    }
    if e.hints.len() > 1 {
        report.set_note(&e.hints[1]);
    }

    let mut out = Vec::new();
    report.finish().write(&mut *cache, &mut out).ok()?;
    String::from_utf8(out).ok().map(|s| maybe_strip_colors(&s))
}

fn should_use_color() -> bool {
    !matches!(
        anstream::AutoStream::choice(&stderr()),
        anstream::ColorChoice::Never
    )
}

pub(crate) fn maybe_strip_colors(s: &str) -> String {
    if !should_use_color() {
        strip_str(s).to_string()
    } else {
        s.to_string()
    }
}

/// A `Cache` of exactly one file, since this pipeline only ever sees one
/// source string at a time; any id `fetch`/`display` is asked about
/// resolves to the same source.
struct SingleFileCache {
    source: Source,
}

impl SingleFileCache {
    fn new(_name: &str, source: &str) -> Self {
        SingleFileCache {
            source: Source::from(source),
        }
    }
}

impl Cache<String> for SingleFileCache {
    type Storage = String;

    fn fetch(&mut self, _id: &String) -> Result<&Source, Box<dyn fmt::Debug + '_>> {
        Ok(&self.source)
    }

    fn display<'b>(&self, id: &'b String) -> Option<Box<dyn fmt::Display + 'b>> {
        Some(Box::new(id.clone()))
    }
}

#[cfg(test)]
mod test {
    use mdx_ast::WithErrorInfo;

    use super::*;

    #[test]
    fn composes_display_for_a_spanned_error() {
        let source = "SELECT {[Measures].[Sales Amount} ON 0 FROM [Cube]";
        let err = Error::new_simple("unterminated bracket").with_span(Some(mdx_ast::Span {
            start: 18,
            end: 33,
        }));
        let messages: ErrorMessages = err.into();
        let composed = messages.composed("query.mdx", source);
        assert!(composed.inner[0].location.is_some());
        assert!(composed.inner[0].display.is_some());
    }

    #[test]
    fn display_without_composing_falls_back_to_plain_text() {
        let err = Error::new_simple("bad cube reference").push_hint("check the cube name");
        let messages: ErrorMessages = err.into();
        let rendered = messages.to_string();
        assert!(rendered.contains("bad cube reference"));
        assert!(rendered.contains("check the cube name"));
    }
}
