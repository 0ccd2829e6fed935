use crate::{language::errors::Diagnostic as SemanticError, runtime::error::RuntimeError};
use miette::{Diagnostic, GraphicalReportHandler, NamedSource, NarratableReportHandler, Report, SourceSpan};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct SemanticDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SemanticDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &SemanticError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help(),
            message: err.to_string(),
            label: err.code.category().to_string(),
        }
    }
}

/// Plain-text rendering of every diagnostic against `source`, one report
/// after another.
pub fn render_diagnostics<'a>(
    name: &str,
    source: &str,
    errors: impl IntoIterator<Item = &'a SemanticError>,
) -> String {
    let src = NamedSource::new(name, source.to_string());
    let handler = NarratableReportHandler::new();
    let mut rendered = String::new();
    for err in errors {
        let diagnostic = SemanticDiagnostic::from_error(src.clone(), err);
        if handler.render_report(&mut rendered, &diagnostic).is_err() {
            rendered.push_str(&err.to_string());
        }
        rendered.push('\n');
    }
    rendered
}

/// Colored rendering for terminals.
pub fn render_graphical(name: &str, source: &str, err: &SemanticError) -> String {
    let diagnostic = SemanticDiagnostic::from_error(NamedSource::new(name, source.to_string()), err);
    let mut rendered = String::new();
    if GraphicalReportHandler::new()
        .render_report(&mut rendered, &diagnostic)
        .is_err()
    {
        rendered = err.to_string();
    }
    rendered
}

pub fn emit_diagnostics<'a>(name: &str, source: &str, errors: impl IntoIterator<Item = &'a SemanticError>) {
    let src = NamedSource::new(name, source.to_string());
    for err in errors {
        let diagnostic = SemanticDiagnostic::from_error(src.clone(), err);
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn report_runtime_error(error: &RuntimeError) {
    eprintln!("Runtime error E{}: {}", error.code(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{errors::ErrorCode, span::Span};

    #[test]
    fn narrated_report_names_code_and_fix() {
        let source = "Int x = y;";
        let err = SemanticError::new(ErrorCode::Undeclared, Span::new(8, 9)).arg("y");
        let rendered = render_diagnostics("main.ql", source, [&err]);
        assert!(rendered.contains("E102"), "{rendered}");
        assert!(rendered.contains("`y`"), "{rendered}");
    }
}
