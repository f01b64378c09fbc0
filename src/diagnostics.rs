//! Source locations and the four diagnostic kinds raised by the pipeline.
//!
//! Every stage tags its errors with `(line, column, source_line)` so a
//! caller can render a caret under the offending character, the same way
//! `why_lib`'s `lexer::Span` renders a squiggle under a lexer/parser error.

use std::fmt::{self, Display};

use colored::Colorize;

/// A single point location in a source file, 1-indexed for humans.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// The four error kinds described in the error-handling design: syntax
/// errors from the lexer/parser, semantic errors from the checker,
/// code-generation errors from the codegen, and runtime errors, which this
/// crate never constructs itself but which the JIT-driver collaborator may
/// wrap around an executed module's failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    Syntax {
        message: String,
        span: Option<Span>,
        source_line: Option<String>,
    },
    Semantic {
        message: String,
        span: Option<Span>,
        source_line: Option<String>,
    },
    Codegen {
        message: String,
        span: Option<Span>,
        source_line: Option<String>,
    },
    Runtime {
        message: String,
    },
}

impl Diagnostic {
    pub fn syntax(message: impl Into<String>, span: Option<Span>, source: &str) -> Self {
        Self::Syntax {
            message: message.into(),
            source_line: span.as_ref().and_then(|s| source_line(source, s)),
            span,
        }
    }

    pub fn semantic(message: impl Into<String>, span: Option<Span>, source: &str) -> Self {
        Self::Semantic {
            message: message.into(),
            source_line: span.as_ref().and_then(|s| source_line(source, s)),
            span,
        }
    }

    /// Wraps an internal code-generation failure with the location of the
    /// AST node being lowered when it happened, if any.
    pub fn codegen(message: impl Into<String>, span: Option<Span>, source: &str) -> Self {
        Self::Codegen {
            message: message.into(),
            source_line: span.as_ref().and_then(|s| source_line(source, s)),
            span,
        }
    }

    /// Builds a code-generation error directly from an AST node's cached
    /// location, without re-scanning the source text the way
    /// [`Self::codegen`] does — the code generator never holds the whole
    /// source string, only the `NodeInfo` it lowered.
    pub fn codegen_at(message: impl Into<String>, span: Span, source_line: Option<String>) -> Self {
        Self::Codegen {
            message: message.into(),
            span: Some(span),
            source_line,
        }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::Syntax { span, .. } | Self::Semantic { span, .. } | Self::Codegen { span, .. } => {
                span.as_ref()
            }
            Self::Runtime { .. } => None,
        }
    }

    fn kind_label(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "syntax error",
            Self::Semantic { .. } => "semantic error",
            Self::Codegen { .. } => "code generation error",
            Self::Runtime { .. } => "runtime error",
        }
    }

    fn message_str(&self) -> &str {
        match self {
            Self::Syntax { message, .. }
            | Self::Semantic { message, .. }
            | Self::Codegen { message, .. }
            | Self::Runtime { message } => message,
        }
    }
}

pub(crate) fn source_line(source: &str, span: &Span) -> Option<String> {
    source.lines().nth(span.line.saturating_sub(1)).map(str::to_owned)
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = self.kind_label().red().bold();
        write!(f, "{label}: {}", self.message_str())?;

        let (span, source_line) = match self {
            Self::Syntax { span, source_line, .. }
            | Self::Semantic { span, source_line, .. }
            | Self::Codegen { span, source_line, .. } => (span, source_line),
            Self::Runtime { .. } => return Ok(()),
        };

        let Some(span) = span else { return Ok(()) };

        write!(f, " ({span})")?;

        if let Some(line) = source_line {
            let margin = " ".repeat(span.line.to_string().len());
            write!(f, "\n{margin} |\n{line_no} | {line}", line_no = span.line)?;
            let caret_pad = " ".repeat(span.column.saturating_sub(1));
            write!(f, "\n{margin} | {caret_pad}{}", "^--- here".red())?;
        }

        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_caret_under_column() {
        let source = "let a: int = \n";
        let diag = Diagnostic::syntax(
            "unexpected end of input",
            Some(Span::new(1, 14)),
            source,
        );
        let rendered = format!("{diag}");
        assert!(rendered.contains("unexpected end of input"));
        assert!(rendered.contains("1:14"));
    }

    #[test]
    fn runtime_diagnostic_has_no_span() {
        let diag = Diagnostic::runtime("division by zero");
        assert!(diag.span().is_none());
    }
}
