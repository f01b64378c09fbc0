//! The "duck expression" two-level parse for f-strings.
//!
//! Each embedded expression's source text is lexed and parsed by a fresh
//! [`Lexer`]/[`Parser`] pair, independent of the outer parse; only the
//! outer location is propagated into any error so diagnostics still point
//! at the right place in the containing file (`spec.md` §9).

use crate::ast::FStringExprPart;
use crate::diagnostics::{Diagnostic, Span};
use crate::lexer::{FStringPart, Lexer};

use super::Parser;

pub fn lower_fstring_parts(
    parts: &[FStringPart],
    outer_span: &Span,
) -> Result<Vec<FStringExprPart>, Diagnostic> {
    parts
        .iter()
        .map(|part| lower_part(part, outer_span))
        .collect()
}

fn lower_part(part: &FStringPart, outer_span: &Span) -> Result<FStringExprPart, Diagnostic> {
    match part {
        FStringPart::Literal(text) => Ok(FStringExprPart::Literal(text.clone())),
        FStringPart::Expr(src) => Ok(FStringExprPart::Expr {
            expr: Box::new(parse_embedded_expr(src, outer_span)?),
            format_spec: None,
        }),
        FStringPart::ExprWithSpec(src, spec) => Ok(FStringExprPart::Expr {
            expr: Box::new(parse_embedded_expr(src, outer_span)?),
            format_spec: Some(spec.clone()),
        }),
    }
}

fn parse_embedded_expr(
    src: &str,
    outer_span: &Span,
) -> Result<crate::ast::Expr, Diagnostic> {
    let tokens = Lexer::new(src).lex().map_err(|_| {
        Diagnostic::syntax(
            format!("failed to lex f-string expression '{src}'"),
            Some(outer_span.clone()),
            src,
        )
    })?;

    let mut sub_parser = Parser::new(tokens, src);
    sub_parser.parse_expression().map_err(|_| {
        Diagnostic::syntax(
            format!("failed to parse f-string expression '{src}'"),
            Some(outer_span.clone()),
            src,
        )
    })
}
