//! # Semantic Checker
//!
//! Runs after parsing and module resolution, before code generation. Two
//! independent validations (`spec.md` §4.4):
//!
//! - return-type consistency: every `Function`'s declared return type
//!   agrees with whether its `Return` statements carry a value,
//! - f-string parts: every non-literal part of an `FString` must be a
//!   non-null parsed expression. A part that fails to parse at all is
//!   already caught by the parser's f-string sub-parser; what this pass
//!   additionally rejects is a syntactically valid `{null}` interpolation,
//!   which the parser has no reason to reject on its own.
//!
//! Deep type compatibility of a `Return`'s value against the declared
//! return type is deliberately not checked here; that's left to the code
//! generator's LLVM type checks, per `spec.md` §4.4.

use crate::ast::{Expr, FStringExprPart, Program, Stmt, TypeAnnotation};
use crate::diagnostics::Diagnostic;

pub fn check_program(program: &Program) -> Result<(), Diagnostic> {
    for stmt in &program.statements {
        if let Stmt::Function {
            name,
            return_type,
            body,
            ..
        } = stmt
        {
            check_return_consistency(name, return_type, body)?;
        }
        check_fstrings_in_stmt(stmt)?;
    }
    Ok(())
}

fn check_return_consistency(
    function_name: &str,
    return_type: &TypeAnnotation,
    body: &[Stmt],
) -> Result<(), Diagnostic> {
    let mut returns = vec![];
    collect_returns(body, &mut returns);

    for ret in returns {
        let Stmt::Return { value, info } = ret else {
            unreachable!("collect_returns only pushes Stmt::Return")
        };

        match (return_type, value) {
            (TypeAnnotation::Void, Some(value_expr)) => {
                let suggested = infer_type(value_expr);
                return Err(Diagnostic::semantic(
                    format!(
                        "function '{function_name}' is declared to return void but returns a value; did you mean '-> {suggested}'?"
                    ),
                    Some(info.span.clone()),
                    info.source_line.as_deref().unwrap_or(""),
                ));
            }
            (other, None) if !matches!(other, TypeAnnotation::Void) => {
                return Err(Diagnostic::semantic(
                    format!(
                        "function '{function_name}' is declared to return '{other}' but has a bare 'return' with no value"
                    ),
                    Some(info.span.clone()),
                    info.source_line.as_deref().unwrap_or(""),
                ));
            }
            _ => {}
        }
    }

    Ok(())
}

/// Collects every `Return` statement reachable from `stmts`, descending
/// into `If`/`While` branches but not into nested `Function` definitions
/// (a nested function's returns belong to its own declared return type).
fn collect_returns<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Stmt>) {
    for stmt in stmts {
        match stmt {
            Stmt::Return { .. } => out.push(stmt),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_returns(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_returns(else_branch, out);
                }
            }
            Stmt::While { body, .. } => collect_returns(body, out),
            _ => {}
        }
    }
}

fn check_fstrings_in_stmt(stmt: &Stmt) -> Result<(), Diagnostic> {
    match stmt {
        Stmt::Assignment { value, .. }
        | Stmt::StructAssignment { value, .. }
        | Stmt::NestedStructAssignment { value, .. }
        | Stmt::Print { value, .. }
        | Stmt::ExprStmt { value, .. } => check_fstrings_in_expr(value),
        Stmt::ArrayAssignment { index, value, .. } => {
            check_fstrings_in_expr(index)?;
            check_fstrings_in_expr(value)
        }
        Stmt::ArrayFieldAssignment { index, value, .. } => {
            check_fstrings_in_expr(index)?;
            check_fstrings_in_expr(value)
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            check_fstrings_in_expr(condition)?;
            for s in then_branch {
                check_fstrings_in_stmt(s)?;
            }
            if let Some(else_branch) = else_branch {
                for s in else_branch {
                    check_fstrings_in_stmt(s)?;
                }
            }
            Ok(())
        }
        Stmt::While { condition, body, .. } => {
            check_fstrings_in_expr(condition)?;
            for s in body {
                check_fstrings_in_stmt(s)?;
            }
            Ok(())
        }
        Stmt::Return { value: Some(v), .. } => check_fstrings_in_expr(v),
        Stmt::Return { value: None, .. } | Stmt::Break { .. } | Stmt::Use { .. } => Ok(()),
        Stmt::StructDefinition { .. } => Ok(()),
        Stmt::Function { body, .. } => {
            for s in body {
                check_fstrings_in_stmt(s)?;
            }
            Ok(())
        }
    }
}

fn check_fstrings_in_expr(expr: &Expr) -> Result<(), Diagnostic> {
    match expr {
        Expr::FString(parts, _) => {
            for part in parts {
                if let FStringExprPart::Expr { expr, .. } = part {
                    if let Expr::Null(info) = expr.as_ref() {
                        return Err(Diagnostic::semantic(
                            "f-string interpolation cannot be null",
                            Some(info.span.clone()),
                            info.source_line.as_deref().unwrap_or(""),
                        ));
                    }
                    check_fstrings_in_expr(expr)?;
                }
            }
            Ok(())
        }
        Expr::Array { elements, .. } => {
            for e in elements {
                check_fstrings_in_expr(e)?;
            }
            Ok(())
        }
        Expr::Zeros { size, .. } => check_fstrings_in_expr(size),
        Expr::ArrayAccess { name, index, .. } => {
            check_fstrings_in_expr(name)?;
            check_fstrings_in_expr(index)
        }
        Expr::StructAccess { base, .. } => check_fstrings_in_expr(base),
        Expr::StructAccessFromArray { array_access, .. } => check_fstrings_in_expr(array_access),
        Expr::StringCharAccess { literal, index, .. } => {
            check_fstrings_in_expr(literal)?;
            check_fstrings_in_expr(index)
        }
        Expr::BinaryOp { lhs, rhs, .. } | Expr::Concat { lhs, rhs, .. } => {
            check_fstrings_in_expr(lhs)?;
            check_fstrings_in_expr(rhs)
        }
        Expr::UnaryOp { operand, .. } => check_fstrings_in_expr(operand),
        Expr::Cast { expr, .. } => check_fstrings_in_expr(expr),
        Expr::Reference { expr, .. } => check_fstrings_in_expr(expr),
        Expr::Call { args, .. } | Expr::StructConstructor { args, .. } => {
            for a in args {
                check_fstrings_in_expr(a)?;
            }
            Ok(())
        }
        Expr::Number(_, _)
        | Expr::Float(_, _)
        | Expr::Str(_, _)
        | Expr::Bool(_, _)
        | Expr::Null(_)
        | Expr::Identifier(_, _) => Ok(()),
    }
}

/// Heuristic return-type suggestion for a `void`-declared function that
/// returns a value, per `spec.md` §4.4. Diagnostics-only; never drives
/// code generation.
fn infer_type(expr: &Expr) -> TypeAnnotation {
    match expr {
        Expr::Number(_, _) => TypeAnnotation::Int,
        Expr::Float(_, _) => TypeAnnotation::Float,
        Expr::Str(_, _) | Expr::FString(_, _) | Expr::Concat { .. } => TypeAnnotation::String,
        Expr::Bool(_, _) => TypeAnnotation::Bool,
        Expr::BinaryOp { lhs, op, rhs, .. } => infer_binary_op(lhs, *op, rhs),
        Expr::UnaryOp { .. } => TypeAnnotation::Bool,
        Expr::Identifier(name, _) => infer_from_identifier_name(name),
        Expr::Cast { target_type, .. } => target_type.clone(),
        Expr::ArrayAccess { .. }
        | Expr::StructAccess { .. }
        | Expr::StructAccessFromArray { .. }
        | Expr::StringCharAccess { .. }
        | Expr::Array { .. }
        | Expr::Zeros { .. }
        | Expr::Reference { .. }
        | Expr::Call { .. }
        | Expr::StructConstructor { .. }
        | Expr::Null(_) => TypeAnnotation::Int,
    }
}

fn infer_binary_op(lhs: &Expr, op: crate::ast::BinaryOp, rhs: &Expr) -> TypeAnnotation {
    use crate::ast::BinaryOp::*;
    match op {
        Gt | Lt | Ge | Le | Eq | Ne | And | Or => TypeAnnotation::Bool,
        Add | Sub | Mul | Div | Mod => {
            if matches!(infer_type(lhs), TypeAnnotation::Float)
                || matches!(infer_type(rhs), TypeAnnotation::Float)
            {
                TypeAnnotation::Float
            } else {
                TypeAnnotation::Int
            }
        }
    }
}

fn infer_from_identifier_name(name: &str) -> TypeAnnotation {
    let lower = name.to_lowercase();
    const INT_HINTS: &[&str] = &["count", "size", "length", "index", "hash", "i", "j", "k"];
    const STRING_HINTS: &[&str] = &["name", "key", "text", "str", "message"];
    const BOOL_HINTS: &[&str] = &["found", "valid", "ok", "flag"];

    if INT_HINTS.iter().any(|h| lower.contains(h)) {
        TypeAnnotation::Int
    } else if STRING_HINTS.iter().any(|h| lower.contains(h)) {
        TypeAnnotation::String
    } else if BOOL_HINTS.iter().any(|h| lower.contains(h)) {
        TypeAnnotation::Bool
    } else {
        TypeAnnotation::Int
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    #[test]
    fn void_function_returning_a_value_is_rejected() {
        let program = parse_source("func f() -> void\nreturn 1\nend").unwrap();
        let err = check_program(&program).unwrap_err();
        assert!(format!("{err}").contains("void"));
    }

    #[test]
    fn non_void_function_with_bare_return_is_rejected() {
        let program = parse_source("func f() -> int\nreturn\nend").unwrap();
        let err = check_program(&program).unwrap_err();
        assert!(format!("{err}").contains("bare 'return'"));
    }

    #[test]
    fn matching_return_types_pass() {
        let program = parse_source("func f() -> int\nreturn 1\nend").unwrap();
        assert!(check_program(&program).is_ok());
        let program = parse_source("func f() -> void\nreturn\nend").unwrap();
        assert!(check_program(&program).is_ok());
    }

    #[test]
    fn returns_inside_if_and_while_are_collected() {
        let program =
            parse_source("func f() -> void\nif true then\nreturn 1\nend\nend").unwrap();
        assert!(check_program(&program).is_err());
    }

    #[test]
    fn null_fstring_interpolation_is_rejected() {
        let program = parse_source(r#"print(f"{null}")"#).unwrap();
        assert!(check_program(&program).is_err());
    }

    #[test]
    fn suggestion_infers_int_for_numeric_literal() {
        assert_eq!(
            infer_type(&Expr::Number(1, crate::ast::NodeInfo::dummy())),
            TypeAnnotation::Int
        );
    }
}
