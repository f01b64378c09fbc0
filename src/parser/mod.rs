//! # Parser
//!
//! Recursive descent over the token vector produced by [`crate::lexer::Lexer`].
//! Tracks three pieces of state while it walks:
//!
//! - `declared_structs`, so `Name(args)` can be classified as
//!   [`Expr::StructConstructor`] vs [`Expr::Call`] without a later pass,
//! - `declared_functions`, kept for the module resolver's benefit (a
//!   function's own name must not count as one of its "free identifiers"),
//! - `depth`, the function-nesting depth, so a bare `let` at depth 0
//!   becomes a global binding and at depth >= 1 a local one (`global`
//!   always forces global regardless of depth).
//!
//! Every statement and expression keeps its own [`NodeInfo`]: the
//! `(line, column)` of the first token consumed plus the full source line,
//! so downstream diagnostics can render a caret without re-scanning.

mod fstring;

use std::collections::HashSet;

use crate::ast::{
    AssignmentKind, BinaryOp, Expr, NodeInfo, Program, Stmt, TypeAnnotation, UnaryOp,
};
use crate::diagnostics::{Diagnostic, Span};
use crate::lexer::{Lexer, Token, TokenKind};

pub type ParseResult<T> = Result<T, Diagnostic>;

/// Parses a whole source file: lexes it, then runs the recursive-descent
/// parser over the resulting tokens.
pub fn parse_source(source: &str) -> ParseResult<Program> {
    let tokens = Lexer::new(source).lex()?;
    Parser::new(tokens, source).parse_program()
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    declared_structs: HashSet<String>,
    declared_functions: HashSet<String>,
    /// Namespace prefixes recognised for the `a.b` "is this a struct
    /// access or a namespaced symbol lookup" decision. Seeded with
    /// Noxy's four standard-library namespaces and grown as `use`
    /// statements are parsed, rather than hard-coding the four names as
    /// the only possible namespaces (`spec.md` §9 flags the hard-coded
    /// version as a stopgap).
    imported_namespaces: HashSet<String>,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            source,
            declared_structs: HashSet::new(),
            declared_functions: HashSet::new(),
            imported_namespaces: DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            depth: 0,
        }
    }

    // -- token-stream primitives ------------------------------------------------

    fn current(&self) -> &Token {
        // `lex` always terminates with Eof, and we never advance past it.
        &self.tokens[self.pos]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected {what}, found {:?}",
                self.kind()
            )))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ParseResult<String> {
        match self.kind().clone() {
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error(format!("expected {what}, found {other:?}"))),
        }
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::syntax(message, Some(self.current().span.clone()), self.source)
    }

    fn node_info(&self, span: Span) -> NodeInfo {
        let source_line = crate::diagnostics::source_line(self.source, &span);
        NodeInfo::new(span, source_line)
    }

    // -- program -----------------------------------------------------------------

    pub fn parse_program(&mut self) -> ParseResult<Program> {
        let mut statements = vec![];
        while !self.at_eof() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    fn parse_block_until(&mut self, terminators: &[TokenKind]) -> ParseResult<Vec<Stmt>> {
        let mut body = vec![];
        while !terminators.iter().any(|t| self.check(t)) {
            if self.at_eof() {
                return Err(self.error("unexpected end of input inside block"));
            }
            body.push(self.parse_statement()?);
        }
        Ok(body)
    }

    // -- statements ----------------------------------------------------------

    fn parse_statement(&mut self) -> ParseResult<Stmt> {
        match self.kind().clone() {
            TokenKind::Let => self.parse_decl(false),
            TokenKind::Global => self.parse_decl(true),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::Print => self.parse_print(),
            TokenKind::Func => self.parse_function(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Struct => self.parse_struct_def(),
            TokenKind::Break => {
                let span = self.advance().span;
                Ok(Stmt::Break {
                    info: self.node_info(span),
                })
            }
            TokenKind::Use => self.parse_use(),
            TokenKind::Identifier(_) => self.parse_identifier_statement(),
            other => Err(self.error(format!("unexpected token {other:?} at start of statement"))),
        }
    }

    fn parse_decl(&mut self, forced_global: bool) -> ParseResult<Stmt> {
        let span = self.advance().span; // `let` or `global`
        let id = self.expect_identifier("a binding name")?;

        let declared_type = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };

        self.expect(TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;

        let is_global = forced_global || self.depth == 0;

        Ok(Stmt::Assignment {
            kind: AssignmentKind::Declaration,
            id,
            declared_type,
            value,
            is_global,
            info: self.node_info(span),
        })
    }

    /// Handles every statement form that starts with a bare identifier:
    /// array assignment, array-field assignment, (nested) struct
    /// assignment, plain reassignment, and a call/constructor used as a
    /// statement.
    fn parse_identifier_statement(&mut self) -> ParseResult<Stmt> {
        let span = self.current().span.clone();
        let name = self.expect_identifier("an identifier")?;

        if self.eat(&TokenKind::LBracket) {
            let index = self.parse_expression()?;
            self.expect(TokenKind::RBracket, "']'")?;

            if self.check(&TokenKind::Dot) {
                let field_path = self.parse_field_path()?;
                self.expect(TokenKind::Assign, "'='")?;
                let value = self.parse_expression()?;
                return Ok(Stmt::ArrayFieldAssignment {
                    name,
                    index,
                    field_path,
                    value,
                    info: self.node_info(span),
                });
            }

            self.expect(TokenKind::Assign, "'='")?;
            let value = self.parse_expression()?;
            return Ok(Stmt::ArrayAssignment {
                name,
                index,
                value,
                info: self.node_info(span),
            });
        }

        if self.check(&TokenKind::Dot) {
            let field_path = self.parse_field_path()?;
            self.expect(TokenKind::Assign, "'='")?;
            let value = self.parse_expression()?;
            return Ok(if field_path.len() == 1 {
                Stmt::StructAssignment {
                    name,
                    field: field_path.into_iter().next().unwrap(),
                    value,
                    info: self.node_info(span),
                }
            } else {
                Stmt::NestedStructAssignment {
                    name,
                    field_path,
                    value,
                    info: self.node_info(span),
                }
            });
        }

        if self.eat(&TokenKind::Assign) {
            let value = self.parse_expression()?;
            return Ok(Stmt::Assignment {
                kind: AssignmentKind::Reassignment,
                id: name,
                declared_type: None,
                value,
                is_global: false,
                info: self.node_info(span),
            });
        }

        // Not an assignment: re-enter the expression grammar at the
        // postfix level with `name` as the already-consumed primary, so
        // `foo(...)`, `foo.bar(...)`, namespaced calls, etc. all work.
        let base = self.postfix_from_identifier(name, span.clone())?;
        Ok(Stmt::ExprStmt {
            value: base,
            info: self.node_info(span),
        })
    }

    fn parse_field_path(&mut self) -> ParseResult<Vec<String>> {
        let mut path = vec![];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_identifier("a field name")?);
        }
        Ok(path)
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `if`
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Then, "'then'")?;
        let then_branch = self.parse_block_until(&[TokenKind::Else, TokenKind::End])?;
        let else_branch = if self.eat(&TokenKind::Else) {
            Some(self.parse_block_until(&[TokenKind::End])?)
        } else {
            None
        };
        self.expect(TokenKind::End, "'end'")?;
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
            info: self.node_info(span),
        })
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `while`
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Do, "'do'")?;
        let body = self.parse_block_until(&[TokenKind::End])?;
        self.expect(TokenKind::End, "'end'")?;
        Ok(Stmt::While {
            condition,
            body,
            info: self.node_info(span),
        })
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `print`
        self.expect(TokenKind::LParen, "'('")?;
        let value = self.parse_expression()?;
        self.expect(TokenKind::RParen, "')'")?;
        Ok(Stmt::Print {
            value,
            info: self.node_info(span),
        })
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `return`
        let value = if self.starts_expression() {
            Some(self.parse_expression()?)
        } else {
            None
        };
        Ok(Stmt::Return {
            value,
            info: self.node_info(span),
        })
    }

    fn starts_expression(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Integer(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::FString(_)
                | TokenKind::Identifier(_)
                | TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Zeros
                | TokenKind::Minus
                | TokenKind::Bang
                | TokenKind::Ref
                | TokenKind::Int
                | TokenKind::FloatKw
                | TokenKind::StringKw
                | TokenKind::StrKw
                | TokenKind::BoolKw
        )
    }

    fn parse_struct_def(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `struct`
        let name = self.expect_identifier("a struct name")?;
        self.declared_structs.insert(name.clone());

        let mut fields = vec![];
        while !self.check(&TokenKind::End) {
            let field_name = self.expect_identifier("a field name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let field_type = self.parse_type()?;
            fields.push((field_name, field_type));
            self.eat(&TokenKind::Comma);
        }
        self.expect(TokenKind::End, "'end'")?;

        Ok(Stmt::StructDefinition {
            name,
            fields,
            info: self.node_info(span),
        })
    }

    fn parse_function(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `func`
        let name = self.expect_identifier("a function name")?;
        self.declared_functions.insert(name.clone());

        self.expect(TokenKind::LParen, "'('")?;
        let mut params = vec![];
        while !self.check(&TokenKind::RParen) {
            let param_name = self.expect_identifier("a parameter name")?;
            self.expect(TokenKind::Colon, "':'")?;
            let param_type = self.parse_type()?;
            params.push((param_name, param_type));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_type = if self.eat(&TokenKind::Arrow) {
            self.parse_type()?
        } else {
            TypeAnnotation::Void
        };

        self.depth += 1;
        let body = self.parse_block_until(&[TokenKind::End]);
        self.depth -= 1;
        let body = body?;
        self.expect(TokenKind::End, "'end'")?;

        Ok(Stmt::Function {
            name,
            params,
            return_type,
            body,
            info: self.node_info(span),
        })
    }

    fn parse_use(&mut self) -> ParseResult<Stmt> {
        let span = self.advance().span; // `use`
        let mut module = self.expect_identifier("a module name")?;
        while self.eat(&TokenKind::Dot) {
            module.push('.');
            module.push_str(&self.expect_identifier("a module path segment")?);
        }

        let mut import_all = false;
        let mut selected = None;

        if self.eat(&TokenKind::Select) {
            if self.eat(&TokenKind::Star) {
                import_all = true;
            } else {
                let mut names = vec![self.expect_identifier("a selected symbol")?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_identifier("a selected symbol")?);
                }
                selected = Some(names);
            }
        }

        if let Some(last) = module.rsplit('.').next() {
            self.imported_namespaces.insert(last.to_string());
        }
        self.imported_namespaces.insert(module.clone());

        Ok(Stmt::Use {
            module,
            selected,
            import_all,
            info: self.node_info(span),
        })
    }

    // -- types -----------------------------------------------------------------

    fn parse_type(&mut self) -> ParseResult<TypeAnnotation> {
        if self.eat(&TokenKind::Ref) {
            return Ok(TypeAnnotation::Reference(Box::new(self.parse_type()?)));
        }

        let mut base = match self.kind().clone() {
            TokenKind::Int => {
                self.advance();
                TypeAnnotation::Int
            }
            TokenKind::FloatKw => {
                self.advance();
                TypeAnnotation::Float
            }
            TokenKind::StringKw | TokenKind::StrKw => {
                self.advance();
                TypeAnnotation::String
            }
            TokenKind::BoolKw => {
                self.advance();
                TypeAnnotation::Bool
            }
            TokenKind::VoidKw => {
                self.advance();
                TypeAnnotation::Void
            }
            TokenKind::Identifier(name) => {
                self.advance();
                TypeAnnotation::Name(name)
            }
            other => return Err(self.error(format!("expected a type, found {other:?}"))),
        };

        while self.eat(&TokenKind::LBracket) {
            let size = if let TokenKind::Integer(n) = self.kind().clone() {
                self.advance();
                Some(n as usize)
            } else {
                None
            };
            self.expect(TokenKind::RBracket, "']'")?;
            base = TypeAnnotation::Array(Box::new(base), size);
        }

        Ok(base)
    }

    // -- expressions: precedence climbing ---------------------------------------
    //
    // or(|) > and(&) > comparison > additive(+ ++ -) > multiplicative(* / %)
    // > unary(- ! ref) > postfix([] . ()) > primary

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.check(&TokenKind::Pipe) {
            let span = self.advance().span;
            let rhs = self.parse_and()?;
            lhs = Expr::BinaryOp {
                lhs: Box::new(lhs),
                op: BinaryOp::Or,
                rhs: Box::new(rhs),
                info: self.node_info(span),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_comparison()?;
        while self.check(&TokenKind::Ampersand) {
            let span = self.advance().span;
            let rhs = self.parse_comparison()?;
            lhs = Expr::BinaryOp {
                lhs: Box::new(lhs),
                op: BinaryOp::And,
                rhs: Box::new(rhs),
                info: self.node_info(span),
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::GreaterThan => BinaryOp::Gt,
                TokenKind::LessThan => BinaryOp::Lt,
                TokenKind::GreaterOrEqual => BinaryOp::Ge,
                TokenKind::LessOrEqual => BinaryOp::Le,
                TokenKind::Equal => BinaryOp::Eq,
                TokenKind::NotEqual => BinaryOp::Ne,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_additive()?;
            lhs = Expr::BinaryOp {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
                info: self.node_info(span),
            };
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            match self.kind() {
                TokenKind::Plus | TokenKind::PlusPlus => {
                    // `++` is `+`'s alias; both parse to BinaryOp::Add here.
                    // Whether an `Add` desugars to string concatenation
                    // (`Expr::Concat`) depends on operand types, which
                    // aren't known until the checker runs.
                    let span = self.advance().span;
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::BinaryOp {
                        lhs: Box::new(lhs),
                        op: BinaryOp::Add,
                        rhs: Box::new(rhs),
                        info: self.node_info(span),
                    };
                }
                TokenKind::Minus => {
                    let span = self.advance().span;
                    let rhs = self.parse_multiplicative()?;
                    lhs = Expr::BinaryOp {
                        lhs: Box::new(lhs),
                        op: BinaryOp::Sub,
                        rhs: Box::new(rhs),
                        info: self.node_info(span),
                    };
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            let span = self.advance().span;
            let rhs = self.parse_unary()?;
            lhs = Expr::BinaryOp {
                lhs: Box::new(lhs),
                op,
                rhs: Box::new(rhs),
                info: self.node_info(span),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Minus => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                    info: self.node_info(span),
                })
            }
            TokenKind::Bang => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                Ok(Expr::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                    info: self.node_info(span),
                })
            }
            TokenKind::Ref => {
                let span = self.advance().span;
                let expr = self.parse_unary()?;
                Ok(Expr::Reference {
                    expr: Box::new(expr),
                    info: self.node_info(span),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> ParseResult<Expr> {
        let primary = self.parse_primary()?;
        self.continue_postfix(primary)
    }

    /// Entry point used by [`Self::parse_identifier_statement`], which has
    /// already consumed the leading identifier token to disambiguate
    /// assignment forms; re-enters the postfix chain with that identifier
    /// as the seed expression.
    fn postfix_from_identifier(&mut self, name: String, span: Span) -> ParseResult<Expr> {
        let seed = Expr::Identifier(name, self.node_info(span));
        self.continue_postfix(seed)
    }

    fn continue_postfix(&mut self, mut base: Expr) -> ParseResult<Expr> {
        loop {
            match self.kind() {
                TokenKind::LBracket => {
                    let span = self.advance().span;
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    base = match base {
                        Expr::Str(_, _) => Expr::StringCharAccess {
                            literal: Box::new(base),
                            index: Box::new(index),
                            info: self.node_info(span),
                        },
                        other => Expr::ArrayAccess {
                            name: Box::new(other),
                            index: Box::new(index),
                            info: self.node_info(span),
                        },
                    };
                }
                TokenKind::Dot => {
                    base = self.continue_dot_chain(base)?;
                }
                TokenKind::LParen => {
                    let span = self.current().span.clone();
                    let name = match &base {
                        Expr::Identifier(name, _) => name.clone(),
                        _ => return Err(self.error("call target must be a name")),
                    };
                    let args = self.parse_call_args()?;
                    base = if self.declared_structs.contains(&name) {
                        Expr::StructConstructor {
                            name,
                            args,
                            info: self.node_info(span),
                        }
                    } else {
                        Expr::Call {
                            name,
                            args,
                            info: self.node_info(span),
                        }
                    };
                }
                _ => break,
            }
        }
        Ok(base)
    }

    /// Handles one run of `.field` accesses. An array-element base
    /// (`arr[i].a.b`) collects the whole run into a single
    /// [`Expr::StructAccessFromArray`]; anything else either builds
    /// dotted [`Expr::StructAccess`] nodes or, for the reserved namespace
    /// prefixes (`utils`, `math`, `advanced`, `algorithms`), folds into a
    /// single dotted [`Expr::Identifier`] so a following `(` is recognised
    /// as a namespaced call.
    fn continue_dot_chain(&mut self, base: Expr) -> ParseResult<Expr> {
        if matches!(base, Expr::ArrayAccess { .. }) {
            let span = base.info().span.clone();
            let mut field_path = vec![];
            while self.eat(&TokenKind::Dot) {
                field_path.push(self.expect_identifier("a field name")?);
            }
            return Ok(Expr::StructAccessFromArray {
                array_access: Box::new(base),
                field_path,
                info: self.node_info(span),
            });
        }

        if let Expr::Identifier(name, info) = &base {
            if self.imported_namespaces.contains(name) {
                let span = info.span.clone();
                self.advance(); // '.'
                let field = self.expect_identifier("a namespaced member name")?;
                let dotted = format!("{name}.{field}");
                return Ok(Expr::Identifier(dotted, self.node_info(span)));
            }
        }

        let span = base.info().span.clone();
        self.advance(); // '.'
        let field = self.expect_identifier("a field name")?;

        // `a.b(...)`: method-like call, the callee is named `a.b`.
        if self.check(&TokenKind::LParen) {
            if let Expr::Identifier(name, _) = &base {
                let call_span = self.current().span.clone();
                let dotted = format!("{name}.{field}");
                let args = self.parse_call_args()?;
                return Ok(Expr::Call {
                    name: dotted,
                    args,
                    info: self.node_info(call_span),
                });
            }
        }

        Ok(Expr::StructAccess {
            base: Box::new(base),
            field,
            info: self.node_info(span),
        })
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut args = vec![];
        while !self.check(&TokenKind::RParen) {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let span = self.current().span.clone();

        match self.kind().clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Number(n, self.node_info(span)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Float(f, self.node_info(span)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::Str(s, self.node_info(span)))
            }
            TokenKind::FString(parts) => {
                self.advance();
                let lowered = fstring::lower_fstring_parts(&parts, &span)?;
                Ok(Expr::FString(lowered, self.node_info(span)))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true, self.node_info(span)))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false, self.node_info(span)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Null(self.node_info(span)))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => self.parse_array_literal(span),
            TokenKind::Zeros => {
                self.advance();
                self.expect(TokenKind::LParen, "'('")?;
                let size = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Zeros {
                    size: Box::new(size),
                    element_type: TypeAnnotation::Int,
                    info: self.node_info(span),
                })
            }
            // Primitive-type keywords followed by `(` are cast
            // expressions: `int(x)`, `float(x)`, `string(x)`, `bool(x)`.
            TokenKind::Int | TokenKind::FloatKw | TokenKind::StringKw | TokenKind::StrKw
            | TokenKind::BoolKw => {
                let target_type = self.parse_type()?;
                self.expect(TokenKind::LParen, "'('")?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    target_type,
                    info: self.node_info(span),
                })
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::Identifier(name, self.node_info(span)))
            }
            other => Err(self.error(format!("unexpected token {other:?} in expression"))),
        }
    }

    fn parse_array_literal(&mut self, span: Span) -> ParseResult<Expr> {
        self.advance(); // '['
        let mut elements = vec![];
        while !self.check(&TokenKind::RBracket) {
            elements.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        let element_type = infer_literal_element_type(&elements);
        Ok(Expr::Array {
            elements,
            element_type,
            info: self.node_info(span),
        })
    }
}

/// `utils`, `math`, `advanced`, `algorithms` are Noxy's standard-library
/// namespaces for free-function grouping (e.g. `math.sqrt(x)`); any other
/// `a.b` chain is a struct field access unless `a` was brought in by a
/// `use` statement earlier in the file.
const DEFAULT_NAMESPACES: &[&str] = &["utils", "math", "advanced", "algorithms"];

/// Best-effort element type for a bare array literal, inferred from its
/// first element's syntactic shape; the checker/codegen may refine this
/// once real operand types are known.
fn infer_literal_element_type(elements: &[Expr]) -> TypeAnnotation {
    match elements.first() {
        Some(Expr::Number(_, _)) => TypeAnnotation::Int,
        Some(Expr::Float(_, _)) => TypeAnnotation::Float,
        Some(Expr::Str(_, _)) => TypeAnnotation::String,
        Some(Expr::Bool(_, _)) => TypeAnnotation::Bool,
        Some(Expr::StructConstructor { name, .. }) => TypeAnnotation::Name(name.clone()),
        _ => TypeAnnotation::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Program {
        parse_source(src).unwrap_or_else(|e| panic!("parse failed: {e}"))
    }

    #[test]
    fn parses_global_declaration_with_type() {
        let p = program("let x: int = 1");
        assert_eq!(p.statements.len(), 1);
        match &p.statements[0] {
            Stmt::Assignment {
                kind,
                id,
                declared_type,
                is_global,
                ..
            } => {
                assert_eq!(*kind, AssignmentKind::Declaration);
                assert_eq!(id, "x");
                assert_eq!(*declared_type, Some(TypeAnnotation::Int));
                assert!(*is_global);
            }
            other => panic!("expected Assignment, got {other:?}"),
        }
    }

    #[test]
    fn let_inside_function_is_local() {
        let p = program("func f() do let x: int = 1 end end\nfunc f() -> void\nlet y: int = 2\nend");
        // second function's body holds the local declaration
        let f = p
            .statements
            .iter()
            .rev()
            .find(|s| matches!(s, Stmt::Function { .. }))
            .unwrap();
        if let Stmt::Function { body, .. } = f {
            match &body[0] {
                Stmt::Assignment { is_global, .. } => assert!(!is_global),
                other => panic!("expected Assignment, got {other:?}"),
            }
        }
    }

    #[test]
    fn struct_constructor_vs_call_classified_by_declaration_order() {
        let src = "struct Point\nx: int\ny: int\nend\nfunc main() -> void\nlet p: Point = Point(1, 2)\nlet n: int = helper(1)\nend";
        let p = program(src);
        let main_fn = p
            .statements
            .iter()
            .find(|s| matches!(s, Stmt::Function { name, .. } if name == "main"))
            .unwrap();
        let Stmt::Function { body, .. } = main_fn else {
            unreachable!()
        };
        match &body[0] {
            Stmt::Assignment { value, .. } => {
                assert!(matches!(value, Expr::StructConstructor { name, .. } if name == "Point"))
            }
            other => panic!("expected Assignment, got {other:?}"),
        }
        match &body[1] {
            Stmt::Assignment { value, .. } => {
                assert!(matches!(value, Expr::Call { name, .. } if name == "helper"))
            }
            other => panic!("expected Assignment, got {other:?}"),
        }
    }

    #[test]
    fn array_field_assignment_collects_path() {
        let src = "people[0].name = \"a\"";
        let p = program(src);
        match &p.statements[0] {
            Stmt::ArrayFieldAssignment {
                name, field_path, ..
            } => {
                assert_eq!(name, "people");
                assert_eq!(field_path, &vec!["name".to_string()]);
            }
            other => panic!("expected ArrayFieldAssignment, got {other:?}"),
        }
    }

    #[test]
    fn nested_struct_assignment_collects_multi_segment_path() {
        let src = "origin.point.x = 1";
        let p = program(src);
        match &p.statements[0] {
            Stmt::NestedStructAssignment { field_path, .. } => {
                assert_eq!(field_path, &vec!["point".to_string(), "x".to_string()]);
            }
            other => panic!("expected NestedStructAssignment, got {other:?}"),
        }
    }

    #[test]
    fn precedence_climbs_or_and_comparison_additive_multiplicative() {
        let p = program("let x: bool = 1 + 2 * 3 > 4 & true | false");
        let Stmt::Assignment { value, .. } = &p.statements[0] else {
            unreachable!()
        };
        // top level must be the `|`
        assert!(matches!(value, Expr::BinaryOp { op: BinaryOp::Or, .. }));
    }

    #[test]
    fn namespaced_call_folds_into_dotted_identifier() {
        let src = "let y: float = math.sqrt(4.0)";
        let p = program(src);
        let Stmt::Assignment { value, .. } = &p.statements[0] else {
            unreachable!()
        };
        assert!(matches!(value, Expr::Call { name, .. } if name == "math.sqrt"));
    }

    #[test]
    fn array_access_then_dot_chain_becomes_struct_access_from_array() {
        let src = "let n: int = people[0].address.zip";
        let p = program(src);
        let Stmt::Assignment { value, .. } = &p.statements[0] else {
            unreachable!()
        };
        match value {
            Expr::StructAccessFromArray { field_path, .. } => {
                assert_eq!(field_path, &vec!["address".to_string(), "zip".to_string()]);
            }
            other => panic!("expected StructAccessFromArray, got {other:?}"),
        }
    }

    #[test]
    fn fstring_expression_is_lowered_by_sub_parser() {
        let src = r#"let s: string = f"x = {1 + 2}""#;
        let p = program(src);
        let Stmt::Assignment { value, .. } = &p.statements[0] else {
            unreachable!()
        };
        match value {
            Expr::FString(parts, _) => {
                assert_eq!(parts.len(), 1);
                assert!(matches!(
                    &parts[0],
                    crate::ast::FStringExprPart::Expr { expr, .. }
                        if matches!(**expr, Expr::BinaryOp { op: BinaryOp::Add, .. })
                ));
            }
            other => panic!("expected FString, got {other:?}"),
        }
    }

    #[test]
    fn cast_expression_parses_primitive_keyword_call_form() {
        let src = "let x: float = float(1)";
        let p = program(src);
        let Stmt::Assignment { value, .. } = &p.statements[0] else {
            unreachable!()
        };
        assert!(matches!(
            value,
            Expr::Cast {
                target_type: TypeAnnotation::Float,
                ..
            }
        ));
    }

    #[test]
    fn use_with_select_star_sets_import_all() {
        let p = program("use std.math select *");
        match &p.statements[0] {
            Stmt::Use {
                module,
                import_all,
                selected,
                ..
            } => {
                assert_eq!(module, "std.math");
                assert!(*import_all);
                assert!(selected.is_none());
            }
            other => panic!("expected Use, got {other:?}"),
        }
    }

    #[test]
    fn use_with_selected_names() {
        let p = program("use geometry select area, perimeter");
        match &p.statements[0] {
            Stmt::Use { selected, .. } => {
                assert_eq!(
                    selected.as_deref(),
                    Some(&["area".to_string(), "perimeter".to_string()][..])
                );
            }
            other => panic!("expected Use, got {other:?}"),
        }
    }
}
