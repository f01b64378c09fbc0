//! # Lexer
//!
//! Turns Noxy source text into a finite token vector terminated by an
//! `Eof` token. Scans character by character with a `Peekable<Chars>`,
//! the same shape the teacher's hand-written lexer uses, extended with the
//! literal/float/string/f-string scanning `spec.md` §4.1 requires.

mod token;

pub use token::{keyword_kind, FStringPart, Token, TokenKind};

use std::iter::Peekable;
use std::str::Chars;

use crate::diagnostics::{Diagnostic, Span};

pub type LexResult<T> = Result<T, Diagnostic>;

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            line: 1,
            col: 1,
            tokens: vec![],
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_next(&mut self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next()
    }

    fn advance(&mut self) -> Option<char> {
        let next = self.chars.next()?;
        if next == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(next)
    }

    fn error(&self, message: impl Into<String>, span: Span) -> Diagnostic {
        Diagnostic::syntax(message, Some(span), self.source)
    }

    fn eat_whitespace_and_comments(&mut self) {
        loop {
            while let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') && self.peek_next() == Some('/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    /// Lexes the whole input into a token vector, always terminated by
    /// `TokenKind::Eof`.
    pub fn lex(mut self) -> LexResult<Vec<Token>> {
        loop {
            self.eat_whitespace_and_comments();

            let Some(c) = self.peek() else {
                let span = Span::new(self.line, self.col);
                self.tokens.push(Token::new(TokenKind::Eof, span.line, span.column));
                return Ok(self.tokens);
            };

            let span = Span::new(self.line, self.col);

            let token = match c {
                'a'..='z' | 'A'..='Z' | '_' => self.lex_identifier(span)?,
                '0'..='9' => self.lex_number(span)?,
                '"' => self.lex_string(span)?,
                'f' if self.peek_next() == Some('"') => self.lex_fstring(span)?,
                _ => self.lex_operator(span)?,
            };

            self.tokens.push(token);
        }
    }

    fn lex_identifier(&mut self, span: Span) -> LexResult<Token> {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                word.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = keyword_kind(&word).unwrap_or(TokenKind::Identifier(word));
        Ok(Token::new(kind, span.line, span.column))
    }

    fn lex_number(&mut self, span: Span) -> LexResult<Token> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        // A float needs a `.` followed by at least one digit; a second `.`
        // terminates the numeric literal rather than being consumed.
        if self.peek() == Some('.') && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
            text.push('.');
            self.advance();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }

            let value: f64 = text
                .parse()
                .map_err(|_| self.error(format!("invalid float literal '{text}'"), span.clone()))?;
            return Ok(Token::new(TokenKind::Float(value), span.line, span.column));
        }

        let value: i64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid integer literal '{text}'"), span.clone()))?;
        Ok(Token::new(TokenKind::Integer(value), span.line, span.column))
    }

    /// Decodes one escape sequence after a backslash has already been
    /// consumed, per §4.1: `\n \t \" \\ \0` are recognised; any other
    /// character following a backslash passes through literally.
    fn decode_escape(&mut self) -> LexResult<char> {
        let span = Span::new(self.line, self.col);
        let Some(c) = self.advance() else {
            return Err(self.error("unterminated escape sequence", span));
        };
        Ok(match c {
            'n' => '\n',
            't' => '\t',
            '"' => '"',
            '\\' => '\\',
            '0' => '\0',
            other => other,
        })
    }

    fn lex_string(&mut self, span: Span) -> LexResult<Token> {
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string literal", span)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    value.push(self.decode_escape()?);
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::Str(value), span.line, span.column))
    }

    /// Lexes an f-string: `f"` followed by literal text, `{expr[:spec]}`
    /// interpolations (brace depth tracked so nested braces inside an
    /// embedded expression's textual form don't close the interpolation
    /// early) and a closing `"`.
    fn lex_fstring(&mut self, span: Span) -> LexResult<Token> {
        self.advance(); // 'f'
        self.advance(); // opening quote

        let mut parts = vec![];
        let mut literal = String::new();

        loop {
            match self.peek() {
                None => return Err(self.error("unterminated f-string literal", span)),
                Some('"') => {
                    self.advance();
                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    break;
                }
                Some('\\') => {
                    self.advance();
                    literal.push(self.decode_escape()?);
                }
                Some('{') => {
                    self.advance();
                    if !literal.is_empty() {
                        parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                    }
                    parts.push(self.lex_fstring_expr(span.clone())?);
                }
                Some(c) => {
                    literal.push(c);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::FString(parts), span.line, span.column))
    }

    /// Lexes the contents of one `{...}` interpolation after the opening
    /// brace has been consumed, tracking nested brace depth and splitting
    /// off an optional top-level `:spec` tail.
    fn lex_fstring_expr(&mut self, outer_span: Span) -> LexResult<FStringPart> {
        let mut depth = 1usize;
        let mut expr = String::new();
        let mut spec: Option<String> = None;

        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated f-string expression", outer_span));
            };

            match c {
                '{' => {
                    depth += 1;
                    expr.push(c);
                    self.advance();
                }
                '}' => {
                    depth -= 1;
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                    expr.push(c);
                }
                ':' if depth == 1 && spec.is_none() => {
                    spec = Some(String::new());
                    self.advance();
                }
                _ => {
                    self.advance();
                    match &mut spec {
                        Some(s) => s.push(c),
                        None => expr.push(c),
                    }
                }
            }
        }

        Ok(match spec {
            Some(spec) => FStringPart::ExprWithSpec(expr, spec),
            None => FStringPart::Expr(expr),
        })
    }

    fn lex_operator(&mut self, span: Span) -> LexResult<Token> {
        use TokenKind::*;

        let two_char = {
            let first = self.peek();
            let second = self.peek_next();
            match (first, second) {
                (Some('>'), Some('=')) => Some(GreaterOrEqual),
                (Some('<'), Some('=')) => Some(LessOrEqual),
                (Some('='), Some('=')) => Some(Equal),
                (Some('!'), Some('=')) => Some(NotEqual),
                (Some('-'), Some('>')) => Some(Arrow),
                (Some('+'), Some('+')) => Some(PlusPlus),
                _ => None,
            }
        };

        if let Some(kind) = two_char {
            self.advance();
            self.advance();
            return Ok(Token::new(kind, span.line, span.column));
        }

        let Some(c) = self.advance() else {
            return Err(self.error("unexpected end of input", span));
        };

        let kind = match c {
            '+' => Plus,
            '-' => Minus,
            '*' => Star,
            '/' => Slash,
            '%' => Percent,
            '=' => Assign,
            '>' => GreaterThan,
            '<' => LessThan,
            '(' => LParen,
            ')' => RParen,
            '[' => LBracket,
            ']' => RBracket,
            '{' => LBrace,
            '}' => RBrace,
            ',' => Comma,
            ':' => Colon,
            ';' => Semicolon,
            '.' => Dot,
            '&' => Ampersand,
            '|' => Pipe,
            '!' => Bang,
            other => return Err(self.error(format!("unexpected character '{other}'"), span)),
        };

        Ok(Token::new(kind, span.line, span.column))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_integer_and_float() {
        assert_eq!(kinds("42"), vec![TokenKind::Integer(42), TokenKind::Eof]);
        assert_eq!(
            kinds("3.14"),
            vec![TokenKind::Float(3.14), TokenKind::Eof]
        );
    }

    #[test]
    fn second_dot_terminates_numeric_literal() {
        // `1.2.3` should lex as `1.2`, `.`, `3`, not as one malformed token.
        let kinds = kinds("1.2.3");
        assert_eq!(
            kinds,
            vec![
                TokenKind::Float(1.2),
                TokenKind::Dot,
                TokenKind::Integer(3),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_keywords_vs_identifiers() {
        assert_eq!(
            kinds("let x"),
            vec![
                TokenKind::Let,
                TokenKind::Identifier("x".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_string_escapes() {
        let kinds = kinds(r#""a\nb\"c""#);
        assert_eq!(
            kinds,
            vec![TokenKind::Str("a\nb\"c".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn unterminated_string_is_syntax_error() {
        assert!(Lexer::new("\"abc").lex().is_err());
    }

    #[test]
    fn lexes_simple_fstring() {
        let kinds = kinds(r#"f"({p.x},{p.y})""#);
        assert_eq!(
            kinds,
            vec![
                TokenKind::FString(vec![
                    FStringPart::Literal("(".into()),
                    FStringPart::Expr("p.x".into()),
                    FStringPart::Literal(",".into()),
                    FStringPart::Expr("p.y".into()),
                    FStringPart::Literal(")".into()),
                ]),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn fstring_tracks_nested_braces_and_format_spec() {
        let kinds = kinds(r#"f"{foo({1:2}):spec}""#);
        assert_eq!(
            kinds,
            vec![
                TokenKind::FString(vec![FStringPart::ExprWithSpec(
                    "foo({1:2})".into(),
                    "spec".into()
                )]),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn unterminated_fstring_expression_is_syntax_error() {
        assert!(Lexer::new(r#"f"{unterminated"#).lex().is_err());
    }

    #[test]
    fn two_char_operators_win_over_one_char() {
        assert_eq!(
            kinds(">="),
            vec![TokenKind::GreaterOrEqual, TokenKind::Eof]
        );
        assert_eq!(kinds("->"), vec![TokenKind::Arrow, TokenKind::Eof]);
    }

    #[test]
    fn skips_line_comments() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![
                TokenKind::Integer(1),
                TokenKind::Integer(2),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn token_positions_match_lexeme_start() {
        // round-trip property: every token's (line, column) re-localises
        // to the character that began its lexeme.
        let tokens = Lexer::new("let x = 1").lex().unwrap();
        let let_tok = &tokens[0];
        assert_eq!((let_tok.span.line, let_tok.span.column), (1, 1));
        let x_tok = &tokens[1];
        assert_eq!((x_tok.span.line, x_tok.span.column), (1, 5));
    }
}
