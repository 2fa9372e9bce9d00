//! Indentation-aware lexer for Tern.
//!
//! The lexer turns one source buffer into a stream of tokens. Besides the
//! usual identifiers, literals and punctuation it synthesizes `Newline`,
//! `Indent` and `Dedent` tokens from the layout of the source: blocks are
//! delimited purely by leading whitespace.
//!
//! Errors are collected rather than returned eagerly, so one run reports
//! every lexical problem in the file. Malformed tokens are dropped and never
//! reach the parser.

use std::collections::VecDeque;

use thiserror::Error;

use crate::diagnostic::Diagnostic;
use crate::span::Span;

const TAB_WIDTH: u32 = 8;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Layout
    Eof,
    Newline,
    Indent,
    Dedent,

    // Identifiers and literals
    Ident,
    IntLiteral,
    FloatLiteral,
    BoolLiteral, // true / false

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Arrow,    // ->
    DotDot,   // ..
    Equal,    // =

    // Operators
    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Amp,       // &

    // Keywords
    Fn,
    Let,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Return,
    And,
    Or,
    Not,
    Pass,
}

impl TokenKind {
    /// Human readable name used in parse errors.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Eof => "end of file",
            TokenKind::Newline => "newline",
            TokenKind::Indent => "indent",
            TokenKind::Dedent => "dedent",
            TokenKind::Ident => "identifier",
            TokenKind::IntLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::BoolLiteral => "boolean literal",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Arrow => "`->`",
            TokenKind::DotDot => "`..`",
            TokenKind::Equal => "`=`",
            TokenKind::EqEq => "`==`",
            TokenKind::NotEq => "`!=`",
            TokenKind::Less => "`<`",
            TokenKind::LessEq => "`<=`",
            TokenKind::Greater => "`>`",
            TokenKind::GreaterEq => "`>=`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::Amp => "`&`",
            TokenKind::Fn => "`fn`",
            TokenKind::Let => "`let`",
            TokenKind::If => "`if`",
            TokenKind::Elif => "`elif`",
            TokenKind::Else => "`else`",
            TokenKind::While => "`while`",
            TokenKind::For => "`for`",
            TokenKind::In => "`in`",
            TokenKind::Return => "`return`",
            TokenKind::And => "`and`",
            TokenKind::Or => "`or`",
            TokenKind::Not => "`not`",
            TokenKind::Pass => "`pass`",
        }
    }

    /// Whether this token is synthesized from layout rather than text.
    pub fn is_layout(self) -> bool {
        matches!(
            self,
            TokenKind::Eof | TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
        )
    }
}

/// A single token: its kind, the exact source text, and where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    /// Source text of the token; empty for layout tokens.
    pub lexeme: &'src str,
    pub span: Span,
}

impl Token<'_> {
    pub fn line(&self) -> u32 {
        self.span.line
    }

    pub fn column(&self) -> u32 {
        self.span.column
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("invalid character `{}`", .0.escape_default())]
    InvalidCharacter(char),
    #[error("malformed number literal `{text}`: {reason}")]
    MalformedLiteral { text: String, reason: &'static str },
    #[error("inconsistent indentation: width {found} does not match any enclosing block (nearest is {nearest})")]
    InconsistentIndentation { found: u32, nearest: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {span}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub span: Span,
}

impl LexError {
    pub fn code(&self) -> &'static str {
        match self.kind {
            LexErrorKind::InvalidCharacter(_) => "E0101",
            LexErrorKind::MalformedLiteral { .. } => "E0102",
            LexErrorKind::InconsistentIndentation { .. } => "E0103",
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.kind.to_string(), self.span).with_code(self.code())
    }
}

/// Result of lexing a whole source buffer.
#[derive(Debug)]
pub struct LexResult<'src> {
    pub tokens: Vec<Token<'src>>,
    pub errors: Vec<LexError>,
}

/// Lex a source string into tokens.
pub fn lex(source: &str) -> LexResult<'_> {
    let mut lexer = Lexer::new(source);
    let tokens: Vec<_> = lexer.by_ref().collect();
    tracing::debug!(
        tokens = tokens.len(),
        errors = lexer.errors.len(),
        "lexed source"
    );
    LexResult {
        tokens,
        errors: lexer.into_errors(),
    }
}

/// Streaming lexer over one source buffer.
///
/// The iterator ends after yielding `Eof`; a fresh `Lexer` is needed for
/// every file.
pub struct Lexer<'src> {
    source: &'src str,
    chars: &'src [u8],
    index: usize,
    line: u32,
    column: u32,
    indent_stack: Vec<u32>,
    paren_depth: u32,
    at_line_start: bool,
    line_has_tokens: bool,
    pending: VecDeque<Token<'src>>,
    finished: bool,
    errors: Vec<LexError>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            chars: source.as_bytes(),
            index: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            paren_depth: 0,
            at_line_start: true,
            line_has_tokens: false,
            pending: VecDeque::new(),
            finished: false,
            errors: Vec::new(),
        }
    }

    /// Current indentation levels, outermost first.
    pub fn indent_stack(&self) -> &[u32] {
        &self.indent_stack
    }

    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<LexError> {
        self.errors
    }

    fn scan(&mut self) -> Option<Token<'src>> {
        loop {
            if let Some(tok) = self.pending.pop_front() {
                return Some(tok);
            }
            if self.finished {
                return None;
            }
            if self.at_line_start && self.paren_depth == 0 {
                self.handle_line_start();
                continue;
            }

            self.skip_inline_whitespace();

            let Some(ch) = self.peek_char() else {
                self.finish();
                continue;
            };

            if ch == b'\n' {
                self.consume_char();
                if self.paren_depth == 0 {
                    if self.line_has_tokens {
                        let span = self.point_span();
                        self.push_layout(TokenKind::Newline, span);
                    }
                    self.at_line_start = true;
                    self.line_has_tokens = false;
                }
                continue;
            }

            if let Some(tok) = self.lex_token(ch) {
                self.line_has_tokens = true;
                return Some(tok);
            }
        }
    }

    /// Measure the indentation of a new logical line and emit layout tokens.
    fn handle_line_start(&mut self) {
        let mut width = 0u32;
        while let Some(ch) = self.peek_char() {
            match ch {
                b' ' => width += 1,
                b'\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                b'\r' => {}
                _ => break,
            }
            self.consume_char();
        }

        match self.peek_char() {
            // Blank or comment-only lines leave the indentation untouched.
            Some(b'\n') => {
                self.consume_char();
                return;
            }
            Some(b'#') => {
                self.skip_comment();
                if self.peek_char() == Some(b'\n') {
                    self.consume_char();
                }
                return;
            }
            None => {
                self.at_line_start = false;
                return;
            }
            Some(_) => {}
        }

        self.at_line_start = false;
        let span = self.point_span();
        let top = self.current_indent();
        if width > top {
            self.indent_stack.push(width);
            self.push_layout(TokenKind::Indent, span);
        } else if width < top {
            while self.current_indent() > width {
                self.indent_stack.pop();
                self.push_layout(TokenKind::Dedent, span);
            }
            let nearest = self.current_indent();
            if nearest != width {
                self.errors.push(LexError {
                    kind: LexErrorKind::InconsistentIndentation {
                        found: width,
                        nearest,
                    },
                    span,
                });
            }
        }
    }

    fn finish(&mut self) {
        let span = self.point_span();
        if self.line_has_tokens {
            self.push_layout(TokenKind::Newline, span);
            self.line_has_tokens = false;
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            self.push_layout(TokenKind::Dedent, span);
        }
        self.push_layout(TokenKind::Eof, span);
        self.finished = true;
    }

    fn lex_token(&mut self, ch: u8) -> Option<Token<'src>> {
        let start = self.index;
        let (line, column) = (self.line, self.column);

        let kind = match ch {
            b'(' | b'[' => {
                self.consume_char();
                self.paren_depth += 1;
                if ch == b'(' {
                    TokenKind::LParen
                } else {
                    TokenKind::LBracket
                }
            }
            b')' | b']' => {
                self.consume_char();
                self.paren_depth = self.paren_depth.saturating_sub(1);
                if ch == b')' {
                    TokenKind::RParen
                } else {
                    TokenKind::RBracket
                }
            }
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b'+' => self.single(TokenKind::Plus),
            b'*' => self.single(TokenKind::Star),
            b'/' => self.single(TokenKind::Slash),
            b'%' => self.single(TokenKind::Percent),
            b'&' => self.single(TokenKind::Amp),
            b'-' => self.one_or_two(b'>', TokenKind::Arrow, TokenKind::Minus),
            b'=' => self.one_or_two(b'=', TokenKind::EqEq, TokenKind::Equal),
            b'<' => self.one_or_two(b'=', TokenKind::LessEq, TokenKind::Less),
            b'>' => self.one_or_two(b'=', TokenKind::GreaterEq, TokenKind::Greater),
            b'!' if self.peek_next() == Some(b'=') => {
                self.consume_char();
                self.consume_char();
                TokenKind::NotEq
            }
            b'.' if self.peek_next() == Some(b'.') => {
                self.consume_char();
                self.consume_char();
                TokenKind::DotDot
            }
            b'0'..=b'9' => return self.lex_number(start, line, column),
            _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
            _ => {
                let bad = self.source[start..].chars().next().unwrap_or('\u{fffd}');
                self.consume_char();
                let span = Span::new(start as u32, self.index as u32, line, column);
                self.errors.push(LexError {
                    kind: LexErrorKind::InvalidCharacter(bad),
                    span,
                });
                return None;
            }
        };

        Some(self.make_token(kind, start, line, column))
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.consume_char();
        kind
    }

    fn one_or_two(&mut self, second: u8, long: TokenKind, short: TokenKind) -> TokenKind {
        self.consume_char();
        if self.peek_char() == Some(second) {
            self.consume_char();
            long
        } else {
            short
        }
    }

    fn lex_number(&mut self, start: usize, line: u32, column: u32) -> Option<Token<'src>> {
        self.consume_digits();

        let mut is_float = false;
        let mut malformed: Option<&'static str> = None;

        // A '.' starts a fraction only when a digit follows; `1..5` is a range.
        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.consume_char();
            self.consume_digits();
        }

        if matches!(self.peek_char(), Some(b'e' | b'E')) && is_float {
            self.consume_char();
            if matches!(self.peek_char(), Some(b'+' | b'-')) {
                self.consume_char();
            }
            if !self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                malformed = Some("exponent has no digits");
            }
            self.consume_digits();
        }

        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            malformed = Some("more than one decimal point");
        } else if self.peek_char().is_some_and(is_ident_continue) {
            malformed = Some("digits run into an identifier");
        }

        if malformed.is_some() {
            // Swallow the rest of the bad literal so it does not re-lex as
            // separate tokens.
            while let Some(ch) = self.peek_char() {
                let dotted = ch == b'.' && self.peek_next().is_some_and(|c| c.is_ascii_digit());
                if is_ident_continue(ch) || dotted {
                    self.consume_char();
                } else {
                    break;
                }
            }
        }

        let text = &self.source[start..self.index];
        if malformed.is_none() {
            let digits: String = text.chars().filter(|c| *c != '_').collect();
            let parsed = if is_float {
                digits.parse::<f64>().is_ok_and(f64::is_finite)
            } else {
                digits.parse::<i64>().is_ok()
            };
            if !parsed {
                malformed = Some(if is_float {
                    "value is not representable"
                } else {
                    "value does not fit in 64 bits"
                });
            }
        }

        if let Some(reason) = malformed {
            let span = Span::new(start as u32, self.index as u32, line, column);
            self.errors.push(LexError {
                kind: LexErrorKind::MalformedLiteral {
                    text: text.to_string(),
                    reason,
                },
                span,
            });
            return None;
        }

        let kind = if is_float {
            TokenKind::FloatLiteral
        } else {
            TokenKind::IntLiteral
        };
        Some(self.make_token(kind, start, line, column))
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek_char() {
            if is_ident_continue(ch) {
                self.consume_char();
            } else {
                break;
            }
        }

        match &self.source[start..self.index] {
            "fn" => TokenKind::Fn,
            "let" => TokenKind::Let,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "return" => TokenKind::Return,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "pass" => TokenKind::Pass,
            "true" | "false" => TokenKind::BoolLiteral,
            _ => TokenKind::Ident,
        }
    }

    fn consume_digits(&mut self) {
        while let Some(ch) = self.peek_char() {
            if matches!(ch, b'0'..=b'9' | b'_') {
                self.consume_char();
            } else {
                break;
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            match ch {
                b' ' | b'\t' | b'\r' => self.consume_char(),
                b'#' => self.skip_comment(),
                // Explicit line continuation.
                b'\\' if self.peek_next() == Some(b'\n') => {
                    self.consume_char();
                    self.consume_char();
                }
                _ => break,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch == b'\n' {
                break;
            }
            self.consume_char();
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize, line: u32, column: u32) -> Token<'src> {
        Token {
            kind,
            lexeme: &self.source[start..self.index],
            span: Span::new(start as u32, self.index as u32, line, column),
        }
    }

    fn push_layout(&mut self, kind: TokenKind, span: Span) {
        self.pending.push_back(Token {
            kind,
            lexeme: "",
            span,
        });
    }

    fn point_span(&self) -> Span {
        let at = self.index as u32;
        Span::new(at, at, self.line, self.column)
    }

    fn current_indent(&self) -> u32 {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.chars.get(self.index + 1).copied()
    }

    /// Advance past one character, keeping line/column in sync.
    fn consume_char(&mut self) {
        let Some(ch) = self.source[self.index..].chars().next() else {
            return;
        };
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        self.scan()
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}
