//! Recursive-descent parser for Tern.
//!
//! Statements are parsed by recursive descent; expressions by precedence
//! climbing over a fixed binding table. On a syntax error the parser skips
//! to the next statement boundary and keeps going, so one run can report
//! several errors.

use thiserror::Error;

use crate::ast::{
    Assignment, BinaryOp, Block, Call, Expr, ExprKind, ForStmt, FunctionDecl, Identifier, IfStmt,
    Literal, Param, Program, ReturnStmt, Stmt, StmtKind, UnaryOp, VarDecl, WhileStmt,
};
use crate::diagnostic::Diagnostic;
use crate::lexer::{Token, TokenKind};
use crate::span::Span;
use crate::types::Type;

/// Parsing stops after this many errors in one file.
pub const MAX_ERRORS: usize = 25;

/// Deepest expression nesting accepted before bailing out. Binary
/// operator chains count one level per operator.
const MAX_EXPR_DEPTH: u32 = 200;

/// Deepest block nesting accepted, counting each `elif` as one level.
const MAX_BLOCK_DEPTH: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ParseError {
    pub expected: String,
    pub found: String,
    pub span: Span,
}

impl ParseError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.to_string(), self.span).with_code("E0201")
    }
}

#[derive(Debug)]
pub struct ParseResult {
    pub program: Program,
    pub errors: Vec<ParseError>,
}

type PResult<T> = Result<T, ParseError>;

/// Parse a token stream produced by the lexer into a `Program`.
pub fn parse(tokens: &[Token<'_>]) -> ParseResult {
    let mut parser = Parser {
        tokens,
        pos: 0,
        errors: Vec::new(),
        block_depth: 0,
        nesting: 0,
        expr_depth: 0,
    };
    let program = parser.parse_program();
    tracing::debug!(
        statements = program.body.len(),
        errors = parser.errors.len(),
        "parsed program"
    );
    ParseResult {
        program,
        errors: parser.errors,
    }
}

struct Parser<'t, 'src> {
    tokens: &'t [Token<'src>],
    pos: usize,
    errors: Vec<ParseError>,
    /// Number of enclosing indented blocks.
    block_depth: u32,
    /// Indented blocks plus `elif` links currently open.
    nesting: u32,
    expr_depth: u32,
}

impl<'t, 'src> Parser<'t, 'src> {
    fn parse_program(&mut self) -> Program {
        let mut body = Vec::new();
        while !self.at(TokenKind::Eof) && !self.gave_up() {
            match self.peek_kind() {
                TokenKind::Newline => {
                    self.advance();
                }
                TokenKind::Indent | TokenKind::Dedent => {
                    let err = self.error_here("a statement");
                    self.errors.push(err);
                    self.skip_stray_layout();
                }
                _ => {
                    if let Some(stmt) = self.parse_statement_recovering() {
                        body.push(stmt);
                    }
                }
            }
        }
        Program { body }
    }

    /// Parse one statement; on error record it and skip to the next
    /// statement boundary.
    fn parse_statement_recovering(&mut self) -> Option<Stmt> {
        let start = self.pos;
        match self.parse_statement() {
            Ok(stmt) => Some(stmt),
            Err(err) => {
                self.errors.push(err);
                self.synchronize();
                if self.pos == start && !self.at(TokenKind::Eof) && !self.at(TokenKind::Dedent) {
                    self.advance();
                }
                None
            }
        }
    }

    fn gave_up(&self) -> bool {
        self.errors.len() >= MAX_ERRORS
    }

    /// Skip to the next NEWLINE at the current indentation level (and the
    /// indented block hanging off it, if any, with its `elif`/`else`
    /// clauses) or stop before a DEDENT that closes the enclosing block.
    fn synchronize(&mut self) {
        let mut depth = 0u32;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Indent => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::Dedent => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                    self.advance();
                    if depth == 0 && !self.at_else_clause() {
                        return;
                    }
                }
                TokenKind::Newline => {
                    self.advance();
                    if depth == 0 && !self.at(TokenKind::Indent) && !self.at_else_clause() {
                        return;
                    }
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// `elif`/`else` continue the statement being skipped.
    fn at_else_clause(&self) -> bool {
        self.at(TokenKind::Elif) || self.at(TokenKind::Else)
    }

    /// Skip an unexpected indented region or a stray dedent.
    fn skip_stray_layout(&mut self) {
        if self.at(TokenKind::Dedent) {
            self.advance();
            return;
        }
        let mut depth = 0u32;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::Indent => depth += 1,
                TokenKind::Dedent => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                }
                _ => {}
            }
            self.advance();
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_statement(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Fn => self.parse_function(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            _ => self.parse_simple_statement(),
        }
    }

    /// Statements that fit on one line; these may follow a `:` directly.
    fn parse_simple_statement(&mut self) -> PResult<Stmt> {
        match self.peek_kind() {
            TokenKind::Let => self.parse_var_decl(),
            TokenKind::Return => self.parse_return(),
            TokenKind::Pass => {
                let span = self.advance().span;
                self.end_statement()?;
                Ok(Stmt {
                    kind: StmtKind::Pass,
                    span,
                })
            }
            _ => self.parse_assignment_or_expr(),
        }
    }

    fn parse_function(&mut self) -> PResult<Stmt> {
        let fn_tok = self.advance();
        if self.block_depth > 0 {
            return Err(ParseError {
                expected: "a statement (functions are only allowed at module level)".into(),
                found: "`fn`".into(),
                span: fn_tok.span,
            });
        }
        let name_tok = self.expect(TokenKind::Ident, "function name")?;
        self.expect(TokenKind::LParen, "`(`")?;

        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                let param_tok = self.expect(TokenKind::Ident, "parameter name")?;
                self.expect(TokenKind::Colon, "`:` and a parameter type")?;
                let ty = self.parse_type()?;
                params.push(Param {
                    name: param_tok.lexeme.to_string(),
                    ty,
                    span: param_tok.span,
                    symbol: None,
                });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;

        let return_type = if self.eat(TokenKind::Arrow) {
            self.parse_type()?
        } else {
            Type::Void
        };
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_block()?;

        let span = fn_tok.span.to(body.span);
        Ok(Stmt {
            kind: StmtKind::FunctionDecl(FunctionDecl {
                name: name_tok.lexeme.to_string(),
                name_span: name_tok.span,
                params,
                return_type,
                body,
                symbol: None,
            }),
            span,
        })
    }

    fn parse_var_decl(&mut self) -> PResult<Stmt> {
        let let_tok = self.advance();
        let name_tok = self.expect(TokenKind::Ident, "variable name")?;
        let declared_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Equal) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if declared_type.is_none() && init.is_none() {
            return Err(self.error_here("`:` with a type or `=` with an initializer"));
        }
        let end = init.as_ref().map_or(name_tok.span, |e| e.span);
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::VarDecl(VarDecl {
                name: name_tok.lexeme.to_string(),
                name_span: name_tok.span,
                declared_type,
                init,
                ty: Type::Unknown,
                symbol: None,
            }),
            span: let_tok.span.to(end),
        })
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let if_tok = self.advance();
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let then_block = self.parse_block()?;

        let else_block = match self.peek_kind() {
            TokenKind::Elif => {
                // `elif` becomes an `else` holding a nested `if`.
                self.enter_nesting(self.peek().span)?;
                let nested = self.parse_if();
                self.nesting -= 1;
                let nested = nested?;
                let span = nested.span;
                Some(Block {
                    stmts: vec![nested],
                    span,
                })
            }
            TokenKind::Else => {
                self.advance();
                self.expect(TokenKind::Colon, "`:`")?;
                Some(self.parse_block()?)
            }
            _ => None,
        };

        let end = else_block.as_ref().map_or(then_block.span, |b| b.span);
        Ok(Stmt {
            kind: StmtKind::If(IfStmt {
                condition,
                then_block,
                else_block,
            }),
            span: if_tok.span.to(end),
        })
    }

    fn parse_while(&mut self) -> PResult<Stmt> {
        let while_tok = self.advance();
        let condition = self.parse_expr()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_block()?;
        let span = while_tok.span.to(body.span);
        Ok(Stmt {
            kind: StmtKind::While(WhileStmt { condition, body }),
            span,
        })
    }

    fn parse_for(&mut self) -> PResult<Stmt> {
        let for_tok = self.advance();
        let var_tok = self.expect(TokenKind::Ident, "loop variable")?;
        self.expect(TokenKind::In, "`in`")?;
        let start = self.parse_expr()?;
        self.expect(TokenKind::DotDot, "`..`")?;
        let end = self.parse_expr()?;
        self.expect(TokenKind::Colon, "`:`")?;
        let body = self.parse_block()?;
        let span = for_tok.span.to(body.span);
        Ok(Stmt {
            kind: StmtKind::For(ForStmt {
                var: var_tok.lexeme.to_string(),
                var_span: var_tok.span,
                start,
                end,
                body,
                symbol: None,
            }),
            span,
        })
    }

    fn parse_return(&mut self) -> PResult<Stmt> {
        let ret_tok = self.advance();
        let value = if self.at(TokenKind::Newline) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        let span = value.as_ref().map_or(ret_tok.span, |v| ret_tok.span.to(v.span));
        self.end_statement()?;
        Ok(Stmt {
            kind: StmtKind::Return(ReturnStmt { value }),
            span,
        })
    }

    fn parse_assignment_or_expr(&mut self) -> PResult<Stmt> {
        let expr = self.parse_expr()?;
        if self.at(TokenKind::Equal) {
            if !expr.is_assignable() {
                return Err(ParseError {
                    expected: "a variable or dereference on the left of `=`".into(),
                    found: format!("`{expr}`"),
                    span: expr.span,
                });
            }
            self.advance();
            let value = self.parse_expr()?;
            self.end_statement()?;
            let span = expr.span.to(value.span);
            return Ok(Stmt {
                kind: StmtKind::Assignment(Assignment {
                    target: expr,
                    value,
                }),
                span,
            });
        }
        self.end_statement()?;
        let span = expr.span;
        Ok(Stmt {
            kind: StmtKind::Expr(expr),
            span,
        })
    }

    /// Parse the body following a `:`: either an indented statement
    /// sequence or a single simple statement on the same line.
    fn parse_block(&mut self) -> PResult<Block> {
        if !self.eat(TokenKind::Newline) {
            let stmt = self.parse_simple_statement()?;
            let span = stmt.span;
            return Ok(Block {
                stmts: vec![stmt],
                span,
            });
        }

        if !self.at(TokenKind::Indent) {
            return Err(self.error_here("an indented block"));
        }
        self.enter_nesting(self.peek().span)?;
        let indent = self.advance();
        self.block_depth += 1;
        let mut stmts = Vec::new();
        let mut span = indent.span;
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) && !self.gave_up() {
            if self.eat(TokenKind::Newline) {
                continue;
            }
            if self.at(TokenKind::Indent) {
                let err = self.error_here("a statement");
                self.errors.push(err);
                self.skip_stray_layout();
                continue;
            }
            if let Some(stmt) = self.parse_statement_recovering() {
                span = span.to(stmt.span);
                stmts.push(stmt);
            }
        }
        self.block_depth -= 1;
        self.nesting -= 1;
        self.eat(TokenKind::Dedent);
        Ok(Block { stmts, span })
    }

    fn parse_type(&mut self) -> PResult<Type> {
        let tok = self.expect(TokenKind::Ident, "a type")?;
        match tok.lexeme {
            "int" => Ok(Type::Int),
            "float" => Ok(Type::Float),
            "bool" => Ok(Type::Bool),
            "void" => Ok(Type::Void),
            "ptr" => {
                self.expect(TokenKind::LBracket, "`[` after `ptr`")?;
                let inner = self.parse_type()?;
                self.expect(TokenKind::RBracket, "`]`")?;
                Ok(Type::ptr(inner))
            }
            other => Err(ParseError {
                expected: "a type (`int`, `float`, `bool`, `void` or `ptr[T]`)".into(),
                found: format!("`{other}`"),
                span: tok.span,
            }),
        }
    }

    fn end_statement(&mut self) -> PResult<()> {
        self.expect(TokenKind::Newline, "end of line").map(|_| ())
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_binary(1)
    }

    /// Precedence climbing: parse operators binding at least as tightly as
    /// `min_prec`. All binary operators are left associative.
    ///
    /// Every operator folded into `lhs` deepens the tree by one level, so
    /// it counts against the nesting limit like a parenthesis does.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        let mut folded = 0;
        let result = loop {
            let Some((op, prec)) = binary_op(self.peek_kind()) else {
                break Ok(lhs);
            };
            if prec < min_prec {
                break Ok(lhs);
            }
            let op_tok = self.advance();
            if let Err(err) = self.enter_expr(op_tok.span) {
                break Err(err);
            }
            folded += 1;
            match self.parse_binary(prec + 1) {
                Ok(rhs) => lhs = Expr::binary(op, lhs, rhs),
                Err(err) => break Err(err),
            }
        };
        self.expr_depth -= folded;
        result
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Not => UnaryOp::Not,
            TokenKind::Star => UnaryOp::Deref,
            TokenKind::Amp => UnaryOp::AddrOf,
            _ => return self.parse_primary(),
        };
        let op_tok = self.advance();
        self.enter_expr(op_tok.span)?;
        let operand = self.parse_unary();
        self.expr_depth -= 1;
        Ok(Expr::unary(op, operand?, op_tok.span))
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = literal_digits(tok.lexeme)
                    .parse::<i64>()
                    .map_err(|_| ParseError {
                        expected: "an integer literal".into(),
                        found: format!("`{}`", tok.lexeme),
                        span: tok.span,
                    })?;
                Ok(Expr::new(ExprKind::Literal(Literal::Int(value)), tok.span))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = literal_digits(tok.lexeme)
                    .parse::<f64>()
                    .map_err(|_| ParseError {
                        expected: "a float literal".into(),
                        found: format!("`{}`", tok.lexeme),
                        span: tok.span,
                    })?;
                Ok(Expr::new(ExprKind::Literal(Literal::Float(value)), tok.span))
            }
            TokenKind::BoolLiteral => {
                self.advance();
                let value = tok.lexeme == "true";
                Ok(Expr::new(ExprKind::Literal(Literal::Bool(value)), tok.span))
            }
            TokenKind::Ident => {
                self.advance();
                if self.at(TokenKind::LParen) {
                    return self.parse_call(tok);
                }
                Ok(Expr::new(
                    ExprKind::Identifier(Identifier {
                        name: tok.lexeme.to_string(),
                        symbol: None,
                    }),
                    tok.span,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                self.enter_expr(tok.span)?;
                let inner = self.parse_expr();
                self.expr_depth -= 1;
                let mut inner = inner?;
                let close = self.expect(TokenKind::RParen, "`)`")?;
                inner.span = tok.span.to(close.span);
                Ok(inner)
            }
            _ => Err(self.error_here("an expression")),
        }
    }

    fn parse_call(&mut self, callee: Token<'src>) -> PResult<Expr> {
        self.expect(TokenKind::LParen, "`(`")?;
        self.enter_expr(callee.span)?;
        let args = self.parse_call_args();
        self.expr_depth -= 1;
        let args = args?;
        let close = self.expect(TokenKind::RParen, "`)` after arguments")?;
        Ok(Expr::new(
            ExprKind::Call(Call {
                callee: callee.lexeme.to_string(),
                args,
                target: None,
            }),
            callee.span.to(close.span),
        ))
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.at(TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if !self.eat(TokenKind::Comma) {
                return Ok(args);
            }
        }
    }

    fn enter_expr(&mut self, span: Span) -> PResult<()> {
        if self.expr_depth >= MAX_EXPR_DEPTH {
            return Err(ParseError {
                expected: "a less deeply nested expression".into(),
                found: "too many nested operators".into(),
                span,
            });
        }
        self.expr_depth += 1;
        Ok(())
    }

    fn enter_nesting(&mut self, span: Span) -> PResult<()> {
        if self.nesting >= MAX_BLOCK_DEPTH {
            return Err(ParseError {
                expected: "a less deeply nested block".into(),
                found: "too many nested blocks".into(),
                span,
            });
        }
        self.nesting += 1;
        Ok(())
    }

    // -----------------------------------------------------------------
    // Token cursor
    // -----------------------------------------------------------------

    fn peek(&self) -> Token<'src> {
        // The lexer always terminates the stream with `Eof`.
        let last = self.tokens.len().saturating_sub(1);
        self.tokens.get(self.pos.min(last)).copied().unwrap_or(Token {
            kind: TokenKind::Eof,
            lexeme: "",
            span: Span::default(),
        })
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token<'src> {
        let tok = self.peek();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<Token<'src>> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(expected))
        }
    }

    fn error_here(&self, expected: &str) -> ParseError {
        let tok = self.peek();
        ParseError {
            expected: expected.to_string(),
            found: describe_token(&tok),
            span: tok.span,
        }
    }
}

/// Binding power of binary operators; higher binds tighter. Unary
/// operators bind tighter than all of these.
fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::Or => (BinaryOp::Or, 1),
        TokenKind::And => (BinaryOp::And, 2),
        TokenKind::EqEq => (BinaryOp::Eq, 3),
        TokenKind::NotEq => (BinaryOp::Ne, 3),
        TokenKind::Less => (BinaryOp::Lt, 3),
        TokenKind::LessEq => (BinaryOp::Le, 3),
        TokenKind::Greater => (BinaryOp::Gt, 3),
        TokenKind::GreaterEq => (BinaryOp::Ge, 3),
        TokenKind::Plus => (BinaryOp::Add, 4),
        TokenKind::Minus => (BinaryOp::Sub, 4),
        TokenKind::Star => (BinaryOp::Mul, 5),
        TokenKind::Slash => (BinaryOp::Div, 5),
        TokenKind::Percent => (BinaryOp::Rem, 5),
        _ => return None,
    };
    Some(entry)
}

fn literal_digits(lexeme: &str) -> String {
    lexeme.chars().filter(|c| *c != '_').collect()
}

fn describe_token(tok: &Token<'_>) -> String {
    if tok.kind.is_layout() || tok.lexeme.is_empty() {
        tok.kind.describe().to_string()
    } else {
        format!("`{}`", tok.lexeme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_source(source: &str) -> ParseResult {
        let lexed = lex(source);
        assert!(lexed.errors.is_empty(), "lex errors: {:?}", lexed.errors);
        parse(&lexed.tokens)
    }

    fn parse_ok(source: &str) -> Program {
        let result = parse_source(source);
        assert!(result.errors.is_empty(), "parse errors: {:?}", result.errors);
        result.program
    }

    fn single_expr(source: &str) -> Expr {
        let program = parse_ok(source);
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(expr)) => expr,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(single_expr("5 + 2 * 3\n").to_string(), "(+ 5 (* 2 3))");
        assert_eq!(single_expr("(5 + 2) * 3\n").to_string(), "(* (+ 5 2) 3)");
    }

    #[test]
    fn follows_the_binding_table() {
        assert_eq!(
            single_expr("a or b and c == d + e * -f\n").to_string(),
            "(or a (and b (== c (+ d (* e (- f))))))"
        );
        assert_eq!(
            single_expr("not a and b\n").to_string(),
            "(and (not a) b)"
        );
        assert_eq!(single_expr("a - b - c\n").to_string(), "(- (- a b) c)");
        assert_eq!(single_expr("*p + 1\n").to_string(), "(+ (* p) 1)");
    }

    #[test]
    fn parses_calls_with_arguments() {
        assert_eq!(
            single_expr("f(1, g(x), 2.5)\n").to_string(),
            "(call f 1 (call g x) 2.5)"
        );
        assert_eq!(single_expr("h()\n").to_string(), "(call h)");
    }

    #[test]
    fn parses_function_with_nested_blocks() {
        let program = parse_ok(
            "fn factorial(n: int) -> int:\n    if n <= 1:\n        return 1\n    return n * factorial(n - 1)\n",
        );
        assert_eq!(program.body.len(), 1);
        let StmtKind::FunctionDecl(func) = &program.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.name, "factorial");
        assert_eq!(func.params.len(), 1);
        assert_eq!(func.params[0].ty, Type::Int);
        assert_eq!(func.return_type, Type::Int);
        assert_eq!(func.body.stmts.len(), 2);
        assert!(matches!(func.body.stmts[0].kind, StmtKind::If(_)));
        assert!(matches!(func.body.stmts[1].kind, StmtKind::Return(_)));
    }

    #[test]
    fn desugars_elif_into_nested_if() {
        let program = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        let StmtKind::If(outer) = &program.body[0].kind else {
            panic!("expected if");
        };
        let else_block = outer.else_block.as_ref().expect("else block");
        let StmtKind::If(inner) = &else_block.stmts[0].kind else {
            panic!("expected nested if");
        };
        assert!(inner.else_block.is_some());
    }

    #[test]
    fn parses_declarations_loops_and_pointers() {
        let program = parse_ok(
            "let p: ptr[int] = alloc(4)\nlet n = 0\nfor i in 0..4:\n    *(p + i) = i\nwhile n < 4: n = n + 1\npass\n",
        );
        assert_eq!(program.body.len(), 5);
        let StmtKind::VarDecl(decl) = &program.body[0].kind else {
            panic!("expected let");
        };
        assert_eq!(decl.declared_type, Some(Type::ptr(Type::Int)));
        let StmtKind::For(for_stmt) = &program.body[2].kind else {
            panic!("expected for");
        };
        assert_eq!(for_stmt.var, "i");
        let StmtKind::Assignment(assign) = &for_stmt.body.stmts[0].kind else {
            panic!("expected assignment");
        };
        assert_eq!(assign.target.to_string(), "(* (+ p i))");
        assert!(matches!(program.body[3].kind, StmtKind::While(_)));
        assert!(matches!(program.body[4].kind, StmtKind::Pass));
    }

    #[test]
    fn reports_expected_and_found() {
        let result = parse_source("let = 5\n");
        assert_eq!(result.errors.len(), 1);
        let err = &result.errors[0];
        assert_eq!(err.expected, "variable name");
        assert_eq!(err.found, "`=`");
        assert_eq!((err.span.line, err.span.column), (1, 5));
    }

    #[test]
    fn recovers_and_collects_multiple_errors() {
        let source = "let a = 1 +\nlet b = 2\nx = = 3\nlet c = 4\nif a b:\n    y = 1\nlet d = 5\n";
        let result = parse_source(source);
        assert_eq!(result.errors.len(), 3, "errors: {:?}", result.errors);
        let names: Vec<_> = result
            .program
            .body
            .iter()
            .filter_map(|s| match &s.kind {
                StmtKind::VarDecl(d) => Some(d.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert_eq!(result.errors[0].found, "newline");
    }

    #[test]
    fn recovers_inside_nested_blocks() {
        let source = "fn f() -> int:\n    let a = )\n    return 1\nlet z = 2\n";
        let result = parse_source(source);
        assert_eq!(result.errors.len(), 1);
        let StmtKind::FunctionDecl(func) = &result.program.body[0].kind else {
            panic!("expected function");
        };
        assert_eq!(func.body.stmts.len(), 1);
        assert!(matches!(result.program.body[1].kind, StmtKind::VarDecl(_)));
    }

    #[test]
    fn stops_after_error_limit() {
        let source = "= 1\n".repeat(MAX_ERRORS + 10);
        let result = parse_source(&source);
        assert_eq!(result.errors.len(), MAX_ERRORS);
    }

    #[test]
    fn rejects_nested_function_definitions() {
        let result = parse_source("fn outer():\n    fn inner():\n        pass\n    pass\n");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].expected.contains("module level"));
    }

    #[test]
    fn rejects_unassignable_targets_and_bare_let() {
        let result = parse_source("1 + 2 = 3\nlet x\n");
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].expected.contains("left of `=`"));
        assert!(result.errors[1].expected.contains("initializer"));
    }

    #[test]
    fn reports_unexpected_indent() {
        let result = parse_source("let a = 1\n    let b = 2\nlet c = 3\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].found, "indent");
        assert_eq!(result.program.body.len(), 2);
    }

    #[test]
    fn long_operator_chains_are_rejected_without_overflowing() {
        let source = format!("let x = 1{}\nprint(x)\n", " + 1".repeat(10_000));
        let result = parse_source(&source);
        assert_eq!(result.errors.len(), 1, "errors: {:?}", result.errors);
        assert_eq!(result.errors[0].found, "too many nested operators");
        assert_eq!(result.program.body.len(), 1);
        assert!(matches!(result.program.body[0].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn moderate_operator_chains_still_parse() {
        let source = format!("let x = 1{}\n", " + 1".repeat(150));
        parse_ok(&source);
    }

    #[test]
    fn long_elif_chains_are_rejected_as_one_error() {
        let mut source = String::from("if a:\n    pass\n");
        for _ in 0..150 {
            source.push_str("elif a:\n    pass\n");
        }
        source.push_str("else:\n    pass\nlet z = 1\n");
        let result = parse_source(&source);
        assert_eq!(result.errors.len(), 1, "errors: {:?}", result.errors);
        assert_eq!(result.errors[0].found, "too many nested blocks");
        assert_eq!(result.program.body.len(), 1);
        assert!(matches!(result.program.body[0].kind, StmtKind::VarDecl(_)));
    }

    #[test]
    fn rejects_unknown_types() {
        let result = parse_source("let x: string = 1\n");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].found, "`string`");
    }
}
