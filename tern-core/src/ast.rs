//! Abstract syntax tree for Tern.
//!
//! The parser builds the tree once; the semantic analyzer then fills in the
//! `ty` field of every expression and the `symbol` bindings of identifiers,
//! declarations and calls. No other pass mutates it.

use std::fmt;

use crate::builtins::BuiltinKind;
use crate::span::Span;
use crate::symbols::SymbolId;
use crate::types::Type;

/// Root of one translation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDecl(FunctionDecl),
    VarDecl(VarDecl),
    Assignment(Assignment),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Return(ReturnStmt),
    Expr(Expr),
    Pass,
}

/// An indented statement sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: Span,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Block,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub span: Span,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub name: String,
    pub name_span: Span,
    pub declared_type: Option<Type>,
    pub init: Option<Expr>,
    /// Resolved type of the variable, filled in by the analyzer.
    pub ty: Type,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Either an `Identifier` or a dereference `*expr`.
    pub target: Expr,
    pub value: Expr,
}

/// `if` statement. `elif` chains are stored as an `else` block holding a
/// single nested `If`.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
}

/// `for name in start..end:` iterates over the half-open integer range.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub var: String,
    pub var_span: Span,
    pub start: Expr,
    pub end: Expr,
    pub body: Block,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// `Type::Unknown` until the analyzer resolves it.
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(Identifier),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call(Call),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub symbol: Option<SymbolId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
    pub target: Option<CallTarget>,
}

/// What a call resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Function(SymbolId),
    Builtin(BuiltinKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
    /// `*p`
    Deref,
    /// `&x`
    AddrOf,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "not",
            UnaryOp::Deref => "*",
            UnaryOp::AddrOf => "&",
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            ty: Type::Unknown,
            span,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        let span = lhs.span.to(rhs.span);
        Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    pub fn unary(op: UnaryOp, operand: Expr, span: Span) -> Self {
        let span = span.to(operand.span);
        Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        )
    }

    /// Whether the expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_)
                | ExprKind::Unary {
                    op: UnaryOp::Deref,
                    ..
                }
        )
    }
}

/// Renders expressions as S-expressions, e.g. `(+ 5 (* 2 3))`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(Literal::Int(v)) => write!(f, "{v}"),
            ExprKind::Literal(Literal::Float(v)) => write!(f, "{v:?}"),
            ExprKind::Literal(Literal::Bool(v)) => write!(f, "{v}"),
            ExprKind::Identifier(ident) => f.write_str(&ident.name),
            ExprKind::Binary { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            ExprKind::Unary { op, operand } => write!(f, "({} {operand})", op.symbol()),
            ExprKind::Call(call) => {
                write!(f, "(call {}", call.callee)?;
                for arg in &call.args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// One statement per line, nested blocks indented by two spaces.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.body {
            write_stmt(f, stmt, 0)?;
        }
        Ok(())
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, block: &Block, indent: usize) -> fmt::Result {
    for stmt in &block.stmts {
        write_stmt(f, stmt, indent)?;
    }
    Ok(())
}

fn write_stmt(f: &mut fmt::Formatter<'_>, stmt: &Stmt, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    match &stmt.kind {
        StmtKind::FunctionDecl(func) => {
            write!(f, "{pad}(fn {} (", func.name)?;
            for (i, param) in func.params.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{}: {}", param.name, param.ty)?;
            }
            writeln!(f, ") -> {})", func.return_type)?;
            write_block(f, &func.body, indent + 1)
        }
        StmtKind::VarDecl(decl) => {
            write!(f, "{pad}(let {}", decl.name)?;
            if let Some(ty) = &decl.declared_type {
                write!(f, ": {ty}")?;
            }
            if let Some(init) = &decl.init {
                write!(f, " {init}")?;
            }
            writeln!(f, ")")
        }
        StmtKind::Assignment(assign) => {
            writeln!(f, "{pad}(= {} {})", assign.target, assign.value)
        }
        StmtKind::If(if_stmt) => {
            writeln!(f, "{pad}(if {})", if_stmt.condition)?;
            write_block(f, &if_stmt.then_block, indent + 1)?;
            if let Some(else_block) = &if_stmt.else_block {
                writeln!(f, "{pad}(else)")?;
                write_block(f, else_block, indent + 1)?;
            }
            Ok(())
        }
        StmtKind::While(while_stmt) => {
            writeln!(f, "{pad}(while {})", while_stmt.condition)?;
            write_block(f, &while_stmt.body, indent + 1)
        }
        StmtKind::For(for_stmt) => {
            writeln!(
                f,
                "{pad}(for {} {} {})",
                for_stmt.var, for_stmt.start, for_stmt.end
            )?;
            write_block(f, &for_stmt.body, indent + 1)
        }
        StmtKind::Return(ret) => match &ret.value {
            Some(value) => writeln!(f, "{pad}(return {value})"),
            None => writeln!(f, "{pad}(return)"),
        },
        StmtKind::Expr(expr) => writeln!(f, "{pad}{expr}"),
        StmtKind::Pass => writeln!(f, "{pad}(pass)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Literal(Literal::Int(v)), Span::default())
    }

    #[test]
    fn renders_nested_expression() {
        let product = Expr::binary(BinaryOp::Mul, int(2), int(3));
        let sum = Expr::binary(BinaryOp::Add, int(5), product);
        assert_eq!(sum.to_string(), "(+ 5 (* 2 3))");
        assert_eq!(sum.ty, Type::Unknown);
    }

    #[test]
    fn only_identifiers_and_derefs_are_assignable() {
        let ident = Expr::new(
            ExprKind::Identifier(Identifier {
                name: "x".into(),
                symbol: None,
            }),
            Span::default(),
        );
        let deref = Expr::unary(UnaryOp::Deref, ident.clone(), Span::default());
        assert!(ident.is_assignable());
        assert!(deref.is_assignable());
        assert!(!int(1).is_assignable());
        assert!(!Expr::unary(UnaryOp::Neg, int(1), Span::default()).is_assignable());
    }

    #[test]
    fn renders_program_tree() {
        let stmt = |kind| Stmt {
            kind,
            span: Span::default(),
        };
        let body = Block {
            stmts: vec![stmt(StmtKind::Return(ReturnStmt {
                value: Some(int(1)),
            }))],
            span: Span::default(),
        };
        let program = Program {
            body: vec![
                stmt(StmtKind::FunctionDecl(FunctionDecl {
                    name: "one".into(),
                    name_span: Span::default(),
                    params: vec![Param {
                        name: "x".into(),
                        ty: Type::Int,
                        span: Span::default(),
                        symbol: None,
                    }],
                    return_type: Type::Int,
                    body,
                    symbol: None,
                })),
                stmt(StmtKind::Pass),
            ],
        };
        assert_eq!(
            program.to_string(),
            "(fn one (x: int) -> int)\n  (return 1)\n(pass)\n"
        );
    }
}
