//! Semantic analysis: name resolution and type inference.
//!
//! The analyzer walks the AST once (after pre-collecting the signatures of
//! module-level functions), binds every identifier to a symbol, assigns a
//! type to every expression and computes the frame size of every function.
//! Expressions whose type cannot be determined are left `Unknown`; such
//! poisoned values never produce follow-up errors.

use thiserror::Error;

use crate::ast::{
    Block, Call, CallTarget, Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind,
    UnaryOp,
};
use crate::builtins::find_builtin;
use crate::diagnostic::Diagnostic;
use crate::span::Span;
use crate::symbols::{FunctionSignature, ScopeStack, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::types::{Type, WORD_SIZE, binary_result, unary_result};
use crate::x86::{STACK_ALIGN, align_to};

/// Name of the function formed by the module's top-level statements.
pub const ENTRY_NAME: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticErrorKind {
    UndefinedSymbol,
    TypeMismatch,
    ArityMismatch,
    Redeclaration,
    InvalidReturnType,
}

impl SemanticErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            SemanticErrorKind::UndefinedSymbol => "E0301",
            SemanticErrorKind::TypeMismatch => "E0302",
            SemanticErrorKind::ArityMismatch => "E0303",
            SemanticErrorKind::Redeclaration => "E0304",
            SemanticErrorKind::InvalidReturnType => "E0305",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SemanticError {
    pub kind: SemanticErrorKind,
    pub message: String,
    pub span: Span,
}

impl SemanticError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.message.clone(), self.span).with_code(self.kind.code())
    }
}

/// A fully typed and resolved program.
#[derive(Debug)]
pub struct AnalyzedProgram {
    pub program: Program,
    pub symbols: SymbolTable,
    /// Signature of the entry function holding the top-level statements.
    pub entry: FunctionSignature,
    /// Non-fatal findings, such as statements that can never run.
    pub warnings: Vec<Diagnostic>,
}

/// Resolve names and types of `program`.
///
/// Returns every error found; analysis continues past errors so that one
/// run reports as much as possible.
pub fn analyze(mut program: Program) -> Result<AnalyzedProgram, Vec<SemanticError>> {
    let mut analyzer = Analyzer {
        symbols: SymbolTable::new(),
        scopes: ScopeStack::new(),
        errors: Vec::new(),
        warnings: Vec::new(),
        current: None,
        entry: FunctionSignature::new(ENTRY_NAME, Vec::new(), Type::Int),
    };
    analyzer.analyze_program(&mut program);
    tracing::debug!(
        symbols = analyzer.symbols.len(),
        errors = analyzer.errors.len(),
        warnings = analyzer.warnings.len(),
        "analyzed program"
    );

    if !analyzer.errors.is_empty() {
        return Err(analyzer.errors);
    }
    Ok(AnalyzedProgram {
        program,
        symbols: analyzer.symbols,
        entry: analyzer.entry,
        warnings: analyzer.warnings,
    })
}

struct FunctionContext {
    id: SymbolId,
    return_type: Type,
}

struct Analyzer {
    symbols: SymbolTable,
    scopes: ScopeStack,
    errors: Vec<SemanticError>,
    warnings: Vec<Diagnostic>,
    /// Function whose body is being analyzed; `None` for top-level code.
    current: Option<FunctionContext>,
    entry: FunctionSignature,
}

impl Analyzer {
    fn analyze_program(&mut self, program: &mut Program) {
        self.scopes.push();
        for stmt in &mut program.body {
            if let StmtKind::FunctionDecl(func) = &mut stmt.kind {
                self.declare_function(func);
            }
        }
        for stmt in &mut program.body {
            self.check_stmt(stmt);
        }
        self.scopes.pop();

        let ids: Vec<SymbolId> = self
            .symbols
            .iter()
            .filter(|(_, s)| s.kind == SymbolKind::Function)
            .map(|(id, _)| id)
            .collect();
        for id in ids {
            if let Some(sig) = self.symbols.signature_mut(id) {
                sig.frame_size = frame_size(sig.locals.len());
            }
        }
        self.entry.frame_size = frame_size(self.entry.locals.len());
    }

    fn error(&mut self, kind: SemanticErrorKind, message: impl Into<String>, span: Span) {
        self.errors.push(SemanticError {
            kind,
            message: message.into(),
            span,
        });
    }

    fn declare_function(&mut self, func: &mut FunctionDecl) {
        for param in &func.params {
            if !is_value_type(&param.ty) {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("parameter `{}` cannot have type `{}`", param.name, param.ty),
                    param.span,
                );
            }
        }
        if func.return_type.pointee().is_some() && !is_value_type(&func.return_type) {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!("invalid return type `{}`", func.return_type),
                func.name_span,
            );
        }

        let id = self.symbols.add(Symbol {
            name: func.name.clone(),
            ty: func.return_type.clone(),
            depth: self.scopes.depth(),
            kind: SymbolKind::Function,
            storage: None,
            address_taken: false,
            span: func.name_span,
        });
        let params = func.params.iter().map(|p| p.ty.clone()).collect();
        self.symbols.set_signature(
            id,
            FunctionSignature::new(func.name.clone(), params, func.return_type.clone()),
        );
        self.bind(&func.name, id, func.name_span);
        func.symbol = Some(id);
    }

    /// Bind `name` in the innermost scope, reporting a redeclaration.
    fn bind(&mut self, name: &str, id: SymbolId, span: Span) {
        if let Err(existing) = self.scopes.declare(name, id) {
            let previous = self.symbols.get(existing);
            let message = format!(
                "`{name}` is already declared in this scope (previous {} at {})",
                previous.kind, previous.span
            );
            self.error(SemanticErrorKind::Redeclaration, message, span);
        }
    }

    /// Create a variable or parameter symbol in the innermost scope and
    /// record it in the frame of the enclosing function.
    fn declare_local(&mut self, name: &str, ty: Type, kind: SymbolKind, span: Span) -> SymbolId {
        let depth = self.scopes.depth();
        let id = self.symbols.add(Symbol {
            name: name.to_string(),
            ty,
            depth,
            kind,
            storage: None,
            address_taken: false,
            span,
        });
        self.bind(name, id, span);

        match &self.current {
            Some(ctx) => {
                let fn_id = ctx.id;
                if let Some(sig) = self.symbols.signature_mut(fn_id) {
                    sig.locals.push(id);
                }
            }
            None if depth > 0 => self.entry.locals.push(id),
            // Module-level variables are globals and take no frame slot.
            None => {}
        }
        id
    }

    fn check_function(&mut self, func: &mut FunctionDecl) {
        let Some(id) = func.symbol else {
            return;
        };
        self.scopes.push();
        self.current = Some(FunctionContext {
            id,
            return_type: func.return_type.clone(),
        });

        for param in &mut func.params {
            let ty = if is_value_type(&param.ty) {
                param.ty.clone()
            } else {
                Type::Unknown
            };
            let param_id = self.declare_local(&param.name, ty, SymbolKind::Parameter, param.span);
            param.symbol = Some(param_id);
        }
        // The body's top-level declarations share the parameters' scope.
        self.check_stmts(&mut func.body.stmts);

        if !func.return_type.is_void() && !block_returns(&func.body) {
            self.error(
                SemanticErrorKind::InvalidReturnType,
                format!(
                    "function `{}` may finish without returning a value of type `{}`",
                    func.name, func.return_type
                ),
                func.name_span,
            );
        }

        self.current = None;
        self.scopes.pop();
    }

    fn check_block(&mut self, block: &mut Block) {
        self.scopes.push();
        self.check_stmts(&mut block.stmts);
        self.scopes.pop();
    }

    /// Check a statement sequence, warning once about statements that
    /// follow a definite return.
    fn check_stmts(&mut self, stmts: &mut [Stmt]) {
        let mut returned = false;
        for stmt in stmts {
            if returned {
                self.warnings.push(
                    Diagnostic::warning("unreachable statement after `return`", stmt.span)
                        .with_code("W0301"),
                );
                returned = false;
            }
            self.check_stmt(stmt);
            if stmt_returns(stmt) {
                returned = true;
            }
        }
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::FunctionDecl(func) => self.check_function(func),
            StmtKind::VarDecl(decl) => {
                let init_ty = decl.init.as_mut().map(|init| (self.check_expr(init), init.span));
                let mut ty = match (&decl.declared_type, init_ty) {
                    (Some(declared), Some((found, span))) => {
                        if !found.contains_unknown() && &found != declared {
                            self.error(
                                SemanticErrorKind::TypeMismatch,
                                format!(
                                    "`{}` is declared as `{declared}` but initialized with `{found}`",
                                    decl.name
                                ),
                                span,
                            );
                        }
                        declared.clone()
                    }
                    (Some(declared), None) => declared.clone(),
                    (None, Some((found, _))) => found,
                    (None, None) => Type::Unknown,
                };
                if !ty.contains_unknown() && !is_value_type(&ty) {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!("variable `{}` cannot have type `{ty}`", decl.name),
                        decl.name_span,
                    );
                    ty = Type::Unknown;
                }
                decl.ty = ty.clone();
                let id = self.declare_local(&decl.name, ty, SymbolKind::Variable, decl.name_span);
                decl.symbol = Some(id);
            }
            StmtKind::Assignment(assign) => {
                let target_ty = self.check_expr(&mut assign.target);
                let value_ty = self.check_expr(&mut assign.value);
                if !target_ty.contains_unknown()
                    && !value_ty.contains_unknown()
                    && target_ty != value_ty
                {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!("cannot assign a value of type `{value_ty}` to `{target_ty}`"),
                        assign.value.span,
                    );
                }
            }
            StmtKind::If(if_stmt) => {
                self.expect_type(&mut if_stmt.condition, &Type::Bool, "`if` condition");
                self.check_block(&mut if_stmt.then_block);
                if let Some(else_block) = &mut if_stmt.else_block {
                    self.check_block(else_block);
                }
            }
            StmtKind::While(while_stmt) => {
                self.expect_type(&mut while_stmt.condition, &Type::Bool, "`while` condition");
                self.check_block(&mut while_stmt.body);
            }
            StmtKind::For(for_stmt) => {
                self.expect_type(&mut for_stmt.start, &Type::Int, "range start");
                self.expect_type(&mut for_stmt.end, &Type::Int, "range end");
                self.scopes.push();
                let id = self.declare_local(
                    &for_stmt.var,
                    Type::Int,
                    SymbolKind::Variable,
                    for_stmt.var_span,
                );
                for_stmt.symbol = Some(id);
                for stmt in &mut for_stmt.body.stmts {
                    self.check_stmt(stmt);
                }
                self.scopes.pop();
            }
            StmtKind::Return(ret) => {
                let found = ret.value.as_mut().map(|v| self.check_expr(v));
                let Some(expected) = self.current.as_ref().map(|c| c.return_type.clone()) else {
                    self.error(
                        SemanticErrorKind::InvalidReturnType,
                        "`return` outside of a function",
                        stmt.span,
                    );
                    return;
                };
                match found {
                    None if !expected.is_void() => self.error(
                        SemanticErrorKind::InvalidReturnType,
                        format!("missing return value of type `{expected}`"),
                        stmt.span,
                    ),
                    Some(_) if expected.is_void() => self.error(
                        SemanticErrorKind::InvalidReturnType,
                        "cannot return a value from a function without a return type",
                        stmt.span,
                    ),
                    Some(found) if !found.contains_unknown() && found != expected => self.error(
                        SemanticErrorKind::InvalidReturnType,
                        format!("expected a return value of type `{expected}`, found `{found}`"),
                        stmt.span,
                    ),
                    _ => {}
                }
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Pass => {}
        }
    }

    fn expect_type(&mut self, expr: &mut Expr, expected: &Type, what: &str) {
        let found = self.check_expr(expr);
        if !found.contains_unknown() && &found != expected {
            self.error(
                SemanticErrorKind::TypeMismatch,
                format!("{what} must be `{expected}`, found `{found}`"),
                expr.span,
            );
        }
    }

    /// Infer the type of `expr`, record it on the node and return it.
    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let span = expr.span;
        let ty = match &mut expr.kind {
            ExprKind::Literal(Literal::Int(_)) => Type::Int,
            ExprKind::Literal(Literal::Float(_)) => Type::Float,
            ExprKind::Literal(Literal::Bool(_)) => Type::Bool,
            ExprKind::Identifier(ident) => match self.scopes.lookup(&ident.name) {
                None => {
                    self.error(
                        SemanticErrorKind::UndefinedSymbol,
                        format!("undefined variable `{}`", ident.name),
                        span,
                    );
                    Type::Unknown
                }
                Some(id) if self.symbols.get(id).kind == SymbolKind::Function => {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!("function `{}` cannot be used as a value", ident.name),
                        span,
                    );
                    Type::Unknown
                }
                Some(id) => {
                    ident.symbol = Some(id);
                    self.symbols.get(id).ty.clone()
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.check_expr(lhs);
                let rhs_ty = self.check_expr(rhs);
                if lhs_ty.contains_unknown() || rhs_ty.contains_unknown() {
                    Type::Unknown
                } else if let Some(ty) = binary_result(*op, &lhs_ty, &rhs_ty) {
                    ty
                } else {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!(
                            "operator `{}` cannot be applied to `{lhs_ty}` and `{rhs_ty}`",
                            op.symbol()
                        ),
                        span,
                    );
                    Type::Unknown
                }
            }
            ExprKind::Unary {
                op: UnaryOp::AddrOf,
                operand,
            } => self.check_address_of(operand, span),
            ExprKind::Unary { op, operand } => {
                let operand_ty = self.check_expr(operand);
                if operand_ty.contains_unknown() {
                    Type::Unknown
                } else if let Some(ty) = unary_result(*op, &operand_ty) {
                    ty
                } else {
                    self.error(
                        SemanticErrorKind::TypeMismatch,
                        format!(
                            "operator `{}` cannot be applied to `{operand_ty}`",
                            op.symbol()
                        ),
                        span,
                    );
                    Type::Unknown
                }
            }
            ExprKind::Call(call) => self.check_call(call, span),
        };
        expr.ty = ty.clone();
        ty
    }

    fn check_address_of(&mut self, operand: &mut Expr, span: Span) -> Type {
        let ExprKind::Identifier(_) = operand.kind else {
            self.check_expr(operand);
            self.error(
                SemanticErrorKind::TypeMismatch,
                "`&` can only be applied to a variable",
                span,
            );
            return Type::Unknown;
        };
        let ty = self.check_expr(operand);
        let ExprKind::Identifier(ident) = &operand.kind else {
            return Type::Unknown;
        };
        let Some(id) = ident.symbol else {
            return Type::Unknown;
        };
        self.symbols.get_mut(id).address_taken = true;
        if ty.contains_unknown() {
            Type::Unknown
        } else {
            Type::ptr(ty)
        }
    }

    fn check_call(&mut self, call: &mut Call, span: Span) -> Type {
        let arg_types: Vec<Type> = call.args.iter_mut().map(|a| self.check_expr(a)).collect();

        if let Some(id) = self.scopes.lookup(&call.callee) {
            let Some(signature) = self.symbols.signature(id).cloned() else {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("`{}` is not a function", call.callee),
                    span,
                );
                return Type::Unknown;
            };
            if signature.params.len() != arg_types.len() {
                self.error(
                    SemanticErrorKind::ArityMismatch,
                    format!(
                        "function `{}` expects {} argument(s), found {}",
                        call.callee,
                        signature.params.len(),
                        arg_types.len()
                    ),
                    span,
                );
            } else {
                for ((expected, found), arg) in
                    signature.params.iter().zip(&arg_types).zip(&call.args)
                {
                    if !found.contains_unknown()
                        && !expected.contains_unknown()
                        && found != expected
                    {
                        self.error(
                            SemanticErrorKind::TypeMismatch,
                            format!("expected an argument of type `{expected}`, found `{found}`"),
                            arg.span,
                        );
                    }
                }
            }
            call.target = Some(CallTarget::Function(id));
            return signature.return_type;
        }

        let Some(builtin) = find_builtin(&call.callee) else {
            self.error(
                SemanticErrorKind::UndefinedSymbol,
                format!("undefined function `{}`", call.callee),
                span,
            );
            return Type::Unknown;
        };
        if arg_types.len() != builtin.arity {
            self.error(
                SemanticErrorKind::ArityMismatch,
                format!(
                    "builtin `{}` expects {} argument(s), found {}",
                    builtin.name,
                    builtin.arity,
                    arg_types.len()
                ),
                span,
            );
            return Type::Unknown;
        }
        let arg = &arg_types[0];
        if arg.contains_unknown() {
            return Type::Unknown;
        }
        match builtin.builtin.resolve(arg) {
            Some(kind) => {
                call.target = Some(CallTarget::Builtin(kind));
                kind.result_type()
            }
            None => {
                self.error(
                    SemanticErrorKind::TypeMismatch,
                    format!("builtin `{}` cannot be called with `{arg}`", builtin.name),
                    span,
                );
                Type::Unknown
            }
        }
    }
}

/// Whether a value of type `ty` may be stored, passed or pointed to.
fn is_value_type(ty: &Type) -> bool {
    match ty {
        Type::Ptr(inner) => is_value_type(inner),
        other => other.is_storable(),
    }
}

/// Whether every path through `block` ends in a `return`.
fn block_returns(block: &Block) -> bool {
    block.stmts.iter().any(stmt_returns)
}

fn stmt_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::If(if_stmt) => {
            block_returns(&if_stmt.then_block)
                && if_stmt.else_block.as_ref().is_some_and(block_returns)
        }
        _ => false,
    }
}

fn frame_size(slots: usize) -> u32 {
    align_to(slots as u32 * WORD_SIZE as u32, STACK_ALIGN)
}
