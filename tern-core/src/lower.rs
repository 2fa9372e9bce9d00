//! Lowering of the analyzed AST to the virtual-register IR.
//!
//! Every function (and the entry function built from the top-level
//! statements) becomes one `IrFunction`. Variables get the first virtual
//! registers, in frame order; temporaries follow.

use rustc_hash::FxHashMap;

use crate::ast::{
    BinaryOp, Block, Call, CallTarget, Expr, ExprKind, ForStmt, FunctionDecl, IfStmt, Literal,
    Stmt, StmtKind, UnaryOp, WhileStmt,
};
use crate::builtins::BuiltinKind;
use crate::codegen::CodeGenError;
use crate::context::CompilationContext;
use crate::ir::{BinOp, Cond, Inst, IrFunction, Label, LoopRegion, ValueClass, VReg, VarInfo};
use crate::sema::AnalyzedProgram;
use crate::symbols::{FunctionSignature, SymbolId, SymbolTable};
use crate::types::{Type, WORD_SIZE};
use crate::x86::classify_args;

/// Assembly symbol of a user function.
pub fn function_symbol(name: &str) -> String {
    format!("tern_fn_{name}")
}

/// Assembly symbol of a module-level variable.
pub fn global_symbol(name: &str) -> String {
    format!("tern_global_{name}")
}

pub fn value_class(ty: &Type) -> ValueClass {
    match ty {
        Type::Float => ValueClass::Float,
        _ => ValueClass::Int,
    }
}

#[derive(Debug)]
pub struct LoweredProgram {
    /// User functions in declaration order, followed by the entry function.
    pub functions: Vec<IrFunction>,
    /// Module-level variables and their assembly symbols.
    pub globals: Vec<(SymbolId, String)>,
}

pub fn lower_program(
    analyzed: &AnalyzedProgram,
    ctx: &mut CompilationContext,
) -> Result<LoweredProgram, CodeGenError> {
    let symbols = &analyzed.symbols;
    let mut functions = Vec::new();
    let mut top_level = Vec::new();

    for stmt in &analyzed.program.body {
        match &stmt.kind {
            StmtKind::FunctionDecl(func) => functions.push(lower_function(func, symbols, ctx)?),
            _ => top_level.push(stmt),
        }
    }

    let mut entry = FunctionLowering::new(&analyzed.entry, symbols, ctx);
    for stmt in top_level {
        entry.lower_stmt(stmt)?;
    }
    let zero = entry.constant(0);
    entry.emit(Inst::Return {
        value: Some((zero, ValueClass::Int)),
    });
    functions.push(entry.finish(analyzed.entry.name.clone(), &analyzed.entry, true));

    let globals = symbols
        .iter()
        .filter(|(_, s)| s.is_global())
        .map(|(id, s)| (id, global_symbol(&s.name)))
        .collect();

    Ok(LoweredProgram { functions, globals })
}

fn lower_function(
    func: &FunctionDecl,
    symbols: &SymbolTable,
    ctx: &mut CompilationContext,
) -> Result<IrFunction, CodeGenError> {
    let id = func.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
        name: func.name.clone(),
    })?;
    let signature = symbols
        .signature(id)
        .ok_or_else(|| CodeGenError::UnboundSymbol {
            name: func.name.clone(),
        })?;

    let mut lowering = FunctionLowering::new(signature, symbols, ctx);
    let slots = classify_args(func.params.iter().map(|p| p.ty == Type::Float));
    for (param, slot) in func.params.iter().zip(slots) {
        let symbol = param.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
            name: param.name.clone(),
        })?;
        let dst = lowering.var_reg(symbol)?;
        lowering.emit(Inst::Param { dst, slot });
    }
    lowering.lower_block(&func.body)?;
    if func.return_type.is_void() {
        lowering.emit(Inst::Return { value: None });
    }
    Ok(lowering.finish(function_symbol(&func.name), signature, false))
}

struct FunctionLowering<'a> {
    symbols: &'a SymbolTable,
    ctx: &'a mut CompilationContext,
    insts: Vec<Inst>,
    next_vreg: u32,
    vars: FxHashMap<SymbolId, VReg>,
    variables: Vec<VarInfo>,
    loops: Vec<LoopRegion>,
    return_label: Label,
}

type LResult<T> = Result<T, CodeGenError>;

impl<'a> FunctionLowering<'a> {
    fn new(
        signature: &FunctionSignature,
        symbols: &'a SymbolTable,
        ctx: &'a mut CompilationContext,
    ) -> Self {
        let mut vars = FxHashMap::default();
        let mut variables = Vec::with_capacity(signature.locals.len());
        for (index, &symbol) in signature.locals.iter().enumerate() {
            let vreg = VReg(index as u32);
            vars.insert(symbol, vreg);
            variables.push(VarInfo {
                vreg,
                symbol,
                pinned: symbols.get(symbol).address_taken,
            });
        }
        let return_label = ctx.fresh_label();
        FunctionLowering {
            symbols,
            ctx,
            insts: Vec::new(),
            next_vreg: variables.len() as u32,
            vars,
            variables,
            loops: Vec::new(),
            return_label,
        }
    }

    fn finish(self, name: String, signature: &FunctionSignature, is_entry: bool) -> IrFunction {
        tracing::debug!(
            function = %name,
            instructions = self.insts.len(),
            vregs = self.next_vreg,
            "lowered function"
        );
        IrFunction {
            name,
            insts: self.insts,
            vreg_count: self.next_vreg,
            variables: self.variables,
            loops: self.loops,
            frame_size: signature.frame_size,
            return_label: self.return_label,
            is_entry,
        }
    }

    fn emit(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    fn fresh(&mut self) -> VReg {
        let vreg = VReg(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    fn label(&mut self) -> Label {
        self.ctx.fresh_label()
    }

    fn constant(&mut self, value: i64) -> VReg {
        let dst = self.fresh();
        self.emit(Inst::Const { dst, value });
        dst
    }

    fn var_reg(&self, symbol: SymbolId) -> LResult<VReg> {
        self.vars
            .get(&symbol)
            .copied()
            .ok_or_else(|| CodeGenError::UnboundSymbol {
                name: self.symbols.get(symbol).name.clone(),
            })
    }

    fn read_var(&mut self, symbol: SymbolId) -> LResult<VReg> {
        let sym = self.symbols.get(symbol);
        if sym.is_global() {
            let dst = self.fresh();
            let name = global_symbol(&sym.name);
            self.emit(Inst::LoadGlobal { dst, symbol: name });
            return Ok(dst);
        }
        let var = self.var_reg(symbol)?;
        if sym.address_taken {
            // Stores through pointers may change the slot later on.
            let dst = self.fresh();
            self.emit(Inst::Copy { dst, src: var });
            return Ok(dst);
        }
        Ok(var)
    }

    fn write_var(&mut self, symbol: SymbolId, src: VReg) -> LResult<()> {
        let sym = self.symbols.get(symbol);
        if sym.is_global() {
            let name = global_symbol(&sym.name);
            self.emit(Inst::StoreGlobal { symbol: name, src });
        } else {
            let dst = self.var_reg(symbol)?;
            self.emit(Inst::Copy { dst, src });
        }
        Ok(())
    }

    fn lower_block(&mut self, block: &Block) -> LResult<()> {
        for stmt in &block.stmts {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> LResult<()> {
        match &stmt.kind {
            StmtKind::FunctionDecl(func) => Err(CodeGenError::Unsupported {
                what: format!("nested function `{}`", func.name),
            }),
            StmtKind::VarDecl(decl) => {
                let symbol = decl.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
                    name: decl.name.clone(),
                })?;
                match &decl.init {
                    Some(init) => {
                        let value = self.lower_expr(init)?;
                        self.write_var(symbol, value)
                    }
                    // Globals start out zeroed in the data section.
                    None if self.symbols.get(symbol).is_global() => Ok(()),
                    None => {
                        let zero = self.constant(0);
                        self.write_var(symbol, zero)
                    }
                }
            }
            StmtKind::Assignment(assign) => match &assign.target.kind {
                ExprKind::Identifier(ident) => {
                    let symbol = ident.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
                        name: ident.name.clone(),
                    })?;
                    let value = self.lower_expr(&assign.value)?;
                    self.write_var(symbol, value)
                }
                ExprKind::Unary {
                    op: UnaryOp::Deref,
                    operand,
                } => {
                    let addr = self.lower_expr(operand)?;
                    let src = self.lower_expr(&assign.value)?;
                    self.emit(Inst::Store { addr, src });
                    Ok(())
                }
                _ => Err(CodeGenError::Unsupported {
                    what: format!("assignment to `{}`", assign.target),
                }),
            },
            StmtKind::If(if_stmt) => self.lower_if(if_stmt),
            StmtKind::While(while_stmt) => self.lower_while(while_stmt),
            StmtKind::For(for_stmt) => self.lower_for(for_stmt),
            StmtKind::Return(ret) => {
                let value = match &ret.value {
                    Some(expr) => Some((self.lower_expr(expr)?, value_class(&expr.ty))),
                    None => None,
                };
                self.emit(Inst::Return { value });
                Ok(())
            }
            StmtKind::Expr(expr) => {
                if let ExprKind::Call(call) = &expr.kind {
                    self.lower_call(call, expr)?;
                } else {
                    self.lower_expr(expr)?;
                }
                Ok(())
            }
            StmtKind::Pass => Ok(()),
        }
    }

    fn lower_if(&mut self, if_stmt: &IfStmt) -> LResult<()> {
        let cond = self.lower_expr(&if_stmt.condition)?;
        let else_label = self.label();
        self.emit(Inst::JumpIfZero {
            cond,
            target: else_label,
        });
        self.lower_block(&if_stmt.then_block)?;
        match &if_stmt.else_block {
            Some(else_block) => {
                let end_label = self.label();
                self.emit(Inst::Jump(end_label));
                self.emit(Inst::Label(else_label));
                self.lower_block(else_block)?;
                self.emit(Inst::Label(end_label));
            }
            None => self.emit(Inst::Label(else_label)),
        }
        Ok(())
    }

    fn lower_while(&mut self, while_stmt: &WhileStmt) -> LResult<()> {
        let head = self.label();
        let exit = self.label();
        let start = self.insts.len();
        self.emit(Inst::Label(head));
        let cond = self.lower_expr(&while_stmt.condition)?;
        self.emit(Inst::JumpIfZero { cond, target: exit });
        self.lower_block(&while_stmt.body)?;
        self.emit(Inst::Jump(head));
        self.loops.push(LoopRegion {
            start,
            end: self.insts.len(),
        });
        self.emit(Inst::Label(exit));
        Ok(())
    }

    fn lower_for(&mut self, for_stmt: &ForStmt) -> LResult<()> {
        let symbol = for_stmt.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
            name: for_stmt.var.clone(),
        })?;
        let start_value = self.lower_expr(&for_stmt.start)?;
        self.write_var(symbol, start_value)?;
        // The bound is evaluated once, before the first iteration.
        let bound_value = self.lower_expr(&for_stmt.end)?;
        let bound = self.fresh();
        self.emit(Inst::Copy {
            dst: bound,
            src: bound_value,
        });

        let head = self.label();
        let exit = self.label();
        let start = self.insts.len();
        self.emit(Inst::Label(head));
        let current = self.read_var(symbol)?;
        let in_range = self.fresh();
        self.emit(Inst::Compare {
            cond: Cond::Lt,
            float: false,
            dst: in_range,
            lhs: current,
            rhs: bound,
        });
        self.emit(Inst::JumpIfZero {
            cond: in_range,
            target: exit,
        });
        self.lower_block(&for_stmt.body)?;
        let current = self.read_var(symbol)?;
        let one = self.constant(1);
        let next = self.fresh();
        self.emit(Inst::Binary {
            op: BinOp::IAdd,
            dst: next,
            lhs: current,
            rhs: one,
        });
        self.write_var(symbol, next)?;
        self.emit(Inst::Jump(head));
        self.loops.push(LoopRegion {
            start,
            end: self.insts.len(),
        });
        self.emit(Inst::Label(exit));
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr) -> LResult<VReg> {
        if expr.ty.contains_unknown() {
            return Err(CodeGenError::UnresolvedType { span: expr.span });
        }
        match &expr.kind {
            ExprKind::Literal(literal) => {
                let value = match *literal {
                    Literal::Int(v) => v,
                    Literal::Float(v) => v.to_bits() as i64,
                    Literal::Bool(v) => i64::from(v),
                };
                Ok(self.constant(value))
            }
            ExprKind::Identifier(ident) => {
                let symbol = ident.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
                    name: ident.name.clone(),
                })?;
                self.read_var(symbol)
            }
            ExprKind::Binary { op, lhs, rhs } if op.is_logical() => {
                self.lower_short_circuit(*op, lhs, rhs)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                self.lower_binary(*op, (l, &lhs.ty), (r, &rhs.ty))
            }
            ExprKind::Unary { op, operand } => self.lower_unary(*op, operand),
            ExprKind::Call(call) => self
                .lower_call(call, expr)?
                .ok_or(CodeGenError::VoidValue { span: expr.span }),
        }
    }

    fn lower_short_circuit(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> LResult<VReg> {
        let dst = self.fresh();
        let end = self.label();
        let l = self.lower_expr(lhs)?;
        self.emit(Inst::Copy { dst, src: l });
        if op == BinaryOp::And {
            self.emit(Inst::JumpIfZero {
                cond: dst,
                target: end,
            });
        } else {
            self.emit(Inst::JumpIfNonZero {
                cond: dst,
                target: end,
            });
        }
        let r = self.lower_expr(rhs)?;
        self.emit(Inst::Copy { dst, src: r });
        self.emit(Inst::Label(end));
        Ok(dst)
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        (lhs, lhs_ty): (VReg, &Type),
        (rhs, rhs_ty): (VReg, &Type),
    ) -> LResult<VReg> {
        let float = *lhs_ty == Type::Float;
        if op.is_comparison() {
            let cond = match op {
                BinaryOp::Eq => Cond::Eq,
                BinaryOp::Ne => Cond::Ne,
                BinaryOp::Lt => Cond::Lt,
                BinaryOp::Le => Cond::Le,
                BinaryOp::Gt => Cond::Gt,
                _ => Cond::Ge,
            };
            let dst = self.fresh();
            self.emit(Inst::Compare {
                cond,
                float,
                dst,
                lhs,
                rhs,
            });
            return Ok(dst);
        }

        match (op, lhs_ty.is_pointer(), rhs_ty.is_pointer()) {
            (BinaryOp::Add, true, false) => {
                let offset = self.scale(rhs);
                Ok(self.binary(BinOp::IAdd, lhs, offset))
            }
            (BinaryOp::Add, false, true) => {
                let offset = self.scale(lhs);
                Ok(self.binary(BinOp::IAdd, offset, rhs))
            }
            (BinaryOp::Sub, true, false) => {
                let offset = self.scale(rhs);
                Ok(self.binary(BinOp::ISub, lhs, offset))
            }
            (BinaryOp::Sub, true, true) => {
                let bytes = self.binary(BinOp::ISub, lhs, rhs);
                let word = self.constant(WORD_SIZE);
                Ok(self.binary(BinOp::IDiv, bytes, word))
            }
            (_, false, false) => {
                let bin = match (op, float) {
                    (BinaryOp::Add, false) => BinOp::IAdd,
                    (BinaryOp::Sub, false) => BinOp::ISub,
                    (BinaryOp::Mul, false) => BinOp::IMul,
                    (BinaryOp::Div, false) => BinOp::IDiv,
                    (BinaryOp::Rem, false) => BinOp::IRem,
                    (BinaryOp::Add, true) => BinOp::FAdd,
                    (BinaryOp::Sub, true) => BinOp::FSub,
                    (BinaryOp::Mul, true) => BinOp::FMul,
                    (BinaryOp::Div, true) => BinOp::FDiv,
                    _ => {
                        return Err(CodeGenError::Unsupported {
                            what: format!("operator `{}` on `{lhs_ty}`", op.symbol()),
                        });
                    }
                };
                Ok(self.binary(bin, lhs, rhs))
            }
            _ => Err(CodeGenError::Unsupported {
                what: format!(
                    "operator `{}` on `{lhs_ty}` and `{rhs_ty}`",
                    op.symbol()
                ),
            }),
        }
    }

    fn binary(&mut self, op: BinOp, lhs: VReg, rhs: VReg) -> VReg {
        let dst = self.fresh();
        self.emit(Inst::Binary { op, dst, lhs, rhs });
        dst
    }

    /// Element count to byte offset.
    fn scale(&mut self, count: VReg) -> VReg {
        let word = self.constant(WORD_SIZE);
        self.binary(BinOp::IMul, count, word)
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr) -> LResult<VReg> {
        match op {
            UnaryOp::AddrOf => {
                let ExprKind::Identifier(ident) = &operand.kind else {
                    return Err(CodeGenError::Unsupported {
                        what: format!("address of `{operand}`"),
                    });
                };
                let symbol = ident.symbol.ok_or_else(|| CodeGenError::UnboundSymbol {
                    name: ident.name.clone(),
                })?;
                let dst = self.fresh();
                let sym = self.symbols.get(symbol);
                if sym.is_global() {
                    let name = global_symbol(&sym.name);
                    self.emit(Inst::GlobalAddr { dst, symbol: name });
                } else {
                    let var = self.var_reg(symbol)?;
                    self.emit(Inst::AddrOf { dst, var });
                }
                Ok(dst)
            }
            UnaryOp::Neg => {
                let src = self.lower_expr(operand)?;
                let dst = self.fresh();
                self.emit(Inst::Neg {
                    dst,
                    src,
                    float: operand.ty == Type::Float,
                });
                Ok(dst)
            }
            UnaryOp::Not => {
                let src = self.lower_expr(operand)?;
                let dst = self.fresh();
                self.emit(Inst::Not { dst, src });
                Ok(dst)
            }
            UnaryOp::Deref => {
                let addr = self.lower_expr(operand)?;
                let dst = self.fresh();
                self.emit(Inst::Load { dst, addr });
                Ok(dst)
            }
        }
    }

    /// Lower a call; returns `None` for calls without a result.
    fn lower_call(&mut self, call: &Call, expr: &Expr) -> LResult<Option<VReg>> {
        let target = call.target.ok_or_else(|| CodeGenError::UnboundSymbol {
            name: call.callee.clone(),
        })?;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let value = self.lower_expr(arg)?;
            args.push((value, value_class(&arg.ty)));
        }

        match target {
            CallTarget::Function(id) => {
                let ret = (!expr.ty.is_void()).then(|| value_class(&expr.ty));
                let dst = ret.map(|_| self.fresh());
                self.emit(Inst::Call {
                    dst,
                    callee: function_symbol(&self.symbols.get(id).name),
                    external: false,
                    args,
                    ret,
                });
                Ok(dst)
            }
            CallTarget::Builtin(kind) => self.lower_builtin(kind, args),
        }
    }

    fn lower_builtin(
        &mut self,
        kind: BuiltinKind,
        args: Vec<(VReg, ValueClass)>,
    ) -> LResult<Option<VReg>> {
        let Some(&(arg, _)) = args.first() else {
            return Err(CodeGenError::Unsupported {
                what: format!("call to {kind:?} without arguments"),
            });
        };
        let runtime_call = |this: &mut Self, args, ret: Option<ValueClass>| -> LResult<_> {
            let callee = kind.runtime_symbol().ok_or_else(|| CodeGenError::Unsupported {
                what: format!("{kind:?} as a runtime call"),
            })?;
            let dst = ret.map(|_| this.fresh());
            this.emit(Inst::Call {
                dst,
                callee: callee.to_string(),
                external: true,
                args,
                ret,
            });
            Ok(dst)
        };

        match kind {
            BuiltinKind::IntToFloat | BuiltinKind::FloatToInt => {
                let to = value_class(&kind.result_type());
                let dst = self.fresh();
                self.emit(Inst::Convert { dst, src: arg, to });
                Ok(Some(dst))
            }
            BuiltinKind::Alloc => {
                let bytes = self.scale(arg);
                runtime_call(self, vec![(bytes, ValueClass::Int)], Some(ValueClass::Int))
            }
            BuiltinKind::PrintInt
            | BuiltinKind::PrintFloat
            | BuiltinKind::PrintBool
            | BuiltinKind::Free => runtime_call(self, args, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;
    use crate::sema::analyze;
    use crate::x86::{ArgSlot, Reg};

    fn lower_source(source: &str) -> LoweredProgram {
        let lexed = lex(source);
        let parsed = parse(&lexed.tokens);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let analyzed = analyze(parsed.program).expect("analysis succeeds");
        let mut ctx = CompilationContext::new("test.tern");
        lower_program(&analyzed, &mut ctx).expect("lowering succeeds")
    }

    fn function<'a>(lowered: &'a LoweredProgram, name: &str) -> &'a IrFunction {
        lowered
            .functions
            .iter()
            .find(|f| f.name == name)
            .expect("function present")
    }

    #[test]
    fn entry_function_returns_zero() {
        let lowered = lower_source("let x = 1 + 2\n");
        let main = function(&lowered, "main");
        assert!(main.is_entry);
        let n = main.insts.len();
        assert!(matches!(main.insts[n - 2], Inst::Const { value: 0, .. }));
        assert!(matches!(main.insts[n - 1], Inst::Return { value: Some(_) }));
        assert!(main.insts.iter().any(|inst| matches!(
            inst,
            Inst::StoreGlobal { symbol, .. } if symbol == "tern_global_x"
        )));
        assert_eq!(lowered.globals.len(), 1);
    }

    #[test]
    fn parameters_follow_the_calling_convention() {
        let lowered = lower_source("fn pick(a: int, b: float, c: bool) -> float:\n    return b\n");
        let pick = function(&lowered, "tern_fn_pick");
        assert_eq!(
            pick.insts[..3],
            [
                Inst::Param {
                    dst: VReg(0),
                    slot: ArgSlot::Int(Reg::Rdi)
                },
                Inst::Param {
                    dst: VReg(1),
                    slot: ArgSlot::Float(0)
                },
                Inst::Param {
                    dst: VReg(2),
                    slot: ArgSlot::Int(Reg::Rsi)
                },
            ]
        );
        assert_eq!(
            pick.insts[3],
            Inst::Return {
                value: Some((VReg(1), ValueClass::Float))
            }
        );
        assert_eq!(pick.variables.len(), 3);
        assert_eq!(pick.frame_size, 32);
    }

    #[test]
    fn pointer_offsets_are_scaled() {
        let lowered = lower_source("fn at(p: ptr[int], i: int) -> int:\n    return *(p + i)\n");
        let at = function(&lowered, "tern_fn_at");
        let rendered: Vec<String> = at.insts.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "v0 = param Int(Rdi)",
                "v1 = param Int(Rsi)",
                "v2 = const 8",
                "v3 = IMul v1, v2",
                "v4 = IAdd v0, v3",
                "v5 = load v4",
                "ret v5",
            ]
        );
    }

    #[test]
    fn loops_are_recorded() {
        let lowered = lower_source(
            "fn sum(n: int) -> int:\n    let total = 0\n    for i in 0..n:\n        total = total + i\n    return total\n",
        );
        let sum = function(&lowered, "tern_fn_sum");
        assert_eq!(sum.loops.len(), 1);
        let region = sum.loops[0];
        assert!(matches!(sum.insts[region.start], Inst::Label(_)));
        assert!(matches!(sum.insts[region.end - 1], Inst::Jump(_)));
        assert!(sum.insts[region.start..region.end]
            .iter()
            .any(|inst| matches!(inst, Inst::Compare { cond: Cond::Lt, .. })));
    }

    #[test]
    fn address_taken_variables_are_pinned() {
        let lowered = lower_source("fn f() -> int:\n    let x = 1\n    let p = &x\n    *p = 5\n    return x\n");
        let f = function(&lowered, "tern_fn_f");
        assert!(f.variables[0].pinned);
        assert!(!f.variables[1].pinned);
        assert!(f
            .insts
            .iter()
            .any(|inst| matches!(inst, Inst::AddrOf { var: VReg(0), .. })));
        // Reading `x` goes through a copy of its slot.
        let n = f.insts.len();
        assert!(matches!(f.insts[n - 2], Inst::Copy { src: VReg(0), .. }));
    }

    #[test]
    fn builtins_lower_to_runtime_calls() {
        let lowered = lower_source("let p = alloc(3)\nprint(to_float(2))\nfree(p)\n");
        let main = function(&lowered, "main");
        let callees: Vec<(&str, bool)> = main
            .insts
            .iter()
            .filter_map(|inst| match inst {
                Inst::Call {
                    callee, external, ..
                } => Some((callee.as_str(), *external)),
                _ => None,
            })
            .collect();
        assert_eq!(
            callees,
            vec![
                ("tern_alloc", true),
                ("tern_print_float", true),
                ("tern_free", true)
            ]
        );
        assert!(main.insts.iter().any(|inst| matches!(
            inst,
            Inst::Convert {
                to: ValueClass::Float,
                ..
            }
        )));
    }

    #[test]
    fn logical_operators_short_circuit() {
        let lowered = lower_source("fn f(a: bool, b: bool) -> bool:\n    return a and b\n");
        let f = function(&lowered, "tern_fn_f");
        assert!(f
            .insts
            .iter()
            .any(|inst| matches!(inst, Inst::JumpIfZero { .. })));
        assert!(f.insts.iter().all(|inst| !matches!(inst, Inst::Binary { .. })));
    }
}
