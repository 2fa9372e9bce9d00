//! x86-64 assembly emission (AT&T syntax, System V ABI).
//!
//! Code generation runs in three steps per function: lowering to the IR,
//! register allocation, and instruction selection over the allocated IR.
//! Operands are moved through `%rax`/`%rcx`/`%rdx` for integer work and
//! `%xmm0`/`%xmm1` for float work, so the allocator never has to leave
//! scratch registers free.

use thiserror::Error;

use crate::context::CompilationContext;
use crate::ir::{BinOp, Cond, Inst, IrFunction, ValueClass, VReg};
use crate::lower::{LoweredProgram, lower_program};
use crate::regalloc::{AllocStrategy, Allocation, Location, allocate};
use crate::sema::AnalyzedProgram;
use crate::span::Span;
use crate::symbols::{Storage, StorageAlreadyAssigned};
use crate::types::WORD_SIZE;
use crate::x86::{ArgSlot, classify_args};

/// Failures of code generation. These indicate an invariant breach in
/// earlier passes or a construct the backend cannot express, and abort the
/// compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeGenError {
    #[error("expression at {span} has no resolved type")]
    UnresolvedType { span: Span },
    #[error("`{name}` is not bound to a symbol")]
    UnboundSymbol { name: String },
    #[error("expression at {span} has no value")]
    VoidValue { span: Span },
    #[error("no location was allocated for {vreg}")]
    MissingLocation { vreg: VReg },
    #[error("`{name}` already has storage {existing:?}")]
    StorageAssigned { name: String, existing: Storage },
    #[error("{vreg} does not live in memory and has no address")]
    NotAddressable { vreg: VReg },
    #[error("unsupported construct: {what}")]
    Unsupported { what: String },
}

impl From<StorageAlreadyAssigned> for CodeGenError {
    fn from(err: StorageAlreadyAssigned) -> Self {
        CodeGenError::StorageAssigned {
            name: err.name,
            existing: err.existing,
        }
    }
}

type GResult<T> = Result<T, CodeGenError>;

/// Generate the assembly text for an analyzed program.
///
/// Assigns storage to every variable symbol as a side effect.
pub fn generate(
    analyzed: &mut AnalyzedProgram,
    ctx: &mut CompilationContext,
    strategy: AllocStrategy,
) -> GResult<String> {
    let LoweredProgram { functions, globals } = lower_program(analyzed, ctx)?;

    let mut out = String::new();
    out.push_str(&format!("    .file \"{}\"\n", ctx.file()));
    out.push_str("    .text\n");

    for func in &functions {
        let allocation = allocate(func, strategy);
        for var in &func.variables {
            let storage = match allocation.location(var.vreg)? {
                Location::Reg(reg) => Storage::Register(reg),
                Location::Stack(offset) => Storage::Stack(offset),
            };
            analyzed.symbols.assign_storage(var.symbol, storage)?;
        }
        FunctionEmitter {
            func,
            allocation: &allocation,
            out: &mut out,
        }
        .emit()?;
    }

    if !globals.is_empty() {
        out.push_str("\n    .data\n    .p2align 3\n");
        for (id, symbol) in globals {
            out.push_str(&format!("{symbol}:\n    .quad 0\n"));
            analyzed.symbols.assign_storage(id, Storage::Global(symbol))?;
        }
    }
    out.push_str("\n    .section .note.GNU-stack,\"\",@progbits\n");

    tracing::debug!(
        functions = functions.len(),
        bytes = out.len(),
        strategy = %strategy,
        "generated assembly"
    );
    Ok(out)
}

struct FunctionEmitter<'a> {
    func: &'a IrFunction,
    allocation: &'a Allocation,
    out: &'a mut String,
}

impl FunctionEmitter<'_> {
    fn ins(&mut self, text: impl AsRef<str>) {
        self.out.push_str("    ");
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn label(&mut self, name: impl std::fmt::Display) {
        self.out.push_str(&format!("{name}:\n"));
    }

    fn loc(&self, vreg: VReg) -> GResult<Location> {
        self.allocation.location(vreg)
    }

    /// `movq` from a location into a scratch register.
    fn load(&mut self, vreg: VReg, reg: &str) -> GResult<()> {
        let src = self.loc(vreg)?;
        self.ins(format!("movq {src}, {reg}"));
        Ok(())
    }

    /// `movq` from a scratch register into a location.
    fn store(&mut self, reg: &str, vreg: VReg) -> GResult<()> {
        let dst = self.loc(vreg)?;
        self.ins(format!("movq {reg}, {dst}"));
        Ok(())
    }

    fn mov(&mut self, src: Location, dst: Location) {
        if src == dst {
            return;
        }
        if src.is_reg() || dst.is_reg() {
            self.ins(format!("movq {src}, {dst}"));
        } else {
            self.ins(format!("movq {src}, %rax"));
            self.ins(format!("movq %rax, {dst}"));
        }
    }

    fn emit(mut self) -> GResult<()> {
        let name = self.func.name.clone();
        self.out.push('\n');
        if self.func.is_entry {
            self.ins(format!(".globl {name}"));
        }
        self.ins(format!(".type {name}, @function"));
        self.label(&name);

        self.ins("pushq %rbp");
        self.ins("movq %rsp, %rbp");
        if self.allocation.frame_bytes > 0 {
            let bytes = self.allocation.frame_bytes;
            self.ins(format!("subq ${bytes}, %rsp"));
        }
        let saved = self.allocation.used_callee_saved.clone();
        for (index, reg) in saved.iter().enumerate() {
            let slot = Allocation::save_slot(index);
            self.ins(format!("movq {reg}, {slot}(%rbp)"));
        }

        let func = self.func;
        for inst in &func.insts {
            self.emit_inst(inst)?;
        }

        self.label(func.return_label);
        for (index, reg) in saved.iter().enumerate() {
            let slot = Allocation::save_slot(index);
            self.ins(format!("movq {slot}(%rbp), {reg}"));
        }
        self.ins("movq %rbp, %rsp");
        self.ins("popq %rbp");
        self.ins("ret");
        self.ins(format!(".size {name}, .-{name}"));
        Ok(())
    }

    fn emit_inst(&mut self, inst: &Inst) -> GResult<()> {
        match inst {
            Inst::Param { dst, slot } => {
                let dst = self.loc(*dst)?;
                match *slot {
                    ArgSlot::Int(reg) => self.ins(format!("movq {reg}, {dst}")),
                    ArgSlot::Float(index) => self.ins(format!("movq %xmm{index}, {dst}")),
                    ArgSlot::Stack(index) => {
                        // Above the saved %rbp and the return address.
                        let offset = 2 * WORD_SIZE as i32 + index as i32 * WORD_SIZE as i32;
                        self.mov(Location::Stack(offset), dst);
                    }
                }
            }
            Inst::Const { dst, value } => {
                let dst = self.loc(*dst)?;
                if i32::try_from(*value).is_ok() {
                    self.ins(format!("movq ${value}, {dst}"));
                } else if dst.is_reg() {
                    self.ins(format!("movabsq ${value}, {dst}"));
                } else {
                    self.ins(format!("movabsq ${value}, %rax"));
                    self.ins(format!("movq %rax, {dst}"));
                }
            }
            Inst::Copy { dst, src } => {
                let (src, dst) = (self.loc(*src)?, self.loc(*dst)?);
                self.mov(src, dst);
            }
            Inst::Binary { op, dst, lhs, rhs } => self.emit_binary(*op, *dst, *lhs, *rhs)?,
            Inst::Compare {
                cond,
                float,
                dst,
                lhs,
                rhs,
            } => {
                if *float {
                    self.emit_float_compare(*cond, *lhs, *rhs)?;
                } else {
                    self.load(*lhs, "%rax")?;
                    let rhs = self.loc(*rhs)?;
                    self.ins(format!("cmpq {rhs}, %rax"));
                    let cc = match cond {
                        Cond::Eq => "e",
                        Cond::Ne => "ne",
                        Cond::Lt => "l",
                        Cond::Le => "le",
                        Cond::Gt => "g",
                        Cond::Ge => "ge",
                    };
                    self.ins(format!("set{cc} %al"));
                }
                self.ins("movzbq %al, %rax");
                self.store("%rax", *dst)?;
            }
            Inst::Neg { dst, src, float } => {
                self.load(*src, "%rax")?;
                if *float {
                    self.ins("btcq $63, %rax");
                } else {
                    self.ins("negq %rax");
                }
                self.store("%rax", *dst)?;
            }
            Inst::Not { dst, src } => {
                self.load(*src, "%rax")?;
                self.ins("xorq $1, %rax");
                self.store("%rax", *dst)?;
            }
            Inst::Convert { dst, src, to } => match to {
                ValueClass::Float => {
                    self.load(*src, "%rax")?;
                    self.ins("cvtsi2sdq %rax, %xmm0");
                    self.store("%xmm0", *dst)?;
                }
                ValueClass::Int => {
                    self.load(*src, "%xmm0")?;
                    self.ins("cvttsd2siq %xmm0, %rax");
                    self.store("%rax", *dst)?;
                }
            },
            Inst::Load { dst, addr } => {
                self.load(*addr, "%rax")?;
                self.ins("movq (%rax), %rax");
                self.store("%rax", *dst)?;
            }
            Inst::Store { addr, src } => {
                self.load(*addr, "%rax")?;
                self.load(*src, "%rcx")?;
                self.ins("movq %rcx, (%rax)");
            }
            Inst::AddrOf { dst, var } => {
                let Location::Stack(offset) = self.loc(*var)? else {
                    return Err(CodeGenError::NotAddressable { vreg: *var });
                };
                self.ins(format!("leaq {offset}(%rbp), %rax"));
                self.store("%rax", *dst)?;
            }
            Inst::GlobalAddr { dst, symbol } => {
                self.ins(format!("leaq {symbol}(%rip), %rax"));
                self.store("%rax", *dst)?;
            }
            Inst::LoadGlobal { dst, symbol } => {
                self.ins(format!("movq {symbol}(%rip), %rax"));
                self.store("%rax", *dst)?;
            }
            Inst::StoreGlobal { symbol, src } => {
                self.load(*src, "%rax")?;
                self.ins(format!("movq %rax, {symbol}(%rip)"));
            }
            Inst::Call {
                dst,
                callee,
                external,
                args,
                ret,
            } => self.emit_call(*dst, callee, *external, args, *ret)?,
            Inst::Label(label) => self.label(label),
            Inst::Jump(label) => self.ins(format!("jmp {label}")),
            Inst::JumpIfZero { cond, target } => {
                let cond = self.loc(*cond)?;
                self.ins(format!("cmpq $0, {cond}"));
                self.ins(format!("je {target}"));
            }
            Inst::JumpIfNonZero { cond, target } => {
                let cond = self.loc(*cond)?;
                self.ins(format!("cmpq $0, {cond}"));
                self.ins(format!("jne {target}"));
            }
            Inst::Return { value } => {
                match value {
                    Some((vreg, ValueClass::Int)) => self.load(*vreg, "%rax")?,
                    Some((vreg, ValueClass::Float)) => self.load(*vreg, "%xmm0")?,
                    None => {}
                }
                let label = self.func.return_label;
                self.ins(format!("jmp {label}"));
            }
        }
        Ok(())
    }

    fn emit_binary(&mut self, op: BinOp, dst: VReg, lhs: VReg, rhs: VReg) -> GResult<()> {
        match op {
            BinOp::IAdd | BinOp::ISub | BinOp::IMul => {
                let mnemonic = match op {
                    BinOp::IAdd => "addq",
                    BinOp::ISub => "subq",
                    _ => "imulq",
                };
                self.load(lhs, "%rax")?;
                let rhs = self.loc(rhs)?;
                self.ins(format!("{mnemonic} {rhs}, %rax"));
                self.store("%rax", dst)
            }
            BinOp::IDiv | BinOp::IRem => {
                self.load(lhs, "%rax")?;
                self.load(rhs, "%rcx")?;
                self.ins("cqto");
                self.ins("idivq %rcx");
                let result = if op == BinOp::IDiv { "%rax" } else { "%rdx" };
                self.store(result, dst)
            }
            BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => {
                let mnemonic = match op {
                    BinOp::FAdd => "addsd",
                    BinOp::FSub => "subsd",
                    BinOp::FMul => "mulsd",
                    _ => "divsd",
                };
                self.load(lhs, "%xmm0")?;
                self.load(rhs, "%xmm1")?;
                self.ins(format!("{mnemonic} %xmm1, %xmm0"));
                self.store("%xmm0", dst)
            }
        }
    }

    /// Leaves the 0/1 result in `%al`. Comparisons involving NaN are false,
    /// except `!=` which is true.
    fn emit_float_compare(&mut self, cond: Cond, lhs: VReg, rhs: VReg) -> GResult<()> {
        self.load(lhs, "%xmm0")?;
        self.load(rhs, "%xmm1")?;
        match cond {
            Cond::Gt | Cond::Ge => {
                self.ins("ucomisd %xmm1, %xmm0");
                self.ins(if cond == Cond::Gt { "seta %al" } else { "setae %al" });
            }
            Cond::Lt | Cond::Le => {
                self.ins("ucomisd %xmm0, %xmm1");
                self.ins(if cond == Cond::Lt { "seta %al" } else { "setae %al" });
            }
            Cond::Eq => {
                self.ins("ucomisd %xmm1, %xmm0");
                self.ins("sete %al");
                self.ins("setnp %cl");
                self.ins("andb %cl, %al");
            }
            Cond::Ne => {
                self.ins("ucomisd %xmm1, %xmm0");
                self.ins("setne %al");
                self.ins("setp %cl");
                self.ins("orb %cl, %al");
            }
        }
        Ok(())
    }

    fn emit_call(
        &mut self,
        dst: Option<VReg>,
        callee: &str,
        external: bool,
        args: &[(VReg, ValueClass)],
        ret: Option<ValueClass>,
    ) -> GResult<()> {
        let slots = classify_args(args.iter().map(|(_, class)| *class == ValueClass::Float));
        let stack_args: Vec<VReg> = args
            .iter()
            .zip(&slots)
            .filter(|(_, slot)| matches!(slot, ArgSlot::Stack(_)))
            .map(|((vreg, _), _)| *vreg)
            .collect();

        // Keep %rsp 16-byte aligned at the call.
        let padding = if stack_args.len() % 2 == 1 { 8 } else { 0 };
        if padding > 0 {
            self.ins(format!("subq ${padding}, %rsp"));
        }
        for vreg in stack_args.iter().rev() {
            let loc = self.loc(*vreg)?;
            self.ins(format!("pushq {loc}"));
        }
        for ((vreg, _), slot) in args.iter().zip(&slots) {
            match slot {
                ArgSlot::Int(reg) => {
                    let reg = reg.name();
                    self.load(*vreg, reg)?;
                }
                ArgSlot::Float(index) => self.load(*vreg, &format!("%xmm{index}"))?,
                ArgSlot::Stack(_) => {}
            }
        }

        if external {
            self.ins(format!("call {callee}@PLT"));
        } else {
            self.ins(format!("call {callee}"));
        }
        let cleanup = stack_args.len() * WORD_SIZE as usize + padding;
        if cleanup > 0 {
            self.ins(format!("addq ${cleanup}, %rsp"));
        }

        match (dst, ret) {
            (Some(dst), Some(ValueClass::Int)) => self.store("%rax", dst),
            (Some(dst), Some(ValueClass::Float)) => self.store("%xmm0", dst),
            _ => Ok(()),
        }
    }
}
