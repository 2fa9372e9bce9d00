//! Linear virtual-register IR.
//!
//! Each function is lowered to a flat list of instructions over an
//! unbounded set of 64-bit virtual registers. Float values travel as raw
//! bit patterns; the instruction decides how the bits are interpreted.
//! Variables own one virtual register for their whole lifetime, so the IR
//! is not in SSA form.

use std::fmt;

use crate::symbols::SymbolId;
use crate::x86::ArgSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl VReg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A jump target. Rendered as `.L<n>` in assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".L{}", self.0)
    }
}

/// Register class a value is passed and returned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueClass {
    Int,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    IAdd,
    ISub,
    IMul,
    IDiv,
    IRem,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Copy an incoming argument into `dst`.
    Param {
        dst: VReg,
        slot: ArgSlot,
    },
    /// Load a 64-bit constant. Floats are given by their bit pattern.
    Const {
        dst: VReg,
        value: i64,
    },
    Copy {
        dst: VReg,
        src: VReg,
    },
    Binary {
        op: BinOp,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    /// `dst = lhs <cond> rhs` as 0 or 1.
    Compare {
        cond: Cond,
        float: bool,
        dst: VReg,
        lhs: VReg,
        rhs: VReg,
    },
    Neg {
        dst: VReg,
        src: VReg,
        float: bool,
    },
    /// Boolean negation of a 0/1 value.
    Not {
        dst: VReg,
        src: VReg,
    },
    /// Numeric conversion into class `to`.
    Convert {
        dst: VReg,
        src: VReg,
        to: ValueClass,
    },
    /// `dst = *addr`
    Load {
        dst: VReg,
        addr: VReg,
    },
    /// `*addr = src`
    Store {
        addr: VReg,
        src: VReg,
    },
    /// Address of the stack slot of variable register `var`.
    AddrOf {
        dst: VReg,
        var: VReg,
    },
    GlobalAddr {
        dst: VReg,
        symbol: String,
    },
    LoadGlobal {
        dst: VReg,
        symbol: String,
    },
    StoreGlobal {
        symbol: String,
        src: VReg,
    },
    Call {
        dst: Option<VReg>,
        callee: String,
        /// Calls into the runtime library go through the PLT.
        external: bool,
        args: Vec<(VReg, ValueClass)>,
        ret: Option<ValueClass>,
    },
    Label(Label),
    Jump(Label),
    JumpIfZero {
        cond: VReg,
        target: Label,
    },
    JumpIfNonZero {
        cond: VReg,
        target: Label,
    },
    /// Leave the function, optionally with a result.
    Return {
        value: Option<(VReg, ValueClass)>,
    },
}

impl Inst {
    /// Virtual registers written by this instruction.
    pub fn defs(&self) -> Vec<VReg> {
        match self {
            Inst::Param { dst, .. }
            | Inst::Const { dst, .. }
            | Inst::Copy { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::Compare { dst, .. }
            | Inst::Neg { dst, .. }
            | Inst::Not { dst, .. }
            | Inst::Convert { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::AddrOf { dst, .. }
            | Inst::GlobalAddr { dst, .. }
            | Inst::LoadGlobal { dst, .. } => vec![*dst],
            Inst::Call { dst, .. } => dst.iter().copied().collect(),
            Inst::Store { .. }
            | Inst::StoreGlobal { .. }
            | Inst::Label(_)
            | Inst::Jump(_)
            | Inst::JumpIfZero { .. }
            | Inst::JumpIfNonZero { .. }
            | Inst::Return { .. } => Vec::new(),
        }
    }

    /// Virtual registers read by this instruction.
    pub fn uses(&self) -> Vec<VReg> {
        match self {
            Inst::Copy { src, .. }
            | Inst::Neg { src, .. }
            | Inst::Not { src, .. }
            | Inst::Convert { src, .. }
            | Inst::StoreGlobal { src, .. } => vec![*src],
            Inst::Binary { lhs, rhs, .. } | Inst::Compare { lhs, rhs, .. } => vec![*lhs, *rhs],
            Inst::Load { addr, .. } => vec![*addr],
            Inst::Store { addr, src } => vec![*addr, *src],
            Inst::AddrOf { var, .. } => vec![*var],
            Inst::Call { args, .. } => args.iter().map(|(v, _)| *v).collect(),
            Inst::JumpIfZero { cond, .. } | Inst::JumpIfNonZero { cond, .. } => vec![*cond],
            Inst::Return { value } => value.iter().map(|(v, _)| *v).collect(),
            Inst::Param { .. }
            | Inst::Const { .. }
            | Inst::GlobalAddr { .. }
            | Inst::LoadGlobal { .. }
            | Inst::Label(_)
            | Inst::Jump(_) => Vec::new(),
        }
    }
}

/// A source variable and the register that holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarInfo {
    pub vreg: VReg,
    pub symbol: SymbolId,
    /// Address-taken variables must stay in their stack slot.
    pub pinned: bool,
}

/// Half-open range `[start, end)` of instruction indices forming a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    /// Assembly symbol of the function.
    pub name: String,
    pub insts: Vec<Inst>,
    pub vreg_count: u32,
    /// One entry per parameter and local, in frame order. `variables[i]`
    /// always owns `VReg(i)`.
    pub variables: Vec<VarInfo>,
    pub loops: Vec<LoopRegion>,
    /// Bytes of variable slots reserved by the analyzer.
    pub frame_size: u32,
    pub return_label: Label,
    pub is_entry: bool,
}

impl IrFunction {
    pub fn is_variable(&self, vreg: VReg) -> bool {
        vreg.index() < self.variables.len()
    }

    pub fn is_pinned(&self, vreg: VReg) -> bool {
        self.variables.get(vreg.index()).is_some_and(|v| v.pinned)
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Param { dst, slot } => write!(f, "{dst} = param {slot:?}"),
            Inst::Const { dst, value } => write!(f, "{dst} = const {value}"),
            Inst::Copy { dst, src } => write!(f, "{dst} = {src}"),
            Inst::Binary { op, dst, lhs, rhs } => write!(f, "{dst} = {op:?} {lhs}, {rhs}"),
            Inst::Compare {
                cond,
                float,
                dst,
                lhs,
                rhs,
            } => {
                let kind = if *float { "fcmp" } else { "cmp" };
                write!(f, "{dst} = {kind}.{cond:?} {lhs}, {rhs}")
            }
            Inst::Neg { dst, src, float } => {
                write!(f, "{dst} = {} {src}", if *float { "fneg" } else { "neg" })
            }
            Inst::Not { dst, src } => write!(f, "{dst} = not {src}"),
            Inst::Convert { dst, src, to } => write!(f, "{dst} = convert.{to:?} {src}"),
            Inst::Load { dst, addr } => write!(f, "{dst} = load {addr}"),
            Inst::Store { addr, src } => write!(f, "store {addr}, {src}"),
            Inst::AddrOf { dst, var } => write!(f, "{dst} = addr {var}"),
            Inst::GlobalAddr { dst, symbol } => write!(f, "{dst} = addr {symbol}"),
            Inst::LoadGlobal { dst, symbol } => write!(f, "{dst} = load {symbol}"),
            Inst::StoreGlobal { symbol, src } => write!(f, "store {symbol}, {src}"),
            Inst::Call {
                dst, callee, args, ..
            } => {
                if let Some(dst) = dst {
                    write!(f, "{dst} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, (arg, _)) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Inst::Label(label) => write!(f, "{label}:"),
            Inst::Jump(label) => write!(f, "jmp {label}"),
            Inst::JumpIfZero { cond, target } => write!(f, "jz {cond}, {target}"),
            Inst::JumpIfNonZero { cond, target } => write!(f, "jnz {cond}, {target}"),
            Inst::Return { value: Some((v, _)) } => write!(f, "ret {v}"),
            Inst::Return { value: None } => f.write_str("ret"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defs_and_uses() {
        let call = Inst::Call {
            dst: Some(VReg(3)),
            callee: "tern_fn_f".into(),
            external: false,
            args: vec![(VReg(1), ValueClass::Int), (VReg(2), ValueClass::Float)],
            ret: Some(ValueClass::Int),
        };
        assert_eq!(call.defs(), vec![VReg(3)]);
        assert_eq!(call.uses(), vec![VReg(1), VReg(2)]);

        let store = Inst::Store {
            addr: VReg(0),
            src: VReg(1),
        };
        assert!(store.defs().is_empty());
        assert_eq!(store.uses(), vec![VReg(0), VReg(1)]);
        assert!(Inst::Label(Label(4)).uses().is_empty());
    }

    #[test]
    fn renders_instructions() {
        let inst = Inst::Binary {
            op: BinOp::IAdd,
            dst: VReg(2),
            lhs: VReg(0),
            rhs: VReg(1),
        };
        assert_eq!(inst.to_string(), "v2 = IAdd v0, v1");
        assert_eq!(Inst::Jump(Label(7)).to_string(), "jmp .L7");
    }
}
