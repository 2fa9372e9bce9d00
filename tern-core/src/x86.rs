//! x86-64 register file and the System V calling convention used by the
//! generated code.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Reg {
    pub fn name(self) -> &'static str {
        match self {
            Reg::Rax => "%rax",
            Reg::Rbx => "%rbx",
            Reg::Rcx => "%rcx",
            Reg::Rdx => "%rdx",
            Reg::Rsi => "%rsi",
            Reg::Rdi => "%rdi",
            Reg::R8 => "%r8",
            Reg::R9 => "%r9",
            Reg::R10 => "%r10",
            Reg::R11 => "%r11",
            Reg::R12 => "%r12",
            Reg::R13 => "%r13",
            Reg::R14 => "%r14",
            Reg::R15 => "%r15",
        }
    }

    pub fn is_callee_saved(self) -> bool {
        matches!(self, Reg::Rbx | Reg::R12 | Reg::R13 | Reg::R14 | Reg::R15)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer, boolean and pointer arguments, in order.
pub const INT_ARG_REGS: [Reg; 6] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9];

/// Number of `xmm` registers used for float arguments.
pub const FLOAT_ARG_REGS: usize = 8;

/// Registers handed out by the linear-scan allocator.
///
/// Only callee-saved registers are allocatable, so values survive calls
/// without caller-side spills; the prologue saves whichever ones a function
/// actually uses. `rax`, `rcx`, `rdx` and `xmm0`/`xmm1` stay free as scratch
/// for instruction selection, and the argument registers are only touched
/// around calls.
pub const ALLOCATABLE: [Reg; 5] = [Reg::Rbx, Reg::R12, Reg::R13, Reg::R14, Reg::R15];

/// Required alignment of `%rsp` at every call instruction.
pub const STACK_ALIGN: u32 = 16;

/// Where one argument travels under the calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSlot {
    Int(Reg),
    /// Index of the `xmm` register.
    Float(usize),
    /// Position among stack-passed arguments, 0 being closest to the
    /// return address.
    Stack(usize),
}

/// Assign argument slots for a parameter list given as "is float" flags.
pub fn classify_args(is_float: impl IntoIterator<Item = bool>) -> Vec<ArgSlot> {
    let mut next_int = 0;
    let mut next_float = 0;
    let mut next_stack = 0;
    is_float
        .into_iter()
        .map(|float| {
            if float && next_float < FLOAT_ARG_REGS {
                next_float += 1;
                ArgSlot::Float(next_float - 1)
            } else if !float && next_int < INT_ARG_REGS.len() {
                next_int += 1;
                ArgSlot::Int(INT_ARG_REGS[next_int - 1])
            } else {
                next_stack += 1;
                ArgSlot::Stack(next_stack - 1)
            }
        })
        .collect()
}

pub fn align_to(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}
