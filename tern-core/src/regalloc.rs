//! Register allocation for the virtual-register IR.
//!
//! Two strategies are available. `Naive` gives every virtual register its
//! own stack slot and is the reference for testing the other. `LinearScan`
//! computes one live interval per virtual register and assigns the
//! callee-saved registers greedily, spilling the interval that ends last
//! when it runs out.
//!
//! Frame layout below `%rbp`, from high to low addresses: save area of the
//! callee-saved registers in use, variable slots (one per parameter and
//! local, in frame order), slots for spilled temporaries.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::codegen::CodeGenError;
use crate::ir::{IrFunction, VReg};
use crate::types::WORD_SIZE;
use crate::x86::{ALLOCATABLE, Reg, STACK_ALIGN, align_to};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AllocStrategy {
    Naive,
    #[default]
    LinearScan,
}

impl AllocStrategy {
    pub fn name(self) -> &'static str {
        match self {
            AllocStrategy::Naive => "naive",
            AllocStrategy::LinearScan => "linear-scan",
        }
    }
}

impl fmt::Display for AllocStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a virtual register lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Reg(Reg),
    /// Offset from `%rbp`.
    Stack(i32),
}

impl Location {
    pub fn is_reg(self) -> bool {
        matches!(self, Location::Reg(_))
    }
}

/// Renders as an AT&T operand.
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Reg(reg) => f.write_str(reg.name()),
            Location::Stack(offset) => write!(f, "{offset}(%rbp)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Indexed by virtual register.
    pub locations: Vec<Location>,
    /// Callee-saved registers the function writes, in save order.
    pub used_callee_saved: Vec<Reg>,
    /// Bytes to reserve below `%rbp`; a multiple of 16.
    pub frame_bytes: u32,
}

impl Allocation {
    pub fn location(&self, vreg: VReg) -> Result<Location, CodeGenError> {
        self.locations
            .get(vreg.index())
            .copied()
            .ok_or(CodeGenError::MissingLocation { vreg })
    }

    /// Slot in which the prologue saves the `index`-th used register.
    pub fn save_slot(index: usize) -> i32 {
        -((index as i32 + 1) * WORD_SIZE as i32)
    }
}

/// Instruction range over which a virtual register may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveInterval {
    pub vreg: VReg,
    pub start: usize,
    pub end: usize,
}

/// One interval per referenced virtual register, sorted by start.
///
/// An interval spans from the first to the last instruction mentioning the
/// register. If the register is mentioned inside a loop, the interval also
/// covers the whole loop, since the value may be read again on the next
/// iteration.
pub fn live_intervals(func: &IrFunction) -> Vec<LiveInterval> {
    let mut ranges: Vec<Option<(usize, usize)>> = vec![None; func.vreg_count as usize];
    for (index, inst) in func.insts.iter().enumerate() {
        for vreg in inst.defs().into_iter().chain(inst.uses()) {
            let Some(range) = ranges.get_mut(vreg.index()) else {
                continue;
            };
            *range = Some(match *range {
                Some((start, end)) => (start.min(index), end.max(index)),
                None => (index, index),
            });
        }
    }

    // Nested loops may need several rounds.
    let mut changed = true;
    while changed {
        changed = false;
        for range in ranges.iter_mut().flatten() {
            for region in &func.loops {
                let last = region.end.saturating_sub(1);
                let overlaps = range.0 <= last && range.1 >= region.start;
                if overlaps && (range.0 > region.start || range.1 < last) {
                    range.0 = range.0.min(region.start);
                    range.1 = range.1.max(last);
                    changed = true;
                }
            }
        }
    }

    let mut intervals: Vec<LiveInterval> = ranges
        .iter()
        .enumerate()
        .filter_map(|(index, range)| {
            range.map(|(start, end)| LiveInterval {
                vreg: VReg(index as u32),
                start,
                end,
            })
        })
        .collect();
    intervals.sort_by_key(|iv| (iv.start, iv.vreg));
    intervals
}

/// Assign a location to every virtual register of `func`.
pub fn allocate(func: &IrFunction, strategy: AllocStrategy) -> Allocation {
    let registers = match strategy {
        AllocStrategy::Naive => FxHashMap::default(),
        AllocStrategy::LinearScan => linear_scan(func, &live_intervals(func)),
    };

    let used_callee_saved: Vec<Reg> = ALLOCATABLE
        .iter()
        .copied()
        .filter(|reg| registers.values().any(|r| r == reg))
        .collect();

    let word = WORD_SIZE as i32;
    let save_bytes = used_callee_saved.len() as i32 * word;
    let variables_end = save_bytes + func.frame_size as i32;
    let mut next_temp = variables_end;

    let locations = (0..func.vreg_count)
        .map(|index| {
            let vreg = VReg(index);
            if let Some(reg) = registers.get(&vreg) {
                Location::Reg(*reg)
            } else if func.is_variable(vreg) {
                Location::Stack(-(save_bytes + (index as i32 + 1) * word))
            } else {
                next_temp += word;
                Location::Stack(-next_temp)
            }
        })
        .collect();

    let frame_bytes = align_to(next_temp as u32, STACK_ALIGN);
    tracing::debug!(
        function = %func.name,
        strategy = %strategy,
        registers = used_callee_saved.len(),
        frame_bytes,
        "allocated registers"
    );
    Allocation {
        locations,
        used_callee_saved,
        frame_bytes,
    }
}

struct Active {
    vreg: VReg,
    end: usize,
    reg: Reg,
}

fn linear_scan(func: &IrFunction, intervals: &[LiveInterval]) -> FxHashMap<VReg, Reg> {
    let mut assigned = FxHashMap::default();
    let mut active: Vec<Active> = Vec::new();
    let mut free: Vec<Reg> = ALLOCATABLE.to_vec();

    for interval in intervals {
        if func.is_pinned(interval.vreg) {
            tracing::trace!(vreg = %interval.vreg, "pinned to its stack slot");
            continue;
        }

        // Expire intervals that ended before this one starts.
        active.retain(|a| {
            if a.end < interval.start {
                free.push(a.reg);
                false
            } else {
                true
            }
        });
        free.sort_by_key(|reg| std::cmp::Reverse(ALLOCATABLE.iter().position(|r| r == reg)));

        if let Some(reg) = free.pop() {
            tracing::trace!(vreg = %interval.vreg, reg = %reg, "assigned register");
            assigned.insert(interval.vreg, reg);
            active.push(Active {
                vreg: interval.vreg,
                end: interval.end,
                reg,
            });
            continue;
        }

        // Out of registers: spill whichever interval ends last.
        let furthest = active
            .iter()
            .enumerate()
            .max_by_key(|(_, a)| (a.end, a.vreg))
            .map(|(index, a)| (index, a.end));
        match furthest {
            Some((index, end)) if end > interval.end => {
                let victim = active.swap_remove(index);
                tracing::trace!(vreg = %victim.vreg, "spilled");
                assigned.remove(&victim.vreg);
                assigned.insert(interval.vreg, victim.reg);
                active.push(Active {
                    vreg: interval.vreg,
                    end: interval.end,
                    reg: victim.reg,
                });
            }
            _ => {
                tracing::trace!(vreg = %interval.vreg, "spilled");
            }
        }
    }
    assigned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Inst, Label, LoopRegion, VarInfo};
    use crate::span::Span;
    use crate::symbols::{Symbol, SymbolKind, SymbolTable};
    use crate::types::Type;

    fn function(insts: Vec<Inst>, variables: usize, pinned: &[usize]) -> IrFunction {
        let mut table = SymbolTable::new();
        let variables = (0..variables)
            .map(|index| VarInfo {
                vreg: VReg(index as u32),
                symbol: table.add(Symbol {
                    name: format!("v{index}"),
                    ty: Type::Int,
                    depth: 1,
                    kind: SymbolKind::Variable,
                    storage: None,
                    address_taken: pinned.contains(&index),
                    span: Span::default(),
                }),
                pinned: pinned.contains(&index),
            })
            .collect::<Vec<_>>();
        let vreg_count = insts
            .iter()
            .flat_map(|inst| inst.defs().into_iter().chain(inst.uses()))
            .map(|v| v.0 + 1)
            .max()
            .unwrap_or(0)
            .max(variables.len() as u32);
        IrFunction {
            name: "test".into(),
            insts,
            vreg_count,
            frame_size: align_to(variables.len() as u32 * 8, 16),
            variables,
            loops: Vec::new(),
            return_label: Label(0),
            is_entry: false,
        }
    }

    fn konst(dst: u32, value: i64) -> Inst {
        Inst::Const {
            dst: VReg(dst),
            value,
        }
    }

    fn add(dst: u32, lhs: u32, rhs: u32) -> Inst {
        Inst::Binary {
            op: BinOp::IAdd,
            dst: VReg(dst),
            lhs: VReg(lhs),
            rhs: VReg(rhs),
        }
    }

    #[test]
    fn intervals_span_first_to_last_reference() {
        let func = function(vec![konst(0, 1), konst(1, 2), add(2, 0, 1), add(3, 2, 2)], 0, &[]);
        let intervals = live_intervals(&func);
        let spans: Vec<_> = intervals.iter().map(|iv| (iv.vreg.0, iv.start, iv.end)).collect();
        assert_eq!(spans, vec![(0, 0, 2), (1, 1, 2), (2, 2, 3), (3, 3, 3)]);
    }

    #[test]
    fn intervals_used_in_a_loop_cover_the_loop() {
        let mut func = function(
            vec![
                konst(0, 0),
                Inst::Label(Label(1)),
                konst(1, 1),
                add(0, 0, 1),
                Inst::Jump(Label(1)),
                konst(2, 7),
            ],
            1,
            &[],
        );
        func.loops.push(LoopRegion { start: 1, end: 5 });
        let intervals = live_intervals(&func);
        let of = |v: u32| intervals.iter().find(|iv| iv.vreg == VReg(v)).copied();
        assert_eq!(of(0).map(|iv| (iv.start, iv.end)), Some((0, 4)));
        assert_eq!(of(1).map(|iv| (iv.start, iv.end)), Some((1, 4)));
        assert_eq!(of(2).map(|iv| (iv.start, iv.end)), Some((5, 5)));
    }

    #[test]
    fn naive_puts_everything_on_the_stack() {
        let func = function(vec![konst(0, 1), konst(1, 2), add(2, 0, 1)], 1, &[]);
        let alloc = allocate(&func, AllocStrategy::Naive);
        assert!(alloc.used_callee_saved.is_empty());
        assert_eq!(
            alloc.locations,
            vec![Location::Stack(-8), Location::Stack(-24), Location::Stack(-32)]
        );
        assert_eq!(alloc.frame_bytes, 32);
    }

    #[test]
    fn linear_scan_reuses_expired_registers() {
        let func = function(
            vec![konst(0, 1), konst(1, 2), add(2, 0, 1), add(3, 2, 2)],
            0,
            &[],
        );
        let alloc = allocate(&func, AllocStrategy::LinearScan);
        assert_eq!(alloc.locations[0], Location::Reg(Reg::Rbx));
        assert_eq!(alloc.locations[1], Location::Reg(Reg::R12));
        // v0 and v1 die at instruction 2, where v2 is born.
        assert_eq!(alloc.locations[2], Location::Reg(Reg::R13));
        assert_eq!(alloc.locations[3], Location::Reg(Reg::Rbx));
        assert_eq!(alloc.used_callee_saved, vec![Reg::Rbx, Reg::R12, Reg::R13]);
        assert_eq!(alloc.frame_bytes, 32);
    }

    #[test]
    fn spills_the_interval_ending_last() {
        // Six values live at once; v0 is used last and is spilled.
        let mut insts: Vec<Inst> = (0..6).map(|v| konst(v, v as i64)).collect();
        for v in (0..6).rev() {
            insts.push(Inst::Store {
                addr: VReg(v),
                src: VReg(v),
            });
        }
        let func = function(insts, 0, &[]);
        let alloc = allocate(&func, AllocStrategy::LinearScan);
        assert!(matches!(alloc.locations[0], Location::Stack(_)));
        for v in 1..6 {
            assert!(alloc.locations[v].is_reg(), "v{v} should be in a register");
        }
        assert_eq!(alloc.used_callee_saved.len(), 5);
    }

    #[test]
    fn pinned_variables_stay_on_the_stack() {
        let func = function(vec![konst(0, 1), konst(1, 2), add(2, 0, 1)], 2, &[0]);
        let alloc = allocate(&func, AllocStrategy::LinearScan);
        assert_eq!(alloc.used_callee_saved, vec![Reg::Rbx, Reg::R12]);
        // Save area of two registers, then the variable slots.
        assert_eq!(alloc.locations[0], Location::Stack(-24));
        assert_eq!(alloc.locations[1], Location::Reg(Reg::Rbx));
        assert_eq!(alloc.frame_bytes, 32);
        assert_eq!(Allocation::save_slot(1), -16);
    }

    #[test]
    fn locations_render_as_operands() {
        assert_eq!(Location::Stack(-16).to_string(), "-16(%rbp)");
        assert_eq!(Location::Reg(Reg::R14).to_string(), "%r14");
    }
}
