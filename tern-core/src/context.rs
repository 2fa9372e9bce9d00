//! Per-compilation state shared by the passes of one unit.
//!
//! Each unit owns its context, so several units can be compiled on
//! different threads without sharing anything mutable.

use crate::diagnostic::Diagnostic;
use crate::ir::Label;

#[derive(Debug, Clone, Default)]
pub struct CompilationContext {
    file: String,
    next_label: u32,
    diagnostics: Vec<Diagnostic>,
}

impl CompilationContext {
    pub fn new(file: impl Into<String>) -> Self {
        CompilationContext {
            file: file.into(),
            next_label: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    /// A label never handed out before in this compilation.
    pub fn fresh_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Record a diagnostic, attributing it to this unit's file.
    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic.with_file(self.file.clone()));
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::Span;

    #[test]
    fn labels_increase_monotonically() {
        let mut ctx = CompilationContext::new("a.tern");
        let first = ctx.fresh_label();
        let second = ctx.fresh_label();
        assert!(second > first);
        assert_eq!(second.to_string(), ".L1");
    }

    #[test]
    fn reported_diagnostics_carry_the_file() {
        let mut ctx = CompilationContext::new("unit.tern");
        assert!(!ctx.has_errors());
        ctx.report(Diagnostic::warning("unused", Span::new(0, 1, 2, 3)));
        assert!(!ctx.has_errors());
        ctx.report(Diagnostic::error("bad", Span::new(0, 1, 4, 1)));
        assert!(ctx.has_errors());
        let taken = ctx.take_diagnostics();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[1].file, "unit.tern");
        assert!(ctx.diagnostics().is_empty());
    }
}
