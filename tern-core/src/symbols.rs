//! Symbols, scopes and function signatures.
//!
//! Symbols live in an arena (`SymbolTable`) for the whole compilation and
//! are referred to by `SymbolId`. Scopes only exist while the analyzer
//! walks the tree: they form a stack, and each scope points at its parent
//! by index.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::span::Span;
use crate::types::Type;
use crate::x86::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolKind::Variable => f.write_str("variable"),
            SymbolKind::Parameter => f.write_str("parameter"),
            SymbolKind::Function => f.write_str("function"),
        }
    }
}

/// Where a variable lives at run time. Assigned by the code generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// Offset from `%rbp`.
    Stack(i32),
    Register(Reg),
    /// Label of a quad in the data section.
    Global(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// Variable type, or the return type for functions.
    pub ty: Type,
    /// 0 for module scope.
    pub depth: u32,
    pub kind: SymbolKind,
    pub storage: Option<Storage>,
    /// Set when `&name` appears; such variables must stay in memory.
    pub address_taken: bool,
    pub span: Span,
}

impl Symbol {
    pub fn is_global(&self) -> bool {
        self.kind == SymbolKind::Variable && self.depth == 0
    }
}

/// Signature and frame information of one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Bytes reserved for parameters and local variables, 16-byte aligned.
    pub frame_size: u32,
    /// Parameter symbols first, then locals in declaration order.
    pub locals: Vec<SymbolId>,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, params: Vec<Type>, return_type: Type) -> Self {
        FunctionSignature {
            name: name.into(),
            params,
            return_type,
            frame_size: 0,
            locals: Vec::new(),
        }
    }
}

/// Error returned when a symbol is given a second storage location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAlreadyAssigned {
    pub name: String,
    pub existing: Storage,
}

/// Arena holding every symbol of one compilation.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    signatures: FxHashMap<SymbolId, FunctionSignature>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn add(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn set_signature(&mut self, id: SymbolId, signature: FunctionSignature) {
        self.signatures.insert(id, signature);
    }

    pub fn signature(&self, id: SymbolId) -> Option<&FunctionSignature> {
        self.signatures.get(&id)
    }

    pub fn signature_mut(&mut self, id: SymbolId) -> Option<&mut FunctionSignature> {
        self.signatures.get_mut(&id)
    }

    /// Record the storage location of a symbol. Each symbol gets exactly one.
    pub fn assign_storage(
        &mut self,
        id: SymbolId,
        storage: Storage,
    ) -> Result<(), StorageAlreadyAssigned> {
        let symbol = self.get_mut(id);
        if let Some(existing) = &symbol.storage {
            return Err(StorageAlreadyAssigned {
                name: symbol.name.clone(),
                existing: existing.clone(),
            });
        }
        symbol.storage = Some(storage);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Scope {
    names: FxHashMap<String, SymbolId>,
    parent: Option<usize>,
    depth: u32,
}

/// Stack of lexical scopes used during analysis.
#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack::default()
    }

    pub fn push(&mut self) {
        let parent = self.scopes.len().checked_sub(1);
        let depth = self.scopes.len() as u32;
        self.scopes.push(Scope {
            names: FxHashMap::default(),
            parent,
            depth,
        });
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Depth of the innermost scope; the module scope is 0.
    pub fn depth(&self) -> u32 {
        self.scopes.last().map_or(0, |s| s.depth)
    }

    /// Bind `name` in the innermost scope.
    ///
    /// Fails with the existing binding when the innermost scope already
    /// declares the name. Shadowing a binding of an outer scope is fine.
    pub fn declare(&mut self, name: &str, id: SymbolId) -> Result<(), SymbolId> {
        let Some(scope) = self.scopes.last_mut() else {
            return Ok(());
        };
        if let Some(existing) = scope.names.get(name) {
            return Err(*existing);
        }
        scope.names.insert(name.to_string(), id);
        Ok(())
    }

    /// Resolve `name` from the innermost scope outwards.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let mut current = self.scopes.len().checked_sub(1);
        while let Some(index) = current {
            let scope = &self.scopes[index];
            if let Some(id) = scope.names.get(name) {
                return Some(*id);
            }
            current = scope.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(table: &mut SymbolTable, name: &str, depth: u32) -> SymbolId {
        table.add(Symbol {
            name: name.into(),
            ty: Type::Int,
            depth,
            kind: SymbolKind::Variable,
            storage: None,
            address_taken: false,
            span: Span::default(),
        })
    }

    #[test]
    fn inner_scopes_shadow_outer_bindings() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeStack::new();
        scopes.push();
        let outer = variable(&mut table, "x", 0);
        scopes.declare("x", outer).expect("declare outer");

        scopes.push();
        assert_eq!(scopes.depth(), 1);
        let inner = variable(&mut table, "x", 1);
        scopes.declare("x", inner).expect("shadowing is legal");
        assert_eq!(scopes.lookup("x"), Some(inner));

        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(outer));
        assert_eq!(scopes.lookup("y"), None);
    }

    #[test]
    fn redeclaring_in_the_same_scope_fails() {
        let mut table = SymbolTable::new();
        let mut scopes = ScopeStack::new();
        scopes.push();
        let first = variable(&mut table, "x", 0);
        let second = variable(&mut table, "x", 0);
        scopes.declare("x", first).expect("first declaration");
        assert_eq!(scopes.declare("x", second), Err(first));
    }

    #[test]
    fn storage_is_assigned_exactly_once() {
        let mut table = SymbolTable::new();
        let id = variable(&mut table, "x", 1);
        table
            .assign_storage(id, Storage::Stack(-8))
            .expect("first assignment");
        let err = table
            .assign_storage(id, Storage::Register(Reg::Rbx))
            .unwrap_err();
        assert_eq!(err.existing, Storage::Stack(-8));
        assert_eq!(table.get(id).storage, Some(Storage::Stack(-8)));
    }

    #[test]
    fn module_level_variables_are_globals() {
        let mut table = SymbolTable::new();
        let global = variable(&mut table, "g", 0);
        let local = variable(&mut table, "l", 2);
        assert!(table.get(global).is_global());
        assert!(!table.get(local).is_global());
    }
}
