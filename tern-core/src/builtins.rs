//! Built-in functions visible to Tern programs.
//!
//! Builtins are resolved by the analyzer when a call does not refer to a
//! user declaration. Most of them map onto a symbol of the runtime library
//! that is linked with the generated assembly; the conversions are lowered
//! to single instructions instead.

use crate::types::Type;

/// A builtin as it is named in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    /// `print(x)` for `int`, `float` and `bool`.
    Print,
    /// `alloc(count)`: a heap buffer of `count` words.
    Alloc,
    /// `free(p)`: release a buffer from `alloc`.
    Free,
    ToFloat,
    ToInt,
}

/// A builtin after overload resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    PrintInt,
    PrintFloat,
    PrintBool,
    Alloc,
    Free,
    IntToFloat,
    FloatToInt,
}

/// Metadata about a single builtin name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    pub name: &'static str,
    pub builtin: Builtin,
    pub arity: usize,
}

/// The complete list of builtins known to the compiler.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "print",
        builtin: Builtin::Print,
        arity: 1,
    },
    BuiltinDescriptor {
        name: "alloc",
        builtin: Builtin::Alloc,
        arity: 1,
    },
    BuiltinDescriptor {
        name: "free",
        builtin: Builtin::Free,
        arity: 1,
    },
    BuiltinDescriptor {
        name: "to_float",
        builtin: Builtin::ToFloat,
        arity: 1,
    },
    BuiltinDescriptor {
        name: "to_int",
        builtin: Builtin::ToInt,
        arity: 1,
    },
];

/// Look up a builtin by its source-level name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|b| b.name == name)
}

impl Builtin {
    pub fn overloads(self) -> &'static [BuiltinKind] {
        match self {
            Builtin::Print => &[
                BuiltinKind::PrintInt,
                BuiltinKind::PrintFloat,
                BuiltinKind::PrintBool,
            ],
            Builtin::Alloc => &[BuiltinKind::Alloc],
            Builtin::Free => &[BuiltinKind::Free],
            Builtin::ToFloat => &[BuiltinKind::IntToFloat],
            Builtin::ToInt => &[BuiltinKind::FloatToInt],
        }
    }

    /// Pick the overload accepting `arg`, if any.
    pub fn resolve(self, arg: &Type) -> Option<BuiltinKind> {
        self.overloads()
            .iter()
            .copied()
            .find(|kind| &kind.param_type() == arg)
    }
}

impl BuiltinKind {
    pub fn param_type(self) -> Type {
        match self {
            BuiltinKind::PrintInt | BuiltinKind::Alloc | BuiltinKind::IntToFloat => Type::Int,
            BuiltinKind::PrintFloat | BuiltinKind::FloatToInt => Type::Float,
            BuiltinKind::PrintBool => Type::Bool,
            BuiltinKind::Free => Type::ptr(Type::Int),
        }
    }

    pub fn result_type(self) -> Type {
        match self {
            BuiltinKind::PrintInt
            | BuiltinKind::PrintFloat
            | BuiltinKind::PrintBool
            | BuiltinKind::Free => Type::Void,
            BuiltinKind::Alloc => Type::ptr(Type::Int),
            BuiltinKind::IntToFloat => Type::Float,
            BuiltinKind::FloatToInt => Type::Int,
        }
    }

    /// Runtime library symbol implementing this builtin, if it is a call.
    pub fn runtime_symbol(self) -> Option<&'static str> {
        match self {
            BuiltinKind::PrintInt => Some("tern_print_int"),
            BuiltinKind::PrintFloat => Some("tern_print_float"),
            BuiltinKind::PrintBool => Some("tern_print_bool"),
            BuiltinKind::Alloc => Some("tern_alloc"),
            BuiltinKind::Free => Some("tern_free"),
            BuiltinKind::IntToFloat | BuiltinKind::FloatToInt => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_dispatches_on_argument_type() {
        let print = find_builtin("print").expect("print builtin");
        assert_eq!(print.arity, 1);
        assert_eq!(print.builtin.resolve(&Type::Int), Some(BuiltinKind::PrintInt));
        assert_eq!(print.builtin.resolve(&Type::Float), Some(BuiltinKind::PrintFloat));
        assert_eq!(print.builtin.resolve(&Type::Bool), Some(BuiltinKind::PrintBool));
        assert_eq!(print.builtin.resolve(&Type::ptr(Type::Int)), None);
    }

    #[test]
    fn memory_builtins_use_int_pointers() {
        let alloc = find_builtin("alloc").expect("alloc builtin");
        let kind = alloc.builtin.resolve(&Type::Int).expect("alloc(int)");
        assert_eq!(kind.result_type(), Type::ptr(Type::Int));
        assert_eq!(kind.runtime_symbol(), Some("tern_alloc"));
        let free = find_builtin("free").expect("free builtin");
        assert_eq!(free.builtin.resolve(&Type::ptr(Type::Int)), Some(BuiltinKind::Free));
    }

    #[test]
    fn conversions_are_inline() {
        assert_eq!(BuiltinKind::IntToFloat.runtime_symbol(), None);
        assert_eq!(BuiltinKind::FloatToInt.result_type(), Type::Int);
        assert!(find_builtin("sqrt").is_none());
    }
}
