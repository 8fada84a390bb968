//! The built-in free-function and member-function registry
//! (SPEC_FULL.md §4.5, Open Question 2): a small static table consulted
//! by both the analyzer, to resolve a name and type it, and the
//! evaluator, to execute it. Grounded in the pack's `builtins/` module
//! (one implementation per built-in) and `io.rs::PrintWriter` for the
//! `println`/`print` output indirection.

pub mod io;
pub mod members;

/// Names recognized as built-in free functions during identifier
/// resolution. `import` is desugared away into a synthetic call by
/// `parser::parse_import` but still needs a resolvable callee name
/// during checking; the evaluator special-cases it rather than routing
/// through a table entry, since it needs access to the compiler's
/// source map to load and analyze the imported file.
pub const BUILTIN_FUNCTIONS: &[&str] = &["println", "print", "import"];

pub fn is_builtin_function(name: &str) -> Option<&'static str> {
    BUILTIN_FUNCTIONS.iter().find(|&&n| n == name).copied()
}

/// Source-level names for the builtin scalar/composite type keywords,
/// the inverse of [`crate::sema::resolve::resolve_type_name`]'s match
/// arms — used by template instantiation to rebuild a concrete
/// `TypeName` node from a deduced [`crate::types::TypeInfo`].
pub fn type_keyword(kind: crate::types::TypeKind) -> Option<&'static str> {
    use crate::types::TypeKind;
    Some(match kind {
        TypeKind::None => "none",
        TypeKind::Int => "int",
        TypeKind::Float => "float",
        TypeKind::Bool => "bool",
        TypeKind::Char => "char",
        TypeKind::Size => "size",
        TypeKind::String => "string",
        TypeKind::Vector => "Vector",
        TypeKind::Tuple => "Tuple",
        TypeKind::Dict => "Dict",
        TypeKind::Function => "Function",
        _ => return None,
    })
}
