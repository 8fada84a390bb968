//! `TypeInfo` — the analyzer's representation of a fire type.
//!
//! Grounded in `original_source/include/TypeInfo.h`, extended with the
//! `Instance`/`Enumerator`/`Unknown`/`TypeName`/`Module` kinds spec.md's
//! data model calls for (template deduction needs `Unknown` as a wildcard
//! that unifies with anything).

use crate::ast::AstId;
use crate::intern::StringId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    None,
    Int,
    Float,
    Bool,
    Char,
    Size,
    String,
    Vector,
    Tuple,
    Dict,
    Enumerator,
    Instance,
    Module,
    Function,
    TypeName,
    /// Stands in for a not-yet-deduced template parameter; equal to any
    /// other `TypeInfo` during unification (spec.md §3, TypeInfo equality).
    Unknown,
}

/// A type, possibly parameterized (`Vec<Int>`, `Dict<String, Int>`).
///
/// Equality is structural: kinds match, names match when the kind carries
/// one, and parameter lists are pointwise equal — except that `Unknown`
/// compares equal to anything, which is what makes template-parameter
/// unification a plain `TypeInfo::eq` call during deduction.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub kind: TypeKind,
    pub params: Vec<TypeInfo>,
    /// Name of the user type for `Instance`/`Enumerator`/`Unknown` (the
    /// template-parameter name while undeduced).
    pub name: Option<StringId>,
    /// Declaring AST node for user-defined (`Instance`/`Enumerator`) types.
    pub decl: Option<AstId>,
    pub is_const: bool,
    pub is_free_args: bool,
}

impl TypeInfo {
    pub fn simple(kind: TypeKind) -> Self {
        Self {
            kind,
            params: Vec::new(),
            name: None,
            decl: None,
            is_const: false,
            is_free_args: false,
        }
    }

    pub fn none() -> Self {
        Self::simple(TypeKind::None)
    }

    pub fn unknown(name: StringId) -> Self {
        Self {
            name: Some(name),
            ..Self::simple(TypeKind::Unknown)
        }
    }

    pub fn instance(name: impl Into<Option<StringId>>, decl: AstId) -> Self {
        Self {
            name: name.into(),
            decl: Some(decl),
            ..Self::simple(TypeKind::Instance)
        }
    }

    pub fn enumerator(name: impl Into<Option<StringId>>, decl: AstId) -> Self {
        Self {
            name: name.into(),
            decl: Some(decl),
            ..Self::simple(TypeKind::Enumerator)
        }
    }

    pub fn generic(kind: TypeKind, params: Vec<TypeInfo>) -> Self {
        Self {
            params,
            ..Self::simple(kind)
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, TypeKind::Int | TypeKind::Float | TypeKind::Size)
    }

    /// Structural equality used both for ordinary type-checking and for
    /// template unification, where an `Unknown` on either side always
    /// matches (spec.md §3).
    pub fn unifies_with(&self, other: &TypeInfo) -> bool {
        if self.kind == TypeKind::Unknown || other.kind == TypeKind::Unknown {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        if matches!(self.kind, TypeKind::Instance | TypeKind::Enumerator) && self.decl != other.decl {
            return false;
        }
        if self.params.len() != other.params.len() {
            return false;
        }
        self.params.iter().zip(&other.params).all(|(a, b)| a.unifies_with(b))
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.unifies_with(other)
    }
}
impl Eq for TypeInfo {}
