//! Runtime values produced by evaluation.
//!
//! Grounded in `original_source/include/Object.h`/`Evaluator/Object.h`:
//! a discriminated union over primitives, strings (as UTF-16 code-unit
//! vectors, matching the language's `Char` being a UTF-16 code unit),
//! vectors, dicts, tuples, instances, enumerators and callables. Value
//! semantics hold for composite operators (`+`, `-`, `*`); aliasing is
//! explicit via `Rc<RefCell<_>>` only where the language actually allows
//! mutation through a shared reference (instance fields).

use crate::ast::AstId;
use crate::types::TypeInfo;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// The literal payload carried by a `Value` AST node — parsed at lex/parse
/// time and turned into a full `Object` only at evaluation.
#[derive(Debug, Clone)]
pub enum Literal {
    None,
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Size(u64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Int(i64),
    Float(f64),
    Size(u64),
    Bool(bool),
    Char(u16),
}

/// A callable value: either a user-defined function/lambda AST, or a
/// built-in identified by name, optionally bound to a `self` instance.
#[derive(Debug, Clone)]
pub struct Callable {
    pub target: CallTarget,
    pub bound_self: Option<ObjRef>,
}

#[derive(Debug, Clone)]
pub enum CallTarget {
    User(AstId),
    Builtin(&'static str),
}

pub type ObjRef = Rc<RefCell<Object>>;

#[derive(Debug, Clone)]
pub struct Instance {
    pub class: AstId,
    pub fields: Vec<ObjRef>,
}

#[derive(Debug, Clone)]
pub struct EnumeratorValue {
    pub enum_decl: AstId,
    pub variant: u32,
    pub fields: Vec<ObjRef>,
}

/// The top-level declarations of an imported compilation unit, exposed
/// under the name bound by `import a/b/c;` (spec.md §6, "Import").
///
/// Keyed by spelling rather than `StringId`: an imported file is lexed,
/// parsed and analyzed with its own `Interner` (DESIGN.md, "import does
/// not share an interner"), so its string ids are not comparable to the
/// importer's.
#[derive(Debug, Clone)]
pub struct ModuleValue {
    pub members: BTreeMap<String, ObjRef>,
}

/// A runtime value. Every variant carries enough to recompute its
/// `TypeInfo` on demand via [`Object::type_of`].
#[derive(Debug, Clone)]
pub enum Object {
    None,
    Primitive(Primitive),
    String(Vec<u16>),
    Vector(Vec<ObjRef>),
    Tuple(Vec<ObjRef>),
    Dict(BTreeMap<DictKey, ObjRef>),
    Instance(Instance),
    Enumerator(EnumeratorValue),
    Callable(Callable),
    Type(TypeInfo),
    Module(ModuleValue),
}

/// Dict keys must be orderable/hashable primitives; this mirrors the
/// "structural equality for composite kinds" rule (spec.md §4.6) applied
/// specifically to what can serve as a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum DictKey {
    Int(i64),
    Bool(bool),
    Char(u16),
    String(Vec<u16>),
}

impl Object {
    pub fn new_ref(self) -> ObjRef {
        Rc::new(RefCell::new(self))
    }

    pub fn type_of(&self) -> TypeInfo {
        use crate::types::TypeKind;
        match self {
            Self::None => TypeInfo::none(),
            Self::Primitive(Primitive::Int(_)) => TypeInfo::simple(TypeKind::Int),
            Self::Primitive(Primitive::Float(_)) => TypeInfo::simple(TypeKind::Float),
            Self::Primitive(Primitive::Size(_)) => TypeInfo::simple(TypeKind::Size),
            Self::Primitive(Primitive::Bool(_)) => TypeInfo::simple(TypeKind::Bool),
            Self::Primitive(Primitive::Char(_)) => TypeInfo::simple(TypeKind::Char),
            Self::String(_) => TypeInfo::simple(TypeKind::String),
            Self::Vector(items) => {
                let elem = items.first().map_or(TypeInfo::none(), |i| i.borrow().type_of());
                TypeInfo::generic(TypeKind::Vector, vec![elem])
            }
            Self::Tuple(items) => TypeInfo::generic(TypeKind::Tuple, items.iter().map(|i| i.borrow().type_of()).collect()),
            Self::Dict(map) => {
                let val = map.values().next().map_or(TypeInfo::none(), |v| v.borrow().type_of());
                TypeInfo::generic(TypeKind::Dict, vec![val])
            }
            Self::Instance(inst) => TypeInfo::instance(None, inst.class),
            Self::Enumerator(e) => TypeInfo::enumerator(None, e.enum_decl),
            Self::Callable(_) => TypeInfo::simple(TypeKind::Function),
            Self::Type(_) => TypeInfo::simple(TypeKind::TypeName),
            Self::Module(_) => TypeInfo::simple(TypeKind::Module),
        }
    }

    /// Deep clone, used at the `+`/`-`/`*` composite-operator sites so
    /// `v + x` never mutates `v` (spec.md §9, "Shared objects and copy
    /// semantics").
    pub fn deep_clone(&self) -> Object {
        match self {
            Self::Vector(items) => Self::Vector(items.iter().map(|i| i.borrow().deep_clone().new_ref()).collect()),
            Self::Tuple(items) => Self::Tuple(items.iter().map(|i| i.borrow().deep_clone().new_ref()).collect()),
            Self::Dict(map) => Self::Dict(map.iter().map(|(k, v)| (k.clone(), v.borrow().deep_clone().new_ref())).collect()),
            Self::String(chars) => Self::String(chars.clone()),
            other => other.clone_shallow(),
        }
    }

    fn clone_shallow(&self) -> Object {
        match self {
            Self::None => Self::None,
            Self::Primitive(p) => Self::Primitive(*p),
            Self::String(s) => Self::String(s.clone()),
            Self::Vector(v) => Self::Vector(v.clone()),
            Self::Tuple(v) => Self::Tuple(v.clone()),
            Self::Dict(d) => Self::Dict(d.clone()),
            Self::Instance(i) => Self::Instance(i.clone()),
            Self::Enumerator(e) => Self::Enumerator(e.clone()),
            Self::Callable(c) => Self::Callable(c.clone()),
            Self::Type(t) => Self::Type(t.clone()),
            Self::Module(m) => Self::Module(m.clone()),
        }
    }

    /// Structural equality for composite kinds (spec.md §4.6).
    pub fn structural_eq(&self, other: &Object) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Primitive(a), Self::Primitive(b)) => primitive_eq(*a, *b),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Vector(a), Self::Vector(b)) | (Self::Tuple(a), Self::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.borrow().structural_eq(&y.borrow()))
            }
            (Self::Dict(a), Self::Dict(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).is_some_and(|bv| v.borrow().structural_eq(&bv.borrow())))
            }
            (Self::Enumerator(a), Self::Enumerator(b)) => {
                a.enum_decl == b.enum_decl
                    && a.variant == b.variant
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(&b.fields).all(|(x, y)| x.borrow().structural_eq(&y.borrow()))
            }
            (Self::Instance(a), Self::Instance(b)) => {
                a.class == b.class
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(&b.fields).all(|(x, y)| x.borrow().structural_eq(&y.borrow()))
            }
            _ => false,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Primitive(Primitive::Bool(b)) => *b,
            Self::Primitive(Primitive::Int(i)) => *i != 0,
            Self::Primitive(Primitive::Float(f)) => *f != 0.0,
            Self::Primitive(Primitive::Size(s)) => *s != 0,
            Self::Primitive(Primitive::Char(c)) => *c != 0,
            Self::String(s) => !s.is_empty(),
            Self::Vector(v) | Self::Tuple(v) => !v.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            _ => true,
        }
    }
}

fn primitive_eq(a: Primitive, b: Primitive) -> bool {
    match (a, b) {
        (Primitive::Int(a), Primitive::Int(b)) => a == b,
        (Primitive::Float(a), Primitive::Float(b)) => a == b,
        (Primitive::Size(a), Primitive::Size(b)) => a == b,
        (Primitive::Bool(a), Primitive::Bool(b)) => a == b,
        (Primitive::Char(a), Primitive::Char(b)) => a == b,
        _ => false,
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Primitive(Primitive::Int(i)) => write!(f, "{i}"),
            Self::Primitive(Primitive::Float(v)) => write!(f, "{v}"),
            Self::Primitive(Primitive::Size(s)) => write!(f, "{s}"),
            Self::Primitive(Primitive::Bool(b)) => write!(f, "{b}"),
            Self::Primitive(Primitive::Char(c)) => {
                write!(f, "{}", char::from_u32(u32::from(*c)).unwrap_or('\u{FFFD}'))
            }
            Self::String(s) => write!(f, "{}", String::from_utf16_lossy(s)),
            Self::Vector(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.borrow())?;
                }
                write!(f, "]")
            }
            Self::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.borrow())?;
                }
                write!(f, ")")
            }
            Self::Dict(map) => {
                write!(f, "{{")?;
                for (i, (_, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v.borrow())?;
                }
                write!(f, "}}")
            }
            Self::Instance(_) => write!(f, "<instance>"),
            Self::Enumerator(e) => write!(f, "<enumerator variant {}>", e.variant),
            Self::Callable(_) => write!(f, "<function>"),
            Self::Type(_) => write!(f, "<type>"),
            Self::Module(_) => write!(f, "<module>"),
        }
    }
}

pub fn str_to_units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}
