//! The built-in member-function table (SPEC_FULL.md §4.5, Open Question
//! 2): a small lookup of `(receiver kind, name) -> implementation`,
//! grounded in the same one-function-per-builtin convention as the
//! pack's `builtins/abs.rs`, just collapsed into a table since each
//! implementation here is a few lines.

use crate::error::RuntimeError;
use crate::object::{str_to_units, Object, ObjRef, Primitive};
use crate::source::Span;
use crate::types::TypeKind;

pub type MemberFn = fn(&ObjRef, &[ObjRef], Span) -> Result<ObjRef, RuntimeError>;

pub const BUILTIN_MEMBERS: &[(TypeKind, &str, MemberFn)] = &[
    (TypeKind::Int, "abs", int_abs),
    (TypeKind::Float, "abs", float_abs),
    (TypeKind::String, "length", string_length),
    (TypeKind::String, "to_upper", string_to_upper),
    (TypeKind::String, "to_lower", string_to_lower),
    (TypeKind::Vector, "length", vector_length),
    (TypeKind::Vector, "push", vector_push),
    (TypeKind::Tuple, "length", tuple_length),
    (TypeKind::Dict, "length", dict_length),
];

pub fn lookup(kind: TypeKind, name: &str) -> Option<MemberFn> {
    BUILTIN_MEMBERS.iter().find(|(k, n, _)| *k == kind && *n == name).map(|(_, _, f)| *f)
}

/// True for receiver kinds that carry a built-in member with `name`,
/// used by the analyzer to resolve `base.member` without evaluating
/// anything (spec.md §4.5).
pub fn has_member(kind: TypeKind, name: &str) -> bool {
    lookup(kind, name).is_some()
}

fn int_abs(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::Primitive(Primitive::Int(i)) => Ok(Object::Primitive(Primitive::Int(i.wrapping_abs())).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::Int"),
    }
}

fn float_abs(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::Primitive(Primitive::Float(f)) => Ok(Object::Primitive(Primitive::Float(f.abs())).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::Float"),
    }
}

fn string_length(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::String(units) => Ok(Object::Primitive(Primitive::Size(units.len() as u64)).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::String"),
    }
}

fn string_to_upper(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::String(units) => {
            let upper = String::from_utf16_lossy(units).to_uppercase();
            Ok(Object::String(str_to_units(&upper)).new_ref())
        }
        _ => unreachable!("dispatched by matching TypeKind::String"),
    }
}

fn string_to_lower(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::String(units) => {
            let lower = String::from_utf16_lossy(units).to_lowercase();
            Ok(Object::String(str_to_units(&lower)).new_ref())
        }
        _ => unreachable!("dispatched by matching TypeKind::String"),
    }
}

fn vector_length(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::Vector(items) => Ok(Object::Primitive(Primitive::Size(items.len() as u64)).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::Vector"),
    }
}

fn vector_push(recv: &ObjRef, args: &[ObjRef], span: Span) -> Result<ObjRef, RuntimeError> {
    let Some(value) = args.first() else {
        return Err(RuntimeError::IndexOutOfRange { span, index: 0, len: 0 });
    };
    match &mut *recv.borrow_mut() {
        Object::Vector(items) => {
            items.push(value.borrow().deep_clone().new_ref());
            Ok(Object::None.new_ref())
        }
        _ => unreachable!("dispatched by matching TypeKind::Vector"),
    }
}

fn tuple_length(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::Tuple(items) => Ok(Object::Primitive(Primitive::Size(items.len() as u64)).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::Tuple"),
    }
}

fn dict_length(recv: &ObjRef, _args: &[ObjRef], _span: Span) -> Result<ObjRef, RuntimeError> {
    match &*recv.borrow() {
        Object::Dict(map) => Ok(Object::Primitive(Primitive::Size(map.len() as u64)).new_ref()),
        _ => unreachable!("dispatched by matching TypeKind::Dict"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_push_appends_one_element() {
        let vec_obj = Object::Vector(Vec::new()).new_ref();
        let pushed = Object::Primitive(Primitive::Int(1)).new_ref();
        vector_push(&vec_obj, &[pushed], Span::new(crate::source::FileId(0), 0, 0)).unwrap();
        match &*vec_obj.borrow() {
            Object::Vector(items) => assert_eq!(items.len(), 1),
            _ => unreachable!(),
        };
    }

    #[test]
    fn string_length_counts_utf16_units() {
        let s = Object::String(str_to_units("hi")).new_ref();
        let len = string_length(&s, &[], Span::new(crate::source::FileId(0), 0, 0)).unwrap();
        match &*len.borrow() {
            Object::Primitive(Primitive::Size(n)) => assert_eq!(*n, 2),
            _ => unreachable!(),
        };
    }
}
