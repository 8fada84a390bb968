//! Object construction, copy semantics, and the binary/unary operator
//! tables, split out of `eval/mod.rs` since they don't touch frames or
//! control flow at all — pure `Object -> Object` transforms.

use crate::ast::{BinOp, UnaryOp};
use crate::error::RuntimeError;
use crate::eval::Signal;
use crate::object::{str_to_units, DictKey, Literal, Object, ObjRef, Primitive};
use crate::source::Span;

pub fn literal_to_object(lit: &Literal) -> ObjRef {
    match lit {
        Literal::None => Object::None.new_ref(),
        Literal::Int(i) => int_obj(*i),
        Literal::Float(f) => float_obj(*f),
        Literal::Bool(b) => bool_obj(*b),
        Literal::Char(c) => Object::Primitive(Primitive::Char(char_to_unit(*c))).new_ref(),
        Literal::Size(s) => size_obj(*s),
        Literal::String(s) => Object::String(str_to_units(s)).new_ref(),
    }
}

pub fn int_obj(v: i64) -> ObjRef {
    Object::Primitive(Primitive::Int(v)).new_ref()
}

pub fn float_obj(v: f64) -> ObjRef {
    Object::Primitive(Primitive::Float(v)).new_ref()
}

pub fn bool_obj(v: bool) -> ObjRef {
    Object::Primitive(Primitive::Bool(v)).new_ref()
}

pub fn size_obj(v: u64) -> ObjRef {
    Object::Primitive(Primitive::Size(v)).new_ref()
}

fn char_to_unit(c: char) -> u16 {
    let mut buf = [0u16; 2];
    c.encode_utf16(&mut buf)[0]
}

/// Storing a value anywhere — a variable's init, an argument binding, an
/// array element, a field initializer, a match binding — severs aliasing
/// with whatever expression produced it (DESIGN.md, "copy-for-store
/// rule"); reading one back out never re-copies.
pub fn copy_for_store(value: &ObjRef) -> ObjRef {
    value.borrow().deep_clone().new_ref()
}

pub fn raw_index(index: &ObjRef) -> i64 {
    match &*index.borrow() {
        Object::Primitive(Primitive::Int(i)) => *i,
        Object::Primitive(Primitive::Size(s)) => *s as i64,
        _ => unreachable!("index expressions only type-check as Int or Size"),
    }
}

pub fn to_dict_key(key: &ObjRef) -> DictKey {
    match &*key.borrow() {
        Object::Primitive(Primitive::Int(i)) => DictKey::Int(*i),
        Object::Primitive(Primitive::Bool(b)) => DictKey::Bool(*b),
        Object::Primitive(Primitive::Char(c)) => DictKey::Char(*c),
        Object::String(s) => DictKey::String(s.clone()),
        _ => unreachable!("dict keys only type-check as Int, Bool, Char or String"),
    }
}

pub fn apply_unary(op: UnaryOp, v: &ObjRef) -> Result<ObjRef, Signal> {
    match (op, &*v.borrow()) {
        (UnaryOp::Not, other) => Ok(bool_obj(!other.truthy())),
        (UnaryOp::Neg, Object::Primitive(Primitive::Int(i))) => Ok(int_obj(i.wrapping_neg())),
        (UnaryOp::Neg, Object::Primitive(Primitive::Float(f))) => Ok(float_obj(-f)),
        (UnaryOp::BitNot, Object::Primitive(Primitive::Int(i))) => Ok(int_obj(!i)),
        (UnaryOp::BitNot, Object::Primitive(Primitive::Size(s))) => Ok(size_obj(!s)),
        _ => unreachable!("unary operand type already validated during checking"),
    }
}

pub fn apply_binop(op: BinOp, l: &ObjRef, r: &ObjRef, span: Span) -> Result<ObjRef, Signal> {
    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let eq = l.borrow().structural_eq(&r.borrow());
        return Ok(bool_obj(if op == BinOp::Eq { eq } else { !eq }));
    }
    if matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) {
        let ord = compare(l, r);
        let result = match op {
            BinOp::Lt => ord == std::cmp::Ordering::Less,
            BinOp::Le => ord != std::cmp::Ordering::Greater,
            BinOp::Gt => ord == std::cmp::Ordering::Greater,
            BinOp::Ge => ord != std::cmp::Ordering::Less,
            _ => unreachable!(),
        };
        return Ok(bool_obj(result));
    }

    let lb = l.borrow();
    let rb = r.borrow();
    match (&*lb, op, &*rb) {
        (Object::String(a), BinOp::Add, Object::String(b)) => {
            let mut out = a.clone();
            out.extend_from_slice(b);
            return Ok(Object::String(out).new_ref());
        }
        (Object::String(a), BinOp::Add, Object::Primitive(Primitive::Char(c))) => {
            let mut out = a.clone();
            out.push(*c);
            return Ok(Object::String(out).new_ref());
        }
        (Object::Primitive(Primitive::Char(c)), BinOp::Add, Object::String(b)) => {
            let mut out = vec![*c];
            out.extend_from_slice(b);
            return Ok(Object::String(out).new_ref());
        }
        (Object::String(a), BinOp::Mul, Object::Primitive(Primitive::Int(n))) | (Object::Primitive(Primitive::Int(n)), BinOp::Mul, Object::String(a)) => {
            let mut out = Vec::with_capacity(a.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                out.extend_from_slice(a);
            }
            return Ok(Object::String(out).new_ref());
        }
        (Object::Vector(items), BinOp::Add, _) => {
            let mut out = items.clone();
            out.push(copy_for_store(r));
            return Ok(Object::Vector(out).new_ref());
        }
        (Object::Vector(items), BinOp::Mul, Object::Primitive(Primitive::Int(n))) | (Object::Primitive(Primitive::Int(n)), BinOp::Mul, Object::Vector(items)) => {
            let mut out = Vec::with_capacity(items.len() * (*n).max(0) as usize);
            for _ in 0..(*n).max(0) {
                out.extend(items.iter().map(copy_for_store));
            }
            return Ok(Object::Vector(out).new_ref());
        }
        _ => {}
    }
    drop(lb);
    drop(rb);
    apply_numeric_or_bitwise(op, l, r, span)
}

fn compare(l: &ObjRef, r: &ObjRef) -> std::cmp::Ordering {
    match (&*l.borrow(), &*r.borrow()) {
        (Object::Primitive(Primitive::Int(a)), Object::Primitive(Primitive::Int(b))) => a.cmp(b),
        (Object::Primitive(Primitive::Size(a)), Object::Primitive(Primitive::Size(b))) => a.cmp(b),
        (Object::Primitive(Primitive::Float(a)), Object::Primitive(Primitive::Float(b))) => a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal),
        (Object::Primitive(Primitive::Char(a)), Object::Primitive(Primitive::Char(b))) => a.cmp(b),
        (Object::String(a), Object::String(b)) => a.cmp(b),
        _ => unreachable!("comparison operand types already validated during checking"),
    }
}

fn apply_numeric_or_bitwise(op: BinOp, l: &ObjRef, r: &ObjRef, span: Span) -> Result<ObjRef, Signal> {
    match (&*l.borrow(), &*r.borrow()) {
        (Object::Primitive(Primitive::Int(a)), Object::Primitive(Primitive::Int(b))) => int_arith(op, *a, *b, span),
        (Object::Primitive(Primitive::Size(a)), Object::Primitive(Primitive::Size(b))) => size_arith(op, *a, *b, span),
        (Object::Primitive(Primitive::Float(a)), Object::Primitive(Primitive::Float(b))) => float_arith(op, *a, *b, span),
        _ => unreachable!("arithmetic operand types already validated during checking"),
    }
}

fn int_arith(op: BinOp, a: i64, b: i64, span: Span) -> Result<ObjRef, Signal> {
    Ok(match op {
        BinOp::Add => int_obj(a.wrapping_add(b)),
        BinOp::Sub => int_obj(a.wrapping_sub(b)),
        BinOp::Mul => int_obj(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            int_obj(a.wrapping_div(b))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            int_obj(a.wrapping_rem(b))
        }
        BinOp::BitAnd => int_obj(a & b),
        BinOp::BitOr => int_obj(a | b),
        BinOp::BitXor => int_obj(a ^ b),
        BinOp::Shl => int_obj(shl_i64(a, b)),
        BinOp::Shr => int_obj(shr_i64(a, b)),
        _ => unreachable!("non-arithmetic BinOp reached int_arith"),
    })
}

fn size_arith(op: BinOp, a: u64, b: u64, span: Span) -> Result<ObjRef, Signal> {
    Ok(match op {
        BinOp::Add => size_obj(a.wrapping_add(b)),
        BinOp::Sub => size_obj(a.wrapping_sub(b)),
        BinOp::Mul => size_obj(a.wrapping_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            size_obj(a.wrapping_div(b))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            size_obj(a.wrapping_rem(b))
        }
        BinOp::BitAnd => size_obj(a & b),
        BinOp::BitOr => size_obj(a | b),
        BinOp::BitXor => size_obj(a ^ b),
        BinOp::Shl => size_obj(shl_u64(a, b)),
        BinOp::Shr => size_obj(shr_u64(a, b)),
        _ => unreachable!("non-arithmetic BinOp reached size_arith"),
    })
}

fn float_arith(op: BinOp, a: f64, b: f64, span: Span) -> Result<ObjRef, Signal> {
    Ok(match op {
        BinOp::Add => float_obj(a + b),
        BinOp::Sub => float_obj(a - b),
        BinOp::Mul => float_obj(a * b),
        BinOp::Div => {
            if b == 0.0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            float_obj(a / b)
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Signal::Runtime(RuntimeError::DividedByZero { span }));
            }
            float_obj(a % b)
        }
        _ => unreachable!("float operands never reach a bitwise BinOp, rejected during checking"),
    })
}

/// Shift amounts are not masked (spec.md §6): a shift of 64 or more, or a
/// negative amount, is defined explicitly rather than relying on the
/// platform shift instruction's masking behavior.
fn shl_i64(a: i64, b: i64) -> i64 {
    if b < 0 {
        return shr_i64(a, -b);
    }
    if b >= 64 {
        return 0;
    }
    a.wrapping_shl(b as u32)
}

fn shr_i64(a: i64, b: i64) -> i64 {
    if b < 0 {
        return shl_i64(a, -b);
    }
    if b >= 64 {
        return if a < 0 { -1 } else { 0 };
    }
    a.wrapping_shr(b as u32)
}

fn shl_u64(a: u64, b: u64) -> u64 {
    if b >= 64 {
        return 0;
    }
    a.wrapping_shl(b as u32)
}

fn shr_u64(a: u64, b: u64) -> u64 {
    if b >= 64 {
        return 0;
    }
    a.wrapping_shr(b as u32)
}
