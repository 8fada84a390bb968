//! Name resolution: turns an `Identifier`/`ScopeResol`/`TypeName` node
//! into a [`Resolution`] or [`TypeInfo`].
//!
//! Grounded in `original_source/src/Sema/SemaIdentifier.cpp`'s fixed
//! priority order (spec.md §4.5, "Supplemented from original_source/"):
//! local variable, local function set, enumerator, enum type, class,
//! namespace, built-in type name, built-in function — searched
//! scope-by-scope from innermost to outermost. A bare identifier naming
//! an enum *variant* is resolved the same way `Enum::Variant` is
//! (see [`resolve_scope_path`]): both land on [`Resolution::Enumerator`].

use crate::ast::{Ast, AstId, LocalSlot, NodeKind, Resolution};
use crate::builtins;
use crate::error::{SemaError, SemaErrorKind};
use crate::intern::{Interner, StringId};
use crate::scope::{ScopeId, ScopeTree};
use crate::sema::DeclTable;
use crate::source::Span;
use crate::types::{TypeInfo, TypeKind};

fn builtin_type_kind(text: &str) -> Option<TypeKind> {
    Some(match text {
        "none" => TypeKind::None,
        "int" => TypeKind::Int,
        "float" => TypeKind::Float,
        "bool" => TypeKind::Bool,
        "char" => TypeKind::Char,
        "size" => TypeKind::Size,
        "string" => TypeKind::String,
        "Vector" => TypeKind::Vector,
        "Tuple" => TypeKind::Tuple,
        "Dict" => TypeKind::Dict,
        "Function" => TypeKind::Function,
        _ => return None,
    })
}

/// Looks for an enum declared directly in `scope` with a variant named
/// `name`, regardless of the enum's own name — bare variant access
/// (`Some(7)` rather than `Opt::Some(7)`) has no enum name to key a
/// `DeclTable` lookup on, so every enum declared in the scope is checked.
fn find_enumerator_in_scope(ast: &Ast, decls: &DeclTable, scope: ScopeId, name: StringId) -> Option<Resolution> {
    for id in decls.declared_in(scope) {
        if let NodeKind::Enum { variants, .. } = &ast.get(id).kind {
            if let Some(idx) = variants.iter().position(|v| v.name == name) {
                return Some(Resolution::Enumerator { enum_decl: id, variant: idx as u32 });
            }
        }
    }
    None
}

fn decl_kind_is(ast: &Ast, id: AstId) -> &'static str {
    match &ast.get(id).kind {
        NodeKind::Function { .. } => "function",
        NodeKind::Class { .. } => "class",
        NodeKind::Enum { .. } => "enum",
        _ => "other",
    }
}

/// Resolves a bare identifier by walking scopes innermost-first and
/// applying the fixed priority order within each scope before moving
/// outward. Returns `None` if nothing at all matches (caller raises
/// `UnknownName`); builtin fallbacks are scope-independent and checked
/// only once the whole ancestor chain is exhausted.
pub fn resolve_identifier(
    ast: &Ast,
    tree: &ScopeTree,
    decls: &DeclTable,
    interner: &Interner,
    name: StringId,
    scope: ScopeId,
) -> Option<Resolution> {
    for anc in tree.ancestors(scope) {
        if let Some(local) = tree.get(anc).find_local(name) {
            let distance = tree.get(scope).depth - tree.get(anc).depth;
            let ty = local.ty.clone().unwrap_or_else(TypeInfo::none);
            return Some(Resolution::Variable { slot: LocalSlot { distance, index: local.index + local.index_add }, ty });
        }
        if let Some(entries) = decls.lookup(anc, name) {
            let funcs: Vec<AstId> = entries.iter().copied().filter(|&id| decl_kind_is(ast, id) == "function").collect();
            if !funcs.is_empty() {
                return Some(Resolution::FuncName(funcs));
            }
        }
        if let Some(res) = find_enumerator_in_scope(ast, decls, anc, name) {
            return Some(res);
        }
        if let Some(entries) = decls.lookup(anc, name) {
            if let Some(&enum_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "enum") {
                return Some(Resolution::EnumName(enum_id));
            }
            if let Some(&class_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "class") {
                return Some(Resolution::ClassName(class_id));
            }
        }
        if let Some(ns) = tree.find_namespace_child(anc, name) {
            return Some(Resolution::Namespace(ns));
        }
    }
    let text = interner.resolve(name);
    if let Some(kind) = builtin_type_kind(text) {
        return Some(Resolution::BuiltinTypeName(kind));
    }
    if let Some(n) = builtins::is_builtin_function(text) {
        return Some(Resolution::BuiltinFuncName(n));
    }
    None
}

/// Resolves `first::rest...` (spec.md §4.2 `ScopeResol`): the first
/// segment resolves like a bare identifier (expected to land on a
/// namespace or an enum type), then each further segment narrows inside
/// that scope — either another nested namespace, or (for the final
/// segment against an enum) a variant name.
pub fn resolve_scope_path(
    ast: &Ast,
    tree: &ScopeTree,
    decls: &DeclTable,
    interner: &Interner,
    first: StringId,
    rest: &[StringId],
    scope: ScopeId,
    span: Span,
) -> Result<Resolution, SemaError> {
    let head = resolve_identifier(ast, tree, decls, interner, first, scope)
        .ok_or_else(|| SemaError::new(span, SemaErrorKind::UnknownName(interner.resolve(first).to_string())))?;

    if rest.is_empty() {
        return Ok(head);
    }

    match head {
        Resolution::EnumName(enum_decl) => {
            let variant_name = rest[0];
            let variants = match &ast.get(enum_decl).kind {
                NodeKind::Enum { variants, .. } => variants,
                _ => unreachable!("EnumName always targets an Enum node"),
            };
            let idx = variants
                .iter()
                .position(|v| v.name == variant_name)
                .ok_or_else(|| SemaError::new(span, SemaErrorKind::UnknownName(interner.resolve(variant_name).to_string())))?;
            Ok(Resolution::Enumerator { enum_decl, variant: idx as u32 })
        }
        Resolution::Namespace(ns_scope) => {
            let next = rest[0];
            if let Some(entries) = decls.lookup(ns_scope, next) {
                let funcs: Vec<AstId> = entries.iter().copied().filter(|&id| decl_kind_is(ast, id) == "function").collect();
                if !funcs.is_empty() {
                    return resolve_rest(ast, decls, interner, Resolution::FuncName(funcs), &rest[1..], span);
                }
                if let Some(&class_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "class") {
                    return resolve_rest(ast, decls, interner, Resolution::ClassName(class_id), &rest[1..], span);
                }
                if let Some(&enum_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "enum") {
                    return resolve_rest(ast, decls, interner, Resolution::EnumName(enum_id), &rest[1..], span);
                }
            }
            if let Some(inner_ns) = tree.find_namespace_child(ns_scope, next) {
                return resolve_path_within(ast, tree, decls, interner, Resolution::Namespace(inner_ns), &rest[1..], span);
            }
            Err(SemaError::new(span, SemaErrorKind::UnknownName(interner.resolve(next).to_string())))
        }
        other => Ok(other),
    }
}

fn resolve_rest(
    ast: &Ast,
    decls: &DeclTable,
    interner: &Interner,
    res: Resolution,
    rest: &[StringId],
    span: Span,
) -> Result<Resolution, SemaError> {
    if rest.is_empty() {
        return Ok(res);
    }
    if let Resolution::EnumName(enum_decl) = res {
        let variant_name = rest[0];
        let variants = match &ast.get(enum_decl).kind {
            NodeKind::Enum { variants, .. } => variants,
            _ => unreachable!("EnumName always targets an Enum node"),
        };
        let idx = variants
            .iter()
            .position(|v| v.name == variant_name)
            .ok_or_else(|| SemaError::new(span, SemaErrorKind::UnknownName(interner.resolve(variant_name).to_string())))?;
        return Ok(Resolution::Enumerator { enum_decl, variant: idx as u32 });
    }
    let _ = decls;
    Err(SemaError::new(span, SemaErrorKind::Other("cannot qualify further into this name".to_string())))
}

fn resolve_path_within(
    ast: &Ast,
    tree: &ScopeTree,
    decls: &DeclTable,
    interner: &Interner,
    res: Resolution,
    rest: &[StringId],
    span: Span,
) -> Result<Resolution, SemaError> {
    if rest.is_empty() {
        return Ok(res);
    }
    if let Resolution::Namespace(ns_scope) = res {
        return resolve_scope_path(ast, tree, decls, interner, rest[0], &rest[1..], ns_scope, span);
    }
    Err(SemaError::new(span, SemaErrorKind::Other("cannot qualify further into this name".to_string())))
}

/// Resolves a `TypeName` AST node to a concrete [`TypeInfo`] (spec.md
/// §4.5): a builtin keyword, or a user `class`/`enum` found by searching
/// outward from `scope`. Never called against a template's own
/// uninstantiated parameter occurrences — those are checked structurally
/// by [`crate::sema::template`] instead, before any clone is type-checked.
pub fn resolve_type_name(
    ast: &Ast,
    tree: &ScopeTree,
    decls: &DeclTable,
    interner: &Interner,
    id: AstId,
    scope: ScopeId,
) -> Result<TypeInfo, SemaError> {
    let (name, params, is_const) = match &ast.get(id).kind {
        NodeKind::TypeName { name, params, is_const } => (*name, params.clone(), *is_const),
        _ => unreachable!("resolve_type_name called on a non-TypeName node"),
    };
    let text = interner.resolve(name);
    let mut info = if let Some(kind) = builtin_type_kind(text) {
        let resolved_params = params
            .iter()
            .map(|&p| resolve_type_name(ast, tree, decls, interner, p, scope))
            .collect::<Result<Vec<_>, _>>()?;
        TypeInfo::generic(kind, resolved_params)
    } else {
        let span = ast.get(id).span();
        find_type_decl(ast, tree, decls, name, scope)
            .ok_or_else(|| SemaError::new(span, SemaErrorKind::UnknownName(text.to_string())))?
    };
    info.is_const = is_const;
    Ok(info)
}

fn find_type_decl(ast: &Ast, tree: &ScopeTree, decls: &DeclTable, name: StringId, scope: ScopeId) -> Option<TypeInfo> {
    for anc in tree.ancestors(scope) {
        if let Some(entries) = decls.lookup(anc, name) {
            if let Some(&class_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "class") {
                return Some(TypeInfo::instance(name, class_id));
            }
            if let Some(&enum_id) = entries.iter().find(|&&id| decl_kind_is(ast, id) == "enum") {
                return Some(TypeInfo::enumerator(name, enum_id));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::SourceMap;

    fn analyzed(src: &str) -> (Ast, ScopeTree, DeclTable, Interner) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("t.fire", src.to_string());
        let tokens = Lexer::new(&sources, file).lex().expect("lex");
        let mut interner = Interner::new();
        let parser = Parser::new(&tokens, &mut interner);
        let (mut ast, _notes) = parser.parse_program().expect("parse");
        let (tree, decls) = crate::sema::analyze(&mut ast, &mut interner).expect("analyze");
        (ast, tree, decls, interner)
    }

    /// A bare `Some` resolves to the same `Resolution::Enumerator` a
    /// fully-qualified `Opt::Some` would, honoring the documented
    /// priority order (local variable -> local function set ->
    /// enumerator -> enum type -> class -> namespace -> builtin type ->
    /// builtin function).
    #[test]
    fn bare_identifier_resolves_an_enum_variant() {
        let (ast, tree, decls, interner) =
            analyzed("enum Opt { None, Some(int) } fn f() -> Opt { return Some(1); }");
        let f = ast.top_level[1];
        let body = match &ast.get(f).kind {
            NodeKind::Function { body, .. } => *body,
            other => panic!("expected a Function node, got {other:?}"),
        };
        let ret_stmt = match &ast.get(body).kind {
            crate::ast::NodeKind::Block { stmts, .. } => stmts[0],
            other => panic!("expected a Block, got {other:?}"),
        };
        let call_id = match &ast.get(ret_stmt).kind {
            crate::ast::NodeKind::Return { value: Some(v) } => *v,
            other => panic!("expected `return Some(1);`, got {other:?}"),
        };
        let callee = match &ast.get(call_id).kind {
            crate::ast::NodeKind::CallFunc { callee, .. } => *callee,
            other => panic!("expected a CallFunc, got {other:?}"),
        };
        let name = match &ast.get(callee).kind {
            crate::ast::NodeKind::Identifier { name } => *name,
            other => panic!("expected a bare Identifier, got {other:?}"),
        };
        let scope = ast.get(callee).scope.get().expect("scope attached by scope_builder");
        let resolved = resolve_identifier(&ast, &tree, &decls, &interner, name, scope);
        assert!(matches!(resolved, Some(Resolution::Enumerator { variant: 1, .. })), "expected Some to resolve to variant 1, got {resolved:?}");
    }

    /// A local variable of the same spelling as an enum variant wins,
    /// matching the priority order's first rule.
    #[test]
    fn a_local_variable_shadows_an_enum_variant_of_the_same_name() {
        let (ast, tree, decls, interner) = analyzed(
            "enum Opt { None, Some(int) } fn f() -> int { let Some = 9; return Some; }",
        );
        let f = ast.top_level[1];
        let body = match &ast.get(f).kind {
            NodeKind::Function { body, .. } => *body,
            other => panic!("expected a Function node, got {other:?}"),
        };
        let ret_stmt = match &ast.get(body).kind {
            crate::ast::NodeKind::Block { stmts, .. } => stmts[1],
            other => panic!("expected a Block, got {other:?}"),
        };
        let ident = match &ast.get(ret_stmt).kind {
            crate::ast::NodeKind::Return { value: Some(v) } => *v,
            other => panic!("expected `return Some;`, got {other:?}"),
        };
        let name = match &ast.get(ident).kind {
            crate::ast::NodeKind::Identifier { name } => *name,
            other => panic!("expected a bare Identifier, got {other:?}"),
        };
        let scope = ast.get(ident).scope.get().expect("scope attached by scope_builder");
        let resolved = resolve_identifier(&ast, &tree, &decls, &interner, name, scope);
        assert!(matches!(resolved, Some(Resolution::Variable { .. })), "expected the local variable to win, got {resolved:?}");
    }
}
