//! Template-argument deduction and instantiation (spec.md §4.3, §4.5).
//!
//! Grounded in `original_source/src/Sema/SemaTemplate.cpp`: deduction
//! unifies each formal argument's declared `TypeName` against the
//! corresponding actual argument's type, seeding from any explicit
//! `@<...>` arguments first; a function whose template parameters are
//! all deduced is cloned (fresh `AstId`s, never mutating the original
//! declaration) and the clone's own scope is attached via
//! [`crate::sema::attach_subtree_scope`] before it is type-checked.
//! Every call site that needs a templated candidate instantiates its own
//! clone — `sum(1, 2)` and `sum(1.0, 2.0)` each get an independent clone,
//! and so do two calls that happen to deduce the same arguments; there is
//! no cross-call-site cache keyed on the deduced-argument list.

use crate::ast::{Ast, AstId, Argument, Catcher, EnumeratorArgPattern, FuncArg, MatchArm, MatchPattern, NodeKind};
use crate::builtins;
use crate::error::{SemaError, SemaErrorKind};
use crate::intern::{Interner, StringId};
use crate::scope::{ScopeId, ScopeTree};
use crate::sema::DeclTable;
use crate::source::Span;
use crate::types::TypeInfo;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};

/// Deduces each of `func_id`'s template parameters from `explicit`
/// (positionally, from an `@<...>` guide) and `arg_types` (structurally,
/// from the call's actual argument types). Errs if a parameter is bound
/// to two incompatible types, or never bound at all.
pub fn deduce(
    ast: &Ast,
    func_id: AstId,
    explicit: &[TypeInfo],
    arg_types: &[TypeInfo],
    span: Span,
    interner: &Interner,
) -> Result<HashMap<StringId, TypeInfo>, SemaError> {
    let (template_params, args) = match &ast.get(func_id).kind {
        NodeKind::Function { template_params, args, .. } => (template_params.clone(), args.clone()),
        _ => unreachable!("deduce called on a non-Function node"),
    };

    let mut subst: HashMap<StringId, TypeInfo> = HashMap::new();
    for (i, &p) in template_params.iter().enumerate() {
        if let Some(t) = explicit.get(i) {
            subst.insert(p, t.clone());
        }
    }

    let param_set: HashSet<StringId> = template_params.iter().copied().collect();
    for (formal, actual) in args.iter().zip(arg_types) {
        unify(ast, formal.ty, actual, &param_set, &mut subst, span, interner)?;
    }

    for &p in &template_params {
        if !subst.contains_key(&p) {
            return Err(SemaError::new(span, SemaErrorKind::TemplateCannotDeduce(interner.resolve(p).to_string())));
        }
    }
    Ok(subst)
}

fn unify(
    ast: &Ast,
    type_name_id: AstId,
    actual: &TypeInfo,
    params: &HashSet<StringId>,
    subst: &mut HashMap<StringId, TypeInfo>,
    span: Span,
    interner: &Interner,
) -> Result<(), SemaError> {
    let (name, formal_params) = match &ast.get(type_name_id).kind {
        NodeKind::TypeName { name, params, .. } => (*name, params.clone()),
        _ => unreachable!("unify called on a non-TypeName node"),
    };
    if params.contains(&name) {
        if let Some(existing) = subst.get(&name) {
            if !existing.unifies_with(actual) {
                return Err(SemaError::new(span, SemaErrorKind::TemplateArgTypeMismatch(interner.resolve(name).to_string())));
            }
        } else {
            subst.insert(name, actual.clone());
        }
        return Ok(());
    }
    if formal_params.len() != actual.params.len() {
        return Err(SemaError::new(
            span,
            SemaErrorKind::Other(format!(
                "`{}` expects {} type argument(s), found {}",
                interner.resolve(name),
                formal_params.len(),
                actual.params.len()
            )),
        ));
    }
    for (i, &fp) in formal_params.iter().enumerate() {
        unify(ast, fp, &actual.params[i], params, subst, span, interner)?;
    }
    Ok(())
}

/// Clones `func_id`'s whole subtree substituting template-parameter type
/// names with their deduced concrete types, attaches fresh scopes to the
/// clone, and marks it instantiated. The original declaration is left
/// untouched, so it can be cloned again for a different argument list.
pub fn instantiate(
    ast: &mut Ast,
    tree: &mut ScopeTree,
    decls: &mut DeclTable,
    interner: &mut Interner,
    func_id: AstId,
    subst: &HashMap<StringId, TypeInfo>,
    enclosing_scope: ScopeId,
) -> AstId {
    let cloned = clone_node(ast, interner, func_id, subst);
    if let NodeKind::Function { is_instantiated, .. } = &mut ast.get_mut(cloned).kind {
        *is_instantiated = true;
    }
    crate::sema::attach_subtree_scope(ast, tree, decls, cloned, enclosing_scope);
    cloned
}

fn clone_node(ast: &mut Ast, interner: &mut Interner, id: AstId, subst: &HashMap<StringId, TypeInfo>) -> AstId {
    let node = ast.get(id);
    let constructed_as = node.constructed_as;
    let token = node.token.clone();
    let end_token = node.end_token.clone();
    let kind = node.kind.clone();

    let new_kind = match kind {
        NodeKind::TypeName { name, params: _, is_const } if subst.contains_key(&name) => {
            let ty = subst.get(&name).expect("checked contains_key above");
            return build_type_name(ast, interner, ty, is_const, token, end_token);
        }
        NodeKind::TypeName { name, params, is_const } => {
            let params = params.into_iter().map(|p| clone_node(ast, interner, p, subst)).collect();
            NodeKind::TypeName { name, params, is_const }
        }
        NodeKind::Value(lit) => NodeKind::Value(lit),
        NodeKind::Identifier { name } => NodeKind::Identifier { name },
        NodeKind::ScopeResol { first, rest } => NodeKind::ScopeResol { first, rest },
        NodeKind::Array(items) => NodeKind::Array(items.into_iter().map(|i| clone_node(ast, interner, i, subst)).collect()),
        NodeKind::IndexRef { base, index } => {
            NodeKind::IndexRef { base: clone_node(ast, interner, base, subst), index: clone_node(ast, interner, index, subst) }
        }
        NodeKind::MemberAccess { base, member } => NodeKind::MemberAccess { base: clone_node(ast, interner, base, subst), member },
        NodeKind::CallFunc { callee, args } => NodeKind::CallFunc {
            callee: clone_node(ast, interner, callee, subst),
            args: args
                .into_iter()
                .map(|a| Argument { name: a.name, value: clone_node(ast, interner, a.value, subst) })
                .collect(),
        },
        NodeKind::Binary { op, lhs, rhs } => {
            NodeKind::Binary { op, lhs: clone_node(ast, interner, lhs, subst), rhs: clone_node(ast, interner, rhs, subst) }
        }
        NodeKind::Assign { lhs, rhs } => {
            NodeKind::Assign { lhs: clone_node(ast, interner, lhs, subst), rhs: clone_node(ast, interner, rhs, subst) }
        }
        NodeKind::Block { stmts, .. } => {
            NodeKind::Block { stmts: stmts.into_iter().map(|s| clone_node(ast, interner, s, subst)).collect(), scope: placeholder() }
        }
        NodeKind::VarDef { name, ty, init } => NodeKind::VarDef {
            name,
            ty: ty.map(|t| clone_node(ast, interner, t, subst)),
            init: init.map(|i| clone_node(ast, interner, i, subst)),
        },
        NodeKind::If { cond, then_branch, else_branch } => NodeKind::If {
            cond: clone_node(ast, interner, cond, subst),
            then_branch: clone_node(ast, interner, then_branch, subst),
            else_branch: else_branch.map(|e| clone_node(ast, interner, e, subst)),
        },
        NodeKind::Match { scrutinee, arms } => NodeKind::Match {
            scrutinee: clone_node(ast, interner, scrutinee, subst),
            arms: arms.into_iter().map(|arm| clone_match_arm(ast, interner, arm, subst)).collect(),
        },
        NodeKind::While { cond, body } => {
            NodeKind::While { cond: clone_node(ast, interner, cond, subst), body: clone_node(ast, interner, body, subst) }
        }
        NodeKind::Break => NodeKind::Break,
        NodeKind::Continue => NodeKind::Continue,
        NodeKind::Return { value } => NodeKind::Return { value: value.map(|v| clone_node(ast, interner, v, subst)) },
        NodeKind::Throw { value } => NodeKind::Throw { value: clone_node(ast, interner, value, subst) },
        NodeKind::TryCatch { try_block, catchers } => NodeKind::TryCatch {
            try_block: clone_node(ast, interner, try_block, subst),
            catchers: catchers.into_iter().map(|c| clone_catcher(ast, interner, c, subst)).collect(),
        },
        NodeKind::Function { name, template_params, args, return_type, body, is_instantiated, is_virtual, is_override, .. } => {
            NodeKind::Function {
                name,
                template_params,
                args: args.into_iter().map(|a| clone_func_arg(ast, interner, a, subst)).collect(),
                return_type: return_type.map(|r| clone_node(ast, interner, r, subst)),
                body: clone_node(ast, interner, body, subst),
                scope: placeholder(),
                is_instantiated,
                is_virtual,
                is_override,
            }
        }
        NodeKind::Lambda { args, return_type, body, .. } => NodeKind::Lambda {
            args: args.into_iter().map(|a| clone_func_arg(ast, interner, a, subst)).collect(),
            return_type: return_type.map(|r| clone_node(ast, interner, r, subst)),
            body: clone_node(ast, interner, body, subst),
            scope: placeholder(),
        },
        NodeKind::Enum { name, variants, .. } => NodeKind::Enum {
            name,
            variants: variants
                .into_iter()
                .map(|v| crate::ast::EnumVariant {
                    name: v.name,
                    fields: v.fields.into_iter().map(|f| clone_node(ast, interner, f, subst)).collect(),
                })
                .collect(),
            scope: placeholder(),
        },
        NodeKind::Class { name, base, is_final, fields, methods, .. } => NodeKind::Class {
            name,
            base,
            is_final,
            fields: fields.into_iter().map(|f| clone_node(ast, interner, f, subst)).collect(),
            methods: methods.into_iter().map(|m| clone_node(ast, interner, m, subst)).collect(),
            scope: placeholder(),
        },
        NodeKind::Namespace { name, items, .. } => {
            NodeKind::Namespace { name, items: items.into_iter().map(|i| clone_node(ast, interner, i, subst)).collect(), scope: placeholder() }
        }
        NodeKind::Signature { params, ret } => NodeKind::Signature {
            params: params.into_iter().map(|p| clone_node(ast, interner, p, subst)).collect(),
            ret: clone_node(ast, interner, ret, subst),
        },
        NodeKind::Unary { op, operand } => NodeKind::Unary { op, operand: clone_node(ast, interner, operand, subst) },
        NodeKind::TemplateArgs { base, args } => NodeKind::TemplateArgs {
            base: clone_node(ast, interner, base, subst),
            args: args.into_iter().map(|a| clone_node(ast, interner, a, subst)).collect(),
        },
        NodeKind::OverloadGuide { base, signature } => {
            NodeKind::OverloadGuide { base: clone_node(ast, interner, base, subst), signature: clone_node(ast, interner, signature, subst) }
        }
    };
    ast.push(constructed_as, new_kind, token, end_token)
}

fn clone_func_arg(ast: &mut Ast, interner: &mut Interner, arg: FuncArg, subst: &HashMap<StringId, TypeInfo>) -> FuncArg {
    FuncArg { name: arg.name, ty: clone_node(ast, interner, arg.ty, subst), is_var_arg: arg.is_var_arg }
}

fn clone_catcher(ast: &mut Ast, interner: &mut Interner, c: Catcher, subst: &HashMap<StringId, TypeInfo>) -> Catcher {
    Catcher {
        name: c.name,
        ty: clone_node(ast, interner, c.ty, subst),
        block: clone_node(ast, interner, c.block, subst),
        scope: Cell::new(None),
    }
}

fn clone_match_arm(ast: &mut Ast, interner: &mut Interner, arm: MatchArm, subst: &HashMap<StringId, TypeInfo>) -> MatchArm {
    MatchArm { pattern: clone_pattern(ast, interner, arm.pattern, subst), block: clone_node(ast, interner, arm.block, subst), scope: Cell::new(None) }
}

fn clone_pattern(ast: &mut Ast, interner: &mut Interner, pattern: MatchPattern, subst: &HashMap<StringId, TypeInfo>) -> MatchPattern {
    match pattern {
        MatchPattern::Wildcard => MatchPattern::Wildcard,
        MatchPattern::Binding { name, .. } => MatchPattern::Binding { name, slot: Cell::new(None) },
        MatchPattern::Expr(id) => MatchPattern::Expr(clone_node(ast, interner, id, subst)),
        MatchPattern::Enumerator { path } => MatchPattern::Enumerator { path: clone_node(ast, interner, path, subst) },
        MatchPattern::EnumeratorWithArgs { path, params } => MatchPattern::EnumeratorWithArgs {
            path: clone_node(ast, interner, path, subst),
            params: params
                .into_iter()
                .map(|p| match p {
                    EnumeratorArgPattern::Binding { name, .. } => EnumeratorArgPattern::Binding { name, slot: Cell::new(None) },
                    EnumeratorArgPattern::Expr(id) => EnumeratorArgPattern::Expr(clone_node(ast, interner, id, subst)),
                })
                .collect(),
        },
    }
}

/// Rebuilds a concrete `TypeName` node for a deduced `TypeInfo`, the
/// inverse of `resolve::resolve_type_name`'s builtin-keyword matching —
/// used only to splice a deduced type back into a cloned template body.
fn build_type_name(ast: &mut Ast, interner: &mut Interner, ty: &TypeInfo, is_const: bool, token: crate::token::Token, end_token: crate::token::Token) -> AstId {
    let name = if let Some(kw) = builtins::type_keyword(ty.kind) {
        interner.intern(kw)
    } else {
        ty.name.expect("Instance/Enumerator TypeInfo always carries its declared name")
    };
    let params = ty.params.iter().map(|p| build_type_name(ast, interner, p, p.is_const, token.clone(), end_token.clone())).collect();
    ast.push(crate::ast::ConstructedKind::TypeName, NodeKind::TypeName { name, params, is_const }, token, end_token)
}

fn placeholder() -> ScopeId {
    ScopeId(u32::MAX)
}

#[cfg(test)]
mod tests {
    use crate::ast::{Ast, CalleeDecl, NodeKind};
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::sema::analyze;
    use crate::source::SourceMap;

    fn compile(src: &str) -> (Ast, Interner) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("t.fire", src.to_string());
        let tokens = Lexer::new(&sources, file).lex().expect("lex");
        let mut interner = Interner::new();
        let parser = Parser::new(&tokens, &mut interner);
        let (mut ast, _notes) = parser.parse_program().expect("parse");
        analyze(&mut ast, &mut interner).expect("analyze");
        (ast, interner)
    }

    /// A clone instantiated for `id(1)` must carry the deduced type
    /// (`int`) in its own `TypeName` nodes, never the formal parameter's
    /// own spelling (`T`) — substitution must fully replace every
    /// occurrence, not just make the clone unify with it.
    #[test]
    fn instantiation_does_not_leak_the_formal_type_parameter_name() {
        let (ast, interner) = compile("fn id<T>(x: T) -> T { return x; } fn use_it() -> int { return id(1); }");

        let original = ast.top_level[0];
        let use_it = ast.top_level[1];
        let body = match &ast.get(use_it).kind {
            NodeKind::Function { body, .. } => *body,
            other => panic!("expected a Function node, got {other:?}"),
        };
        let ret_stmt = match &ast.get(body).kind {
            NodeKind::Block { stmts, .. } => stmts[0],
            other => panic!("expected a Block, got {other:?}"),
        };
        let call_id = match &ast.get(ret_stmt).kind {
            NodeKind::Return { value: Some(v) } => *v,
            other => panic!("expected `return id(1);`, got {other:?}"),
        };
        let instantiated = match &*ast.get(call_id).callee_decl.borrow() {
            Some(CalleeDecl::UserFunction(id)) => *id,
            other => panic!("expected a resolved user function call, got {other:?}"),
        };
        assert_ne!(instantiated, original, "instantiation must clone the template, not mutate it in place");

        let (arg_ty, ret_ty) = match &ast.get(instantiated).kind {
            NodeKind::Function { args, return_type, .. } => (args[0].ty, return_type.expect("return type present")),
            other => panic!("expected a Function node, got {other:?}"),
        };
        let name_of = |ty_id: crate::ast::AstId| match &ast.get(ty_id).kind {
            NodeKind::TypeName { name, .. } => interner.resolve(*name).to_string(),
            other => panic!("expected a TypeName, got {other:?}"),
        };
        assert_eq!(name_of(arg_ty), "int");
        assert_eq!(name_of(ret_ty), "int");
    }

    /// Two calls deducing different type arguments (`int` vs `string`)
    /// get independent clones, each carrying only its own deduced type —
    /// substitution must never let one call site's deduced type leak
    /// into another's clone.
    #[test]
    fn distinct_deduced_arguments_get_distinct_clones() {
        let (ast, interner) = compile(
            "fn id<T>(x: T) -> T { return x; } \
             fn use_it() -> int { let a = id(1); let b = id(\"hi\"); return a; }",
        );

        let use_it = ast.top_level[1];
        let body = match &ast.get(use_it).kind {
            NodeKind::Function { body, .. } => *body,
            other => panic!("expected a Function node, got {other:?}"),
        };
        let stmts = match &ast.get(body).kind {
            NodeKind::Block { stmts, .. } => stmts.clone(),
            other => panic!("expected a Block, got {other:?}"),
        };
        let init_of = |stmt: crate::ast::AstId| match &ast.get(stmt).kind {
            NodeKind::VarDef { init: Some(v), .. } => *v,
            other => panic!("expected a VarDef, got {other:?}"),
        };
        let callee_of = |call_id: crate::ast::AstId| match &*ast.get(call_id).callee_decl.borrow() {
            Some(CalleeDecl::UserFunction(id)) => *id,
            other => panic!("expected a resolved user function call, got {other:?}"),
        };
        let a = callee_of(init_of(stmts[0]));
        let b = callee_of(init_of(stmts[1]));
        assert_ne!(a, b);

        let arg_ty_name = |func_id: crate::ast::AstId| match &ast.get(func_id).kind {
            NodeKind::Function { args, .. } => match &ast.get(args[0].ty).kind {
                NodeKind::TypeName { name, .. } => interner.resolve(*name).to_string(),
                other => panic!("expected a TypeName, got {other:?}"),
            },
            other => panic!("expected a Function node, got {other:?}"),
        };
        assert_eq!(arg_ty_name(a), "int");
        assert_eq!(arg_ty_name(b), "string");
    }
}
