//! Type checking and overload resolution (spec.md §4.5).
//!
//! Grounded in `original_source/src/Sema/Sema.cpp`'s two-pass shape
//! (declarations collected while building scopes, then a checking walk)
//! and `SemaCall.cpp`'s overload-resolution algorithm: gather viable
//! candidates by arity/variadic/named-argument binding and per-slot type
//! match, run template deduction for templated candidates, and require
//! exactly one survivor.
//!
//! Every node already carries the scope [`crate::sema::scope_builder`]
//! attached to it (`Node::scope`), so nothing here threads a scope
//! parameter through the recursion — each check step just reads the
//! node's own scope back out.

use crate::ast::{Argument, Ast, AstId, BinOp, CalleeDecl, MatchPattern, NodeKind, Resolution, UnaryOp};
use crate::builtins::members;
use crate::error::{SemaError, SemaErrorKind};
use crate::intern::{Interner, StringId};
use crate::object::Literal;
use crate::scope::{ScopeId, ScopeTree};
use crate::sema::{resolve, template, DeclTable};
use crate::source::Span;
use crate::types::{TypeInfo, TypeKind};

pub fn analyze(ast: &mut Ast, interner: &mut Interner) -> Result<(ScopeTree, DeclTable), SemaError> {
    let (mut tree, mut decls) = crate::sema::build_scope_tree(ast);
    {
        let mut checker = Checker { ast, tree: &mut tree, decls: &mut decls, interner, return_types: Vec::new(), loop_depth: 0 };
        let top_level = checker.ast.top_level.clone();
        for item in top_level {
            checker.check_item(item)?;
        }
    }
    Ok((tree, decls))
}

pub struct Checker<'a> {
    ast: &'a mut Ast,
    tree: &'a mut ScopeTree,
    decls: &'a mut DeclTable,
    interner: &'a mut Interner,
    /// Declared return type of each enclosing function/lambda, innermost
    /// last; `None` means "no declared return type" (implicit `none`).
    return_types: Vec<Option<TypeInfo>>,
    loop_depth: u32,
}

fn node_scope(ast: &Ast, id: AstId) -> ScopeId {
    ast.get(id).scope.get().expect("every node's scope is attached by scope_builder before checking")
}

fn literal_type(lit: &Literal) -> TypeInfo {
    match lit {
        Literal::None => TypeInfo::none(),
        Literal::Int(_) => TypeInfo::simple(TypeKind::Int),
        Literal::Float(_) => TypeInfo::simple(TypeKind::Float),
        Literal::Bool(_) => TypeInfo::simple(TypeKind::Bool),
        Literal::Char(_) => TypeInfo::simple(TypeKind::Char),
        Literal::Size(_) => TypeInfo::simple(TypeKind::Size),
        Literal::String(_) => TypeInfo::simple(TypeKind::String),
    }
}

fn decl_name(ast: &Ast, id: AstId) -> StringId {
    match &ast.get(id).kind {
        NodeKind::Function { name, .. } | NodeKind::Class { name, .. } | NodeKind::Enum { name, .. } => *name,
        _ => unreachable!("decl_name called on a non-declaration node"),
    }
}

impl<'a> Checker<'a> {
    // ---- top level / items --------------------------------------------

    fn check_item(&mut self, id: AstId) -> Result<(), SemaError> {
        match self.ast.get(id).kind.clone() {
            NodeKind::Function { template_params, is_instantiated, .. } => {
                if template_params.is_empty() || is_instantiated {
                    self.check_function_body(id)?;
                }
                Ok(())
            }
            NodeKind::Class { .. } => self.check_class(id),
            NodeKind::Enum { variants, .. } => {
                for v in variants {
                    for f in v.fields {
                        resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, f, node_scope(self.ast, f))?;
                    }
                }
                Ok(())
            }
            NodeKind::Namespace { items, .. } => {
                for item in items {
                    self.check_item(item)?;
                }
                Ok(())
            }
            _ => self.check_stmt(id),
        }
    }

    fn check_function_body(&mut self, id: AstId) -> Result<(), SemaError> {
        let (args, return_type, body, name) = match &self.ast.get(id).kind {
            NodeKind::Function { args, return_type, body, name, .. } => (args.clone(), *return_type, *body, *name),
            _ => unreachable!(),
        };
        let scope = node_scope(self.ast, id);
        for a in &args {
            resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a.ty, scope)?;
        }
        let ret_ty = match return_type {
            Some(r) => Some(resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, scope)?),
            None => None,
        };
        let declares_value = ret_ty.as_ref().is_some_and(|t| t.kind != TypeKind::None);
        self.return_types.push(ret_ty);
        self.check_stmt(body)?;
        self.return_types.pop();

        if declares_value && !self.body_has_value_return(body) {
            return Err(SemaError::new(self.ast.get(id).span(), SemaErrorKind::EmptyReturn(self.interner.resolve(name).to_string())));
        }
        Ok(())
    }

    /// Existence check for "every path returns a value": confirms at
    /// least one `return <expr>;` appears in the body, without crossing
    /// into a nested function/lambda. Full control-flow coverage would
    /// need a CFG; this catches the common "forgot to return" mistake
    /// without it (documented simplification, see DESIGN.md).
    fn body_has_value_return(&self, id: AstId) -> bool {
        match &self.ast.get(id).kind {
            NodeKind::Return { value } => value.is_some(),
            NodeKind::Function { .. } | NodeKind::Lambda { .. } => false,
            _ => crate::ast::walker::children(self.ast, id).iter().any(|&c| self.body_has_value_return(c)),
        }
    }

    fn check_class(&mut self, id: AstId) -> Result<(), SemaError> {
        let (name, base, is_final, methods) = match &self.ast.get(id).kind {
            NodeKind::Class { name, base, is_final, methods, .. } => (*name, *base, *is_final, methods.clone()),
            _ => unreachable!(),
        };
        let _ = is_final;
        let span = self.ast.get(id).span();
        let enclosing = self.tree.get(node_scope(self.ast, id)).parent.unwrap_or(node_scope(self.ast, id));

        let base_decl = if let Some(base_name) = base {
            if base_name == name {
                return Err(SemaError::new(span, SemaErrorKind::InvalidInheritance(format!("`{}` cannot inherit from itself", self.interner.resolve(name)))));
            }
            let Some(base_id) = find_class(self.ast, self.tree, self.decls, base_name, enclosing) else {
                return Err(SemaError::new(span, SemaErrorKind::InvalidInheritance(format!("unknown base class `{}`", self.interner.resolve(base_name)))));
            };
            if let NodeKind::Class { is_final: base_final, .. } = &self.ast.get(base_id).kind {
                if *base_final {
                    return Err(SemaError::new(
                        span,
                        SemaErrorKind::InvalidInheritance(format!("`{}` is final and cannot be inherited from", self.interner.resolve(base_name))),
                    ));
                }
            }
            Some(base_id)
        } else {
            None
        };

        for &method in &methods {
            let (is_override, args, return_type, mname) = match &self.ast.get(method).kind {
                NodeKind::Function { is_override, args, return_type, name, .. } => (*is_override, args.clone(), *return_type, *name),
                _ => unreachable!(),
            };
            if is_override {
                let mscope = node_scope(self.ast, method);
                let arg_tys = args
                    .iter()
                    .map(|a| resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a.ty, mscope))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret_ty = match return_type {
                    Some(r) => Some(resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, mscope)?),
                    None => None,
                };
                let Some(base_id) = base_decl else {
                    return Err(SemaError::new(
                        self.ast.get(method).span(),
                        SemaErrorKind::BadOverride(self.interner.resolve(mname).to_string()),
                    ));
                };
                let method_span = self.ast.get(method).span();
                if !self.find_matching_virtual(base_id, mname, &arg_tys, &ret_ty, method_span)? {
                    return Err(SemaError::new(method_span, SemaErrorKind::BadOverride(self.interner.resolve(mname).to_string())));
                }
            }
        }

        for method in methods {
            let (template_params, is_instantiated) = match &self.ast.get(method).kind {
                NodeKind::Function { template_params, is_instantiated, .. } => (template_params.clone(), *is_instantiated),
                _ => unreachable!(),
            };
            if template_params.is_empty() || is_instantiated {
                self.check_function_body(method)?;
            }
        }
        Ok(())
    }

    /// Looks for the virtual/override method `name` overrides, one
    /// inheritance level at a time. Like `resolve_overload`, exactly one
    /// candidate at a level must match — two sibling virtuals with
    /// unifiable-but-distinct signatures at the same level is ambiguous,
    /// not an arbitrary pick of the first one found.
    fn find_matching_virtual(&self, class_id: AstId, name: StringId, arg_tys: &[TypeInfo], ret_ty: &Option<TypeInfo>, span: Span) -> Result<bool, SemaError> {
        let (base, methods) = match &self.ast.get(class_id).kind {
            NodeKind::Class { base, methods, .. } => (*base, methods.clone()),
            _ => return Ok(false),
        };
        let mut matches_at_level = Vec::new();
        for m in &methods {
            let (mname, is_virtual, is_override, args, return_type) = match &self.ast.get(*m).kind {
                NodeKind::Function { name, is_virtual, is_override, args, return_type, .. } => {
                    (*name, *is_virtual, *is_override, args.clone(), *return_type)
                }
                _ => continue,
            };
            if mname != name || !(is_virtual || is_override) {
                continue;
            }
            if args.len() != arg_tys.len() {
                continue;
            }
            let mscope = node_scope(self.ast, *m);
            let matches = args.iter().zip(arg_tys).all(|(a, t)| {
                resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a.ty, mscope).map(|fty| fty.unifies_with(t)).unwrap_or(false)
            });
            if !matches {
                continue;
            }
            let ret_matches = match (return_type, ret_ty) {
                (None, None) => true,
                (Some(r), Some(t)) => resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, mscope).map(|fty| fty.unifies_with(t)).unwrap_or(false),
                _ => false,
            };
            if ret_matches {
                matches_at_level.push(*m);
            }
        }
        match matches_at_level.len() {
            0 => {}
            1 => return Ok(true),
            _ => return Err(SemaError::new(span, SemaErrorKind::AmbiguousCall(self.interner.resolve(name).to_string()))),
        }
        if let Some(base_name) = base {
            let enclosing = self.tree.get(node_scope(self.ast, class_id)).parent.unwrap_or(node_scope(self.ast, class_id));
            if let Some(base_id) = find_class(self.ast, self.tree, self.decls, base_name, enclosing) {
                return self.find_matching_virtual(base_id, name, arg_tys, ret_ty, span);
            }
        }
        Ok(false)
    }

    // ---- statements ------------------------------------------------------

    fn check_stmt(&mut self, id: AstId) -> Result<(), SemaError> {
        match self.ast.get(id).kind.clone() {
            NodeKind::Block { stmts, .. } => {
                for s in stmts {
                    self.check_stmt(s)?;
                }
                Ok(())
            }
            NodeKind::VarDef { ty, init, .. } => {
                let scope = node_scope(self.ast, id);
                let declared = match ty {
                    Some(t) => Some(resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, t, scope)?),
                    None => None,
                };
                let init_ty = match init {
                    Some(i) => Some(self.check_expr(i)?),
                    None => None,
                };
                if let (Some(d), Some(i)) = (&declared, &init_ty) {
                    if !d.unifies_with(i) {
                        return Err(SemaError::new(
                            self.ast.get(id).span(),
                            SemaErrorKind::TypeMismatch { expected: format!("{d:?}"), found: format!("{i:?}") },
                        ));
                    }
                }
                self.set_local_type(id, declared.or(init_ty).unwrap_or_else(TypeInfo::none));
                Ok(())
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                self.check_expr(cond)?;
                self.check_stmt(then_branch)?;
                if let Some(e) = else_branch {
                    self.check_stmt(e)?;
                }
                Ok(())
            }
            NodeKind::While { cond, body } => {
                self.check_expr(cond)?;
                self.loop_depth += 1;
                let result = self.check_stmt(body);
                self.loop_depth -= 1;
                result
            }
            NodeKind::Break | NodeKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(SemaError::new(self.ast.get(id).span(), SemaErrorKind::Other("break/continue outside of a loop".to_string())));
                }
                Ok(())
            }
            NodeKind::Return { value } => {
                let declared = self.return_types.last().cloned().flatten();
                match (value, &declared) {
                    (Some(v), Some(d)) => {
                        let vt = self.check_expr(v)?;
                        if d.kind != TypeKind::None && !d.unifies_with(&vt) {
                            return Err(SemaError::new(
                                self.ast.get(id).span(),
                                SemaErrorKind::TypeMismatch { expected: format!("{d:?}"), found: format!("{vt:?}") },
                            ));
                        }
                        Ok(())
                    }
                    (Some(v), None) => {
                        self.check_expr(v)?;
                        Ok(())
                    }
                    (None, _) => Ok(()),
                }
            }
            NodeKind::Throw { value } => {
                self.check_expr(value)?;
                Ok(())
            }
            NodeKind::TryCatch { try_block, catchers } => {
                self.check_stmt(try_block)?;
                for c in catchers {
                    resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, c.ty, node_scope(self.ast, c.block))?;
                    self.check_stmt(c.block)?;
                }
                Ok(())
            }
            NodeKind::Match { .. } => {
                self.check_expr(id)?;
                Ok(())
            }
            NodeKind::Function { .. } => self.check_item(id),
            _ => {
                self.check_expr(id)?;
                Ok(())
            }
        }
    }

    fn set_local_type(&mut self, vardef_id: AstId, ty: TypeInfo) {
        let scope = node_scope(self.ast, vardef_id);
        let name = match &self.ast.get(vardef_id).kind {
            NodeKind::VarDef { name, .. } => *name,
            _ => unreachable!(),
        };
        if let Some(local) = self.tree.get_mut(scope).locals.iter_mut().rev().find(|l| l.name == name && l.declaring_node == vardef_id) {
            local.ty = Some(ty);
            local.is_type_deducted = true;
        }
    }

    // ---- expressions -------------------------------------------------------

    fn check_expr(&mut self, id: AstId) -> Result<TypeInfo, SemaError> {
        let span = self.ast.get(id).span();
        let ty = match self.ast.get(id).kind.clone() {
            NodeKind::Value(lit) => literal_type(&lit),
            NodeKind::Identifier { name } => {
                let scope = node_scope(self.ast, id);
                let res = resolve::resolve_identifier(self.ast, self.tree, self.decls, self.interner, name, scope)
                    .ok_or_else(|| SemaError::new(span, SemaErrorKind::UnknownName(self.interner.resolve(name).to_string())))?;
                let ty = resolution_type(&res);
                *self.ast.get(id).resolution.borrow_mut() = Some(res);
                ty
            }
            NodeKind::ScopeResol { first, rest } => {
                let scope = node_scope(self.ast, id);
                let res = resolve::resolve_scope_path(self.ast, self.tree, self.decls, self.interner, first, &rest, scope, span)?;
                let ty = resolution_type(&res);
                *self.ast.get(id).resolution.borrow_mut() = Some(res);
                ty
            }
            NodeKind::Array(items) => {
                let mut elem = TypeInfo::none();
                for &it in &items {
                    elem = self.check_expr(it)?;
                }
                TypeInfo::generic(TypeKind::Vector, vec![elem])
            }
            NodeKind::IndexRef { base, index } => {
                let base_ty = self.check_expr(base)?;
                self.check_expr(index)?;
                match base_ty.kind {
                    TypeKind::Vector | TypeKind::Dict => base_ty.params.first().cloned().unwrap_or_else(TypeInfo::none),
                    TypeKind::String => TypeInfo::simple(TypeKind::Char),
                    _ => TypeInfo::simple(TypeKind::Unknown),
                }
            }
            NodeKind::MemberAccess { base, member } => self.check_member_access(id, base, member, span)?,
            NodeKind::CallFunc { callee, args } => self.check_call(id, callee, &args, span)?,
            NodeKind::Binary { op, lhs, rhs } => {
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                binop_result_type(op, &lt, &rt, span)?
            }
            NodeKind::Assign { lhs, rhs } => {
                self.check_writable(lhs)?;
                let lt = self.check_expr(lhs)?;
                let rt = self.check_expr(rhs)?;
                if lt.kind != TypeKind::Unknown && rt.kind != TypeKind::Unknown && !lt.unifies_with(&rt) {
                    return Err(SemaError::new(span, SemaErrorKind::TypeMismatch { expected: format!("{lt:?}"), found: format!("{rt:?}") }));
                }
                lt
            }
            NodeKind::Unary { op, operand } => {
                let ot = self.check_expr(operand)?;
                match op {
                    UnaryOp::Not => TypeInfo::simple(TypeKind::Bool),
                    UnaryOp::Neg => ot,
                    UnaryOp::BitNot => ot,
                }
            }
            NodeKind::Match { scrutinee, arms } => self.check_match(scrutinee, &arms, span)?,
            NodeKind::Lambda { args, return_type, body, .. } => {
                let scope = node_scope(self.ast, id);
                for a in &args {
                    resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a.ty, scope)?;
                }
                let ret_ty = match return_type {
                    Some(r) => Some(resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, scope)?),
                    None => None,
                };
                self.return_types.push(ret_ty);
                self.check_stmt(body)?;
                self.return_types.pop();
                TypeInfo::simple(TypeKind::Function)
            }
            NodeKind::TemplateArgs { base, args } => self.check_template_args(base, &args, span)?,
            NodeKind::OverloadGuide { base, signature } => self.check_overload_guide(base, signature, span)?,
            NodeKind::Signature { .. } | NodeKind::TypeName { .. } => TypeInfo::simple(TypeKind::TypeName),
            other => unreachable!("check_expr called on a non-expression node: {other:?}"),
        };
        *self.ast.get(id).ty.borrow_mut() = Some(ty.clone());
        Ok(ty)
    }

    fn check_writable(&mut self, id: AstId) -> Result<(), SemaError> {
        let span = self.ast.get(id).span();
        match &self.ast.get(id).kind {
            NodeKind::Identifier { .. } | NodeKind::IndexRef { .. } | NodeKind::MemberAccess { .. } => Ok(()),
            _ => Err(SemaError::new(span, SemaErrorKind::NotWritable)),
        }
    }

    fn check_member_access(&mut self, id: AstId, base: AstId, member: StringId, span: Span) -> Result<TypeInfo, SemaError> {
        let base_ty = self.check_expr(base)?;
        if base_ty.kind == TypeKind::Instance {
            let class_id = base_ty.decl.expect("Instance TypeInfo always carries its class decl");
            if let Some((index, ty)) = self.find_class_field(class_id, member) {
                *self.ast.get(id).resolution.borrow_mut() = Some(Resolution::MemberVariable { index, ty: ty.clone() });
                return Ok(ty);
            }
            if self.find_class_method(class_id, member).is_some() {
                // `index` doesn't address anything at runtime: dispatch for
                // a member call is by name against the instance's actual
                // class chain, so virtual overrides resolve correctly
                // (DESIGN.md, "Member dispatch").
                *self.ast.get(id).resolution.borrow_mut() = Some(Resolution::MemberFunction { index: 0 });
                return Ok(TypeInfo::simple(TypeKind::Function));
            }
            return Err(SemaError::new(span, SemaErrorKind::UnknownName(self.interner.resolve(member).to_string())));
        }
        if base_ty.kind == TypeKind::Module {
            // A module's members are the imported file's top-level
            // declarations, typed only once evaluation actually looks them
            // up; statically they're `Unknown` (DESIGN.md, "Import typing").
            return Ok(TypeInfo::simple(TypeKind::Unknown));
        }
        let name = self.interner.resolve(member);
        if members::has_member(base_ty.kind, name) {
            return Ok(builtin_member_return_type(base_ty.kind, name));
        }
        Err(SemaError::new(span, SemaErrorKind::UnknownName(name.to_string())))
    }

    /// Field lookup across the inheritance chain; returns the field's
    /// absolute slot index in `Instance::fields` (base fields first, own
    /// fields last, matching how the evaluator lays out a constructed
    /// instance) and its declared type.
    fn find_class_field(&self, class_id: AstId, member: StringId) -> Option<(u32, TypeInfo)> {
        let layout = class_field_layout(self.ast, self.tree, self.decls, self.interner, class_id);
        layout.iter().position(|(n, _)| *n == member).map(|i| (i as u32, layout[i].1.clone()))
    }

    fn find_class_method(&self, class_id: AstId, member: StringId) -> Option<AstId> {
        let (base, methods) = match &self.ast.get(class_id).kind {
            NodeKind::Class { base, methods, .. } => (*base, methods.clone()),
            _ => return None,
        };
        if let Some(&m) = methods.iter().find(|&&m| matches!(&self.ast.get(m).kind, NodeKind::Function { name, .. } if *name == member)) {
            return Some(m);
        }
        let base_name = base?;
        let enclosing = self.tree.get(node_scope(self.ast, class_id)).parent.unwrap_or(node_scope(self.ast, class_id));
        let base_id = find_class(self.ast, self.tree, self.decls, base_name, enclosing)?;
        self.find_class_method(base_id, member)
    }

    fn check_match(&mut self, scrutinee: AstId, arms: &[crate::ast::MatchArm], span: Span) -> Result<TypeInfo, SemaError> {
        let scrut_ty = self.check_expr(scrutinee)?;
        for arm in arms {
            match &arm.pattern {
                MatchPattern::Wildcard => {}
                MatchPattern::Binding { slot, .. } => {
                    let arm_scope = arm.scope.get().expect("match arm scope attached by scope_builder");
                    let name = match &arm.pattern {
                        MatchPattern::Binding { name, .. } => *name,
                        _ => unreachable!(),
                    };
                    if let Some(local) = self.tree.get_mut(arm_scope).locals.iter_mut().find(|l| l.name == name) {
                        local.ty = Some(scrut_ty.clone());
                        slot.set(Some(crate::ast::LocalSlot { distance: 0, index: local.index + local.index_add }));
                    }
                }
                MatchPattern::Expr(e) => {
                    let et = self.check_expr(*e)?;
                    if !et.unifies_with(&scrut_ty) {
                        return Err(SemaError::new(span, SemaErrorKind::TypeMismatch { expected: format!("{scrut_ty:?}"), found: format!("{et:?}") }));
                    }
                }
                MatchPattern::Enumerator { path } | MatchPattern::EnumeratorWithArgs { path, .. } => {
                    let path_res = self.check_expr(*path)?;
                    if scrut_ty.kind != TypeKind::Enumerator || path_res.kind != TypeKind::Enumerator {
                        return Err(SemaError::new(span, SemaErrorKind::Other("match arm pattern is not an enumerator of the scrutinee's type".to_string())));
                    }
                    if let MatchPattern::EnumeratorWithArgs { params, .. } = &arm.pattern {
                        let variant = match &*self.ast.get(*path).resolution.borrow() {
                            Some(Resolution::Enumerator { enum_decl, variant }) => Some((*enum_decl, *variant)),
                            _ => None,
                        };
                        if let Some((enum_decl, variant)) = variant {
                            let fields = match &self.ast.get(enum_decl).kind {
                                NodeKind::Enum { variants, .. } => variants[variant as usize].fields.clone(),
                                _ => Vec::new(),
                            };
                            let arm_scope = arm.scope.get().expect("match arm scope attached by scope_builder");
                            let mut field_tys = Vec::new();
                            for &f in &fields {
                                field_tys.push(resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, f, arm_scope)?);
                            }
                            for (p, fty) in params.iter().zip(field_tys) {
                                if let crate::ast::EnumeratorArgPattern::Binding { name, slot } = p {
                                    if let Some(local) = self.tree.get_mut(arm_scope).locals.iter_mut().find(|l| l.name == *name) {
                                        local.ty = Some(fty);
                                        slot.set(Some(crate::ast::LocalSlot { distance: 0, index: local.index + local.index_add }));
                                    }
                                }
                            }
                        }
                    }
                }
            }
            self.check_stmt(arm.block)?;
        }
        Ok(TypeInfo::none())
    }

    fn check_template_args(&mut self, base: AstId, args: &[AstId], span: Span) -> Result<TypeInfo, SemaError> {
        let scope = node_scope(self.ast, base);
        let explicit = args
            .iter()
            .map(|&a| resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let base_ty = self.check_expr(base)?;
        let _ = base_ty;
        let Some(Resolution::FuncName(candidates)) = self.ast.get(base).resolution.borrow().clone() else {
            return Err(SemaError::new(span, SemaErrorKind::Other("`@<...>` applied to something that is not a function name".to_string())));
        };
        let templated: Vec<AstId> = candidates
            .iter()
            .copied()
            .filter(|&c| matches!(&self.ast.get(c).kind, NodeKind::Function { template_params, .. } if template_params.len() == explicit.len()))
            .collect();
        if templated.len() != 1 {
            return Err(SemaError::new(span, SemaErrorKind::AmbiguousCall("template argument list does not pick a single overload".to_string())));
        }
        let func_id = templated[0];
        let subst = template::deduce(self.ast, func_id, &explicit, &[], span, self.interner)?;
        let instantiated = template::instantiate(self.ast, self.tree, self.decls, self.interner, func_id, &subst, scope);
        self.check_function_body(instantiated)?;
        let node = self.ast.get(base);
        *node.resolution.borrow_mut() = Some(Resolution::FuncName(vec![instantiated]));
        Ok(TypeInfo::simple(TypeKind::Function))
    }

    fn check_overload_guide(&mut self, base: AstId, signature: AstId, span: Span) -> Result<TypeInfo, SemaError> {
        let scope = node_scope(self.ast, signature);
        let (params, ret) = match &self.ast.get(signature).kind {
            NodeKind::Signature { params, ret } => (params.clone(), *ret),
            _ => unreachable!(),
        };
        let param_tys = params
            .iter()
            .map(|&p| resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, p, scope))
            .collect::<Result<Vec<_>, _>>()?;
        let ret_ty = resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, ret, scope)?;

        self.check_expr(base)?;
        let Some(Resolution::FuncName(candidates)) = self.ast.get(base).resolution.borrow().clone() else {
            return Ok(TypeInfo::simple(TypeKind::Function));
        };
        let matches: Vec<AstId> = candidates
            .iter()
            .copied()
            .filter(|&c| {
                let (args, return_type) = match &self.ast.get(c).kind {
                    NodeKind::Function { args, return_type, .. } => (args.clone(), *return_type),
                    _ => return false,
                };
                if args.len() != param_tys.len() {
                    return false;
                }
                let cscope = node_scope(self.ast, c);
                let args_ok = args.iter().zip(&param_tys).all(|(a, t)| {
                    resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, a.ty, cscope).map(|fty| fty.unifies_with(t)).unwrap_or(false)
                });
                let ret_ok = match return_type {
                    Some(r) => resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, cscope).map(|fty| fty.unifies_with(&ret_ty)).unwrap_or(false),
                    None => ret_ty.kind == TypeKind::None,
                };
                args_ok && ret_ok
            })
            .collect();
        if matches.is_empty() {
            return Err(SemaError::new(span, SemaErrorKind::NoMatch("of (...) -> ... guide".to_string())));
        }
        *self.ast.get(base).resolution.borrow_mut() = Some(Resolution::FuncName(matches));
        Ok(TypeInfo::simple(TypeKind::Function))
    }

    fn check_call(&mut self, call_id: AstId, callee: AstId, args: &[Argument], span: Span) -> Result<TypeInfo, SemaError> {
        self.check_expr(callee)?;
        let res = self.ast.get(callee).resolution.borrow().clone();
        let arg_tys: Vec<TypeInfo> = args.iter().map(|a| self.check_expr(a.value)).collect::<Result<_, _>>()?;

        match res {
            Some(Resolution::FuncName(candidates)) => {
                let (chosen, ret_ty) = self.resolve_overload(&candidates, args, &arg_tys, span, "function")?;
                *self.ast.get(call_id).callee_decl.borrow_mut() = Some(CalleeDecl::UserFunction(chosen));
                Ok(ret_ty)
            }
            Some(Resolution::BuiltinFuncName(name)) => {
                *self.ast.get(call_id).callee_decl.borrow_mut() = Some(CalleeDecl::Builtin(name));
                Ok(builtin_free_function_return_type(name))
            }
            Some(Resolution::ClassName(class_id)) => {
                let name = decl_name(self.ast, class_id);
                let ctor_candidates: Vec<AstId> = match &self.ast.get(class_id).kind {
                    NodeKind::Class { methods, .. } => methods.iter().copied().filter(|&m| decl_name(self.ast, m) == name).collect(),
                    _ => Vec::new(),
                };
                if ctor_candidates.is_empty() {
                    if !args.is_empty() {
                        return Err(SemaError::new(span, SemaErrorKind::NoMatch(self.interner.resolve(name).to_string())));
                    }
                } else {
                    let (chosen, _) = self.resolve_overload(&ctor_candidates, args, &arg_tys, span, "constructor")?;
                    *self.ast.get(call_id).callee_decl.borrow_mut() = Some(CalleeDecl::Ctor(chosen));
                    return Ok(TypeInfo::instance(name, class_id));
                }
                *self.ast.get(call_id).callee_decl.borrow_mut() = Some(CalleeDecl::Ctor(class_id));
                Ok(TypeInfo::instance(name, class_id))
            }
            Some(Resolution::Enumerator { enum_decl, variant }) => {
                let fields = match &self.ast.get(enum_decl).kind {
                    NodeKind::Enum { variants, .. } => variants[variant as usize].fields.clone(),
                    _ => Vec::new(),
                };
                if fields.len() != args.len() {
                    return Err(SemaError::new(span, SemaErrorKind::NoMatch("enumerator constructor".to_string())));
                }
                let enum_scope = node_scope(self.ast, enum_decl);
                for (&f, at) in fields.iter().zip(&arg_tys) {
                    let ft = resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, f, enum_scope)?;
                    if !ft.unifies_with(at) {
                        return Err(SemaError::new(span, SemaErrorKind::TypeMismatch { expected: format!("{ft:?}"), found: format!("{at:?}") }));
                    }
                }
                *self.ast.get(call_id).callee_decl.borrow_mut() = Some(CalleeDecl::EnumeratorCtor { enum_decl, variant });
                Ok(TypeInfo::enumerator(decl_name(self.ast, enum_decl), enum_decl))
            }
            _ => {
                if let NodeKind::MemberAccess { base, member } = self.ast.get(callee).kind.clone() {
                    return self.check_member_call(base, member, args, &arg_tys, span);
                }
                // Calling an arbitrary Function-typed expression (e.g. a
                // lambda held in a variable): resolved dynamically by the
                // evaluator, no static `callee_decl` to assign.
                Ok(TypeInfo::simple(TypeKind::Unknown))
            }
        }
    }

    fn check_member_call(&mut self, base: AstId, member: StringId, args: &[Argument], arg_tys: &[TypeInfo], span: Span) -> Result<TypeInfo, SemaError> {
        let base_ty = self.ast.get(base).ty.borrow().clone().unwrap_or_else(TypeInfo::none);
        if base_ty.kind == TypeKind::Instance {
            let class_id = base_ty.decl.expect("Instance TypeInfo always carries its class decl");
            let Some(method_id) = self.find_class_method(class_id, member) else {
                return Err(SemaError::new(span, SemaErrorKind::UnknownName(self.interner.resolve(member).to_string())));
            };
            // The static candidate picked here is only used to type the
            // call; actual dispatch at runtime is by name against the
            // instance's real class chain so virtual overrides resolve
            // correctly (DESIGN.md, "Member dispatch").
            let (_, ret_ty) = self.resolve_overload(&[method_id], args, arg_tys, span, "method")?;
            return Ok(ret_ty);
        }
        if base_ty.kind == TypeKind::Module {
            for a in args {
                self.check_expr(a.value)?;
            }
            return Ok(TypeInfo::simple(TypeKind::Unknown));
        }
        let name = self.interner.resolve(member);
        if members::has_member(base_ty.kind, name) {
            return Ok(builtin_member_return_type(base_ty.kind, name));
        }
        Err(SemaError::new(span, SemaErrorKind::UnknownName(name.to_string())))
    }

    /// Runs overload resolution over `candidates` (all `Function` nodes):
    /// binds positional/named arguments to declared parameter slots,
    /// runs template deduction for templated candidates, and keeps every
    /// candidate whose slots all type-check. Exactly one survivor wins.
    fn resolve_overload(&mut self, candidates: &[AstId], args: &[Argument], arg_tys: &[TypeInfo], span: Span, what: &str) -> Result<(AstId, TypeInfo), SemaError> {
        let mut viable: Vec<(AstId, TypeInfo)> = Vec::new();
        let mut last_err: Option<SemaError> = None;

        for &cand in candidates {
            let (template_params, fargs, return_type) = match &self.ast.get(cand).kind {
                NodeKind::Function { template_params, args: fargs, return_type, .. } => (template_params.clone(), fargs.clone(), *return_type),
                _ => continue,
            };
            let bound = match bind_args(fargs.len(), |i| fargs[i].name, |i| fargs[i].is_var_arg, args) {
                Ok(b) => b,
                Err(e) => {
                    last_err = Some(SemaError::new(span, e));
                    continue;
                }
            };
            let cscope = node_scope(self.ast, cand);

            if !template_params.is_empty() {
                let explicit: Vec<TypeInfo> = Vec::new();
                let per_slot_tys: Vec<TypeInfo> = bound.iter().map(|&i| arg_tys[i].clone()).collect();
                match template::deduce(self.ast, cand, &explicit, &per_slot_tys, span, self.interner) {
                    Ok(subst) => {
                        let scope = node_scope(self.ast, cand);
                        let instantiated = template::instantiate(self.ast, self.tree, self.decls, self.interner, cand, &subst, scope);
                        if let Err(e) = self.check_function_body(instantiated) {
                            last_err = Some(e);
                            continue;
                        }
                        let ret_ty = match return_type {
                            Some(_) => match &self.ast.get(instantiated).kind {
                                NodeKind::Function { return_type: Some(r), .. } => {
                                    let r = *r;
                                    resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, node_scope(self.ast, instantiated))?
                                }
                                _ => TypeInfo::none(),
                            },
                            None => TypeInfo::none(),
                        };
                        viable.push((instantiated, ret_ty));
                    }
                    Err(e) => last_err = Some(e),
                }
                continue;
            }

            let mut ok = true;
            for (slot, &farg_idx) in bound.iter().enumerate() {
                let declared = match resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, fargs[slot].ty, cscope) {
                    Ok(t) => t,
                    Err(e) => {
                        last_err = Some(e);
                        ok = false;
                        break;
                    }
                };
                if !declared.unifies_with(&arg_tys[farg_idx]) {
                    ok = false;
                    break;
                }
            }
            if !ok {
                continue;
            }
            let ret_ty = match return_type {
                Some(r) => resolve::resolve_type_name(self.ast, self.tree, self.decls, self.interner, r, cscope)?,
                None => TypeInfo::none(),
            };
            viable.push((cand, ret_ty));
        }

        match viable.len() {
            0 => Err(last_err.unwrap_or_else(|| SemaError::new(span, SemaErrorKind::NoMatch(what.to_string())))),
            1 => Ok(viable.remove(0)),
            _ => Err(SemaError::new(span, SemaErrorKind::AmbiguousCall(what.to_string()))),
        }
    }
}

/// Maps each declared parameter slot to the index of the call-site
/// argument bound to it: positional arguments fill left-to-right (a
/// trailing variadic slot absorbs every remaining positional argument,
/// represented by its first one), named arguments fill by name. Errs on
/// an unfilled non-variadic slot or a name bound twice.
fn bind_args(
    nparams: usize,
    name_of: impl Fn(usize) -> StringId,
    is_var_arg: impl Fn(usize) -> bool,
    args: &[Argument],
) -> Result<Vec<usize>, SemaErrorKind> {
    let mut bound: Vec<Option<usize>> = vec![None; nparams];
    let mut next_positional = 0usize;
    for (i, a) in args.iter().enumerate() {
        if let Some(n) = a.name {
            let Some(slot) = (0..nparams).find(|&s| name_of(s) == n) else {
                return Err(SemaErrorKind::Other("no such named parameter".to_string()));
            };
            if bound[slot].is_some() {
                return Err(SemaErrorKind::Other("argument bound twice".to_string()));
            }
            bound[slot] = Some(i);
        } else {
            while next_positional < nparams && bound[next_positional].is_some() {
                next_positional += 1;
            }
            if next_positional >= nparams {
                if nparams > 0 && is_var_arg(nparams - 1) {
                    bound[nparams - 1] = bound[nparams - 1].or(Some(i));
                    continue;
                }
                return Err(SemaErrorKind::NoMatch("too many positional arguments".to_string()));
            }
            bound[next_positional] = Some(i);
            next_positional += 1;
        }
    }
    bound
        .into_iter()
        .enumerate()
        .map(|(slot, v)| v.ok_or_else(|| SemaErrorKind::MissingArgument(format!("parameter #{slot}"))))
        .collect()
}

fn resolution_type(res: &Resolution) -> TypeInfo {
    match res {
        Resolution::Variable { ty, .. } => ty.clone(),
        Resolution::FuncName(_) | Resolution::BuiltinFuncName(_) => TypeInfo::simple(TypeKind::Function),
        Resolution::EnumName(_) | Resolution::ClassName(_) | Resolution::BuiltinTypeName(_) => TypeInfo::simple(TypeKind::TypeName),
        Resolution::Enumerator { enum_decl, .. } => TypeInfo::enumerator(None, *enum_decl),
        Resolution::MemberVariable { ty, .. } => ty.clone(),
        Resolution::MemberFunction { .. } => TypeInfo::simple(TypeKind::Function),
        Resolution::Namespace(_) => TypeInfo::simple(TypeKind::Module),
    }
}

fn binop_result_type(op: BinOp, lhs: &TypeInfo, rhs: &TypeInfo, span: Span) -> Result<TypeInfo, SemaError> {
    use BinOp::{Add, Div, Mod, Mul, Sub};
    match op {
        Add | Sub | Mul | Div | Mod => {
            if lhs.kind == TypeKind::String && matches!(op, Add) && matches!(rhs.kind, TypeKind::String | TypeKind::Char) {
                return Ok(TypeInfo::simple(TypeKind::String));
            }
            if lhs.kind == TypeKind::Char && rhs.kind == TypeKind::String && matches!(op, Add) {
                return Ok(TypeInfo::simple(TypeKind::String));
            }
            if lhs.kind == TypeKind::Vector && matches!(op, Add) {
                return Ok(lhs.clone());
            }
            if lhs.kind == TypeKind::String && rhs.kind == TypeKind::Int && matches!(op, Mul) {
                return Ok(TypeInfo::simple(TypeKind::String));
            }
            if lhs.kind == TypeKind::Vector && rhs.kind == TypeKind::Int && matches!(op, Mul) {
                return Ok(lhs.clone());
            }
            if lhs.kind == TypeKind::Unknown || rhs.kind == TypeKind::Unknown {
                return Ok(lhs.clone());
            }
            if !lhs.is_numeric() || !rhs.is_numeric() || lhs.kind != rhs.kind {
                return Err(SemaError::new(span, SemaErrorKind::TypeMismatch { expected: format!("{lhs:?}"), found: format!("{rhs:?}") }));
            }
            Ok(lhs.clone())
        }
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::And | BinOp::Or => Ok(TypeInfo::simple(TypeKind::Bool)),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => Ok(lhs.clone()),
    }
}

fn builtin_member_return_type(kind: TypeKind, name: &str) -> TypeInfo {
    match name {
        "length" => TypeInfo::simple(TypeKind::Size),
        "abs" => TypeInfo::simple(kind),
        "to_upper" | "to_lower" => TypeInfo::simple(TypeKind::String),
        "push" => TypeInfo::none(),
        _ => TypeInfo::simple(TypeKind::Unknown),
    }
}

fn builtin_free_function_return_type(name: &str) -> TypeInfo {
    match name {
        "println" | "print" => TypeInfo::none(),
        "import" => TypeInfo::simple(TypeKind::Module),
        _ => TypeInfo::simple(TypeKind::Unknown),
    }
}

/// Absolute field layout for a class: base fields (recursively) first,
/// then this class's own fields, in declaration order.
fn class_field_layout(ast: &Ast, tree: &ScopeTree, decls: &DeclTable, interner: &Interner, class_id: AstId) -> Vec<(StringId, TypeInfo)> {
    let (base, fields, scope) = match &ast.get(class_id).kind {
        NodeKind::Class { base, fields, .. } => (*base, fields.clone(), node_scope(ast, class_id)),
        _ => return Vec::new(),
    };
    let mut out = if let Some(base_name) = base {
        let enclosing = tree.get(scope).parent.unwrap_or(scope);
        find_class(ast, tree, decls, base_name, enclosing)
            .map(|b| class_field_layout(ast, tree, decls, interner, b))
            .unwrap_or_default()
    } else {
        Vec::new()
    };
    for f in fields {
        if let NodeKind::VarDef { name, ty, .. } = &ast.get(f).kind {
            let ty = ty
                .and_then(|t| resolve::resolve_type_name(ast, tree, decls, interner, t, scope).ok())
                .unwrap_or_else(TypeInfo::none);
            out.push((*name, ty));
        }
    }
    out
}

fn find_class(ast: &Ast, tree: &ScopeTree, decls: &DeclTable, name: StringId, scope: ScopeId) -> Option<AstId> {
    for anc in tree.ancestors(scope) {
        if let Some(entries) = decls.lookup(anc, name) {
            if let Some(&id) = entries.iter().find(|&&id| matches!(&ast.get(id).kind, NodeKind::Class { .. })) {
                return Some(id);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use crate::error::SemaErrorKind;
    use crate::intern::Interner;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::sema::analyze;
    use crate::source::SourceMap;

    fn analyze_src(src: &str) -> Result<(), String> {
        let mut sources = SourceMap::new();
        let file = sources.add_file("t.fire", src.to_string());
        let tokens = Lexer::new(&sources, file).lex().expect("lex");
        let mut interner = Interner::new();
        let parser = Parser::new(&tokens, &mut interner);
        let (mut ast, _notes) = parser.parse_program().expect("parse");
        analyze(&mut ast, &mut interner).map(|_| ()).map_err(|e| format!("{:?}", e.kind))
    }

    #[test]
    fn a_declared_return_type_with_no_return_anywhere_is_rejected() {
        let err = analyze_src("fn f() -> int { let x = 1; }").unwrap_err();
        assert!(err.contains("EmptyReturn"), "expected an EmptyReturn error, got {err}");
    }

    #[test]
    fn a_return_on_only_one_branch_is_accepted() {
        // `body_has_value_return` checks existence, not exhaustive
        // control-flow coverage (documented simplification above): a
        // `return` reachable on only one branch of an `if` still counts.
        analyze_src("fn f(b: bool) -> int { if (b) { return 1; } }").expect("existence check accepts a partial return");
    }

    #[test]
    fn a_return_inside_a_nested_lambda_does_not_satisfy_the_outer_function() {
        let err = analyze_src("fn outer() -> int { let f = lambda() -> int { return 1; }; }").unwrap_err();
        assert!(err.contains("EmptyReturn"));
    }

    #[test]
    fn a_bare_identifier_resolves_an_enum_variant() {
        analyze_src("enum Opt { None, Some(int) } fn f() -> Opt { return Some(1); }").expect("bare variant construction should resolve");
    }

    #[test]
    fn two_sibling_virtuals_matching_one_override_is_ambiguous() {
        let err = analyze_src(
            "class Base { \
                virtual fn f(self: Base, x: int) -> int { return x; } \
                virtual fn f(self: Base, x: int) -> int { return x + 1; } \
             } \
             class D : Base { override fn f(self: Base, x: int) -> int { return x; } }",
        )
        .unwrap_err();
        assert!(err.contains("AmbiguousCall"), "expected an ambiguity error, got {err}");
    }
}
