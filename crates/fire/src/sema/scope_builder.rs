//! Builds the lexical [`ScopeTree`] from a completed AST in a single
//! top-down walk, before the checking pass runs (spec.md §4.4).
//!
//! Grounded in `original_source/include/Sema/ScopeContext.h`'s
//! scope-creation rules: a new scope per block/function/class/enum, and
//! namespaces of the same name under the same parent merged into one.
//! Alongside the scope tree, this pass also builds a [`DeclTable`] that
//! records which function/class/enum each scope directly declares, used
//! by the resolver to look up call targets and type names.

use crate::ast::{Ast, AstId, NodeKind};
use crate::intern::StringId;
use crate::scope::{LocalVar, ScopeId, ScopeKind, ScopeTree};
use std::collections::HashMap;

/// Maps `(scope, name)` to every function/class/enum declared directly
/// in that scope. Functions may repeat (overloading); classes and enums
/// never do (spec.md §4.3, "Overload resolution").
#[derive(Default)]
pub struct DeclTable {
    entries: HashMap<(ScopeId, StringId), Vec<AstId>>,
}

impl DeclTable {
    pub fn lookup(&self, scope: ScopeId, name: StringId) -> Option<&[AstId]> {
        self.entries.get(&(scope, name)).map(Vec::as_slice)
    }

    /// Every declaration made directly in `scope`, regardless of its own
    /// name — used to search enum variants, which are not indexed by the
    /// enum's own name.
    pub fn declared_in(&self, scope: ScopeId) -> impl Iterator<Item = AstId> + '_ {
        self.entries.iter().filter(move |((s, _), _)| *s == scope).flat_map(|(_, ids)| ids.iter().copied())
    }

    fn insert(&mut self, scope: ScopeId, name: StringId, decl: AstId) {
        self.entries.entry((scope, name)).or_default().push(decl);
    }
}

pub struct ScopeBuilder<'a> {
    ast: &'a mut Ast,
    tree: &'a mut ScopeTree,
    decls: DeclTable,
}

pub fn build_scope_tree(ast: &mut Ast) -> (ScopeTree, DeclTable) {
    let mut tree = ScopeTree::new();
    let root = tree.root();
    let decls = {
        let mut builder = ScopeBuilder { ast, tree: &mut tree, decls: DeclTable::default() };
        let top_level = builder.ast.top_level.clone();
        for item in top_level {
            builder.visit(item, root);
        }
        builder.decls
    };
    tree.compute_stack_sizes(root);
    (tree, decls)
}

/// Re-runs scope building over a single freshly cloned subtree (used by
/// template instantiation, which appends new nodes rather than mutating
/// the original template body — spec.md §4.3).
pub fn attach_subtree_scope(ast: &mut Ast, tree: &mut ScopeTree, decls: &mut DeclTable, id: AstId, enclosing_scope: ScopeId) {
    let mut builder = ScopeBuilder { ast, tree, decls: std::mem::take(decls) };
    builder.visit(id, enclosing_scope);
    *decls = builder.decls;
}

impl<'a> ScopeBuilder<'a> {
    fn declare(&mut self, scope: ScopeId, name: StringId, is_argument: bool, declaring_node: AstId) {
        self.tree.declare_local(
            scope,
            LocalVar {
                name,
                ty: None,
                is_type_deducted: false,
                is_argument,
                declaring_node,
                index: 0,
                index_add: 0,
            },
        );
    }

    fn set_inline_scope(&mut self, id: AstId, scope: ScopeId) {
        match &mut self.ast.get_mut(id).kind {
            NodeKind::Block { scope: s, .. }
            | NodeKind::Function { scope: s, .. }
            | NodeKind::Lambda { scope: s, .. }
            | NodeKind::Enum { scope: s, .. }
            | NodeKind::Class { scope: s, .. }
            | NodeKind::Namespace { scope: s, .. } => *s = scope,
            _ => {}
        }
    }

    fn visit(&mut self, id: AstId, scope: ScopeId) {
        self.ast.get(id).scope.set(Some(scope));
        match self.ast.get(id).kind.clone_shape() {
            NodeShape::Block(stmts) => {
                let block_scope = self.tree.push(ScopeKind::Block, Some(scope), None, Some(id));
                self.set_inline_scope(id, block_scope);
                for stmt in stmts {
                    self.visit(stmt, block_scope);
                }
            }
            NodeShape::VarDef { name, ty, init } => {
                if let Some(t) = ty {
                    self.visit(t, scope);
                }
                if let Some(i) = init {
                    self.visit(i, scope);
                }
                self.declare(scope, name, false, id);
            }
            NodeShape::Function { name, args, return_type, body } => {
                self.decls.insert(scope, name, id);
                for a in &args {
                    self.visit(a.ty, scope);
                }
                if let Some(r) = return_type {
                    self.visit(r, scope);
                }
                let fn_scope = self.tree.push(ScopeKind::Function, Some(scope), None, Some(id));
                self.set_inline_scope(id, fn_scope);
                for a in &args {
                    self.declare(fn_scope, a.name, true, id);
                }
                self.visit(body, fn_scope);
            }
            NodeShape::Lambda { args, return_type, body } => {
                for a in &args {
                    self.visit(a.ty, scope);
                }
                if let Some(r) = return_type {
                    self.visit(r, scope);
                }
                let fn_scope = self.tree.push(ScopeKind::Function, Some(scope), None, Some(id));
                self.set_inline_scope(id, fn_scope);
                for a in &args {
                    self.declare(fn_scope, a.name, true, id);
                }
                self.visit(body, fn_scope);
            }
            NodeShape::Enum { name, variants } => {
                self.decls.insert(scope, name, id);
                let enum_scope = self.tree.push(ScopeKind::Enum, Some(scope), None, Some(id));
                self.set_inline_scope(id, enum_scope);
                for v in variants {
                    for f in v.fields {
                        self.visit(f, scope);
                    }
                }
            }
            NodeShape::Class { name, fields, methods } => {
                self.decls.insert(scope, name, id);
                let class_scope = self.tree.push(ScopeKind::Class, Some(scope), None, Some(id));
                self.set_inline_scope(id, class_scope);
                for f in fields {
                    self.visit(f, class_scope);
                }
                for m in methods {
                    self.visit(m, class_scope);
                }
            }
            NodeShape::Namespace { name, items } => {
                let ns_scope = self
                    .tree
                    .find_namespace_child(scope, name)
                    .unwrap_or_else(|| self.tree.push(ScopeKind::Namespace, Some(scope), Some(name), Some(id)));
                self.set_inline_scope(id, ns_scope);
                for item in items {
                    self.visit(item, ns_scope);
                }
            }
            NodeShape::Match { scrutinee, arms } => {
                self.visit(scrutinee, scope);
                for arm in arms {
                    let arm_scope = self.tree.push(ScopeKind::Block, Some(scope), None, Some(id));
                    arm.scope.set(Some(arm_scope));
                    self.declare_pattern(&arm.pattern, arm_scope, id);
                    self.visit(arm.block, arm_scope);
                }
            }
            NodeShape::TryCatch { try_block, catchers } => {
                self.visit(try_block, scope);
                for c in catchers {
                    self.visit(c.ty, scope);
                    let catch_scope = self.tree.push(ScopeKind::Block, Some(scope), None, Some(id));
                    c.scope.set(Some(catch_scope));
                    self.declare(catch_scope, c.name, true, id);
                    self.visit(c.block, catch_scope);
                }
            }
            NodeShape::Generic => {
                let children = crate::ast::walker::children(self.ast, id);
                for child in children {
                    self.visit(child, scope);
                }
            }
        }
    }

    fn declare_pattern(&mut self, pattern: &crate::ast::MatchPattern, scope: ScopeId, owner: AstId) {
        use crate::ast::MatchPattern;
        match pattern {
            MatchPattern::Binding { name, .. } => self.declare(scope, *name, false, owner),
            MatchPattern::EnumeratorWithArgs { params, .. } => {
                for p in params {
                    if let crate::ast::EnumeratorArgPattern::Binding { name, .. } = p {
                        self.declare(scope, *name, false, owner);
                    }
                }
            }
            MatchPattern::Wildcard | MatchPattern::Expr(_) | MatchPattern::Enumerator { .. } => {}
        }
    }
}

/// A cheap, clonable summary of the node shapes the scope builder needs
/// to branch on, so [`ScopeBuilder::visit`] never holds a `&Ast` borrow
/// across its own recursive calls.
enum NodeShape {
    Block(Vec<AstId>),
    VarDef { name: StringId, ty: Option<AstId>, init: Option<AstId> },
    Function { name: StringId, args: Vec<crate::ast::FuncArg>, return_type: Option<AstId>, body: AstId },
    Lambda { args: Vec<crate::ast::FuncArg>, return_type: Option<AstId>, body: AstId },
    Enum { name: StringId, variants: Vec<crate::ast::EnumVariant> },
    Class { name: StringId, fields: Vec<AstId>, methods: Vec<AstId> },
    Namespace { name: StringId, items: Vec<AstId> },
    Match { scrutinee: AstId, arms: Vec<crate::ast::MatchArm> },
    TryCatch { try_block: AstId, catchers: Vec<crate::ast::Catcher> },
    Generic,
}

trait ClonedShape {
    fn clone_shape(&self) -> NodeShape;
}

impl ClonedShape for NodeKind {
    fn clone_shape(&self) -> NodeShape {
        match self {
            NodeKind::Block { stmts, .. } => NodeShape::Block(stmts.clone()),
            NodeKind::VarDef { name, ty, init } => NodeShape::VarDef { name: *name, ty: *ty, init: *init },
            NodeKind::Function { name, args, return_type, body, .. } => {
                NodeShape::Function { name: *name, args: args.clone(), return_type: *return_type, body: *body }
            }
            NodeKind::Lambda { args, return_type, body, .. } => {
                NodeShape::Lambda { args: args.clone(), return_type: *return_type, body: *body }
            }
            NodeKind::Enum { name, variants, .. } => NodeShape::Enum { name: *name, variants: variants.clone() },
            NodeKind::Class { name, fields, methods, .. } => {
                NodeShape::Class { name: *name, fields: fields.clone(), methods: methods.clone() }
            }
            NodeKind::Namespace { name, items, .. } => NodeShape::Namespace { name: *name, items: items.clone() },
            NodeKind::Match { scrutinee, arms } => NodeShape::Match { scrutinee: *scrutinee, arms: arms.clone() },
            NodeKind::TryCatch { try_block, catchers } => {
                NodeShape::TryCatch { try_block: *try_block, catchers: catchers.clone() }
            }
            _ => NodeShape::Generic,
        }
    }
}
