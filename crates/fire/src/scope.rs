//! The lexical scope tree built from a completed AST, before type
//! checking begins (spec.md §4.4).
//!
//! Grounded in `original_source/include/Sema/ScopeContext.h`: scopes form
//! a tree with Block/Function/Class/Enum/Namespace variants; namespaces
//! of the same name sharing a parent are merged so that `namespace N { }`
//! appearing twice contributes to one logical scope.

use crate::ast::AstId;
use crate::intern::StringId;
use crate::types::TypeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Block,
    Function,
    Class,
    Enum,
    Namespace,
}

/// A local variable or function argument declared directly in a scope
/// (spec.md §3, `LocalVar`).
#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: StringId,
    pub ty: Option<TypeInfo>,
    pub is_type_deducted: bool,
    pub is_argument: bool,
    pub declaring_node: AstId,
    /// 0-based position among this block's own definitions.
    pub index: u32,
    /// Slots contributed by earlier namespace merges, added to `index`
    /// to get the final frame slot.
    pub index_add: u32,
}

pub struct ScopeNode {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    pub locals: Vec<LocalVar>,
    pub name: Option<StringId>,
    pub owner: Option<AstId>,
    /// Depth from the root scope (root is 0).
    pub depth: u32,
    /// Total variable slots allocated within this block, including
    /// nested non-namespace blocks' cumulative contribution
    /// (spec.md §3, "Scope node").
    pub stack_size: u32,
}

impl ScopeNode {
    pub fn find_local(&self, name: StringId) -> Option<&LocalVar> {
        self.locals.iter().rev().find(|l| l.name == name)
    }
}

/// Arena of scope nodes. Immutable for the duration of analysis once
/// built: template instantiation attaches *new* scopes instead of
/// mutating existing ones (spec.md §4.4 invariant).
#[derive(Default)]
pub struct ScopeTree {
    nodes: Vec<ScopeNode>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&mut self) -> ScopeId {
        if self.nodes.is_empty() {
            self.push(ScopeKind::Block, None, None, None)
        } else {
            ScopeId(0)
        }
    }

    pub fn push(&mut self, kind: ScopeKind, parent: Option<ScopeId>, name: Option<StringId>, owner: Option<AstId>) -> ScopeId {
        let depth = parent.map_or(0, |p| self.get(p).depth + 1);
        let id = ScopeId(self.nodes.len() as u32);
        self.nodes.push(ScopeNode {
            kind,
            parent,
            children: Vec::new(),
            locals: Vec::new(),
            name,
            owner,
            depth,
            stack_size: 0,
        });
        if let Some(p) = parent {
            self.nodes[p.0 as usize].children.push(id);
        }
        id
    }

    /// Finds an existing `Namespace` child of `parent` with `name`, used
    /// to merge sibling namespace declarations (spec.md §4.4).
    pub fn find_namespace_child(&self, parent: ScopeId, name: StringId) -> Option<ScopeId> {
        self.get(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).kind == ScopeKind::Namespace && self.get(c).name == Some(name))
    }

    pub fn get(&self, id: ScopeId) -> &ScopeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut ScopeNode {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocates a new local in `scope`, returning its final slot index
    /// (`index + index_add`).
    pub fn declare_local(&mut self, scope: ScopeId, mut local: LocalVar) -> u32 {
        let node = self.get_mut(scope);
        local.index = node.locals.len() as u32;
        let slot = local.index + local.index_add;
        node.locals.push(local);
        slot
    }

    /// Recomputes `stack_size` for every block/function scope bottom-up:
    /// own variable count plus the stack size of nested non-namespace
    /// child blocks (spec.md §4.4).
    pub fn compute_stack_sizes(&mut self, root: ScopeId) {
        let children: Vec<ScopeId> = self.get(root).children.clone();
        for child in &children {
            if self.get(*child).kind != ScopeKind::Namespace {
                self.compute_stack_sizes(*child);
            } else {
                // Namespace contents still need their own stack sizes
                // even though they don't nest into the parent's count.
                self.compute_stack_sizes(*child);
            }
        }
        let own = self.get(root).locals.len() as u32;
        let nested: u32 = children
            .iter()
            .filter(|c| self.get(**c).kind != ScopeKind::Namespace)
            .map(|c| self.get(*c).stack_size)
            .sum();
        self.get_mut(root).stack_size = own + nested;
    }

    /// Walks from `from` up to (and including) the root, yielding scopes
    /// innermost-first — the order `find_name` searches in.
    pub fn ancestors(&self, from: ScopeId) -> Vec<ScopeId> {
        let mut out = vec![from];
        let mut cur = from;
        while let Some(p) = self.get(cur).parent {
            out.push(p);
            cur = p;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_size_includes_nested_blocks() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.declare_local(
            root,
            LocalVar {
                name: StringId(0),
                ty: None,
                is_type_deducted: false,
                is_argument: false,
                declaring_node: AstId(0),
                index: 0,
                index_add: 0,
            },
        );
        let inner = tree.push(ScopeKind::Block, Some(root), None, None);
        tree.declare_local(
            inner,
            LocalVar {
                name: StringId(1),
                ty: None,
                is_type_deducted: false,
                is_argument: false,
                declaring_node: AstId(0),
                index: 0,
                index_add: 0,
            },
        );
        tree.compute_stack_sizes(root);
        assert_eq!(tree.get(root).stack_size, 2);
        assert_eq!(tree.get(inner).stack_size, 1);
    }

    #[test]
    fn namespace_children_are_found_by_name() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        let ns = tree.push(ScopeKind::Namespace, Some(root), Some(StringId(5)), None);
        assert_eq!(tree.find_namespace_child(root, StringId(5)), Some(ns));
        assert_eq!(tree.find_namespace_child(root, StringId(6)), None);
    }
}
