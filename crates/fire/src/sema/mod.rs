//! Semantic analysis: scope building, name/overload resolution, template
//! instantiation and type checking (spec.md §4.4–§4.5).

pub mod check;
pub mod resolve;
pub mod scope_builder;
pub mod template;

pub use check::{analyze, Checker};
pub use scope_builder::{attach_subtree_scope, build_scope_tree, DeclTable};
