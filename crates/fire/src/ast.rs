//! The AST arena and node kinds.
//!
//! Grounded in `original_source/include/Parser/Parser.h`'s `AST::Base`
//! hierarchy and `ASTKind` enum, and in spec.md §3's "sema-internal
//! refinements" (`Variable`, `FuncName`, `Enumerator`, …). Rust has no
//! cheap way to mutate an enum's discriminant in place the way the C++
//! original rewrites `Base::kind`, so each node's `kind` stays fixed at
//! parse time (`ConstructedKind`) and the refinement the analyzer
//! produces is attached as a separate `Resolution`/`CalleeDecl` field —
//! exactly the rendering Design Notes ("Identifier rewriting") calls for.
//!
//! Nodes live in a single arena (`Ast`) and reference each other by
//! `AstId`, avoiding the reference cycles a pointer-based tree would need
//! between a node and the scope that owns it.

use crate::intern::StringId;
use crate::scope::ScopeId;
use crate::source::Span;
use crate::token::Token;
use crate::types::TypeInfo;
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AstId(pub u32);

/// The node's kind as constructed by the parser. Immutable after parsing
/// (spec.md §3 invariant: "A node's `constructed_as` never changes").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructedKind {
    Value,
    Identifier,
    ScopeResol,
    Array,
    IndexRef,
    MemberAccess,
    CallFunc,
    Binary,
    Assign,
    Block,
    VarDef,
    If,
    Match,
    While,
    Break,
    Continue,
    Return,
    Throw,
    TryCatch,
    Function,
    Lambda,
    Enum,
    Class,
    Namespace,
    TypeName,
    Signature,
    Unary,
    TemplateArgs,
    OverloadGuide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn from_punct(s: &str) -> Option<Self> {
        Some(match s {
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Mod,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            "&&" => Self::And,
            "||" => Self::Or,
            "&" => Self::BitAnd,
            "|" => Self::BitOr,
            "^" => Self::BitXor,
            "<<" => Self::Shl,
            ">>" => Self::Shr,
            _ => return None,
        })
    }
}

/// A function argument as written at a call site: `expr`, or `name: expr`
/// for a named argument (spec.md §4.2, "Postfix").
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Option<StringId>,
    pub value: AstId,
}

/// One arm of a `match` expression (spec.md §4.2, §4.5).
#[derive(Debug, Clone)]
pub enum MatchPattern {
    Wildcard,
    /// A lone fresh identifier: binds the scrutinee's value.
    Binding { name: StringId, slot: Cell<Option<LocalSlot>> },
    /// An expression that must equal the scrutinee's type; matched by
    /// runtime equality.
    Expr(AstId),
    /// `Scope::Name` with no payload.
    Enumerator { path: AstId },
    /// `Scope::Name(p1, p2, …)`, where each `p_i` is either a fresh
    /// binding (unqualified identifier not already resolvable) or an
    /// expression that must equal the stored slot's value.
    EnumeratorWithArgs {
        path: AstId,
        params: Vec<EnumeratorArgPattern>,
    },
}

#[derive(Debug, Clone)]
pub enum EnumeratorArgPattern {
    Binding { name: StringId, slot: Cell<Option<LocalSlot>> },
    Expr(AstId),
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub block: AstId,
    pub scope: Cell<Option<ScopeId>>,
}

#[derive(Debug, Clone)]
pub struct Catcher {
    pub name: StringId,
    pub ty: AstId,
    pub block: AstId,
    pub scope: Cell<Option<ScopeId>>,
}

/// A function argument declaration (`name: Type`).
#[derive(Debug, Clone)]
pub struct FuncArg {
    pub name: StringId,
    pub ty: AstId,
    pub is_var_arg: bool,
}

#[derive(Debug, Clone)]
pub struct EnumVariant {
    pub name: StringId,
    /// Field types for `Ctor(T, U)`-style variants; empty for a bare
    /// `NoData` variant.
    pub fields: Vec<AstId>,
}

/// A local variable slot: (scope depth, index within the frame).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSlot {
    pub distance: u32,
    pub index: u32,
}

/// The resolution an `Identifier`/`ScopeResol` node settles on after
/// analysis. Spec.md §3: "Every `Identifier` that survives analysis has
/// exactly one resolution."
#[derive(Debug, Clone)]
pub enum Resolution {
    Variable { slot: LocalSlot, ty: TypeInfo },
    /// An overload set; exactly one member is later bound into a
    /// `CallFunc`'s `callee_decl`, but the identifier alone may still
    /// denote the whole set (e.g. passed as a value with an `of` guide).
    FuncName(Vec<AstId>),
    BuiltinFuncName(&'static str),
    EnumName(AstId),
    ClassName(AstId),
    Enumerator { enum_decl: AstId, variant: u32 },
    MemberVariable { index: u32, ty: TypeInfo },
    MemberFunction { index: u32 },
    Namespace(ScopeId),
    BuiltinTypeName(crate::types::TypeKind),
}

/// What a `CallFunc` ultimately invokes, bound by overload resolution
/// (spec.md §3: "Every `CallFunc` has exactly one `callee_decl`").
#[derive(Debug, Clone)]
pub enum CalleeDecl {
    UserFunction(AstId),
    Builtin(&'static str),
    Ctor(AstId),
    EnumeratorCtor { enum_decl: AstId, variant: u32 },
    /// A bound member-function call (`instance.method(...)`); `index`
    /// matches `Resolution::MemberFunction`.
    Member { index: u32 },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Value(crate::object::Literal),
    Identifier { name: StringId },
    ScopeResol { first: StringId, rest: Vec<StringId> },
    Array(Vec<AstId>),
    IndexRef { base: AstId, index: AstId },
    MemberAccess { base: AstId, member: StringId },
    CallFunc { callee: AstId, args: Vec<Argument> },
    Binary { op: BinOp, lhs: AstId, rhs: AstId },
    Assign { lhs: AstId, rhs: AstId },
    Block { stmts: Vec<AstId>, scope: ScopeId },
    VarDef { name: StringId, ty: Option<AstId>, init: Option<AstId> },
    If { cond: AstId, then_branch: AstId, else_branch: Option<AstId> },
    Match { scrutinee: AstId, arms: Vec<MatchArm> },
    While { cond: AstId, body: AstId },
    Break,
    Continue,
    Return { value: Option<AstId> },
    Throw { value: AstId },
    TryCatch { try_block: AstId, catchers: Vec<Catcher> },
    Function {
        name: StringId,
        template_params: Vec<StringId>,
        args: Vec<FuncArg>,
        return_type: Option<AstId>,
        body: AstId,
        scope: ScopeId,
        is_instantiated: bool,
        is_virtual: bool,
        is_override: bool,
    },
    Lambda {
        args: Vec<FuncArg>,
        return_type: Option<AstId>,
        body: AstId,
        scope: ScopeId,
    },
    Enum { name: StringId, variants: Vec<EnumVariant>, scope: ScopeId },
    Class {
        name: StringId,
        base: Option<StringId>,
        is_final: bool,
        fields: Vec<AstId>,
        methods: Vec<AstId>,
        scope: ScopeId,
    },
    Namespace { name: StringId, items: Vec<AstId>, scope: ScopeId },
    TypeName { name: StringId, params: Vec<AstId>, is_const: bool },
    /// An `of (T1, T2) -> U` overload-resolution guide.
    Signature { params: Vec<AstId>, ret: AstId },
    Unary { op: UnaryOp, operand: AstId },
    /// `base@<T1, T2>` explicit template arguments applied to an
    /// identifier or scope-resolved name.
    TemplateArgs { base: AstId, args: Vec<AstId> },
    /// `base of (T1, T2) -> U`, narrowing overload resolution at the use
    /// site rather than at the call (spec.md §4.2, "Postfix").
    OverloadGuide { base: AstId, signature: AstId },
}

pub struct Node {
    pub constructed_as: ConstructedKind,
    pub kind: NodeKind,
    pub token: Token,
    pub end_token: Token,
    pub scope: Cell<Option<ScopeId>>,
    /// Populated by the analyzer; `Identifier`/`ScopeResol` resolution.
    pub resolution: RefCell<Option<Resolution>>,
    /// Populated by the analyzer for `CallFunc` nodes.
    pub callee_decl: RefCell<Option<CalleeDecl>>,
    /// Populated by the analyzer: the static type of this expression.
    pub ty: RefCell<Option<TypeInfo>>,
}

impl Node {
    pub fn span(&self) -> Span {
        self.token.span.to(self.end_token.span)
    }
}

/// Arena owning every AST node produced while parsing a compilation unit
/// (including nodes cloned during template instantiation, which are
/// appended rather than mutating existing nodes in place).
#[derive(Default)]
pub struct Ast {
    nodes: Vec<Node>,
    pub top_level: Vec<AstId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constructed_as: ConstructedKind, kind: NodeKind, token: Token, end_token: Token) -> AstId {
        let id = AstId(self.nodes.len() as u32);
        self.nodes.push(Node {
            constructed_as,
            kind,
            token,
            end_token,
            scope: Cell::new(None),
            resolution: RefCell::new(None),
            callee_decl: RefCell::new(None),
            ty: RefCell::new(None),
        });
        id
    }

    pub fn get(&self, id: AstId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: AstId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub mod walker {
    //! A generic Begin/End traversal over the AST, used by the analyzer
    //! to collect `return` statements inside a function body and to
    //! substitute type-parameter names while cloning a template body
    //! (spec.md §4.3).

    use super::{Ast, AstId, NodeKind};

    pub trait Visitor {
        fn begin(&mut self, _ast: &Ast, _id: AstId) {}
        fn end(&mut self, _ast: &Ast, _id: AstId) {}
    }

    pub fn walk(ast: &Ast, id: AstId, visitor: &mut dyn Visitor) {
        visitor.begin(ast, id);
        for child in children(ast, id) {
            walk(ast, child, visitor);
        }
        visitor.end(ast, id);
    }

    /// Children in declaration order, matching the original `ASTWalker`.
    pub fn children(ast: &Ast, id: AstId) -> Vec<AstId> {
        match &ast.get(id).kind {
            NodeKind::Value(_) | NodeKind::Identifier { .. } | NodeKind::ScopeResol { .. } => vec![],
            NodeKind::Array(items) => items.clone(),
            NodeKind::IndexRef { base, index } => vec![*base, *index],
            NodeKind::MemberAccess { base, .. } => vec![*base],
            NodeKind::CallFunc { callee, args } => {
                let mut v = vec![*callee];
                v.extend(args.iter().map(|a| a.value));
                v
            }
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::Assign { lhs, rhs } => vec![*lhs, *rhs],
            NodeKind::Block { stmts, .. } => stmts.clone(),
            NodeKind::VarDef { ty, init, .. } => ty.iter().chain(init.iter()).copied().collect(),
            NodeKind::If { cond, then_branch, else_branch } => {
                let mut v = vec![*cond, *then_branch];
                v.extend(*else_branch);
                v
            }
            NodeKind::Match { scrutinee, arms } => {
                let mut v = vec![*scrutinee];
                for arm in arms {
                    v.push(arm.block);
                }
                v
            }
            NodeKind::While { cond, body } => vec![*cond, *body],
            NodeKind::Break | NodeKind::Continue => vec![],
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::Throw { value } => vec![*value],
            NodeKind::TryCatch { try_block, catchers } => {
                let mut v = vec![*try_block];
                v.extend(catchers.iter().map(|c| c.block));
                v
            }
            NodeKind::Function { args, return_type, body, .. } => {
                let mut v: Vec<AstId> = args.iter().map(|a| a.ty).collect();
                v.extend(*return_type);
                v.push(*body);
                v
            }
            NodeKind::Lambda { args, return_type, body, .. } => {
                let mut v: Vec<AstId> = args.iter().map(|a| a.ty).collect();
                v.extend(*return_type);
                v.push(*body);
                v
            }
            NodeKind::Enum { variants, .. } => variants.iter().flat_map(|v| v.fields.clone()).collect(),
            NodeKind::Class { fields, methods, .. } => {
                let mut v = fields.clone();
                v.extend(methods.iter().copied());
                v
            }
            NodeKind::Namespace { items, .. } => items.clone(),
            NodeKind::TypeName { params, .. } => params.clone(),
            NodeKind::Signature { params, ret } => {
                let mut v = params.clone();
                v.push(*ret);
                v
            }
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::TemplateArgs { base, args } => {
                let mut v = vec![*base];
                v.extend(args.iter().copied());
                v
            }
            NodeKind::OverloadGuide { base, signature } => vec![*base, *signature],
        }
    }
}

pub mod print {
    //! Pretty-printer used for `--dump-ast`-style debugging and for
    //! rendering AST snippets in a few diagnostics. Walks `constructed_as`
    //! so the printer reflects the source as written, never the
    //! analyzer's refinements (spec.md §3).

    use super::{Ast, AstId, NodeKind};
    use std::fmt::Write as _;

    pub fn print(ast: &Ast, id: AstId, interner: &crate::intern::Interner) -> String {
        let mut out = String::new();
        print_node(ast, id, interner, &mut out, 0);
        out
    }

    fn indent(out: &mut String, depth: usize) {
        for _ in 0..depth {
            out.push_str("  ");
        }
    }

    fn print_node(ast: &Ast, id: AstId, interner: &crate::intern::Interner, out: &mut String, depth: usize) {
        indent(out, depth);
        let node = ast.get(id);
        match &node.kind {
            NodeKind::Value(lit) => {
                let _ = writeln!(out, "Value({lit:?})");
            }
            NodeKind::Identifier { name } => {
                let _ = writeln!(out, "Identifier({})", interner.resolve(*name));
            }
            NodeKind::Binary { op, .. } => {
                let _ = writeln!(out, "Binary({op:?})");
            }
            other => {
                let _ = writeln!(out, "{}", variant_name(other));
            }
        }
        for child in super::walker::children(ast, id) {
            print_node(ast, child, interner, out, depth + 1);
        }
    }

    fn variant_name(kind: &NodeKind) -> &'static str {
        match kind {
            NodeKind::Value(_) => "Value",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::ScopeResol { .. } => "ScopeResol",
            NodeKind::Array(_) => "Array",
            NodeKind::IndexRef { .. } => "IndexRef",
            NodeKind::MemberAccess { .. } => "MemberAccess",
            NodeKind::CallFunc { .. } => "CallFunc",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::Block { .. } => "Block",
            NodeKind::VarDef { .. } => "VarDef",
            NodeKind::If { .. } => "If",
            NodeKind::Match { .. } => "Match",
            NodeKind::While { .. } => "While",
            NodeKind::Break => "Break",
            NodeKind::Continue => "Continue",
            NodeKind::Return { .. } => "Return",
            NodeKind::Throw { .. } => "Throw",
            NodeKind::TryCatch { .. } => "TryCatch",
            NodeKind::Function { .. } => "Function",
            NodeKind::Lambda { .. } => "Lambda",
            NodeKind::Enum { .. } => "Enum",
            NodeKind::Class { .. } => "Class",
            NodeKind::Namespace { .. } => "Namespace",
            NodeKind::TypeName { .. } => "TypeName",
            NodeKind::Signature { .. } => "Signature",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::TemplateArgs { .. } => "TemplateArgs",
            NodeKind::OverloadGuide { .. } => "OverloadGuide",
        }
    }
}
