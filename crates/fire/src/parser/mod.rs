//! Tokens -> AST. A hand-written recursive-descent parser with an
//! embedded operator-precedence ladder (spec.md §4.2).
//!
//! Grounded in `original_source/src/Parser/ParserExpr.cpp` for the
//! precedence ladder and postfix accumulation, and
//! `original_source/include/Parser/Parser.h` for the top-level grammar
//! shapes. Error recovery is intentionally absent: the first offending
//! token raises a `ParseError` and parsing of that file stops there
//! (spec.md §4.2, "Error recovery: none").

mod types;

use crate::ast::{
    Argument, Ast, AstId, BinOp, Catcher, ConstructedKind, EnumVariant, EnumeratorArgPattern, FuncArg, MatchArm,
    MatchPattern, NodeKind, UnaryOp,
};
use crate::diagnostics::Diagnostic;
use crate::error::ParseError;
use crate::intern::{Interner, StringId};
use crate::object::Literal;
use crate::scope::ScopeId;
use crate::token::{Token, TokenKind, TokenStream};
use std::collections::HashSet;

/// Declared names the parser has seen so far, used only to approximate
/// "already resolvable in the enclosing scope" for match-arm pattern
/// extraction (spec.md §4.2, §9 Open Questions). The real, authoritative
/// scope tree is built afterward by the scope-tree builder; this is a
/// light shadow of it kept during parsing.
struct DeclTracker {
    scopes: Vec<HashSet<StringId>>,
}

impl DeclTracker {
    fn new() -> Self {
        Self { scopes: vec![HashSet::new()] }
    }

    fn push(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: StringId) {
        self.scopes.last_mut().unwrap().insert(name);
    }

    fn is_declared(&self, name: StringId) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(&name))
    }
}

pub struct Parser<'a> {
    /// Flat, comment-stripped token sequence. The lexer keeps comments in
    /// its output (so `lex_round_trip` can prove full byte coverage), but
    /// nothing downstream of the parser needs to see them.
    tokens: Vec<Token>,
    pos: usize,
    /// Remaining half-closes owed from a split `>>`/`>>=` token, per
    /// spec.md §4.2's "per-call-depth counter" requirement.
    gt_remaining: u8,
    pub ast: Ast,
    interner: &'a mut Interner,
    decls: DeclTracker,
    pub notes: Vec<Diagnostic>,
}

pub(crate) type PResult<T> = Result<T, ParseError>;

impl<'a> Parser<'a> {
    pub fn new(tokens: &TokenStream, interner: &'a mut Interner) -> Self {
        let filtered = tokens
            .tokens
            .iter()
            .filter(|t| !matches!(t.kind, TokenKind::CommentLine | TokenKind::CommentBlock))
            .cloned()
            .collect();
        Self {
            tokens: filtered,
            pos: 0,
            gt_remaining: 0,
            ast: Ast::new(),
            interner,
            decls: DeclTracker::new(),
            notes: Vec::new(),
        }
    }

    pub fn parse_program(mut self) -> PResult<(Ast, Vec<Diagnostic>)> {
        let mut top = Vec::new();
        while !self.at_eof() {
            top.push(self.parse_top_level()?);
        }
        self.ast.top_level = top;
        Ok((self.ast, self.notes))
    }

    // ---- token-stream plumbing -------------------------------------------------

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn cur(&self) -> &Token {
        self.peek_at(0)
    }

    fn at_eof(&self) -> bool {
        self.cur().kind == TokenKind::Eof
    }

    fn bump(&mut self) -> Token {
        let tok = self.cur().clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn is(&self, lexeme: &str) -> bool {
        self.cur().lexeme == lexeme
    }

    fn eat(&mut self, lexeme: &str) -> bool {
        if self.is(lexeme) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, lexeme: &str) -> PResult<Token> {
        if self.is(lexeme) {
            Ok(self.bump())
        } else {
            Err(ParseError::new(
                self.cur().span,
                format!("expected `{lexeme}`, found `{}`", self.cur().lexeme),
            ))
        }
    }

    /// Closes one level of `<...>`, splitting a `>>`/`>>=` token into two
    /// virtual closes the way the original source's bracket-depth counter
    /// does (spec.md §4.2).
    fn expect_close_angle(&mut self) -> PResult<()> {
        if self.gt_remaining > 0 {
            self.gt_remaining -= 1;
            if self.gt_remaining == 0 {
                self.pos += 1;
            }
            return Ok(());
        }
        match self.cur().lexeme.as_str() {
            ">" => {
                self.bump();
                Ok(())
            }
            ">>" | ">>=" => {
                self.gt_remaining = 1;
                Ok(())
            }
            _ => Err(ParseError::new(self.cur().span, format!("expected `>`, found `{}`", self.cur().lexeme))),
        }
    }

    fn expect_identifier(&mut self) -> PResult<Token> {
        if self.cur().kind == TokenKind::Identifier {
            Ok(self.bump())
        } else {
            Err(ParseError::new(self.cur().span, format!("expected identifier, found `{}`", self.cur().lexeme)))
        }
    }

    fn intern(&mut self, s: &str) -> StringId {
        self.interner.intern(s)
    }

    fn push_node(&mut self, constructed_as: ConstructedKind, kind: NodeKind, start: Token, end: Token) -> AstId {
        self.ast.push(constructed_as, kind, start, end)
    }

    fn end_of(&self, id: AstId) -> Token {
        self.ast.get(id).end_token.clone()
    }

    // ---- top level ---------------------------------------------------------

    fn parse_top_level(&mut self) -> PResult<AstId> {
        if self.is("enum") {
            return self.parse_enum();
        }
        if self.is("class") || (self.is("final") && self.peek_at(1).lexeme == "class") {
            return self.parse_class();
        }
        if self.is("fn") {
            return self.parse_function();
        }
        if self.is("namespace") {
            return self.parse_namespace();
        }
        if self.is("import") {
            return self.parse_import();
        }
        self.parse_stmt()
    }

    fn parse_import(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `import`
        let mut path = String::new();
        loop {
            let seg = self.expect_identifier()?;
            path.push_str(&seg.lexeme);
            if self.eat("/") {
                path.push('/');
                continue;
            }
            break;
        }
        let end = self.expect(";")?;
        let last_segment = path.rsplit('/').next().unwrap_or(&path).to_string();
        let binding_name = self.intern(&last_segment);
        let call_callee_name = self.intern("import");
        let callee = self.push_node(
            ConstructedKind::Identifier,
            NodeKind::Identifier { name: call_callee_name },
            start.clone(),
            start.clone(),
        );
        let arg_str = self.push_node(
            ConstructedKind::Value,
            NodeKind::Value(Literal::String(format!("{path}.fire"))),
            start.clone(),
            start.clone(),
        );
        let call = self.push_node(
            ConstructedKind::CallFunc,
            NodeKind::CallFunc {
                callee,
                args: vec![Argument { name: None, value: arg_str }],
            },
            start.clone(),
            end.clone(),
        );
        self.decls.declare(binding_name);
        Ok(self.push_node(
            ConstructedKind::VarDef,
            NodeKind::VarDef { name: binding_name, ty: None, init: Some(call) },
            start,
            end,
        ))
    }

    fn parse_namespace(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `namespace`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        self.decls.declare(name);
        self.expect("{")?;
        self.decls.push();
        let mut items = Vec::new();
        while !self.is("}") {
            items.push(self.parse_top_level()?);
        }
        self.decls.pop();
        let end = self.expect("}")?;
        Ok(self.push_node(
            ConstructedKind::Namespace,
            NodeKind::Namespace { name, items, scope: placeholder_scope() },
            start,
            end,
        ))
    }

    fn parse_template_params(&mut self) -> PResult<Vec<StringId>> {
        let mut params = Vec::new();
        if self.eat("<") {
            loop {
                let tok = self.expect_identifier()?;
                params.push(self.intern(&tok.lexeme));
                if !self.eat(",") {
                    break;
                }
            }
            self.expect_close_angle()?;
        }
        Ok(params)
    }

    fn parse_function(&mut self) -> PResult<AstId> {
        self.parse_function_with_flags(false, false)
    }

    fn parse_function_with_flags(&mut self, is_virtual: bool, is_override: bool) -> PResult<AstId> {
        let start = self.bump(); // `fn`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        self.decls.declare(name);
        self.decls.push();
        let template_params = self.parse_template_params()?;
        for &p in &template_params {
            self.decls.declare(p);
        }
        self.expect("(")?;
        let args = self.parse_func_args()?;
        for a in &args {
            self.decls.declare(a.name);
        }
        self.expect(")")?;
        let return_type = if self.eat("->") { Some(self.parse_type_name()?) } else { None };
        let body = self.parse_block()?;
        self.decls.pop();
        let end = self.end_of(body);
        Ok(self.push_node(
            ConstructedKind::Function,
            NodeKind::Function {
                name,
                template_params,
                args,
                return_type,
                body,
                scope: placeholder_scope(),
                is_instantiated: false,
                is_virtual,
                is_override,
            },
            start,
            end,
        ))
    }

    fn parse_func_args(&mut self) -> PResult<Vec<FuncArg>> {
        let mut args = Vec::new();
        while !self.is(")") {
            let is_var_arg = self.eat("..");
            let name_tok = self.expect_identifier()?;
            let name = self.intern(&name_tok.lexeme);
            self.expect(":")?;
            let ty = self.parse_type_name()?;
            args.push(FuncArg { name, ty, is_var_arg });
            if !self.eat(",") {
                break;
            }
        }
        Ok(args)
    }

    fn parse_enum(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `enum`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        self.decls.declare(name);
        self.expect("{")?;
        let mut variants = Vec::new();
        while !self.is("}") {
            let vname_tok = self.expect_identifier()?;
            let vname = self.intern(&vname_tok.lexeme);
            let mut fields = Vec::new();
            if self.eat("(") {
                while !self.is(")") {
                    if self.cur().kind == TokenKind::Identifier && self.peek_at(1).lexeme == ":" {
                        self.bump(); // field name, unused beyond its type for enum data
                        self.bump(); // `:`
                    }
                    fields.push(self.parse_type_name()?);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect(")")?;
            }
            variants.push(EnumVariant { name: vname, fields });
            if !self.eat(",") {
                break;
            }
        }
        let end = self.expect("}")?;
        Ok(self.push_node(
            ConstructedKind::Enum,
            NodeKind::Enum { name, variants, scope: placeholder_scope() },
            start,
            end,
        ))
    }

    fn parse_class(&mut self) -> PResult<AstId> {
        let is_final = self.eat("final");
        let start = self.bump(); // `class`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        self.decls.declare(name);
        let base = if self.eat(":") {
            let base_tok = self.expect_identifier()?;
            Some(self.intern(&base_tok.lexeme))
        } else {
            None
        };
        self.expect("{")?;
        self.decls.push();
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.is("}") {
            if self.is("let") {
                fields.push(self.parse_field()?);
            } else if self.is("virtual") || self.is("override") || self.is("fn") {
                methods.push(self.parse_method()?);
            } else if self.cur().kind == TokenKind::Identifier && self.cur().lexeme == name_tok.lexeme {
                methods.push(self.parse_ctor()?);
            } else {
                return Err(ParseError::new(self.cur().span, format!("unexpected token `{}` in class body", self.cur().lexeme)));
            }
        }
        self.decls.pop();
        let end = self.expect("}")?;
        Ok(self.push_node(
            ConstructedKind::Class,
            NodeKind::Class { name, base, is_final, fields, methods, scope: placeholder_scope() },
            start,
            end,
        ))
    }

    fn parse_field(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `let`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        self.expect(":")?;
        let ty = self.parse_type_name()?;
        let init = if self.eat("=") { Some(self.parse_expr()?) } else { None };
        let end = self.expect(";")?;
        Ok(self.push_node(ConstructedKind::VarDef, NodeKind::VarDef { name, ty: Some(ty), init }, start, end))
    }

    fn parse_ctor(&mut self) -> PResult<AstId> {
        let start = self.expect_identifier()?; // class name reused as ctor name
        let name = self.intern(&start.lexeme);
        self.decls.push();
        self.expect("(")?;
        let args = self.parse_func_args()?;
        for a in &args {
            self.decls.declare(a.name);
        }
        self.expect(")")?;
        let body = self.parse_block()?;
        self.decls.pop();
        let end = self.end_of(body);
        Ok(self.push_node(
            ConstructedKind::Function,
            NodeKind::Function {
                name,
                template_params: Vec::new(),
                args,
                return_type: None,
                body,
                scope: placeholder_scope(),
                is_instantiated: false,
                is_virtual: false,
                is_override: false,
            },
            start,
            end,
        ))
    }

    fn parse_method(&mut self) -> PResult<AstId> {
        let is_virtual = self.eat("virtual");
        let is_override = self.eat("override");
        self.parse_function_with_flags(is_virtual, is_override)
    }

    // ---- statements ---------------------------------------------------------

    fn parse_stmt(&mut self) -> PResult<AstId> {
        if self.is("{") {
            return self.parse_block();
        }
        if self.is("if") {
            return self.parse_if();
        }
        if self.is("while") {
            return self.parse_while();
        }
        if self.is("for") {
            return self.parse_for();
        }
        if self.is("let") {
            return self.parse_let();
        }
        if self.is("return") {
            return self.parse_return();
        }
        if self.is("break") {
            let tok = self.bump();
            self.expect(";")?;
            return Ok(self.push_node(ConstructedKind::Return, NodeKind::Break, tok.clone(), tok));
        }
        if self.is("continue") {
            let tok = self.bump();
            self.expect(";")?;
            return Ok(self.push_node(ConstructedKind::Return, NodeKind::Continue, tok.clone(), tok));
        }
        if self.is("throw") {
            let start = self.bump();
            let value = self.parse_expr()?;
            let end = self.expect(";")?;
            return Ok(self.push_node(ConstructedKind::Throw, NodeKind::Throw { value }, start, end));
        }
        if self.is("try") {
            return self.parse_try();
        }
        if self.is("match") {
            return self.parse_match();
        }
        let expr = self.parse_expr()?;
        self.expect(";")?;
        Ok(expr)
    }

    fn parse_block(&mut self) -> PResult<AstId> {
        let start = self.expect("{")?;
        self.decls.push();
        let mut stmts = Vec::new();
        while !self.is("}") {
            stmts.push(self.parse_block_item()?);
        }
        self.decls.pop();
        let end = self.expect("}")?;
        Ok(self.push_node(ConstructedKind::Block, NodeKind::Block { stmts, scope: placeholder_scope() }, start, end))
    }

    fn parse_block_item(&mut self) -> PResult<AstId> {
        if self.is("fn") {
            return self.parse_function();
        }
        self.parse_stmt()
    }

    fn parse_let(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `let`
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        let ty = if self.eat(":") { Some(self.parse_type_name()?) } else { None };
        let init = if self.eat("=") { Some(self.parse_expr()?) } else { None };
        let end = self.expect(";")?;
        self.decls.declare(name);
        Ok(self.push_node(ConstructedKind::VarDef, NodeKind::VarDef { name, ty, init }, start, end))
    }

    fn parse_if(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `if`
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        let then_branch = self.parse_block()?;
        let mut end = self.end_of(then_branch);
        let else_branch = if self.eat("else") {
            let e = if self.is("if") { self.parse_if()? } else { self.parse_block()? };
            end = self.end_of(e);
            Some(e)
        } else {
            None
        };
        Ok(self.push_node(ConstructedKind::If, NodeKind::If { cond, then_branch, else_branch }, start, end))
    }

    fn parse_while(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `while`
        self.expect("(")?;
        let cond = self.parse_expr()?;
        self.expect(")")?;
        let body = self.parse_block()?;
        let end = self.end_of(body);
        Ok(self.push_node(ConstructedKind::While, NodeKind::While { cond, body }, start, end))
    }

    /// `for(init; cond; step) { body }` desugars at parse time into
    /// `{ init; while(cond) { body; step; } }` (spec.md §4.2).
    fn parse_for(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `for`
        self.expect("(")?;
        self.decls.push();
        let init = self.parse_let()?;
        let cond = self.parse_expr()?;
        self.expect(";")?;
        let step = self.parse_expr()?;
        self.expect(")")?;
        let body = self.parse_block()?;
        let body_start = self.ast.get(body).token.clone();
        let body_end = self.end_of(body);
        let mut loop_stmts = match &self.ast.get(body).kind {
            NodeKind::Block { stmts, .. } => stmts.clone(),
            _ => Vec::new(),
        };
        loop_stmts.push(step);
        let loop_body = self.push_node(
            ConstructedKind::Block,
            NodeKind::Block { stmts: loop_stmts, scope: placeholder_scope() },
            body_start,
            body_end.clone(),
        );
        let while_loop =
            self.push_node(ConstructedKind::While, NodeKind::While { cond, body: loop_body }, start.clone(), body_end.clone());
        self.decls.pop();
        Ok(self.push_node(
            ConstructedKind::Block,
            NodeKind::Block { stmts: vec![init, while_loop], scope: placeholder_scope() },
            start,
            body_end,
        ))
    }

    fn parse_return(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `return`
        let value = if self.is(";") { None } else { Some(self.parse_expr()?) };
        let end = self.expect(";")?;
        Ok(self.push_node(ConstructedKind::Return, NodeKind::Return { value }, start, end))
    }

    fn parse_try(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `try`
        let try_block = self.parse_block()?;
        let mut catchers = Vec::new();
        while self.eat("catch") {
            let name_tok = self.expect_identifier()?;
            let name = self.intern(&name_tok.lexeme);
            self.expect(":")?;
            let ty = self.parse_type_name()?;
            self.decls.push();
            self.decls.declare(name);
            let block = self.parse_block()?;
            self.decls.pop();
            catchers.push(Catcher { name, ty, block, scope: std::cell::Cell::new(None) });
        }
        let end = catchers.last().map_or_else(|| self.end_of(try_block), |c| self.end_of(c.block));
        Ok(self.push_node(ConstructedKind::TryCatch, NodeKind::TryCatch { try_block, catchers }, start, end))
    }

    fn parse_match(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `match`
        let scrutinee = self.parse_expr()?;
        self.expect("{")?;
        let mut arms = Vec::new();
        while !self.is("}") {
            self.decls.push();
            let pattern = self.parse_match_pattern()?;
            self.expect("=>")?;
            let block = if self.is("{") { self.parse_block()? } else { self.parse_stmt()? };
            self.decls.pop();
            arms.push(MatchArm { pattern, block, scope: std::cell::Cell::new(None) });
            self.eat(",");
        }
        let end = self.expect("}")?;
        Ok(self.push_node(ConstructedKind::Match, NodeKind::Match { scrutinee, arms }, start, end))
    }

    /// Extracts pattern-bound identifiers per spec.md §9's fixed rule: an
    /// unqualified identifier operand of a callee-shaped pattern that does
    /// not already resolve in the enclosing scope becomes a fresh binding.
    fn parse_match_pattern(&mut self) -> PResult<MatchPattern> {
        if self.eat("_") {
            return Ok(MatchPattern::Wildcard);
        }
        // `Scope::Name` or `Scope::Name(p1, p2, ...)`.
        if self.cur().kind == TokenKind::Identifier && self.peek_at(1).lexeme == "::" {
            let path = self.parse_scope_resol()?;
            if self.eat("(") {
                let mut params = Vec::new();
                while !self.is(")") {
                    params.push(self.parse_enumerator_arg_pattern()?);
                    if !self.eat(",") {
                        break;
                    }
                }
                self.expect(")")?;
                return Ok(MatchPattern::EnumeratorWithArgs { path, params });
            }
            return Ok(MatchPattern::Enumerator { path });
        }
        // A lone identifier immediately followed by `=>` and not already
        // declared is a fresh binding; otherwise it's an expression
        // pattern matched by value.
        if self.cur().kind == TokenKind::Identifier && self.peek_at(1).lexeme == "=>" {
            let name_tok = self.bump();
            let name = self.intern(&name_tok.lexeme);
            if !self.decls.is_declared(name) {
                self.decls.declare(name);
                return Ok(MatchPattern::Binding { name, slot: std::cell::Cell::new(None) });
            }
            let id = self.push_node(ConstructedKind::Identifier, NodeKind::Identifier { name }, name_tok.clone(), name_tok);
            return Ok(MatchPattern::Expr(id));
        }
        Ok(MatchPattern::Expr(self.parse_expr()?))
    }

    fn parse_enumerator_arg_pattern(&mut self) -> PResult<EnumeratorArgPattern> {
        if self.cur().kind == TokenKind::Identifier && matches!(self.peek_at(1).lexeme.as_str(), "," | ")") {
            let name_tok = self.bump();
            let name = self.intern(&name_tok.lexeme);
            if !self.decls.is_declared(name) {
                self.decls.declare(name);
                return Ok(EnumeratorArgPattern::Binding { name, slot: std::cell::Cell::new(None) });
            }
            let id = self.push_node(ConstructedKind::Identifier, NodeKind::Identifier { name }, name_tok.clone(), name_tok);
            return Ok(EnumeratorArgPattern::Expr(id));
        }
        Ok(EnumeratorArgPattern::Expr(self.parse_expr()?))
    }

    // ---- expressions: precedence ladder ------------------------------------
    // Assign -> LogOr -> LogAnd -> BitOr -> BitXor -> BitAnd -> Equality
    // -> Comparison -> Shift -> Additive -> Multiplicative -> Unary
    // -> Postfix -> Primary   (spec.md §4.2)

    pub fn parse_expr(&mut self) -> PResult<AstId> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> PResult<AstId> {
        let lhs = self.parse_logor()?;
        if self.is("=") {
            let op_tok = self.bump();
            let rhs = self.parse_assign()?; // right-associative
            let end = self.end_of(rhs);
            return Ok(self.push_node(ConstructedKind::Assign, NodeKind::Assign { lhs, rhs }, op_tok, end));
        }
        for compound in ["+=", "-=", "*=", "/=", "%=", "<<=", ">>=", "&=", "|=", "^="] {
            if self.is(compound) {
                let op_tok = self.bump();
                let rhs = self.parse_assign()?;
                let op = BinOp::from_punct(&compound[..compound.len() - 1]).expect("valid compound-assign operator");
                let end = self.end_of(rhs);
                let binop =
                    self.push_node(ConstructedKind::Binary, NodeKind::Binary { op, lhs, rhs }, op_tok.clone(), end.clone());
                return Ok(self.push_node(ConstructedKind::Assign, NodeKind::Assign { lhs, rhs: binop }, op_tok, end));
            }
        }
        Ok(lhs)
    }

    fn parse_binop_level(&mut self, ops: &[&str], next: fn(&mut Self) -> PResult<AstId>) -> PResult<AstId> {
        let mut lhs = next(self)?;
        loop {
            let matched = ops.iter().find(|op| self.is(op));
            let Some(op_str) = matched else { break };
            let op_tok = self.bump();
            let rhs = next(self)?;
            let op = BinOp::from_punct(op_str).expect("operator in ops table always maps to a BinOp");
            let end = self.end_of(rhs);
            lhs = self.push_node(ConstructedKind::Binary, NodeKind::Binary { op, lhs, rhs }, op_tok, end);
        }
        Ok(lhs)
    }

    fn parse_logor(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["||"], Self::parse_logand)
    }
    fn parse_logand(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["&&"], Self::parse_bitor)
    }
    fn parse_bitor(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["|"], Self::parse_bitxor)
    }
    fn parse_bitxor(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["^"], Self::parse_bitand)
    }
    fn parse_bitand(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["&"], Self::parse_equality)
    }
    fn parse_equality(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["==", "!="], Self::parse_comparison)
    }

    fn parse_comparison(&mut self) -> PResult<AstId> {
        let lhs = self.parse_shift()?;
        let lhs_is_bare_identifier = matches!(self.ast.get(lhs).kind, NodeKind::Identifier { .. });
        let mut chain_count = 0u32;
        let mut result = lhs;
        loop {
            let matched = ["<=", ">=", "<", ">"].iter().find(|op| self.is(op));
            let Some(op_str) = matched else { break };
            let op_tok = self.bump();
            let rhs = self.parse_shift()?;
            let op = BinOp::from_punct(op_str).expect("comparison operator always maps to a BinOp");
            let end = self.end_of(rhs);
            chain_count += 1;
            if chain_count == 2 && lhs_is_bare_identifier && matches!(*op_str, "<" | ">") {
                self.notes.push(
                    Diagnostic::error(op_tok.span, "chained comparison on what looks like a template reference")
                        .with_note(op_tok.span, "if you want a template argument, write `@<...>`"),
                );
            }
            result = self.push_node(ConstructedKind::Binary, NodeKind::Binary { op, lhs: result, rhs }, op_tok, end);
        }
        Ok(result)
    }

    fn parse_shift(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["<<", ">>"], Self::parse_additive)
    }
    fn parse_additive(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["+", "-"], Self::parse_multiplicative)
    }
    fn parse_multiplicative(&mut self) -> PResult<AstId> {
        self.parse_binop_level(&["*", "/", "%"], Self::parse_unary)
    }

    fn parse_unary(&mut self) -> PResult<AstId> {
        let op = if self.is("-") {
            Some(UnaryOp::Neg)
        } else if self.is("!") {
            Some(UnaryOp::Not)
        } else if self.is("~") {
            Some(UnaryOp::BitNot)
        } else {
            None
        };
        if let Some(op) = op {
            let op_tok = self.bump();
            let operand = self.parse_unary()?;
            let end = self.end_of(operand);
            return Ok(self.push_node(ConstructedKind::Unary, NodeKind::Unary { op, operand }, op_tok, end));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> PResult<AstId> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat("[") {
                let index = self.parse_expr()?;
                let end = self.expect("]")?;
                let start_tok = self.ast.get(expr).token.clone();
                expr = self.push_node(ConstructedKind::IndexRef, NodeKind::IndexRef { base: expr, index }, start_tok, end);
            } else if self.eat(".") {
                let member_tok = self.expect_identifier()?;
                let member = self.intern(&member_tok.lexeme);
                let start_tok = self.ast.get(expr).token.clone();
                expr = self.push_node(ConstructedKind::MemberAccess, NodeKind::MemberAccess { base: expr, member }, start_tok, member_tok);
            } else if self.eat("(") {
                let args = self.parse_call_args()?;
                let end = self.expect(")")?;
                let start_tok = self.ast.get(expr).token.clone();
                expr = self.push_node(ConstructedKind::CallFunc, NodeKind::CallFunc { callee: expr, args }, start_tok, end);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Argument>> {
        let mut args = Vec::new();
        while !self.is(")") {
            let is_named = self.cur().kind == TokenKind::Identifier && self.peek_at(1).lexeme == ":";
            let name = if is_named {
                let name_tok = self.bump();
                self.bump(); // `:`
                Some(self.intern(&name_tok.lexeme))
            } else {
                None
            };
            let value = self.parse_expr()?;
            args.push(Argument { name, value });
            if !self.eat(",") {
                break;
            }
        }
        Ok(args)
    }

    fn parse_scope_resol(&mut self) -> PResult<AstId> {
        let first_tok = self.expect_identifier()?;
        let first = self.intern(&first_tok.lexeme);
        let mut rest = Vec::new();
        let mut end = first_tok.clone();
        while self.eat("::") {
            let seg = self.expect_identifier()?;
            end = seg.clone();
            rest.push(self.intern(&seg.lexeme));
        }
        Ok(self.push_node(ConstructedKind::ScopeResol, NodeKind::ScopeResol { first, rest }, first_tok, end))
    }

    fn parse_primary(&mut self) -> PResult<AstId> {
        let tok = self.cur().clone();
        match tok.kind {
            TokenKind::Int => {
                self.bump();
                let v: i64 = tok.lexeme.parse().map_err(|_| ParseError::new(tok.span, "invalid integer literal"))?;
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Int(v)), tok.clone(), tok))
            }
            TokenKind::Hex => {
                self.bump();
                let digits = tok.lexeme.trim_start_matches("0x").trim_start_matches("0X");
                let v = i64::from_str_radix(digits, 16).map_err(|_| ParseError::new(tok.span, "invalid hex literal"))?;
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Int(v)), tok.clone(), tok))
            }
            TokenKind::Bin => {
                self.bump();
                let digits = tok.lexeme.trim_start_matches("0b").trim_start_matches("0B");
                let v = i64::from_str_radix(digits, 2).map_err(|_| ParseError::new(tok.span, "invalid binary literal"))?;
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Int(v)), tok.clone(), tok))
            }
            TokenKind::Float => {
                self.bump();
                let v: f64 = tok.lexeme.parse().map_err(|_| ParseError::new(tok.span, "invalid float literal"))?;
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Float(v)), tok.clone(), tok))
            }
            TokenKind::Size => {
                self.bump();
                let digits = tok.lexeme.trim_end_matches('u');
                let v: u64 = digits.parse().map_err(|_| ParseError::new(tok.span, "invalid size literal"))?;
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Size(v)), tok.clone(), tok))
            }
            TokenKind::Bool => {
                self.bump();
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Bool(tok.lexeme == "true")), tok.clone(), tok))
            }
            TokenKind::String => {
                self.bump();
                let s = unescape(&tok.lexeme[1..tok.lexeme.len() - 1]);
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::String(s)), tok.clone(), tok))
            }
            TokenKind::Char => {
                self.bump();
                let s = unescape(&tok.lexeme[1..tok.lexeme.len() - 1]);
                let c = s.chars().next().unwrap_or('\0');
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::Char(c)), tok.clone(), tok))
            }
            TokenKind::Punctuator if tok.lexeme == "(" => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(")")?;
                Ok(inner)
            }
            TokenKind::Punctuator if tok.lexeme == "[" => self.parse_array_literal(),
            TokenKind::Identifier if tok.lexeme == "lambda" => self.parse_lambda(),
            TokenKind::Identifier if tok.lexeme == "none" => {
                self.bump();
                Ok(self.push_node(ConstructedKind::Value, NodeKind::Value(Literal::None), tok.clone(), tok))
            }
            TokenKind::Identifier => self.parse_identifier_like(),
            _ => Err(ParseError::new(tok.span, format!("unexpected token `{}`", tok.lexeme))),
        }
    }

    fn parse_array_literal(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `[`
        let mut items = Vec::new();
        while !self.is("]") {
            items.push(self.parse_expr()?);
            if !self.eat(",") {
                break;
            }
        }
        let end = self.expect("]")?;
        Ok(self.push_node(ConstructedKind::Array, NodeKind::Array(items), start, end))
    }

    fn parse_lambda(&mut self) -> PResult<AstId> {
        let start = self.bump(); // `lambda`
        self.expect("(")?;
        self.decls.push();
        let args = self.parse_func_args()?;
        for a in &args {
            self.decls.declare(a.name);
        }
        self.expect(")")?;
        let return_type = if self.eat("->") { Some(self.parse_type_name()?) } else { None };
        let body = self.parse_block()?;
        self.decls.pop();
        let end = self.end_of(body);
        Ok(self.push_node(
            ConstructedKind::Lambda,
            NodeKind::Lambda { args, return_type, body, scope: placeholder_scope() },
            start,
            end,
        ))
    }

    /// An identifier, possibly a qualified `a::b::c` name, possibly
    /// followed by `@<T1, T2>` explicit template arguments, possibly
    /// followed by an `of (T1, T2) -> U` overload-resolution guide.
    fn parse_identifier_like(&mut self) -> PResult<AstId> {
        let has_scope_resol = self.peek_at(1).lexeme == "::";
        let start_tok = self.cur().clone();
        let mut node = if has_scope_resol {
            self.parse_scope_resol()?
        } else {
            let tok = self.expect_identifier()?;
            let name = self.intern(&tok.lexeme);
            self.push_node(ConstructedKind::Identifier, NodeKind::Identifier { name }, tok.clone(), tok)
        };

        if self.eat("@") {
            self.expect("<")?;
            let mut type_args = Vec::new();
            loop {
                type_args.push(self.parse_type_name()?);
                if !self.eat(",") {
                    break;
                }
            }
            self.expect_close_angle()?;
            let end_tok = self.end_of(node);
            node = self.push_node(
                ConstructedKind::TemplateArgs,
                NodeKind::TemplateArgs { base: node, args: type_args },
                start_tok.clone(),
                end_tok,
            );
        }

        if self.eat("of") {
            self.expect("(")?;
            let mut params = Vec::new();
            while !self.is(")") {
                params.push(self.parse_type_name()?);
                if !self.eat(",") {
                    break;
                }
            }
            self.expect(")")?;
            self.expect("->")?;
            let ret = self.parse_type_name()?;
            let ret_end = self.end_of(ret);
            let sig = self.push_node(ConstructedKind::Signature, NodeKind::Signature { params, ret }, start_tok.clone(), ret_end.clone());
            node = self.push_node(
                ConstructedKind::OverloadGuide,
                NodeKind::OverloadGuide { base: node, signature: sig },
                start_tok,
                ret_end,
            );
        }

        Ok(node)
    }
}

fn placeholder_scope() -> ScopeId {
    // Populated by the scope-tree builder pass that runs over the
    // completed AST; see `scope::ScopeTree` and `sema::build_scope_tree`.
    ScopeId(u32::MAX)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::source::SourceMap;

    fn parse(src: &str) -> Ast {
        let mut sources = SourceMap::new();
        let file = sources.add_file("determinism.fire", src.to_string());
        let mut interner = Interner::new();
        let tokens = Lexer::new(&sources, file).lex().expect("lexes");
        let (ast, _notes) = Parser::new(&tokens, &mut interner).parse_program().expect("parses");
        ast
    }

    /// A node's shape, independent of the table slot it landed in —
    /// parsing the same source twice must produce the same sequence of
    /// these regardless of any nondeterminism in node allocation order.
    fn shape(ast: &Ast, id: AstId) -> (ConstructedKind, u32, u32) {
        let node = ast.get(id);
        (node.constructed_as, node.token.span.start, node.end_token.span.end)
    }

    #[test]
    fn parsing_the_same_source_twice_produces_the_same_node_sequence() {
        let src = r#"
            fn add<T>(a: T, b: T) -> T { return a + b; }
            class Box { let x: int; fn get(self: Box) -> int { return self.x; } }
            enum Opt { None, Some(int) }
            fn main() -> int {
                match Opt::Some(3) {
                    Opt::Some(v) => return add(v, v),
                    Opt::None => return 0,
                }
            }
        "#;
        let a = parse(src);
        let b = parse(src);
        assert_eq!(a.len(), b.len());
        for i in 0..a.len() {
            let id = AstId(i as u32);
            assert_eq!(shape(&a, id), shape(&b, id), "node {i} diverged between two parses of identical source");
        }
        assert_eq!(a.top_level.len(), b.top_level.len());
    }

    #[test]
    fn a_split_shift_right_in_nested_template_args_closes_the_correct_number_of_levels() {
        // `Vec<Vec<T>>` must not be lexed/parsed as a `>>` operator
        // eating both closing angle brackets at once (gt_remaining).
        let src = "fn f<T>(x: Vec<Vec<T>>) -> T { return x[0][0]; }";
        let a = parse(src);
        let b = parse(src);
        assert_eq!(a.len(), b.len());
        for i in 0..a.len() {
            let id = AstId(i as u32);
            assert_eq!(shape(&a, id), shape(&b, id));
        }
    }
}
