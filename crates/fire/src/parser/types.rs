//! Type-name parsing: `Int`, `Vec<Int>`, `const Dict<String, T>`.
//!
//! Unlike expression-level `<`, a type name is only ever parsed from a
//! context that is already unambiguous (after `:`, `->`, `@<`, or inside
//! another type's parameter list), so no bracket disambiguation is
//! needed here beyond the `>>`-splitting `expect_close_angle` shares
//! with template-argument parsing (spec.md §4.2).

use super::{PResult, Parser};
use crate::ast::{AstId, ConstructedKind, NodeKind};

impl<'a> Parser<'a> {
    pub(crate) fn parse_type_name(&mut self) -> PResult<AstId> {
        let is_const = self.eat("const");
        let name_tok = self.expect_identifier()?;
        let name = self.intern(&name_tok.lexeme);
        let mut end = name_tok.clone();
        let mut params = Vec::new();
        if self.eat("<") {
            loop {
                let param = self.parse_type_name()?;
                end = self.ast.get(param).end_token.clone();
                params.push(param);
                if !self.eat(",") {
                    break;
                }
            }
            self.expect_close_angle()?;
        }
        Ok(self.push_node(ConstructedKind::TypeName, NodeKind::TypeName { name, params, is_const }, name_tok, end))
    }
}
