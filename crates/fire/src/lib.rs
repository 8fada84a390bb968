//! The `fire` language crate: lexer, parser, semantic analysis and a
//! tree-walking evaluator for the language described in SPEC_FULL.md.
//!
//! [`compile`] runs a single compilation unit through lex → parse →
//! analyze and hands back everything [`eval::Evaluator`] needs. [`run`]
//! additionally evaluates it. [`FileModuleLoader`] wires `import` up to
//! the filesystem for a CLI-style driver; embedders that don't need
//! `import` can pass [`eval::NoImports`] instead.

pub mod ast;
pub mod builtins;
pub mod diagnostics;
pub mod error;
pub mod eval;
pub mod intern;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod scope;
pub mod sema;
pub mod source;
pub mod token;
pub mod types;

use ast::Ast;
use builtins::io::{CaptureSink, PrintSink};
use diagnostics::Diagnostic;
use error::{FireError, RuntimeError};
use eval::{EvalError, Evaluator, ModuleLoader, NoImports};
use intern::Interner;
use lexer::Lexer;
use object::{ModuleValue, Object, ObjRef};
use parser::Parser;
use scope::ScopeTree;
use sema::{analyze, DeclTable};
use source::{FileId, SourceMap, Span};
use std::path::{Path, PathBuf};

/// Everything a compilation unit needs before it can be evaluated.
pub struct Compiled {
    pub ast: Ast,
    pub tree: ScopeTree,
    pub decls: DeclTable,
    pub notes: Vec<Diagnostic>,
}

/// Lexes, parses and analyzes one file already registered in `sources`.
/// Parser warnings ride along in `Compiled::notes`; lex/parse/sema
/// failures short-circuit as `FireError` (spec.md §7).
pub fn compile(file: FileId, sources: &SourceMap, interner: &mut Interner) -> Result<Compiled, FireError> {
    let tokens = Lexer::new(sources, file).lex()?;
    let parser = Parser::new(&tokens, interner);
    let (mut ast, notes) = parser.parse_program()?;
    let (tree, decls) = analyze(&mut ast, interner)?;
    Ok(Compiled { ast, tree, decls, notes })
}

/// Compiles and evaluates one file, printing through `sink` and
/// resolving `import` through `loader`. Returns the parser's warnings on
/// success so the driver can still render them.
pub fn run(
    file: FileId,
    sources: &SourceMap,
    interner: &mut Interner,
    sink: &mut dyn PrintSink,
    loader: &mut dyn ModuleLoader,
) -> Result<Vec<Diagnostic>, FireError> {
    let compiled = compile(file, sources, interner)?;
    let mut evaluator = Evaluator::new(&compiled.ast, &compiled.tree, &compiled.decls, &*interner, sink, loader);
    match evaluator.run(&compiled.ast.top_level) {
        Ok(()) => Ok(compiled.notes),
        Err(EvalError::Runtime(e)) => Err(FireError::Runtime(e)),
        Err(EvalError::Uncaught(span, msg)) => Err(FireError::Uncaught(span, msg)),
    }
}

/// Resolves `import a/b/c;` against the filesystem (spec.md §6,
/// "Import"): `relative_path` (already carrying the `.fire` extension
/// the parser appends) is read relative to `base_dir` — the *importing*
/// file's own directory — lexed, parsed, analyzed and evaluated as an
/// independent compilation unit with a fresh [`Interner`] and
/// [`SourceMap`] entry of its own.
///
/// Two deliberate simplifications (DESIGN.md, "import surface"):
/// an imported file's own `println`/`print` output is discarded into a
/// throwaway [`CaptureSink`] rather than interleaved with the importer's,
/// and an imported file may not itself `import` anything (it runs with
/// [`NoImports`]) — nested imports would need a loader that recurses
/// into itself while the outer loader is already borrowed mutably by
/// the outer evaluator, which this trait's `&mut self` signature can't
/// express without a second indirection this crate doesn't need yet.
pub struct FileModuleLoader {
    base_dir: PathBuf,
}

impl FileModuleLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }
}

impl ModuleLoader for FileModuleLoader {
    fn load(&mut self, relative_path: &str, span: Span) -> Result<ObjRef, RuntimeError> {
        let full_path = self.base_dir.join(relative_path);
        load_module_from(&full_path, span)
    }
}

fn load_module_from(full_path: &Path, span: Span) -> Result<ObjRef, RuntimeError> {
    let text = std::fs::read_to_string(full_path)
        .map_err(|e| RuntimeError::ImportFailed { span, message: format!("{}: {e}", full_path.display()) })?;

    let mut sources = SourceMap::new();
    let file = sources.add_file(full_path.to_path_buf(), text);
    let mut interner = Interner::new();
    let compiled = compile(file, &sources, &mut interner).map_err(|e| RuntimeError::ImportFailed { span, message: e.to_string() })?;

    let mut capture = CaptureSink::default();
    let mut nested = NoImports;
    let mut evaluator = Evaluator::new(&compiled.ast, &compiled.tree, &compiled.decls, &interner, &mut capture, &mut nested);
    let members = evaluator.run_capturing(&compiled.ast.top_level).map_err(|e| match e {
        EvalError::Runtime(e) => e,
        EvalError::Uncaught(span, msg) => RuntimeError::ImportFailed { span, message: format!("uncaught exception: {msg}") },
    })?;

    Ok(Object::Module(ModuleValue { members }).new_ref())
}
