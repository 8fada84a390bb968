//! `import a/b/c;` end-to-end (spec.md §6, "Import"): a second `.fire`
//! file on disk, loaded and evaluated as its own compilation unit, whose
//! top-level `let`s and `fn`s are exposed as members of the bound module
//! value.

use fire::builtins::io::CaptureSink;
use fire::intern::Interner;
use fire::source::SourceMap;
use fire::FileModuleLoader;
use pretty_assertions::assert_eq;
use std::fs;

#[test]
fn import_exposes_top_level_let_and_fn() {
    let dir = std::env::temp_dir().join(format!("fire-import-test-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");

    fs::write(dir.join("math.fire"), "let pi = 3;\nfn square(x: int) -> int { return x * x; }\n").expect("write math.fire");

    let importer_path = dir.join("importer.fire");
    let importer_src = "import math;\nprintln(math.pi);\nprintln(math.square(4));\n";
    fs::write(&importer_path, importer_src).expect("write importer.fire");

    let mut sources = SourceMap::new();
    let file = sources.add_file(importer_path.clone(), importer_src.to_string());
    let mut interner = Interner::new();
    let mut sink = CaptureSink::default();
    let mut loader = FileModuleLoader::new(dir.clone());

    let result = fire::run(file, &sources, &mut interner, &mut sink, &mut loader);
    let _ = fs::remove_dir_all(&dir);

    result.unwrap();
    assert_eq!(sink.buffer, "3\n16\n");
}
