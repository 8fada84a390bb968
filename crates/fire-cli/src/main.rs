use std::{env, fs, path::Path, process::ExitCode};

use fire::builtins::io::StdoutSink;
use fire::intern::Interner;
use fire::source::SourceMap;
use fire::FileModuleLoader;

const USAGE: &str = "usage: flame [options] <file.fire>...

options:
  -h, --help       print this message and exit
  -v, --version    print the version and exit";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    }
    if args.iter().any(|a| a == "-v" || a == "--version") {
        println!("flame {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    let files: Vec<&String> = args.iter().filter(|a| !a.starts_with('-')).collect();
    if files.is_empty() {
        eprintln!("flame: no input files\n{USAGE}");
        return ExitCode::from(2);
    }

    let mut any_failed = false;
    for path in files {
        if !run_one(path) {
            any_failed = true;
        }
    }

    if any_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Runs one file to completion, printing its diagnostics (and, on
/// failure, its error) to stderr. Returns whether it succeeded.
fn run_one(path: &str) -> bool {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("flame: {path}: {e}");
            return false;
        }
    };

    let mut sources = SourceMap::new();
    let file = sources.add_file(path, text);
    let mut interner = Interner::new();
    let mut sink = StdoutSink;

    let base_dir = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let mut loader = FileModuleLoader::new(base_dir);

    match fire::run(file, &sources, &mut interner, &mut sink, &mut loader) {
        Ok(notes) => {
            for note in &notes {
                eprintln!("{}", note.render(&sources, use_color()));
            }
            true
        }
        Err(e) => {
            let diag = fire::diagnostics::Diagnostic::error(e.span(), e.to_string());
            eprintln!("{}", diag.render(&sources, use_color()));
            false
        }
    }
}

fn use_color() -> bool {
    env::var_os("NO_COLOR").is_none()
}
