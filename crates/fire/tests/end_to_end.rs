//! The six end-to-end scenarios from SPEC_FULL.md §8, run through the
//! full lex → parse → analyze → evaluate pipeline. Results are surfaced
//! via `println` and captured with `CaptureSink` rather than inspecting
//! an evaluated value directly, since [`fire::run`] only reports success
//! or failure for a whole compilation unit.

use fire::builtins::io::CaptureSink;
use fire::error::FireError;
use fire::eval::NoImports;
use fire::intern::Interner;
use fire::source::SourceMap;
use pretty_assertions::assert_eq;

fn run_source(src: &str) -> Result<String, FireError> {
    let mut sources = SourceMap::new();
    let file = sources.add_file("test.fire", src.to_string());
    let mut interner = Interner::new();
    let mut sink = CaptureSink::default();
    let mut loader = NoImports;
    fire::run(file, &sources, &mut interner, &mut sink, &mut loader)?;
    Ok(sink.buffer)
}

#[test]
fn scenario_1_function_call_and_arithmetic() {
    let out = run_source(
        r"
        fn add(a: int, b: int) -> int { return a + b; }
        fn main() -> int { return add(2, 3); }
        println(main());
        ",
    )
    .unwrap();
    assert_eq!(out, "5\n");
}

#[test]
fn scenario_2_template_instantiation() {
    let out = run_source(
        r#"
        fn id<T>(x: T) -> T { return x; }
        println(id(42));
        println(id("hi"));
        "#,
    )
    .unwrap();
    assert_eq!(out, "42\nhi\n");
}

#[test]
fn scenario_3_enum_match_returns_value() {
    let out = run_source(
        r#"
        enum Opt { None, Some(int) }
        fn unwrap(o: Opt) -> int {
            match o {
                Opt::Some(v) => return v,
                Opt::None => throw "none",
            }
        }
        println(unwrap(Opt::Some(7)));
        "#,
    )
    .unwrap();
    assert_eq!(out, "7\n");
}

#[test]
fn scenario_3_enum_match_throws() {
    let err = run_source(
        r#"
        enum Opt { None, Some(int) }
        fn unwrap(o: Opt) -> int {
            match o {
                Opt::Some(v) => return v,
                Opt::None => throw "none",
            }
        }
        unwrap(Opt::None);
        "#,
    )
    .unwrap_err();
    match err {
        FireError::Uncaught(_, msg) => assert_eq!(msg, "none"),
        other => panic!("expected an uncaught exception, got {other:?}"),
    }
}

#[test]
fn scenario_4_virtual_override_dispatch() {
    let out = run_source(
        r"
        class Base { virtual fn f(self) -> int { return 1; } }
        class D : Base { override fn f(self) -> int { return 2; } }
        let b: Base = D();
        println(b.f());
        ",
    )
    .unwrap();
    assert_eq!(out, "2\n");
}

#[test]
fn scenario_5_vector_append_and_length() {
    let out = run_source(
        r"
        let v = [1, 2, 3];
        v = v + 4;
        println(v[3]);
        println(v.length());
        ",
    )
    .unwrap();
    assert_eq!(out, "4\n4\n");
}

#[test]
fn scenario_6_try_catch_swallows_a_matching_throw() {
    let out = run_source(
        r#"
        try {
            throw "boom";
        } catch e: string {
            println(e);
        }
        "#,
    )
    .unwrap();
    assert_eq!(out, "boom\n");
}
