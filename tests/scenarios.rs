//! End-to-end scenarios, asserting on the shape of the generated IR
//! rather than actually running it (no JIT/linker is available here —
//! see `DESIGN.md`'s note on the CLI/JIT driver being out of this
//! crate's scope). Each scenario mirrors a literal source/behaviour pair;
//! since the IR can't be executed, every assertion checks for the
//! specific instructions/declarations that would have to be present for
//! the described behaviour to occur at runtime.

use noxy::{Compiler, CompilerConfig};

fn compile_ir(source: &str) -> String {
    let compiler = Compiler::new(CompilerConfig::default());
    let module = compiler
        .compile("scenario", source)
        .unwrap_or_else(|e| panic!("expected '{source}' to compile, got: {e}"));
    module.print_to_string().to_string()
}

#[test]
fn s1_arithmetic_and_print_promotes_to_printf_lld() {
    let ir = compile_ir("let a: int = 2 let b: int = 3 print(a + b * 2)");
    assert!(ir.contains("@printf"));
    assert!(ir.contains("%lld"));
}

#[test]
fn s2_if_else_branches_on_comparison() {
    let ir = compile_ir("let x: int = 7 if x > 5 then print(\"big\") else print(\"small\") end");
    assert!(ir.contains("icmp sgt"));
    assert!(ir.contains("br i1"));
}

#[test]
fn s3_while_with_break_wires_loop_end_block() {
    let ir = compile_ir(
        "let i: int = 0 while i < 10 do if i == 3 then break end i = i + 1 end print(i)",
    );
    assert!(ir.contains("while.cond"));
    assert!(ir.contains("while.end"));
    assert!(ir.contains("br label %while.end"));
}

#[test]
fn s4_recursive_function_calls_itself() {
    let ir = compile_ir(
        "func fib(n:int)->int if n<=1 then return n end return fib(n-1)+fib(n-2) end print(fib(10))",
    );
    assert!(ir.contains("define i64 @fib"));
    assert!(ir.contains("call i64 @fib"));
}

#[test]
fn s5_struct_and_fstring_reads_fields_by_gep() {
    let ir = compile_ir("struct P x:int, y:int end let p: P = P(3,4) print(f\"({p.x},{p.y})\")");
    assert!(ir.contains("%P = type"));
    assert!(ir.contains("getelementptr"));
}

#[test]
fn s6_array_and_zeros_declares_array_to_str() {
    let ir = compile_ir("let a: int[3] = zeros(3) a[1] = 42 print(a)");
    assert!(ir.contains("[3 x i64]"));
    assert!(ir.contains("array_to_str_int"));
}

#[test]
fn array_of_struct_field_copies_elements_into_inline_storage() {
    // Mirrors the reference `debug_constructor.py` scenario: a struct
    // field typed `Point[1]`, constructed from an array literal of
    // struct constructors, must be copied element-wise into the
    // enclosing struct's inline `[1 x %Point]` storage rather than
    // having the array literal's heap pointer stored over it.
    let ir = compile_ir(
        "struct Point\nx: int\nend\nstruct Container\npoints: Point[1]\nend\nlet container: Container = Container([Point(10)])\nprint(container.points[0].x)",
    );
    assert!(ir.contains("%Container = type"));
    assert!(ir.contains("[1 x %Point]"));
    assert!(ir.contains("%lld"));
}

#[test]
fn s7_import_closure_declares_both_functions_but_not_the_unused_one() {
    let dir = tempfile_dir();
    std::fs::write(
        dir.join("utils.nx"),
        "func h(n:int)->int return n + 1 end func g(n:int)->int return h(n) end",
    )
    .unwrap();

    let config = CompilerConfig::default().with_extra_root(dir.to_str().unwrap());
    let compiler = Compiler::new(config);
    let module = compiler
        .compile("scenario", "use utils select g print(g(4))")
        .unwrap();
    let ir = module.print_to_string().to_string();
    assert!(ir.contains("define i64 @g"));
    assert!(ir.contains("define i64 @h"));

    let compiler = Compiler::new(CompilerConfig::default().with_extra_root(dir.to_str().unwrap()));
    let module = compiler
        .compile("scenario_h_only", "use utils select h print(h(4))")
        .unwrap();
    let ir = module.print_to_string().to_string();
    assert!(ir.contains("define i64 @h"));
    assert!(!ir.contains("define i64 @g"));
}

#[test]
fn allocation_ledger_frees_every_tracked_pointer_before_main_returns() {
    let ir = compile_ir("let s: string = \"a\" + \"b\" print(s)");
    assert!(ir.contains("ledger.cleanup.cond"));
    assert!(ir.contains("ledger.cleanup.body"));
    assert!(ir.contains("call void @free"));
}

#[test]
fn break_outside_loop_is_a_semantic_error() {
    let compiler = Compiler::new(CompilerConfig::default());
    let result = compiler.compile("scenario", "break");
    assert!(result.is_err());
}

#[test]
fn string_plus_non_string_is_rejected() {
    let compiler = Compiler::new(CompilerConfig::default());
    let result = compiler.compile("scenario", "let a: string = \"x\" + 1 print(a)");
    assert!(result.is_err());
}

fn tempfile_dir() -> std::path::PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!("noxy-scenario-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
