//! Benchmarks for the compile and execute phases of the bytecode pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kitelang::ast::Program;
use kitelang::bytecode::{Bytecode, Compiler, Vm};
use kitelang::lexer::Scanner;
use kitelang::parser::Parser;

const FIB: &str = "\
    let fibonacci = fn(x) { \
      if (x == 0) { return 0; } else { \
        if (x == 1) { return 1; } else { \
          fibonacci(x - 1) + fibonacci(x - 2); } } }; \
    fibonacci(20);";

const MAP_DOUBLE: &str = "\
    let map = fn(arr, f) { \
      let iter = fn(arr, acc) { \
        if (len(arr) == 0) { acc } \
        else { iter(rest(arr), push(acc, f(first(arr)))) } }; \
      iter(arr, []); }; \
    map([1, 2, 3, 4, 5, 6, 7, 8, 9, 10], fn(x) { x * 2 });";

/// Parse source into an AST.
fn parse(source: &str) -> Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

/// Compile source down to bytecode.
fn compile(source: &str) -> Bytecode {
    let program = parse(source);
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compile error");
    compiler.bytecode()
}

/// Run already-compiled bytecode to completion.
fn run(bytecode: Bytecode) {
    let mut vm = Vm::new(bytecode);
    vm.run().expect("vm error");
}

fn compile_benchmark(c: &mut Criterion) {
    c.bench_function("compile_fib", |b| b.iter(|| compile(black_box(FIB))));
}

fn execute_benchmark(c: &mut Criterion) {
    let fib = compile(FIB);
    let map_double = compile(MAP_DOUBLE);

    let mut group = c.benchmark_group("execute");
    group.bench_function("fib_recursive", |b| b.iter(|| run(black_box(fib.clone()))));
    group.bench_function("map_double", |b| {
        b.iter(|| run(black_box(map_double.clone())))
    });
    group.finish();
}

criterion_group!(benches, compile_benchmark, execute_benchmark);
criterion_main!(benches);
