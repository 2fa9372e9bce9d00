//! Compile Tern programs, assemble and link them with the system C compiler
//! and a small test runtime, and check what they print.
//!
//! Skipped (with a note on stderr) unless running on x86-64 Linux with `cc`
//! on the path.

use std::fs;
use std::process::Command;

use tern_core::{AllocStrategy, CompileOptions, compile};

const RUNTIME: &str = include_str!("support/runtime.c");

fn toolchain_available() -> bool {
    cfg!(all(target_arch = "x86_64", target_os = "linux"))
        && Command::new("cc")
            .arg("--version")
            .output()
            .is_ok_and(|out| out.status.success())
}

/// Build and run `source`; `None` when the toolchain is missing.
fn run(source: &str, strategy: AllocStrategy) -> Option<String> {
    if !toolchain_available() {
        eprintln!("skipping: no x86-64 Linux toolchain available");
        return None;
    }
    let artifact = compile(source, "e2e.tern", &CompileOptions { strategy }).expect("compiles");

    let dir = tempfile::tempdir().expect("tempdir");
    let asm = dir.path().join("program.s");
    let runtime = dir.path().join("runtime.c");
    let exe = dir.path().join("program");
    fs::write(&asm, &artifact.assembly).expect("write assembly");
    fs::write(&runtime, RUNTIME).expect("write runtime");

    let build = Command::new("cc")
        .arg("-o")
        .arg(&exe)
        .arg(&asm)
        .arg(&runtime)
        .output()
        .expect("run cc");
    assert!(
        build.status.success(),
        "cc failed:\n{}\n--- assembly ---\n{}",
        String::from_utf8_lossy(&build.stderr),
        artifact.assembly
    );

    let out = Command::new(&exe).output().expect("run program");
    assert!(out.status.success(), "program exited with {}", out.status);
    Some(String::from_utf8(out.stdout).expect("utf-8 output"))
}

/// Run under both allocators and check they agree.
fn run_both(source: &str) -> Option<String> {
    let linear = run(source, AllocStrategy::LinearScan)?;
    let naive = run(source, AllocStrategy::Naive)?;
    assert_eq!(linear, naive, "allocators disagree");
    Some(linear)
}

#[test]
fn precedence_of_arithmetic() {
    if let Some(out) = run_both("print(5 + 2 * 3)\n") {
        assert_eq!(out, "11\n");
    }
}

#[test]
fn recursive_factorial() {
    let source = "\
fn factorial(n: int) -> int:
    if n <= 1:
        return 1
    return n * factorial(n - 1)

print(factorial(5))
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "120\n");
    }
}

#[test]
fn straight_line_code_agrees_across_allocators() {
    let source = "\
let a = 7
let b = a * 3 - 4
let c = (a + b) * (b - a) / 3
let d = c % 5 + -a
print(a)
print(b)
print(c)
print(d)
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "7\n17\n80\n-7\n");
    }
}

#[test]
fn register_pressure_forces_spills() {
    let source = "\
fn mix(x: int) -> int:
    let a = x + 1
    let b = x + 2
    let c = x + 3
    let d = x + 4
    let e = x + 5
    let f = x + 6
    let g = x + 7
    let h = x + 8
    return a * b + c * d - e * f + g * h

print(mix(1))
";
    // 2*3 + 4*5 - 6*7 + 8*9
    if let Some(out) = run_both(source) {
        assert_eq!(out, "56\n");
    }
}

#[test]
fn loops_and_globals() {
    let source = "\
let total = 0
for i in 0..10:
    total = total + i
let n = 0
while n < 5:
    n = n + 1
print(total)
print(n)

fn fib(k: int) -> int:
    let a = 0
    let b = 1
    for step in 0..k:
        let next = a + b
        a = b
        b = next
    return a

print(fib(15))
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "45\n5\n610\n");
    }
}

#[test]
fn floats_and_conversions() {
    let source = "\
let x = 1.5
print(x * 2.0)
print(to_int(7.9))
print(to_float(3) / 2.0)
print(-x)
print(x < 2.0)
print(x >= 2.0)
print(x == 1.5)
print(x != 1.5)
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "3\n7\n1.5\n-1.5\ntrue\nfalse\ntrue\nfalse\n");
    }
}

#[test]
fn heap_memory_through_pointers() {
    let source = "\
let p = alloc(4)
for i in 0..4:
    *(p + i) = i * i
let sum = 0
for i in 0..4:
    sum = sum + *(p + i)
print(sum)
print((p + 3) - p)
free(p)
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "14\n3\n");
    }
}

#[test]
fn address_of_locals() {
    let source = "\
fn store(p: ptr[int], value: int):
    *p = value

fn answer() -> int:
    let x = 1
    store(&x, 42)
    return x

print(answer())
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "42\n");
    }
}

#[test]
fn arguments_beyond_registers() {
    let source = "\
fn weigh(a: int, b: int, c: int, d: int, e: int, f: int, g: int) -> int:
    return a + 2 * b + 3 * c + 4 * d + 5 * e + 6 * f + 7 * g

fn spread(a: int, b: int, c: int, d: int, e: int, f: int, g: int, h: int) -> int:
    return a - h + g

fn mix(a: int, x: float, b: int, y: float) -> float:
    return to_float(a) * x + to_float(b) * y

print(weigh(1, 2, 3, 4, 5, 6, 7))
print(spread(1, 2, 3, 4, 5, 6, 7, 8))
print(mix(2, 1.5, 3, 0.5))
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "140\n0\n4.5\n");
    }
}

#[test]
fn logical_operators_short_circuit() {
    let source = "\
fn loud() -> bool:
    print(99)
    return true

print(false and loud())
print(true or loud())
print(1 < 2 and not (3 == 4))
if 1 > 2:
    print(1)
elif 2 > 1:
    print(2)
else:
    print(3)
";
    if let Some(out) = run_both(source) {
        assert_eq!(out, "false\ntrue\ntrue\n2\n");
    }
}
