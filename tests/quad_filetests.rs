//! Allocation of the sample programs under `tests/quad`.
//!
//! Every function in every file must allocate without error and satisfy the
//! general allocation invariants; a few files also get targeted checks.

mod common;

use bumpalo::Bump;
use common::{assert_all_resolved, assert_no_register_overlap, find_quad, init_logging, named};
use quadc::quad::OpKind;
use quadc::x64::regs::{RAX, RCX, RDX};
use quadc::{
    allocate_module, parse_module, print_function, Allocation, AllocatorConfig,
    CompilationSession, Function, FunctionAllocation, X64Policy,
};
use std::fs;
use std::path::{Path, PathBuf};

fn quad_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("quad")
}

/// Helper to load a sample file from the test directory.
fn load_quad_file(filename: &str) -> String {
    let path = quad_dir().join(filename);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

fn allocate_file<'a>(
    session: &CompilationSession<'a>,
    filename: &str,
) -> (Vec<Function<'a>>, Vec<FunctionAllocation>) {
    let text = load_quad_file(filename);
    let mut funcs =
        parse_module(session, &text).unwrap_or_else(|e| panic!("Failed to parse {filename}: {e}"));
    let allocations = allocate_module(
        session,
        &mut funcs,
        &X64Policy::new(),
        &AllocatorConfig::default(),
    )
    .unwrap_or_else(|e| panic!("Failed to allocate {filename}: {e}"));

    for func in &funcs {
        assert_all_resolved(func);
        assert_no_register_overlap(func);
    }
    (funcs, allocations)
}

#[test]
fn test_every_sample_allocates() {
    init_logging();
    let mut files: Vec<_> = fs::read_dir(quad_dir())
        .expect("tests/quad exists")
        .map(|entry| entry.expect("readable directory entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "quad"))
        .collect();
    files.sort();
    assert!(!files.is_empty());

    for path in files {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let (funcs, allocations) = allocate_file(&session, &name);
        assert_eq!(funcs.len(), allocations.len());
        assert_eq!(session.stats().functions_allocated, funcs.len());

        // The rewritten quads still print and parse.
        for func in &funcs {
            let printed = print_function(func);
            parse_module(&session, &printed)
                .unwrap_or_else(|e| panic!("{name}: reparse failed: {e}\n{printed}"));
        }
    }
}

#[test]
fn test_gcd_sample() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let (funcs, allocations) = allocate_file(&session, "gcd.quad");
    let func = &funcs[0];

    let rem = func.quad(find_quad(func, OpKind::Mod));
    assert_eq!(func.var(rem.op1.as_var().unwrap()).alloc, Allocation::Register(RAX));
    assert_eq!(func.var(rem.dest.unwrap()).alloc, Allocation::Register(RDX));
    assert!(allocations[0].spilled.is_empty());
}

#[test]
fn test_calls_sample() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let (funcs, _) = allocate_file(&session, "calls.quad");

    // Stack arguments stay in their home slots above the return address.
    let six = &funcs[0];
    assert_eq!(six.var(named(six, "e")).alloc, Allocation::Memory(48));
    assert_eq!(six.var(named(six, "f")).alloc, Allocation::Memory(56));

    // An indirect call target never sits in an argument register.
    let indirect = &funcs[1];
    let call = indirect.quad(find_quad(indirect, OpKind::Call));
    let target = indirect.var(call.op2.unwrap()).alloc.register().unwrap();
    assert!(![RCX, RDX].contains(&target));
}

#[test]
fn test_memory_sample() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let (funcs, allocations) = allocate_file(&session, "memory.quad");
    let func = &funcs[0];

    assert!(func.var(named(func, "x")).alloc.is_memory());
    assert!(func.var(named(func, "s")).alloc.is_memory());
    assert_eq!(func.var(named(func, "g")).alloc, Allocation::Memory(0));
    // `x` and the 16-byte aggregate share the frame.
    assert!(allocations[0].frame_size >= 24);
}
