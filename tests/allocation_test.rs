//! End-to-end allocation of small quad functions on x86-64.
//!
//! Each test parses a function from the text format, runs the allocator
//! with the x86-64 policy and checks both the instruction-specific register
//! requirements and the general invariants (everything resolved, no two
//! simultaneously live variables in one register).

mod common;

use bumpalo::Bump;
use common::{assert_all_resolved, assert_no_register_overlap, find_quad, init_logging, named};
use quadc::quad::{Imm, OpKind};
use quadc::x64::regs::{CALLER_SAVED, RAX, RCX, RDX};
use quadc::x64::Win64Assigner;
use quadc::{
    allocate_function, parse_module, print_allocation, Allocation, Allocator, AllocatorConfig,
    CompilationSession, FlowGraph, Function, TargetPolicy, X64Policy,
};

fn parse_one<'a>(session: &CompilationSession<'a>, text: &str) -> Function<'a> {
    let mut funcs = parse_module(session, text).unwrap_or_else(|e| panic!("parse failed: {e}"));
    assert_eq!(funcs.len(), 1);
    funcs.remove(0)
}

fn pressure_text(values: usize) -> String {
    let mut text = String::from("func pressure\n  local s: i64\n");
    for i in 0..values {
        text.push_str(&format!("  local v{i}: i64\n"));
    }
    for i in 0..values {
        text.push_str(&format!("  v{i} = const {i}\n"));
    }
    text.push_str("  s = add v0, v1\n");
    for i in 2..values {
        text.push_str(&format!("  s = add s, v{i}\n"));
    }
    text.push_str("  ret s\nend\n");
    text
}

#[test]
fn test_unsigned_divide_uses_rax() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func udiv
          local a: u64
          local b: u64
          local q: u64
          a = const 100
          b = const 7
          q = div a, b
          ret q
        end
        "#,
    );
    allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    let div = func.quad(find_quad(&func, OpKind::Div));
    assert_eq!(func.var(div.op1.as_var().unwrap()).alloc, Allocation::Register(RAX));
    assert_eq!(func.var(div.dest.unwrap()).alloc, Allocation::Register(RAX));
    let divisor = func.var(div.op2.unwrap()).alloc.register().unwrap();
    assert!(divisor != RAX && divisor != RDX);
    assert_all_resolved(&func);
    assert_no_register_overlap(&func);
}

#[test]
fn test_float_multiply_is_not_pinned() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func square
          param x: f64 @0
          local y: f64
          x = getarg 0
          y = mul x, x
          ret y
        end
        "#,
    );
    let result = allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    // Only the argument and return registers constrain this function.
    assert_eq!(result.moves_inserted, 0);
    assert_eq!(func.var(named(&func, "x")).alloc, Allocation::Register(RCX));
    assert_eq!(func.var(named(&func, "y")).alloc, Allocation::Register(RAX));
}

#[test]
fn test_call_arguments_and_clobbers() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func caller
          local x: i64
          local y: i64
          local z: i64
          temp r: i64
          x = const 1
          y = const 2
          z = const 3
          arg 0, x
          arg 1, y
          arg 4, z
          call callee
          r = retval
          r = add r, x
          ret r
        end
        "#,
    );
    let result = allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    let args: Vec<_> = func
        .quad_ids()
        .filter(|&q| func.quad(q).kind() == OpKind::SetArg)
        .map(|q| func.quad(q).op2.unwrap())
        .collect();
    assert_eq!(args.len(), 3);
    assert_eq!(func.var(args[0]).alloc, Allocation::Register(RCX));
    assert_eq!(func.var(args[1]).alloc, Allocation::Register(RDX));
    let stack_arg = func.var(args[2]).alloc.register().unwrap();
    assert!(!Win64Assigner::GP_ARG_REGS.contains(&stack_arg));

    // `x` survives the call.
    let x = func.var(named(&func, "x")).alloc.register().unwrap();
    assert!(!CALLER_SAVED.contains(x));
    assert!(result.callee_saved.contains(x));
    assert_eq!(func.var(named(&func, "r")).alloc, Allocation::Register(RAX));

    assert_all_resolved(&func);
    assert_no_register_overlap(&func);
}

#[test]
fn test_folding_needs_single_use_temporary() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func fold
          local a: i64
          temp k: i64
          temp m: i64
          temp big: i64
          a = const 10
          k = const 5
          a = add a, k
          m = const 7
          a = add a, m
          a = sub a, m
          big = const 5000000000
          a = add a, big
          ret a
        end
        "#,
    );
    allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    assert_eq!(func.var(named(&func, "k")).alloc, Allocation::Immediate(Imm::Int(5)));
    assert!(func.var(named(&func, "m")).alloc.register().is_some());
    assert!(func.var(named(&func, "big")).alloc.register().is_some());
    // Named variables never fold, even when written once and read once.
    assert!(func.var(named(&func, "a")).alloc.register().is_some());
    assert_no_register_overlap(&func);
}

#[test]
fn test_pressure_spills_are_monotonic() {
    init_logging();
    for optimistic in [true, false] {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);
        let mut func = parse_one(&session, &pressure_text(24));
        let config = AllocatorConfig {
            optimistic,
            ..AllocatorConfig::default()
        };
        let result = Allocator::new(&X64Policy::new(), config)
            .allocate(&session, &mut func)
            .unwrap();

        // A spilled variable is spilled once and stays in memory.
        let mut spilled = result.spilled.clone();
        spilled.sort();
        spilled.dedup();
        assert_eq!(spilled.len(), result.spilled.len());
        // Twenty-four values are live at once; fourteen registers are usable.
        assert!(result.spilled.len() >= 24 - 14);
        for &v in &result.spilled {
            assert!(func.var(v).alloc.is_memory(), "{} left memory", func.var_name(v));
        }
        assert!(result.frame_size as usize >= 8 * result.spilled.len());

        assert_all_resolved(&func);
        assert_no_register_overlap(&func);
    }
}

#[test]
fn test_liveness_is_stable_after_allocation() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func count
          param n: i64 @0
          local i: i64
          local s: i64
          temp c: bool
          n = getarg 0
          i = const 0
          s = const 0
        top:
          c = lt i, n
          jmpifnot c, done
          s = add s, i
          i = add i, 1
          jmp top
        done:
          ret s
        end
        "#,
    );
    allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    let mut flow = FlowGraph::build(&func).unwrap();
    assert!(!flow.recompute_liveness());
    assert_eq!(
        func.var(named(&func, "c")).alloc,
        Allocation::Immediate(Imm::Condition)
    );
    assert_all_resolved(&func);
    assert_no_register_overlap(&func);
}

#[test]
fn test_reserved_registers_are_never_assigned() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let policy = X64Policy::new();
    let mut func = parse_one(&session, &pressure_text(14));
    allocate_function(&session, &mut func, &policy).unwrap();

    let reserved = policy.registers().reserved;
    for v in func.var_ids() {
        if let Some(reg) = func.var(v).alloc.register() {
            assert!(!reserved.contains(reg));
        }
    }
}

#[test]
fn test_print_allocation_names_locations() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let policy = X64Policy::new();
    let mut func = parse_one(
        &session,
        r#"
        func show
          local x: i64
          local y: i64
          temp p: ptr
          x = const 1
          p = addr y
          store p, x
          ret x
        end
        "#,
    );
    allocate_function(&session, &mut func, &policy).unwrap();

    let printed = print_allocation(&func, policy.registers());
    assert!(printed.contains("rax"), "{printed}");
    assert!(printed.contains("[rbp-8]"), "{printed}");
}

#[test]
fn test_pinned_variables_are_not_spill_candidates() {
    init_logging();
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut text = String::from("func busy\n  local a: i64\n  local b: i64\n  local r: i64\n");
    text.push_str("  local s: i64\n");
    for i in 0..20 {
        text.push_str(&format!("  local v{i}: i64\n"));
    }
    text.push_str("  a = const 100\n  b = const 7\n");
    for i in 0..20 {
        text.push_str(&format!("  v{i} = const {i}\n"));
    }
    text.push_str("  r = mod a, b\n  s = add r, v0\n");
    for i in 1..20 {
        text.push_str(&format!("  s = add s, v{i}\n"));
    }
    text.push_str("  ret s\nend\n");
    let mut func = parse_one(&session, &text);
    let result = allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    // Twenty values are live across the divide, which leaves them twelve registers.
    assert!(result.spilled.len() >= 8);
    for name in ["a", "r", "s"] {
        let v = named(&func, name);
        assert!(!result.spilled.contains(&v), "{name} was spilled");
    }
    assert_eq!(func.var(named(&func, "a")).alloc, Allocation::Register(RAX));
    assert_eq!(func.var(named(&func, "r")).alloc, Allocation::Register(RDX));
    assert_eq!(func.var(named(&func, "s")).alloc, Allocation::Register(RAX));
    assert_all_resolved(&func);
    assert_no_register_overlap(&func);
}

#[test]
fn test_argument_register_survives_until_the_call() {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut func = parse_one(
        &session,
        r#"
        func spread
          local x: i64
          local y: i64
          local w: i64
          local z: i64
          x = const 1
          arg 0, x
          y = const 2
          w = const 3
          z = add y, w
          arg 1, z
          call callee
          ret
        end
        "#,
    );
    allocate_function(&session, &mut func, &X64Policy::new()).unwrap();

    assert_eq!(func.var(named(&func, "x")).alloc, Allocation::Register(RCX));
    assert_eq!(func.var(named(&func, "z")).alloc, Allocation::Register(RDX));
    // Defined after `rcx` is loaded with the first argument.
    for name in ["y", "w"] {
        let reg = func.var(named(&func, name)).alloc.register().unwrap();
        assert_ne!(reg, RCX, "{name} overwrites the first argument");
    }
    assert_all_resolved(&func);
    assert_no_register_overlap(&func);
}
