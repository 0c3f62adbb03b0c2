use std::collections::HashSet;

use waft::code::{self, DecodedOp, hi_i32, hi_u32, lo_u32, reg_a, reg_b};
use waft::{Engine, Module, Opcode, TranslationError, VReg};

fn compile(wat: &str) -> Module {
    Module::new(&Engine::default(), wat).unwrap()
}

fn decoded(module: &Module, index: usize) -> Vec<DecodedOp> {
    code::decode_sequence(module.function_code(index).instructions).unwrap()
}

fn opcodes(ops: &[DecodedOp]) -> Vec<Opcode> {
    ops.iter().map(|op| op.opcode).collect()
}

fn branch_target(op: &DecodedOp) -> i64 {
    op.pc as i64 + 1 + hi_i32(op.imms[0]) as i64
}

#[test]
fn branch_out_of_a_block_delivers_the_pooled_constant() {
    let module = compile(
        r#"
        (module
            (func (result i32)
                (block (result i32)
                    i32.const 7
                    br 0
                    i32.const 8)))
    "#,
    );
    let ops = decoded(&module, 0);
    assert_eq!(
        opcodes(&ops),
        vec![
            Opcode::Copy,
            Opcode::Br,
            Opcode::Copy,
            Opcode::Return,
            Opcode::Return,
        ]
    );
    // Copy-on-branch moves the constant slot into the block's landing
    // register; the dead trailing constant never reaches the pool.
    assert_eq!(reg_a(ops[0].imms[0]), VReg(4));
    assert_eq!(reg_b(ops[0].imms[0]), VReg(0));
    assert_eq!(module.function_code(0).constants, &[7]);
    // The branch lands on the copy that finishes the block.
    assert_eq!(branch_target(&ops[1]), ops[2].pc as i64);
}

#[test]
fn if_else_arms_meet_in_the_landing_register() {
    let module = compile(
        r#"
        (module
            (func (result i32)
                (if (result i32) (i32.const 0)
                    (then (i32.const 2))
                    (else (i32.const 3)))))
    "#,
    );
    let ops = decoded(&module, 0);
    assert_eq!(
        opcodes(&ops),
        vec![
            Opcode::BrIfNot,
            Opcode::Copy,
            Opcode::Br,
            Opcode::Copy,
            Opcode::Copy,
            Opcode::Return,
            Opcode::Return,
        ]
    );
    // The false edge jumps to the else arm's first instruction.
    assert_eq!(branch_target(&ops[0]), ops[3].pc as i64);
    // The then arm jumps over the else arm to the join point.
    assert_eq!(branch_target(&ops[2]), ops[4].pc as i64);
    // Both arms materialize their constant into the same landing register.
    assert_eq!(reg_a(ops[1].imms[0]), VReg(4));
    assert_eq!(reg_a(ops[3].imms[0]), VReg(4));
    assert_eq!(module.function_code(0).constants, &[0, 2, 3]);
}

#[test]
fn br_table_without_copies_points_entries_at_the_continuation() {
    let module = compile(
        r#"
        (module
            (func
                (block
                    i32.const 0
                    br_table 0 0 0)))
    "#,
    );
    let ops = decoded(&module, 0);
    assert_eq!(ops[0].opcode, Opcode::BrTable);
    let count = hi_u32(ops[0].imms[0]);
    assert_eq!(count, 3);
    // SAFETY: the module (and its arena) outlives this view.
    let entries = unsafe { code::br_table_entries(ops[0].imms[1], count) };
    // No values cross the branch, so every entry aims straight at the
    // block's end, with no trampolines in between.
    let end_pc = ops[1].pc as i64;
    for entry in entries {
        assert_eq!(ops[0].pc as i64 + 1 + entry.offset as i64, end_pc);
    }
    assert_eq!(ops[1].opcode, Opcode::Return);
}

#[test]
fn conditional_branch_with_values_detours_through_a_fallthrough() {
    let module = compile(
        r#"
        (module
            (func (result i32)
                (block (result i32)
                    i32.const 7
                    i32.const 1
                    br_if 0)))
    "#,
    );
    let ops = decoded(&module, 0);
    assert_eq!(
        opcodes(&ops),
        vec![
            Opcode::BrIfNot,
            Opcode::Copy,
            Opcode::Br,
            Opcode::Copy,
            Opcode::Copy,
            Opcode::Return,
            Opcode::Return,
        ]
    );
    // Not-taken: skip the copy + br pair.
    assert_eq!(branch_target(&ops[0]), ops[3].pc as i64);
}

#[test]
fn imported_callees_use_plain_calls_and_local_ones_compile_lazily() {
    let module = compile(
        r#"
        (module
            (import "env" "f" (func $f (param i32) (result i32)))
            (func $g (param i32) (result i32) (call $f (local.get 0)))
            (func $h (param i32) (result i32) (call $g (local.get 0))))
    "#,
    );
    assert_eq!(module.num_imported_functions(), 1);
    assert_eq!(module.num_functions(), 2);

    let g = decoded(&module, 0);
    assert_eq!(
        opcodes(&g),
        vec![
            Opcode::Copy,
            Opcode::Call,
            Opcode::Copy,
            Opcode::Return,
            Opcode::Return,
        ]
    );
    // Argument delivery into the callee's parameter slot.
    assert_eq!(reg_a(g[0].imms[0]), VReg(4));
    assert_eq!(reg_b(g[0].imms[0]), VReg(-4));
    // sp_addend = stack base (4) + height (0) + callee header (4).
    assert_eq!(reg_a(g[1].imms[0]), VReg(8));
    assert_eq!(hi_u32(g[1].imms[0]), 0);

    let h = decoded(&module, 1);
    assert_eq!(h[1].opcode, Opcode::CompilingCall);
    assert_eq!(hi_u32(h[1].imms[0]), 1);
}

#[test]
fn call_indirect_carries_table_type_and_address() {
    let module = compile(
        r#"
        (module
            (type $t (func (param i32) (result i32)))
            (table 1 funcref)
            (func (param i32) (result i32)
                (call_indirect (type $t) (local.get 0) (i32.const 0))))
    "#,
    );
    let ops = decoded(&module, 0);
    let call = ops
        .iter()
        .find(|op| op.opcode == Opcode::CallIndirect)
        .unwrap();
    assert_eq!(hi_u32(call.imms[0]), 0); // table index
    // The index operand is read straight out of the constant pool.
    assert_eq!(reg_a(call.imms[0]), VReg(0));
    assert_eq!(lo_u32(call.imms[1]), 0); // interned type id
}

#[test]
fn globals_round_trip_through_handles() {
    let module = compile(
        r#"
        (module
            (global $g (mut i32) (i32.const 0))
            (func
                (global.set $g (i32.const 5))
                (drop (global.get $g))))
    "#,
    );
    let ops = decoded(&module, 0);
    let set = ops.iter().find(|op| op.opcode == Opcode::GlobalSet).unwrap();
    assert_eq!(hi_u32(set.imms[0]), 0);
    assert!(ops.iter().any(|op| op.opcode == Opcode::GlobalGet));
}

#[test]
fn select_is_a_single_producer() {
    let module = compile(
        r#"
        (module
            (func (result i32)
                (select (i32.const 1) (i32.const 2) (i32.const 0))))
    "#,
    );
    let ops = decoded(&module, 0);
    assert_eq!(
        opcodes(&ops),
        vec![Opcode::Select, Opcode::Return, Opcode::Return]
    );
    // Relinked straight into the result slot.
    assert_eq!(reg_a(ops[0].imms[0]), VReg(-4));
}

#[test]
fn every_branch_lands_on_an_instruction_boundary() {
    let module = compile(
        r#"
        (module
            (func (param i32) (result i32)
                (local i32)
                (block (result i32)
                    (loop (result i32)
                        (br_if 1 (i32.const 1) (local.get 0))
                        (local.set 1 (i32.const 3))
                        (br 0)))))
    "#,
    );
    let ops = decoded(&module, 0);
    let boundaries: HashSet<i64> = ops.iter().map(|op| op.pc as i64).collect();
    for op in &ops {
        match op.opcode {
            Opcode::Br | Opcode::BrIf | Opcode::BrIfNot => {
                assert!(
                    boundaries.contains(&branch_target(op)),
                    "{:?} at {} targets {} which is not a head slot",
                    op.opcode,
                    op.pc,
                    branch_target(op),
                );
            }
            _ => {}
        }
    }
}

#[test]
fn frame_sizing_covers_the_operand_stack_region() {
    let module = compile(
        r#"
        (module
            (func (param i32) (result i32)
                local.get 0
                local.get 0
                local.get 0
                i32.add
                i32.add))
    "#,
    );
    let layout = module.function_layout(0);
    let sequence = module.function_code(0);
    assert!(sequence.max_stack_height >= layout.stack_reg_base as usize + 3);
}

#[test]
fn dumps_decode_every_emitted_instruction() {
    let module = compile(
        r#"
        (module
            (memory 1)
            (global $g (mut i32) (i32.const 0))
            (func (export "k") (param i32 i32) (result i32)
                (local i64)
                local.get 0
                local.get 1
                i32.add
                local.set 0
                (i32.store (i32.const 0) (local.get 0))
                (global.set $g (i32.const 9))
                (i32.load (i32.const 0))))
    "#,
    );
    assert_eq!(module.export_index("k"), Some(0));
    let dump = module.dump_func(0).unwrap();
    assert!(dump.contains("I32Add"));
    assert!(dump.contains("I32Store"));
    assert!(dump.contains("pr0"));
    assert!(dump.contains("constants:"));
}

#[test]
fn translation_errors_surface_through_module_loading() {
    let engine = Engine::default();

    let err = Module::new(&engine, "(module (func (result i32) i64.const 1))").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TranslationError>(),
        Some(TranslationError::TypeMismatch { .. })
    ));

    let err = Module::new(&engine, "(module (func drop))").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<TranslationError>(),
        Some(TranslationError::StackUnderflow)
    ));
}
