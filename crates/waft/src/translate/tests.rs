use wasmparser::{BlockType, FuncType, MemArg, Operator, ValType};

use super::*;
use crate::code::{DecodedOp, decode_sequence, hi_i32, hi_u32, reg_b, reg_c};
use crate::context::InstanceId;

struct Harness {
    engine: Engine,
    ctx: TranslationContext,
    interner: TypeInterner,
}

impl Harness {
    fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self::with_instance(params, results, Some(InstanceId(0)))
    }

    fn with_instance(
        params: &[ValType],
        results: &[ValType],
        instance: Option<InstanceId>,
    ) -> Self {
        let mut interner = TypeInterner::default();
        let mut ctx = TranslationContext::new(instance);
        let id = interner.intern(FuncType::new(
            params.iter().copied(),
            results.iter().copied(),
        ));
        ctx.types.push(id);
        ctx.functions.push(0);
        Harness {
            engine: Engine::default(),
            ctx,
            interner,
        }
    }

    fn translate<'a>(
        &self,
        arena: &'a CodeArena,
        locals: &[ValType],
        ops: &[Operator<'_>],
    ) -> Result<InstructionSequence<'a>, TranslationError> {
        let mut translator = FunctionTranslator::new(
            &self.engine,
            &self.ctx,
            &self.interner,
            arena,
            0,
            locals,
            40,
        )?;
        for op in ops {
            translator.translate(op)?;
        }
        translator.finalize()
    }

    fn decode(&self, sequence: &InstructionSequence<'_>) -> Vec<DecodedOp> {
        decode_sequence(sequence.instructions).unwrap()
    }
}

#[test]
fn add_of_two_locals_relinks_into_the_result_slot() {
    let harness = Harness::new(&[ValType::I32], &[ValType::I32]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::LocalGet { local_index: 0 },
                Operator::LocalGet { local_index: 0 },
                Operator::I32Add,
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    let opcodes: Vec<Opcode> = ops.iter().map(|op| op.opcode).collect();
    // The add writes the return slot directly; no copy remains, only the
    // real return plus the defensive one.
    assert_eq!(opcodes, vec![Opcode::I32Add, Opcode::Return, Opcode::Return]);
    let imm = ops[0].imms[0];
    assert_eq!(crate::code::reg_a(imm), VReg(-4));
    assert_eq!(reg_b(imm), VReg(-4));
    assert_eq!(reg_c(imm), VReg(-4));
    assert!(sequence.constants.is_empty());
}

#[test]
fn pooled_constant_set_writes_the_local_directly() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[ValType::I32],
            &[
                Operator::I32Const { value: 1 },
                Operator::LocalSet { local_index: 0 },
                Operator::I32Const { value: 1 },
                Operator::Drop,
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    let opcodes: Vec<Opcode> = ops.iter().map(|op| op.opcode).collect();
    assert_eq!(
        opcodes,
        vec![Opcode::Const32, Opcode::Return, Opcode::Return]
    );
    // No intermediate copy: the const materializes straight into local 0.
    assert_eq!(crate::code::reg_a(ops[0].imms[0]), VReg(0));
    assert_eq!(hi_u32(ops[0].imms[0]), 1);
    // The repeated constant reused the single pool slot.
    assert_eq!(sequence.constants, &[1]);
}

#[test]
fn code_after_a_return_is_absorbed_without_error() {
    let harness = Harness::new(&[], &[ValType::I32]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::I32Const { value: 7 },
                Operator::Return,
                Operator::I32Const { value: 8 },
                Operator::I32Add,
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    let opcodes: Vec<Opcode> = ops.iter().map(|op| op.opcode).collect();
    assert_eq!(opcodes, vec![Opcode::Copy, Opcode::Return, Opcode::Return]);
    // Only the reachable constant reached the pool.
    assert_eq!(sequence.constants, &[7]);
}

#[test]
fn loop_branches_jump_backwards_to_the_header() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::Loop {
                    blockty: BlockType::Empty,
                },
                Operator::Br { relative_depth: 0 },
                Operator::End,
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    assert_eq!(ops[0].opcode, Opcode::Br);
    // Head at 0, offset measured from 1, target is the header at 0.
    assert_eq!(hi_i32(ops[0].imms[0]), -1);
}

#[test]
fn same_instance_calls_dispatch_through_the_compiling_thunk() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::Call { function_index: 0 },
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    assert_eq!(ops[0].opcode, Opcode::CompilingCall);
    // stack_reg_base (4) + height (0) + callee header (3).
    assert_eq!(crate::code::reg_a(ops[0].imms[0]), VReg(7));
    assert_eq!(hi_u32(ops[0].imms[0]), 0);
}

#[test]
fn validation_only_mode_keeps_bookkeeping_but_skips_emission() {
    let harness = Harness::with_instance(&[], &[], None);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::Call { function_index: 0 },
                Operator::End,
            ],
        )
        .unwrap();
    let ops = harness.decode(&sequence);
    let opcodes: Vec<Opcode> = ops.iter().map(|op| op.opcode).collect();
    assert_eq!(opcodes, vec![Opcode::Return, Opcode::Return]);

    // Errors are still detected without an instance.
    let err = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::Call { function_index: 9 },
                Operator::End,
            ],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::IndexOutOfRange {
            space: "function",
            ..
        }
    ));
}

#[test]
fn interception_brackets_the_body() {
    let mut harness = Harness::new(&[], &[]);
    harness.engine = Engine::default().with_interception(true);
    let arena = CodeArena::new();
    let sequence = harness.translate(&arena, &[], &[Operator::End]).unwrap();
    let ops = harness.decode(&sequence);
    let opcodes: Vec<Opcode> = ops.iter().map(|op| op.opcode).collect();
    // Enter hook first; exit hook on the reachable path and before the
    // defensive return that catches branches to the end label.
    assert_eq!(
        opcodes,
        vec![
            Opcode::OnEnter,
            Opcode::OnExit,
            Opcode::Return,
            Opcode::OnExit,
            Opcode::Return,
        ]
    );
}

#[test]
fn local_set_preserves_aliases_before_overwriting() {
    let harness = Harness::new(&[ValType::I32], &[ValType::I32]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::LocalGet { local_index: 0 },
                Operator::LocalGet { local_index: 0 },
                Operator::LocalSet { local_index: 0 },
                Operator::End,
            ],
        )
        .unwrap();

    let ops = harness.decode(&sequence);
    // First preservation copy materializes the deeper alias into its stack
    // slot before local 0 can be clobbered.
    assert_eq!(ops[0].opcode, Opcode::Copy);
    assert_eq!(crate::code::reg_a(ops[0].imms[0]), VReg(4));
    assert_eq!(reg_b(ops[0].imms[0]), VReg(-4));
    // The function still returns the preserved value.
    assert_eq!(ops.last().unwrap().opcode, Opcode::Return);
}

#[test]
fn result_type_mismatch_is_reported() {
    let harness = Harness::new(&[], &[ValType::I32]);
    let arena = CodeArena::new();
    let err = harness
        .translate(
            &arena,
            &[],
            &[Operator::I64Const { value: 5 }, Operator::End],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::TypeMismatch {
            expected: ValType::I32,
            found: ValType::I64
        }
    ));
}

#[test]
fn reachable_pops_on_an_empty_stack_underflow() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let err = harness
        .translate(&arena, &[], &[Operator::Drop, Operator::End])
        .unwrap_err();
    assert!(matches!(err, TranslationError::StackUnderflow));
}

#[test]
fn branch_depth_is_validated() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let err = harness
        .translate(&arena, &[], &[Operator::Br { relative_depth: 5 }])
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::RelativeDepthOutOfRange { depth: 5, frames: 1 }
    ));
}

#[test]
fn else_without_if_is_a_control_mismatch() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let err = harness.translate(&arena, &[], &[Operator::Else]).unwrap_err();
    assert!(matches!(err, TranslationError::ControlMismatch(_)));
}

#[test]
fn instructions_after_the_root_end_are_rejected() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let err = harness
        .translate(&arena, &[], &[Operator::End, Operator::Drop])
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::UnexpectedTrailingInstruction
    ));
}

#[test]
fn unclosed_frames_fail_finalization() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let err = harness
        .translate(
            &arena,
            &[],
            &[Operator::Block {
                blockty: BlockType::Empty,
            }],
        )
        .unwrap_err();
    assert!(matches!(err, TranslationError::MissingEnd(2)));
}

#[test]
fn alignment_past_the_address_width_is_invalid() {
    let mut harness = Harness::new(&[], &[]);
    harness.ctx.memories.push(wasmparser::MemoryType {
        memory64: false,
        shared: false,
        initial: 1,
        maximum: None,
        page_size_log2: None,
    });
    let arena = CodeArena::new();
    let err = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::I32Const { value: 0 },
                Operator::I32Load {
                    memarg: MemArg {
                        align: 32,
                        max_align: 32,
                        offset: 0,
                        memory: 0,
                    },
                },
                Operator::End,
            ],
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TranslationError::InvalidAlignment {
            align: 32,
            width: 32
        }
    ));
}

#[test]
fn memory64_addresses_type_as_i64() {
    let mut harness = Harness::new(&[ValType::I64], &[ValType::I64]);
    harness.ctx.memories.push(wasmparser::MemoryType {
        memory64: true,
        shared: false,
        initial: 1,
        maximum: None,
        page_size_log2: None,
    });
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::LocalGet { local_index: 0 },
                Operator::I64Load {
                    memarg: MemArg {
                        align: 3,
                        max_align: 3,
                        offset: 16,
                        memory: 0,
                    },
                },
                Operator::End,
            ],
        )
        .unwrap();
    let ops = harness.decode(&sequence);
    assert_eq!(ops[0].opcode, Opcode::I64Load);
    assert_eq!(ops[0].imms[1], 16);

    // An i32 address against the same memory is a type error.
    let err = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::I32Const { value: 0 },
                Operator::I64Load {
                    memarg: MemArg {
                        align: 3,
                        max_align: 3,
                        offset: 0,
                        memory: 0,
                    },
                },
                Operator::Drop,
                Operator::End,
            ],
        )
        .unwrap_err();
    assert!(matches!(err, TranslationError::TypeMismatch { .. }));
}

#[test]
fn max_stack_height_covers_the_deepest_point() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    let sequence = harness
        .translate(
            &arena,
            &[],
            &[
                Operator::I32Const { value: 10 },
                Operator::I32Const { value: 20 },
                Operator::I32Const { value: 30 },
                Operator::Drop,
                Operator::Drop,
                Operator::Drop,
                Operator::End,
            ],
        )
        .unwrap();
    // stack_reg_base (4) + three simultaneously live operands.
    assert_eq!(sequence.max_stack_height, 7);
}

#[test]
fn inline_consts_after_pool_saturation() {
    let harness = Harness::new(&[], &[]);
    let arena = CodeArena::new();
    // Body budget of 40 bytes gives the minimum pool of 4 slots; the fifth
    // distinct value must fall back to an inline const.
    let mut ops = Vec::new();
    for value in 1..=5 {
        ops.push(Operator::I32Const { value });
    }
    for _ in 0..5 {
        ops.push(Operator::Drop);
    }
    ops.push(Operator::End);
    let sequence = harness.translate(&arena, &[], &ops).unwrap();

    let decoded = harness.decode(&sequence);
    assert_eq!(decoded[0].opcode, Opcode::Const32);
    assert_eq!(hi_u32(decoded[0].imms[0]), 5);
    // The inline const occupies the first operand-stack register above the
    // four pooled values.
    assert_eq!(crate::code::reg_a(decoded[0].imms[0]), VReg(8));
    assert_eq!(sequence.constants, &[1, 2, 3, 4]);
}
