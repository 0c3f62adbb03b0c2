//! Textual dumper for translated instruction sequences.
//!
//! Walks the fixed per-opcode immediate shapes and prints every register
//! operand with its role in the frame, which doubles as the encoding's
//! round-trip check: a sequence the dumper cannot decode is a translator bug.

use crate::code::{
    DecodedOp, ImmShape, InstructionSequence, VReg, br_table_entries, decode_sequence, hi_i32,
    hi_u32, lo_u32, reg_a, reg_b, reg_c, reg_d,
};
use crate::error::TranslationError;
use crate::translate::layout::StackLayout;

/// Render one sequence as an annotated listing (token threading assumed).
pub fn dump_sequence(
    sequence: &InstructionSequence<'_>,
    layout: &StackLayout,
) -> Result<String, TranslationError> {
    let ops = decode_sequence(sequence.instructions)?;
    let mut out = String::new();
    for op in &ops {
        out.push_str(&format!("  [{:3}] {}\n", op.pc, render_op(op, layout)));
    }
    out.push_str("  constants:");
    if sequence.constants.is_empty() {
        out.push_str(" (none)\n");
    } else {
        for (slot, value) in sequence.constants.iter().enumerate() {
            out.push_str(&format!(" c{slot}={value:#x}"));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "  max stack height: {}\n",
        sequence.max_stack_height
    ));
    Ok(out)
}

fn render_op(op: &DecodedOp, layout: &StackLayout) -> String {
    let name = format!("{:?}", op.opcode);
    let role = |reg: VReg| layout.role(reg).to_string();
    // Branch targets are relative to the slot after the head.
    let target = |offset: i32| (op.pc as i64 + 1 + offset as i64).to_string();
    match op.opcode.imm_shape() {
        ImmShape::None => name,
        ImmShape::Copy => {
            let w = op.imms[0];
            format!("{name} {} <- {}", role(reg_a(w)), role(reg_b(w)))
        }
        ImmShape::Unary => {
            let w = op.imms[0];
            format!("{name} {} <- {}", role(reg_a(w)), role(reg_b(w)))
        }
        ImmShape::Binary => {
            let w = op.imms[0];
            format!(
                "{name} {} <- {}, {}",
                role(reg_a(w)),
                role(reg_b(w)),
                role(reg_c(w))
            )
        }
        ImmShape::Select => {
            let w = op.imms[0];
            format!(
                "{name} {} <- {} ? {} : {}",
                role(reg_a(w)),
                role(reg_b(w)),
                role(reg_c(w)),
                role(reg_d(w))
            )
        }
        ImmShape::Const32 => {
            let w = op.imms[0];
            format!("{name} {} <- {:#x}", role(reg_a(w)), hi_u32(w))
        }
        ImmShape::Const64 => {
            format!("{name} {} <- {:#x}", role(reg_a(op.imms[0])), op.imms[1])
        }
        ImmShape::Branch => format!("{name} -> {}", target(hi_i32(op.imms[0]))),
        ImmShape::CondBranch => {
            let w = op.imms[0];
            format!("{name} {} -> {}", role(reg_a(w)), target(hi_i32(w)))
        }
        ImmShape::BrTable => {
            let w = op.imms[0];
            let count = hi_u32(w);
            // SAFETY: the entries block belongs to the arena backing the
            // sequence, which the caller keeps alive.
            let entries = unsafe { br_table_entries(op.imms[1], count) };
            let targets: Vec<String> = entries.iter().map(|e| target(e.offset)).collect();
            format!("{name} {} [{}]", role(reg_a(w)), targets.join(", "))
        }
        ImmShape::Call => {
            let w = op.imms[0];
            format!("{name} f{} sp+{}", hi_u32(w), reg_a(w).0)
        }
        ImmShape::CallIndirect => {
            let w = op.imms[0];
            format!(
                "{name} table:{} type:{} addr:{} sp+{}",
                hi_u32(w),
                lo_u32(op.imms[1]),
                role(reg_a(w)),
                reg_b(w).0
            )
        }
        ImmShape::RegIndex => {
            let w = op.imms[0];
            format!("{name} {}, {}", role(reg_a(w)), hi_u32(w))
        }
        ImmShape::MemoryGrow => {
            let w = op.imms[0];
            format!(
                "{name} {} <- {}, mem:{}",
                role(reg_a(w)),
                role(reg_b(w)),
                hi_u32(w)
            )
        }
        ImmShape::Load => {
            let w = op.imms[0];
            format!(
                "{name} {} <- [{} + {}] mem:{}",
                role(reg_a(w)),
                role(reg_b(w)),
                op.imms[1],
                hi_u32(w)
            )
        }
        ImmShape::Store => {
            let w = op.imms[0];
            format!(
                "{name} [{} + {}] <- {} mem:{}",
                role(reg_b(w)),
                op.imms[1],
                role(reg_a(w)),
                hi_u32(w)
            )
        }
        ImmShape::BulkOp => {
            let w = op.imms[0];
            format!(
                "{name} {}, {}, {} ({}, {})",
                role(reg_a(w)),
                role(reg_b(w)),
                role(reg_c(w)),
                lo_u32(op.imms[1]),
                hi_u32(op.imms[1])
            )
        }
        ImmShape::Index => format!("{name} {}", lo_u32(op.imms[0])),
        ImmShape::RefNull => format!("{name} {}", role(reg_a(op.imms[0]))),
        ImmShape::TableSet => {
            let w = op.imms[0];
            format!(
                "{name} [{}] <- {}, table:{}",
                role(reg_a(w)),
                role(reg_b(w)),
                hi_u32(w)
            )
        }
    }
}
