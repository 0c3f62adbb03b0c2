use crate::code::{BrTableEntry, Opcode, VReg, with_reg_a};
use crate::engine::ThreadingModel;
use crate::error::TranslationError;

/// Opaque handle to a label owned by one builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LabelRef(usize);

impl LabelRef {
    #[cfg(test)]
    pub(crate) fn for_tests(index: usize) -> Self {
        LabelRef(index)
    }
}

/// A pending back-patch against an unpinned label.
///
/// Branch offsets are `target - source`, where the source is the PC of the
/// slot immediately after the branch's head slot. The source is captured at
/// emission time so pinning only needs the target.
enum LabelUser {
    /// Overwrite an instruction slot with a factory-built word.
    Slot {
        slot: usize,
        source: usize,
        factory: Box<dyn FnOnce(i32) -> u64>,
    },
    /// Fill one br_table entry in an arena-owned block.
    BrTableEntry {
        entry: *mut BrTableEntry,
        source: usize,
    },
}

enum LabelEntry {
    Unpinned { users: Vec<LabelUser> },
    Pinned { pc: usize },
}

/// Producer bookkeeping for the result-relink peephole: position of the
/// immediate word whose low lane is the producer's result register, and the
/// register it currently writes.
struct LastEmission {
    slot: usize,
    result: VReg,
}

/// Growing instruction stream plus label state for one function.
///
/// Emission appends a head slot (encoded per the engine's threading model)
/// and the instruction's fixed immediate words. Forward references reserve
/// zeroed slots and are rewritten when their label is pinned.
pub(crate) struct ISeqBuilder {
    code: Vec<u64>,
    labels: Vec<LabelEntry>,
    last: Option<LastEmission>,
    threading: ThreadingModel,
}

impl ISeqBuilder {
    pub(crate) fn new(threading: ThreadingModel) -> Self {
        ISeqBuilder {
            code: Vec::new(),
            labels: Vec::new(),
            last: None,
            threading,
        }
    }

    pub(crate) fn pc(&self) -> usize {
        self.code.len()
    }

    /// Emit an instruction that is not a relink candidate. Clears the
    /// peephole slot: anything emitted after a producer blocks rewriting it.
    pub(crate) fn emit(&mut self, opcode: Opcode, imms: &[u64]) {
        debug_assert_eq!(imms.len(), opcode.imm_words());
        self.last = None;
        self.code.push(self.threading.head_slot(opcode));
        self.code.extend_from_slice(imms);
    }

    /// Emit a producer whose sole effect is writing `result`, and remember
    /// it so an immediately following copy out of `result` can be folded
    /// into the producer itself.
    pub(crate) fn emit_producer(&mut self, opcode: Opcode, imms: &[u64], result: VReg) {
        self.emit(opcode, imms);
        self.last = Some(LastEmission {
            slot: self.pc() - imms.len(),
            result,
        });
    }

    /// Forget the previous producer. Every code path that makes rewriting
    /// it unsafe (label pins, control-flow boundaries, provenance-only
    /// pushes) must come through here.
    pub(crate) fn reset_last_emission(&mut self) {
        self.last = None;
    }

    /// Rewrite the previous producer to deposit its result in `to` instead
    /// of `from`. Succeeds only if it is still rewritable and actually
    /// produced `from`; the slot is consumed either way on success.
    pub(crate) fn relink_last_result(&mut self, from: VReg, to: VReg) -> bool {
        match self.last.take() {
            Some(last) if last.result == from => {
                self.code[last.slot] = with_reg_a(self.code[last.slot], to);
                true
            }
            other => {
                self.last = other;
                false
            }
        }
    }

    pub(crate) fn alloc_label(&mut self) -> LabelRef {
        self.labels.push(LabelEntry::Unpinned { users: Vec::new() });
        LabelRef(self.labels.len() - 1)
    }

    /// Allocate a label already pinned to the current PC.
    pub(crate) fn put_label(&mut self) -> LabelRef {
        self.last = None;
        let pc = self.pc();
        self.labels.push(LabelEntry::Pinned { pc });
        LabelRef(self.labels.len() - 1)
    }

    /// Pin a previously allocated label to the current PC, running all of
    /// its pending back-patches.
    pub(crate) fn pin_label_here(&mut self, label: LabelRef) -> Result<(), TranslationError> {
        self.last = None;
        let pc = self.pc();
        let entry = std::mem::replace(&mut self.labels[label.0], LabelEntry::Pinned { pc });
        let users = match entry {
            LabelEntry::Pinned { .. } => {
                return Err(TranslationError::InternalConsistency("label pinned twice"));
            }
            LabelEntry::Unpinned { users } => users,
        };
        for user in users {
            self.run_patch(user, pc);
        }
        Ok(())
    }

    fn run_patch(&mut self, user: LabelUser, target: usize) {
        match user {
            LabelUser::Slot {
                slot,
                source,
                factory,
            } => {
                self.code[slot] = factory(branch_offset(source, target));
            }
            LabelUser::BrTableEntry { entry, source } => {
                // SAFETY: entry points into an arena-owned block that stays
                // alive and exclusively writable by this builder until the
                // sequence is finished.
                unsafe {
                    (*entry).offset = branch_offset(source, target);
                }
            }
        }
    }

    /// Emit a one-immediate branch instruction aimed at `label`. The factory
    /// packs the final immediate word from the resolved offset; it runs now
    /// if the label is pinned, at pin time otherwise.
    pub(crate) fn emit_with_label(
        &mut self,
        opcode: Opcode,
        label: LabelRef,
        factory: impl FnOnce(i32) -> u64 + 'static,
    ) {
        debug_assert_eq!(opcode.imm_words(), 1);
        self.last = None;
        self.code.push(self.threading.head_slot(opcode));
        let source = self.pc();
        self.code.push(0);
        match self.pinned_pc(label) {
            Some(target) => {
                self.code[source] = factory(branch_offset(source, target));
            }
            None => self.push_user(
                label,
                LabelUser::Slot {
                    slot: source,
                    source,
                    factory: Box::new(factory),
                },
            ),
        }
    }

    /// Point one entry of an arena-allocated br_table block at `label`.
    /// `source` is the PC the table's offsets are measured from (the slot
    /// after the owning `BrTable` head).
    pub(crate) fn fill_br_table_entry(
        &mut self,
        label: LabelRef,
        entries: *mut BrTableEntry,
        index: usize,
        source: usize,
    ) {
        // SAFETY: index is within the block allocated for this table.
        let entry = unsafe { entries.add(index) };
        let user = LabelUser::BrTableEntry { entry, source };
        match self.pinned_pc(label) {
            Some(target) => self.run_patch(user, target),
            None => self.push_user(label, user),
        }
    }

    fn pinned_pc(&self, label: LabelRef) -> Option<usize> {
        match self.labels[label.0] {
            LabelEntry::Pinned { pc } => Some(pc),
            LabelEntry::Unpinned { .. } => None,
        }
    }

    fn push_user(&mut self, label: LabelRef, user: LabelUser) {
        match &mut self.labels[label.0] {
            LabelEntry::Unpinned { users } => users.push(user),
            LabelEntry::Pinned { .. } => unreachable!("checked unpinned"),
        }
    }

    /// Hand back the finished instruction words. An unpinned label with
    /// pending users at this point is a translator bug.
    pub(crate) fn finish(self) -> Result<Vec<u64>, TranslationError> {
        for (index, label) in self.labels.iter().enumerate() {
            if let LabelEntry::Unpinned { users } = label {
                if !users.is_empty() {
                    return Err(TranslationError::DanglingLabel(index));
                }
            }
        }
        Ok(self.code)
    }
}

fn branch_offset(source: usize, target: usize) -> i32 {
    (target as i64 - source as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{hi_i32, pack_r_u32, pack_rr, pack_rrr, reg_a};

    fn builder() -> ISeqBuilder {
        ISeqBuilder::new(ThreadingModel::Token)
    }

    fn branch_word(offset: i32) -> u64 {
        pack_r_u32(VReg(0), offset as u32)
    }

    #[test]
    fn backward_branch_resolves_at_emission() {
        let mut b = builder();
        let head = b.put_label();
        b.emit(Opcode::Copy, &[pack_rr(VReg(4), VReg(0))]);
        b.emit_with_label(Opcode::Br, head, branch_word);
        let code = b.finish().unwrap();
        // Branch head at pc 2, offset slot at pc 3, target 0.
        assert_eq!(hi_i32(code[3]), -3);
    }

    #[test]
    fn forward_branch_patches_on_pin() {
        let mut b = builder();
        let end = b.alloc_label();
        b.emit_with_label(Opcode::BrIfNot, end, branch_word);
        assert_eq!(b.pc(), 2);
        b.emit(Opcode::Copy, &[pack_rr(VReg(5), VReg(4))]);
        b.pin_label_here(end).unwrap();
        let code = b.finish().unwrap();
        // Source is pc 1, target pc 4.
        assert_eq!(hi_i32(code[1]), 3);
    }

    #[test]
    fn pinning_twice_is_an_error() {
        let mut b = builder();
        let l = b.alloc_label();
        b.pin_label_here(l).unwrap();
        assert!(matches!(
            b.pin_label_here(l),
            Err(TranslationError::InternalConsistency(_))
        ));
    }

    #[test]
    fn dangling_users_fail_finish() {
        let mut b = builder();
        let l = b.alloc_label();
        b.emit_with_label(Opcode::Br, l, branch_word);
        assert!(matches!(
            b.finish(),
            Err(TranslationError::DanglingLabel(0))
        ));
    }

    #[test]
    fn unused_unpinned_labels_are_tolerated() {
        let mut b = builder();
        b.alloc_label();
        assert!(b.finish().is_ok());
    }

    #[test]
    fn relink_rewrites_the_result_lane() {
        let mut b = builder();
        b.emit_producer(
            Opcode::I32Add,
            &[pack_rrr(VReg(6), VReg(-4), VReg(-4))],
            VReg(6),
        );
        assert!(b.relink_last_result(VReg(6), VReg(-4)));
        let code = b.finish().unwrap();
        assert_eq!(reg_a(code[1]), VReg(-4));
    }

    #[test]
    fn relink_demands_the_matching_source() {
        let mut b = builder();
        b.emit_producer(
            Opcode::I32Add,
            &[pack_rrr(VReg(6), VReg(1), VReg(2))],
            VReg(6),
        );
        assert!(!b.relink_last_result(VReg(5), VReg(0)));
        // The slot survives a refused relink.
        assert!(b.relink_last_result(VReg(6), VReg(0)));
    }

    #[test]
    fn relink_is_consumed_by_any_emission_or_pin() {
        let mut b = builder();
        b.emit_producer(
            Opcode::I32Add,
            &[pack_rrr(VReg(6), VReg(1), VReg(2))],
            VReg(6),
        );
        b.emit(Opcode::Return, &[]);
        assert!(!b.relink_last_result(VReg(6), VReg(0)));

        b.emit_producer(Opcode::Const32, &[pack_r_u32(VReg(6), 3)], VReg(6));
        let l = b.put_label();
        let _ = l;
        assert!(!b.relink_last_result(VReg(6), VReg(0)));
    }

    #[test]
    fn br_table_entries_fill_on_pin() {
        use crate::arena::CodeArena;

        let arena = CodeArena::new();
        let entries = arena.alloc_br_table(2);
        let mut b = builder();
        let target = b.alloc_label();
        // Table head at pc 0; offsets measured from pc 1.
        b.emit(
            Opcode::BrTable,
            &[pack_r_u32(VReg(9), 2), entries as u64],
        );
        b.fill_br_table_entry(target, entries, 0, 1);
        b.fill_br_table_entry(target, entries, 1, 1);
        b.emit(Opcode::Return, &[]);
        b.pin_label_here(target).unwrap();
        // SAFETY: entries block outlives the builder.
        unsafe {
            assert_eq!((*entries).offset, 3);
            assert_eq!((*entries.add(1)).offset, 3);
        }
    }
}
