//! Single-pass function translation.
//!
//! One linear walk over a validated function body fuses type checking,
//! register allocation, constant pooling, label resolution, and a small
//! result-relink peephole. The symbolic value stack shadows the Wasm operand
//! stack with per-slot provenance; the control stack tracks open frames and
//! reachability; the builder owns emission and back-patching.

pub mod builder;
pub mod control;
pub mod layout;
pub mod pool;
pub mod stack;

#[cfg(test)]
mod tests;

use wasmparser::{BlockType, FuncType, FunctionBody, MemArg, Operator, ValType};

use crate::arena::CodeArena;
use crate::code::{
    InstructionSequence, Opcode, VReg, pack_r_u32, pack_rr, pack_rr_u32, pack_rrr, pack_rrrr,
    pack_u32_pair,
};
use crate::context::{InternedType, TranslationContext, TypeInterner, address_type};
use crate::engine::Engine;
use crate::error::TranslationError;
use builder::{ISeqBuilder, LabelRef};
use control::{ControlFrame, ControlStack, FrameKind};
use layout::{FrameHeaderLayout, StackLayout};
use pool::ConstantPool;
use stack::{Entry, MetaValue, RegCopy, ValueSource, ValueStack};

/// Everything a branch needs to know about its target frame.
struct BranchInfo {
    continuation: LabelRef,
    stack_height: usize,
    /// Types the branch delivers to the landing area.
    label_types: Vec<ValType>,
    is_root: bool,
}

enum CallKind {
    Direct(u32),
    Indirect {
        table_index: u32,
        type_id: InternedType,
        address: Option<ValueSource>,
    },
}

/// Translates one function body into a register-based instruction sequence.
///
/// Drive it with one `translate` call per decoded operator, then `finalize`.
/// The first error wins; the partially built sequence is dropped with the
/// translator.
pub struct FunctionTranslator<'m, 'a> {
    engine: &'m Engine,
    ctx: &'m TranslationContext,
    interner: &'m TypeInterner,
    arena: &'a CodeArena,
    func_index: u32,
    /// Parameter types followed by declared locals (the Wasm local space).
    locals: Vec<ValType>,
    results: Vec<ValType>,
    header: FrameHeaderLayout,
    layout: StackLayout,
    values: ValueStack,
    control: ControlStack,
    builder: ISeqBuilder,
    pool: ConstantPool,
}

/// Expand a body's locals, size its frame, and run the translator over its
/// operator stream.
pub fn translate_body<'a>(
    engine: &Engine,
    ctx: &TranslationContext,
    interner: &TypeInterner,
    arena: &'a CodeArena,
    func_index: u32,
    body: &FunctionBody<'_>,
) -> anyhow::Result<(InstructionSequence<'a>, StackLayout)> {
    let mut locals = Vec::new();
    for local in body.get_locals_reader()? {
        let (count, ty) = local?;
        for _ in 0..count {
            locals.push(ty);
        }
    }
    let code_size = body.range().len();
    let mut translator =
        FunctionTranslator::new(engine, ctx, interner, arena, func_index, &locals, code_size)?;
    for op in body.get_operators_reader()? {
        translator.translate(&op?)?;
    }
    let layout = translator.layout();
    Ok((translator.finalize()?, layout))
}

impl<'m, 'a> FunctionTranslator<'m, 'a> {
    pub fn new(
        engine: &'m Engine,
        ctx: &'m TranslationContext,
        interner: &'m TypeInterner,
        arena: &'a CodeArena,
        func_index: u32,
        declared_locals: &[ValType],
        code_size: usize,
    ) -> Result<Self, TranslationError> {
        let ty = ctx.function_type(interner, func_index)?.clone();
        let header = FrameHeaderLayout::new(&ty);
        let layout = StackLayout::new(&ty, declared_locals.len(), code_size)?;
        let mut locals: Vec<ValType> = ty.params().to_vec();
        locals.extend_from_slice(declared_locals);
        let results = ty.results().to_vec();

        let mut builder = ISeqBuilder::new(engine.threading.clone());
        let mut control = ControlStack::default();
        let continuation = builder.alloc_label();
        control.push(ControlFrame {
            sig: ty,
            stack_height: 0,
            continuation,
            kind: FrameKind::Block { root: true },
            reachable: true,
        });
        if engine.intercept {
            builder.emit(Opcode::OnEnter, &[func_index as u64]);
        }

        Ok(FunctionTranslator {
            engine,
            ctx,
            interner,
            arena,
            func_index,
            locals,
            results,
            header,
            layout,
            values: ValueStack::new(layout),
            control,
            builder,
            pool: ConstantPool::new(layout.const_slot_size as usize),
        })
    }

    pub fn layout(&self) -> StackLayout {
        self.layout
    }

    /// Seal the sequence: all frames must be closed, all labels resolved.
    /// A trailing `return` backstops fall-through past the pinned end label.
    pub fn finalize(self) -> Result<InstructionSequence<'a>, TranslationError> {
        if !self.control.is_empty() {
            return Err(TranslationError::MissingEnd(self.control.len()));
        }
        let mut builder = self.builder;
        if self.engine.intercept {
            builder.emit(Opcode::OnExit, &[self.func_index as u64]);
        }
        builder.emit(Opcode::Return, &[]);
        let code = builder.finish()?;
        let arena = self.arena;
        let instructions = arena.intern_words(code);
        let constants = arena.intern_words(self.pool.into_words());
        Ok(InstructionSequence {
            instructions,
            constants,
            max_stack_height: self.layout.stack_reg_base as usize + self.values.max_height(),
        })
    }

    // --- operand-stack plumbing --------------------------------------------

    fn reachable(&self) -> Result<bool, TranslationError> {
        Ok(self.control.top()?.reachable)
    }

    /// Pop one operand. In unreachable code an exhausted stack yields a
    /// phantom (`Unknown`, no source) instead of underflowing.
    fn pop_any(&mut self) -> Result<(MetaValue, Option<ValueSource>), TranslationError> {
        let frame = self.control.top()?;
        if self.values.height() <= frame.stack_height {
            if frame.reachable {
                return Err(TranslationError::StackUnderflow);
            }
            return Ok((MetaValue::Unknown, None));
        }
        let (meta, source) = self
            .values
            .pop()
            .ok_or(TranslationError::InternalConsistency("pop on empty stack"))?;
        Ok((meta, Some(source)))
    }

    fn pop_expect(&mut self, expected: ValType) -> Result<Option<ValueSource>, TranslationError> {
        let reachable = self.reachable()?;
        let (meta, source) = self.pop_any()?;
        if let MetaValue::Known(found) = meta {
            if found != expected && reachable {
                return Err(TranslationError::TypeMismatch { expected, found });
            }
        }
        Ok(source)
    }

    fn pop_ref(&mut self) -> Result<Option<ValueSource>, TranslationError> {
        let reachable = self.reachable()?;
        let (meta, source) = self.pop_any()?;
        if let MetaValue::Known(found) = meta {
            if !matches!(found, ValType::Ref(_)) && reachable {
                return Err(TranslationError::TypeMismatch {
                    expected: ValType::FUNCREF,
                    found,
                });
            }
        }
        Ok(source)
    }

    fn vreg(&self, source: ValueSource) -> VReg {
        match source {
            ValueSource::Stack(reg) => reg,
            ValueSource::Local(index) => self.layout.local_reg(index),
            ValueSource::Const { slot, .. } => self.layout.const_reg(slot),
        }
    }

    fn local_type(&self, index: u32) -> Result<ValType, TranslationError> {
        self.locals
            .get(index as usize)
            .copied()
            .ok_or(TranslationError::IndexOutOfRange {
                space: "local",
                index,
                count: self.locals.len(),
            })
    }

    fn emit_copies(&mut self, copies: &[RegCopy]) {
        for copy in copies {
            self.builder
                .emit_producer(Opcode::Copy, &[pack_rr(copy.to, copy.from)], copy.to);
        }
    }

    fn emit_const(&mut self, ty: ValType, bits: u64, result: VReg, relinkable: bool) {
        if matches!(ty, ValType::I32 | ValType::F32) {
            let imms = [pack_r_u32(result, bits as u32)];
            if relinkable {
                self.builder.emit_producer(Opcode::Const32, &imms, result);
            } else {
                self.builder.emit(Opcode::Const32, &imms);
            }
        } else {
            let imms = [result.bits() as u64, bits];
            if relinkable {
                self.builder.emit_producer(Opcode::Const64, &imms, result);
            } else {
                self.builder.emit(Opcode::Const64, &imms);
            }
        }
    }

    /// Type-check the top `params.len()` operands in place against a frame
    /// signature's parameters.
    fn check_frame_params(&self, params: &[ValType]) -> Result<(), TranslationError> {
        let frame = self.control.top()?;
        let available = self.values.height() - frame.stack_height;
        for depth in 0..params.len() {
            let expected = params[params.len() - 1 - depth];
            if depth >= available {
                if frame.reachable {
                    return Err(TranslationError::StackUnderflow);
                }
                break;
            }
            if let Some((MetaValue::Known(found), _)) = self.values.peek(depth) {
                if found != expected && frame.reachable {
                    return Err(TranslationError::TypeMismatch { expected, found });
                }
            }
        }
        Ok(())
    }

    /// Pop a block parameter keeping its provenance so it can be re-pushed
    /// unchanged under the new frame.
    fn pop_param_entry(&mut self, expected: ValType) -> Result<Entry, TranslationError> {
        let reachable = self.reachable()?;
        let (meta, source) = self.pop_any()?;
        if let MetaValue::Known(found) = meta {
            if found != expected && reachable {
                return Err(TranslationError::TypeMismatch { expected, found });
            }
        }
        Ok(match source {
            Some(ValueSource::Local(index)) => Entry::Local {
                ty: match meta {
                    MetaValue::Known(ty) => ty,
                    MetaValue::Unknown => expected,
                },
                index,
            },
            Some(ValueSource::Const { slot, ty }) => Entry::Const { ty, slot },
            Some(ValueSource::Stack(_)) => Entry::Stack { meta },
            None => Entry::Stack {
                meta: MetaValue::Unknown,
            },
        })
    }

    // --- branches ----------------------------------------------------------

    fn branch_info(&self, depth: u32) -> Result<BranchInfo, TranslationError> {
        let frame = self.control.branch_target(depth)?;
        let label_types = match frame.kind {
            FrameKind::Loop => frame.sig.params().to_vec(),
            _ => frame.sig.results().to_vec(),
        };
        Ok(BranchInfo {
            continuation: frame.continuation,
            stack_height: frame.stack_height,
            label_types,
            is_root: frame.is_root(),
        })
    }

    /// Emit the copies delivering the top operands into a branch target's
    /// landing area. Destinations ascend and never sit above their sources,
    /// so earlier copies cannot clobber later ones.
    fn copy_on_branch(&mut self, target: &BranchInfo) -> Result<(), TranslationError> {
        let count = target.label_types.len();
        if count == 0 {
            return Ok(());
        }
        let floor = self.control.top()?.stack_height;
        if self.values.height() - floor < count {
            return Err(TranslationError::StackUnderflow);
        }
        let mut copies = Vec::with_capacity(count);
        for k in 0..count {
            let depth = count - 1 - k;
            let (meta, source) = self
                .values
                .peek(depth)
                .ok_or(TranslationError::InternalConsistency("branch operand missing"))?;
            if let MetaValue::Known(found) = meta {
                let expected = target.label_types[k];
                if found != expected {
                    return Err(TranslationError::TypeMismatch { expected, found });
                }
            }
            let from = self.vreg(source);
            let to = if target.is_root {
                self.header.return_reg(k)
            } else {
                self.layout.stack_reg(target.stack_height + k)
            };
            if from != to {
                copies.push((to, from));
            }
        }
        for (to, from) in copies {
            self.builder.emit(Opcode::Copy, &[pack_rr(to, from)]);
        }
        Ok(())
    }

    /// Copy the top operands into the result slots and emit the return,
    /// folding the top copy into its producer when possible.
    fn translate_return(&mut self) -> Result<(), TranslationError> {
        let count = self.results.len();
        let floor = self.control.top().map(|f| f.stack_height).unwrap_or(0);
        if self.values.height() < count || self.values.height() - count < floor {
            return Err(TranslationError::StackUnderflow);
        }
        for depth in 0..count {
            let expected = self.results[count - 1 - depth];
            if let Some((MetaValue::Known(found), _)) = self.values.peek(depth) {
                if found != expected {
                    return Err(TranslationError::TypeMismatch { expected, found });
                }
            }
        }
        let mut relinked = false;
        if count > 0 {
            if let Some((_, ValueSource::Stack(top))) = self.values.peek(0) {
                relinked = self
                    .builder
                    .relink_last_result(top, self.header.return_reg(count - 1));
            }
        }
        for k in 0..count {
            if k == count - 1 && relinked {
                continue;
            }
            let depth = count - 1 - k;
            let (_, source) = self
                .values
                .peek(depth)
                .ok_or(TranslationError::InternalConsistency("result operand missing"))?;
            let from = self.vreg(source);
            let to = self.header.return_reg(k);
            if from != to {
                self.builder.emit(Opcode::Copy, &[pack_rr(to, from)]);
            }
        }
        if self.engine.intercept {
            self.builder
                .emit(Opcode::OnExit, &[self.func_index as u64]);
        }
        self.builder.emit(Opcode::Return, &[]);
        Ok(())
    }

    // --- control operators -------------------------------------------------

    fn visit_unreachable(&mut self) -> Result<(), TranslationError> {
        if self.reachable()? {
            self.builder.emit(Opcode::Unreachable, &[]);
        }
        self.control.mark_unreachable()
    }

    fn visit_block(&mut self, block_type: BlockType) -> Result<(), TranslationError> {
        let sig = self.ctx.resolve_block_type(self.interner, block_type)?;
        let params: Vec<ValType> = sig.params().to_vec();
        let mut entries = Vec::with_capacity(params.len());
        for i in (0..params.len()).rev() {
            entries.push(self.pop_param_entry(params[i])?);
        }
        let stack_height = self.values.height();
        for entry in entries.into_iter().rev() {
            self.values.push_entry(entry)?;
        }
        let continuation = self.builder.alloc_label();
        let reachable = self.reachable()?;
        self.control.push(ControlFrame {
            sig,
            stack_height,
            continuation,
            kind: FrameKind::Block { root: false },
            reachable,
        });
        Ok(())
    }

    fn visit_loop(&mut self, block_type: BlockType) -> Result<(), TranslationError> {
        let sig = self.ctx.resolve_block_type(self.interner, block_type)?;
        self.check_frame_params(sig.params())?;
        let reachable = self.reachable()?;
        let available = self.values.height() - self.control.top()?.stack_height;
        let taken = sig.params().len().min(available);
        // Loop parameters are materialized before the header label so every
        // back edge finds them in the same registers.
        let copies = self.values.preserve_top(taken);
        if reachable {
            self.emit_copies(&copies);
        }
        let continuation = self.builder.put_label();
        let stack_height = self.values.height() - taken;
        self.control.push(ControlFrame {
            sig,
            stack_height,
            continuation,
            kind: FrameKind::Loop,
            reachable,
        });
        Ok(())
    }

    fn visit_if(&mut self, block_type: BlockType) -> Result<(), TranslationError> {
        let sig = self.ctx.resolve_block_type(self.interner, block_type)?;
        let cond = self.pop_expect(ValType::I32)?;
        self.check_frame_params(sig.params())?;
        let reachable = self.reachable()?;
        let available = self.values.height() - self.control.top()?.stack_height;
        let taken = sig.params().len().min(available);
        // Both arms read the parameters from the same registers, so they are
        // materialized up front like loop parameters.
        let copies = self.values.preserve_top(taken);
        if reachable {
            self.emit_copies(&copies);
        }
        let else_label = self.builder.alloc_label();
        let continuation = self.builder.alloc_label();
        if reachable {
            if let Some(cond) = cond {
                let cond_reg = self.vreg(cond);
                self.builder
                    .emit_with_label(Opcode::BrIfNot, else_label, move |offset| {
                        pack_r_u32(cond_reg, offset as u32)
                    });
            }
        }
        let stack_height = self.values.height() - taken;
        self.control.push(ControlFrame {
            sig,
            stack_height,
            continuation,
            kind: FrameKind::If {
                else_label,
                seen_else: false,
            },
            reachable,
        });
        Ok(())
    }

    fn visit_else(&mut self) -> Result<(), TranslationError> {
        let (continuation, stack_height, else_label, reachable, params) = {
            let frame = self.control.top()?;
            match frame.kind {
                FrameKind::If {
                    else_label,
                    seen_else: false,
                } => (
                    frame.continuation,
                    frame.stack_height,
                    else_label,
                    frame.reachable,
                    frame.sig.params().to_vec(),
                ),
                _ => {
                    return Err(TranslationError::ControlMismatch(
                        "else without a matching if",
                    ));
                }
            }
        };
        // Deliver the then-arm's results and jump over the else arm.
        let depth = self.values.height() - stack_height;
        let copies = self.values.preserve_top(depth);
        if reachable {
            self.emit_copies(&copies);
            self.builder
                .emit_with_label(Opcode::Br, continuation, |offset| {
                    pack_r_u32(VReg(0), offset as u32)
                });
        }
        self.values.truncate(stack_height);
        for ty in params {
            self.values.push(ty)?;
        }
        self.builder.pin_label_here(else_label)?;
        let baseline = self.control.parent_reachable();
        self.control.reset_reachability(baseline)?;
        if let FrameKind::If { seen_else, .. } = &mut self.control.top_mut()?.kind {
            *seen_else = true;
        }
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), TranslationError> {
        let frame = self.control.pop()?;
        if frame.is_root() {
            if frame.reachable {
                self.translate_return()?;
            }
            self.builder.pin_label_here(frame.continuation)?;
            return Ok(());
        }
        let depth = self.values.height() - frame.stack_height;
        let copies = self.values.preserve_top(depth);
        if frame.reachable {
            self.emit_copies(&copies);
        }
        // An if with no else arm lands its false edge here.
        if let FrameKind::If {
            else_label,
            seen_else: false,
        } = frame.kind
        {
            self.builder.pin_label_here(else_label)?;
        }
        if !matches!(frame.kind, FrameKind::Loop) {
            self.builder.pin_label_here(frame.continuation)?;
        }
        self.values.truncate(frame.stack_height);
        for ty in frame.sig.results() {
            self.values.push(*ty)?;
        }
        self.builder.reset_last_emission();
        Ok(())
    }

    fn visit_br(&mut self, depth: u32) -> Result<(), TranslationError> {
        let target = self.branch_info(depth)?;
        if self.reachable()? {
            self.copy_on_branch(&target)?;
            self.builder
                .emit_with_label(Opcode::Br, target.continuation, |offset| {
                    pack_r_u32(VReg(0), offset as u32)
                });
        }
        self.control.mark_unreachable()
    }

    fn visit_br_if(&mut self, depth: u32) -> Result<(), TranslationError> {
        let cond = self.pop_expect(ValType::I32)?;
        let target = self.branch_info(depth)?;
        if !self.reachable()? {
            return Ok(());
        }
        let cond = cond.ok_or(TranslationError::InternalConsistency(
            "missing branch condition",
        ))?;
        let cond_reg = self.vreg(cond);
        if target.label_types.is_empty() {
            self.builder
                .emit_with_label(Opcode::BrIf, target.continuation, move |offset| {
                    pack_r_u32(cond_reg, offset as u32)
                });
        } else {
            // The taken edge must copy values into the landing area without
            // disturbing the fall-through stack, so it detours through an
            // inverted branch around copy + br.
            let fallthrough = self.builder.alloc_label();
            self.builder
                .emit_with_label(Opcode::BrIfNot, fallthrough, move |offset| {
                    pack_r_u32(cond_reg, offset as u32)
                });
            self.copy_on_branch(&target)?;
            self.builder
                .emit_with_label(Opcode::Br, target.continuation, |offset| {
                    pack_r_u32(VReg(0), offset as u32)
                });
            self.builder.pin_label_here(fallthrough)?;
        }
        Ok(())
    }

    fn visit_br_table(&mut self, targets: &wasmparser::BrTable<'_>) -> Result<(), TranslationError> {
        let index = self.pop_expect(ValType::I32)?;
        let mut depths = Vec::with_capacity(targets.len() as usize + 1);
        for depth in targets.targets() {
            depths.push(depth.map_err(|_| {
                TranslationError::InternalConsistency("malformed br_table targets")
            })?);
        }
        depths.push(targets.default());
        let infos = depths
            .iter()
            .map(|&d| self.branch_info(d))
            .collect::<Result<Vec<_>, _>>()?;
        if self.reachable()? {
            let index = index.ok_or(TranslationError::InternalConsistency(
                "missing br_table index",
            ))?;
            let index_reg = self.vreg(index);
            let entries = self.arena.alloc_br_table(infos.len());
            let source = self.builder.pc() + 1;
            self.builder.emit(
                Opcode::BrTable,
                &[
                    pack_r_u32(index_reg, infos.len() as u32),
                    entries as usize as u64,
                ],
            );
            for (i, info) in infos.iter().enumerate() {
                if info.label_types.is_empty() {
                    // No values to move: the entry can aim straight at the
                    // target continuation.
                    self.builder
                        .fill_br_table_entry(info.continuation, entries, i, source);
                } else {
                    // Per-target trampoline: copy, then jump.
                    let trampoline = self.builder.put_label();
                    self.builder
                        .fill_br_table_entry(trampoline, entries, i, source);
                    self.copy_on_branch(info)?;
                    self.builder
                        .emit_with_label(Opcode::Br, info.continuation, |offset| {
                            pack_r_u32(VReg(0), offset as u32)
                        });
                }
            }
        }
        self.control.mark_unreachable()
    }

    fn visit_return(&mut self) -> Result<(), TranslationError> {
        if self.reachable()? {
            self.translate_return()?;
        }
        self.control.mark_unreachable()
    }

    fn visit_call_like(&mut self, ty: FuncType, kind: CallKind) -> Result<(), TranslationError> {
        let reachable = self.reachable()?;
        let params: Vec<ValType> = ty.params().to_vec();
        let mut args = Vec::with_capacity(params.len());
        for i in (0..params.len()).rev() {
            args.push(self.pop_expect(params[i])?);
        }
        args.reverse();
        let height = self.values.height();
        if reachable {
            // Arguments land in what will be the callee's parameter slots:
            // the registers just above the current stack top. Materialized
            // arguments are already in place.
            for (k, arg) in args.iter().enumerate() {
                let arg = arg.ok_or(TranslationError::InternalConsistency(
                    "missing call argument",
                ))?;
                let from = self.vreg(arg);
                let to = self.layout.stack_reg_checked(height + k)?;
                if from != to {
                    self.builder.emit(Opcode::Copy, &[pack_rr(to, from)]);
                }
            }
            let callee_header = FrameHeaderLayout::new(&ty);
            let sp_addend =
                self.layout.stack_reg_base as usize + height + callee_header.size() as usize;
            if sp_addend > i16::MAX as usize {
                return Err(TranslationError::InternalConsistency(
                    "call frame exceeds the register range",
                ));
            }
            let sp = VReg(sp_addend as i16);
            match kind {
                CallKind::Direct(function_index) => {
                    match self.ctx.resolve_callee(function_index)? {
                        Some(handle) if self.ctx.callee_in_same_instance(&handle) => {
                            // Same-instance Wasm callee: dispatch through the
                            // lazy-compilation thunk.
                            self.builder.emit(
                                Opcode::CompilingCall,
                                &[pack_r_u32(sp, function_index)],
                            );
                        }
                        Some(_) => {
                            self.builder
                                .emit(Opcode::Call, &[pack_r_u32(sp, function_index)]);
                        }
                        None => {}
                    }
                }
                CallKind::Indirect {
                    table_index,
                    type_id,
                    address,
                } => {
                    if !self.ctx.is_validation_only() {
                        let address = address.ok_or(TranslationError::InternalConsistency(
                            "missing call_indirect address",
                        ))?;
                        let address_reg = self.vreg(address);
                        self.builder.emit(
                            Opcode::CallIndirect,
                            &[
                                pack_rr_u32(address_reg, sp, table_index),
                                type_id.0 as u64,
                            ],
                        );
                    }
                }
            }
        }
        for ty in ty.results() {
            self.values.push(*ty)?;
        }
        Ok(())
    }

    fn visit_call(&mut self, function_index: u32) -> Result<(), TranslationError> {
        let ty = self.ctx.function_type(self.interner, function_index)?.clone();
        self.visit_call_like(ty, CallKind::Direct(function_index))
    }

    fn visit_call_indirect(
        &mut self,
        type_index: u32,
        table_index: u32,
    ) -> Result<(), TranslationError> {
        let type_id = self.ctx.type_id(type_index)?;
        let ty = self.interner.resolve(type_id).clone();
        let table64 = self.ctx.is_table64(table_index)?;
        let address = self.pop_expect(address_type(table64))?;
        self.visit_call_like(
            ty,
            CallKind::Indirect {
                table_index,
                type_id,
                address,
            },
        )
    }

    // --- parametric & variable operators -----------------------------------

    fn visit_drop(&mut self) -> Result<(), TranslationError> {
        self.pop_any()?;
        self.builder.reset_last_emission();
        Ok(())
    }

    fn visit_select(&mut self, expected: Option<ValType>) -> Result<(), TranslationError> {
        let reachable = self.reachable()?;
        let cond = self.pop_expect(ValType::I32)?;
        let (meta_true, on_true) = self.pop_any()?;
        let (meta_false, on_false) = self.pop_any()?;
        if reachable {
            if let (MetaValue::Known(t_false), MetaValue::Known(t_true)) = (meta_false, meta_true) {
                if t_false != t_true {
                    return Err(TranslationError::TypeMismatch {
                        expected: t_false,
                        found: t_true,
                    });
                }
            }
            if let Some(expected) = expected {
                for meta in [meta_false, meta_true] {
                    if let MetaValue::Known(found) = meta {
                        if found != expected {
                            return Err(TranslationError::TypeMismatch { expected, found });
                        }
                    }
                }
            }
        }
        let result_meta = expected
            .map(MetaValue::Known)
            .or(match meta_false {
                MetaValue::Known(_) => Some(meta_false),
                MetaValue::Unknown => None,
            })
            .or(match meta_true {
                MetaValue::Known(_) => Some(meta_true),
                MetaValue::Unknown => None,
            });
        let result = match result_meta {
            Some(MetaValue::Known(ty)) => self.values.push(ty)?,
            _ => self.values.push_unknown()?,
        };
        if reachable {
            if let (Some(cond), Some(on_true), Some(on_false)) = (cond, on_true, on_false) {
                let imms = [pack_rrrr(
                    result,
                    self.vreg(cond),
                    self.vreg(on_true),
                    self.vreg(on_false),
                )];
                self.builder.emit_producer(Opcode::Select, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_local_get(&mut self, index: u32) -> Result<(), TranslationError> {
        let ty = self.local_type(index)?;
        self.values.push_local(ty, index)?;
        // The push emits nothing, so the previous producer's result is no
        // longer what a following copy would consume.
        self.builder.reset_last_emission();
        Ok(())
    }

    fn visit_local_set(&mut self, index: u32, is_tee: bool) -> Result<(), TranslationError> {
        let ty = self.local_type(index)?;
        if is_tee && !self.reachable()? {
            return Ok(());
        }
        let reachable = self.reachable()?;
        // Any slot still aliasing this local must be copied out before the
        // local's register is overwritten.
        let copies = self.values.preserve_local(index);
        if reachable {
            self.emit_copies(&copies);
        }
        let source = self.pop_expect(ty)?;
        if reachable {
            if let Some(source) = source {
                let dest = self.layout.local_reg(index);
                match source {
                    ValueSource::Const { slot, .. } => {
                        // Pooled constant: write it straight into the local
                        // instead of copying out of the pool.
                        let bits = self.pool.get(slot);
                        self.emit_const(ty, bits, dest, false);
                    }
                    ValueSource::Stack(from) => {
                        if is_tee || !self.builder.relink_last_result(from, dest) {
                            self.builder.emit(Opcode::Copy, &[pack_rr(dest, from)]);
                        }
                    }
                    ValueSource::Local(other) => {
                        let from = self.layout.local_reg(other);
                        self.builder.emit(Opcode::Copy, &[pack_rr(dest, from)]);
                    }
                }
            }
        }
        if is_tee {
            self.values.push_local(ty, index)?;
        }
        Ok(())
    }

    fn visit_global_get(&mut self, index: u32) -> Result<(), TranslationError> {
        let ty = self.ctx.global_type(index)?.content_type;
        let reachable = self.reachable()?;
        let result = self.values.push(ty)?;
        if reachable {
            if let Some(handle) = self.ctx.resolve_global_handle(index)? {
                let imms = [pack_rr_u32(result, VReg(0), handle.index)];
                self.builder.emit_producer(Opcode::GlobalGet, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_global_set(&mut self, index: u32) -> Result<(), TranslationError> {
        let ty = self.ctx.global_type(index)?.content_type;
        let reachable = self.reachable()?;
        let value = self.pop_expect(ty)?;
        if reachable {
            if let (Some(value), Some(handle)) = (value, self.ctx.resolve_global_handle(index)?) {
                let value_reg = self.vreg(value);
                self.builder.emit(
                    Opcode::GlobalSet,
                    &[pack_rr_u32(value_reg, VReg(0), handle.index)],
                );
            }
        }
        Ok(())
    }

    // --- constants ----------------------------------------------------------

    fn visit_const(&mut self, ty: ValType, bits: u64) -> Result<(), TranslationError> {
        if !self.reachable()? {
            self.values.push(ty)?;
            return Ok(());
        }
        match self.pool.intern(bits) {
            Some(slot) => {
                self.values.push_const(ty, slot)?;
                // Nothing was emitted; a later copy would read the pool slot,
                // not the previous producer's result.
                self.builder.reset_last_emission();
            }
            None => {
                let result = self.values.push(ty)?;
                self.emit_const(ty, bits, result, true);
            }
        }
        Ok(())
    }

    // --- numeric shapes -----------------------------------------------------

    fn visit_unary(
        &mut self,
        input: ValType,
        output: ValType,
        opcode: Opcode,
    ) -> Result<(), TranslationError> {
        let reachable = self.reachable()?;
        let source = self.pop_expect(input)?;
        let result = self.values.push(output)?;
        if reachable {
            if let Some(source) = source {
                let input_reg = self.vreg(source);
                self.builder
                    .emit_producer(opcode, &[pack_rr(result, input_reg)], result);
            }
        }
        Ok(())
    }

    fn visit_binary(
        &mut self,
        operand: ValType,
        output: ValType,
        opcode: Opcode,
    ) -> Result<(), TranslationError> {
        let reachable = self.reachable()?;
        let rhs = self.pop_expect(operand)?;
        let lhs = self.pop_expect(operand)?;
        let result = self.values.push(output)?;
        if reachable {
            if let (Some(lhs), Some(rhs)) = (lhs, rhs) {
                let imms = [pack_rrr(result, self.vreg(lhs), self.vreg(rhs))];
                self.builder.emit_producer(opcode, &imms, result);
            }
        }
        Ok(())
    }

    // --- memory -------------------------------------------------------------

    fn check_alignment(&self, align: u8, is_64: bool) -> Result<(), TranslationError> {
        let width: u8 = if is_64 { 64 } else { 32 };
        if align >= width {
            return Err(TranslationError::InvalidAlignment { align, width });
        }
        Ok(())
    }

    fn visit_load(
        &mut self,
        memarg: &MemArg,
        output: ValType,
        opcode: Opcode,
    ) -> Result<(), TranslationError> {
        let memory64 = self.ctx.is_memory64(memarg.memory)?;
        self.check_alignment(memarg.align, memory64)?;
        let reachable = self.reachable()?;
        let pointer = self.pop_expect(address_type(memory64))?;
        let result = self.values.push(output)?;
        if reachable {
            if let Some(pointer) = pointer {
                let imms = [
                    pack_rr_u32(result, self.vreg(pointer), memarg.memory),
                    memarg.offset,
                ];
                self.builder.emit_producer(opcode, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_store(
        &mut self,
        memarg: &MemArg,
        value_type: ValType,
        opcode: Opcode,
    ) -> Result<(), TranslationError> {
        let memory64 = self.ctx.is_memory64(memarg.memory)?;
        self.check_alignment(memarg.align, memory64)?;
        let reachable = self.reachable()?;
        let value = self.pop_expect(value_type)?;
        let pointer = self.pop_expect(address_type(memory64))?;
        if reachable {
            if let (Some(value), Some(pointer)) = (value, pointer) {
                let imms = [
                    pack_rr_u32(self.vreg(value), self.vreg(pointer), memarg.memory),
                    memarg.offset,
                ];
                self.builder.emit(opcode, &imms);
            }
        }
        Ok(())
    }

    fn visit_memory_size(&mut self, memory: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_memory64(memory)?);
        let reachable = self.reachable()?;
        let result = self.values.push(address)?;
        if reachable {
            let imms = [pack_rr_u32(result, VReg(0), memory)];
            self.builder.emit_producer(Opcode::MemorySize, &imms, result);
        }
        Ok(())
    }

    fn visit_memory_grow(&mut self, memory: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_memory64(memory)?);
        let reachable = self.reachable()?;
        let delta = self.pop_expect(address)?;
        let result = self.values.push(address)?;
        if reachable {
            if let Some(delta) = delta {
                let imms = [pack_rr_u32(result, self.vreg(delta), memory)];
                self.builder.emit_producer(Opcode::MemoryGrow, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_memory_init(&mut self, data_index: u32, memory: u32) -> Result<(), TranslationError> {
        self.ctx.validate_data_segment(data_index)?;
        let address = address_type(self.ctx.is_memory64(memory)?);
        let reachable = self.reachable()?;
        let len = self.pop_expect(ValType::I32)?;
        let src = self.pop_expect(ValType::I32)?;
        let dest = self.pop_expect(address)?;
        if reachable {
            if let (Some(dest), Some(src), Some(len)) = (dest, src, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(src), self.vreg(len)),
                    pack_u32_pair(data_index, memory),
                ];
                self.builder.emit(Opcode::MemoryInit, &imms);
            }
        }
        Ok(())
    }

    fn visit_memory_copy(&mut self, dst_mem: u32, src_mem: u32) -> Result<(), TranslationError> {
        let dst64 = self.ctx.is_memory64(dst_mem)?;
        let src64 = self.ctx.is_memory64(src_mem)?;
        let reachable = self.reachable()?;
        // Mixed-width copies take their length in the wider address type.
        let len = self.pop_expect(address_type(dst64 || src64))?;
        let src = self.pop_expect(address_type(src64))?;
        let dest = self.pop_expect(address_type(dst64))?;
        if reachable {
            if let (Some(dest), Some(src), Some(len)) = (dest, src, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(src), self.vreg(len)),
                    pack_u32_pair(dst_mem, src_mem),
                ];
                self.builder.emit(Opcode::MemoryCopy, &imms);
            }
        }
        Ok(())
    }

    fn visit_memory_fill(&mut self, memory: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_memory64(memory)?);
        let reachable = self.reachable()?;
        let len = self.pop_expect(address)?;
        let value = self.pop_expect(ValType::I32)?;
        let dest = self.pop_expect(address)?;
        if reachable {
            if let (Some(dest), Some(value), Some(len)) = (dest, value, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(value), self.vreg(len)),
                    pack_u32_pair(memory, 0),
                ];
                self.builder.emit(Opcode::MemoryFill, &imms);
            }
        }
        Ok(())
    }

    fn visit_data_drop(&mut self, data_index: u32) -> Result<(), TranslationError> {
        self.ctx.validate_data_segment(data_index)?;
        if self.reachable()? {
            self.builder.emit(Opcode::DataDrop, &[data_index as u64]);
        }
        Ok(())
    }

    // --- tables -------------------------------------------------------------

    fn visit_table_get(&mut self, table: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_table64(table)?);
        let element = ValType::Ref(self.ctx.table_element_type(table)?);
        let reachable = self.reachable()?;
        let index = self.pop_expect(address)?;
        let result = self.values.push(element)?;
        if reachable {
            if let Some(index) = index {
                let imms = [pack_rr_u32(result, self.vreg(index), table)];
                self.builder.emit_producer(Opcode::TableGet, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_table_set(&mut self, table: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_table64(table)?);
        self.ctx.table_element_type(table)?;
        let reachable = self.reachable()?;
        let value = self.pop_ref()?;
        let index = self.pop_expect(address)?;
        if reachable {
            if let (Some(index), Some(value)) = (index, value) {
                let imms = [pack_rr_u32(self.vreg(index), self.vreg(value), table)];
                self.builder.emit(Opcode::TableSet, &imms);
            }
        }
        Ok(())
    }

    fn visit_table_size(&mut self, table: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_table64(table)?);
        let reachable = self.reachable()?;
        let result = self.values.push(address)?;
        if reachable {
            let imms = [pack_rr_u32(result, VReg(0), table)];
            self.builder.emit_producer(Opcode::TableSize, &imms, result);
        }
        Ok(())
    }

    fn visit_table_grow(&mut self, table: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_table64(table)?);
        self.ctx.table_element_type(table)?;
        let reachable = self.reachable()?;
        let delta = self.pop_expect(address)?;
        let init = self.pop_ref()?;
        let result = self.values.push(address)?;
        if reachable {
            if let (Some(init), Some(delta)) = (init, delta) {
                let imms = [
                    pack_rrr(result, self.vreg(init), self.vreg(delta)),
                    pack_u32_pair(table, 0),
                ];
                self.builder.emit_producer(Opcode::TableGrow, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_table_fill(&mut self, table: u32) -> Result<(), TranslationError> {
        let address = address_type(self.ctx.is_table64(table)?);
        self.ctx.table_element_type(table)?;
        let reachable = self.reachable()?;
        let len = self.pop_expect(address)?;
        let value = self.pop_ref()?;
        let dest = self.pop_expect(address)?;
        if reachable {
            if let (Some(dest), Some(value), Some(len)) = (dest, value, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(value), self.vreg(len)),
                    pack_u32_pair(table, 0),
                ];
                self.builder.emit(Opcode::TableFill, &imms);
            }
        }
        Ok(())
    }

    fn visit_table_copy(&mut self, dst_table: u32, src_table: u32) -> Result<(), TranslationError> {
        let dst64 = self.ctx.is_table64(dst_table)?;
        let src64 = self.ctx.is_table64(src_table)?;
        let reachable = self.reachable()?;
        let len = self.pop_expect(address_type(dst64 || src64))?;
        let src = self.pop_expect(address_type(src64))?;
        let dest = self.pop_expect(address_type(dst64))?;
        if reachable {
            if let (Some(dest), Some(src), Some(len)) = (dest, src, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(src), self.vreg(len)),
                    pack_u32_pair(dst_table, src_table),
                ];
                self.builder.emit(Opcode::TableCopy, &imms);
            }
        }
        Ok(())
    }

    fn visit_table_init(&mut self, elem_index: u32, table: u32) -> Result<(), TranslationError> {
        self.ctx.validate_element_segment(elem_index)?;
        let address = address_type(self.ctx.is_table64(table)?);
        let reachable = self.reachable()?;
        let len = self.pop_expect(ValType::I32)?;
        let src = self.pop_expect(ValType::I32)?;
        let dest = self.pop_expect(address)?;
        if reachable {
            if let (Some(dest), Some(src), Some(len)) = (dest, src, len) {
                let imms = [
                    pack_rrr(self.vreg(dest), self.vreg(src), self.vreg(len)),
                    pack_u32_pair(elem_index, table),
                ];
                self.builder.emit(Opcode::TableInit, &imms);
            }
        }
        Ok(())
    }

    fn visit_elem_drop(&mut self, elem_index: u32) -> Result<(), TranslationError> {
        self.ctx.validate_element_segment(elem_index)?;
        if self.reachable()? {
            self.builder.emit(Opcode::ElemDrop, &[elem_index as u64]);
        }
        Ok(())
    }

    // --- references ---------------------------------------------------------

    fn visit_ref_null(&mut self, heap_type: wasmparser::HeapType) -> Result<(), TranslationError> {
        let ref_type = wasmparser::RefType::new(true, heap_type)
            .ok_or(TranslationError::InternalConsistency("unrepresentable ref type"))?;
        let reachable = self.reachable()?;
        let result = self.values.push(ValType::Ref(ref_type))?;
        if reachable {
            self.builder
                .emit_producer(Opcode::RefNull, &[result.bits() as u64], result);
        }
        Ok(())
    }

    fn visit_ref_is_null(&mut self) -> Result<(), TranslationError> {
        let reachable = self.reachable()?;
        let value = self.pop_ref()?;
        let result = self.values.push(ValType::I32)?;
        if reachable {
            if let Some(value) = value {
                let imms = [pack_rr(result, self.vreg(value))];
                self.builder.emit_producer(Opcode::RefIsNull, &imms, result);
            }
        }
        Ok(())
    }

    fn visit_ref_func(&mut self, function_index: u32) -> Result<(), TranslationError> {
        self.ctx.validate_function_index(function_index)?;
        let reachable = self.reachable()?;
        let result = self.values.push(ValType::FUNCREF)?;
        if reachable {
            let imms = [pack_rr_u32(result, VReg(0), function_index)];
            self.builder.emit_producer(Opcode::RefFunc, &imms, result);
        }
        Ok(())
    }

    // --- dispatch -----------------------------------------------------------

    /// Translate one decoded operator. Exactly one call per operator in the
    /// body, including the final `end`.
    pub fn translate(&mut self, op: &Operator<'_>) -> Result<(), TranslationError> {
        use Opcode as O;
        use ValType::{F32, F64, I32, I64};
        match op {
            Operator::Unreachable => self.visit_unreachable(),
            Operator::Nop => Ok(()),
            Operator::Block { blockty } => self.visit_block(*blockty),
            Operator::Loop { blockty } => self.visit_loop(*blockty),
            Operator::If { blockty } => self.visit_if(*blockty),
            Operator::Else => self.visit_else(),
            Operator::End => self.visit_end(),
            Operator::Br { relative_depth } => self.visit_br(*relative_depth),
            Operator::BrIf { relative_depth } => self.visit_br_if(*relative_depth),
            Operator::BrTable { targets } => self.visit_br_table(targets),
            Operator::Return => self.visit_return(),
            Operator::Call { function_index } => self.visit_call(*function_index),
            Operator::CallIndirect {
                type_index,
                table_index,
            } => self.visit_call_indirect(*type_index, *table_index),

            Operator::Drop => self.visit_drop(),
            Operator::Select => self.visit_select(None),
            Operator::TypedSelect { ty } => self.visit_select(Some(*ty)),

            Operator::LocalGet { local_index } => self.visit_local_get(*local_index),
            Operator::LocalSet { local_index } => self.visit_local_set(*local_index, false),
            Operator::LocalTee { local_index } => self.visit_local_set(*local_index, true),
            Operator::GlobalGet { global_index } => self.visit_global_get(*global_index),
            Operator::GlobalSet { global_index } => self.visit_global_set(*global_index),

            Operator::I32Const { value } => self.visit_const(I32, *value as u32 as u64),
            Operator::I64Const { value } => self.visit_const(I64, *value as u64),
            Operator::F32Const { value } => self.visit_const(F32, value.bits() as u64),
            Operator::F64Const { value } => self.visit_const(F64, value.bits()),

            Operator::I32Load { memarg } => self.visit_load(memarg, I32, O::I32Load),
            Operator::I64Load { memarg } => self.visit_load(memarg, I64, O::I64Load),
            Operator::F32Load { memarg } => self.visit_load(memarg, F32, O::F32Load),
            Operator::F64Load { memarg } => self.visit_load(memarg, F64, O::F64Load),
            Operator::I32Load8S { memarg } => self.visit_load(memarg, I32, O::I32Load8S),
            Operator::I32Load8U { memarg } => self.visit_load(memarg, I32, O::I32Load8U),
            Operator::I32Load16S { memarg } => self.visit_load(memarg, I32, O::I32Load16S),
            Operator::I32Load16U { memarg } => self.visit_load(memarg, I32, O::I32Load16U),
            Operator::I64Load8S { memarg } => self.visit_load(memarg, I64, O::I64Load8S),
            Operator::I64Load8U { memarg } => self.visit_load(memarg, I64, O::I64Load8U),
            Operator::I64Load16S { memarg } => self.visit_load(memarg, I64, O::I64Load16S),
            Operator::I64Load16U { memarg } => self.visit_load(memarg, I64, O::I64Load16U),
            Operator::I64Load32S { memarg } => self.visit_load(memarg, I64, O::I64Load32S),
            Operator::I64Load32U { memarg } => self.visit_load(memarg, I64, O::I64Load32U),

            Operator::I32Store { memarg } => self.visit_store(memarg, I32, O::I32Store),
            Operator::I64Store { memarg } => self.visit_store(memarg, I64, O::I64Store),
            Operator::F32Store { memarg } => self.visit_store(memarg, F32, O::F32Store),
            Operator::F64Store { memarg } => self.visit_store(memarg, F64, O::F64Store),
            Operator::I32Store8 { memarg } => self.visit_store(memarg, I32, O::I32Store8),
            Operator::I32Store16 { memarg } => self.visit_store(memarg, I32, O::I32Store16),
            Operator::I64Store8 { memarg } => self.visit_store(memarg, I64, O::I64Store8),
            Operator::I64Store16 { memarg } => self.visit_store(memarg, I64, O::I64Store16),
            Operator::I64Store32 { memarg } => self.visit_store(memarg, I64, O::I64Store32),

            Operator::MemorySize { mem } => self.visit_memory_size(*mem),
            Operator::MemoryGrow { mem } => self.visit_memory_grow(*mem),
            Operator::MemoryInit { data_index, mem } => self.visit_memory_init(*data_index, *mem),
            Operator::DataDrop { data_index } => self.visit_data_drop(*data_index),
            Operator::MemoryCopy { dst_mem, src_mem } => {
                self.visit_memory_copy(*dst_mem, *src_mem)
            }
            Operator::MemoryFill { mem } => self.visit_memory_fill(*mem),

            Operator::TableGet { table } => self.visit_table_get(*table),
            Operator::TableSet { table } => self.visit_table_set(*table),
            Operator::TableSize { table } => self.visit_table_size(*table),
            Operator::TableGrow { table } => self.visit_table_grow(*table),
            Operator::TableFill { table } => self.visit_table_fill(*table),
            Operator::TableCopy {
                dst_table,
                src_table,
            } => self.visit_table_copy(*dst_table, *src_table),
            Operator::TableInit { elem_index, table } => {
                self.visit_table_init(*elem_index, *table)
            }
            Operator::ElemDrop { elem_index } => self.visit_elem_drop(*elem_index),

            Operator::RefNull { hty } => self.visit_ref_null(*hty),
            Operator::RefIsNull => self.visit_ref_is_null(),
            Operator::RefFunc { function_index } => self.visit_ref_func(*function_index),

            // i32 comparison
            Operator::I32Eqz => self.visit_unary(I32, I32, O::I32Eqz),
            Operator::I32Eq => self.visit_binary(I32, I32, O::I32Eq),
            Operator::I32Ne => self.visit_binary(I32, I32, O::I32Ne),
            Operator::I32LtS => self.visit_binary(I32, I32, O::I32LtS),
            Operator::I32LtU => self.visit_binary(I32, I32, O::I32LtU),
            Operator::I32GtS => self.visit_binary(I32, I32, O::I32GtS),
            Operator::I32GtU => self.visit_binary(I32, I32, O::I32GtU),
            Operator::I32LeS => self.visit_binary(I32, I32, O::I32LeS),
            Operator::I32LeU => self.visit_binary(I32, I32, O::I32LeU),
            Operator::I32GeS => self.visit_binary(I32, I32, O::I32GeS),
            Operator::I32GeU => self.visit_binary(I32, I32, O::I32GeU),

            // i32 arithmetic
            Operator::I32Clz => self.visit_unary(I32, I32, O::I32Clz),
            Operator::I32Ctz => self.visit_unary(I32, I32, O::I32Ctz),
            Operator::I32Popcnt => self.visit_unary(I32, I32, O::I32Popcnt),
            Operator::I32Add => self.visit_binary(I32, I32, O::I32Add),
            Operator::I32Sub => self.visit_binary(I32, I32, O::I32Sub),
            Operator::I32Mul => self.visit_binary(I32, I32, O::I32Mul),
            Operator::I32DivS => self.visit_binary(I32, I32, O::I32DivS),
            Operator::I32DivU => self.visit_binary(I32, I32, O::I32DivU),
            Operator::I32RemS => self.visit_binary(I32, I32, O::I32RemS),
            Operator::I32RemU => self.visit_binary(I32, I32, O::I32RemU),
            Operator::I32And => self.visit_binary(I32, I32, O::I32And),
            Operator::I32Or => self.visit_binary(I32, I32, O::I32Or),
            Operator::I32Xor => self.visit_binary(I32, I32, O::I32Xor),
            Operator::I32Shl => self.visit_binary(I32, I32, O::I32Shl),
            Operator::I32ShrS => self.visit_binary(I32, I32, O::I32ShrS),
            Operator::I32ShrU => self.visit_binary(I32, I32, O::I32ShrU),
            Operator::I32Rotl => self.visit_binary(I32, I32, O::I32Rotl),
            Operator::I32Rotr => self.visit_binary(I32, I32, O::I32Rotr),

            // i64 comparison
            Operator::I64Eqz => self.visit_unary(I64, I32, O::I64Eqz),
            Operator::I64Eq => self.visit_binary(I64, I32, O::I64Eq),
            Operator::I64Ne => self.visit_binary(I64, I32, O::I64Ne),
            Operator::I64LtS => self.visit_binary(I64, I32, O::I64LtS),
            Operator::I64LtU => self.visit_binary(I64, I32, O::I64LtU),
            Operator::I64GtS => self.visit_binary(I64, I32, O::I64GtS),
            Operator::I64GtU => self.visit_binary(I64, I32, O::I64GtU),
            Operator::I64LeS => self.visit_binary(I64, I32, O::I64LeS),
            Operator::I64LeU => self.visit_binary(I64, I32, O::I64LeU),
            Operator::I64GeS => self.visit_binary(I64, I32, O::I64GeS),
            Operator::I64GeU => self.visit_binary(I64, I32, O::I64GeU),

            // i64 arithmetic
            Operator::I64Clz => self.visit_unary(I64, I64, O::I64Clz),
            Operator::I64Ctz => self.visit_unary(I64, I64, O::I64Ctz),
            Operator::I64Popcnt => self.visit_unary(I64, I64, O::I64Popcnt),
            Operator::I64Add => self.visit_binary(I64, I64, O::I64Add),
            Operator::I64Sub => self.visit_binary(I64, I64, O::I64Sub),
            Operator::I64Mul => self.visit_binary(I64, I64, O::I64Mul),
            Operator::I64DivS => self.visit_binary(I64, I64, O::I64DivS),
            Operator::I64DivU => self.visit_binary(I64, I64, O::I64DivU),
            Operator::I64RemS => self.visit_binary(I64, I64, O::I64RemS),
            Operator::I64RemU => self.visit_binary(I64, I64, O::I64RemU),
            Operator::I64And => self.visit_binary(I64, I64, O::I64And),
            Operator::I64Or => self.visit_binary(I64, I64, O::I64Or),
            Operator::I64Xor => self.visit_binary(I64, I64, O::I64Xor),
            Operator::I64Shl => self.visit_binary(I64, I64, O::I64Shl),
            Operator::I64ShrS => self.visit_binary(I64, I64, O::I64ShrS),
            Operator::I64ShrU => self.visit_binary(I64, I64, O::I64ShrU),
            Operator::I64Rotl => self.visit_binary(I64, I64, O::I64Rotl),
            Operator::I64Rotr => self.visit_binary(I64, I64, O::I64Rotr),

            // f32
            Operator::F32Eq => self.visit_binary(F32, I32, O::F32Eq),
            Operator::F32Ne => self.visit_binary(F32, I32, O::F32Ne),
            Operator::F32Lt => self.visit_binary(F32, I32, O::F32Lt),
            Operator::F32Gt => self.visit_binary(F32, I32, O::F32Gt),
            Operator::F32Le => self.visit_binary(F32, I32, O::F32Le),
            Operator::F32Ge => self.visit_binary(F32, I32, O::F32Ge),
            Operator::F32Abs => self.visit_unary(F32, F32, O::F32Abs),
            Operator::F32Neg => self.visit_unary(F32, F32, O::F32Neg),
            Operator::F32Ceil => self.visit_unary(F32, F32, O::F32Ceil),
            Operator::F32Floor => self.visit_unary(F32, F32, O::F32Floor),
            Operator::F32Trunc => self.visit_unary(F32, F32, O::F32Trunc),
            Operator::F32Nearest => self.visit_unary(F32, F32, O::F32Nearest),
            Operator::F32Sqrt => self.visit_unary(F32, F32, O::F32Sqrt),
            Operator::F32Add => self.visit_binary(F32, F32, O::F32Add),
            Operator::F32Sub => self.visit_binary(F32, F32, O::F32Sub),
            Operator::F32Mul => self.visit_binary(F32, F32, O::F32Mul),
            Operator::F32Div => self.visit_binary(F32, F32, O::F32Div),
            Operator::F32Min => self.visit_binary(F32, F32, O::F32Min),
            Operator::F32Max => self.visit_binary(F32, F32, O::F32Max),
            Operator::F32Copysign => self.visit_binary(F32, F32, O::F32Copysign),

            // f64
            Operator::F64Eq => self.visit_binary(F64, I32, O::F64Eq),
            Operator::F64Ne => self.visit_binary(F64, I32, O::F64Ne),
            Operator::F64Lt => self.visit_binary(F64, I32, O::F64Lt),
            Operator::F64Gt => self.visit_binary(F64, I32, O::F64Gt),
            Operator::F64Le => self.visit_binary(F64, I32, O::F64Le),
            Operator::F64Ge => self.visit_binary(F64, I32, O::F64Ge),
            Operator::F64Abs => self.visit_unary(F64, F64, O::F64Abs),
            Operator::F64Neg => self.visit_unary(F64, F64, O::F64Neg),
            Operator::F64Ceil => self.visit_unary(F64, F64, O::F64Ceil),
            Operator::F64Floor => self.visit_unary(F64, F64, O::F64Floor),
            Operator::F64Trunc => self.visit_unary(F64, F64, O::F64Trunc),
            Operator::F64Nearest => self.visit_unary(F64, F64, O::F64Nearest),
            Operator::F64Sqrt => self.visit_unary(F64, F64, O::F64Sqrt),
            Operator::F64Add => self.visit_binary(F64, F64, O::F64Add),
            Operator::F64Sub => self.visit_binary(F64, F64, O::F64Sub),
            Operator::F64Mul => self.visit_binary(F64, F64, O::F64Mul),
            Operator::F64Div => self.visit_binary(F64, F64, O::F64Div),
            Operator::F64Min => self.visit_binary(F64, F64, O::F64Min),
            Operator::F64Max => self.visit_binary(F64, F64, O::F64Max),
            Operator::F64Copysign => self.visit_binary(F64, F64, O::F64Copysign),

            // Conversions
            Operator::I32WrapI64 => self.visit_unary(I64, I32, O::I32WrapI64),
            Operator::I64ExtendI32S => self.visit_unary(I32, I64, O::I64ExtendI32S),
            Operator::I64ExtendI32U => self.visit_unary(I32, I64, O::I64ExtendI32U),
            Operator::I32TruncF32S => self.visit_unary(F32, I32, O::I32TruncF32S),
            Operator::I32TruncF32U => self.visit_unary(F32, I32, O::I32TruncF32U),
            Operator::I32TruncF64S => self.visit_unary(F64, I32, O::I32TruncF64S),
            Operator::I32TruncF64U => self.visit_unary(F64, I32, O::I32TruncF64U),
            Operator::I64TruncF32S => self.visit_unary(F32, I64, O::I64TruncF32S),
            Operator::I64TruncF32U => self.visit_unary(F32, I64, O::I64TruncF32U),
            Operator::I64TruncF64S => self.visit_unary(F64, I64, O::I64TruncF64S),
            Operator::I64TruncF64U => self.visit_unary(F64, I64, O::I64TruncF64U),
            Operator::F32ConvertI32S => self.visit_unary(I32, F32, O::F32ConvertI32S),
            Operator::F32ConvertI32U => self.visit_unary(I32, F32, O::F32ConvertI32U),
            Operator::F32ConvertI64S => self.visit_unary(I64, F32, O::F32ConvertI64S),
            Operator::F32ConvertI64U => self.visit_unary(I64, F32, O::F32ConvertI64U),
            Operator::F32DemoteF64 => self.visit_unary(F64, F32, O::F32DemoteF64),
            Operator::F64ConvertI32S => self.visit_unary(I32, F64, O::F64ConvertI32S),
            Operator::F64ConvertI32U => self.visit_unary(I32, F64, O::F64ConvertI32U),
            Operator::F64ConvertI64S => self.visit_unary(I64, F64, O::F64ConvertI64S),
            Operator::F64ConvertI64U => self.visit_unary(I64, F64, O::F64ConvertI64U),
            Operator::F64PromoteF32 => self.visit_unary(F32, F64, O::F64PromoteF32),
            Operator::I32ReinterpretF32 => self.visit_unary(F32, I32, O::I32ReinterpretF32),
            Operator::I64ReinterpretF64 => self.visit_unary(F64, I64, O::I64ReinterpretF64),
            Operator::F32ReinterpretI32 => self.visit_unary(I32, F32, O::F32ReinterpretI32),
            Operator::F64ReinterpretI64 => self.visit_unary(I64, F64, O::F64ReinterpretI64),

            // Sign extension
            Operator::I32Extend8S => self.visit_unary(I32, I32, O::I32Extend8S),
            Operator::I32Extend16S => self.visit_unary(I32, I32, O::I32Extend16S),
            Operator::I64Extend8S => self.visit_unary(I64, I64, O::I64Extend8S),
            Operator::I64Extend16S => self.visit_unary(I64, I64, O::I64Extend16S),
            Operator::I64Extend32S => self.visit_unary(I64, I64, O::I64Extend32S),

            // Saturating truncation
            Operator::I32TruncSatF32S => self.visit_unary(F32, I32, O::I32TruncSatF32S),
            Operator::I32TruncSatF32U => self.visit_unary(F32, I32, O::I32TruncSatF32U),
            Operator::I32TruncSatF64S => self.visit_unary(F64, I32, O::I32TruncSatF64S),
            Operator::I32TruncSatF64U => self.visit_unary(F64, I32, O::I32TruncSatF64U),
            Operator::I64TruncSatF32S => self.visit_unary(F32, I64, O::I64TruncSatF32S),
            Operator::I64TruncSatF32U => self.visit_unary(F32, I64, O::I64TruncSatF32U),
            Operator::I64TruncSatF64S => self.visit_unary(F64, I64, O::I64TruncSatF64S),
            Operator::I64TruncSatF64U => self.visit_unary(F64, I64, O::I64TruncSatF64U),

            other => Err(TranslationError::Unsupported(format!("{other:?}"))),
        }
    }
}
