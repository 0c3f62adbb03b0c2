use wasmparser::FuncType;

use crate::code::VReg;
use crate::error::TranslationError;

/// Negative-offset plan for a frame header.
///
/// The header sits below the callee's SP. Parameters and results alias the
/// same slots (the caller writes arguments there; the callee overwrites them
/// with results on the way out), followed by three saved caller slots:
/// instance, PC, SP at offsets -3, -2, -1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeaderLayout {
    param_result_base: u32,
}

impl FrameHeaderLayout {
    pub fn new(ty: &FuncType) -> Self {
        let width = ty.params().len().max(ty.results().len()) as u32;
        FrameHeaderLayout {
            param_result_base: width + 3,
        }
    }

    /// Total header size in slots, i.e. the distance from the first
    /// param/result slot up to SP.
    pub fn size(&self) -> u32 {
        self.param_result_base
    }

    pub fn param_reg(&self, i: usize) -> VReg {
        VReg((i as i64 - self.param_result_base as i64) as i16)
    }

    pub fn return_reg(&self, i: usize) -> VReg {
        self.param_reg(i)
    }
}

/// Non-negative register plan: declared locals first, then the constant
/// slots, then the operand-stack region.
#[derive(Clone, Copy, Debug)]
pub struct StackLayout {
    pub header: FrameHeaderLayout,
    pub num_params: u16,
    pub num_results: u16,
    /// Declared (non-parameter) locals.
    pub num_locals: u16,
    pub const_slot_size: u16,
    pub stack_reg_base: u16,
}

/// What a frame-relative slot means, for the textual dumper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotRole {
    /// Header slot used as a parameter only.
    Param(u16),
    /// Header slot used as a result only.
    Result(u16),
    /// Header slot aliased between parameter and result.
    ParamResult(u16),
    SavedInstance,
    SavedPc,
    SavedSp,
    /// Declared local, numbered in the Wasm local index space.
    Local(u16),
    Const(u16),
    Stack(u16),
}

impl std::fmt::Display for SlotRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotRole::Param(i) => write!(f, "p{i}"),
            SlotRole::Result(i) => write!(f, "r{i}"),
            SlotRole::ParamResult(i) => write!(f, "pr{i}"),
            SlotRole::SavedInstance => write!(f, "caller.instance"),
            SlotRole::SavedPc => write!(f, "caller.pc"),
            SlotRole::SavedSp => write!(f, "caller.sp"),
            SlotRole::Local(i) => write!(f, "l{i}"),
            SlotRole::Const(i) => write!(f, "c{i}"),
            SlotRole::Stack(i) => write!(f, "s{i}"),
        }
    }
}

impl StackLayout {
    /// Derive the register plan for one function.
    ///
    /// The constant-slot budget scales with body size so large functions get
    /// more pooling headroom, floored at four slots. The whole non-negative
    /// region must stay within the signed 16-bit register range.
    pub fn new(
        ty: &FuncType,
        num_locals: usize,
        code_size: usize,
    ) -> Result<Self, TranslationError> {
        let header = FrameHeaderLayout::new(ty);
        if header.size() > i16::MAX as u32 + 1 {
            return Err(TranslationError::InternalConsistency(
                "frame header exceeds the register range",
            ));
        }
        let const_slot_size = (code_size / 20).max(4);
        let stack_reg_base = num_locals
            .checked_add(const_slot_size)
            .filter(|&base| base <= i16::MAX as usize)
            .ok_or(TranslationError::ConstSlotOverflow)?;
        Ok(StackLayout {
            header,
            num_params: ty.params().len() as u16,
            num_results: ty.results().len() as u16,
            num_locals: num_locals as u16,
            const_slot_size: const_slot_size as u16,
            stack_reg_base: stack_reg_base as u16,
        })
    }

    /// Register of a local in the Wasm index space (parameters included).
    pub fn local_reg(&self, index: u32) -> VReg {
        if index < self.num_params as u32 {
            self.header.param_reg(index as usize)
        } else {
            VReg((index - self.num_params as u32) as i16)
        }
    }

    pub fn const_reg(&self, slot: u16) -> VReg {
        VReg((self.num_locals + slot) as i16)
    }

    /// Register of the operand-stack slot at `position` (0 = frame bottom).
    pub fn stack_reg(&self, position: usize) -> VReg {
        VReg((self.stack_reg_base as usize + position) as i16)
    }

    /// As `stack_reg`, but refuses positions past the register range.
    pub fn stack_reg_checked(&self, position: usize) -> Result<VReg, TranslationError> {
        if self.stack_reg_base as usize + position > i16::MAX as usize {
            return Err(TranslationError::InternalConsistency(
                "operand stack exceeds the register range",
            ));
        }
        Ok(self.stack_reg(position))
    }

    pub fn role(&self, reg: VReg) -> SlotRole {
        let r = reg.0 as i32;
        if r < 0 {
            return match r {
                -3 => SlotRole::SavedInstance,
                -2 => SlotRole::SavedPc,
                -1 => SlotRole::SavedSp,
                _ => {
                    let i = (r + self.header.size() as i32) as u16;
                    match (i < self.num_params, i < self.num_results) {
                        (true, true) => SlotRole::ParamResult(i),
                        (true, false) => SlotRole::Param(i),
                        _ => SlotRole::Result(i),
                    }
                }
            };
        }
        let r = r as u16;
        if r < self.num_locals {
            SlotRole::Local(self.num_params + r)
        } else if r < self.stack_reg_base {
            SlotRole::Const(r - self.num_locals)
        } else {
            SlotRole::Stack(r - self.stack_reg_base)
        }
    }
}
