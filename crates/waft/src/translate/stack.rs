use wasmparser::ValType;

use crate::code::VReg;
use crate::error::TranslationError;
use crate::translate::layout::StackLayout;

/// Statically known operand type, or `Unknown` for values conjured in
/// unreachable code, where the stack is polymorphic and checks pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetaValue {
    Known(ValType),
    Unknown,
}

/// Where a popped operand physically lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueSource {
    /// Materialized operand-stack slot.
    Stack(VReg),
    /// Mirrors a local; nothing was emitted for the push.
    Local(u32),
    /// References a constant-pool slot.
    Const { slot: u16, ty: ValType },
}

/// One symbolic stack slot with its provenance.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Entry {
    Local { ty: ValType, index: u32 },
    Stack { meta: MetaValue },
    Const { ty: ValType, slot: u16 },
}

/// A register-to-register copy the caller must emit to make a preservation
/// real.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct RegCopy {
    pub from: VReg,
    pub to: VReg,
}

/// Compile-time shadow of the Wasm operand stack.
///
/// Height equals the logical Wasm stack height at every point; the maximum
/// over the whole function decides the runtime frame size. Slots that alias
/// a local or the constant pool defer materialization until preservation
/// forces a copy.
pub(crate) struct ValueStack {
    entries: Vec<Entry>,
    layout: StackLayout,
    max_height: usize,
}

impl ValueStack {
    pub(crate) fn new(layout: StackLayout) -> Self {
        ValueStack {
            entries: Vec::new(),
            layout,
            max_height: 0,
        }
    }

    pub(crate) fn height(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn max_height(&self) -> usize {
        self.max_height
    }

    pub(crate) fn push_entry(&mut self, entry: Entry) -> Result<VReg, TranslationError> {
        let reg = self.layout.stack_reg_checked(self.entries.len())?;
        self.entries.push(entry);
        self.max_height = self.max_height.max(self.entries.len());
        Ok(reg)
    }

    /// Push a materialized slot of known type; returns its register.
    pub(crate) fn push(&mut self, ty: ValType) -> Result<VReg, TranslationError> {
        self.push_entry(Entry::Stack {
            meta: MetaValue::Known(ty),
        })
    }

    pub(crate) fn push_unknown(&mut self) -> Result<VReg, TranslationError> {
        self.push_entry(Entry::Stack {
            meta: MetaValue::Unknown,
        })
    }

    pub(crate) fn push_local(&mut self, ty: ValType, index: u32) -> Result<(), TranslationError> {
        self.push_entry(Entry::Local { ty, index })?;
        Ok(())
    }

    pub(crate) fn push_const(&mut self, ty: ValType, slot: u16) -> Result<(), TranslationError> {
        self.push_entry(Entry::Const { ty, slot })?;
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Option<(MetaValue, ValueSource)> {
        let position = self.entries.len().checked_sub(1)?;
        let entry = self.entries.pop()?;
        Some(self.describe(entry, position))
    }

    /// Entry at `depth` below the top (0 = top) without popping.
    pub(crate) fn peek(&self, depth: usize) -> Option<(MetaValue, ValueSource)> {
        let position = self.entries.len().checked_sub(depth + 1)?;
        Some(self.describe(self.entries[position], position))
    }

    pub(crate) fn truncate(&mut self, height: usize) {
        self.entries.truncate(height);
    }

    /// Materialize every slot that mirrors local `index`, so the local's
    /// register can be overwritten without losing live operands. Returns the
    /// copies the caller must emit, in stack order.
    pub(crate) fn preserve_local(&mut self, index: u32) -> Vec<RegCopy> {
        let mut copies = Vec::new();
        for position in 0..self.entries.len() {
            if let Entry::Local { ty, index: i } = self.entries[position] {
                if i == index {
                    let to = self.layout.stack_reg(position);
                    copies.push(RegCopy {
                        from: self.layout.local_reg(index),
                        to,
                    });
                    self.entries[position] = Entry::Stack {
                        meta: MetaValue::Known(ty),
                    };
                }
            }
        }
        copies
    }

    /// Materialize local- and constant-aliased slots among the top `depth`
    /// entries (clamped to the actual height). Used at control-flow
    /// boundaries where the landing positions must hold real values.
    pub(crate) fn preserve_top(&mut self, depth: usize) -> Vec<RegCopy> {
        let mut copies = Vec::new();
        let start = self.entries.len().saturating_sub(depth);
        for position in start..self.entries.len() {
            let to = self.layout.stack_reg(position);
            let materialized = match self.entries[position] {
                Entry::Local { ty, index } => {
                    copies.push(RegCopy {
                        from: self.layout.local_reg(index),
                        to,
                    });
                    ty
                }
                Entry::Const { ty, slot } => {
                    copies.push(RegCopy {
                        from: self.layout.const_reg(slot),
                        to,
                    });
                    ty
                }
                Entry::Stack { .. } => continue,
            };
            self.entries[position] = Entry::Stack {
                meta: MetaValue::Known(materialized),
            };
        }
        copies
    }

    fn describe(&self, entry: Entry, position: usize) -> (MetaValue, ValueSource) {
        match entry {
            Entry::Stack { meta } => (meta, ValueSource::Stack(self.layout.stack_reg(position))),
            Entry::Local { ty, index } => (MetaValue::Known(ty), ValueSource::Local(index)),
            Entry::Const { ty, slot } => (MetaValue::Known(ty), ValueSource::Const { slot, ty }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmparser::FuncType;

    fn stack() -> ValueStack {
        let ty = FuncType::new([ValType::I32], [ValType::I32]);
        ValueStack::new(StackLayout::new(&ty, 2, 40).unwrap())
    }

    #[test]
    fn pushes_report_stack_registers() {
        let mut s = stack();
        // 2 locals + 4 const slots.
        assert_eq!(s.push(ValType::I32).unwrap(), VReg(6));
        assert_eq!(s.push(ValType::I64).unwrap(), VReg(7));
        assert_eq!(s.height(), 2);
        assert_eq!(s.max_height(), 2);
        s.pop();
        s.pop();
        assert_eq!(s.height(), 0);
        assert_eq!(s.max_height(), 2);
    }

    #[test]
    fn provenance_survives_push_and_pop() {
        let mut s = stack();
        s.push_local(ValType::I32, 0).unwrap();
        s.push_const(ValType::I32, 3).unwrap();
        let (meta, src) = s.pop().unwrap();
        assert_eq!(meta, MetaValue::Known(ValType::I32));
        assert_eq!(
            src,
            ValueSource::Const {
                slot: 3,
                ty: ValType::I32
            }
        );
        let (_, src) = s.pop().unwrap();
        assert_eq!(src, ValueSource::Local(0));
    }

    #[test]
    fn preserve_local_rewrites_every_alias() {
        let mut s = stack();
        s.push_local(ValType::I32, 1).unwrap();
        s.push(ValType::I32).unwrap();
        s.push_local(ValType::I32, 1).unwrap();
        s.push_local(ValType::I32, 2).unwrap();

        let copies = s.preserve_local(1);
        // local 1 is the first declared local: register 0.
        assert_eq!(
            copies,
            vec![
                RegCopy {
                    from: VReg(0),
                    to: VReg(6)
                },
                RegCopy {
                    from: VReg(0),
                    to: VReg(8)
                },
            ]
        );
        // Aliases of local 1 are gone; local 2 is untouched.
        let (_, top) = s.pop().unwrap();
        assert_eq!(top, ValueSource::Local(2));
        let (_, next) = s.pop().unwrap();
        assert_eq!(next, ValueSource::Stack(VReg(8)));
    }

    #[test]
    fn preserve_top_materializes_consts_and_locals() {
        let mut s = stack();
        s.push_local(ValType::I32, 0).unwrap();
        s.push_const(ValType::I64, 1).unwrap();
        s.push(ValType::F64).unwrap();

        let copies = s.preserve_top(2);
        assert_eq!(
            copies,
            vec![RegCopy {
                from: VReg(3), // const slot 1 after 2 locals
                to: VReg(7),
            }]
        );
        // Below the preserved depth the local alias survives.
        s.pop();
        s.pop();
        let (_, bottom) = s.pop().unwrap();
        assert_eq!(bottom, ValueSource::Local(0));
    }
}
