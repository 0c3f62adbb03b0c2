use wasmparser::FuncType;

use crate::error::TranslationError;
use crate::translate::builder::LabelRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Block {
        /// The implicit frame covering the whole function body.
        root: bool,
    },
    Loop,
    If {
        else_label: LabelRef,
        seen_else: bool,
    },
}

/// One open structured-control frame.
///
/// `continuation` is where branches targeting this frame land: the end label
/// for blocks and ifs, the already-pinned header label for loops.
pub(crate) struct ControlFrame {
    pub sig: FuncType,
    /// Operand-stack height underneath this frame's values.
    pub stack_height: usize,
    pub continuation: LabelRef,
    pub kind: FrameKind,
    pub reachable: bool,
}

impl ControlFrame {
    /// Values a branch to this frame must deliver: results for blocks and
    /// ifs, parameters for loops (loop branches re-enter the header).
    pub(crate) fn copy_count(&self) -> usize {
        match self.kind {
            FrameKind::Loop => self.sig.params().len(),
            _ => self.sig.results().len(),
        }
    }

    pub(crate) fn is_root(&self) -> bool {
        matches!(self.kind, FrameKind::Block { root: true })
    }
}

#[derive(Default)]
pub(crate) struct ControlStack {
    frames: Vec<ControlFrame>,
}

impl ControlStack {
    pub(crate) fn push(&mut self, frame: ControlFrame) {
        self.frames.push(frame);
    }

    pub(crate) fn pop(&mut self) -> Result<ControlFrame, TranslationError> {
        self.frames
            .pop()
            .ok_or(TranslationError::ControlMismatch("end without an open frame"))
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub(crate) fn top(&self) -> Result<&ControlFrame, TranslationError> {
        self.frames
            .last()
            .ok_or(TranslationError::UnexpectedTrailingInstruction)
    }

    pub(crate) fn top_mut(&mut self) -> Result<&mut ControlFrame, TranslationError> {
        self.frames
            .last_mut()
            .ok_or(TranslationError::UnexpectedTrailingInstruction)
    }

    /// Frame addressed by a branch's relative depth (0 = innermost).
    pub(crate) fn branch_target(&self, depth: u32) -> Result<&ControlFrame, TranslationError> {
        let count = self.frames.len();
        if depth as usize >= count {
            return Err(TranslationError::RelativeDepthOutOfRange {
                depth,
                frames: count,
            });
        }
        Ok(&self.frames[count - 1 - depth as usize])
    }

    /// Reachability of the frame enclosing the top one. Used by `else` to
    /// restore the arm's baseline.
    pub(crate) fn parent_reachable(&self) -> bool {
        match self.frames.len() {
            0 | 1 => true,
            n => self.frames[n - 2].reachable,
        }
    }

    pub(crate) fn mark_unreachable(&mut self) -> Result<(), TranslationError> {
        self.top_mut()?.reachable = false;
        Ok(())
    }

    /// Restore the top frame's reachability, e.g. when an `else` arm starts
    /// over from the frame's baseline.
    pub(crate) fn reset_reachability(&mut self, reachable: bool) -> Result<(), TranslationError> {
        self.top_mut()?.reachable = reachable;
        Ok(())
    }
}
