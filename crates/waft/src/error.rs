use wasmparser::ValType;

/// Everything that can go wrong while translating one function body.
///
/// The translator surfaces the first error it hits; partial output is
/// discarded together with the arena buffers. Outer layers (module parsing,
/// the CLI) wrap this in `anyhow::Error`.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    /// A type, function, global, local, memory, table, data, or element
    /// index points beyond what the module declares.
    #[error("{space} index {index} out of range (have {count})")]
    IndexOutOfRange {
        space: &'static str,
        index: u32,
        count: usize,
    },

    /// A popped operand had a known type that disagrees with what the
    /// instruction expects. Never raised in unreachable code.
    #[error("type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch { expected: ValType, found: ValType },

    /// Pop on an empty operand stack in reachable code.
    #[error("operand stack underflow")]
    StackUnderflow,

    /// A branch names a relative depth with no matching open frame.
    #[error("relative depth {depth} exceeds {frames} open frames")]
    RelativeDepthOutOfRange { depth: u32, frames: usize },

    /// `else` without `if`, `end` without an open frame, and similar
    /// structural violations.
    #[error("control mismatch: {0}")]
    ControlMismatch(&'static str),

    /// An instruction appeared after the function's closing `end`.
    #[error("unexpected trailing instruction after function end")]
    UnexpectedTrailingInstruction,

    /// An unpinned label still had pending patches at finalization.
    #[error("dangling label {0}")]
    DanglingLabel(usize),

    /// An internal invariant of the translator was violated.
    #[error("internal consistency: {0}")]
    InternalConsistency(&'static str),

    /// A memarg alignment exponent at or beyond the address-type width.
    #[error("invalid alignment 2^{align} for {width}-bit address")]
    InvalidAlignment { align: u8, width: u8 },

    /// The constant-slot budget pushed the frame layout past the signed
    /// 16-bit register range.
    #[error("constant slot budget overflows the register range")]
    ConstSlotOverflow,

    /// The opcode stream ended with open control frames.
    #[error("missing end: {0} unclosed control frames")]
    MissingEnd(usize),

    /// An operator from a proposal the translator does not implement.
    #[error("unsupported operator: {0}")]
    Unsupported(String),
}
