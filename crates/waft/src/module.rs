use std::collections::HashMap;

use crate::arena::CodeArena;
use crate::code::{InstructionSequence, dump};
use crate::context::{InternedType, TranslationContext, TypeInterner};
use crate::engine::Engine;
use crate::error::TranslationError;
use crate::parse;
use crate::translate::layout::StackLayout;

/// Raw parts of a translated body. The slices live in the module's arena;
/// storing them as pointers sidesteps the self-borrow a `Module` owning both
/// arena and views would need.
#[derive(Debug)]
pub(crate) struct FuncCode {
    instructions: (*const u64, usize),
    constants: (*const u64, usize),
    max_stack_height: usize,
}

impl FuncCode {
    pub(crate) fn from_sequence(sequence: &InstructionSequence<'_>) -> Self {
        FuncCode {
            instructions: (sequence.instructions.as_ptr(), sequence.instructions.len()),
            constants: (sequence.constants.as_ptr(), sequence.constants.len()),
            max_stack_height: sequence.max_stack_height,
        }
    }

    /// # Safety
    /// The arena the parts point into must still be alive for `'a`.
    unsafe fn view<'a>(&self) -> InstructionSequence<'a> {
        unsafe {
            InstructionSequence {
                instructions: std::slice::from_raw_parts(self.instructions.0, self.instructions.1),
                constants: std::slice::from_raw_parts(self.constants.0, self.constants.1),
                max_stack_height: self.max_stack_height,
            }
        }
    }
}

/// One translated (defined) function.
#[derive(Debug)]
pub(crate) struct Function {
    pub type_id: InternedType,
    pub layout: StackLayout,
    pub code: FuncCode,
}

/// A parsed and translated Wasm module (immutable).
#[derive(Debug)]
pub struct Module {
    context: TranslationContext,
    interner: TypeInterner,
    /// Owns every buffer the function views point into. Must outlive all
    /// `InstructionSequence`s handed out, which `function_code`'s borrow of
    /// `self` guarantees.
    #[allow(dead_code)]
    arena: CodeArena,
    functions: Vec<Function>,
    exports: HashMap<String, u32>,
}

impl Module {
    /// Parse a WAT string into a translated module.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_str(wat)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Parse and translate a binary module.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, anyhow::Error> {
        parse::parse(engine, bytes)
    }

    pub(crate) fn from_parts(
        context: TranslationContext,
        interner: TypeInterner,
        arena: CodeArena,
        functions: Vec<Function>,
        exports: HashMap<String, u32>,
    ) -> Self {
        Module {
            context,
            interner,
            arena,
            functions,
            exports,
        }
    }

    /// Number of defined (translated) functions.
    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.context.num_imported_functions
    }

    /// Function index of an exported function.
    pub fn export_index(&self, name: &str) -> Option<u32> {
        self.exports.get(name).copied()
    }

    /// Translated code of the `index`-th defined function.
    pub fn function_code(&self, index: usize) -> InstructionSequence<'_> {
        // SAFETY: the backing buffers live in self.arena, which lives as
        // long as the returned borrow of self.
        unsafe { self.functions[index].code.view() }
    }

    pub fn function_layout(&self, index: usize) -> StackLayout {
        self.functions[index].layout
    }

    /// Annotated instruction listing of the `index`-th defined function.
    pub fn dump_func(&self, index: usize) -> Result<String, TranslationError> {
        let function = &self.functions[index];
        let sequence = self.function_code(index);
        let signature = self.interner.resolve(function.type_id);
        let mut header = format!(
            "func[{}] {:?} -> {:?}\n",
            self.context.num_imported_functions as usize + index,
            signature.params(),
            signature.results(),
        );
        header.push_str(&dump::dump_sequence(&sequence, &function.layout)?);
        Ok(header)
    }
}
