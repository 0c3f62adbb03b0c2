mod arena;
pub mod code;
mod context;
mod engine;
mod error;
mod module;
mod parse;
pub mod translate;

pub use arena::CodeArena;
pub use code::{InstructionSequence, Opcode, VReg};
pub use context::{
    FunctionHandle, GlobalHandle, InstanceId, InternedType, TranslationContext, TypeInterner,
    address_type,
};
pub use engine::{Engine, ThreadingModel};
pub use error::TranslationError;
pub use module::Module;
pub use translate::layout::{FrameHeaderLayout, SlotRole, StackLayout};
pub use translate::{FunctionTranslator, translate_body};
