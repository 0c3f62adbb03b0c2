//! Module loading: one pass over the binary's payloads building the
//! translation context, then translating every code-section entry as it
//! streams by. Section order in the binary format guarantees the context is
//! complete before the first body arrives.

use std::collections::HashMap;

use wasmparser::{ExternalKind, Parser, Payload, TypeRef};

use crate::arena::CodeArena;
use crate::context::{InstanceId, TranslationContext, TypeInterner};
use crate::engine::Engine;
use crate::module::{FuncCode, Function, Module};
use crate::translate::translate_body;

pub(crate) fn parse(engine: &Engine, bytes: &[u8]) -> Result<Module, anyhow::Error> {
    let mut interner = TypeInterner::default();
    let mut ctx = TranslationContext::new(Some(InstanceId(0)));
    let arena = CodeArena::new();
    let mut functions: Vec<Function> = Vec::new();
    let mut exports: HashMap<String, u32> = HashMap::new();
    let mut next_defined: u32 = 0;

    for payload in Parser::new(0).parse_all(bytes) {
        match payload? {
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    ctx.types.push(interner.intern(ty?));
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import?;
                    match import.ty {
                        TypeRef::Func(type_index) => {
                            ctx.functions.push(type_index);
                            ctx.num_imported_functions += 1;
                        }
                        TypeRef::Global(ty) => ctx.globals.push(ty),
                        TypeRef::Memory(ty) => ctx.memories.push(ty),
                        TypeRef::Table(ty) => ctx.tables.push(ty),
                        TypeRef::Tag(_) => anyhow::bail!("exception tags are not supported"),
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for type_index in reader {
                    ctx.functions.push(type_index?);
                }
            }
            Payload::MemorySection(reader) => {
                for memory in reader {
                    ctx.memories.push(memory?);
                }
            }
            Payload::TableSection(reader) => {
                for table in reader {
                    ctx.tables.push(table?.ty);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    ctx.globals.push(global?.ty);
                }
            }
            Payload::DataCountSection { count, .. } => {
                ctx.num_data_segments = count;
            }
            Payload::DataSection(reader) => {
                // Only authoritative when no DataCount section preceded it.
                if ctx.num_data_segments == 0 {
                    ctx.num_data_segments = reader.count();
                }
            }
            Payload::ElementSection(reader) => {
                ctx.num_element_segments = reader.count();
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export?;
                    if export.kind == ExternalKind::Func {
                        exports.insert(export.name.to_string(), export.index);
                    }
                }
            }
            Payload::CodeSectionEntry(body) => {
                let func_index = ctx.num_imported_functions + next_defined;
                next_defined += 1;
                let type_id = ctx.function_type_id(func_index)?;
                let (sequence, layout) =
                    translate_body(engine, &ctx, &interner, &arena, func_index, &body)?;
                functions.push(Function {
                    type_id,
                    layout,
                    code: FuncCode::from_sequence(&sequence),
                });
            }
            _ => {}
        }
    }

    Ok(Module::from_parts(ctx, interner, arena, functions, exports))
}
