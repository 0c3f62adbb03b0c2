//! Module-side collaborators of the translator: index-space resolution and
//! function-type interning.

use std::collections::HashMap;

use wasmparser::{BlockType, FuncType, GlobalType, MemoryType, RefType, TableType, ValType};

use crate::error::TranslationError;

/// Interned function-type id. Equal types always intern to the same id, so
/// `call_indirect` signature checks are a single integer compare at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InternedType(pub u32);

#[derive(Default, Debug)]
pub struct TypeInterner {
    types: Vec<FuncType>,
    ids: HashMap<(Vec<ValType>, Vec<ValType>), InternedType>,
}

impl TypeInterner {
    pub fn intern(&mut self, ty: FuncType) -> InternedType {
        let key = (ty.params().to_vec(), ty.results().to_vec());
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = InternedType(self.types.len() as u32);
        self.types.push(ty);
        self.ids.insert(key, id);
        id
    }

    pub fn resolve(&self, id: InternedType) -> &FuncType {
        &self.types[id.0 as usize]
    }
}

/// Identity of a live module instance, for the compiling-call decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstanceId(pub u32);

/// Runtime handle for a callee function.
#[derive(Clone, Copy, Debug)]
pub struct FunctionHandle {
    pub index: u32,
    pub instance: InstanceId,
    /// False for host functions and imports, which can never be lazily
    /// compiled in place.
    pub wasm: bool,
}

/// Runtime handle for a global.
#[derive(Clone, Copy, Debug)]
pub struct GlobalHandle {
    pub index: u32,
}

/// The view of a module the translator consumes: declared index spaces plus
/// the runtime handles of the instance being compiled for.
///
/// With `instance = None` the context is validation-only: callee and global
/// handles resolve to nothing, emission that needs them is skipped, and all
/// stack/control bookkeeping (and therefore error detection) still runs.
#[derive(Debug)]
pub struct TranslationContext {
    /// Type section, already interned.
    pub types: Vec<InternedType>,
    /// Function index space: type-section index per function, imports first.
    pub functions: Vec<u32>,
    pub num_imported_functions: u32,
    pub globals: Vec<GlobalType>,
    pub memories: Vec<MemoryType>,
    pub tables: Vec<TableType>,
    pub num_data_segments: u32,
    pub num_element_segments: u32,
    pub instance: Option<InstanceId>,
}

impl TranslationContext {
    pub fn new(instance: Option<InstanceId>) -> Self {
        TranslationContext {
            types: Vec::new(),
            functions: Vec::new(),
            num_imported_functions: 0,
            globals: Vec::new(),
            memories: Vec::new(),
            tables: Vec::new(),
            num_data_segments: 0,
            num_element_segments: 0,
            instance,
        }
    }

    pub fn is_validation_only(&self) -> bool {
        self.instance.is_none()
    }

    pub fn type_id(&self, index: u32) -> Result<InternedType, TranslationError> {
        self.types
            .get(index as usize)
            .copied()
            .ok_or(TranslationError::IndexOutOfRange {
                space: "type",
                index,
                count: self.types.len(),
            })
    }

    pub fn type_by_index<'a>(
        &self,
        interner: &'a TypeInterner,
        index: u32,
    ) -> Result<&'a FuncType, TranslationError> {
        Ok(interner.resolve(self.type_id(index)?))
    }

    /// Expand a block type into a full signature.
    pub fn resolve_block_type(
        &self,
        interner: &TypeInterner,
        block_type: BlockType,
    ) -> Result<FuncType, TranslationError> {
        Ok(match block_type {
            BlockType::Empty => FuncType::new([], []),
            BlockType::Type(ty) => FuncType::new([], [ty]),
            BlockType::FuncType(index) => self.type_by_index(interner, index)?.clone(),
        })
    }

    pub fn function_type_id(&self, index: u32) -> Result<InternedType, TranslationError> {
        let type_index =
            self.functions
                .get(index as usize)
                .copied()
                .ok_or(TranslationError::IndexOutOfRange {
                    space: "function",
                    index,
                    count: self.functions.len(),
                })?;
        self.type_id(type_index)
    }

    pub fn function_type<'a>(
        &self,
        interner: &'a TypeInterner,
        index: u32,
    ) -> Result<&'a FuncType, TranslationError> {
        Ok(interner.resolve(self.function_type_id(index)?))
    }

    pub fn validate_function_index(&self, index: u32) -> Result<(), TranslationError> {
        if (index as usize) < self.functions.len() {
            Ok(())
        } else {
            Err(TranslationError::IndexOutOfRange {
                space: "function",
                index,
                count: self.functions.len(),
            })
        }
    }

    /// Callee handle, or `None` in validation-only mode.
    pub fn resolve_callee(&self, index: u32) -> Result<Option<FunctionHandle>, TranslationError> {
        self.validate_function_index(index)?;
        Ok(self.instance.map(|instance| FunctionHandle {
            index,
            instance,
            wasm: index >= self.num_imported_functions,
        }))
    }

    /// True when the callee is a Wasm function living in the instance being
    /// compiled, which makes it eligible for lazy in-place compilation.
    pub fn callee_in_same_instance(&self, handle: &FunctionHandle) -> bool {
        handle.wasm && self.instance == Some(handle.instance)
    }

    pub fn global_type(&self, index: u32) -> Result<&GlobalType, TranslationError> {
        self.globals
            .get(index as usize)
            .ok_or(TranslationError::IndexOutOfRange {
                space: "global",
                index,
                count: self.globals.len(),
            })
    }

    /// Global handle, or `None` in validation-only mode.
    pub fn resolve_global_handle(
        &self,
        index: u32,
    ) -> Result<Option<GlobalHandle>, TranslationError> {
        self.global_type(index)?;
        Ok(self.instance.map(|_| GlobalHandle { index }))
    }

    pub fn is_memory64(&self, index: u32) -> Result<bool, TranslationError> {
        self.memories
            .get(index as usize)
            .map(|m| m.memory64)
            .ok_or(TranslationError::IndexOutOfRange {
                space: "memory",
                index,
                count: self.memories.len(),
            })
    }

    pub fn is_table64(&self, index: u32) -> Result<bool, TranslationError> {
        self.table_type(index).map(|t| t.table64)
    }

    pub fn table_element_type(&self, index: u32) -> Result<RefType, TranslationError> {
        self.table_type(index).map(|t| t.element_type)
    }

    fn table_type(&self, index: u32) -> Result<&TableType, TranslationError> {
        self.tables
            .get(index as usize)
            .ok_or(TranslationError::IndexOutOfRange {
                space: "table",
                index,
                count: self.tables.len(),
            })
    }

    pub fn validate_data_segment(&self, index: u32) -> Result<(), TranslationError> {
        if index < self.num_data_segments {
            Ok(())
        } else {
            Err(TranslationError::IndexOutOfRange {
                space: "data segment",
                index,
                count: self.num_data_segments as usize,
            })
        }
    }

    pub fn validate_element_segment(&self, index: u32) -> Result<(), TranslationError> {
        if index < self.num_element_segments {
            Ok(())
        } else {
            Err(TranslationError::IndexOutOfRange {
                space: "element segment",
                index,
                count: self.num_element_segments as usize,
            })
        }
    }
}

/// Address type for a memory or table: i64 under the 64-bit proposals,
/// i32 otherwise.
pub fn address_type(is_64: bool) -> ValType {
    if is_64 { ValType::I64 } else { ValType::I32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_types_intern_to_equal_ids() {
        let mut interner = TypeInterner::default();
        let a = interner.intern(FuncType::new([ValType::I32], [ValType::I64]));
        let b = interner.intern(FuncType::new([ValType::I32], [ValType::I64]));
        let c = interner.intern(FuncType::new([ValType::I64], [ValType::I32]));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(interner.resolve(c).params(), &[ValType::I64]);
    }

    #[test]
    fn out_of_range_queries_name_their_index_space() {
        let ctx = TranslationContext::new(None);
        let err = ctx.function_type_id(3).unwrap_err();
        assert!(matches!(
            err,
            TranslationError::IndexOutOfRange {
                space: "function",
                index: 3,
                count: 0
            }
        ));
        assert!(ctx.is_memory64(0).is_err());
        assert!(ctx.validate_data_segment(0).is_err());
    }

    #[test]
    fn validation_only_contexts_resolve_no_handles() {
        let mut interner = TypeInterner::default();
        let mut ctx = TranslationContext::new(None);
        ctx.types.push(interner.intern(FuncType::new([], [])));
        ctx.functions.push(0);
        assert!(ctx.resolve_callee(0).unwrap().is_none());

        ctx.instance = Some(InstanceId(7));
        let handle = ctx.resolve_callee(0).unwrap().unwrap();
        assert!(ctx.callee_in_same_instance(&handle));
    }
}
