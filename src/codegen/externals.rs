//! The closed set of named externals generated code references.
//!
//! Every runtime object a function can reach appears in its image as a
//! symbol drawn from these families; the loader resolves them against live
//! tables, memory bases, global slots, intrinsic entry points and
//! per-function mutable data before execution.

use crate::ir::{
    DefinedFuncIndex, ExceptionTypeIndex, FuncIndex, GlobalIndex, MemoryIndex, TableIndex,
    TypeIndex,
};
use crate::runtime::builtins::IntrinsicIndex;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExternalRef {
    /// The encoded function type for an indexed type: `typeId[i]`.
    TypeId(TypeIndex),
    /// Offset of a table's base pointer in the compartment runtime data:
    /// `tableOffset[i]`.
    TableOffset(TableIndex),
    /// Offset of a memory's base pointer in the compartment runtime data:
    /// `memoryOffset[i]`.
    MemoryOffset(MemoryIndex),
    /// A global's slot: `global[i]`.
    Global(GlobalIndex),
    /// A runtime exception type id, biased by one: `biasedExceptionTypeId[i]`.
    BiasedExceptionTypeId(ExceptionTypeIndex),
    /// An imported function's entry point: `functionImport[i]`.
    FunctionImport(FuncIndex),
    /// A defined function's entry point: `functionDef[j]`. Defined inside
    /// the image rather than resolved by the loader.
    FunctionDef(DefinedFuncIndex),
    /// A defined function's mutable data block: `functionDefMutableDatas[j]`.
    FunctionDefMutableData(DefinedFuncIndex),
    /// The owning module instance's id, biased by one.
    BiasedModuleInstanceId,
    /// The bias applied to all references stored in tables.
    TableReferenceBias,
    /// The type info for the runtime exception (non-Windows targets).
    RuntimeExceptionTypeInfo,
    /// The host exception-handling personality routine.
    Personality,
    /// An intrinsic entry point from the registry.
    Intrinsic(IntrinsicIndex),
}

impl ExternalRef {
    pub fn symbol_name(self, windows_seh: bool) -> String {
        match self {
            ExternalRef::TypeId(index) => format!("typeId[{}]", index.as_u32()),
            ExternalRef::TableOffset(index) => format!("tableOffset[{}]", index.as_u32()),
            ExternalRef::MemoryOffset(index) => format!("memoryOffset[{}]", index.as_u32()),
            ExternalRef::Global(index) => format!("global[{}]", index.as_u32()),
            ExternalRef::BiasedExceptionTypeId(index) => {
                format!("biasedExceptionTypeId[{}]", index.as_u32())
            }
            ExternalRef::FunctionImport(index) => format!("functionImport[{}]", index.as_u32()),
            ExternalRef::FunctionDef(index) => format!("functionDef[{}]", index.as_u32()),
            ExternalRef::FunctionDefMutableData(index) => {
                format!("functionDefMutableDatas[{}]", index.as_u32())
            }
            ExternalRef::BiasedModuleInstanceId => "biasedModuleInstanceId".to_string(),
            ExternalRef::TableReferenceBias => "tableReferenceBias".to_string(),
            ExternalRef::RuntimeExceptionTypeInfo => "runtimeExceptionTypeInfo".to_string(),
            ExternalRef::Personality => if windows_seh {
                "__CxxFrameHandler3"
            } else {
                "__gxx_personality_v0"
            }
            .to_string(),
            ExternalRef::Intrinsic(intrinsic) => intrinsic.name().to_string(),
        }
    }

    /// Biased externals materialize as `address - 1`, letting the loader
    /// patch small integer ids through symbol addresses.
    pub fn bias(self) -> i64 {
        match self {
            ExternalRef::BiasedExceptionTypeId(_) | ExternalRef::BiasedModuleInstanceId => -1,
            _ => 0,
        }
    }

    /// Whether this external resolves to code rather than data.
    pub fn is_code(self) -> bool {
        matches!(
            self,
            ExternalRef::FunctionImport(_)
                | ExternalRef::FunctionDef(_)
                | ExternalRef::Personality
                | ExternalRef::Intrinsic(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_families() {
        assert_eq!(
            ExternalRef::TypeId(TypeIndex::from_u32(3)).symbol_name(false),
            "typeId[3]"
        );
        assert_eq!(
            ExternalRef::FunctionDefMutableData(DefinedFuncIndex::from_u32(0)).symbol_name(false),
            "functionDefMutableDatas[0]"
        );
        assert_eq!(
            ExternalRef::Intrinsic(IntrinsicIndex::table_grow()).symbol_name(false),
            "table.grow"
        );
        assert_eq!(ExternalRef::Personality.symbol_name(false), "__gxx_personality_v0");
        assert_eq!(ExternalRef::Personality.symbol_name(true), "__CxxFrameHandler3");
    }

    #[test]
    fn only_id_externals_are_biased() {
        assert_eq!(ExternalRef::BiasedModuleInstanceId.bias(), -1);
        assert_eq!(
            ExternalRef::BiasedExceptionTypeId(ExceptionTypeIndex::from_u32(0)).bias(),
            -1
        );
        assert_eq!(ExternalRef::TableOffset(TableIndex::from_u32(0)).bias(), 0);
        assert_eq!(ExternalRef::Personality.bias(), 0);
    }
}
