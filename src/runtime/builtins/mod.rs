//! The registry of intrinsic entry points callable from loaded code.
//!
//! Each entry declares the wasm-visible name loaded code links against,
//! the receiver parameters the generator must pass (context, module id,
//! table id) and the operand types. The same declaration drives the index
//! type, the cranelift signatures handed to code generation, and the
//! array of actual entry points the loader binds.

pub(crate) mod impls;

use cranelift_codegen::ir::{self, AbiParam, ArgumentPurpose, Signature};
use cranelift_codegen::isa::CallConv;

use crate::runtime::compartment::ContextRuntimeData;
use crate::runtime::object::Object;

macro_rules! foreach_table_intrinsic {
    ($mac:ident) => {
        $mac! {
            // Grows a table, returning the old element count or -1.
            table_grow = "table.grow": (cx: vmctx, initial_value: pointer, delta: i32, table_id: iptr) -> i32;
            // The current element count of a table.
            table_size = "table.size": (cx: vmctx, table_id: iptr) -> i32;
            // Reads a table element; null means uninitialized.
            table_get = "table.get": (cx: vmctx, index: i32, table_id: iptr) -> pointer;
            // Writes a table element; null means uninitialized.
            table_set = "table.set": (cx: vmctx, index: i32, value: pointer, table_id: iptr);
            // Initializes table elements from a passive element segment.
            table_init = "table.init": (cx: vmctx, dest_index: i32, source_index: i32, num_elems: i32, module_id: iptr, table_id: iptr, segment_index: iptr);
            // Releases a passive element segment's storage.
            elem_drop = "elem.drop": (cx: vmctx, module_id: iptr, segment_index: iptr);
            // Copies elements between (possibly overlapping) table ranges.
            table_copy = "table.copy": (cx: vmctx, dest_index: i32, source_index: i32, num_elems: i32, source_table_id: iptr, dest_table_id: iptr);
            // Writes one value to a range of table elements.
            table_fill = "table.fill": (cx: vmctx, dest_index: i32, value: pointer, num_elems: i32, table_id: iptr);
            // Classifies and raises the trap for a failed indirect call.
            call_indirect_fail = "callIndirectFail": (cx: vmctx, index: i32, table_id: iptr, function: pointer, expected_type_encoding: iptr);
        }
    };
}

macro_rules! declare_indexes {
    (
        $(
            $( #[$attr:meta] )*
            $name:ident = $wasm_name:literal : ( $( $pname:ident: $param:ident ),* ) $( -> $result:ident )?;
        )*
    ) => {
        impl IntrinsicIndex {
            declare_indexes!(
                @indices;
                0;
                $( $name; )*
            );

            /// The wasm-visible entry symbol for this intrinsic.
            pub fn name(self) -> &'static str {
                $(
                    if self == IntrinsicIndex::$name() {
                        return $wasm_name;
                    }
                )*
                unreachable!()
            }
        }
    };

    // Base case: no more indices to declare, so define the total number.
    (
        @indices;
        $len:expr;
    ) => {
        /// The total number of intrinsics in the registry.
        pub const fn count() -> u32 {
            $len
        }
    };

    // Recursive case: declare the next index, then the rest.
    (
        @indices;
        $index:expr;
        $this_name:ident;
        $( $rest_name:ident; )*
    ) => {
        #[allow(missing_docs)]
        pub const fn $this_name() -> Self {
            Self($index)
        }

        declare_indexes!(
            @indices;
            ($index + 1);
            $( $rest_name; )*
        );
    }
}

foreach_table_intrinsic!(declare_indexes);

/// An index type for registry intrinsics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntrinsicIndex(u32);

impl IntrinsicIndex {
    pub const fn from_u32(index: u32) -> Self {
        Self(index)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = IntrinsicIndex> {
        (0..Self::count()).map(Self::from_u32)
    }
}

/// Helper structure building a host-convention `Signature` for each
/// intrinsic.
pub struct IntrinsicSignatures {
    pointer_type: ir::Type,
    call_conv: CallConv,
}

impl IntrinsicSignatures {
    pub fn new(pointer_type: ir::Type, call_conv: CallConv) -> Self {
        Self {
            pointer_type,
            call_conv,
        }
    }

    /// The AbiParam for the per-thread context argument.
    fn vmctx(&self) -> AbiParam {
        AbiParam::special(self.pointer_type, ArgumentPurpose::VMContext)
    }

    /// The AbiParam for object-reference arguments/returns.
    fn pointer(&self) -> AbiParam {
        AbiParam::new(self.pointer_type)
    }

    /// The AbiParam for pointer-sized integer arguments (table ids,
    /// module ids, type encodings).
    fn iptr(&self) -> AbiParam {
        AbiParam::new(self.pointer_type)
    }

    /// The AbiParam for `i32` arguments/returns. All such operands are
    /// unsigned, so platforms that extend narrow arguments zero-extend.
    fn i32(&self) -> AbiParam {
        AbiParam::new(ir::types::I32).uext()
    }

    pub fn signature(&self, intrinsic: IntrinsicIndex) -> Signature {
        let mut _cur = 0;
        macro_rules! iter {
            (
                $(
                    $( #[$attr:meta] )*
                    $name:ident = $wasm_name:literal : ( $( $pname:ident: $param:ident ),* ) $( -> $result:ident )?;
                )*
            ) => {
                $(
                    if _cur == intrinsic.as_u32() {
                        return Signature {
                            params: ::std::vec![ $( self.$param() ),* ],
                            returns: ::std::vec![ $( self.$result() )? ],
                            call_conv: self.call_conv,
                        };
                    }
                    _cur += 1;
                )*
            };
        }

        foreach_table_intrinsic!(iter);

        unreachable!();
    }
}

macro_rules! define_intrinsics_array {
    (
        $(
            $( #[$attr:meta] )*
            $name:ident = $wasm_name:literal : ( $( $pname:ident: $param:ident ),* ) $( -> $result:ident )?;
        )*
    ) => {
        /// The addresses of every intrinsic entry point, in registry
        /// order. The loader binds the registry's entry symbols to these.
        #[repr(C)]
        pub struct IntrinsicsArray {
            $(
                pub $name: unsafe extern "C-unwind" fn(
                    $( define_intrinsics_array!(@ty $param) ),*
                ) $( -> define_intrinsics_array!(@ty $result) )?,
            )*
        }

        impl IntrinsicsArray {
            pub const INIT: IntrinsicsArray = IntrinsicsArray {
                $(
                    $name: impls::$name,
                )*
            };
        }
    };

    (@ty i32) => (u32);
    (@ty iptr) => (usize);
    (@ty pointer) => (*mut Object);
    (@ty vmctx) => (*mut ContextRuntimeData);
}

foreach_table_intrinsic!(define_intrinsics_array);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(IntrinsicIndex::table_grow().name(), "table.grow");
        assert_eq!(IntrinsicIndex::elem_drop().name(), "elem.drop");
        assert_eq!(IntrinsicIndex::call_indirect_fail().name(), "callIndirectFail");
        assert_eq!(IntrinsicIndex::count(), 9);
        assert_eq!(IntrinsicIndex::all().count(), 9);
    }

    #[test]
    fn signatures_lead_with_the_context() {
        let sigs = IntrinsicSignatures::new(ir::types::I64, CallConv::SystemV);
        for intrinsic in IntrinsicIndex::all() {
            let sig = sigs.signature(intrinsic);
            assert_eq!(sig.params[0].purpose, ArgumentPurpose::VMContext);
        }

        let grow = sigs.signature(IntrinsicIndex::table_grow());
        assert_eq!(grow.params.len(), 4);
        assert_eq!(grow.returns.len(), 1);
        assert_eq!(grow.returns[0].value_type, ir::types::I32);

        let fail = sigs.signature(IntrinsicIndex::call_indirect_fail());
        assert_eq!(fail.params.len(), 5);
        assert!(fail.returns.is_empty());
    }
}
