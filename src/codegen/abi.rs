//! Signature construction for the module-wide "wasm" calling convention
//! and the host convention intrinsics use.

use cranelift_codegen::ir::{self, types, AbiParam, ArgumentPurpose, Signature};
use cranelift_codegen::isa::CallConv;
use target_lexicon::{PointerWidth, Triple};

use crate::ir::{FunctionSig, ValueType};

/// The two conventions in play: every generated function uses `Wasm`;
/// intrinsic entry points are called with the host's own convention.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CallingConvention {
    Wasm,
    IntrinsicHost,
}

pub fn pointer_type(triple: &Triple) -> ir::Type {
    match triple.pointer_width() {
        Ok(PointerWidth::U64) => types::I64,
        Ok(PointerWidth::U32) | Ok(PointerWidth::U16) | Err(()) => types::I32,
    }
}

pub fn call_conv(convention: CallingConvention, triple: &Triple) -> CallConv {
    match convention {
        CallingConvention::Wasm => CallConv::Fast,
        CallingConvention::IntrinsicHost => CallConv::triple_default(triple),
    }
}

/// The cranelift type carrying a value of `ty`. Reference-typed values are
/// pointer-sized.
pub fn value_type(ty: ValueType, pointer: ir::Type) -> ir::Type {
    match ty {
        ValueType::Any => unreachable!("the any sentinel has no runtime representation"),
        ValueType::I32 => types::I32,
        ValueType::I64 => types::I64,
        ValueType::F32 => types::F32,
        ValueType::F64 => types::F64,
        ValueType::V128 => types::I8X16,
        ValueType::AnyRef | ValueType::FuncRef | ValueType::NullRef => pointer,
    }
}

fn blank_sig(triple: &Triple, convention: CallingConvention) -> Signature {
    let pointer = pointer_type(triple);
    let mut sig = Signature::new(call_conv(convention, triple));

    // Every function receives the context pointer first.
    sig.params
        .push(AbiParam::special(pointer, ArgumentPurpose::VMContext));

    sig
}

pub fn wasm_call_signature(func_sig: &FunctionSig, triple: &Triple) -> Signature {
    let pointer = pointer_type(triple);
    let mut sig = blank_sig(triple, CallingConvention::Wasm);

    let cvt = |ty: &ValueType| AbiParam::new(value_type(*ty, pointer));
    sig.params.extend(func_sig.params.iter().map(cvt));
    sig.returns.extend(func_sig.results.iter().map(cvt));

    sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::str::FromStr;

    #[test]
    fn wasm_signature_leads_with_the_context() {
        let triple = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let sig = wasm_call_signature(
            &FunctionSig::new(
                [ValueType::I32, ValueType::FuncRef, ValueType::V128],
                [ValueType::F64],
            ),
            &triple,
        );
        assert_eq!(sig.call_conv, CallConv::Fast);
        assert_eq!(sig.params.len(), 4);
        assert_eq!(sig.params[0].purpose, ArgumentPurpose::VMContext);
        assert_eq!(sig.params[1].value_type, types::I32);
        assert_eq!(sig.params[2].value_type, types::I64);
        assert_eq!(sig.params[3].value_type, types::I8X16);
        assert_eq!(sig.returns.len(), 1);
    }

    #[test]
    fn pointer_type_follows_the_triple() {
        let linux64 = Triple::from_str("x86_64-unknown-linux-gnu").unwrap();
        let arm32 = Triple::from_str("armv7-unknown-linux-gnueabihf").unwrap();
        assert_eq!(pointer_type(&linux64), types::I64);
        assert_eq!(pointer_type(&arm32), types::I32);
    }
}
