//! Runtime objects referenced by table elements, and the two process-wide
//! sentinel objects table cells encode.
//!
//! Objects are polymorphic over `{callable as a typed function,
//! identifiable as a host reference}`. They share a `#[repr(C)]` header
//! whose first field is the kind tag; downcasts check the tag and cast the
//! pointer. Sentinels are unique identities, not nulls: comparisons against
//! them are pointer comparisons.

use core::ptr::NonNull;

use once_cell::sync::Lazy;

use crate::ir::{RefType, TypeEncoding};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(usize)]
pub enum ObjectKind {
    Function,
    HostRef,
}

/// Common object header. Every concrete object type embeds this as its
/// first field.
#[repr(C)]
#[derive(Debug)]
pub struct Object {
    kind: ObjectKind,
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn ref_type(&self) -> RefType {
        match self.kind {
            ObjectKind::Function => RefType::Func,
            ObjectKind::HostRef => RefType::Any,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self.kind {
            ObjectKind::Function => Some(unsafe { &*(self as *const Object).cast::<Function>() }),
            _ => None,
        }
    }

    pub fn as_host_ref(&self) -> Option<&HostRef> {
        match self.kind {
            ObjectKind::HostRef => Some(unsafe { &*(self as *const Object).cast::<HostRef>() }),
            _ => None,
        }
    }
}

/// Mutable per-function state shared between the runtime and loaded code;
/// generated functions reach it through the `functionDefMutableDatas[j]`
/// external in their prefix.
#[derive(Debug)]
pub struct FunctionMutableData {
    pub debug_name: String,
}

/// A callable object.
///
/// The layout after the header mirrors the runtime function prefix code
/// generation places before each entry point: mutable-data pointer, owning
/// module-instance id, type encoding. Stack walkers and indirect-call
/// checks read either representation the same way.
#[repr(C)]
#[derive(Debug)]
pub struct Function {
    object: Object,
    mutable_data: *mut FunctionMutableData,
    module_instance_id: usize,
    type_encoding: TypeEncoding,
    code: *const u8,
}

unsafe impl Send for Function {}
unsafe impl Sync for Function {}

impl Function {
    /// An instance id carried by functions that belong to no instance
    /// (host-created and sentinel functions).
    pub const NO_INSTANCE: usize = usize::MAX;

    pub fn new(
        debug_name: impl Into<String>,
        module_instance_id: usize,
        type_encoding: TypeEncoding,
    ) -> Box<Function> {
        let mutable_data = Box::into_raw(Box::new(FunctionMutableData {
            debug_name: debug_name.into(),
        }));
        Box::new(Function {
            object: Object {
                kind: ObjectKind::Function,
            },
            mutable_data,
            module_instance_id,
            type_encoding,
            code: core::ptr::null(),
        })
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }

    pub fn object_ptr(&self) -> NonNull<Object> {
        NonNull::from(&self.object)
    }

    pub fn type_encoding(&self) -> TypeEncoding {
        self.type_encoding
    }

    pub fn module_instance_id(&self) -> usize {
        self.module_instance_id
    }

    pub fn debug_name(&self) -> &str {
        unsafe { &(*self.mutable_data).debug_name }
    }

    pub fn code(&self) -> *const u8 {
        self.code
    }
}

impl Drop for Function {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.mutable_data) });
    }
}

/// An opaque host-owned reference.
#[repr(C)]
#[derive(Debug)]
pub struct HostRef {
    object: Object,
    debug_name: String,
}

unsafe impl Send for HostRef {}
unsafe impl Sync for HostRef {}

impl HostRef {
    pub fn new(debug_name: impl Into<String>) -> Box<HostRef> {
        Box::new(HostRef {
            object: Object {
                kind: ObjectKind::HostRef,
            },
            debug_name: debug_name.into(),
        })
    }

    pub fn as_object(&self) -> &Object {
        &self.object
    }

    pub fn object_ptr(&self) -> NonNull<Object> {
        NonNull::from(&self.object)
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

struct SentinelFunction(Box<Function>);

// The sentinels are never called or mutated; only their addresses matter.
unsafe impl Send for SentinelFunction {}
unsafe impl Sync for SentinelFunction {}

static OUT_OF_BOUNDS_ELEMENT: Lazy<SentinelFunction> = Lazy::new(|| {
    SentinelFunction(Function::new(
        "out-of-bounds table element",
        Function::NO_INSTANCE,
        TypeEncoding::NONE,
    ))
});

static UNINITIALIZED_ELEMENT: Lazy<SentinelFunction> = Lazy::new(|| {
    SentinelFunction(Function::new(
        "uninitialized table element",
        Function::NO_INSTANCE,
        TypeEncoding::NONE,
    ))
});

/// The sentinel stored (biased to zero) in every table cell past the
/// logical end. Reads that decode it trap.
pub fn out_of_bounds_element() -> NonNull<Object> {
    OUT_OF_BOUNDS_ELEMENT.0.object_ptr()
}

/// The sentinel standing for a null element inside the live range.
pub fn uninitialized_element() -> NonNull<Object> {
    UNINITIALIZED_ELEMENT.0.object_ptr()
}

/// Encodes an object pointer as the value stored in a table cell:
/// `pointer - out_of_bounds_element`. Freshly committed zero pages thus
/// decode to the out-of-bounds sentinel without being written.
pub fn object_to_biased(object: NonNull<Object>) -> usize {
    (object.as_ptr() as usize).wrapping_sub(out_of_bounds_element().as_ptr() as usize)
}

/// Inverse of [`object_to_biased`].
pub fn biased_to_object(biased: usize) -> NonNull<Object> {
    let address = biased.wrapping_add(out_of_bounds_element().as_ptr() as usize);
    NonNull::new(address as *mut Object).expect("biased value decoded to null")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_distinct_stable_identities() {
        assert_ne!(out_of_bounds_element(), uninitialized_element());
        assert_eq!(out_of_bounds_element(), out_of_bounds_element());
    }

    #[test]
    fn biased_encoding_round_trips() {
        assert_eq!(object_to_biased(out_of_bounds_element()), 0);
        let func = Function::new("f", Function::NO_INSTANCE, TypeEncoding::NONE);
        let ptr = func.object_ptr();
        assert_eq!(biased_to_object(object_to_biased(ptr)), ptr);
        assert_ne!(object_to_biased(ptr), 0);
    }

    #[test]
    fn downcasts_check_the_kind() {
        let func = Function::new("f", 3, TypeEncoding::NONE);
        let object = func.as_object();
        assert!(object.as_function().is_some());
        assert!(object.as_host_ref().is_none());
        assert_eq!(object.ref_type(), RefType::Func);
        assert_eq!(object.as_function().unwrap().module_instance_id(), 3);

        let host = HostRef::new("h");
        assert!(host.as_object().as_function().is_none());
        assert_eq!(host.as_object().ref_type(), RefType::Any);
    }
}
