//! Intrinsic entry points.
//!
//! These are called from loaded code with a host calling convention and a
//! per-thread context pointer. Failures are traps: they unwind through the
//! caller's native frames (`extern "C-unwind"`) to the host's
//! [`catch_traps`](crate::runtime::trap::catch_traps) boundary.

use core::ptr::NonNull;

use crate::fatal;
use crate::ir::{signature_of, TypeEncoding};
use crate::runtime::compartment::{instance_from_context, table_from_context, ContextRuntimeData};
use crate::runtime::object::{out_of_bounds_element, uninitialized_element, Object};
use crate::runtime::table::{copy_table_elements, init_elem_segment};
use crate::runtime::trap::{raise, Trap};

/// # Safety
///
/// All entry points require `cx` to be a live [`ContextRuntimeData`] whose
/// compartment outlives the call; object pointers must be null or point at
/// live objects registered with the runtime.
pub unsafe extern "C-unwind" fn table_grow(
    cx: *mut ContextRuntimeData,
    initial_value: *mut Object,
    delta: u32,
    table_id: usize,
) -> u32 {
    let table = table_from_context(cx, table_id);
    match table.grow(u64::from(delta), NonNull::new(initial_value)) {
        Ok(old_num_elements) => {
            debug_assert!(old_num_elements <= i32::MAX as u64);
            old_num_elements as u32
        }
        Err(_) => u32::MAX,
    }
}

pub unsafe extern "C-unwind" fn table_size(cx: *mut ContextRuntimeData, table_id: usize) -> u32 {
    let table = table_from_context(cx, table_id);
    let num_elements = table.len();
    debug_assert!(num_elements <= u32::MAX as u64);
    num_elements as u32
}

pub unsafe extern "C-unwind" fn table_get(
    cx: *mut ContextRuntimeData,
    index: u32,
    table_id: usize,
) -> *mut Object {
    let table = table_from_context(cx, table_id);
    match table.get(u64::from(index)) {
        Some(object) => object.as_ptr(),
        None => core::ptr::null_mut(),
    }
}

pub unsafe extern "C-unwind" fn table_set(
    cx: *mut ContextRuntimeData,
    index: u32,
    value: *mut Object,
    table_id: usize,
) {
    let table = table_from_context(cx, table_id);
    table.set(u64::from(index), NonNull::new(value));
}

pub unsafe extern "C-unwind" fn table_init(
    cx: *mut ContextRuntimeData,
    dest_index: u32,
    source_index: u32,
    num_elems: u32,
    module_id: usize,
    table_id: usize,
    segment_index: usize,
) {
    let instance = instance_from_context(cx, module_id);
    let table = table_from_context(cx, table_id);

    // Copy the shared segment handle out so element writes run outside
    // the segments lock.
    let Some(segment) = instance.clone_segment(segment_index) else {
        raise(Trap::InvalidArgument);
    };
    init_elem_segment(
        &instance,
        segment_index as u32,
        &segment,
        &table,
        u64::from(dest_index),
        u64::from(source_index),
        u64::from(num_elems),
    );
}

pub unsafe extern "C-unwind" fn elem_drop(
    cx: *mut ContextRuntimeData,
    module_id: usize,
    segment_index: usize,
) {
    let instance = instance_from_context(cx, module_id);
    if !instance.drop_segment(segment_index) {
        raise(Trap::InvalidArgument);
    }
}

pub unsafe extern "C-unwind" fn table_copy(
    cx: *mut ContextRuntimeData,
    dest_index: u32,
    source_index: u32,
    num_elems: u32,
    source_table_id: usize,
    dest_table_id: usize,
) {
    let source_table = table_from_context(cx, source_table_id);
    let dest_table = table_from_context(cx, dest_table_id);
    copy_table_elements(
        &dest_table,
        &source_table,
        u64::from(dest_index),
        u64::from(source_index),
        u64::from(num_elems),
    );
}

pub unsafe extern "C-unwind" fn table_fill(
    cx: *mut ContextRuntimeData,
    dest_index: u32,
    value: *mut Object,
    num_elems: u32,
    table_id: usize,
) {
    let table = table_from_context(cx, table_id);
    table.fill(u64::from(dest_index), NonNull::new(value), u64::from(num_elems));
}

/// Entered when an indirect call's target failed its type check. The
/// trap kind depends on the sentinel identity of the fetched element, not
/// on the index.
pub unsafe extern "C-unwind" fn call_indirect_fail(
    cx: *mut ContextRuntimeData,
    index: u32,
    table_id: usize,
    function: *mut Object,
    expected_type_encoding: usize,
) {
    let table = table_from_context(cx, table_id);
    let Some(function) = NonNull::new(function) else {
        fatal!("call_indirect_fail received a null element");
    };

    if function == out_of_bounds_element() {
        log::debug!("call_indirect: index {index} is out-of-bounds");
        raise(Trap::OutOfBoundsTableAccess(table.id(), u64::from(index)));
    } else if function == uninitialized_element() {
        log::debug!("call_indirect: index {index} is uninitialized");
        raise(Trap::UninitializedTableElement(table.id(), u64::from(index)));
    } else {
        let expected = TypeEncoding::from_usize(expected_type_encoding);
        let callee = function.as_ref().as_function();
        let actual = callee.map_or(TypeEncoding::NONE, |f| f.type_encoding());
        log::debug!(
            "call_indirect: index {index} has signature {} ({}), but was expecting {}",
            describe_encoding(actual),
            callee.map_or("<not a function>", |f| f.debug_name()),
            describe_encoding(expected),
        );
        raise(Trap::IndirectCallSignatureMismatch(index, expected, actual));
    }
}

fn describe_encoding(encoding: TypeEncoding) -> String {
    match signature_of(encoding) {
        Some(sig) => sig.to_string(),
        None => "<unknown>".to_string(),
    }
}
