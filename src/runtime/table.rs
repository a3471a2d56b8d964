//! Indirect-element tables.
//!
//! A table is a grow-only array of biased object pointers inside a large
//! virtual reservation. On 64-bit hosts the reservation covers `2^32`
//! elements, so any untrusted 32-bit index is representable and the only
//! software bounds check (`index < num_reserved_elements`) is statically
//! eliminated; reads past the logical end land on zero-filled cells that
//! decode to the out-of-bounds sentinel and trap. Reads into
//! never-committed pages fault instead; the embedder's signal layer uses
//! [`is_address_owned_by_table`] to rethrow those as the same trap.

use core::mem;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use static_assertions::const_assert_eq;

use crate::ir::{Elem, TableType, MAX_TABLE_ELEMS};
use crate::runtime::compartment::Compartment;
use crate::runtime::instance::ModuleInstance;
use crate::runtime::object::{
    biased_to_object, object_to_biased, out_of_bounds_element, uninitialized_element, Object,
};
use crate::runtime::quota::ResourceQuotaRef;
use crate::runtime::trap::{raise, Trap};
use crate::{fatal, vm};

const NUM_GUARD_PAGES: u64 = 1;

// Enough address space to access any 32-bit index without bounds checking,
// or 4M elements if the host is 32-bit.
#[cfg(target_pointer_width = "64")]
const NUM_RESERVED_ELEMENTS: u64 = 1 << 32;
#[cfg(target_pointer_width = "32")]
const NUM_RESERVED_ELEMENTS: u64 = 4 * 1024 * 1024;

/// One table cell: an atomic platform word holding a biased object pointer.
/// The zero bit pattern decodes to the out-of-bounds sentinel.
#[derive(Debug)]
#[repr(transparent)]
pub struct Element(AtomicUsize);

const_assert_eq!(mem::size_of::<Element>(), mem::size_of::<usize>());

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowTableError {
    #[error("growth would exceed the table's size limits")]
    SizeLimitExceeded,
    #[error("table element quota exhausted")]
    QuotaExceeded,
    #[error("failed to commit pages for the new elements")]
    CommitFailed,
}

#[derive(thiserror::Error, Debug)]
pub enum CreateTableError {
    #[error("failed to reserve address space for the table")]
    ReservationFailed,
    #[error("initial element type is not a subtype of the table's element type")]
    BadInitialElementType,
    #[error("compartment table id space exhausted")]
    CompartmentFull,
    #[error(transparent)]
    Grow(#[from] GrowTableError),
}

/// Global list of tables; used to answer whether a faulting address is
/// reserved by one of them.
static TABLES: Lazy<Mutex<TableRegistry>> = Lazy::new(|| Mutex::new(TableRegistry(Vec::new())));

struct TableRegistry(Vec<*const Table>);

unsafe impl Send for TableRegistry {}

#[derive(Debug)]
pub struct Table {
    ty: TableType,
    debug_name: String,
    compartment: Weak<Compartment>,
    /// Assigned on compartment registration; `NO_ID` until then.
    id: AtomicUsize,
    elements: NonNull<Element>,
    num_reserved_bytes: u64,
    num_reserved_elements: u64,
    num_elements: AtomicUsize,
    resizing_mutex: Mutex<()>,
    resource_quota: ResourceQuotaRef,
}

unsafe impl Send for Table {}
unsafe impl Sync for Table {}

impl Table {
    pub const NO_ID: usize = usize::MAX;

    /// Creates a table, grows it to `ty.size.min` elements initialized to
    /// `initial_element` (null meaning uninitialized), and registers it in
    /// `compartment`, publishing its element base for loaded code.
    ///
    /// The initial element's type must be a subtype of the table's element
    /// type; this is checked on entry.
    pub fn create(
        compartment: &Arc<Compartment>,
        ty: TableType,
        initial_element: Option<NonNull<Object>>,
        debug_name: impl Into<String>,
        resource_quota: ResourceQuotaRef,
    ) -> Result<Arc<Table>, CreateTableError> {
        let initial_element = match initial_element {
            None => uninitialized_element(),
            Some(object) => {
                let ref_type = unsafe { object.as_ref() }.ref_type();
                if !ref_type.is_subtype_of(ty.element_type) {
                    return Err(CreateTableError::BadInitialElementType);
                }
                object
            }
        };

        let table = Table::create_impl(compartment, ty, debug_name.into(), resource_quota)?;
        table.grow_impl(table.ty.size.min, true, initial_element)?;

        let id = compartment
            .register_table(&table)
            .ok_or(CreateTableError::CompartmentFull)?;
        table.id.store(id, Ordering::Release);
        Ok(table)
    }

    /// Clones `table` into `new_compartment` with the same id, length and
    /// element values.
    pub fn clone_in(
        table: &Arc<Table>,
        new_compartment: &Arc<Compartment>,
    ) -> Result<Arc<Table>, CreateTableError> {
        // Hold the source's resizing mutex so its length is stable while
        // the elements are copied.
        let resizing_lock = table.resizing_mutex.lock().unwrap();
        let num_elements = table.len();

        let new_table = Table::create_impl(
            new_compartment,
            table.ty.clone(),
            table.debug_name.clone(),
            table.resource_quota.clone(),
        )?;

        // Grow without initializing; every cell is written immediately below.
        new_table.grow_impl(num_elements, false, uninitialized_element())?;

        for index in 0..num_elements {
            let biased = table.cell(index).0.load(Ordering::Acquire);
            new_table.cell(index).0.store(biased, Ordering::Release);
        }
        drop(resizing_lock);

        let id = table.id();
        new_compartment.register_table_at(id, &new_table);
        new_table.id.store(id, Ordering::Release);
        Ok(new_table)
    }

    fn create_impl(
        compartment: &Arc<Compartment>,
        ty: TableType,
        debug_name: String,
        resource_quota: ResourceQuotaRef,
    ) -> Result<Arc<Table>, CreateTableError> {
        let num_reserved_bytes = NUM_RESERVED_ELEMENTS * mem::size_of::<Element>() as u64;
        let num_reserved_pages = num_reserved_bytes >> vm::page_size_log2();

        let elements = vm::reserve_virtual_pages(num_reserved_pages + NUM_GUARD_PAGES)
            .ok_or(CreateTableError::ReservationFailed)?
            .cast::<Element>();

        let table = Arc::new(Table {
            ty,
            debug_name,
            compartment: Arc::downgrade(compartment),
            id: AtomicUsize::new(Table::NO_ID),
            elements,
            num_reserved_bytes,
            num_reserved_elements: NUM_RESERVED_ELEMENTS,
            num_elements: AtomicUsize::new(0),
            resizing_mutex: Mutex::new(()),
            resource_quota,
        });

        TABLES.lock().unwrap().0.push(Arc::as_ptr(&table));
        Ok(table)
    }

    /// Current logical length.
    pub fn len(&self) -> u64 {
        self.num_elements.load(Ordering::Acquire) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn table_type(&self) -> &TableType {
        &self.ty
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn id(&self) -> usize {
        self.id.load(Ordering::Acquire)
    }

    pub fn compartment(&self) -> Option<Arc<Compartment>> {
        self.compartment.upgrade()
    }

    pub(crate) fn elements_base(&self) -> *mut Element {
        self.elements.as_ptr()
    }

    fn cell(&self, index: u64) -> &Element {
        debug_assert!(index < self.num_reserved_elements);
        unsafe { &*self.elements.as_ptr().add(index as usize) }
    }

    /// Grows the table by `delta` elements initialized to `initial` (null
    /// meaning uninitialized), returning the old length. `delta == 0` is a
    /// pure length query.
    pub fn grow(
        &self,
        delta: u64,
        initial: Option<NonNull<Object>>,
    ) -> Result<u64, GrowTableError> {
        self.grow_impl(delta, true, initial.unwrap_or_else(uninitialized_element))
    }

    fn grow_impl(
        &self,
        delta: u64,
        initialize_new_elements: bool,
        initial: NonNull<Object>,
    ) -> Result<u64, GrowTableError> {
        if delta == 0 {
            return Ok(self.len());
        }

        // Check the table element quota.
        if let Some(quota) = &self.resource_quota {
            if !quota.table_elems.allocate(delta) {
                return Err(GrowTableError::QuotaExceeded);
            }
        }
        let free_quota = || {
            if let Some(quota) = &self.resource_quota {
                quota.table_elems.free(delta);
            }
        };

        let resizing_lock = self.resizing_mutex.lock().unwrap();
        let old_num_elements = self.len();

        // Reject growth past the type's maximum or the implementation
        // limit, with arithmetic that cannot underflow.
        let max = self.ty.size.max;
        if delta > max
            || old_num_elements > max - delta
            || delta > MAX_TABLE_ELEMS
            || old_num_elements > MAX_TABLE_ELEMS - delta
            || old_num_elements + delta > self.num_reserved_elements
        {
            free_quota();
            return Err(GrowTableError::SizeLimitExceeded);
        }
        let new_num_elements = old_num_elements + delta;

        // Commit pages for the new elements.
        let element_size = mem::size_of::<Element>() as u64;
        let previous_pages = vm::num_platform_pages(old_num_elements * element_size);
        let new_pages = vm::num_platform_pages(new_num_elements * element_size);
        if new_pages != previous_pages {
            let commit_base = unsafe {
                self.elements
                    .as_ptr()
                    .cast::<u8>()
                    .add((previous_pages as usize) << vm::page_size_log2())
            };
            let committed = unsafe {
                vm::commit_virtual_pages(
                    NonNull::new_unchecked(commit_base),
                    new_pages - previous_pages,
                )
            };
            if !committed {
                free_quota();
                return Err(GrowTableError::CommitFailed);
            }
            log::trace!(
                "table {:?}: committed pages {previous_pages}..{new_pages}",
                self.debug_name
            );
        }

        if initialize_new_elements {
            let biased = object_to_biased(initial);
            for index in old_num_elements..new_num_elements {
                self.cell(index).0.store(biased, Ordering::Release);
            }
        }

        self.num_elements
            .store(new_num_elements as usize, Ordering::Release);
        drop(resizing_lock);

        Ok(old_num_elements)
    }

    /// Replaces the element at `index`, returning the old element with the
    /// uninitialized sentinel translated to null (both directions).
    pub fn set(&self, index: u64, new_value: Option<NonNull<Object>>) -> Option<NonNull<Object>> {
        let new_value = new_value.unwrap_or_else(uninitialized_element);
        let old = self.set_non_null(index, new_value);
        (old != uninitialized_element()).then_some(old)
    }

    /// Reads the element at `index`; null means uninitialized.
    pub fn get(&self, index: u64) -> Option<NonNull<Object>> {
        let object = self.get_non_null(index);
        (object != uninitialized_element()).then_some(object)
    }

    /// Writes every element in `[dest_offset, dest_offset + num_elements)`
    /// to `value` (null meaning uninitialized).
    pub fn fill(&self, dest_offset: u64, value: Option<NonNull<Object>>, num_elements: u64) {
        let value = value.unwrap_or_else(uninitialized_element);
        for index in 0..num_elements {
            self.set_non_null(dest_offset + index, value);
        }
    }

    pub(crate) fn set_non_null(&self, index: u64, new_value: NonNull<Object>) -> NonNull<Object> {
        // The only software bounds check; on 64-bit hosts
        // `num_reserved_elements` admits every 32-bit index.
        if index >= self.num_reserved_elements {
            raise(Trap::OutOfBoundsTableAccess(self.id(), index));
        }

        // Saturate the index used for addressing so speculation past the
        // bounds check stays inside the reservation.
        let saturated_index = index.min(self.num_reserved_elements - 1);
        let biased = object_to_biased(new_value);

        // Atomically replace the element, trapping before the write if the
        // element being replaced is the out-of-bounds sentinel.
        let cell = &self.cell(saturated_index).0;
        let mut old_biased = cell.load(Ordering::Relaxed);
        loop {
            if biased_to_object(old_biased) == out_of_bounds_element() {
                raise(Trap::OutOfBoundsTableAccess(self.id(), index));
            }
            match cell.compare_exchange_weak(
                old_biased,
                biased,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(observed) => old_biased = observed,
            }
        }

        biased_to_object(old_biased)
    }

    pub(crate) fn get_non_null(&self, index: u64) -> NonNull<Object> {
        if index >= self.num_reserved_elements {
            raise(Trap::OutOfBoundsTableAccess(self.id(), index));
        }
        let saturated_index = index.min(self.num_reserved_elements - 1);

        let biased = self.cell(saturated_index).0.load(Ordering::Acquire);
        let object = biased_to_object(biased);
        if object == out_of_bounds_element() {
            raise(Trap::OutOfBoundsTableAccess(self.id(), index));
        }
        object
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        // Remove the table from the global registry.
        {
            let mut tables = TABLES.lock().unwrap();
            let this = self as *const Table;
            tables.0.retain(|&table| table != this);
        }

        // Release the reservation, guard pages included.
        let num_reserved_pages = self.num_reserved_bytes >> vm::page_size_log2();
        unsafe {
            vm::release_virtual_pages(self.elements.cast(), num_reserved_pages + NUM_GUARD_PAGES);
        }

        // Return the allocated quota.
        if let Some(quota) = &self.resource_quota {
            quota.table_elems.free(self.len());
        }
    }
}

/// Initializes `[dest_offset, dest_offset + num_elems)` of `table` from a
/// module's ref-null/ref-func tagged element segment. A source index past
/// the segment traps without writing further destination cells.
pub fn init_elem_segment(
    instance: &ModuleInstance,
    segment_index: u32,
    segment: &[Elem],
    table: &Table,
    dest_offset: u64,
    source_offset: u64,
    num_elems: u64,
) {
    for index in 0..num_elems {
        let source_index = source_offset.wrapping_add(index);
        if source_index >= segment.len() as u64 || source_index < source_offset {
            raise(Trap::OutOfBoundsElemSegmentAccess(
                instance.id(),
                segment_index,
                source_index,
            ));
        }

        let object = match segment[source_index as usize] {
            Elem::RefNull => None,
            Elem::RefFunc(func) => Some(instance.function(func).unwrap_or_else(|| {
                fatal!("element segment references function {func:?} outside the instance")
            })),
        };
        table.set(dest_offset + index, object);
    }
}

/// `table.copy` semantics: when the destination range starts above the
/// source range, elements are copied in descending order so source cells
/// are read before they can be overwritten. Cross-table copies are not
/// atomic as a whole; each element write is individual.
pub fn copy_table_elements(
    dest_table: &Table,
    source_table: &Table,
    dest_offset: u64,
    source_offset: u64,
    num_elements: u64,
) {
    if source_offset < dest_offset {
        for index in (0..num_elements).rev() {
            dest_table.set_non_null(
                dest_offset + index,
                source_table.get_non_null(source_offset + index),
            );
        }
    } else {
        for index in 0..num_elements {
            dest_table.set_non_null(
                dest_offset + index,
                source_table.get_non_null(source_offset + index),
            );
        }
    }
}

/// Whether `address` falls inside some live table's reservation; on a hit,
/// the table and the element index covering the address. The signal layer
/// uses this to turn a faulting access into a precise table trap.
///
/// The returned pointer is only meaningful while the table is kept alive
/// by its compartment.
pub fn is_address_owned_by_table(address: *const u8) -> Option<(NonNull<Table>, u64)> {
    let tables = TABLES.lock().unwrap();
    for &table in &tables.0 {
        let start = unsafe { (*table).elements.as_ptr() as usize };
        let end = start + unsafe { (*table).num_reserved_bytes } as usize;
        if (address as usize) >= start && (address as usize) < end {
            let index = (address as usize - start) / mem::size_of::<Element>();
            return Some((unsafe { NonNull::new_unchecked(table.cast_mut()) }, index as u64));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{RefType, SizeConstraints, TypeEncoding};
    use crate::runtime::instance::ModuleInstanceInit;
    use crate::runtime::object::Function;
    use crate::runtime::quota::ResourceQuota;
    use crate::runtime::trap::catch_traps;

    fn funcref_table_type(min: u64, max: u64) -> TableType {
        TableType {
            element_type: RefType::Func,
            size: SizeConstraints { min, max },
        }
    }

    fn dummy_function(name: &str) -> Box<Function> {
        Function::new(name, Function::NO_INSTANCE, TypeEncoding::NONE)
    }

    #[test]
    fn create_grow_get() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(2, 10),
            None,
            "create_grow_get",
            None,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0), None);
        assert_eq!(table.get(1), None);

        let fn_a = dummy_function("a");
        let old = table.grow(3, Some(fn_a.object_ptr())).unwrap();
        assert_eq!(old, 2);
        assert_eq!(table.len(), 5);
        assert_eq!(table.get(4), Some(fn_a.object_ptr()));
        // The pre-existing elements are untouched.
        assert_eq!(table.get(1), None);

        compartment.remove_table(table.id());
    }

    #[test]
    fn set_within_bounds_traps_past_the_end() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(2, 10),
            None,
            "set_bounds",
            None,
        )
        .unwrap();
        table.grow(3, None).unwrap();

        let fn_b = dummy_function("b");
        let fn_c = dummy_function("c");
        assert_eq!(table.set(1, Some(fn_b.object_ptr())), None);
        assert_eq!(table.get(1), Some(fn_b.object_ptr()));

        let result = catch_traps(|| table.set(5, Some(fn_c.object_ptr())));
        assert_eq!(
            result,
            Err(Trap::OutOfBoundsTableAccess(table.id(), 5))
        );
        // Access exactly at the logical end traps too.
        assert_eq!(
            catch_traps(|| table.get(table.len())),
            Err(Trap::OutOfBoundsTableAccess(table.id(), 5))
        );

        compartment.remove_table(table.id());
    }

    #[test]
    fn reserved_bound_traps_before_touching_memory() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(1, u64::MAX),
            None,
            "reserved_bound",
            None,
        )
        .unwrap();

        assert_eq!(
            catch_traps(|| table.get(NUM_RESERVED_ELEMENTS)),
            Err(Trap::OutOfBoundsTableAccess(table.id(), NUM_RESERVED_ELEMENTS))
        );
        assert_eq!(
            catch_traps(|| table.set(u64::MAX, None)),
            Err(Trap::OutOfBoundsTableAccess(table.id(), u64::MAX))
        );

        compartment.remove_table(table.id());
    }

    #[test]
    fn grow_rejects_past_the_maximum() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(2, 10),
            None,
            "grow_max",
            None,
        )
        .unwrap();
        table.grow(3, None).unwrap();

        assert_eq!(table.grow(10, None), Err(GrowTableError::SizeLimitExceeded));
        assert_eq!(table.len(), 5);
        // Zero-delta growth is a pure query.
        assert_eq!(table.grow(0, None), Ok(5));
        assert_eq!(table.len(), 5);

        compartment.remove_table(table.id());
    }

    #[test]
    fn growth_is_monotonic() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(0, 1000),
            None,
            "monotonic",
            None,
        )
        .unwrap();

        let mut expected = 0;
        for delta in [1u64, 0, 7, 900, 0, 92] {
            let before = table.len();
            match table.grow(delta, None) {
                Ok(old) => {
                    assert_eq!(old, before);
                    expected += delta;
                }
                Err(_) => {}
            }
            assert!(table.len() >= before);
            assert_eq!(table.len(), expected);
        }

        compartment.remove_table(table.id());
    }

    #[test]
    fn quota_bounds_growth_and_is_returned() {
        let compartment = Compartment::new();
        let quota = ResourceQuota::new(4);
        let table = Table::create(
            &compartment,
            funcref_table_type(2, 100),
            None,
            "quota",
            Some(quota.clone()),
        )
        .unwrap();
        assert_eq!(quota.table_elems.used(), 2);

        assert_eq!(table.grow(3, None), Err(GrowTableError::QuotaExceeded));
        assert_eq!(quota.table_elems.used(), 2);
        assert_eq!(table.grow(2, None), Ok(2));
        assert_eq!(quota.table_elems.used(), 4);

        compartment.remove_table(table.id());
        drop(table);
        assert_eq!(quota.table_elems.used(), 0);
    }

    #[test]
    fn rejects_initial_element_of_the_wrong_type() {
        let compartment = Compartment::new();
        let host = crate::runtime::object::HostRef::new("h");
        let result = Table::create(
            &compartment,
            funcref_table_type(1, 10),
            Some(host.object_ptr()),
            "bad_initial",
            None,
        );
        assert!(matches!(result, Err(CreateTableError::BadInitialElementType)));
    }

    #[test]
    fn clone_preserves_id_length_and_elements() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(5, 10),
            None,
            "clone_src",
            None,
        )
        .unwrap();
        let fn_a = dummy_function("a");
        let fn_b = dummy_function("b");
        table.set(0, Some(fn_a.object_ptr()));
        table.set(3, Some(fn_b.object_ptr()));

        let new_compartment = Compartment::new();
        let clone = Table::clone_in(&table, &new_compartment).unwrap();
        assert_eq!(clone.id(), table.id());
        assert_eq!(clone.len(), table.len());
        for index in 0..table.len() {
            assert_eq!(clone.get(index), table.get(index));
        }
        assert_eq!(
            new_compartment.runtime_data().table_base(clone.id()),
            clone.elements_base()
        );

        compartment.remove_table(table.id());
        new_compartment.remove_table(clone.id());
    }

    #[test]
    fn copy_descending_preserves_overlapping_source() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(5, 10),
            None,
            "copy_overlap",
            None,
        )
        .unwrap();
        let fns: Vec<_> = (0..3).map(|i| dummy_function(&format!("f{i}"))).collect();
        for (i, f) in fns.iter().enumerate() {
            table.set(i as u64, Some(f.object_ptr()));
        }

        copy_table_elements(&table, &table, 1, 0, 3);

        assert_eq!(table.get(0), Some(fns[0].object_ptr()));
        assert_eq!(table.get(1), Some(fns[0].object_ptr()));
        assert_eq!(table.get(2), Some(fns[1].object_ptr()));
        assert_eq!(table.get(3), Some(fns[2].object_ptr()));

        compartment.remove_table(table.id());
    }

    #[test]
    fn fill_translates_null_to_uninitialized() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(4, 10),
            None,
            "fill",
            None,
        )
        .unwrap();
        let fn_a = dummy_function("a");
        table.fill(0, Some(fn_a.object_ptr()), 4);
        assert_eq!(table.get(2), Some(fn_a.object_ptr()));
        table.fill(1, None, 2);
        assert_eq!(table.get(0), Some(fn_a.object_ptr()));
        assert_eq!(table.get(1), None);
        assert_eq!(table.get(2), None);
        assert_eq!(table.get(3), Some(fn_a.object_ptr()));

        compartment.remove_table(table.id());
    }

    #[test]
    fn elem_segment_bounds_stop_at_the_first_bad_index() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(5, 10),
            None,
            "elem_segment",
            None,
        )
        .unwrap();
        let func = dummy_function("seg");
        let instance = compartment.register_instance(ModuleInstanceInit {
            debug_name: "inst".into(),
            functions: vec![func.object_ptr()],
            elem_segments: Vec::new(),
        });
        let segment = vec![
            Elem::RefFunc(crate::ir::FuncIndex::from_u32(0)),
            Elem::RefNull,
            Elem::RefFunc(crate::ir::FuncIndex::from_u32(0)),
        ];

        let result = catch_traps(|| {
            init_elem_segment(&instance, 0, &segment, &table, 0, 2, 2);
        });
        assert_eq!(
            result,
            Err(Trap::OutOfBoundsElemSegmentAccess(instance.id(), 0, 3))
        );
        // The first destination cell was written before the trap.
        assert_eq!(table.get(0), Some(func.object_ptr()));
        assert_eq!(table.get(1), None);

        compartment.remove_table(table.id());
    }

    #[test]
    fn address_ownership_query() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(2, 10),
            None,
            "ownership",
            None,
        )
        .unwrap();

        let cell_3 = unsafe { table.elements_base().add(3) } as *const u8;
        let (owner, index) = is_address_owned_by_table(cell_3).unwrap();
        assert_eq!(owner.as_ptr().cast_const(), Arc::as_ptr(&table));
        assert_eq!(index, 3);

        let unrelated = &compartment as *const _ as *const u8;
        assert!(is_address_owned_by_table(unrelated).is_none());

        compartment.remove_table(table.id());
        drop(table);
        assert!(is_address_owned_by_table(cell_3).is_none());
    }

    #[test]
    fn concurrent_readers_observe_complete_growth() {
        let compartment = Compartment::new();
        let table = Table::create(
            &compartment,
            funcref_table_type(1, 100_000),
            None,
            "concurrent",
            None,
        )
        .unwrap();
        let fn_a = dummy_function("a");
        let init_addr = fn_a.object_ptr().as_ptr() as usize;

        std::thread::scope(|scope| {
            let grower = &table;
            scope.spawn(move || {
                let init = std::ptr::NonNull::new(init_addr as *mut Object).unwrap();
                for _ in 0..64 {
                    grower.grow(16, Some(init)).unwrap();
                }
            });
            let reader = &table;
            scope.spawn(move || {
                let init = std::ptr::NonNull::new(init_addr as *mut Object).unwrap();
                for _ in 0..1000 {
                    let len = reader.len();
                    if len > 1 {
                        // Every index below the observed length is readable.
                        assert_eq!(reader.get(len - 1), Some(init));
                    }
                }
            });
        });

        assert_eq!(table.len(), 1 + 64 * 16);
        compartment.remove_table(table.id());
    }
}
