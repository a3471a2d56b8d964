//! Isolation scopes owning tables and module instances, plus the
//! runtime-data block loaded code indexes through the `tableOffset[i]`
//! externals.

use core::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Mutex};

use crate::fatal;
use crate::runtime::instance::ModuleInstance;
use crate::runtime::table::{Element, Table};

/// Capacity of the per-compartment table-base array; table ids index it.
pub const MAX_TABLES: usize = 256;

/// A sparse id-indexed collection. `add` hands out the lowest free id;
/// `insert_or_fail` installs at a caller-chosen id (cloning between
/// compartments keeps ids stable).
#[derive(Debug)]
pub(crate) struct IndexSpace<T> {
    slots: Vec<Option<T>>,
    limit: usize,
}

impl<T> IndexSpace<T> {
    pub(crate) fn with_limit(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            limit,
        }
    }

    pub(crate) fn free_id(&self) -> Option<usize> {
        match self.slots.iter().position(Option::is_none) {
            Some(id) => Some(id),
            None if self.slots.len() < self.limit => Some(self.slots.len()),
            None => None,
        }
    }

    pub(crate) fn add(&mut self, value: T) -> Option<usize> {
        let id = self.free_id()?;
        self.insert_or_fail(id, value);
        Some(id)
    }

    pub(crate) fn insert_or_fail(&mut self, id: usize, value: T) {
        assert!(id < self.limit);
        if id >= self.slots.len() {
            self.slots.resize_with(id + 1, || None);
        }
        assert!(self.slots[id].is_none(), "id {id} is already occupied");
        self.slots[id] = Some(value);
    }

    pub(crate) fn remove(&mut self, id: usize) -> Option<T> {
        self.slots.get_mut(id)?.take()
    }

    pub(crate) fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id)?.as_ref()
    }
}

/// The per-compartment record loaded code consults: `tableOffset[i]`
/// externals resolve to offsets of `table_bases` entries.
#[derive(Debug)]
pub struct RuntimeData {
    table_bases: Box<[AtomicPtr<Element>]>,
}

impl RuntimeData {
    fn new() -> Self {
        Self {
            table_bases: (0..MAX_TABLES)
                .map(|_| AtomicPtr::new(core::ptr::null_mut()))
                .collect(),
        }
    }

    pub fn table_base(&self, id: usize) -> *mut Element {
        self.table_bases[id].load(Ordering::Acquire)
    }

    fn set_table_base(&self, id: usize, base: *mut Element) {
        self.table_bases[id].store(base, Ordering::Release);
    }
}

#[derive(Debug)]
struct CompartmentInner {
    tables: IndexSpace<Arc<Table>>,
    instances: IndexSpace<Arc<ModuleInstance>>,
}

#[derive(Debug)]
pub struct Compartment {
    inner: Mutex<CompartmentInner>,
    runtime_data: RuntimeData,
}

impl Compartment {
    pub fn new() -> Arc<Compartment> {
        Arc::new(Compartment {
            inner: Mutex::new(CompartmentInner {
                tables: IndexSpace::with_limit(MAX_TABLES),
                instances: IndexSpace::with_limit(usize::MAX),
            }),
            runtime_data: RuntimeData::new(),
        })
    }

    pub fn runtime_data(&self) -> &RuntimeData {
        &self.runtime_data
    }

    pub fn table(&self, id: usize) -> Option<Arc<Table>> {
        self.inner.lock().unwrap().tables.get(id).cloned()
    }

    pub fn instance(&self, id: usize) -> Option<Arc<ModuleInstance>> {
        self.inner.lock().unwrap().instances.get(id).cloned()
    }

    /// Registers `table`, returning its id and publishing its element base.
    /// `None` when the id space is exhausted.
    pub(crate) fn register_table(&self, table: &Arc<Table>) -> Option<usize> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.tables.add(table.clone())?;
        self.runtime_data.set_table_base(id, table.elements_base());
        Some(id)
    }

    /// Registers `table` at a caller-chosen id (the clone path).
    pub(crate) fn register_table_at(&self, id: usize, table: &Arc<Table>) {
        let mut inner = self.inner.lock().unwrap();
        inner.tables.insert_or_fail(id, table.clone());
        self.runtime_data.set_table_base(id, table.elements_base());
    }

    /// Removes the table and clears its published base. The table's
    /// storage is released once the last reference drops.
    pub fn remove_table(&self, id: usize) -> Option<Arc<Table>> {
        let mut inner = self.inner.lock().unwrap();
        let table = inner.tables.remove(id)?;
        self.runtime_data.set_table_base(id, core::ptr::null_mut());
        Some(table)
    }

    pub fn register_instance(&self, instance: ModuleInstanceInit) -> Arc<ModuleInstance> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner
            .instances
            .free_id()
            .expect("instance id space is unbounded");
        let instance = Arc::new(ModuleInstance::new(id, instance));
        inner.instances.insert_or_fail(id, instance.clone());
        instance
    }
}

pub use crate::runtime::instance::ModuleInstanceInit;

/// The per-thread record intrinsic entry points receive from loaded code.
/// It leads with the owning compartment so intrinsics can resolve the
/// table and instance ids they are passed.
#[repr(C)]
#[derive(Debug)]
pub struct ContextRuntimeData {
    compartment: *const Compartment,
}

impl ContextRuntimeData {
    /// The caller must keep `compartment` alive for the life of the
    /// returned value.
    pub fn new(compartment: &Arc<Compartment>) -> Self {
        Self {
            compartment: Arc::as_ptr(compartment),
        }
    }
}

pub(crate) unsafe fn compartment_from_context<'a>(
    cx: *const ContextRuntimeData,
) -> &'a Compartment {
    &*(*cx).compartment
}

pub(crate) unsafe fn table_from_context(cx: *const ContextRuntimeData, id: usize) -> Arc<Table> {
    match compartment_from_context(cx).table(id) {
        Some(table) => table,
        None => fatal!("no table with id {id} in compartment"),
    }
}

pub(crate) unsafe fn instance_from_context(
    cx: *const ContextRuntimeData,
    id: usize,
) -> Arc<ModuleInstance> {
    match compartment_from_context(cx).instance(id) {
        Some(instance) => instance,
        None => fatal!("no module instance with id {id} in compartment"),
    }
}
