//! Instantiated modules, as far as the table subsystem needs them:
//! a function list for `ref_func` element entries and the passive element
//! segments `table.init` reads.

use core::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::ir::{Elem, FuncIndex};
use crate::runtime::object::Object;

/// Everything the compartment needs to build a [`ModuleInstance`].
#[derive(Debug, Default)]
pub struct ModuleInstanceInit {
    pub debug_name: String,
    /// One entry per module function, imports first; `ref_func` segment
    /// entries index this.
    pub functions: Vec<NonNull<Object>>,
    /// One slot per element segment; dropped segments become `None`.
    pub elem_segments: Vec<Vec<Elem>>,
}

#[derive(Debug)]
pub struct ModuleInstance {
    id: usize,
    debug_name: String,
    functions: Vec<NonNull<Object>>,
    elem_segments: Mutex<Vec<Option<Arc<Vec<Elem>>>>>,
}

unsafe impl Send for ModuleInstance {}
unsafe impl Sync for ModuleInstance {}

impl ModuleInstance {
    pub(crate) fn new(id: usize, init: ModuleInstanceInit) -> Self {
        Self {
            id,
            debug_name: init.debug_name,
            functions: init.functions,
            elem_segments: Mutex::new(init.elem_segments.into_iter().map(|segment| Some(Arc::new(segment))).collect()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    pub fn function(&self, index: FuncIndex) -> Option<NonNull<Object>> {
        self.functions.get(index.as_u32() as usize).copied()
    }

    pub fn functions(&self) -> &[NonNull<Object>] {
        &self.functions
    }

    /// A shared handle to a live segment, or `None` if it was dropped or
    /// never existed. Callers copy the handle out so element writes run
    /// outside the segments lock.
    pub fn clone_segment(&self, index: usize) -> Option<Arc<Vec<Elem>>> {
        self.elem_segments.lock().unwrap().get(index)?.clone()
    }

    /// Releases a segment's storage; false if it was already dropped or
    /// never existed.
    pub fn drop_segment(&self, index: usize) -> bool {
        match self.elem_segments.lock().unwrap().get_mut(index) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }
}
