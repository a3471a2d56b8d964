//! Runtime objects that loaded code indexes at execution time:
//! compartments, module instances, resource quotas and, centrally, the
//! indirect-element tables with their intrinsic entry points.

pub mod builtins;
mod compartment;
mod instance;
mod object;
mod quota;
mod table;
mod trap;

pub use compartment::{
    Compartment, ContextRuntimeData, ModuleInstanceInit, RuntimeData, MAX_TABLES,
};
pub use instance::ModuleInstance;
pub use object::{
    biased_to_object, object_to_biased, out_of_bounds_element, uninitialized_element, Function,
    FunctionMutableData, HostRef, Object, ObjectKind,
};
pub use quota::{QuotaPool, ResourceQuota, ResourceQuotaRef};
pub use table::{
    copy_table_elements, init_elem_segment, is_address_owned_by_table, CreateTableError, Element,
    GrowTableError, Table,
};
pub use trap::{catch_traps, raise, Trap};
