mod hash_index;
mod int_set;

pub use hash_index::{HashIndex, SpaceUsage};
pub use int_set::DenseStaticIntSet;
