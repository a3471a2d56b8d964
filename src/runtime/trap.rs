//! Precise, recoverable execution failures.
//!
//! Traps raised inside intrinsics unwind through native (including
//! JIT-compiled) frames and are caught by the host at the JIT boundary.
//! The transport is panic unwinding: intrinsic entry points are
//! `extern "C-unwind"` and [`catch_traps`] recovers the payload.

use std::panic::{self, AssertUnwindSafe};

use crate::ir::TypeEncoding;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Trap {
    /// Out-of-bounds access to a table (table id, index).
    #[error("out of bounds table access (table {0}, index {1})")]
    OutOfBoundsTableAccess(usize, u64),
    /// Indirect call through an uninitialized table element (table id, index).
    #[error("uninitialized table element (table {0}, index {1})")]
    UninitializedTableElement(usize, u64),
    /// Signature mismatch on an indirect call (index, expected, actual).
    #[error("indirect call signature mismatch (index {0})")]
    IndirectCallSignatureMismatch(u32, TypeEncoding, TypeEncoding),
    /// Out-of-bounds read of an element segment (instance id, segment, index).
    #[error("out of bounds element segment access (instance {0}, segment {1}, index {2})")]
    OutOfBoundsElemSegmentAccess(usize, u32, u64),
    #[error("invalid argument")]
    InvalidArgument,
}

/// Raises `trap`, unwinding to the nearest [`catch_traps`].
///
/// Bypasses the panic hook: a trap is guest-visible control flow, not a
/// host bug.
pub fn raise(trap: Trap) -> ! {
    panic::resume_unwind(Box::new(trap))
}

/// Runs `f`, converting a raised [`Trap`] into an error. Panics that are
/// not traps keep unwinding.
pub fn catch_traps<R>(f: impl FnOnce() -> R) -> Result<R, Trap> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<Trap>() {
            Ok(trap) => Err(*trap),
            Err(payload) => panic::resume_unwind(payload),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catches_raised_traps() {
        let result = catch_traps(|| -> u32 { raise(Trap::InvalidArgument) });
        assert_eq!(result, Err(Trap::InvalidArgument));
        assert_eq!(catch_traps(|| 7), Ok(7));
    }

    #[test]
    fn foreign_panics_keep_unwinding() {
        let result = panic::catch_unwind(|| catch_traps(|| panic!("not a trap")));
        assert!(result.is_err());
    }

    #[test]
    fn display_names_the_site() {
        let trap = Trap::OutOfBoundsTableAccess(3, 17);
        assert_eq!(trap.to_string(), "out of bounds table access (table 3, index 17)");
    }
}
