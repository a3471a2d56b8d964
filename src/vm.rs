//! Virtual-memory primitives at page granularity.
//!
//! This is the surface the tables runtime consumes: reserve a range of
//! address space without backing it, commit sub-ranges on demand, release
//! the whole range on destruction. Reserved-but-uncommitted pages fault on
//! access; the embedder's signal-translation layer is expected to turn such
//! faults into traps (see
//! [`runtime::is_address_owned_by_table`](crate::runtime::is_address_owned_by_table)).

use core::ptr::NonNull;
use std::sync::OnceLock;

/// Base-2 log of the host page size.
pub fn page_size_log2() -> u32 {
    static PAGE_SIZE_LOG2: OnceLock<u32> = OnceLock::new();
    *PAGE_SIZE_LOG2.get_or_init(|| {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        assert!(page_size.is_power_of_two());
        page_size.trailing_zeros()
    })
}

pub fn page_size() -> usize {
    1 << page_size_log2()
}

/// Number of pages needed to cover `num_bytes`.
pub fn num_platform_pages(num_bytes: u64) -> u64 {
    (num_bytes + (1 << page_size_log2()) - 1) >> page_size_log2()
}

fn pages_to_bytes(num_pages: u64) -> Option<usize> {
    let num_bytes = num_pages.checked_mul(1 << page_size_log2())?;
    usize::try_from(num_bytes).ok()
}

/// Reserves `num_pages` of address space without committing it. Accessing
/// the range faults until committed. Returns `None` when the reservation
/// cannot be satisfied.
pub fn reserve_virtual_pages(num_pages: u64) -> Option<NonNull<u8>> {
    let num_bytes = pages_to_bytes(num_pages)?;
    #[cfg(target_os = "linux")]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    #[cfg(not(target_os = "linux"))]
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

    let ptr = unsafe {
        libc::mmap(
            core::ptr::null_mut(),
            num_bytes,
            libc::PROT_NONE,
            flags,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        None
    } else {
        NonNull::new(ptr.cast())
    }
}

/// Commits `num_pages` of a previously reserved range starting at `base`,
/// making them readable, writable and zero-filled.
///
/// # Safety
///
/// `base` must be page-aligned and the range must lie inside a live
/// reservation returned by [`reserve_virtual_pages`].
pub unsafe fn commit_virtual_pages(base: NonNull<u8>, num_pages: u64) -> bool {
    let Some(num_bytes) = pages_to_bytes(num_pages) else {
        return false;
    };
    libc::mprotect(
        base.as_ptr().cast(),
        num_bytes,
        libc::PROT_READ | libc::PROT_WRITE,
    ) == 0
}

/// Releases an entire reservation.
///
/// # Safety
///
/// `base` and `num_pages` must describe exactly one live reservation, with
/// no outstanding references into it.
pub unsafe fn release_virtual_pages(base: NonNull<u8>, num_pages: u64) {
    let num_bytes = pages_to_bytes(num_pages).expect("reservation size was validated at reserve");
    let rc = libc::munmap(base.as_ptr().cast(), num_bytes);
    debug_assert_eq!(rc, 0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_math() {
        let page = page_size() as u64;
        assert_eq!(num_platform_pages(0), 0);
        assert_eq!(num_platform_pages(1), 1);
        assert_eq!(num_platform_pages(page), 1);
        assert_eq!(num_platform_pages(page + 1), 2);
    }

    #[test]
    fn reserve_commit_release() {
        let base = reserve_virtual_pages(4).unwrap();
        unsafe {
            assert!(commit_virtual_pages(base, 2));
            // Committed pages are zero-filled and writable.
            let slice = core::slice::from_raw_parts_mut(base.as_ptr(), page_size() * 2);
            assert!(slice.iter().all(|&byte| byte == 0));
            slice[0] = 0xa5;
            assert_eq!(slice[0], 0xa5);
            release_virtual_pages(base, 4);
        }
    }
}
