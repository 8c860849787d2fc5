//! # Memory Mapping for Shared Ring Pages
//!
//! ## Purpose
//!
//! This module provides the owner of the page that backs a shared ring. The page
//! is allocated by the front-end, granted to the backend, and released only when
//! the owning queue is torn down.
//!
//! ## How it works
//!
//! `OwnedMmap` wraps an anonymous `libc::mmap` region rounded up to the system page
//! size, which is always a multiple of the ring ABI's 4 KiB page, so the start of
//! the mapping is suitably aligned for sharing. `Drop` calls `munmap`.
//!
//! ## Main components
//!
//! - `OwnedMmap`: safe owner of a memory-mapped region.

use std::{io, ptr};

/// A safe wrapper for a memory-mapped region.
///
/// This struct owns the memory-mapped pointer and ensures that `munmap` is called
/// when it goes out of scope.
pub struct OwnedMmap(
    /// A raw pointer to the beginning of the memory-mapped area.
    pub *mut libc::c_void,
    /// The total size of the memory-mapped area in bytes.
    pub usize,
);

// The mapping is exclusively owned; moving the owner to another thread moves
// the only handle the front-end has to it.
unsafe impl Send for OwnedMmap {}

impl OwnedMmap {
    /// Creates a new zero-filled, private, anonymous mapping of at least `size` bytes.
    ///
    /// The size is rounded up to the system page size.
    pub fn mmap(size: usize) -> Result<Self, io::Error> {
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
        let aligned_size = (size.max(1) + page_size - 1) & !(page_size - 1);
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                aligned_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(OwnedMmap(ptr, aligned_size))
    }

    /// Returns the region as a byte pointer.
    pub fn as_u8_ptr(&self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// Returns the size of the memory-mapped region in bytes.
    pub fn len(&self) -> usize {
        self.1
    }

    /// Returns `true` if the memory-mapped region has a size of zero.
    pub fn is_empty(&self) -> bool {
        self.1 == 0
    }

    /// Clears the whole region.
    pub fn zero(&mut self) {
        unsafe { ptr::write_bytes(self.as_u8_ptr(), 0, self.1) }
    }
}

impl Drop for OwnedMmap {
    fn drop(&mut self) {
        unsafe {
            if self.0 != libc::MAP_FAILED && !self.0.is_null() {
                let res = libc::munmap(self.0, self.1);
                if res < 0 {
                    log::error!("Failed to unmap memory: {}", io::Error::last_os_error());
                }
            }
        }
    }
}
