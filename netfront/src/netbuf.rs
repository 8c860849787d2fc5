//! # Packet Buffers
//!
//! ## Purpose
//!
//! `NetBuf` is the unit of exchange between the network stack and the queues: one
//! page-aligned page of memory plus a data window (`offset`, `len`) and checksum
//! state. The queues grant the page to the backend while the buffer is in flight.
//!
//! ## How it works
//!
//! The page is allocated with `std::alloc` using a page-sized, page-aligned layout,
//! so every buffer starts on a page boundary by construction. The buffer owns the
//! page through a raw pointer: while it is granted the backend may write into it,
//! so no `Box`/reference uniqueness is claimed over the memory.
//!
//! ## Main components
//!
//! - `NetBuf`: owned page with a data window, checksum flags and an optional
//!   continuation (only used to reject chained transmits).
//! - `NetBufFlags`: checksum state carried with the packet.
//! - `PageAddr`: address of a page as handed to the grant table.

use bitflags::bitflags;
use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;

/// Page size of the ring ABI.
pub const PAGE_SIZE: usize = 4096;

/// Address of a page shared with the backend.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PageAddr(pub usize);

impl PageAddr {
    pub fn as_mut_ptr(self) -> *mut u8 {
        self.0 as *mut u8
    }

    pub fn is_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }
}

bitflags! {
    /// Checksum state of a packet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NetBufFlags: u8 {
        /// Checksum has not been computed yet (`csum_start`/`csum_offset` say where).
        const PARTIAL_CSUM = 1 << 0;
        /// Checksum was already verified.
        const DATA_VALIDATED = 1 << 1;
    }
}

fn page_layout() -> Layout {
    // PAGE_SIZE is a non-zero power of two.
    Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).unwrap_or_else(|_| unreachable!())
}

pub struct NetBuf {
    page: NonNull<u8>,
    offset: usize,
    len: usize,
    pub flags: NetBufFlags,
    pub csum_start: u16,
    pub csum_offset: u16,
    next: Option<Box<NetBuf>>,
}

// The page is exclusively owned by the buffer.
unsafe impl Send for NetBuf {}

impl NetBuf {
    /// Allocates a zeroed page with an empty data window at offset 0.
    pub fn new() -> Self {
        let layout = page_layout();
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let Some(page) = NonNull::new(ptr) else {
            alloc::handle_alloc_error(layout)
        };
        NetBuf {
            page,
            offset: 0,
            len: 0,
            flags: NetBufFlags::empty(),
            csum_start: 0,
            csum_offset: 0,
            next: None,
        }
    }

    /// Allocates a buffer and copies `data` in at `headroom` bytes into the page.
    ///
    /// Returns `None` if the data does not fit.
    pub fn from_slice(headroom: usize, data: &[u8]) -> Option<Self> {
        let mut buf = NetBuf::new();
        buf.set_window(headroom, data.len())?;
        buf.data_mut().copy_from_slice(data);
        Some(buf)
    }

    /// Address of the backing page.
    pub fn page_addr(&self) -> PageAddr {
        PageAddr(self.page.as_ptr() as usize)
    }

    /// Offset of the data window from the start of the page.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Moves the data window. Returns `None` if it would leave the page.
    pub fn set_window(&mut self, offset: usize, len: usize) -> Option<()> {
        if offset.checked_add(len)? > PAGE_SIZE {
            return None;
        }
        self.offset = offset;
        self.len = len;
        Some(())
    }

    /// Shrinks the data window to `len` bytes without moving it.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.page.as_ptr().add(self.offset), self.len) }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.page.as_ptr().add(self.offset), self.len) }
    }

    /// Appends a continuation buffer.
    pub fn chain(&mut self, next: NetBuf) {
        match self.next {
            Some(ref mut tail) => tail.chain(next),
            None => self.next = Some(Box::new(next)),
        }
    }

    pub fn is_chained(&self) -> bool {
        self.next.is_some()
    }

    /// Clears the data window and checksum state so the buffer can be reposted.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.len = 0;
        self.flags = NetBufFlags::empty();
        self.csum_start = 0;
        self.csum_offset = 0;
    }
}

impl Default for NetBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NetBuf {
    fn drop(&mut self) {
        unsafe { alloc::dealloc(self.page.as_ptr(), page_layout()) }
    }
}

impl fmt::Debug for NetBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetBuf")
            .field("page", &self.page_addr())
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("flags", &self.flags)
            .field("chained", &self.is_chained())
            .finish()
    }
}
