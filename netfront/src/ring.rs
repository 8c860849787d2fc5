//! # Shared Descriptor Rings
//!
//! ## Purpose
//!
//! A shared ring is one page split into a 64-byte header (producer/consumer
//! indices and their event thresholds) and a power-of-two array of slots. Each
//! slot holds either a request (front-end to backend) or the response that
//! replaces it. The layout is the standard paravirtual I/O ring ABI and must not
//! change.
//!
//! ## How it works
//!
//! Indices are free-running `u32` counters; a slot is addressed by
//! `counter & (capacity - 1)`. Each side keeps a private producer index and
//! publishes it to the header when it wants the other side to see its work.
//! All cross-domain ordering goes through two operations:
//!
//! - `publish`: release fence, then store the index. Slot writes that precede it
//!   are visible to the other side before the new index is.
//! - `observe`: load the index, then acquire fence. Slot reads that follow it see
//!   what the other side wrote before publishing.
//!
//! The "check notify" and "final check" helpers add the full fence the protocol
//! needs between publishing an index and reading the peer's event threshold.
//!
//! ## Main components
//!
//! - `FrontRing`: the guest half; owns the page, produces requests, consumes responses.
//! - `BackRing`: the backend half; attaches to a granted page.
//! - `SharedRingHeader`, `Slot`: the in-page layout.

use crate::mmap::OwnedMmap;
use crate::netbuf::{PAGE_SIZE, PageAddr};
use static_assertions::const_assert_eq;
use std::io;
use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering, fence};

pub const RING_HEADER_SIZE: usize = 64;

#[repr(C)]
pub struct SharedRingHeader {
    pub req_prod: AtomicU32,
    pub req_event: AtomicU32,
    pub rsp_prod: AtomicU32,
    pub rsp_event: AtomicU32,
    pub pvt: [u8; 4],
    pub pad: [u8; 44],
}

const_assert_eq!(size_of::<SharedRingHeader>(), RING_HEADER_SIZE);

#[repr(C)]
pub union Slot<Req: Copy, Rsp: Copy> {
    pub req: Req,
    pub rsp: Rsp,
}

/// Number of slots that fit in one page: the largest power of two not above
/// `(PAGE_SIZE - header) / slot_size`.
pub const fn ring_size(slot_size: usize) -> usize {
    let n = (PAGE_SIZE - RING_HEADER_SIZE) / slot_size;
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

#[inline]
fn publish(index: &AtomicU32, value: u32) {
    fence(Ordering::Release);
    index.store(value, Ordering::Relaxed);
}

#[inline]
fn observe(index: &AtomicU32) -> u32 {
    let value = index.load(Ordering::Relaxed);
    fence(Ordering::Acquire);
    value
}

fn check_capacity<Req: Copy, Rsp: Copy>(capacity: usize) -> io::Result<u32> {
    let max = ring_size(size_of::<Slot<Req, Rsp>>());
    if !capacity.is_power_of_two() || capacity > max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("ring capacity {capacity} must be a power of two not above {max}"),
        ));
    }
    Ok(capacity as u32)
}

pub struct FrontRing<Req: Copy, Rsp: Copy> {
    page: OwnedMmap,
    nr_ents: u32,
    /// Requests written but possibly not yet published.
    pub req_prod_pvt: u32,
    /// Next response to consume.
    pub rsp_cons: u32,
    _marker: PhantomData<(Req, Rsp)>,
}

unsafe impl<Req: Copy + Send, Rsp: Copy + Send> Send for FrontRing<Req, Rsp> {}

impl<Req: Copy, Rsp: Copy> FrontRing<Req, Rsp> {
    /// Slots per page for this request/response pair.
    pub const MAX_CAPACITY: usize = ring_size(size_of::<Slot<Req, Rsp>>());

    /// Allocates and initialises a full-page ring.
    pub fn new() -> io::Result<Self> {
        Self::with_capacity(Self::MAX_CAPACITY)
    }

    /// Allocates and initialises a ring using only the first `capacity` slots.
    ///
    /// Both halves must agree on the capacity; backends that derive it from the
    /// page size expect `MAX_CAPACITY`.
    pub fn with_capacity(capacity: usize) -> io::Result<Self> {
        let nr_ents = check_capacity::<Req, Rsp>(capacity)?;
        let mut page = OwnedMmap::mmap(PAGE_SIZE)?;
        page.zero();
        let ring = FrontRing {
            page,
            nr_ents,
            req_prod_pvt: 0,
            rsp_cons: 0,
            _marker: PhantomData,
        };
        let hdr = ring.header();
        hdr.req_prod.store(0, Ordering::Relaxed);
        hdr.rsp_prod.store(0, Ordering::Relaxed);
        hdr.req_event.store(1, Ordering::Relaxed);
        hdr.rsp_event.store(1, Ordering::Relaxed);
        fence(Ordering::Release);
        Ok(ring)
    }

    fn header(&self) -> &SharedRingHeader {
        unsafe { &*(self.page.as_u8_ptr() as *const SharedRingHeader) }
    }

    fn slot(&self, index: u32) -> *mut Slot<Req, Rsp> {
        let index = (index & (self.nr_ents - 1)) as usize;
        unsafe {
            (self.page.as_u8_ptr().add(RING_HEADER_SIZE) as *mut Slot<Req, Rsp>).add(index)
        }
    }

    /// Address of the ring page, to be granted to the backend.
    pub fn page_addr(&self) -> PageAddr {
        PageAddr(self.page.as_u8_ptr() as usize)
    }

    pub fn capacity(&self) -> usize {
        self.nr_ents as usize
    }

    /// Requests produced and not yet answered.
    pub fn in_flight(&self) -> u32 {
        self.req_prod_pvt.wrapping_sub(self.rsp_cons)
    }

    pub fn free_requests(&self) -> u32 {
        self.nr_ents - self.in_flight()
    }

    pub fn is_full(&self) -> bool {
        self.in_flight() >= self.nr_ents
    }

    /// Writes `req` into the next private request slot.
    pub fn put_request(&mut self, req: Req) {
        debug_assert!(!self.is_full());
        unsafe { ptr::write_volatile(ptr::addr_of_mut!((*self.slot(self.req_prod_pvt)).req), req) };
        self.req_prod_pvt = self.req_prod_pvt.wrapping_add(1);
    }

    /// Publishes the private request producer and reports whether the backend
    /// asked to be notified about any of the newly published requests.
    pub fn push_requests_and_check_notify(&mut self) -> bool {
        let hdr = self.header();
        let old = hdr.req_prod.load(Ordering::Relaxed);
        let new = self.req_prod_pvt;
        publish(&hdr.req_prod, new);
        fence(Ordering::SeqCst);
        let event = hdr.req_event.load(Ordering::Relaxed);
        new.wrapping_sub(event) < new.wrapping_sub(old)
    }

    /// Response producer as last published by the backend.
    pub fn rsp_prod(&self) -> u32 {
        observe(&self.header().rsp_prod)
    }

    pub fn has_unconsumed_responses(&self) -> u32 {
        self.rsp_prod().wrapping_sub(self.rsp_cons)
    }

    /// Reads the response at counter `index`. Only valid below an observed `rsp_prod`.
    pub fn response(&self, index: u32) -> Rsp {
        unsafe { ptr::read_volatile(ptr::addr_of!((*self.slot(index)).rsp)) }
    }

    /// Consumes the next response, if the backend has published one.
    pub fn take_response(&mut self) -> Option<Rsp> {
        if self.rsp_prod() == self.rsp_cons {
            return None;
        }
        let rsp = self.response(self.rsp_cons);
        self.rsp_cons = self.rsp_cons.wrapping_add(1);
        Some(rsp)
    }

    /// Closes the race between "no responses" and the backend producing one: asks
    /// to be notified for the next response, then looks again.
    pub fn final_check_for_responses(&mut self) -> bool {
        if self.has_unconsumed_responses() > 0 {
            return true;
        }
        self.header()
            .rsp_event
            .store(self.rsp_cons.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::SeqCst);
        self.has_unconsumed_responses() > 0
    }
}

/// Backend half of a ring, attached to a page the front-end granted.
pub struct BackRing<Req: Copy, Rsp: Copy> {
    base: NonNull<u8>,
    nr_ents: u32,
    pub rsp_prod_pvt: u32,
    pub req_cons: u32,
    _marker: PhantomData<(Req, Rsp)>,
}

unsafe impl<Req: Copy + Send, Rsp: Copy + Send> Send for BackRing<Req, Rsp> {}

impl<Req: Copy, Rsp: Copy> BackRing<Req, Rsp> {
    /// Attaches to an initialised ring page.
    ///
    /// # Safety
    ///
    /// `page` must point to a live ring page of the same request/response types
    /// and capacity, and must stay mapped for as long as the `BackRing` is used.
    pub unsafe fn attach(page: PageAddr, capacity: usize) -> io::Result<Self> {
        let nr_ents = check_capacity::<Req, Rsp>(capacity)?;
        let base = NonNull::new(page.as_mut_ptr())
            .ok_or_else(|| io::Error::other("null ring page"))?;
        Ok(BackRing {
            base,
            nr_ents,
            rsp_prod_pvt: 0,
            req_cons: 0,
            _marker: PhantomData,
        })
    }

    fn header(&self) -> &SharedRingHeader {
        unsafe { &*(self.base.as_ptr() as *const SharedRingHeader) }
    }

    fn slot(&self, index: u32) -> *mut Slot<Req, Rsp> {
        let index = (index & (self.nr_ents - 1)) as usize;
        unsafe { (self.base.as_ptr().add(RING_HEADER_SIZE) as *mut Slot<Req, Rsp>).add(index) }
    }

    pub fn capacity(&self) -> usize {
        self.nr_ents as usize
    }

    /// Requests published by the front-end and not yet taken.
    pub fn unconsumed_requests(&self) -> u32 {
        let reqs = observe(&self.header().req_prod).wrapping_sub(self.req_cons);
        let room = self.nr_ents - self.req_cons.wrapping_sub(self.rsp_prod_pvt);
        reqs.min(room)
    }

    pub fn take_request(&mut self) -> Option<Req> {
        if self.unconsumed_requests() == 0 {
            return None;
        }
        let req = unsafe { ptr::read_volatile(ptr::addr_of!((*self.slot(self.req_cons)).req)) };
        self.req_cons = self.req_cons.wrapping_add(1);
        Some(req)
    }

    pub fn put_response(&mut self, rsp: Rsp) {
        unsafe { ptr::write_volatile(ptr::addr_of_mut!((*self.slot(self.rsp_prod_pvt)).rsp), rsp) };
        self.rsp_prod_pvt = self.rsp_prod_pvt.wrapping_add(1);
    }

    pub fn push_responses_and_check_notify(&mut self) -> bool {
        let hdr = self.header();
        let old = hdr.rsp_prod.load(Ordering::Relaxed);
        let new = self.rsp_prod_pvt;
        publish(&hdr.rsp_prod, new);
        fence(Ordering::SeqCst);
        let event = hdr.rsp_event.load(Ordering::Relaxed);
        new.wrapping_sub(event) < new.wrapping_sub(old)
    }

    pub fn final_check_for_requests(&mut self) -> bool {
        if self.unconsumed_requests() > 0 {
            return true;
        }
        self.header()
            .req_event
            .store(self.req_cons.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::SeqCst);
        self.unconsumed_requests() > 0
    }

    /// The front-end's response-event threshold, as last written.
    pub fn rsp_event(&self) -> u32 {
        observe(&self.header().rsp_event)
    }
}
