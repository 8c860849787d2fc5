//! # Receive Queue
//!
//! ## Purpose
//!
//! Keeps the receive ring stocked with empty buffers, hands filled buffers to the
//! caller, and arms the receive interrupt without losing a wakeup.
//!
//! ## How it works
//!
//! A buffer posted at request counter `p` gets id `p & (capacity - 1)`. The id's
//! grant is created once and re-pointed at every later buffer posted under the
//! same id; dequeuing does not revoke it.
//!
//! Interrupt state is two bits shared with the upcall handler:
//! - `INTR_USR_EN`: the caller wants interrupt-driven receive.
//! - `INTR_EN`: the channel is currently unmasked.
//!
//! The handler masks the channel, clears `INTR_EN` and tells the stack; it never
//! touches the ring. The stack then calls `receive_one`, which drains, refills and,
//! if the caller wants interrupts, re-arms. Arming runs the ring's final check
//! first: if a packet slipped in between the drain and the arm, the channel stays
//! masked and the packet is dequeued right away instead.
//!
//! ## Main components
//!
//! - `RxQueue::post_buffer()`, `RxQueue::fill_up()`: stock the ring.
//! - `RxQueue::dequeue_one()`: take one completed buffer.
//! - `RxQueue::receive_one()`: the stack-facing receive entry point.
//! - `RxQueue::intr_enable()`, `RxQueue::intr_disable()`.

use crate::error::{Rejected, RingError};
use crate::grant::{DomId, EventHandler, GrantRef, Hypervisor, Port};
use crate::netbuf::{NetBuf, NetBufFlags};
use crate::netdev::{NetStatus, RxAlloc, RxEventFn};
use crate::netif::{ETH_FRAME_MAXLEN, NETIF_RSP_NULL, RxFlags, RxFrontRing, RxRequest};
use crate::slots::SlotTable;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const INTR_EN: u8 = 1 << 0;
const INTR_USR_EN: u8 = 1 << 1;

pub struct RxQueue {
    queue_id: u16,
    ring: RxFrontRing,
    ring_ref: GrantRef,
    slots: SlotTable,
    port: Option<Port>,
    intr: Arc<AtomicU8>,
    alloc: RxAlloc,
    hv: Arc<dyn Hypervisor>,
}

impl RxQueue {
    pub fn new(
        queue_id: u16,
        hv: Arc<dyn Hypervisor>,
        backend: DomId,
        capacity: usize,
        alloc: RxAlloc,
    ) -> io::Result<Self> {
        let ring = RxFrontRing::with_capacity(capacity)?;
        let ring_ref = hv.grant_access(backend, ring.page_addr(), false)?;
        log::debug!("rxq {queue_id}: ring of {capacity} slots granted as {}", ring_ref.0);
        Ok(RxQueue {
            queue_id,
            ring,
            ring_ref,
            slots: SlotTable::new(capacity, backend, false),
            port: None,
            intr: Arc::new(AtomicU8::new(0)),
            alloc,
            hv,
        })
    }

    /// Builds the upcall for this queue's channel: mask, drop `INTR_EN`, tell the stack.
    pub fn event_handler(&self, on_event: Option<RxEventFn>) -> EventHandler {
        let hv = self.hv.clone();
        let intr = self.intr.clone();
        let queue_id = self.queue_id;
        Arc::new(move |port| {
            hv.mask(port);
            intr.fetch_and(!INTR_EN, Ordering::SeqCst);
            match on_event {
                Some(ref on_event) => on_event(queue_id),
                None => log::debug!("rxq {queue_id}: event with no listener"),
            }
        })
    }

    pub fn set_port(&mut self, port: Port) {
        self.port = Some(port);
    }

    pub fn port(&self) -> Option<Port> {
        self.port
    }

    pub fn ring_ref(&self) -> GrantRef {
        self.ring_ref
    }

    pub fn queue_id(&self) -> u16 {
        self.queue_id
    }

    pub fn ring(&self) -> &RxFrontRing {
        &self.ring
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn intr_armed(&self) -> bool {
        self.intr.load(Ordering::SeqCst) & INTR_EN != 0
    }

    pub fn intr_requested(&self) -> bool {
        self.intr.load(Ordering::SeqCst) & INTR_USR_EN != 0
    }

    fn notify(&self) {
        if let Some(port) = self.port {
            self.hv.notify(port);
        }
    }

    /// Posts one empty buffer to the backend.
    pub fn post_buffer(&mut self, buf: NetBuf) -> Result<(), Rejected> {
        if self.ring.is_full() {
            return Err(Rejected::new(RingError::RingFull, buf));
        }
        if !buf.page_addr().is_aligned() {
            return Err(Rejected::new(RingError::Misaligned, buf));
        }
        let id = (self.ring.req_prod_pvt & (self.ring.capacity() as u32 - 1)) as u16;
        if self.slots.is_busy(id) {
            log::error!("rxq {}: slot {} still in flight", self.queue_id, id);
            return Err(Rejected::new(RingError::SlotInUse, buf));
        }
        let gref = match self.slots.bind_page(id, buf.page_addr(), &*self.hv) {
            Ok(gref) => gref,
            Err(e) => return Err(Rejected::new(RingError::Io(e), buf)),
        };
        if let Err(buf) = self.slots.attach(id, buf) {
            return Err(Rejected::new(RingError::SlotInUse, buf));
        }
        self.ring.put_request(RxRequest {
            id,
            pad: 0,
            gref: gref.0,
        });
        if self.ring.push_requests_and_check_notify() {
            self.notify();
        }
        Ok(())
    }

    /// Takes one filled buffer off the ring.
    ///
    /// A response carrying an error status still returns its buffer, with an
    /// empty data window, so the caller decides what to do with it. Responses
    /// naming an idle id are logged and skipped.
    pub fn dequeue_one(&mut self) -> Option<NetBuf> {
        let (rsp, mut buf) = loop {
            let rsp = self.ring.take_response()?;
            match self.slots.take(rsp.id) {
                Some(buf) => break (rsp, buf),
                None => log::error!("rxq {}: response for idle id {}", self.queue_id, rsp.id),
            }
        };
        buf.reset();
        if rsp.status < 0 || rsp.status == NETIF_RSP_NULL {
            log::warn!("rxq {}: backend reported status {} for id {}", self.queue_id, rsp.status, rsp.id);
            return Some(buf);
        }
        let len = (rsp.status as usize).min(ETH_FRAME_MAXLEN);
        if buf.set_window(rsp.offset as usize, len).is_none() {
            log::warn!(
                "rxq {}: response window {}+{} leaves the page",
                self.queue_id,
                rsp.offset,
                len
            );
            return Some(buf);
        }
        let flags = RxFlags::from_bits_truncate(rsp.flags);
        if flags.contains(RxFlags::CSUM_BLANK) {
            buf.flags |= NetBufFlags::PARTIAL_CSUM;
        }
        if flags.contains(RxFlags::DATA_VALIDATED) {
            buf.flags |= NetBufFlags::DATA_VALIDATED;
        }
        Some(buf)
    }

    /// Asks the allocator for up to `n` buffers and posts them.
    ///
    /// Returns `UNDERRUN` if fewer than `n` were posted. Buffers that could not be
    /// posted are freed here.
    pub fn fill_up(&mut self, n: usize) -> NetStatus {
        if n == 0 {
            return NetStatus::empty();
        }
        let mut bufs = (self.alloc)(n);
        if bufs.len() > n {
            log::warn!("rxq {}: allocator returned {} buffers for {}", self.queue_id, bufs.len(), n);
            bufs.truncate(n);
        }
        let mut status = NetStatus::empty();
        if bufs.len() < n {
            status |= NetStatus::UNDERRUN;
        }
        let mut bufs = bufs.into_iter();
        for buf in bufs.by_ref() {
            if let Err(rejected) = self.post_buffer(buf) {
                log::debug!("rxq {}: failed to post buffer: {}", self.queue_id, rejected.error);
                status |= NetStatus::UNDERRUN;
                break;
            }
        }
        // whatever is left was never posted and is freed with the iterator
        drop(bufs);
        status
    }

    /// Receives at most one packet and keeps the ring topped up.
    pub fn receive_one(&mut self) -> (Option<NetBuf>, NetStatus) {
        let mut status = NetStatus::empty();
        let mut pkt = self.dequeue_one();
        if pkt.is_some() {
            status |= NetStatus::SUCCESS;
        }
        status |= self.fill_up(self.ring.free_requests() as usize);

        if self.intr_requested() {
            let more = self.arm();
            if more && pkt.is_none() {
                // arrived between the drain and the arm
                pkt = self.dequeue_one();
                if pkt.is_some() {
                    status |= NetStatus::SUCCESS;
                }
                status |= self.fill_up(self.ring.free_requests() as usize);
                if self.arm() {
                    status |= NetStatus::MORE;
                }
            } else if more {
                status |= NetStatus::MORE;
            }
        } else if self.ring.has_unconsumed_responses() > 0 {
            status |= NetStatus::MORE;
        }
        (pkt, status)
    }

    /// Unmasks the channel unless responses are pending. Returns `true` if they are.
    fn arm(&mut self) -> bool {
        let more = self.ring.final_check_for_responses();
        if !more {
            self.intr.fetch_or(INTR_EN, Ordering::SeqCst);
            if let Some(port) = self.port {
                self.hv.unmask(port);
            }
        }
        more
    }

    /// Switches to interrupt-driven receive.
    ///
    /// Returns `true` if packets are already waiting; the channel then stays masked
    /// and the next `receive_one` that drains the ring arms it.
    pub fn intr_enable(&mut self) -> bool {
        if self.intr_armed() {
            return false;
        }
        self.intr.fetch_or(INTR_USR_EN, Ordering::SeqCst);
        self.arm()
    }

    pub fn intr_disable(&mut self) {
        self.intr.fetch_and(!(INTR_USR_EN | INTR_EN), Ordering::SeqCst);
        if let Some(port) = self.port {
            self.hv.mask(port);
        }
    }
}

impl Drop for RxQueue {
    fn drop(&mut self) {
        let pending = self.slots.teardown(&*self.hv);
        log::debug!("rxq {}: releasing {} posted buffers", self.queue_id, pending.len());
        if let Err(e) = self.hv.end_access(self.ring_ref) {
            log::error!("rxq {}: failed to end ring grant: {}", self.queue_id, e);
        }
    }
}
