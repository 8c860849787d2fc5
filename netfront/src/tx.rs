//! # Transmit Queue
//!
//! ## Purpose
//!
//! Turns one outbound packet into one transmit request, notifies the backend when
//! it asks for it, and reclaims the buffers of requests the backend has answered.
//!
//! ## How it works
//!
//! `transmit` first makes room (reclaiming completions if the ring looks full),
//! then takes an id from the free stack, points that id's grant at the packet
//! page, writes the request and publishes it. Before returning it drains every
//! completion that is already available, re-checking after each pass so a
//! completion that lands while draining is not left behind.
//!
//! The queue is driven through `&mut self`; nothing else touches the ring, so no
//! interrupt handler can re-enter it mid-update. The transmit channel stays
//! masked: completions are picked up by the next `transmit`.
//!
//! ## Main components
//!
//! - `TxQueue::transmit()`: enqueue one packet.
//! - `TxQueue::reclaim_completed()`: one pass over new responses.

use crate::error::{Rejected, RingError};
use crate::grant::{DomId, GrantRef, Hypervisor, Port};
use crate::netbuf::{NetBuf, NetBufFlags, PAGE_SIZE};
use crate::netdev::NetStatus;
use crate::netif::{NETIF_RSP_DROPPED, NETIF_RSP_ERROR, NETIF_RSP_NULL, TxFlags, TxFrontRing, TxRequest};
use crate::slots::{FreeIds, SlotTable};
use std::io;
use std::sync::Arc;

pub struct TxQueue {
    queue_id: u16,
    ring: TxFrontRing,
    ring_ref: GrantRef,
    slots: SlotTable,
    free_ids: FreeIds,
    port: Option<Port>,
    hv: Arc<dyn Hypervisor>,
}

impl TxQueue {
    /// Allocates the ring page and grants it to `backend`. The queue has no event
    /// channel until `set_port` is called.
    pub fn new(
        queue_id: u16,
        hv: Arc<dyn Hypervisor>,
        backend: DomId,
        capacity: usize,
    ) -> io::Result<Self> {
        let ring = TxFrontRing::with_capacity(capacity)?;
        let ring_ref = hv.grant_access(backend, ring.page_addr(), false)?;
        log::debug!("txq {queue_id}: ring of {capacity} slots granted as {}", ring_ref.0);
        Ok(TxQueue {
            queue_id,
            ring,
            ring_ref,
            slots: SlotTable::new(capacity, backend, true),
            free_ids: FreeIds::new(capacity),
            port: None,
            hv,
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

    pub fn ring(&self) -> &TxFrontRing {
        &self.ring
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    fn check_shape(pkt: &NetBuf) -> Result<(), RingError> {
        if pkt.is_chained() {
            return Err(RingError::Chained);
        }
        if !pkt.page_addr().is_aligned() {
            return Err(RingError::Misaligned);
        }
        if pkt.offset() + pkt.len() > PAGE_SIZE || pkt.len() > u16::MAX as usize {
            return Err(RingError::InvalidLength);
        }
        Ok(())
    }

    /// Enqueues `pkt` for transmission.
    ///
    /// On success the status always carries `SUCCESS`, plus `MORE` if the ring
    /// still has room. A full ring hands the packet back with `RingError::RingFull`
    /// and leaves the queue untouched.
    pub fn transmit(&mut self, pkt: NetBuf) -> Result<NetStatus, Rejected> {
        if let Err(e) = Self::check_shape(&pkt) {
            return Err(Rejected::new(e, pkt));
        }

        if self.ring.is_full() {
            self.reclaim_completed();
            if self.ring.is_full() {
                log::debug!("txq {}: ring full", self.queue_id);
                return Err(Rejected::new(RingError::RingFull, pkt));
            }
        }

        let Some(id) = self.free_ids.allocate() else {
            // ids and ring slots are provisioned one to one
            log::error!("txq {}: ring has room but no free id", self.queue_id);
            return Err(Rejected::new(RingError::RingFull, pkt));
        };

        let gref = match self.slots.bind_page(id, pkt.page_addr(), &*self.hv) {
            Ok(gref) => gref,
            Err(e) => {
                self.free_ids.release(id);
                return Err(Rejected::new(RingError::Io(e), pkt));
            }
        };

        let mut flags = TxFlags::empty();
        if pkt.flags.contains(NetBufFlags::PARTIAL_CSUM) {
            flags |= TxFlags::CSUM_BLANK;
        }
        if pkt.flags.contains(NetBufFlags::DATA_VALIDATED) {
            flags |= TxFlags::DATA_VALIDATED;
        }
        let req = TxRequest {
            gref: gref.0,
            offset: pkt.offset() as u16,
            flags: flags.bits(),
            id,
            size: pkt.len() as u16,
        };

        if let Err(pkt) = self.slots.attach(id, pkt) {
            self.free_ids.release(id);
            return Err(Rejected::new(RingError::SlotInUse, pkt));
        }

        self.ring.put_request(req);
        if self.ring.push_requests_and_check_notify() {
            if let Some(port) = self.port {
                self.hv.notify(port);
            }
        }

        loop {
            self.reclaim_completed();
            if !self.ring.final_check_for_responses() {
                break;
            }
        }

        let mut status = NetStatus::SUCCESS;
        if !self.ring.is_full() {
            status |= NetStatus::MORE;
        }
        Ok(status)
    }

    /// Releases the buffers of every response published since the last pass and
    /// returns their ids to the free stack. Returns the number reclaimed.
    pub fn reclaim_completed(&mut self) -> usize {
        let prod = self.ring.rsp_prod();
        let mut count = 0;
        let mut cons = self.ring.rsp_cons;
        while cons != prod {
            let rsp = self.ring.response(cons);
            cons = cons.wrapping_add(1);
            if rsp.status == NETIF_RSP_NULL {
                continue;
            }
            if rsp.status == NETIF_RSP_ERROR || rsp.status == NETIF_RSP_DROPPED {
                log::warn!("txq {}: backend reported status {} for id {}", self.queue_id, rsp.status, rsp.id);
            }
            if rsp.id as usize >= self.slots.capacity() {
                log::error!("txq {}: response id {} out of range", self.queue_id, rsp.id);
                continue;
            }
            match self.slots.take(rsp.id) {
                Some(buf) => {
                    drop(buf);
                    self.free_ids.release(rsp.id);
                    count += 1;
                }
                None => log::error!("txq {}: response for idle id {}", self.queue_id, rsp.id),
            }
        }
        self.ring.rsp_cons = prod;
        count
    }
}

impl Drop for TxQueue {
    fn drop(&mut self) {
        let pending = self.slots.teardown(&*self.hv);
        if !pending.is_empty() {
            log::debug!("txq {}: dropping {} in-flight packets", self.queue_id, pending.len());
        }
        if let Err(e) = self.hv.end_access(self.ring_ref) {
            log::error!("txq {}: failed to end ring grant: {}", self.queue_id, e);
        }
    }
}
