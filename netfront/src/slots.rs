//! # Descriptor Slots and Grant Reuse
//!
//! ## Purpose
//!
//! Each queue correlates requests and responses through a small integer id. The
//! id indexes a slot that remembers the buffer in flight and the grant that shares
//! its page with the backend.
//!
//! ## How it works
//!
//! A slot's grant is created the first time the id carries a buffer and is then
//! re-pointed at each following buffer instead of being revoked and recreated.
//! Grants are revoked only by `SlotTable::teardown`, when the queue goes away.
//!
//! Transmit ids come from `FreeIds`, a LIFO stack: the most recently completed
//! id is handed out first, which keeps reuse on the same few grants. Receive ids
//! are derived from the ring index and do not use the stack.
//!
//! ## Main components
//!
//! - `SlotTable`: id to {grant, in-flight buffer}.
//! - `FreeIds`: stack of ids with no buffer attached.

use crate::grant::{DomId, GrantRef, GrantTable};
use crate::netbuf::{NetBuf, PageAddr};
use std::io;

#[derive(Default)]
struct Slot {
    gref: Option<GrantRef>,
    buf: Option<NetBuf>,
}

pub struct SlotTable {
    slots: Vec<Slot>,
    domid: DomId,
    readonly: bool,
    grants_created: usize,
}

impl SlotTable {
    /// `readonly` is the access the backend gets to buffer pages.
    pub fn new(capacity: usize, domid: DomId, readonly: bool) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Slot::default);
        SlotTable {
            slots,
            domid,
            readonly,
            grants_created: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Points the grant of slot `id` at `page`, creating it on first use.
    pub fn bind_page<G: GrantTable + ?Sized>(
        &mut self,
        id: u16,
        page: PageAddr,
        gnttab: &G,
    ) -> io::Result<GrantRef> {
        debug_assert!(page.is_aligned());
        let domid = self.domid;
        let readonly = self.readonly;
        let slot = &mut self.slots[id as usize];
        match slot.gref {
            Some(gref) => {
                gnttab.update_grant(gref, domid, page, readonly)?;
                Ok(gref)
            }
            None => {
                let gref = gnttab.grant_access(domid, page, readonly)?;
                slot.gref = Some(gref);
                self.grants_created += 1;
                Ok(gref)
            }
        }
    }

    /// Records `buf` as in flight on slot `id`. Gives the buffer back if the slot is busy.
    pub fn attach(&mut self, id: u16, buf: NetBuf) -> Result<(), NetBuf> {
        let slot = &mut self.slots[id as usize];
        if slot.buf.is_some() {
            return Err(buf);
        }
        slot.buf = Some(buf);
        Ok(())
    }

    /// Detaches the in-flight buffer of slot `id`; its grant is kept for reuse.
    pub fn take(&mut self, id: u16) -> Option<NetBuf> {
        self.slots.get_mut(id as usize)?.buf.take()
    }

    pub fn is_busy(&self, id: u16) -> bool {
        self.slots
            .get(id as usize)
            .is_some_and(|slot| slot.buf.is_some())
    }

    pub fn grant_of(&self, id: u16) -> Option<GrantRef> {
        self.slots.get(id as usize)?.gref
    }

    /// Number of grants this table has ever created.
    pub fn grants_created(&self) -> usize {
        self.grants_created
    }

    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|slot| slot.buf.is_some()).count()
    }

    /// Revokes every grant and returns the buffers still in flight.
    pub fn teardown<G: GrantTable + ?Sized>(&mut self, gnttab: &G) -> Vec<NetBuf> {
        let mut bufs = Vec::new();
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if let Some(gref) = slot.gref.take() {
                if let Err(e) = gnttab.end_access(gref) {
                    log::error!("failed to end grant {} of slot {}: {}", gref.0, id, e);
                }
            }
            bufs.extend(slot.buf.take());
        }
        bufs
    }
}

pub struct FreeIds {
    stack: Vec<u16>,
    capacity: usize,
}

impl FreeIds {
    /// All ids `0..capacity` start free; `allocate` hands out `0` first.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity <= u16::MAX as usize + 1);
        FreeIds {
            stack: (0..capacity).rev().map(|id| id as u16).collect(),
            capacity,
        }
    }

    pub fn allocate(&mut self) -> Option<u16> {
        self.stack.pop()
    }

    pub fn release(&mut self, id: u16) {
        debug_assert!((id as usize) < self.capacity);
        debug_assert!(!self.stack.contains(&id), "id {id} released twice");
        self.stack.push(id);
    }

    pub fn available(&self) -> usize {
        self.stack.len()
    }
}
