#![cfg(test)]

mod ring;
mod slots;

use crate::grant::{DomId, GrantRef, GrantTable};
use crate::netbuf::PageAddr;
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

/// Grant table that only does bookkeeping.
#[derive(Default)]
pub(crate) struct FakeGrants {
    inner: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    next: u32,
    live: HashMap<u32, (DomId, PageAddr, bool)>,
    created: usize,
    updated: usize,
    ended: usize,
}

impl FakeGrants {
    pub(crate) fn live(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    pub(crate) fn counts(&self) -> (usize, usize, usize) {
        let state = self.inner.lock().unwrap();
        (state.created, state.updated, state.ended)
    }

    pub(crate) fn page(&self, gref: GrantRef) -> Option<PageAddr> {
        self.inner.lock().unwrap().live.get(&gref.0).map(|g| g.1)
    }

    pub(crate) fn readonly(&self, gref: GrantRef) -> Option<bool> {
        self.inner.lock().unwrap().live.get(&gref.0).map(|g| g.2)
    }
}

impl GrantTable for FakeGrants {
    fn grant_access(&self, domid: DomId, page: PageAddr, readonly: bool) -> io::Result<GrantRef> {
        let mut state = self.inner.lock().unwrap();
        state.next += 1;
        let gref = state.next;
        state.live.insert(gref, (domid, page, readonly));
        state.created += 1;
        Ok(GrantRef(gref))
    }

    fn update_grant(
        &self,
        gref: GrantRef,
        domid: DomId,
        page: PageAddr,
        readonly: bool,
    ) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        match state.live.get_mut(&gref.0) {
            Some(entry) => *entry = (domid, page, readonly),
            None => return Err(io::Error::other("unknown grant")),
        }
        state.updated += 1;
        Ok(())
    }

    fn end_access(&self, gref: GrantRef) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.live.remove(&gref.0).is_none() {
            return Err(io::Error::other("unknown grant"));
        }
        state.ended += 1;
        Ok(())
    }
}
