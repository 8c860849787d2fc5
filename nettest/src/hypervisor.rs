//! # Simulated Hypervisor
//!
//! ## Purpose
//!
//! An in-process grant table and event-channel switch, so the netfront driver can
//! run against a backend living in the same address space.
//!
//! ## How it works
//!
//! A grant just records the page address it stands for; the backend half resolves
//! a grant reference back to that address through `page_of`. Event channels keep a
//! masked flag and a pending bit: an event raised while masked is remembered and
//! delivered by the next `unmask`. Handlers are always called with the state lock
//! released, because a handler is free to call `mask` or `unmask` itself.
//!
//! ## Main components
//!
//! - `SimHypervisor`: implements `GrantTable` and `EventChannels`.
//! - `GrantInfo`: what a grant reference currently points at.

use netfront::{DomId, EventChannels, EventHandler, GrantRef, GrantTable, PageAddr, Port};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantInfo {
    pub domid: DomId,
    pub page: PageAddr,
    pub readonly: bool,
}

struct Channel {
    remote: DomId,
    handler: EventHandler,
    masked: bool,
    pending: bool,
    notified: usize,
    delivered: usize,
}

#[derive(Default)]
struct State {
    grants: HashMap<u32, GrantInfo>,
    next_gref: u32,
    channels: HashMap<u32, Channel>,
    next_port: u32,
    granted: usize,
    updated: usize,
    ended: usize,
    closed: Vec<Port>,
}

#[derive(Default)]
pub struct SimHypervisor {
    state: Mutex<State>,
}

impl SimHypervisor {
    pub fn new() -> Self {
        SimHypervisor::default()
    }

    /// Resolves a live grant.
    pub fn grant(&self, gref: GrantRef) -> Option<GrantInfo> {
        self.state.lock().grants.get(&gref.0).copied()
    }

    pub fn page_of(&self, gref: GrantRef) -> Option<PageAddr> {
        self.grant(gref).map(|g| g.page)
    }

    /// Grants currently live.
    pub fn live_grants(&self) -> usize {
        self.state.lock().grants.len()
    }

    /// `grant_access` calls that succeeded.
    pub fn grants_created(&self) -> usize {
        self.state.lock().granted
    }

    pub fn grants_updated(&self) -> usize {
        self.state.lock().updated
    }

    pub fn grants_ended(&self) -> usize {
        self.state.lock().ended
    }

    /// Guest-to-backend notifications sent on `port`.
    pub fn notifications(&self, port: Port) -> usize {
        self.state
            .lock()
            .channels
            .get(&port.0)
            .map_or(0, |ch| ch.notified)
    }

    /// Upcalls delivered to the guest on `port`.
    pub fn deliveries(&self, port: Port) -> usize {
        self.state
            .lock()
            .channels
            .get(&port.0)
            .map_or(0, |ch| ch.delivered)
    }

    pub fn is_masked(&self, port: Port) -> bool {
        self.state
            .lock()
            .channels
            .get(&port.0)
            .is_some_and(|ch| ch.masked)
    }

    pub fn is_pending(&self, port: Port) -> bool {
        self.state
            .lock()
            .channels
            .get(&port.0)
            .is_some_and(|ch| ch.pending)
    }

    pub fn remote_of(&self, port: Port) -> Option<DomId> {
        self.state.lock().channels.get(&port.0).map(|ch| ch.remote)
    }

    pub fn open_channels(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Ports closed so far, in order.
    pub fn closed_ports(&self) -> Vec<Port> {
        self.state.lock().closed.clone()
    }

    /// Backend-to-guest event. Delivered now unless the channel is masked.
    pub fn raise(&self, port: Port) {
        let handler = {
            let mut state = self.state.lock();
            let Some(ch) = state.channels.get_mut(&port.0) else {
                log::warn!("sim: event on closed port {}", port.0);
                return;
            };
            if ch.masked {
                ch.pending = true;
                return;
            }
            ch.delivered += 1;
            ch.handler.clone()
        };
        handler(port);
    }
}

impl GrantTable for SimHypervisor {
    fn grant_access(&self, domid: DomId, page: PageAddr, readonly: bool) -> io::Result<GrantRef> {
        if !page.is_aligned() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("grant of unaligned address {:#x}", page.0),
            ));
        }
        let mut state = self.state.lock();
        state.next_gref += 1;
        let gref = state.next_gref;
        state.grants.insert(gref, GrantInfo { domid, page, readonly });
        state.granted += 1;
        Ok(GrantRef(gref))
    }

    fn update_grant(
        &self,
        gref: GrantRef,
        domid: DomId,
        page: PageAddr,
        readonly: bool,
    ) -> io::Result<()> {
        let mut state = self.state.lock();
        let Some(entry) = state.grants.get_mut(&gref.0) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("update of unknown grant {}", gref.0),
            ));
        };
        *entry = GrantInfo { domid, page, readonly };
        state.updated += 1;
        Ok(())
    }

    fn end_access(&self, gref: GrantRef) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.grants.remove(&gref.0).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("end of unknown grant {}", gref.0),
            ));
        }
        state.ended += 1;
        Ok(())
    }
}

impl EventChannels for SimHypervisor {
    fn alloc_unbound(&self, remote: DomId, handler: EventHandler) -> io::Result<Port> {
        let mut state = self.state.lock();
        state.next_port += 1;
        let port = state.next_port;
        state.channels.insert(
            port,
            Channel {
                remote,
                handler,
                masked: false,
                pending: false,
                notified: 0,
                delivered: 0,
            },
        );
        Ok(Port(port))
    }

    fn bind(&self, port: Port, handler: EventHandler) -> io::Result<()> {
        let mut state = self.state.lock();
        match state.channels.get_mut(&port.0) {
            Some(ch) => {
                ch.handler = handler;
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("bind to closed port {}", port.0),
            )),
        }
    }

    fn mask(&self, port: Port) {
        if let Some(ch) = self.state.lock().channels.get_mut(&port.0) {
            ch.masked = true;
        }
    }

    fn unmask(&self, port: Port) {
        let handler = {
            let mut state = self.state.lock();
            let Some(ch) = state.channels.get_mut(&port.0) else {
                return;
            };
            ch.masked = false;
            if !ch.pending {
                return;
            }
            ch.pending = false;
            ch.delivered += 1;
            ch.handler.clone()
        };
        handler(port);
    }

    fn notify(&self, port: Port) {
        if let Some(ch) = self.state.lock().channels.get_mut(&port.0) {
            ch.notified += 1;
        }
    }

    fn close(&self, port: Port) {
        let mut state = self.state.lock();
        if state.channels.remove(&port.0).is_none() {
            log::error!("sim: close of unknown port {}", port.0);
        }
        state.closed.push(port);
    }
}
