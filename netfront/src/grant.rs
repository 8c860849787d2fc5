//! # Hypervisor Capabilities
//!
//! ## Purpose
//!
//! The front-end never talks to the hypervisor directly. It consumes two small
//! capability interfaces: a grant table for sharing pages with the backend domain,
//! and event channels for cross-domain notifications. Implementations live outside
//! this crate (a real hypervisor binding, or the `nettest` simulator).
//!
//! ## Main components
//!
//! - `GrantTable`: grant, re-point and revoke access to a page.
//! - `EventChannels`: allocate/bind channels, mask/unmask delivery, notify the peer.
//! - `Hypervisor`: both of the above, as held by the device and its queues.

use crate::netbuf::PageAddr;
use std::io;
use std::sync::Arc;

/// Domain identifier of the backend.
pub type DomId = u16;

/// Grant reference handed to the backend in descriptors.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GrantRef(pub u32);

/// Event channel port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Port(pub u32);

/// Upcall invoked when the remote end signals a channel.
pub type EventHandler = Arc<dyn Fn(Port) + Send + Sync>;

pub trait GrantTable: Send + Sync {
    /// Shares `page` with `domid`.
    fn grant_access(&self, domid: DomId, page: PageAddr, readonly: bool) -> io::Result<GrantRef>;

    /// Re-points an existing grant at another page.
    fn update_grant(
        &self,
        gref: GrantRef,
        domid: DomId,
        page: PageAddr,
        readonly: bool,
    ) -> io::Result<()>;

    /// Revokes the grant.
    fn end_access(&self, gref: GrantRef) -> io::Result<()>;
}

pub trait EventChannels: Send + Sync {
    /// Allocates a channel the remote domain can bind to; `handler` receives upcalls.
    fn alloc_unbound(&self, remote: DomId, handler: EventHandler) -> io::Result<Port>;

    /// Replaces the upcall handler of an existing channel.
    fn bind(&self, port: Port, handler: EventHandler) -> io::Result<()>;

    fn mask(&self, port: Port);

    /// Re-enables delivery; an event that arrived while masked is delivered now.
    fn unmask(&self, port: Port);

    /// Signals the remote end.
    fn notify(&self, port: Port);

    /// Releases the channel.
    fn close(&self, port: Port);
}

pub trait Hypervisor: GrantTable + EventChannels {}

impl<T: GrantTable + EventChannels> Hypervisor for T {}
