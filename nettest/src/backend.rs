//! # Simulated Backend
//!
//! ## Purpose
//!
//! The other end of the netfront rings: a control plane that answers probe and
//! connect, and per-queue back halves that consume requests and produce responses
//! through the simulated grant table.
//!
//! ## How it works
//!
//! `SimBackend` is handed to the device as its `ControlPlane`; the paired
//! `BackendLink` stays with the test and sees the queue references the device
//! published. From those, `TxBackend`/`RxBackend` attach to the granted ring pages.
//! Responses are pushed one batch at a time and the guest is signalled only when
//! the ring's notify check asks for it, like a real backend.
//!
//! A back half reads and writes guest pages directly. It must not outlive the
//! queue whose ring it attached to.
//!
//! ## Main components
//!
//! - `SimBackend`, `BackendLink`: control plane and its test-side view.
//! - `TxBackend`: drains transmit requests and completes them.
//! - `RxBackend`: fills posted receive buffers with frames.

use crate::hypervisor::SimHypervisor;
use netfront::netif::{
    NET_RX_RING_SIZE, NET_TX_RING_SIZE, NETIF_RSP_OKAY, RxFlags, RxRequest, RxResponse,
    TxRequest, TxResponse,
};
use netfront::{BackRing, BackendInfo, ControlPlane, GrantRef, PAGE_SIZE, Port, QueueRefs};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

#[derive(Default)]
struct LinkState {
    queues: Vec<QueueRefs>,
    connected: bool,
    connects: usize,
    disconnects: usize,
    refuse_connect: bool,
}

pub struct SimBackend {
    info: BackendInfo,
    link: Arc<Mutex<LinkState>>,
}

/// Test-side view of what the device told its backend.
#[derive(Clone)]
pub struct BackendLink {
    link: Arc<Mutex<LinkState>>,
}

impl SimBackend {
    pub fn new(info: BackendInfo) -> (Self, BackendLink) {
        let link = Arc::new(Mutex::new(LinkState::default()));
        (
            SimBackend {
                info,
                link: link.clone(),
            },
            BackendLink { link },
        )
    }
}

impl ControlPlane for SimBackend {
    fn probe(&mut self) -> io::Result<BackendInfo> {
        Ok(self.info)
    }

    fn connect(&mut self, queues: &[QueueRefs]) -> io::Result<()> {
        let mut link = self.link.lock();
        if link.refuse_connect {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "backend refused the connection",
            ));
        }
        link.queues = queues.to_vec();
        link.connected = true;
        link.connects += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut link = self.link.lock();
        link.connected = false;
        link.disconnects += 1;
    }
}

impl BackendLink {
    pub fn is_connected(&self) -> bool {
        self.link.lock().connected
    }

    pub fn queues(&self) -> Vec<QueueRefs> {
        self.link.lock().queues.clone()
    }

    pub fn connects(&self) -> usize {
        self.link.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.link.lock().disconnects
    }

    pub fn refuse_connect(&self, refuse: bool) {
        self.link.lock().refuse_connect = refuse;
    }

    /// Attaches to both rings of a connected queue pair.
    pub fn attach(
        &self,
        hv: &Arc<SimHypervisor>,
        queue_id: u16,
    ) -> io::Result<(TxBackend, RxBackend)> {
        let refs = self
            .queues()
            .into_iter()
            .find(|q| q.queue_id == queue_id)
            .ok_or_else(|| io::Error::other(format!("queue {queue_id} not connected")))?;
        let tx = TxBackend::attach(hv, refs.tx_ring_ref, NET_TX_RING_SIZE, Some(refs.tx_port))?;
        let rx = RxBackend::attach(hv, refs.rx_ring_ref, NET_RX_RING_SIZE, Some(refs.rx_port))?;
        Ok((tx, rx))
    }
}

fn ring_page(hv: &SimHypervisor, ring_ref: GrantRef) -> io::Result<netfront::PageAddr> {
    hv.page_of(ring_ref)
        .ok_or_else(|| io::Error::other(format!("ring grant {} is not live", ring_ref.0)))
}

pub struct TxBackend {
    ring: BackRing<TxRequest, TxResponse>,
    hv: Arc<SimHypervisor>,
    port: Option<Port>,
}

impl TxBackend {
    /// Attaches to the transmit ring granted as `ring_ref`.
    pub fn attach(
        hv: &Arc<SimHypervisor>,
        ring_ref: GrantRef,
        capacity: usize,
        port: Option<Port>,
    ) -> io::Result<Self> {
        let page = ring_page(hv, ring_ref)?;
        // the grant keeps the page alive for as long as the queue exists
        let ring = unsafe { BackRing::attach(page, capacity)? };
        Ok(TxBackend {
            ring,
            hv: hv.clone(),
            port,
        })
    }

    pub fn pending(&self) -> u32 {
        self.ring.unconsumed_requests()
    }

    pub fn take_requests(&mut self) -> Vec<TxRequest> {
        let mut reqs = Vec::new();
        while let Some(req) = self.ring.take_request() {
            reqs.push(req);
        }
        reqs
    }

    /// Copies the frame a request describes out of the granted page.
    pub fn read_frame(&self, req: &TxRequest) -> io::Result<Vec<u8>> {
        let grant = self
            .hv
            .grant(GrantRef(req.gref))
            .ok_or_else(|| io::Error::other(format!("tx grant {} is not live", req.gref)))?;
        let (offset, size) = (req.offset as usize, req.size as usize);
        if offset + size > PAGE_SIZE {
            return Err(io::Error::other(format!("tx request {} leaves the page", req.id)));
        }
        let data = unsafe { std::slice::from_raw_parts(grant.page.as_mut_ptr().add(offset), size) };
        Ok(data.to_vec())
    }

    /// Publishes responses for `ids` and signals the guest if it asked for it.
    pub fn respond(&mut self, ids: &[u16], status: i16) -> bool {
        for &id in ids {
            self.ring.put_response(TxResponse { id, status });
        }
        let notify = self.ring.push_responses_and_check_notify();
        if notify {
            if let Some(port) = self.port {
                self.hv.raise(port);
            }
        }
        notify
    }

    /// Takes every pending request, completes it with `NETIF_RSP_OKAY` and returns the frames.
    pub fn complete_all(&mut self) -> io::Result<Vec<Vec<u8>>> {
        let reqs = self.take_requests();
        let mut frames = Vec::with_capacity(reqs.len());
        for req in &reqs {
            frames.push(self.read_frame(req)?);
        }
        let ids: Vec<u16> = reqs.iter().map(|r| r.id).collect();
        if !ids.is_empty() {
            self.respond(&ids, NETIF_RSP_OKAY);
        }
        Ok(frames)
    }

    /// Re-arms the request event if nothing is pending. Returns `true` if requests arrived.
    pub fn final_check(&mut self) -> bool {
        self.ring.final_check_for_requests()
    }

    pub fn rsp_event(&self) -> u32 {
        self.ring.rsp_event()
    }
}

pub struct RxBackend {
    ring: BackRing<RxRequest, RxResponse>,
    hv: Arc<SimHypervisor>,
    port: Option<Port>,
}

impl RxBackend {
    /// Attaches to the receive ring granted as `ring_ref`.
    pub fn attach(
        hv: &Arc<SimHypervisor>,
        ring_ref: GrantRef,
        capacity: usize,
        port: Option<Port>,
    ) -> io::Result<Self> {
        let page = ring_page(hv, ring_ref)?;
        let ring = unsafe { BackRing::attach(page, capacity)? };
        Ok(RxBackend {
            ring,
            hv: hv.clone(),
            port,
        })
    }

    /// Buffers posted by the guest and not yet filled.
    pub fn posted(&self) -> u32 {
        self.ring.unconsumed_requests()
    }

    /// Copies `frame` into the next posted buffer at offset 0.
    ///
    /// Returns `Ok(false)` if the guest has no buffer posted.
    pub fn deliver(&mut self, frame: &[u8]) -> io::Result<bool> {
        self.deliver_with(frame, 0, RxFlags::empty())
    }

    pub fn deliver_with(&mut self, frame: &[u8], offset: u16, flags: RxFlags) -> io::Result<bool> {
        let Some(req) = self.ring.take_request() else {
            return Ok(false);
        };
        let grant = self
            .hv
            .grant(GrantRef(req.gref))
            .ok_or_else(|| io::Error::other(format!("rx grant {} is not live", req.gref)))?;
        if grant.readonly {
            return Err(io::Error::other(format!("rx grant {} is read-only", req.gref)));
        }
        if offset as usize + frame.len() > PAGE_SIZE {
            return Err(io::Error::other("frame does not fit the page"));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(
                frame.as_ptr(),
                grant.page.as_mut_ptr().add(offset as usize),
                frame.len(),
            );
        }
        self.push(RxResponse {
            id: req.id,
            offset,
            flags: flags.bits(),
            status: frame.len() as i16,
        });
        Ok(true)
    }

    /// Answers the next posted buffer with a bare status and no data.
    pub fn deliver_status(&mut self, status: i16) -> io::Result<bool> {
        let Some(req) = self.ring.take_request() else {
            return Ok(false);
        };
        self.push(RxResponse {
            id: req.id,
            offset: 0,
            flags: 0,
            status,
        });
        Ok(true)
    }

    /// Consumes the next posted buffer but answers it as `id`, the way a
    /// confused backend would.
    pub fn deliver_misdirected(&mut self, id: u16) -> bool {
        if self.ring.take_request().is_none() {
            return false;
        }
        self.push(RxResponse {
            id,
            offset: 0,
            flags: 0,
            status: 1,
        });
        true
    }

    fn push(&mut self, rsp: RxResponse) {
        self.ring.put_response(rsp);
        if self.ring.push_responses_and_check_notify() {
            if let Some(port) = self.port {
                self.hv.raise(port);
            }
        }
    }
}
