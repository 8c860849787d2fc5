//! # Netfront Device
//!
//! ## Purpose
//!
//! Brings a paravirtual NIC from "backend discovered" to "passing traffic": learns
//! the backend's parameters, sets up the queue pairs, wires their event channels
//! and hands the resulting ring references to the backend.
//!
//! ## How it works
//!
//! The device walks `Unprobed -> Probed -> Configured -> Started`. Queues are set
//! up individually while `Configured`; `start` requires every queue of every
//! configured pair and performs the control-plane handshake.
//!
//! Event channels follow what the backend negotiated:
//! - split channels: each queue allocates its own;
//! - shared channel: the first queue of a pair to be set up allocates it and the
//!   second reuses it. A receive queue always installs its own upcall; a transmit
//!   queue never replaces the receive upcall.
//!
//! Every channel starts masked. Transmit channels stay masked for good; receive
//! channels are unmasked only through `rx_intr_enable`.
//!
//! ## Main components
//!
//! - `Netfront`: the device, implementing `NetDevice`.
//! - `ControlPlane`: the handshake layer towards the backend.
//! - `BackendInfo`, `QueueRefs`: what flows over that layer.

use crate::error::{Rejected, RingError};
use crate::grant::{DomId, EventHandler, GrantRef, Hypervisor, Port};
use crate::netbuf::{NetBuf, PAGE_SIZE};
use crate::netdev::{
    DeviceConf, DeviceFeatures, DeviceInfo, NetDevice, NetStatus, QueueInfo, RxQueueConf,
    TxQueueConf,
};
use crate::netif::{ETH_PAYLOAD_MAXLEN, NET_RX_RING_SIZE, NET_TX_RING_SIZE};
use crate::rx::RxQueue;
use crate::tx::TxQueue;
use eui48::MacAddress;
use std::io;
use std::sync::Arc;

/// Backend parameters learned while probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    pub backend_id: DomId,
    pub mac: MacAddress,
    pub mtu: u16,
    pub max_queue_pairs: u16,
    /// The backend accepts separate tx and rx event channels.
    pub split_evtchn: bool,
}

impl Default for BackendInfo {
    fn default() -> Self {
        BackendInfo {
            backend_id: 0,
            mac: MacAddress::nil(),
            mtu: ETH_PAYLOAD_MAXLEN,
            max_queue_pairs: 1,
            split_evtchn: false,
        }
    }
}

/// Ring references and channels of one queue pair, published to the backend on start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRefs {
    pub queue_id: u16,
    pub tx_ring_ref: GrantRef,
    pub rx_ring_ref: GrantRef,
    pub tx_port: Port,
    pub rx_port: Port,
}

/// Handshake with the backend, outside the data path.
pub trait ControlPlane: Send {
    fn probe(&mut self) -> io::Result<BackendInfo>;

    fn connect(&mut self, queues: &[QueueRefs]) -> io::Result<()>;

    fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unprobed,
    Probed,
    Configured,
    Started,
}

struct QueuePair {
    tx: Option<TxQueue>,
    rx: Option<RxQueue>,
    shared_port: Option<Port>,
}

impl QueuePair {
    fn empty() -> Self {
        QueuePair {
            tx: None,
            rx: None,
            shared_port: None,
        }
    }
}

pub struct Netfront {
    hv: Arc<dyn Hypervisor>,
    ctrl: Box<dyn ControlPlane>,
    backend: Option<BackendInfo>,
    state: DeviceState,
    pairs: Vec<QueuePair>,
}

fn invalid_input(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

impl Netfront {
    pub fn new(hv: Arc<dyn Hypervisor>, ctrl: Box<dyn ControlPlane>) -> Self {
        Netfront {
            hv,
            ctrl,
            backend: None,
            state: DeviceState::Unprobed,
            pairs: Vec::new(),
        }
    }

    /// Queries the backend through the control plane.
    pub fn probe(&mut self) -> io::Result<()> {
        if self.state != DeviceState::Unprobed {
            return Err(io::Error::other("device already probed"));
        }
        let info = self.ctrl.probe()?;
        if info.max_queue_pairs == 0 {
            return Err(io::Error::other("backend offers no queue pairs"));
        }
        log::debug!(
            "netfront: backend {} mac {} mtu {} queues {} split evtchn {}",
            info.backend_id,
            info.mac,
            info.mtu,
            info.max_queue_pairs,
            info.split_evtchn
        );
        self.backend = Some(info);
        self.state = DeviceState::Probed;
        Ok(())
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn backend(&self) -> Option<&BackendInfo> {
        self.backend.as_ref()
    }

    /// Number of configured queue pairs.
    pub fn nb_queues(&self) -> u16 {
        self.pairs.len() as u16
    }

    pub fn txq(&self, queue_id: u16) -> Option<&TxQueue> {
        self.pairs.get(queue_id as usize)?.tx.as_ref()
    }

    pub fn rxq(&self, queue_id: u16) -> Option<&RxQueue> {
        self.pairs.get(queue_id as usize)?.rx.as_ref()
    }

    fn backend_info(&self) -> io::Result<BackendInfo> {
        self.backend
            .ok_or_else(|| io::Error::other("device not probed"))
    }

    fn check_queue_setup(&self, queue_id: u16, nb_desc: u16, capacity: usize) -> io::Result<()> {
        if self.state != DeviceState::Configured {
            return Err(io::Error::other(format!(
                "queue setup in state {:?}",
                self.state
            )));
        }
        if queue_id as usize >= self.pairs.len() {
            return Err(invalid_input(format!(
                "queue {queue_id} out of range, {} configured",
                self.pairs.len()
            )));
        }
        if nb_desc != 0 && nb_desc as usize != capacity {
            return Err(invalid_input(format!(
                "queue {queue_id}: {nb_desc} descriptors requested, ring holds {capacity}"
            )));
        }
        Ok(())
    }

    fn queue_info(&self, queue_id: u16, capacity: usize) -> io::Result<QueueInfo> {
        if queue_id as usize >= self.pairs.len() {
            return Err(invalid_input(format!("queue {queue_id} out of range")));
        }
        Ok(QueueInfo {
            nb_min: capacity as u16,
            nb_max: capacity as u16,
            nb_align: PAGE_SIZE,
            nb_is_power_of_two: true,
        })
    }

    /// Finds or allocates the channel for one queue of pair `queue_id`.
    ///
    /// `rebind` tells whether an already shared channel should get `handler`.
    fn channel_for(
        &mut self,
        queue_id: u16,
        handler: EventHandler,
        rebind: bool,
    ) -> io::Result<Port> {
        let backend = self.backend_info()?;
        let pair = &mut self.pairs[queue_id as usize];
        if !backend.split_evtchn {
            if let Some(port) = pair.shared_port {
                if rebind {
                    self.hv.bind(port, handler)?;
                }
                return Ok(port);
            }
        }
        let port = self.hv.alloc_unbound(backend.backend_id, handler)?;
        self.hv.mask(port);
        if !backend.split_evtchn {
            pair.shared_port = Some(port);
        }
        Ok(port)
    }

    fn all_ports(&self) -> Vec<Port> {
        let mut ports = Vec::new();
        for pair in &self.pairs {
            let tx = pair.tx.as_ref().and_then(|q| q.port());
            let rx = pair.rx.as_ref().and_then(|q| q.port());
            for port in [tx, rx, pair.shared_port].into_iter().flatten() {
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
        ports
    }

    fn release_queues(&mut self) {
        let ports = self.all_ports();
        // queues end their grants on drop; channels go after nothing can signal them
        self.pairs.clear();
        for port in ports {
            self.hv.close(port);
        }
    }

    fn started_pair(&mut self, queue_id: u16) -> Result<&mut QueuePair, RingError> {
        if self.state != DeviceState::Started {
            return Err(RingError::NotStarted);
        }
        self.pairs
            .get_mut(queue_id as usize)
            .ok_or(RingError::InvalidIndex)
    }
}

impl NetDevice for Netfront {
    fn info(&self) -> DeviceInfo {
        let backend = self.backend.unwrap_or_default();
        DeviceInfo {
            max_rx_queues: backend.max_queue_pairs,
            max_tx_queues: backend.max_queue_pairs,
            max_mtu: backend.mtu,
            ioalign: PAGE_SIZE,
            features: DeviceFeatures::RXQ_INTR | DeviceFeatures::PARTIAL_CSUM,
        }
    }

    fn hw_addr(&self) -> Option<MacAddress> {
        self.backend.map(|b| b.mac)
    }

    fn promiscuous_mode(&self) -> bool {
        false
    }

    fn mtu(&self) -> u16 {
        self.backend.map_or(ETH_PAYLOAD_MAXLEN, |b| b.mtu)
    }

    fn configure(&mut self, conf: &DeviceConf) -> io::Result<()> {
        match self.state {
            DeviceState::Probed | DeviceState::Configured => {}
            state => {
                return Err(io::Error::other(format!("configure in state {state:?}")));
            }
        }
        if conf.nb_tx_queues != conf.nb_rx_queues {
            return Err(invalid_input(format!(
                "{} tx and {} rx queues requested, counts must match",
                conf.nb_tx_queues, conf.nb_rx_queues
            )));
        }
        if conf.nb_tx_queues == 0 {
            return Err(invalid_input("no queues requested".to_string()));
        }
        let backend = self.backend_info()?;
        let nb = conf.nb_tx_queues.min(backend.max_queue_pairs);
        if nb < conf.nb_tx_queues {
            log::debug!(
                "netfront: {} queue pairs requested, backend offers {}",
                conf.nb_tx_queues,
                nb
            );
        }
        self.release_queues();
        self.pairs.resize_with(nb as usize, QueuePair::empty);
        self.state = DeviceState::Configured;
        Ok(())
    }

    fn txq_info(&self, queue_id: u16) -> io::Result<QueueInfo> {
        self.queue_info(queue_id, NET_TX_RING_SIZE)
    }

    fn rxq_info(&self, queue_id: u16) -> io::Result<QueueInfo> {
        self.queue_info(queue_id, NET_RX_RING_SIZE)
    }

    fn txq_configure(&mut self, queue_id: u16, nb_desc: u16, _conf: &TxQueueConf) -> io::Result<()> {
        self.check_queue_setup(queue_id, nb_desc, NET_TX_RING_SIZE)?;
        if self.pairs[queue_id as usize].tx.is_some() {
            return Err(invalid_input(format!("txq {queue_id} already set up")));
        }
        let backend = self.backend_info()?;
        let mut txq = TxQueue::new(queue_id, self.hv.clone(), backend.backend_id, NET_TX_RING_SIZE)?;
        let handler: EventHandler = Arc::new(move |port| {
            log::debug!("txq {queue_id}: event on port {}", port.0);
        });
        let port = self.channel_for(queue_id, handler, false)?;
        txq.set_port(port);
        self.pairs[queue_id as usize].tx = Some(txq);
        Ok(())
    }

    fn rxq_configure(&mut self, queue_id: u16, nb_desc: u16, conf: RxQueueConf) -> io::Result<()> {
        self.check_queue_setup(queue_id, nb_desc, NET_RX_RING_SIZE)?;
        if self.pairs[queue_id as usize].rx.is_some() {
            return Err(invalid_input(format!("rxq {queue_id} already set up")));
        }
        let backend = self.backend_info()?;
        let RxQueueConf { alloc, on_event } = conf;
        let mut rxq = RxQueue::new(
            queue_id,
            self.hv.clone(),
            backend.backend_id,
            NET_RX_RING_SIZE,
            alloc,
        )?;
        let handler = rxq.event_handler(on_event);
        let port = self.channel_for(queue_id, handler, true)?;
        rxq.set_port(port);
        let status = rxq.fill_up(NET_RX_RING_SIZE);
        if status.contains(NetStatus::UNDERRUN) {
            log::debug!("rxq {queue_id}: ring only partially filled at setup");
        }
        self.pairs[queue_id as usize].rx = Some(rxq);
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        if self.state != DeviceState::Configured {
            return Err(io::Error::other(format!("start in state {:?}", self.state)));
        }
        let mut refs = Vec::with_capacity(self.pairs.len());
        for (qid, pair) in self.pairs.iter().enumerate() {
            let (Some(tx), Some(rx)) = (&pair.tx, &pair.rx) else {
                return Err(io::Error::other(format!("queue pair {qid} not set up")));
            };
            let (Some(tx_port), Some(rx_port)) = (tx.port(), rx.port()) else {
                return Err(io::Error::other(format!("queue pair {qid} has no channel")));
            };
            refs.push(QueueRefs {
                queue_id: qid as u16,
                tx_ring_ref: tx.ring_ref(),
                rx_ring_ref: rx.ring_ref(),
                tx_port,
                rx_port,
            });
        }
        self.ctrl.connect(&refs)?;
        self.state = DeviceState::Started;
        log::debug!("netfront: started with {} queue pairs", refs.len());
        Ok(())
    }

    fn xmit(&mut self, queue_id: u16, pkt: NetBuf) -> Result<NetStatus, Rejected> {
        let pair = match self.started_pair(queue_id) {
            Ok(pair) => pair,
            Err(e) => return Err(Rejected::new(e, pkt)),
        };
        match pair.tx.as_mut() {
            Some(txq) => txq.transmit(pkt),
            None => Err(Rejected::new(RingError::NotStarted, pkt)),
        }
    }

    fn recv(&mut self, queue_id: u16) -> Result<(Option<NetBuf>, NetStatus), RingError> {
        let rxq = self
            .started_pair(queue_id)?
            .rx
            .as_mut()
            .ok_or(RingError::NotStarted)?;
        Ok(rxq.receive_one())
    }

    fn rx_intr_enable(&mut self, queue_id: u16) -> Result<bool, RingError> {
        let rxq = self
            .started_pair(queue_id)?
            .rx
            .as_mut()
            .ok_or(RingError::NotStarted)?;
        Ok(rxq.intr_enable())
    }

    fn rx_intr_disable(&mut self, queue_id: u16) -> Result<(), RingError> {
        let rxq = self
            .started_pair(queue_id)?
            .rx
            .as_mut()
            .ok_or(RingError::NotStarted)?;
        rxq.intr_disable();
        Ok(())
    }
}

impl Drop for Netfront {
    fn drop(&mut self) {
        if self.state == DeviceState::Started {
            self.ctrl.disconnect();
        }
        self.release_queues();
    }
}
