//! # Network Device Model
//!
//! ## Purpose
//!
//! The contract between a network stack and a NIC driver: device and queue
//! configuration, queue information, per-packet transmit/receive, and receive
//! interrupt control. `Netfront` is one implementation of `NetDevice`.
//!
//! ## Main components
//!
//! - `NetDevice`: the driver operations.
//! - `NetStatus`: status bits returned by transmit and receive.
//! - `DeviceInfo`, `QueueInfo`, `DeviceFeatures`: what the driver reports.
//! - `DeviceConf`, `TxQueueConf`, `RxQueueConf`: what the stack asks for.

use crate::error::{Rejected, RingError};
use crate::netbuf::NetBuf;
use bitflags::bitflags;
use eui48::MacAddress;
use std::io;
use std::sync::Arc;

bitflags! {
    /// Outcome bits of a transmit or receive call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NetStatus: u8 {
        /// A packet was sent or received.
        const SUCCESS = 1 << 0;
        /// More work can be done without waiting: room to transmit, or packets to receive.
        const MORE = 1 << 1;
        /// The receive ring could not be fully refilled.
        const UNDERRUN = 1 << 2;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeviceFeatures: u8 {
        /// Receive queues can signal packet arrival through interrupts.
        const RXQ_INTR = 1 << 0;
        /// Packets with a partial checksum may be transmitted.
        const PARTIAL_CSUM = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub max_rx_queues: u16,
    pub max_tx_queues: u16,
    pub max_mtu: u16,
    /// Required alignment of packet buffers.
    pub ioalign: usize,
    pub features: DeviceFeatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueInfo {
    pub nb_min: u16,
    pub nb_max: u16,
    pub nb_align: usize,
    pub nb_is_power_of_two: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceConf {
    pub nb_rx_queues: u16,
    pub nb_tx_queues: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TxQueueConf {}

/// Supplies up to the requested number of fresh receive buffers.
pub type RxAlloc = Box<dyn FnMut(usize) -> Vec<NetBuf> + Send>;

/// Called from interrupt context with the queue id when packets arrive.
pub type RxEventFn = Arc<dyn Fn(u16) + Send + Sync>;

pub struct RxQueueConf {
    pub alloc: RxAlloc,
    /// If `None`, the queue can only be polled.
    pub on_event: Option<RxEventFn>,
}

impl RxQueueConf {
    pub fn new(alloc: RxAlloc) -> Self {
        RxQueueConf {
            alloc,
            on_event: None,
        }
    }

    pub fn with_event(mut self, on_event: RxEventFn) -> Self {
        self.on_event = Some(on_event);
        self
    }
}

pub trait NetDevice {
    fn info(&self) -> DeviceInfo;

    fn hw_addr(&self) -> Option<MacAddress>;

    fn promiscuous_mode(&self) -> bool;

    fn mtu(&self) -> u16;

    fn configure(&mut self, conf: &DeviceConf) -> io::Result<()>;

    fn txq_info(&self, queue_id: u16) -> io::Result<QueueInfo>;

    fn rxq_info(&self, queue_id: u16) -> io::Result<QueueInfo>;

    fn txq_configure(&mut self, queue_id: u16, nb_desc: u16, conf: &TxQueueConf) -> io::Result<()>;

    fn rxq_configure(&mut self, queue_id: u16, nb_desc: u16, conf: RxQueueConf) -> io::Result<()>;

    fn start(&mut self) -> io::Result<()>;

    fn xmit(&mut self, queue_id: u16, pkt: NetBuf) -> Result<NetStatus, Rejected>;

    fn recv(&mut self, queue_id: u16) -> Result<(Option<NetBuf>, NetStatus), RingError>;

    /// Returns `true` if packets were already pending, in which case the
    /// interrupt stays off until the queue has been drained.
    fn rx_intr_enable(&mut self, queue_id: u16) -> Result<bool, RingError>;

    fn rx_intr_disable(&mut self, queue_id: u16) -> Result<(), RingError>;
}
