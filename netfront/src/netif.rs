//! # Network Interface Ring ABI
//!
//! Request/response layouts of the transmit and receive rings, their flag bits and
//! status codes. These are bit-exact with the paravirtual NIC descriptor ABI.

use crate::ring::{FrontRing, Slot, ring_size};
use bitflags::bitflags;
use static_assertions::const_assert_eq;
use std::mem::size_of;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxRequest {
    pub gref: u32,
    pub offset: u16,
    pub flags: u16,
    pub id: u16,
    pub size: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxResponse {
    pub id: u16,
    pub status: i16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxRequest {
    pub id: u16,
    pub pad: u16,
    pub gref: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxResponse {
    pub id: u16,
    pub offset: u16,
    pub flags: u16,
    /// Negative: one of the `NETIF_RSP_*` errors. Positive: received length.
    pub status: i16,
}

const_assert_eq!(size_of::<TxRequest>(), 12);
const_assert_eq!(size_of::<TxResponse>(), 4);
const_assert_eq!(size_of::<RxRequest>(), 8);
const_assert_eq!(size_of::<RxResponse>(), 8);

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TxFlags: u16 {
        const CSUM_BLANK = 1 << 0;
        const DATA_VALIDATED = 1 << 1;
        const MORE_DATA = 1 << 2;
        const EXTRA_INFO = 1 << 3;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RxFlags: u16 {
        const DATA_VALIDATED = 1 << 0;
        const CSUM_BLANK = 1 << 1;
        const MORE_DATA = 1 << 2;
        const EXTRA_INFO = 1 << 3;
    }
}

pub const NETIF_RSP_DROPPED: i16 = -2;
pub const NETIF_RSP_ERROR: i16 = -1;
pub const NETIF_RSP_OKAY: i16 = 0;
/// No response: used only to pad the response list.
pub const NETIF_RSP_NULL: i16 = 1;

pub type TxFrontRing = FrontRing<TxRequest, TxResponse>;
pub type RxFrontRing = FrontRing<RxRequest, RxResponse>;

pub const NET_TX_RING_SIZE: usize = ring_size(size_of::<Slot<TxRequest, TxResponse>>());
pub const NET_RX_RING_SIZE: usize = ring_size(size_of::<Slot<RxRequest, RxResponse>>());

const_assert_eq!(NET_TX_RING_SIZE, 256);
const_assert_eq!(NET_RX_RING_SIZE, 256);

/// Largest Ethernet frame without FCS.
pub const ETH_FRAME_MAXLEN: usize = 1518;
pub const ETH_PAYLOAD_MAXLEN: u16 = 1500;
