//! # UDP Test Frames
//!
//! Builds and parses Ethernet II / IPv4 / UDP frames so tests push recognisable
//! traffic through the rings instead of opaque byte patterns.

use eui48::MacAddress;
use etherparse::{PacketBuilder, SlicedPacket, TransportSlice};
use std::io;
use std::net::SocketAddrV4;

/// Ethernet + IPv4 + UDP header bytes.
pub const UDP_HEADER_LEN: usize = 42;

/// Builds a complete UDP frame carrying `payload`.
pub fn udp_frame(
    src_mac: MacAddress,
    src: SocketAddrV4,
    dst_mac: MacAddress,
    dst: SocketAddrV4,
    payload: &[u8],
) -> io::Result<Vec<u8>> {
    let builder = PacketBuilder::ethernet2(src_mac.to_array(), dst_mac.to_array())
        .ipv4(src.ip().octets(), dst.ip().octets(), 64)
        .udp(src.port(), dst.port());
    let mut frame = Vec::with_capacity(builder.size(payload.len()));
    builder
        .write(&mut frame, payload)
        .map_err(|e| io::Error::other(format!("Error writing udp frame: {e}")))?;
    Ok(frame)
}

/// Returns the destination port and payload of a UDP frame, or `None` for anything else.
pub fn udp_payload(frame: &[u8]) -> Option<(u16, Vec<u8>)> {
    let packet = SlicedPacket::from_ethernet(frame).ok()?;
    match packet.transport {
        Some(TransportSlice::Udp(udp)) => Some((udp.destination_port(), udp.payload().to_vec())),
        _ => None,
    }
}
