//! # Data-Path Errors
//!
//! `RingError` is what the queue operations report. Backpressure (`RingFull`)
//! is an ordinary value here, not a failure worth logging. An empty ring is
//! not an error at all: dequeue paths return `Option`. Operations that take ownership of a buffer hand it back inside
//! `Rejected` so a refused packet never leaks.

use crate::netbuf::NetBuf;
use std::{fmt, io};

#[derive(Debug)]
pub enum RingError {
    /// No free request slot; reclaim or try later.
    RingFull,
    /// Queue index or descriptor id out of range.
    InvalidIndex,
    /// Packet does not fit into a single page.
    InvalidLength,
    /// Buffer does not start on a page boundary.
    Misaligned,
    /// Buffer carries a continuation; chains are not supported.
    Chained,
    /// Descriptor id already holds an in-flight buffer.
    SlotInUse,
    /// Device has not been started or the queue is not set up.
    NotStarted,
    Io(io::Error),
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::RingFull => write!(f, "ring is full"),
            RingError::InvalidIndex => write!(f, "invalid queue or descriptor index"),
            RingError::InvalidLength => write!(f, "packet does not fit into one page"),
            RingError::Misaligned => write!(f, "buffer is not page aligned"),
            RingError::Chained => write!(f, "chained buffers are not supported"),
            RingError::SlotInUse => write!(f, "descriptor slot is still in flight"),
            RingError::NotStarted => write!(f, "device or queue is not ready"),
            RingError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for RingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RingError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RingError {
    fn from(e: io::Error) -> Self {
        RingError::Io(e)
    }
}

/// A buffer the queue refused, returned to the caller together with the reason.
pub struct Rejected {
    pub error: RingError,
    pub packet: NetBuf,
}

impl Rejected {
    pub fn new(error: RingError, packet: NetBuf) -> Self {
        Rejected { error, packet }
    }

    /// True when the refusal is plain backpressure and the packet may be retried.
    pub fn is_busy(&self) -> bool {
        matches!(self.error, RingError::RingFull)
    }

    pub fn into_packet(self) -> NetBuf {
        self.packet
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("packet_len", &self.packet.len())
            .finish()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "packet rejected: {}", self.error)
    }
}

impl std::error::Error for Rejected {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
