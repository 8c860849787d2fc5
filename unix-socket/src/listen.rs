//
// listen.rs - Pending connection queue of a listening socket
//
// Purpose:
//   Holds connections enqueued by `connect` until `accept` picks them up, in
//   FIFO order and never more than the backlog.
//
// How it works:
//   Producers run under the listening socket's write lock, so pushes are
//   serialized. Acceptors share its read lock and race each other: each one
//   first reserves an entry by decrementing `count` with a CAS loop, then claims
//   a slot index by advancing `read_head` the same way. Only the winner of a
//   slot touches it, so two acceptors never read the same connection.
//

use crate::pipe::{PipeReader, PipeWriter};
use crate::socket::UnixSocket;
use parking_lot::Mutex;
use std::sync::Weak;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A connection waiting for `accept`: the acceptor's ends of the two pipes and
/// the initiating socket.
pub struct PendingConn {
    pub reader: PipeReader,
    pub writer: PipeWriter,
    pub peer: Weak<UnixSocket>,
}

pub struct ListenQueue {
    slots: Box<[Mutex<Option<PendingConn>>]>,
    count: AtomicUsize,
    read_head: AtomicUsize,
    write_head: AtomicUsize,
}

impl ListenQueue {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        ListenQueue {
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            count: AtomicUsize::new(0),
            read_head: AtomicUsize::new(0),
            write_head: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.size()
    }

    /// Enqueues `conn`, handing it back if the backlog is full. Callers must be
    /// serialized against each other.
    pub fn push(&self, conn: PendingConn) -> Result<(), PendingConn> {
        if self.is_full() {
            return Err(conn);
        }
        let head = self.write_head.load(Ordering::Relaxed);
        {
            let mut slot = self.slots[head % self.size()].lock();
            // an acceptor reserved this slot but has not emptied it yet
            if slot.is_some() {
                return Err(conn);
            }
            *slot = Some(conn);
        }
        self.write_head.store(head.wrapping_add(1), Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn reserve(&self) -> bool {
        self.count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Takes the oldest pending connection.
    pub fn accept(&self) -> Option<PendingConn> {
        if !self.reserve() {
            return None;
        }
        let mut head = self.read_head.load(Ordering::Acquire);
        loop {
            match self.read_head.compare_exchange_weak(
                head,
                head.wrapping_add(1),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(current) => head = current,
            }
        }
        let conn = self.slots[head % self.size()].lock().take();
        if conn.is_none() {
            log::error!("listen queue: reserved slot {} is empty", head % self.size());
        }
        conn
    }

    /// Empties the queue, returning whatever was pending.
    pub fn drain(&self) -> Vec<PendingConn> {
        let pending: Vec<PendingConn> = self.slots.iter().filter_map(|s| s.lock().take()).collect();
        self.count.store(0, Ordering::Release);
        pending
    }
}
