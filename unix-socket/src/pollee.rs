//! # Readiness Events
//!
//! ## Purpose
//!
//! A `Pollee` holds the readiness bits of one object (a pipe end or a socket) and
//! tells interested parties when they change. Nothing in this crate blocks; the
//! async `wait` is the one place a caller may park until readiness shows up.
//!
//! ## How it works
//!
//! Events live in an `AtomicU32` so reading them never takes a lock. Setting or
//! clearing bits computes the changed set; if it is not empty every listener is
//! called with the new state and the changed bits, outside the listener lock, and
//! async waiters are woken through a tokio `Notify`.
//!
//! ## Main components
//!
//! - `Events`: epoll-compatible readiness bits.
//! - `Pollee`: event state, listeners and waiters.
//! - `ListenerId`: handle for removing a listener.

use bitflags::bitflags;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Notify;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Events: u32 {
        const IN = libc::EPOLLIN as u32;
        const OUT = libc::EPOLLOUT as u32;
        const ERR = libc::EPOLLERR as u32;
        const HUP = libc::EPOLLHUP as u32;
        const RDHUP = libc::EPOLLRDHUP as u32;
    }
}

/// Called with the new event state and the bits that changed.
pub type Listener = Arc<dyn Fn(Events, Events) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct Pollee {
    events: AtomicU32,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    notify: Notify,
}

impl Pollee {
    pub fn new(initial: Events) -> Self {
        Pollee {
            events: AtomicU32::new(initial.bits()),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Events {
        Events::from_bits_truncate(self.events.load(Ordering::Acquire))
    }

    /// Current events restricted to `mask`.
    pub fn poll(&self, mask: Events) -> Events {
        self.events() & mask
    }

    pub fn add(&self, events: Events) {
        let old = Events::from_bits_truncate(self.events.fetch_or(events.bits(), Ordering::AcqRel));
        self.changed(old | events, events - old);
    }

    pub fn del(&self, events: Events) {
        let old =
            Events::from_bits_truncate(self.events.fetch_and(!events.bits(), Ordering::AcqRel));
        self.changed(old - events, old & events);
    }

    /// Replaces the bits under `mask` with `events & mask`.
    pub fn update(&self, mask: Events, events: Events) {
        let set = events & mask;
        let mut old = self.events.load(Ordering::Acquire);
        loop {
            let new = (old & !mask.bits()) | set.bits();
            match self
                .events
                .compare_exchange_weak(old, new, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let old = Events::from_bits_truncate(old);
                    let new = Events::from_bits_truncate(new);
                    self.changed(new, old ^ new);
                    return;
                }
                Err(current) => old = current,
            }
        }
    }

    fn changed(&self, now: Events, changed: Events) {
        if changed.is_empty() {
            return;
        }
        let listeners: Vec<Listener> = self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(now, changed);
        }
        self.notify.notify_waiters();
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Waits until any of `mask` is set and returns the matching events.
    pub async fn wait(&self, mask: Events) -> Events {
        loop {
            let notified = self.notify.notified();
            let ready = self.poll(mask);
            if !ready.is_empty() {
                return ready;
            }
            notified.await;
        }
    }
}
