//! # Socket Namespace
//!
//! ## Purpose
//!
//! Maps bind names to sockets so `connect` and `sendto` can find their peer.
//!
//! ## How it works
//!
//! A fixed number of buckets sits behind one `RwLock`. Lookups, the hot path,
//! share the read lock; `bind` and `release` take the write lock. Entries hold
//! `Weak` references only, so a bound socket is never kept alive by its name and
//! a lookup of a destroyed socket fails to upgrade instead of dangling. Weak
//! references leaving the table are dropped after the lock is released.
//!
//! ## Main components
//!
//! - `Namespace`: the table plus the resolved `Limits` its sockets use.
//! - `Namespace::global()`: the process-wide instance.

use crate::config::{Limits, UnixConfig};
use crate::error::{Result, SockError};
use crate::socket::UnixSocket;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock, Weak};

const BUCKETS: usize = 64;

static GLOBAL: OnceLock<Arc<Namespace>> = OnceLock::new();

struct Entry {
    name: Vec<u8>,
    sock: Weak<UnixSocket>,
}

pub struct Namespace {
    buckets: RwLock<Vec<Vec<Entry>>>,
    limits: Limits,
}

// FNV-1a
fn bucket_of(name: &[u8]) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in name {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % BUCKETS as u64) as usize
}

impl Namespace {
    pub fn new(config: Option<&UnixConfig>) -> Arc<Self> {
        Arc::new(Namespace {
            buckets: RwLock::new((0..BUCKETS).map(|_| Vec::new()).collect()),
            limits: Limits::from_config(config),
        })
    }

    /// Sets up the process-wide namespace. Returns false if it already exists,
    /// in which case `config` is ignored.
    pub fn init_global(config: &UnixConfig) -> bool {
        let mut created = false;
        GLOBAL.get_or_init(|| {
            created = true;
            Namespace::new(Some(config))
        });
        created
    }

    /// The process-wide namespace, created with defaults on first use.
    pub fn global() -> Arc<Namespace> {
        GLOBAL.get_or_init(|| Namespace::new(None)).clone()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn bind(&self, name: &[u8], sock: Weak<UnixSocket>) -> Result<()> {
        let stale = {
            let mut buckets = self.buckets.write();
            let chain = &mut buckets[bucket_of(name)];
            match chain.iter_mut().find(|e| e.name == name) {
                Some(entry) if entry.sock.strong_count() > 0 => return Err(SockError::AddrInUse),
                // the owner was dropped without closing
                Some(entry) => Some(std::mem::replace(&mut entry.sock, sock)),
                None => {
                    chain.push(Entry {
                        name: name.to_vec(),
                        sock,
                    });
                    None
                }
            }
        };
        if stale.is_some() {
            log::debug!("namespace: replaced stale entry {:?}", String::from_utf8_lossy(name));
        }
        Ok(())
    }

    pub fn lookup(&self, name: &[u8]) -> Option<Weak<UnixSocket>> {
        let buckets = self.buckets.read();
        buckets[bucket_of(name)]
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.sock.clone())
    }

    /// Removes `name` if `owner` still holds it. A name rebound by someone else
    /// reports `NoEntry`, which close paths expect.
    pub fn release(&self, name: &[u8], owner: &Weak<UnixSocket>) -> Result<()> {
        let entry = {
            let mut buckets = self.buckets.write();
            let chain = &mut buckets[bucket_of(name)];
            let pos = chain
                .iter()
                .position(|e| e.name == name && Weak::ptr_eq(&e.sock, owner))
                .ok_or(SockError::NoEntry)?;
            chain.swap_remove(pos)
        };
        drop(entry);
        Ok(())
    }

    /// Number of names currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.buckets.read().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
