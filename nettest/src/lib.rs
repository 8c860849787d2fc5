//! Test support for the netfront driver: a simulated hypervisor, a simulated
//! backend and frame builders.

pub mod backend;
pub mod hypervisor;
pub mod packet;

pub use backend::{BackendLink, RxBackend, SimBackend, TxBackend};
pub use hypervisor::{GrantInfo, SimHypervisor};
pub use packet::{UDP_HEADER_LEN, udp_frame, udp_payload};

use netfront::NetBuf;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Installs `env_logger` for tests; later calls are no-ops.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Receive-buffer allocator with a budget, counting what it hands out.
#[derive(Clone, Default)]
pub struct BufferBudget {
    remaining: Arc<AtomicUsize>,
    handed_out: Arc<AtomicUsize>,
}

impl BufferBudget {
    pub fn new(budget: usize) -> Self {
        BufferBudget {
            remaining: Arc::new(AtomicUsize::new(budget)),
            handed_out: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn refill(&self, budget: usize) {
        self.remaining.store(budget, Ordering::SeqCst);
    }

    pub fn handed_out(&self) -> usize {
        self.handed_out.load(Ordering::SeqCst)
    }

    /// Allocation callback for `RxQueueConf`: up to `n` buffers, within budget.
    pub fn allocator(&self) -> netfront::RxAlloc {
        let budget = self.clone();
        Box::new(move |n| {
            let mut granted = 0;
            let _ = budget
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    granted = left.min(n);
                    Some(left - granted)
                });
            budget.handed_out.fetch_add(granted, Ordering::SeqCst);
            (0..granted).map(|_| NetBuf::new()).collect()
        })
    }
}

/// Frames queued for a backend that delivers them on demand.
#[derive(Default)]
pub struct FrameQueue {
    frames: VecDeque<Vec<u8>>,
}

impl FrameQueue {
    pub fn push(&mut self, frame: Vec<u8>) {
        self.frames.push_back(frame);
    }

    /// Delivers queued frames while the guest has buffers posted. Returns how many went out.
    pub fn flush(&mut self, rx: &mut RxBackend) -> std::io::Result<usize> {
        let mut sent = 0;
        while let Some(frame) = self.frames.front() {
            if !rx.deliver(frame)? {
                break;
            }
            self.frames.pop_front();
            sent += 1;
        }
        Ok(sent)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
