// Public modules and re-exports
pub mod device;
pub mod error;
pub mod grant;
pub mod mmap;
pub mod netbuf;
pub mod netdev;
pub mod netif;
pub mod ring;
pub mod rx;
pub mod slots;
pub mod tx;

pub use device::{BackendInfo, ControlPlane, DeviceState, Netfront, QueueRefs};
pub use error::{Rejected, RingError};
pub use grant::{DomId, EventChannels, EventHandler, GrantRef, GrantTable, Hypervisor, Port};
pub use netbuf::{NetBuf, NetBufFlags, PAGE_SIZE, PageAddr};
pub use netdev::{
    DeviceConf, DeviceFeatures, DeviceInfo, NetDevice, NetStatus, QueueInfo, RxAlloc, RxEventFn,
    RxQueueConf, TxQueueConf,
};
pub use ring::{BackRing, FrontRing};
pub use rx::RxQueue;
pub use tx::TxQueue;

#[cfg(test)]
mod tests;
