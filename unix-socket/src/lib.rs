// Public modules and re-exports
pub mod addr;
pub mod config;
pub mod error;
pub mod family;
pub mod listen;
pub mod namespace;
pub mod pipe;
pub mod pollee;
pub mod socket;

pub use addr::{UNIX_PATH_MAX, UnixAddr};
pub use config::{Limits, UnixConfig};
pub use error::{Result, SockError};
pub use family::UnixFamily;
pub use namespace::Namespace;
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use pollee::{Events, ListenerId, Pollee};
pub use socket::{SockState, SockType, UnixSocket};

#[cfg(test)]
mod tests;
