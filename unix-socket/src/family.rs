//
// family.rs - AF_UNIX entry points
//
// Purpose:
//   The syscall-shaped front door: validates domain, type and protocol the way
//   socket(2) and socketpair(2) do and hands back `UnixSocket`s bound to one
//   namespace.
//

use crate::error::{Result, SockError};
use crate::namespace::Namespace;
use crate::socket::{SockType, UnixSocket};
use std::sync::Arc;

pub struct UnixFamily {
    ns: Arc<Namespace>,
}

/// Splits a raw `SOCK_*` value into the type and its `SOCK_NONBLOCK` bit.
fn parse_type(ty: i32) -> Result<(SockType, bool)> {
    let nonblock = ty & libc::SOCK_NONBLOCK != 0;
    let ty = SockType::from_raw(ty & !(libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC))?;
    Ok((ty, nonblock))
}

fn check_domain(domain: i32, protocol: i32) -> Result<()> {
    if domain != libc::AF_UNIX {
        return Err(SockError::AddrFamilyNotSupported);
    }
    if protocol != 0 {
        return Err(SockError::ProtocolNotSupported);
    }
    Ok(())
}

impl UnixFamily {
    pub fn new(ns: Arc<Namespace>) -> Self {
        UnixFamily { ns }
    }

    /// The family over the process-wide namespace.
    pub fn global() -> Self {
        UnixFamily::new(Namespace::global())
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.ns
    }

    pub fn socket(&self, domain: i32, ty: i32, protocol: i32) -> Result<Arc<UnixSocket>> {
        check_domain(domain, protocol)?;
        let (ty, nonblock) = parse_type(ty)?;
        let sock = UnixSocket::new_in(self.ns.clone(), ty);
        sock.set_nonblock(nonblock)?;
        log::debug!("socket: created {:?}", ty);
        Ok(sock)
    }

    pub fn socketpair(
        &self,
        domain: i32,
        ty: i32,
        protocol: i32,
    ) -> Result<(Arc<UnixSocket>, Arc<UnixSocket>)> {
        check_domain(domain, protocol)?;
        let (ty, nonblock) = parse_type(ty)?;
        let (a, b) = UnixSocket::pair_in(self.ns.clone(), ty);
        a.set_nonblock(nonblock)?;
        b.set_nonblock(nonblock)?;
        Ok((a, b))
    }
}
