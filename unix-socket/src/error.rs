//
// error.rs - Socket error codes
//
// Purpose:
//   One variant per errno the socket family can hand back. Flow-control results
//   (`WouldBlock`) share the type with real failures, as they do at the syscall
//   boundary.
//

use std::{fmt, io};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockError {
    AddrInUse,
    AlreadyConnected,
    NotConnected,
    ConnRefused,
    NoEntry,
    WrongProtocolType,
    NotSupported,
    InvalidArgument,
    WouldBlock,
    BrokenPipe,
    MessageTooLarge,
    OptionNotSupported,
    NotImplemented,
    ProtocolNotSupported,
    AddrFamilyNotSupported,
    BadDescriptor,
}

pub type Result<T> = std::result::Result<T, SockError>;

impl SockError {
    pub fn errno(self) -> i32 {
        match self {
            SockError::AddrInUse => libc::EADDRINUSE,
            SockError::AlreadyConnected => libc::EISCONN,
            SockError::NotConnected => libc::ENOTCONN,
            SockError::ConnRefused => libc::ECONNREFUSED,
            SockError::NoEntry => libc::ENOENT,
            SockError::WrongProtocolType => libc::EPROTOTYPE,
            SockError::NotSupported => libc::EOPNOTSUPP,
            SockError::InvalidArgument => libc::EINVAL,
            SockError::WouldBlock => libc::EAGAIN,
            SockError::BrokenPipe => libc::EPIPE,
            SockError::MessageTooLarge => libc::EMSGSIZE,
            SockError::OptionNotSupported => libc::ENOPROTOOPT,
            SockError::NotImplemented => libc::ENOSYS,
            SockError::ProtocolNotSupported => libc::EPROTONOSUPPORT,
            SockError::AddrFamilyNotSupported => libc::EAFNOSUPPORT,
            SockError::BadDescriptor => libc::EBADF,
        }
    }

    /// Flow-control outcome rather than a failure.
    pub fn is_would_block(self) -> bool {
        self == SockError::WouldBlock
    }
}

impl fmt::Display for SockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SockError::AddrInUse => "address already in use",
            SockError::AlreadyConnected => "socket is already connected",
            SockError::NotConnected => "socket is not connected",
            SockError::ConnRefused => "connection refused",
            SockError::NoEntry => "no such endpoint",
            SockError::WrongProtocolType => "protocol wrong type for socket",
            SockError::NotSupported => "operation not supported",
            SockError::InvalidArgument => "invalid argument",
            SockError::WouldBlock => "operation would block",
            SockError::BrokenPipe => "broken pipe",
            SockError::MessageTooLarge => "message too long",
            SockError::OptionNotSupported => "protocol option not available",
            SockError::NotImplemented => "function not implemented",
            SockError::ProtocolNotSupported => "protocol not supported",
            SockError::AddrFamilyNotSupported => "address family not supported",
            SockError::BadDescriptor => "socket is closed",
        };
        write!(f, "{msg} (errno {})", self.errno())
    }
}

impl std::error::Error for SockError {}

impl From<SockError> for io::Error {
    fn from(e: SockError) -> Self {
        io::Error::from_raw_os_error(e.errno())
    }
}
