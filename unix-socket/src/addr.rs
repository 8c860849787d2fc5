// Unix socket addresses and their sockaddr_un form.

use crate::error::{Result, SockError};
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// Length of `sockaddr_un::sun_path`.
pub const UNIX_PATH_MAX: usize = 108;

const_assert_eq!(
    size_of::<libc::sockaddr_un>(),
    size_of::<libc::sa_family_t>() + UNIX_PATH_MAX
);

const PATH_OFFSET: usize = size_of::<libc::sa_family_t>();

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum UnixAddr {
    /// No name: an unbound socket or a datagram sender.
    #[default]
    Unnamed,
    Path(Vec<u8>),
}

impl UnixAddr {
    /// Name up to the first NUL. An empty name is the unnamed address.
    pub fn path(name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        if end == 0 {
            UnixAddr::Unnamed
        } else {
            UnixAddr::Path(name[..end].to_vec())
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            UnixAddr::Unnamed => None,
            UnixAddr::Path(name) => Some(name),
        }
    }

    pub fn is_unnamed(&self) -> bool {
        matches!(self, UnixAddr::Unnamed)
    }

    pub fn from_sockaddr(sa: &libc::sockaddr_un, len: libc::socklen_t) -> Result<Self> {
        let len = len as usize;
        if len < PATH_OFFSET || len > size_of::<libc::sockaddr_un>() {
            return Err(SockError::InvalidArgument);
        }
        if sa.sun_family != libc::AF_UNIX as libc::sa_family_t {
            return Err(SockError::AddrFamilyNotSupported);
        }
        let raw: Vec<u8> = sa.sun_path[..len - PATH_OFFSET]
            .iter()
            .map(|&c| c as u8)
            .collect();
        Ok(UnixAddr::path(raw))
    }

    /// Fills a `sockaddr_un`. The path is NUL-terminated when it leaves room,
    /// as Linux does.
    pub fn to_sockaddr(&self) -> (libc::sockaddr_un, libc::socklen_t) {
        // SAFETY: sockaddr_un is plain old data; all zeroes is a valid value.
        let mut sa: libc::sockaddr_un = unsafe { std::mem::zeroed() };
        sa.sun_family = libc::AF_UNIX as libc::sa_family_t;
        let mut len = PATH_OFFSET;
        if let UnixAddr::Path(name) = self {
            let n = name.len().min(UNIX_PATH_MAX);
            for (dst, &src) in sa.sun_path.iter_mut().zip(&name[..n]) {
                *dst = src as libc::c_char;
            }
            len += n;
            if n < UNIX_PATH_MAX {
                len += 1;
            }
        }
        (sa, len as libc::socklen_t)
    }
}
