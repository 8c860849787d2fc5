//! # Unix Domain Sockets
//!
//! ## Purpose
//!
//! `UnixSocket` implements stream, seqpacket and datagram sockets on top of
//! in-memory pipes. No operation blocks: a call that cannot make progress
//! returns `WouldBlock` and the socket's `Pollee` says when to retry.
//!
//! ## How it works
//!
//! Connection-oriented sockets meet through a listen queue. `connect` creates a
//! pipe per direction, parks the acceptor's ends in the listener's queue and keeps
//! the other ends; `accept` turns a queued entry into a new connected socket.
//! Datagram sockets each own a bound pipe created with the socket; senders
//! either write into the bound pipe of a named destination per call or latch
//! onto one with `connect`.
//!
//! Socket state sits behind a per-socket `RwLock` as `Option<SockData>`; `close`
//! takes it out so late callers see a closed socket rather than a half torn down
//! one. Peer links and namespace entries are `Weak`, never keeping a socket
//! alive.
//!
//! Readiness is derived from the pipes through listeners registered on their
//! pollees and seeded with the pipe's current state at registration:
//!
//! - read pipe `HUP`: the socket gets `RDHUP | IN`, plus `HUP` if writing is
//!   also down
//! - write pipe `ERR`: the socket gets `HUP` if reading is also down
//! - datagram sockets are always `OUT`
//!
//! Lock order is socket, then pipe or namespace. No path holds two socket locks
//! at once; peers are resolved after the caller's own lock is released.
//!
//! ## Main components
//!
//! - `SockType`: stream, datagram or seqpacket.
//! - `SockState`: connected, bound, listening and shutdown bits.
//! - `UnixSocket`: the socket object and its operations.

use crate::addr::UnixAddr;
use crate::error::{Result, SockError};
use crate::listen::{ListenQueue, PendingConn};
use crate::namespace::Namespace;
use crate::pipe::{PipeReader, PipeWriter, pipe};
use crate::pollee::{Events, ListenerId, Pollee};
use bitflags::bitflags;
use parking_lot::RwLock;
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockType {
    Stream,
    Dgram,
    SeqPacket,
}

impl SockType {
    /// Parses a `SOCK_*` type with any `SOCK_NONBLOCK`/`SOCK_CLOEXEC` bits
    /// already removed.
    pub fn from_raw(ty: i32) -> Result<Self> {
        match ty {
            libc::SOCK_STREAM => Ok(SockType::Stream),
            libc::SOCK_DGRAM => Ok(SockType::Dgram),
            libc::SOCK_SEQPACKET => Ok(SockType::SeqPacket),
            _ => Err(SockError::ProtocolNotSupported),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            SockType::Stream => libc::SOCK_STREAM,
            SockType::Dgram => libc::SOCK_DGRAM,
            SockType::SeqPacket => libc::SOCK_SEQPACKET,
        }
    }

    pub fn is_connection_oriented(self) -> bool {
        self != SockType::Dgram
    }

    fn packet_mode(self) -> bool {
        self != SockType::Stream
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SockState: u8 {
        const CONNECTED = 1 << 0;
        const BOUND = 1 << 1;
        const LISTENING = 1 << 2;
        const SHUT_RD = 1 << 3;
        const SHUT_WR = 1 << 4;
    }
}

struct SockEvents {
    pollee: Pollee,
    rd_down: AtomicBool,
    wr_down: AtomicBool,
    dgram: bool,
}

impl SockEvents {
    fn on_read_pipe(&self, now: Events) {
        self.pollee.update(Events::IN, now);
        if now.contains(Events::HUP) {
            self.read_side_down();
        }
    }

    fn on_write_pipe(&self, now: Events) {
        if !self.dgram {
            self.pollee.update(Events::OUT, now);
        }
        if now.contains(Events::ERR) {
            self.write_side_down();
        }
    }

    fn read_side_down(&self) {
        self.rd_down.store(true, Ordering::Release);
        let mut ev = Events::RDHUP | Events::IN;
        if self.wr_down.load(Ordering::Acquire) {
            ev |= Events::HUP;
        }
        self.pollee.add(ev);
    }

    fn write_side_down(&self) {
        self.wr_down.store(true, Ordering::Release);
        if self.rd_down.load(Ordering::Acquire) {
            self.pollee.add(Events::HUP);
        }
    }
}

struct ReadEnd {
    pipe: PipeReader,
    listener: ListenerId,
}

struct WriteEnd {
    pipe: PipeWriter,
    listener: ListenerId,
}

impl ReadEnd {
    fn attach(ev: &Arc<SockEvents>, pipe: PipeReader) -> Self {
        let events = ev.clone();
        let listener = pipe
            .pollee()
            .add_listener(Arc::new(move |now, _| events.on_read_pipe(now)));
        ev.on_read_pipe(pipe.pollee().events());
        ReadEnd { pipe, listener }
    }

    fn detach(self) -> PipeReader {
        self.pipe.pollee().remove_listener(self.listener);
        self.pipe
    }
}

impl WriteEnd {
    fn attach(ev: &Arc<SockEvents>, pipe: PipeWriter) -> Self {
        let events = ev.clone();
        let listener = pipe
            .pollee()
            .add_listener(Arc::new(move |now, _| events.on_write_pipe(now)));
        ev.on_write_pipe(pipe.pollee().events());
        WriteEnd { pipe, listener }
    }

    fn detach(self) -> PipeWriter {
        self.pipe.pollee().remove_listener(self.listener);
        self.pipe
    }
}

struct SockData {
    state: SockState,
    nonblock: bool,
    addr: UnixAddr,
    rd: Option<ReadEnd>,
    wr: Option<WriteEnd>,
    /// Datagram only: the writer peers clone to reach our bound pipe.
    bound: Option<PipeWriter>,
    peer: Option<Weak<UnixSocket>>,
    listen: Option<ListenQueue>,
}

pub struct UnixSocket {
    ty: SockType,
    ns: Arc<Namespace>,
    this: Weak<UnixSocket>,
    data: RwLock<Option<SockData>>,
    ev: Arc<SockEvents>,
}

impl UnixSocket {
    /// Creates a socket in the process-wide namespace.
    pub fn new(ty: SockType) -> Arc<Self> {
        UnixSocket::new_in(Namespace::global(), ty)
    }

    pub fn new_in(ns: Arc<Namespace>, ty: SockType) -> Arc<Self> {
        let dgram = ty == SockType::Dgram;
        let ev = Arc::new(SockEvents {
            pollee: Pollee::new(if dgram { Events::OUT } else { Events::empty() }),
            rd_down: AtomicBool::new(false),
            wr_down: AtomicBool::new(false),
            dgram,
        });
        let mut data = SockData {
            state: SockState::empty(),
            nonblock: false,
            addr: UnixAddr::Unnamed,
            rd: None,
            wr: None,
            bound: None,
            peer: None,
            listen: None,
        };
        if dgram {
            let (reader, writer) = pipe(ns.limits().pipe_capacity, true);
            data.rd = Some(ReadEnd::attach(&ev, reader));
            data.bound = Some(writer);
        }
        Arc::new_cyclic(|this| UnixSocket {
            ty,
            ns,
            this: this.clone(),
            data: RwLock::new(Some(data)),
            ev,
        })
    }

    pub fn sock_type(&self) -> SockType {
        self.ty
    }

    pub fn namespace(&self) -> &Arc<Namespace> {
        &self.ns
    }

    /// State bits; `None` once closed.
    pub fn state(&self) -> Option<SockState> {
        self.data.read().as_ref().map(|d| d.state)
    }

    pub fn is_closed(&self) -> bool {
        self.data.read().is_none()
    }

    pub fn nonblock(&self) -> bool {
        self.data.read().as_ref().is_some_and(|d| d.nonblock)
    }

    pub fn set_nonblock(&self, nonblock: bool) -> Result<()> {
        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        data.nonblock = nonblock;
        Ok(())
    }

    fn truncated_name(&self, addr: &UnixAddr) -> Result<Vec<u8>> {
        let name = addr.as_bytes().ok_or(SockError::InvalidArgument)?;
        let n = name.len().min(self.ns.limits().max_name_len);
        Ok(name[..n].to_vec())
    }

    pub fn bind(&self, addr: &UnixAddr) -> Result<()> {
        let name = self.truncated_name(addr)?;
        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        if data.state.contains(SockState::BOUND) {
            return Err(SockError::InvalidArgument);
        }
        self.ns.bind(&name, self.this.clone())?;
        data.addr = UnixAddr::Path(name);
        data.state |= SockState::BOUND;
        Ok(())
    }

    pub fn listen(&self, backlog: i32) -> Result<()> {
        if !self.ty.is_connection_oriented() {
            return Err(SockError::NotSupported);
        }
        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        if !data.state.contains(SockState::BOUND) || data.state.contains(SockState::CONNECTED) {
            return Err(SockError::InvalidArgument);
        }
        if data.state.contains(SockState::LISTENING) {
            log::warn!("listen: socket already listening, backlog {} ignored", backlog);
            return Ok(());
        }
        let size = usize::try_from(backlog)
            .unwrap_or(1)
            .clamp(1, self.ns.limits().max_backlog);
        data.listen = Some(ListenQueue::new(size));
        data.state |= SockState::LISTENING;
        Ok(())
    }

    /// Resolves `addr` to a live socket of our type.
    fn resolve(&self, addr: &UnixAddr) -> Result<Arc<UnixSocket>> {
        let name = self.truncated_name(addr)?;
        let weak = self.ns.lookup(&name).ok_or(SockError::NoEntry)?;
        let target = weak.upgrade().ok_or(SockError::ConnRefused)?;
        if target.ty != self.ty {
            return Err(SockError::WrongProtocolType);
        }
        Ok(target)
    }

    pub fn connect(&self, addr: &UnixAddr) -> Result<()> {
        {
            let guard = self.data.read();
            let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
            if self.ty.is_connection_oriented() {
                if data.state.contains(SockState::CONNECTED) {
                    return Err(SockError::AlreadyConnected);
                }
                if data.state.contains(SockState::LISTENING) {
                    return Err(SockError::InvalidArgument);
                }
            }
        }
        let target = self.resolve(addr)?;
        if self.ty.is_connection_oriented() {
            self.connect_stream(&target)
        } else {
            self.connect_dgram(&target)
        }
    }

    fn connect_stream(&self, target: &Arc<UnixSocket>) -> Result<()> {
        let capacity = self.ns.limits().pipe_capacity;
        let packet = self.ty.packet_mode();
        let (to_target_rd, to_target_wr) = pipe(capacity, packet);
        let (to_self_rd, to_self_wr) = pipe(capacity, packet);
        {
            let guard = target.data.write();
            let tdata = guard.as_ref().ok_or(SockError::NoEntry)?;
            let queue = tdata.listen.as_ref().ok_or(SockError::ConnRefused)?;
            let conn = PendingConn {
                reader: to_target_rd,
                writer: to_self_wr,
                peer: self.this.clone(),
            };
            if queue.push(conn).is_err() {
                log::debug!("connect: backlog of {} full", queue.size());
                return Err(SockError::ConnRefused);
            }
            target.ev.pollee.add(Events::IN);
        }

        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        if data.state.contains(SockState::CONNECTED) {
            // lost a race with another connect; the queued entry sees a hangup
            return Err(SockError::AlreadyConnected);
        }
        data.rd = Some(ReadEnd::attach(&self.ev, to_self_rd));
        data.wr = Some(WriteEnd::attach(&self.ev, to_target_wr));
        data.peer = Some(Arc::downgrade(target));
        data.state |= SockState::CONNECTED;
        Ok(())
    }

    fn connect_dgram(&self, target: &Arc<UnixSocket>) -> Result<()> {
        let writer = {
            let guard = target.data.read();
            let tdata = guard.as_ref().ok_or(SockError::NoEntry)?;
            tdata.bound.clone().ok_or(SockError::ConnRefused)?
        };
        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        if let Some(old) = data.wr.take() {
            drop(old.detach());
        }
        data.wr = Some(WriteEnd::attach(&self.ev, writer));
        data.peer = Some(Arc::downgrade(target));
        data.state |= SockState::CONNECTED;
        Ok(())
    }

    /// Accepts a pending connection. `flags` may carry `SOCK_NONBLOCK`, which is
    /// recorded on the new socket. Returns the socket and its peer's name.
    pub fn accept4(&self, flags: i32) -> Result<(Arc<UnixSocket>, UnixAddr)> {
        if !self.ty.is_connection_oriented() {
            return Err(SockError::NotSupported);
        }
        let conn = {
            let guard = self.data.read();
            let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
            let queue = data.listen.as_ref().ok_or(SockError::InvalidArgument)?;
            let conn = queue.accept();
            if queue.count() == 0 {
                self.ev.pollee.del(Events::IN);
            }
            conn.ok_or(SockError::WouldBlock)?
        };

        let sock = UnixSocket::new_in(self.ns.clone(), self.ty);
        let peer_addr = conn
            .peer
            .upgrade()
            .map(|peer| peer.bound_name())
            .unwrap_or_default();
        {
            let mut guard = sock.data.write();
            if let Some(data) = guard.as_mut() {
                data.rd = Some(ReadEnd::attach(&sock.ev, conn.reader));
                data.wr = Some(WriteEnd::attach(&sock.ev, conn.writer));
                data.peer = Some(conn.peer);
                data.nonblock = flags & libc::SOCK_NONBLOCK != 0;
                data.state |= SockState::CONNECTED;
            }
        }
        Ok((sock, peer_addr))
    }

    pub fn accept(&self) -> Result<(Arc<UnixSocket>, UnixAddr)> {
        self.accept4(0)
    }

    fn bound_name(&self) -> UnixAddr {
        self.data
            .read()
            .as_ref()
            .map(|d| d.addr.clone())
            .unwrap_or_default()
    }

    fn peer_name(peer: Option<Weak<UnixSocket>>) -> UnixAddr {
        peer.and_then(|p| p.upgrade())
            .map(|p| p.bound_name())
            .unwrap_or_default()
    }

    /// Sends `buf`, to `to` for unconnected datagram sockets. A zero-length
    /// datagram is dropped and reported as sent once its destination checks out.
    pub fn sendmsg(&self, buf: &[u8], to: Option<&UnixAddr>) -> Result<usize> {
        if self.ty.is_connection_oriented() {
            return self.send_connected(buf, to);
        }
        let guard = self.data.read();
        let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
        if data.state.contains(SockState::SHUT_WR) {
            return Err(SockError::BrokenPipe);
        }
        let Some(to) = to else {
            let wr = data.wr.as_ref().ok_or(SockError::NotConnected)?;
            if buf.is_empty() {
                return drop_empty_datagram();
            }
            return wr.pipe.write(buf);
        };
        drop(guard);

        let target = self.resolve(to)?;
        let writer = {
            let guard = target.data.read();
            guard
                .as_ref()
                .and_then(|d| d.bound.clone())
                .ok_or(SockError::ConnRefused)?
        };
        drop(target);
        if buf.is_empty() {
            return drop_empty_datagram();
        }
        writer.write(buf).map_err(|e| match e {
            SockError::BrokenPipe => SockError::ConnRefused,
            e => e,
        })
    }

    fn send_connected(&self, buf: &[u8], to: Option<&UnixAddr>) -> Result<usize> {
        let guard = self.data.read();
        let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
        if to.is_some() {
            return Err(if data.state.contains(SockState::CONNECTED) {
                SockError::AlreadyConnected
            } else {
                SockError::NotSupported
            });
        }
        let Some(wr) = data.wr.as_ref() else {
            return Err(if data.state.contains(SockState::SHUT_WR) {
                SockError::BrokenPipe
            } else {
                SockError::NotConnected
            });
        };
        wr.pipe.write(buf)
    }

    /// Receives into `buf`. Returns the byte count and the sender: the peer's
    /// name for connected sockets, unnamed for datagrams.
    pub fn recvmsg(&self, buf: &mut [u8]) -> Result<(usize, UnixAddr)> {
        let (n, peer) = {
            let guard = self.data.read();
            let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
            let Some(rd) = data.rd.as_ref() else {
                if data.state.intersects(SockState::CONNECTED | SockState::SHUT_RD) {
                    return Ok((0, UnixAddr::Unnamed));
                }
                return Err(SockError::NotConnected);
            };
            (rd.pipe.read(buf)?, data.peer.clone())
        };
        let from = if self.ty.is_connection_oriented() {
            UnixSocket::peer_name(peer)
        } else {
            UnixAddr::Unnamed
        };
        Ok((n, from))
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.recvmsg(buf).map(|(n, _)| n)
    }

    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        self.sendmsg(buf, None)
    }

    pub fn sendto(&self, buf: &[u8], to: &UnixAddr) -> Result<usize> {
        self.sendmsg(buf, Some(to))
    }

    pub fn recvfrom(&self, buf: &mut [u8]) -> Result<(usize, UnixAddr)> {
        self.recvmsg(buf)
    }

    pub fn shutdown(&self, how: Shutdown) -> Result<()> {
        let mut guard = self.data.write();
        let data = guard.as_mut().ok_or(SockError::BadDescriptor)?;
        if self.ty.is_connection_oriented() && !data.state.contains(SockState::CONNECTED) {
            return Err(SockError::NotConnected);
        }
        let (rd, wr) = match how {
            Shutdown::Read => (true, false),
            Shutdown::Write => (false, true),
            Shutdown::Both => (true, true),
        };
        self.shutdown_locked(data, rd, wr, true);
        Ok(())
    }

    fn shutdown_locked(&self, data: &mut SockData, rd: bool, wr: bool, notify: bool) {
        if wr {
            if let Some(end) = data.wr.take() {
                drop(end.detach());
            }
            data.state |= SockState::SHUT_WR;
            if notify {
                self.ev.write_side_down();
            }
        }
        if rd {
            if let Some(end) = data.rd.take() {
                drop(end.detach());
            }
            data.state |= SockState::SHUT_RD;
            if notify {
                self.ev.read_side_down();
            }
        }
    }

    /// Closes the socket. Later calls report `BadDescriptor`.
    pub fn close(&self) -> Result<()> {
        let data = {
            let mut guard = self.data.write();
            let mut data = guard.take().ok_or(SockError::BadDescriptor)?;
            self.shutdown_locked(&mut data, true, true, false);
            data
        };
        self.release(data);
        Ok(())
    }

    fn release(&self, data: SockData) {
        if data.state.contains(SockState::BOUND) {
            if let Some(name) = data.addr.as_bytes() {
                if self.ns.release(name, &self.this).is_err() {
                    log::debug!("close: {:?} no longer ours", String::from_utf8_lossy(name));
                }
            }
        }
        if let Some(queue) = data.listen {
            let pending = queue.drain();
            if !pending.is_empty() {
                log::debug!("close: dropping {} pending connections", pending.len());
            }
        }
        // peer link and bound pipe go with `data`
    }

    pub fn getsockname(&self) -> Result<UnixAddr> {
        let guard = self.data.read();
        let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
        Ok(data.addr.clone())
    }

    pub fn getpeername(&self) -> Result<UnixAddr> {
        let peer = {
            let guard = self.data.read();
            let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
            if !data.state.contains(SockState::CONNECTED) {
                return Err(SockError::NotConnected);
            }
            data.peer.clone()
        };
        Ok(UnixSocket::peer_name(peer))
    }

    /// `SOL_SOCKET` options. `SO_ACCEPTCONN` reports the number of pending
    /// connections.
    pub fn getsockopt(&self, level: i32, name: i32) -> Result<i32> {
        if level != libc::SOL_SOCKET {
            return Err(SockError::OptionNotSupported);
        }
        let guard = self.data.read();
        let data = guard.as_ref().ok_or(SockError::BadDescriptor)?;
        match name {
            libc::SO_ACCEPTCONN => Ok(data.listen.as_ref().map_or(0, |q| q.count() as i32)),
            libc::SO_DOMAIN => Ok(libc::AF_UNIX),
            libc::SO_TYPE => Ok(self.ty.raw()),
            libc::SO_PROTOCOL => Ok(0),
            libc::SO_BROADCAST | libc::SO_KEEPALIVE | libc::SO_LINGER | libc::SO_REUSEADDR => Ok(0),
            _ => Err(SockError::OptionNotSupported),
        }
    }

    /// Accepts and ignores the options applications set out of habit.
    pub fn setsockopt(&self, level: i32, name: i32, _value: &[u8]) -> Result<()> {
        if level != libc::SOL_SOCKET {
            return Err(SockError::OptionNotSupported);
        }
        if self.is_closed() {
            return Err(SockError::BadDescriptor);
        }
        match name {
            libc::SO_BROADCAST | libc::SO_KEEPALIVE | libc::SO_LINGER | libc::SO_REUSEADDR => {
                Ok(())
            }
            _ => Err(SockError::OptionNotSupported),
        }
    }

    pub fn ioctl(&self, _request: u64) -> Result<i32> {
        Err(SockError::NotImplemented)
    }

    pub fn pollee(&self) -> &Pollee {
        &self.ev.pollee
    }

    pub fn poll(&self, mask: Events) -> Events {
        self.ev.pollee.poll(mask)
    }

    /// Waits until any of `mask` is ready.
    pub async fn wait(&self, mask: Events) -> Events {
        self.ev.pollee.wait(mask).await
    }

    /// Creates a connected pair in the process-wide namespace.
    pub fn pair(ty: SockType) -> (Arc<Self>, Arc<Self>) {
        UnixSocket::pair_in(Namespace::global(), ty)
    }

    pub fn pair_in(ns: Arc<Namespace>, ty: SockType) -> (Arc<Self>, Arc<Self>) {
        let a = UnixSocket::new_in(ns.clone(), ty);
        let b = UnixSocket::new_in(ns, ty);
        if ty == SockType::Dgram {
            let to_b = b.bound_writer();
            let to_a = a.bound_writer();
            a.install_writer(to_b);
            b.install_writer(to_a);
        } else {
            let capacity = a.ns.limits().pipe_capacity;
            let (a_to_b_rd, a_to_b_wr) = pipe(capacity, ty.packet_mode());
            let (b_to_a_rd, b_to_a_wr) = pipe(capacity, ty.packet_mode());
            a.install_pipes(b_to_a_rd, a_to_b_wr);
            b.install_pipes(a_to_b_rd, b_to_a_wr);
        }
        link_peers(&a, &b);
        (a, b)
    }

    fn bound_writer(&self) -> Option<PipeWriter> {
        self.data.read().as_ref().and_then(|d| d.bound.clone())
    }

    fn install_writer(&self, writer: Option<PipeWriter>) {
        let mut guard = self.data.write();
        if let (Some(data), Some(writer)) = (guard.as_mut(), writer) {
            data.wr = Some(WriteEnd::attach(&self.ev, writer));
            data.state |= SockState::CONNECTED;
        }
    }

    fn install_pipes(&self, reader: PipeReader, writer: PipeWriter) {
        let mut guard = self.data.write();
        if let Some(data) = guard.as_mut() {
            data.rd = Some(ReadEnd::attach(&self.ev, reader));
            data.wr = Some(WriteEnd::attach(&self.ev, writer));
            data.state |= SockState::CONNECTED;
        }
    }
}

/// Points each socket of a fresh pair at the other.
fn link_peers(a: &Arc<UnixSocket>, b: &Arc<UnixSocket>) {
    for (sock, peer) in [(a, b), (b, a)] {
        if let Some(data) = sock.data.write().as_mut() {
            data.peer = Some(Arc::downgrade(peer));
        }
    }
}

fn drop_empty_datagram() -> Result<usize> {
    log::warn!("sendmsg: dropping zero-length datagram");
    Ok(0)
}

impl Drop for UnixSocket {
    fn drop(&mut self) {
        if let Some(mut data) = self.data.get_mut().take() {
            self.shutdown_locked(&mut data, true, true, false);
            self.release(data);
        }
    }
}
