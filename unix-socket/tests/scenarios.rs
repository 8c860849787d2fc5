//
// scenarios.rs - Unix socket behaviour, one call at a time
//
// Purpose:
//   Walks stream, seqpacket and datagram sockets through bind, listen,
//   connect, accept, transfer, shutdown and close, checking return codes and
//   readiness after each step.
//
// How it works:
//   Every test gets a private namespace so names never collide between tests
//   running in parallel. Only `test_global_namespace` touches the process-wide
//   one.
//

use std::io;
use std::net::Shutdown;
use std::sync::Arc;
use unix_socket::{
    Events, Namespace, SockError, SockState, SockType, UnixAddr, UnixConfig, UnixFamily,
    UnixSocket,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn namespace() -> Arc<Namespace> {
    init_logger();
    Namespace::new(None)
}

fn path(name: &str) -> UnixAddr {
    UnixAddr::path(name)
}

fn all() -> Events {
    Events::all()
}

fn listener(ns: &Arc<Namespace>, ty: SockType, name: &str, backlog: i32) -> Arc<UnixSocket> {
    let sock = UnixSocket::new_in(ns.clone(), ty);
    sock.bind(&path(name)).unwrap();
    sock.listen(backlog).unwrap();
    sock
}

fn read_all(sock: &UnixSocket) -> Vec<u8> {
    let mut buf = [0u8; 256];
    let n = sock.read(&mut buf).unwrap();
    buf[..n].to_vec()
}

#[test]
fn test_bind_collision_until_close() {
    let ns = namespace();
    let s1 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    let s2 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    s1.bind(&path("/tmp/a")).unwrap();
    assert_eq!(s2.bind(&path("/tmp/a")), Err(SockError::AddrInUse));
    // a failed bind leaves the socket unbound
    assert_eq!(s2.getsockname().unwrap(), UnixAddr::Unnamed);

    s1.close().unwrap();
    s2.bind(&path("/tmp/a")).unwrap();
    assert_eq!(s2.getsockname().unwrap(), path("/tmp/a"));
    assert!(s2.state().unwrap().contains(SockState::BOUND));
    assert_eq!(s2.bind(&path("/tmp/b")), Err(SockError::InvalidArgument));
    assert_eq!(s2.bind(&UnixAddr::Unnamed), Err(SockError::InvalidArgument));
}

#[test]
fn test_drop_releases_name() {
    let ns = namespace();
    let s1 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    s1.bind(&path("/tmp/dropped")).unwrap();
    drop(s1);
    assert!(ns.is_empty());
    let s2 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    s2.bind(&path("/tmp/dropped")).unwrap();
}

#[test]
fn test_backlog_refuses_extra_and_accepts_in_order() {
    let ns = namespace();
    let srv = listener(&ns, SockType::Stream, "/tmp/srv", 2);
    assert!(srv.poll(Events::IN).is_empty());

    let c1 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    c1.bind(&path("/tmp/c1")).unwrap();
    let c2 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    let c3 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    c1.connect(&path("/tmp/srv")).unwrap();
    c2.connect(&path("/tmp/srv")).unwrap();
    assert_eq!(c3.connect(&path("/tmp/srv")), Err(SockError::ConnRefused));
    assert!(!c3.state().unwrap().contains(SockState::CONNECTED));
    assert_eq!(srv.poll(Events::IN), Events::IN);
    assert_eq!(srv.getsockopt(libc::SOL_SOCKET, libc::SO_ACCEPTCONN), Ok(2));

    c1.write(b"from c1").unwrap();
    c2.write(b"from c2").unwrap();

    let (a1, peer1) = srv.accept().unwrap();
    assert_eq!(peer1, path("/tmp/c1"));
    assert_eq!(read_all(&a1), b"from c1");
    let (a2, peer2) = srv.accept().unwrap();
    assert_eq!(peer2, UnixAddr::Unnamed);
    assert_eq!(read_all(&a2), b"from c2");

    assert_eq!(srv.accept().err(), Some(SockError::WouldBlock));
    assert!(srv.poll(Events::IN).is_empty());

    // room again
    c3.connect(&path("/tmp/srv")).unwrap();
    assert_eq!(srv.poll(Events::IN), Events::IN);
}

#[test]
fn test_stream_echo_and_names() {
    let ns = namespace();
    let srv = listener(&ns, SockType::Stream, "/srv/echo", 4);
    let cli = UnixSocket::new_in(ns.clone(), SockType::Stream);
    assert_eq!(cli.getpeername(), Err(SockError::NotConnected));
    cli.connect(&path("/srv/echo")).unwrap();
    assert_eq!(cli.connect(&path("/srv/echo")), Err(SockError::AlreadyConnected));
    assert_eq!(cli.poll(all()), Events::OUT);

    let (conn, _) = srv.accept().unwrap();
    assert_eq!(cli.getpeername().unwrap(), path("/srv/echo"));
    assert_eq!(conn.getpeername().unwrap(), UnixAddr::Unnamed);
    assert_eq!(conn.getsockname().unwrap(), UnixAddr::Unnamed);

    assert_eq!(cli.write(b"ping").unwrap(), 4);
    assert_eq!(conn.poll(Events::IN), Events::IN);
    let mut buf = [0u8; 16];
    let (n, from) = conn.recvfrom(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");
    assert_eq!(from, UnixAddr::Unnamed);
    assert!(conn.poll(Events::IN).is_empty());
    assert_eq!(conn.read(&mut buf), Err(SockError::WouldBlock));

    conn.write(b"pong").unwrap();
    let (n, from) = cli.recvmsg(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"pong");
    assert_eq!(from, path("/srv/echo"));

    // stream sockets take no destination
    assert_eq!(cli.sendto(b"x", &path("/srv/echo")), Err(SockError::AlreadyConnected));
    let fresh = UnixSocket::new_in(ns.clone(), SockType::Stream);
    assert_eq!(fresh.sendto(b"x", &path("/srv/echo")), Err(SockError::NotSupported));
    assert_eq!(fresh.write(b"x"), Err(SockError::NotConnected));
    assert_eq!(fresh.read(&mut buf), Err(SockError::NotConnected));
}

#[test]
fn test_stream_partial_write_under_pressure() {
    init_logger();
    let ns = Namespace::new(Some(&UnixConfig {
        pipe_capacity: Some(8),
        ..Default::default()
    }));
    let (a, b) = UnixSocket::pair_in(ns, SockType::Stream);
    assert_eq!(a.write(b"0123456789").unwrap(), 8);
    assert!(a.poll(Events::OUT).is_empty());
    assert_eq!(a.write(b"x"), Err(SockError::WouldBlock));
    assert_eq!(read_all(&b), b"01234567");
    assert_eq!(a.poll(Events::OUT), Events::OUT);
}

#[test]
fn test_listen_rules() {
    let ns = namespace();
    let dgram = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    dgram.bind(&path("/d")).unwrap();
    assert_eq!(dgram.listen(4), Err(SockError::NotSupported));
    assert_eq!(dgram.accept().err(), Some(SockError::NotSupported));

    let unbound = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    assert_eq!(unbound.listen(4), Err(SockError::InvalidArgument));
    assert_eq!(unbound.accept().err(), Some(SockError::InvalidArgument));

    let srv = listener(&ns, SockType::SeqPacket, "/seq", 1);
    // a second listen keeps the first backlog
    srv.listen(10).unwrap();
    let c1 = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    let c2 = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    c1.connect(&path("/seq")).unwrap();
    assert_eq!(c2.connect(&path("/seq")), Err(SockError::ConnRefused));
    // listening sockets do not connect
    assert_eq!(srv.connect(&path("/seq")), Err(SockError::InvalidArgument));
}

#[test]
fn test_connect_failures() {
    let ns = namespace();
    let cli = UnixSocket::new_in(ns.clone(), SockType::Stream);
    assert_eq!(cli.connect(&path("/nobody")), Err(SockError::NoEntry));
    assert_eq!(cli.connect(&UnixAddr::Unnamed), Err(SockError::InvalidArgument));

    let dgram = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    dgram.bind(&path("/dgram")).unwrap();
    assert_eq!(cli.connect(&path("/dgram")), Err(SockError::WrongProtocolType));

    let idle = UnixSocket::new_in(ns.clone(), SockType::Stream);
    idle.bind(&path("/idle")).unwrap();
    assert_eq!(cli.connect(&path("/idle")), Err(SockError::ConnRefused));

    let srv = listener(&ns, SockType::Stream, "/gone", 1);
    srv.close().unwrap();
    assert_eq!(cli.connect(&path("/gone")), Err(SockError::NoEntry));
}

#[test]
fn test_dgram_send_without_connect() {
    let ns = namespace();
    let d1 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    d1.bind(&path("/tmp/d1")).unwrap();
    let d2 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    assert_eq!(d1.poll(all()), Events::OUT);

    assert_eq!(d2.sendto(b"hello", &path("/tmp/d1")).unwrap(), 5);
    assert_eq!(d1.poll(Events::IN), Events::IN);
    let mut buf = [0u8; 64];
    let (n, from) = d1.recvfrom(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello");
    assert_eq!(from, UnixAddr::Unnamed);

    // accepted but never delivered
    assert_eq!(d2.sendto(b"", &path("/tmp/d1")).unwrap(), 0);
    assert_eq!(d1.recvfrom(&mut buf).err(), Some(SockError::WouldBlock));
    assert!(d1.poll(Events::IN).is_empty());

    assert_eq!(d2.write(b"nowhere"), Err(SockError::NotConnected));
    assert_eq!(d2.write(b""), Err(SockError::NotConnected));
    assert_eq!(d2.sendto(b"x", &path("/tmp/none")), Err(SockError::NoEntry));
    // an empty datagram still needs a valid destination
    assert_eq!(d2.sendto(b"", &path("/tmp/none")), Err(SockError::NoEntry));
    let stream = listener(&ns, SockType::Stream, "/tmp/stream", 1);
    assert_eq!(d2.sendto(b"x", &path("/tmp/stream")), Err(SockError::WrongProtocolType));
    drop(stream);
}

#[test]
fn test_seqpacket_delivers_empty_records() -> anyhow::Result<()> {
    let ns = namespace();
    let srv = listener(&ns, SockType::SeqPacket, "/tmp/seq", 1);
    let cli = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    cli.connect(&path("/tmp/seq"))?;
    let (conn, _) = srv.accept()?;

    assert_eq!(cli.write(b"")?, 0);
    cli.write(b"rec")?;
    assert_eq!(conn.poll(Events::IN), Events::IN);
    let mut buf = [0u8; 8];
    assert_eq!(conn.read(&mut buf)?, 0);
    assert_eq!(conn.read(&mut buf)?, 3);
    assert_eq!(&buf[..3], b"rec");
    assert_eq!(conn.read(&mut buf), Err(SockError::WouldBlock));
    Ok(())
}

#[test]
fn test_dgram_records_and_size_limit() {
    init_logger();
    let ns = Namespace::new(Some(&UnixConfig {
        pipe_capacity: Some(16),
        ..Default::default()
    }));
    let d1 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    d1.bind(&path("/r")).unwrap();
    let d2 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    d2.sendto(b"one", &path("/r")).unwrap();
    d2.sendto(b"two!", &path("/r")).unwrap();
    assert_eq!(d2.sendto(&[0; 17], &path("/r")), Err(SockError::MessageTooLarge));
    assert_eq!(d2.sendto(&[0; 10], &path("/r")), Err(SockError::WouldBlock));
    assert_eq!(read_all(&d1), b"one");
    assert_eq!(read_all(&d1), b"two!");
}

#[test]
fn test_dgram_connect_and_peer_loss() {
    let ns = namespace();
    let d1 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    d1.bind(&path("/d1")).unwrap();
    let d2 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    d2.connect(&path("/d1")).unwrap();
    assert_eq!(d2.getpeername().unwrap(), path("/d1"));
    assert_eq!(d2.write(b"x").unwrap(), 1);
    assert_eq!(read_all(&d1), b"x");

    // an explicit destination still works once connected
    let other = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    other.bind(&path("/other")).unwrap();
    d2.sendto(b"y", &path("/other")).unwrap();
    assert_eq!(read_all(&other), b"y");

    // reconnecting swaps the target
    d2.connect(&path("/other")).unwrap();
    d2.write(b"z").unwrap();
    assert_eq!(read_all(&other), b"z");
    assert_eq!(d1.read(&mut [0u8; 4]), Err(SockError::WouldBlock));

    // receiver stops reading: connected sends break, named sends are refused
    other.shutdown(Shutdown::Read).unwrap();
    assert_eq!(d2.write(b"late"), Err(SockError::BrokenPipe));
    let d3 = UnixSocket::new_in(ns.clone(), SockType::Dgram);
    assert_eq!(d3.sendto(b"late", &path("/other")), Err(SockError::ConnRefused));
    assert_eq!(d2.poll(Events::OUT), Events::OUT);

    other.close().unwrap();
    assert_eq!(d3.sendto(b"late", &path("/other")), Err(SockError::NoEntry));
}

#[test]
fn test_peer_close_is_seen_by_accepted_socket() {
    let ns = namespace();
    let srv = listener(&ns, SockType::Stream, "/srv", 2);
    let cli = UnixSocket::new_in(ns.clone(), SockType::Stream);
    cli.bind(&path("/cli")).unwrap();
    cli.connect(&path("/srv")).unwrap();
    let (conn, peer) = srv.accept().unwrap();
    assert_eq!(peer, path("/cli"));
    assert_eq!(conn.getpeername().unwrap(), path("/cli"));

    cli.write(b"last words").unwrap();
    drop(cli);
    // the peer link does not keep the client alive
    assert_eq!(conn.getpeername().unwrap(), UnixAddr::Unnamed);
    assert_eq!(conn.poll(all()), Events::IN | Events::RDHUP | Events::HUP);
    assert_eq!(read_all(&conn), b"last words");
    assert_eq!(conn.read(&mut [0u8; 8]).unwrap(), 0);
    assert_eq!(conn.write(b"hello?"), Err(SockError::BrokenPipe));
    assert!(ns.lookup(b"/cli").is_none());
}

#[test]
fn test_closing_listener_drains_pending() {
    let ns = namespace();
    let srv = listener(&ns, SockType::SeqPacket, "/drain", 4);
    let cli = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    cli.connect(&path("/drain")).unwrap();
    assert_eq!(cli.poll(all()), Events::OUT);

    srv.close().unwrap();
    assert_eq!(cli.poll(all()), Events::IN | Events::RDHUP | Events::HUP);
    assert_eq!(cli.read(&mut [0u8; 8]).unwrap(), 0);
    assert_eq!(cli.write(b"x"), Err(SockError::BrokenPipe));
    assert_eq!(srv.close(), Err(SockError::BadDescriptor));
}

#[test]
fn test_shutdown_directions() {
    let ns = namespace();
    let (a, b) = UnixSocket::pair_in(ns, SockType::Stream);
    assert_eq!(a.getpeername().unwrap(), UnixAddr::Unnamed);

    a.shutdown(Shutdown::Write).unwrap();
    assert!(a.state().unwrap().contains(SockState::SHUT_WR));
    assert_eq!(a.write(b"x"), Err(SockError::BrokenPipe));
    assert!(a.poll(Events::HUP).is_empty());
    assert_eq!(b.poll(Events::IN | Events::RDHUP), Events::IN | Events::RDHUP);
    assert_eq!(b.read(&mut [0u8; 4]).unwrap(), 0);

    // the other direction still flows
    b.write(b"back").unwrap();
    assert_eq!(read_all(&a), b"back");

    a.shutdown(Shutdown::Read).unwrap();
    let down = Events::IN | Events::RDHUP | Events::HUP;
    assert_eq!(a.poll(down), down);
    assert_eq!(a.read(&mut [0u8; 4]).unwrap(), 0);
    assert_eq!(b.write(b"more"), Err(SockError::BrokenPipe));
    assert!(b.poll(Events::HUP).contains(Events::HUP));

    let lone = UnixSocket::new_in(namespace(), SockType::Stream);
    assert_eq!(lone.shutdown(Shutdown::Both), Err(SockError::NotConnected));
}

#[test]
fn test_close_wakes_peer() {
    let ns = namespace();
    let (a, b) = UnixSocket::pair_in(ns, SockType::SeqPacket);
    a.write(b"rec1").unwrap();
    a.write(b"rec2").unwrap();
    assert_eq!(read_all(&b), b"rec1");
    a.close().unwrap();
    assert_eq!(b.poll(all()), Events::IN | Events::RDHUP | Events::HUP);
    assert_eq!(read_all(&b), b"rec2");
    assert_eq!(b.read(&mut [0u8; 4]).unwrap(), 0);

    assert_eq!(a.write(b"x"), Err(SockError::BadDescriptor));
    assert_eq!(a.getsockname(), Err(SockError::BadDescriptor));
    assert!(a.is_closed());
    assert_eq!(a.state(), None);
}

#[test]
fn test_dgram_pair() -> anyhow::Result<()> {
    let ns = namespace();
    let (a, b) = UnixSocket::pair_in(ns.clone(), SockType::Dgram);
    a.write(b"to b")?;
    b.write(b"to a")?;
    assert_eq!(read_all(&b), b"to b");
    assert_eq!(read_all(&a), b"to a");
    assert!(a.state().unwrap().contains(SockState::CONNECTED));
    assert!(ns.is_empty());
    Ok(())
}

#[test]
fn test_socket_options() {
    let ns = namespace();
    let sock = UnixSocket::new_in(ns.clone(), SockType::SeqPacket);
    let sol = libc::SOL_SOCKET;
    assert_eq!(sock.getsockopt(sol, libc::SO_TYPE), Ok(libc::SOCK_SEQPACKET));
    assert_eq!(sock.getsockopt(sol, libc::SO_DOMAIN), Ok(libc::AF_UNIX));
    assert_eq!(sock.getsockopt(sol, libc::SO_PROTOCOL), Ok(0));
    assert_eq!(sock.getsockopt(sol, libc::SO_ACCEPTCONN), Ok(0));
    assert_eq!(sock.getsockopt(sol, libc::SO_KEEPALIVE), Ok(0));
    assert_eq!(sock.getsockopt(sol, libc::SO_RCVBUF), Err(SockError::OptionNotSupported));
    assert_eq!(sock.getsockopt(libc::IPPROTO_TCP, libc::SO_TYPE), Err(SockError::OptionNotSupported));

    for opt in [libc::SO_BROADCAST, libc::SO_KEEPALIVE, libc::SO_LINGER, libc::SO_REUSEADDR] {
        sock.setsockopt(sol, opt, &1i32.to_ne_bytes()).unwrap();
    }
    assert_eq!(sock.setsockopt(sol, libc::SO_SNDBUF, &[]), Err(SockError::OptionNotSupported));
    assert_eq!(sock.ioctl(libc::FIONREAD as u64), Err(SockError::NotImplemented));

    sock.close().unwrap();
    assert_eq!(sock.getsockopt(sol, libc::SO_TYPE), Err(SockError::BadDescriptor));
    assert_eq!(sock.setsockopt(sol, libc::SO_REUSEADDR, &[]), Err(SockError::BadDescriptor));
}

#[test]
fn test_errors_map_to_errno() {
    assert_eq!(SockError::AddrInUse.errno(), libc::EADDRINUSE);
    assert_eq!(SockError::NotImplemented.errno(), libc::ENOSYS);
    let err: io::Error = SockError::WouldBlock.into();
    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    let err: io::Error = SockError::BrokenPipe.into();
    assert_eq!(err.raw_os_error(), Some(libc::EPIPE));
    assert!(SockError::ConnRefused.to_string().contains("refused"));
}

#[test]
fn test_names_are_truncated() {
    init_logger();
    let ns = Namespace::new(Some(&UnixConfig {
        max_name_len: Some(4),
        ..Default::default()
    }));
    let a = UnixSocket::new_in(ns.clone(), SockType::Stream);
    a.bind(&path("/tmp/long")).unwrap();
    assert_eq!(a.getsockname().unwrap(), path("/tmp"));
    let b = UnixSocket::new_in(ns.clone(), SockType::Stream);
    assert_eq!(b.bind(&path("/tmp/other")), Err(SockError::AddrInUse));

    a.listen(1).unwrap();
    b.connect(&path("/tmp/whatever")).unwrap();
}

#[test]
fn test_family_entry_points() -> anyhow::Result<()> {
    let family = UnixFamily::new(namespace());
    assert_eq!(
        family.socket(libc::AF_INET, libc::SOCK_STREAM, 0).err(),
        Some(SockError::AddrFamilyNotSupported)
    );
    assert_eq!(
        family.socket(libc::AF_UNIX, libc::SOCK_STREAM, 6).err(),
        Some(SockError::ProtocolNotSupported)
    );
    assert_eq!(
        family.socket(libc::AF_UNIX, libc::SOCK_RAW, 0).err(),
        Some(SockError::ProtocolNotSupported)
    );

    let sock = family
        .socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC, 0)
        .unwrap();
    assert_eq!(sock.sock_type(), SockType::Stream);
    assert!(sock.nonblock());
    assert!(Arc::ptr_eq(sock.namespace(), family.namespace()));

    let (a, b) = family.socketpair(libc::AF_UNIX, libc::SOCK_DGRAM, 0)?;
    assert!(!a.nonblock());
    a.write(b"pair")?;
    assert_eq!(read_all(&b), b"pair");
    Ok(())
}

#[test]
fn test_accept4_records_nonblock() {
    let ns = namespace();
    let srv = listener(&ns, SockType::Stream, "/nb", 2);
    let c1 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    let c2 = UnixSocket::new_in(ns.clone(), SockType::Stream);
    c1.connect(&path("/nb")).unwrap();
    c2.connect(&path("/nb")).unwrap();
    let (s1, _) = srv.accept4(libc::SOCK_NONBLOCK).unwrap();
    let (s2, _) = srv.accept4(0).unwrap();
    assert!(s1.nonblock());
    assert!(!s2.nonblock());
    s2.set_nonblock(true).unwrap();
    assert!(s2.nonblock());
}

#[test]
fn test_global_namespace() {
    init_logger();
    let created = Namespace::init_global(&UnixConfig::default());
    assert!(!Namespace::init_global(&UnixConfig::default()));
    if created {
        assert_eq!(Namespace::global().limits().max_name_len, unix_socket::UNIX_PATH_MAX);
    }
    let srv = UnixSocket::new(SockType::Stream);
    srv.bind(&path("/scenarios/global")).unwrap();
    srv.listen(1).unwrap();
    let family = UnixFamily::global();
    let cli = family.socket(libc::AF_UNIX, libc::SOCK_STREAM, 0).unwrap();
    cli.connect(&path("/scenarios/global")).unwrap();
    let (conn, _) = srv.accept().unwrap();
    let (x, y) = UnixSocket::pair(SockType::Stream);
    x.write(b"global").unwrap();
    assert_eq!(read_all(&y), b"global");
    drop(conn);
}
