#![cfg(test)]

use crate::listen::{ListenQueue, PendingConn};
use crate::pipe::pipe;
use std::sync::Weak;

fn conn(tag: u8) -> PendingConn {
    let (reader, writer) = pipe(16, false);
    writer.write(&[tag]).unwrap();
    PendingConn {
        reader,
        writer,
        peer: Weak::new(),
    }
}

fn tag_of(conn: &PendingConn) -> u8 {
    let mut buf = [0u8; 1];
    conn.reader.read(&mut buf).unwrap();
    buf[0]
}

#[test]
fn test_fifo_and_backlog_bound() {
    let queue = ListenQueue::new(2);
    assert!(queue.push(conn(1)).is_ok());
    assert!(queue.push(conn(2)).is_ok());
    assert!(queue.is_full());
    let refused = queue.push(conn(3)).unwrap_err();
    assert_eq!(tag_of(&refused), 3);
    assert_eq!(queue.count(), 2);

    assert_eq!(tag_of(&queue.accept().unwrap()), 1);
    assert_eq!(tag_of(&queue.accept().unwrap()), 2);
    assert!(queue.accept().is_none());
    assert_eq!(queue.count(), 0);
}

#[test]
fn test_wraps_around() {
    let queue = ListenQueue::new(3);
    for round in 0..10u8 {
        assert!(queue.push(conn(round)).is_ok());
        assert!(queue.push(conn(round + 100)).is_ok());
        assert_eq!(tag_of(&queue.accept().unwrap()), round);
        assert_eq!(tag_of(&queue.accept().unwrap()), round + 100);
    }
    assert_eq!(queue.count(), 0);
}

#[test]
fn test_drain_empties() {
    let queue = ListenQueue::new(4);
    assert!(queue.push(conn(1)).is_ok());
    assert!(queue.push(conn(2)).is_ok());
    assert_eq!(queue.drain().len(), 2);
    assert_eq!(queue.count(), 0);
    assert!(queue.accept().is_none());
}

#[test]
fn test_zero_backlog_holds_one() {
    let queue = ListenQueue::new(0);
    assert_eq!(queue.size(), 1);
    assert!(queue.push(conn(0)).is_ok());
    assert!(queue.push(conn(1)).is_err());
}

#[test]
fn test_concurrent_acceptors_never_share_a_slot() {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    let queue = Arc::new(ListenQueue::new(64));
    for tag in 0..64u8 {
        assert!(queue.push(conn(tag)).is_ok());
    }
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let workers: Vec<_> = (0..4)
        .map(|_| {
            let queue = queue.clone();
            let seen = seen.clone();
            std::thread::spawn(move || {
                while let Some(c) = queue.accept() {
                    assert!(seen.lock().unwrap().insert(tag_of(&c)));
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(seen.lock().unwrap().len(), 64);
    assert_eq!(queue.count(), 0);
}
