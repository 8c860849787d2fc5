#![cfg(test)]

use super::FakeGrants;
use crate::netbuf::NetBuf;
use crate::slots::{FreeIds, SlotTable};

#[test]
fn test_grant_created_once_per_id() {
    let gnttab = FakeGrants::default();
    let mut table = SlotTable::new(4, 7, true);
    let first = NetBuf::new();
    let gref = table.bind_page(2, first.page_addr(), &gnttab).unwrap();
    assert_eq!(gnttab.page(gref), Some(first.page_addr()));
    assert_eq!(gnttab.readonly(gref), Some(true));

    let second = NetBuf::new();
    let again = table.bind_page(2, second.page_addr(), &gnttab).unwrap();
    assert_eq!(gref, again);
    assert_eq!(gnttab.page(gref), Some(second.page_addr()));
    assert_eq!(gnttab.counts(), (1, 1, 0));
    assert_eq!(table.grants_created(), 1);
    assert_eq!(table.grant_of(2), Some(gref));
    assert_eq!(table.grant_of(1), None);
}

#[test]
fn test_attach_and_take() {
    let mut table = SlotTable::new(2, 0, false);
    assert!(table.attach(1, NetBuf::new()).is_ok());
    assert!(table.is_busy(1));
    assert!(table.attach(1, NetBuf::new()).is_err());
    assert_eq!(table.in_flight(), 1);
    assert!(table.take(1).is_some());
    assert!(table.take(1).is_none());
    assert!(table.take(9).is_none());
    assert!(!table.is_busy(9));
}

#[test]
fn test_teardown_ends_grants_and_returns_buffers() {
    let gnttab = FakeGrants::default();
    let mut table = SlotTable::new(4, 0, false);
    for id in 0..3u16 {
        let buf = NetBuf::new();
        table.bind_page(id, buf.page_addr(), &gnttab).unwrap();
        table.attach(id, buf).unwrap();
    }
    drop(table.take(0));
    assert_eq!(gnttab.live(), 3);

    let left = table.teardown(&gnttab);
    assert_eq!(left.len(), 2);
    assert_eq!(gnttab.live(), 0);
    assert_eq!(gnttab.counts(), (3, 0, 3));
    assert!(table.teardown(&gnttab).is_empty());
}

#[test]
fn test_free_ids_lifo() {
    let mut ids = FreeIds::new(4);
    assert_eq!(ids.available(), 4);
    assert_eq!(ids.allocate(), Some(0));
    assert_eq!(ids.allocate(), Some(1));
    assert_eq!(ids.allocate(), Some(2));
    ids.release(1);
    assert_eq!(ids.allocate(), Some(1));
    assert_eq!(ids.allocate(), Some(3));
    assert_eq!(ids.allocate(), None);
    ids.release(2);
    ids.release(0);
    assert_eq!(ids.allocate(), Some(0));
    assert_eq!(ids.available(), 1);
}
