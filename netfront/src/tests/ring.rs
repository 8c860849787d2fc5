#![cfg(test)]

use crate::netif::{NET_RX_RING_SIZE, NET_TX_RING_SIZE, TxFrontRing, TxRequest, TxResponse};
use crate::ring::BackRing;

fn request(id: u16) -> TxRequest {
    TxRequest {
        gref: 100 + id as u32,
        offset: 0,
        flags: 0,
        id,
        size: 60,
    }
}

fn pair(capacity: usize) -> (TxFrontRing, BackRing<TxRequest, TxResponse>) {
    let front = TxFrontRing::with_capacity(capacity).unwrap();
    let back = unsafe { BackRing::attach(front.page_addr(), capacity).unwrap() };
    (front, back)
}

#[test]
fn test_ring_sizes() {
    assert_eq!(NET_TX_RING_SIZE, 256);
    assert_eq!(NET_RX_RING_SIZE, 256);
    assert_eq!(TxFrontRing::MAX_CAPACITY, 256);
    let ring = TxFrontRing::new().unwrap();
    assert_eq!(ring.capacity(), 256);
    assert!(ring.page_addr().is_aligned());
}

#[test]
fn test_capacity_must_be_power_of_two() {
    assert!(TxFrontRing::with_capacity(3).is_err());
    assert!(TxFrontRing::with_capacity(512).is_err());
    assert!(TxFrontRing::with_capacity(0).is_err());
    assert!(TxFrontRing::with_capacity(1).is_ok());
}

#[test]
fn test_full_and_free() {
    let (mut front, _back) = pair(4);
    assert_eq!(front.free_requests(), 4);
    for id in 0..4 {
        assert!(!front.is_full());
        front.put_request(request(id));
    }
    assert!(front.is_full());
    assert_eq!(front.in_flight(), 4);
    assert_eq!(front.free_requests(), 0);
}

#[test]
fn test_first_push_notifies() {
    let (mut front, mut back) = pair(4);
    front.put_request(request(0));
    assert!(front.push_requests_and_check_notify());

    // backend has not asked again: no bell for the second request
    front.put_request(request(1));
    assert!(!front.push_requests_and_check_notify());

    assert_eq!(back.take_request().map(|r| r.id), Some(0));
    assert_eq!(back.take_request().map(|r| r.id), Some(1));
    assert!(back.take_request().is_none());
    assert!(!back.final_check_for_requests());

    front.put_request(request(2));
    assert!(front.push_requests_and_check_notify());
}

#[test]
fn test_responses_and_final_check() {
    let (mut front, mut back) = pair(4);
    front.put_request(request(0));
    front.put_request(request(1));
    front.push_requests_and_check_notify();
    while let Some(req) = back.take_request() {
        back.put_response(TxResponse { id: req.id, status: 0 });
    }
    assert!(back.push_responses_and_check_notify());

    assert_eq!(front.has_unconsumed_responses(), 2);
    assert!(front.final_check_for_responses());
    assert_eq!(front.take_response().map(|r| r.id), Some(0));
    assert_eq!(front.take_response().map(|r| r.id), Some(1));
    assert!(front.take_response().is_none());
    assert!(!front.is_full());

    assert!(!front.final_check_for_responses());
    assert_eq!(back.rsp_event(), front.rsp_cons + 1);

    front.put_request(request(2));
    front.push_requests_and_check_notify();
    let req = back.take_request().unwrap();
    back.put_response(TxResponse { id: req.id, status: 0 });
    assert!(back.push_responses_and_check_notify());
    assert!(front.final_check_for_responses());
}

#[test]
fn test_indices_wrap() {
    let (mut front, mut back) = pair(2);
    front.req_prod_pvt = u32::MAX - 1;
    front.rsp_cons = u32::MAX - 1;
    back.req_cons = u32::MAX - 1;
    back.rsp_prod_pvt = u32::MAX - 1;
    for round in 0..5u16 {
        front.put_request(request(round));
        front.push_requests_and_check_notify();
        let req = back.take_request().unwrap();
        assert_eq!(req.id, round);
        back.put_response(TxResponse { id: req.id, status: 0 });
        back.push_responses_and_check_notify();
        assert_eq!(front.take_response().map(|r| r.id), Some(round));
        assert_eq!(front.in_flight(), 0);
    }
    assert_eq!(front.req_prod_pvt, 3);
}
