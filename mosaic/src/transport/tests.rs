use std::thread;
use std::time::Duration;

use super::*;

fn fleet(size: usize) -> (LocalFabric, LocalEndpoint) {
    let fabric = LocalFabric::new(size);
    let coordinator = fabric.endpoint(COORDINATOR_RANK).unwrap();
    (fabric, coordinator)
}

#[test]
fn endpoint_outside_fleet_is_rejected() {
    let fabric = LocalFabric::new(3);
    assert_eq!(fabric.size(), 3);
    assert_eq!(
        fabric.endpoint(3).unwrap_err(),
        TransportError::UnknownRank { rank: 3, size: 3 }
    );

    let endpoint = fabric.endpoint(2).unwrap();
    assert_eq!(
        BlockingTransport::send(&endpoint, 7, Tag::Data, vec![1]).unwrap_err(),
        TransportError::UnknownRank { rank: 7, size: 3 }
    );
}

#[test]
fn blocking_send_waits_for_receiver() {
    let (fabric, coordinator) = fleet(2);
    let worker = fabric.endpoint(1).unwrap();

    let sender = thread::spawn(move || BlockingTransport::send(&worker, 0, Tag::Data, vec![1, 2, 3]));

    let mut requests = [Some(coordinator.recv_async(1, Tag::Data, vec![0; 8]).unwrap())];
    let completion = loop {
        if let Some(completion) = coordinator.poll_any(&mut requests).unwrap() {
            break completion;
        }
        thread::sleep(Duration::from_millis(1));
    };

    assert_eq!(completion.index, 0);
    assert_eq!(completion.peer, 1);
    assert_eq!(completion.len, 3);
    assert_eq!(completion.received(), &[1, 2, 3]);
    assert!(requests[0].is_none());
    sender.join().unwrap().unwrap();
}

#[test]
fn messages_on_one_route_arrive_in_order() {
    let (fabric, coordinator) = fleet(2);
    let worker = fabric.endpoint(1).unwrap();

    let mut sends = vec![
        coordinator.send_async(1, Tag::Size, vec![1]).unwrap(),
        coordinator.send_async(1, Tag::Size, vec![2]).unwrap(),
        coordinator.send_async(1, Tag::Width, vec![3]).unwrap(),
    ];
    assert!(!coordinator.poll_all(&mut sends).unwrap());

    assert_eq!(BlockingTransport::recv(&worker, 0, Tag::Width, 8).unwrap(), vec![3]);
    assert_eq!(BlockingTransport::recv(&worker, 0, Tag::Size, 8).unwrap(), vec![1]);
    assert!(!coordinator.poll_all(&mut sends).unwrap());
    assert_eq!(BlockingTransport::recv(&worker, 0, Tag::Size, 8).unwrap(), vec![2]);
    assert!(coordinator.poll_all(&mut sends).unwrap());
}

#[test]
fn oversized_message_is_truncation_error() {
    let (fabric, coordinator) = fleet(2);
    let worker = fabric.endpoint(1).unwrap();

    let mut sends = [coordinator.send_async(1, Tag::Data, vec![0; 16]).unwrap()];
    assert_eq!(
        BlockingTransport::recv(&worker, 0, Tag::Data, 8).unwrap_err(),
        TransportError::Truncated {
            capacity: 8,
            len: 16
        }
    );
    // The message was consumed, so the sender is released.
    assert!(coordinator.poll_all(&mut sends).unwrap());
}

#[test]
fn poll_any_returns_first_ready_slot_only() {
    let (fabric, coordinator) = fleet(3);
    let first = fabric.endpoint(1).unwrap();
    let second = fabric.endpoint(2).unwrap();

    let mut requests = vec![
        Some(coordinator.recv_async(1, Tag::Data, vec![0; 4]).unwrap()),
        Some(coordinator.recv_async(2, Tag::Data, vec![0; 4]).unwrap()),
    ];
    assert!(coordinator.poll_any(&mut requests).unwrap().is_none());

    let handle = thread::spawn(move || BlockingTransport::send(&second, 0, Tag::Data, vec![9; 4]));
    let completion = loop {
        if let Some(completion) = coordinator.poll_any(&mut requests).unwrap() {
            break completion;
        }
        thread::sleep(Duration::from_millis(1));
    };
    handle.join().unwrap().unwrap();

    assert_eq!(completion.index, 1);
    assert_eq!(completion.into_received(), vec![9; 4]);
    assert!(requests[0].is_some());
    assert!(requests[1].is_none());

    let handle = thread::spawn(move || BlockingTransport::send(&first, 0, Tag::Data, vec![5; 2]));
    let completion = loop {
        if let Some(completion) = coordinator.poll_any(&mut requests).unwrap() {
            break completion;
        }
        thread::sleep(Duration::from_millis(1));
    };
    handle.join().unwrap().unwrap();

    assert_eq!(completion.index, 0);
    assert_eq!(completion.received(), &[5, 5]);
    assert!(coordinator.poll_any(&mut requests).unwrap().is_none());
}

#[test]
fn abort_wakes_blocked_receiver() {
    let (fabric, coordinator) = fleet(2);
    let worker = fabric.endpoint(1).unwrap();

    let handle = thread::spawn(move || BlockingTransport::recv(&worker, 0, Tag::Size, 8));
    thread::sleep(Duration::from_millis(20));
    PollingTransport::abort(&coordinator, ABORT_FAIL_CODE);

    assert_eq!(
        handle.join().unwrap().unwrap_err(),
        TransportError::Aborted {
            code: ABORT_FAIL_CODE
        }
    );
    assert_eq!(fabric.abort_code(), Some(ABORT_FAIL_CODE));
}

#[test]
fn abort_wakes_blocked_sender() {
    let (fabric, _coordinator) = fleet(2);
    let worker = fabric.endpoint(1).unwrap();

    let handle = thread::spawn(move || BlockingTransport::send(&worker, 0, Tag::Data, vec![1; 32]));
    thread::sleep(Duration::from_millis(20));
    fabric.abort(ABORT_FAIL_CODE);

    assert!(matches!(
        handle.join().unwrap(),
        Err(TransportError::Aborted { .. })
    ));
}

#[test]
fn operations_fail_after_abort() {
    let (fabric, coordinator) = fleet(2);
    let mut requests = [coordinator.recv_async(1, Tag::Data, vec![0; 4]).unwrap()];

    fabric.abort(3);
    fabric.abort(ABORT_FAIL_CODE);

    assert_eq!(
        coordinator.poll_all(&mut requests).unwrap_err(),
        TransportError::Aborted { code: 3 }
    );
    assert!(coordinator.send_async(1, Tag::Size, vec![0; 8]).is_err());
}
