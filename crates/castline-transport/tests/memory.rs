//! Integration tests for the in-process memory transport.
//!
//! These exercise the [`DatagramTransport`] contract the connection layer
//! relies on: fan-out to every endpoint, source tagging, and a receive that
//! unblocks with `None` when the transport is closed.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use castline_transport::{
    DatagramTransport, MemoryBus, MemoryTransport, TransportError,
};

async fn recv_within(
    transport: &MemoryTransport,
) -> Option<castline_transport::Datagram> {
    tokio::time::timeout(Duration::from_secs(1), transport.next_datagram())
        .await
        .expect("receive should not time out")
        .expect("receive should succeed")
}

#[tokio::test]
async fn test_send_reaches_every_endpoint_with_source() {
    let bus = MemoryBus::new();
    let a = MemoryTransport::open(&bus).await.unwrap();
    let b = MemoryTransport::open(&bus).await.unwrap();

    a.send(b"hello").await.expect("send should succeed");

    let at_b = recv_within(&b).await.expect("b should receive");
    assert_eq!(at_b.payload, b"hello");
    assert_eq!(at_b.source, a.address());

    // Loopback: the sender hears itself too.
    let at_a = recv_within(&a).await.expect("a should receive");
    assert_eq!(at_a.source, a.address());
}

#[tokio::test]
async fn test_without_loopback_sender_does_not_hear_itself() {
    let bus = MemoryBus::with_options(16, false);
    let a = MemoryTransport::attach(&bus);
    let b = MemoryTransport::attach(&bus);

    a.send(b"from a").await.unwrap();
    b.send(b"from b").await.unwrap();

    let at_a = recv_within(&a).await.expect("a should receive");
    assert_eq!(at_a.payload, b"from b");
}

#[tokio::test]
async fn test_close_unblocks_pending_receive() {
    let bus = MemoryBus::new();
    let transport = Arc::new(MemoryTransport::attach(&bus));

    let waiter = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.next_datagram().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.close();

    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("receive should unblock")
        .expect("task should not panic");
    assert!(matches!(result, Ok(None)));
}

#[tokio::test]
async fn test_send_after_close_returns_closed() {
    let bus = MemoryBus::new();
    let transport = MemoryTransport::attach(&bus);
    transport.close();

    let result = transport.send(b"late").await;
    assert!(matches!(result, Err(TransportError::Closed)));
}

#[tokio::test]
async fn test_injected_bytes_arrive_verbatim() {
    let bus = MemoryBus::new();
    let transport = MemoryTransport::attach(&bus);
    let source = SocketAddr::from((Ipv4Addr::new(10, 1, 2, 3), 5555));

    assert_eq!(bus.inject(b"XXXXgarbage".to_vec(), source), 1);

    let datagram = recv_within(&transport).await.expect("should receive");
    assert_eq!(datagram.payload, b"XXXXgarbage");
    assert_eq!(datagram.source, source);
}

#[tokio::test]
async fn test_lagging_receiver_skips_lost_datagrams() {
    let bus = MemoryBus::with_options(2, true);
    let sender = MemoryTransport::attach(&bus);
    let receiver = MemoryTransport::attach(&bus);

    for i in 0u8..5 {
        sender.send(&[i]).await.unwrap();
    }

    // Only the newest two survive; the rest count as network loss.
    assert_eq!(recv_within(&receiver).await.unwrap().payload, vec![3]);
    assert_eq!(recv_within(&receiver).await.unwrap().payload, vec![4]);
}
