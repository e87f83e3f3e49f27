//! In-process datagram bus.
//!
//! A [`MemoryBus`] behaves like a multicast group confined to one process:
//! every [`MemoryTransport`] attached to it receives every datagram sent on
//! it, tagged with the sender's (fake) loopback address. Receivers that fall
//! behind lose datagrams, as they would on a real network.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;

use crate::signal::CloseSignal;
use crate::{Datagram, DatagramTransport, SequenceCounter, TransportError};

/// Datagrams buffered per receiver before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 1024;

/// First fake port handed to an attached endpoint.
const FIRST_PORT: u16 = 40_000;

/// Shared medium for [`MemoryTransport`] endpoints. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

#[derive(Debug)]
struct BusInner {
    sender: broadcast::Sender<Datagram>,
    next_port: AtomicU16,
    loopback: bool,
}

impl MemoryBus {
    /// A bus that delivers each endpoint's datagrams back to itself, like a
    /// multicast group with loopback enabled.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_CAPACITY, true)
    }

    /// A bus with an explicit per-receiver capacity and loopback setting.
    pub fn with_options(capacity: usize, loopback: bool) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                sender,
                next_port: AtomicU16::new(FIRST_PORT),
                loopback,
            }),
        }
    }

    /// Places raw bytes on the bus as if `source` had sent them.
    ///
    /// Returns how many endpoints were listening.
    pub fn inject(&self, payload: impl Into<Vec<u8>>, source: SocketAddr) -> usize {
        self.inner
            .sender
            .send(Datagram {
                payload: payload.into(),
                source,
            })
            .unwrap_or(0)
    }

    /// Number of endpoints currently attached.
    pub fn endpoint_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    fn allocate_address(&self) -> SocketAddr {
        let port = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One endpoint on a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryTransport {
    bus: MemoryBus,
    receiver: Mutex<broadcast::Receiver<Datagram>>,
    address: SocketAddr,
    sequence: SequenceCounter,
    closed: CloseSignal,
}

impl MemoryTransport {
    /// Attaches a new endpoint with its own source address.
    pub fn attach(bus: &MemoryBus) -> Self {
        Self {
            bus: bus.clone(),
            receiver: Mutex::new(bus.inner.sender.subscribe()),
            address: bus.allocate_address(),
            sequence: SequenceCounter::default(),
            closed: CloseSignal::new(),
        }
    }

    /// The source address stamped on this endpoint's datagrams.
    pub fn address(&self) -> SocketAddr {
        self.address
    }
}

impl DatagramTransport for MemoryTransport {
    type Config = MemoryBus;

    async fn open(bus: &MemoryBus) -> Result<Self, TransportError> {
        Ok(Self::attach(bus))
    }

    async fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
        if self.closed.is_closed() {
            return Err(TransportError::Closed);
        }
        // No receivers means nobody is listening; the datagram is simply lost.
        let _ = self.bus.inner.sender.send(Datagram {
            payload: datagram.to_vec(),
            source: self.address,
        });
        Ok(())
    }

    async fn next_datagram(&self) -> Result<Option<Datagram>, TransportError> {
        let mut receiver = self.receiver.lock().await;
        loop {
            if self.closed.is_closed() {
                return Ok(None);
            }

            let received = tokio::select! {
                () = self.closed.wait() => return Ok(None),
                received = receiver.recv() => received,
            };

            match received {
                Ok(datagram)
                    if !self.bus.inner.loopback && datagram.source == self.address =>
                {
                    continue;
                }
                Ok(datagram) => return Ok(Some(datagram)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(
                        address = %self.address,
                        skipped,
                        "memory receiver lagged, datagrams lost"
                    );
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }

    fn close(&self) {
        if self.closed.close() {
            tracing::debug!(address = %self.address, "memory transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    fn next_sequence(&self) -> u32 {
        self.sequence.next_sequence()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_assigns_distinct_addresses() {
        let bus = MemoryBus::new();
        let a = MemoryTransport::attach(&bus);
        let b = MemoryTransport::attach(&bus);
        assert_ne!(a.address(), b.address());
        assert_eq!(bus.endpoint_count(), 2);
    }

    #[test]
    fn test_inject_without_endpoints_reaches_nobody() {
        let bus = MemoryBus::new();
        let source = SocketAddr::from((Ipv4Addr::LOCALHOST, 9));
        assert_eq!(bus.inject(b"hello".to_vec(), source), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let bus = MemoryBus::new();
        let t = MemoryTransport::attach(&bus);
        assert!(!t.is_closed());
        t.close();
        t.close();
        assert!(t.is_closed());
    }
}
