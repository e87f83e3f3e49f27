//! Transport abstraction layer for Castline.
//!
//! Provides the [`DatagramTransport`] trait, the only contract between the
//! network and the rest of the stack: send one encoded datagram, wait for
//! the next received one, hand out sequence numbers.
//!
//! Implementations:
//!
//! - [`MulticastTransport`] — UDP multicast, one send and one receive socket
//!   per group (feature `multicast`, on by default).
//! - [`MemoryTransport`] — endpoints on an in-process [`MemoryBus`], for
//!   tests and single-process setups.
//!
//! # Feature Flags
//!
//! - `multicast` (default) — UDP multicast transport via `socket2` + tokio

mod config;
mod error;
mod memory;
#[cfg(feature = "multicast")]
mod multicast;
mod signal;

pub use config::{
    TransportConfig, DEFAULT_GROUP, DEFAULT_PORT, DEFAULT_TTL, PROVIDER_SCHEME,
};
pub use error::TransportError;
pub use memory::{MemoryBus, MemoryTransport};
#[cfg(feature = "multicast")]
pub use multicast::MulticastTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

/// Largest datagram a receiver will accept (maximum UDP payload).
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Raw bytes received from the network, tagged with who sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
}

/// Per-connection outbound sequence counter.
///
/// Starts at 0 and wraps at 2^32. Safe to share between concurrent
/// publishers; each call returns a distinct value until the counter wraps.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU32);

impl SequenceCounter {
    pub fn new(start: u32) -> Self {
        Self(AtomicU32::new(start))
    }

    /// Returns the current value and advances the counter.
    pub fn next_sequence(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A datagram medium shared with other peers.
///
/// The futures returned here must be `Send` so a connection can drive its
/// receive loop from a spawned task.
pub trait DatagramTransport: Send + Sync + Sized + 'static {
    /// What [`open`](Self::open) needs to join the medium.
    type Config: Send + Sync + 'static;

    /// Opens the transport and joins the group.
    fn open(
        config: &Self::Config,
    ) -> impl Future<Output = Result<Self, TransportError>> + Send;

    /// Sends one encoded datagram to the group.
    ///
    /// Returns [`TransportError::Closed`] after [`close`](Self::close) and
    /// [`TransportError::SendFailed`] when the OS rejects the send. Failed
    /// sends are not retried.
    fn send(
        &self,
        datagram: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Waits for the next received datagram.
    ///
    /// Returns `Ok(None)` once the transport is closed, including when
    /// [`close`](Self::close) is called while this future is pending.
    fn next_datagram(
        &self,
    ) -> impl Future<Output = Result<Option<Datagram>, TransportError>> + Send;

    /// Closes the transport. Pending and future receives observe `None`;
    /// sends fail with [`TransportError::Closed`]. Idempotent.
    fn close(&self);

    /// Returns `true` once [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;

    /// Returns the next outbound sequence number for this transport.
    fn next_sequence(&self) -> u32;

    /// Address peers see as the source of our datagrams, if known.
    fn local_addr(&self) -> Option<SocketAddr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_counter_starts_at_zero_and_increments() {
        let counter = SequenceCounter::default();
        assert_eq!(counter.next_sequence(), 0);
        assert_eq!(counter.next_sequence(), 1);
        assert_eq!(counter.next_sequence(), 2);
    }

    #[test]
    fn test_sequence_counter_wraps_at_u32_max() {
        let counter = SequenceCounter::new(u32::MAX);
        assert_eq!(counter.next_sequence(), u32::MAX);
        assert_eq!(counter.next_sequence(), 0);
    }

    #[test]
    fn test_sequence_counter_is_unique_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;

        let counter = Arc::new(SequenceCounter::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    (0..1_000).map(|_| counter.next_sequence()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "sequence {seq} handed out twice");
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
