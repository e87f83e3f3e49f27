//! [`Connection`]: the public entry point.
//!
//! ```text
//! Idle ──connect()──→ Connected ──disconnect()──→ Disconnected (terminal)
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use castline_assembly::FragmentAssembler;
use castline_protocol::WireCodec;
use castline_registry::{ChannelPattern, Listener, SubscriptionRegistry};
use castline_transport::{DatagramTransport, MulticastTransport, TransportConfig};
use tokio::task::JoinHandle;

use crate::{CastlineError, ConnectionConfig, Subscription, dispatch};

/// Externally visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Created but not yet connected.
    Idle,
    /// Transport open and receive task running.
    Connected,
    /// Torn down. A new `Connection` is required to reconnect.
    Disconnected,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
        }
    }
}

enum Lifecycle<T> {
    Idle,
    /// `connect` is awaiting `T::open`.
    Opening,
    Connected {
        transport: Arc<T>,
        receiver: JoinHandle<()>,
    },
    Disconnected,
}

/// A participant on a multicast group: publishes messages and dispatches
/// received ones to subscribed listeners.
///
/// All methods take `&self`; share a connection between tasks with `Arc`.
/// `publish` may run concurrently from many tasks. Listeners run on the
/// connection's own receive task, one message at a time, so a slow
/// listener delays every later message on this connection.
///
/// # Example
///
/// ```rust,no_run
/// use castline::prelude::*;
///
/// # async fn demo() -> Result<(), CastlineError> {
/// let conn = Connection::open_url("udpm://239.255.76.67:7667?ttl=0").await?;
/// let sub = conn.subscribe("odom", |channel: &str, payload: &[u8]| {
///     println!("{channel}: {} bytes", payload.len());
/// })?;
/// conn.publish("odom", &[1, 2]).await?;
/// sub.unsubscribe();
/// conn.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection<T: DatagramTransport = MulticastTransport> {
    config: ConnectionConfig<T::Config>,
    codec: WireCodec,
    registry: Arc<SubscriptionRegistry>,
    lifecycle: Mutex<Lifecycle<T>>,
}

impl<T: DatagramTransport> Connection<T> {
    /// Creates an idle connection. Nothing is opened until
    /// [`connect`](Self::connect).
    pub fn new(config: ConnectionConfig<T::Config>) -> Self {
        Self {
            codec: WireCodec::new(config.fragmentation),
            config,
            registry: Arc::new(SubscriptionRegistry::new()),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Creates a connection and connects it.
    pub async fn open(config: ConnectionConfig<T::Config>) -> Result<Self, CastlineError> {
        let connection = Self::new(config);
        connection.connect().await?;
        Ok(connection)
    }

    /// Opens the transport and starts the receive task.
    ///
    /// Cancel-safe: dropping the returned future before it completes leaves
    /// the connection idle.
    ///
    /// # Errors
    /// - [`CastlineError::Encode`] if the fragmentation policy is unusable.
    /// - [`CastlineError::AlreadyConnected`] if connected or connecting.
    /// - [`CastlineError::NotReusable`] after [`disconnect`](Self::disconnect).
    /// - [`CastlineError::Transport`] if the transport cannot be opened; the
    ///   connection stays idle and `connect` may be retried.
    pub async fn connect(&self) -> Result<(), CastlineError> {
        self.config.fragmentation.validate()?;
        {
            let mut lifecycle = self.lock();
            match *lifecycle {
                Lifecycle::Idle => *lifecycle = Lifecycle::Opening,
                Lifecycle::Opening | Lifecycle::Connected { .. } => {
                    return Err(CastlineError::AlreadyConnected);
                }
                Lifecycle::Disconnected => return Err(CastlineError::NotReusable),
            }
        }
        let opening = OpeningGuard {
            lifecycle: &self.lifecycle,
        };

        let transport = Arc::new(T::open(&self.config.transport).await?);

        let receiver = tokio::spawn(dispatch::run(
            Arc::clone(&transport),
            Arc::clone(&self.registry),
            FragmentAssembler::new(self.config.assembly.clone()),
            self.config.sweep_interval,
        ));

        let local_addr = transport.local_addr();
        *self.lock() = Lifecycle::Connected {
            transport,
            receiver,
        };
        drop(opening);
        tracing::info!(?local_addr, "connected");
        Ok(())
    }

    /// Publishes one message.
    ///
    /// Takes a fresh sequence number, encodes short or fragmented per the
    /// fragmentation policy, and sends every datagram. Delivery is best
    /// effort: success means the datagrams left this host, nothing more.
    ///
    /// # Errors
    /// - [`CastlineError::NotConnected`] unless connected.
    /// - [`CastlineError::Encode`] for an unencodable channel name.
    /// - [`CastlineError::Transport`] if a send fails. Fragments already
    ///   sent are not recalled; receivers evict the partial message.
    pub async fn publish(&self, channel: &str, payload: &[u8]) -> Result<(), CastlineError> {
        let transport = self.transport()?;
        let sequence = transport.next_sequence();
        let datagrams = self.codec.encode(channel, sequence, payload)?;

        for datagram in &datagrams {
            transport.send(datagram).await?;
        }
        tracing::trace!(
            channel,
            sequence,
            size = payload.len(),
            datagrams = datagrams.len(),
            "published"
        );
        Ok(())
    }

    /// Registers `listener` for every channel matching `pattern`.
    ///
    /// A plain string subscribes to that exact channel; use
    /// [`ChannelPattern::regex`] or [`subscribe_regex`](Self::subscribe_regex)
    /// for a match expression.
    ///
    /// # Errors
    /// [`CastlineError::NotConnected`] unless connected.
    pub fn subscribe(
        &self,
        pattern: impl Into<ChannelPattern>,
        listener: impl Listener,
    ) -> Result<Subscription, CastlineError> {
        if self.state() != LifecycleState::Connected {
            return Err(CastlineError::NotConnected);
        }
        let pattern = pattern.into();
        let id = self.registry.add(pattern.clone(), Arc::new(listener));
        Ok(Subscription::new(id, pattern, &self.registry))
    }

    /// Compiles `pattern` as a full-match regular expression and subscribes.
    pub fn subscribe_regex(
        &self,
        pattern: &str,
        listener: impl Listener,
    ) -> Result<Subscription, CastlineError> {
        self.subscribe(ChannelPattern::regex(pattern)?, listener)
    }

    /// Stops the receive task, closes the transport and drops every
    /// subscription.
    ///
    /// Safe while the receive task is blocked waiting for a datagram.
    /// Does nothing on an idle or already disconnected connection.
    pub async fn disconnect(&self) -> Result<(), CastlineError> {
        let previous = {
            let mut lifecycle = self.lock();
            match *lifecycle {
                Lifecycle::Connected { .. } => {
                    std::mem::replace(&mut *lifecycle, Lifecycle::Disconnected)
                }
                _ => return Ok(()),
            }
        };

        if let Lifecycle::Connected {
            transport,
            receiver,
        } = previous
        {
            transport.close();
            if let Err(e) = receiver.await {
                tracing::warn!(error = %e, "receive task ended abnormally");
            }
        }
        self.registry.clear();
        tracing::info!("disconnected");
        Ok(())
    }

    pub fn state(&self) -> LifecycleState {
        match *self.lock() {
            Lifecycle::Idle | Lifecycle::Opening => LifecycleState::Idle,
            Lifecycle::Connected { .. } => LifecycleState::Connected,
            Lifecycle::Disconnected => LifecycleState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LifecycleState::Connected
    }

    /// Source address peers see for this connection, while connected.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport().ok().and_then(|t| t.local_addr())
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    pub fn config(&self) -> &ConnectionConfig<T::Config> {
        &self.config
    }

    fn transport(&self) -> Result<Arc<T>, CastlineError> {
        match &*self.lock() {
            Lifecycle::Connected { transport, .. } => Ok(Arc::clone(transport)),
            _ => Err(CastlineError::NotConnected),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle<T>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connection<MulticastTransport> {
    /// Connects to a multicast group given as a provider URL, e.g.
    /// `udpm://239.255.76.67:7667?ttl=1`.
    pub async fn open_url(url: &str) -> Result<Self, CastlineError> {
        let transport = TransportConfig::from_url(url)?;
        Self::open(ConnectionConfig::new(transport)).await
    }
}

/// Returns an interrupted `connect` to `Idle`. Leaves any other state alone,
/// so dropping it after a successful open is harmless.
struct OpeningGuard<'a, T> {
    lifecycle: &'a Mutex<Lifecycle<T>>,
}

impl<T> Drop for OpeningGuard<'_, T> {
    fn drop(&mut self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*lifecycle, Lifecycle::Opening) {
            *lifecycle = Lifecycle::Idle;
        }
    }
}

impl<T: DatagramTransport> Drop for Connection<T> {
    // Closing the transport ends the receive task on its own.
    fn drop(&mut self) {
        if let Lifecycle::Connected { transport, .. } = &*self.lock() {
            transport.close();
        }
    }
}

impl<T: DatagramTransport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use castline_protocol::{EncodeError, FragmentationPolicy};
    use castline_transport::{Datagram, MemoryBus, MemoryTransport, TransportError};

    use super::*;

    fn idle() -> Connection<MemoryTransport> {
        Connection::new(ConnectionConfig::new(MemoryBus::new()))
    }

    /// Memory endpoint whose first `open` never completes.
    struct StallingTransport(MemoryTransport);

    struct StallOnce {
        bus: MemoryBus,
        stall: AtomicBool,
    }

    impl DatagramTransport for StallingTransport {
        type Config = StallOnce;

        async fn open(config: &StallOnce) -> Result<Self, TransportError> {
            if config.stall.swap(false, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(Self(MemoryTransport::attach(&config.bus)))
        }

        async fn send(&self, datagram: &[u8]) -> Result<(), TransportError> {
            self.0.send(datagram).await
        }

        async fn next_datagram(&self) -> Result<Option<Datagram>, TransportError> {
            self.0.next_datagram().await
        }

        fn close(&self) {
            self.0.close();
        }

        fn is_closed(&self) -> bool {
            self.0.is_closed()
        }

        fn next_sequence(&self) -> u32 {
            self.0.next_sequence()
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            self.0.local_addr()
        }
    }

    #[tokio::test]
    async fn test_connect_cancelled_mid_open_can_be_retried() {
        let conn = Connection::<StallingTransport>::new(ConnectionConfig::new(StallOnce {
            bus: MemoryBus::new(),
            stall: AtomicBool::new(true),
        }));

        let attempt = tokio::time::timeout(Duration::from_millis(50), conn.connect()).await;
        assert!(attempt.is_err(), "first open should stall");
        assert_eq!(conn.state(), LifecycleState::Idle);

        conn.connect().await.unwrap();
        assert_eq!(conn.state(), LifecycleState::Connected);
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_with_undersized_policy_stays_idle() {
        let conn = Connection::<MemoryTransport>::new(
            ConnectionConfig::new(MemoryBus::new())
                .fragmentation(FragmentationPolicy::with_threshold(64)),
        );

        let result = conn.connect().await;
        assert!(matches!(
            result,
            Err(CastlineError::Encode(EncodeError::InvalidPolicy { size: 64, .. }))
        ));
        assert_eq!(conn.state(), LifecycleState::Idle);
    }

    #[test]
    fn test_new_starts_idle() {
        let conn = idle();
        assert_eq!(conn.state(), LifecycleState::Idle);
        assert!(conn.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_publish_when_idle_is_not_connected() {
        let conn = idle();
        let result = conn.publish("A", b"x").await;
        assert!(matches!(result, Err(CastlineError::NotConnected)));
    }

    #[test]
    fn test_subscribe_when_idle_is_not_connected() {
        let conn = idle();
        let result = conn.subscribe("A", |_: &str, _: &[u8]| {});
        assert!(matches!(result, Err(CastlineError::NotConnected)));
        assert_eq!(conn.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let conn = idle();
        conn.disconnect().await.unwrap();
        assert_eq!(conn.state(), LifecycleState::Idle);
    }

    #[tokio::test]
    async fn test_connect_twice_is_already_connected() {
        let conn = idle();
        conn.connect().await.unwrap();
        let result = conn.connect().await;
        assert!(matches!(result, Err(CastlineError::AlreadyConnected)));
        conn.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_is_not_reusable() {
        let conn = idle();
        conn.connect().await.unwrap();
        conn.disconnect().await.unwrap();
        conn.disconnect().await.unwrap();

        assert_eq!(conn.state(), LifecycleState::Disconnected);
        let result = conn.connect().await;
        assert!(matches!(result, Err(CastlineError::NotReusable)));
    }

    #[tokio::test]
    async fn test_subscribe_regex_invalid_is_registry_error() {
        let conn = idle();
        conn.connect().await.unwrap();
        let result = conn.subscribe_regex("(", |_: &str, _: &[u8]| {});
        assert!(matches!(result, Err(CastlineError::Registry(_))));
        conn.disconnect().await.unwrap();
    }

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::Connected.to_string(), "connected");
    }
}
