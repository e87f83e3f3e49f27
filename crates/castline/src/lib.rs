//! # Castline
//!
//! Lightweight publish/subscribe messaging over UDP multicast, wire
//! compatible with LCM peers.
//!
//! A [`Connection`] joins a multicast group, publishes `(channel, payload)`
//! messages and dispatches received ones to listeners whose
//! [`ChannelPattern`] matches. Messages larger than one datagram are
//! fragmented on send and reassembled on receive. Delivery is best effort:
//! no acknowledgements, no retransmission, no ordering across senders.
//!
//! ## Layers
//!
//! - [`castline_protocol`] — datagram encoding and decoding
//! - [`castline_transport`] — sockets (multicast, or an in-process bus)
//! - [`castline_assembly`] — fragment reassembly
//! - [`castline_registry`] — subscriptions and listeners
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use castline::prelude::*;
//!
//! # async fn demo() -> Result<(), CastlineError> {
//! let conn = Connection::open_url("udpm://239.255.76.67:7667").await?;
//! let _sub = conn.subscribe_regex("SENSOR_.*", |channel: &str, payload: &[u8]| {
//!     println!("{channel}: {payload:?}");
//! })?;
//! conn.publish("SENSOR_TEMP", b"21.5").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod dispatch;
mod error;
mod subscription;

pub use config::ConnectionConfig;
pub use connection::{Connection, LifecycleState};
pub use error::CastlineError;
pub use subscription::Subscription;

pub use castline_assembly::{self, AssemblerConfig};
pub use castline_protocol::{self, FragmentationPolicy};
pub use castline_registry::{
    self, ChannelPattern, Listener, ReceivedMessage, SubscriptionId, forward_bounded,
    forward_unbounded,
};
pub use castline_transport::{
    self, DatagramTransport, MemoryBus, MemoryTransport, MulticastTransport, TransportConfig,
};

pub mod prelude {
    pub use crate::{
        CastlineError, ChannelPattern, Connection, ConnectionConfig, FragmentationPolicy,
        Listener, ReceivedMessage, Subscription, TransportConfig, forward_bounded,
        forward_unbounded,
    };
}
