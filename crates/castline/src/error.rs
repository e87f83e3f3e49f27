//! Unified error type for Castline.

use castline_protocol::EncodeError;
use castline_registry::RegistryError;
use castline_transport::TransportError;

/// Every error a [`Connection`](crate::Connection) call can return.
///
/// Malformed or hostile datagrams never show up here: the receive path
/// drops them and logs at `debug`.
#[derive(Debug, thiserror::Error)]
pub enum CastlineError {
    /// The message could not be encoded (bad channel name, too many
    /// fragments).
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Opening, sending on or closing the transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A subscription pattern was rejected.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The operation needs a connected connection.
    #[error("connection is not connected")]
    NotConnected,

    /// `connect` was called twice.
    #[error("connection is already connected")]
    AlreadyConnected,

    /// `connect` was called after `disconnect`.
    #[error("connection was disconnected and cannot be reused")]
    NotReusable,
}
