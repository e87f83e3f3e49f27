/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A provider URL could not be parsed or names another provider.
    #[error("invalid transport url: {0}")]
    InvalidUrl(String),

    /// A configuration value is unusable (e.g. a non-multicast group).
    #[error("invalid transport config: {0}")]
    InvalidConfig(String),

    /// Opening or configuring a socket failed.
    #[error("bind failed: {0}")]
    BindFailed(#[source] std::io::Error),

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The transport was closed.
    #[error("transport closed")]
    Closed,
}
