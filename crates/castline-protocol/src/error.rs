//! Error types for the protocol layer.
//!
//! Encoding errors are caller mistakes and surface from `publish`.
//! Decoding errors describe bytes received from the network; the receive
//! path logs them and drops the datagram.

/// Errors raised while turning a message into datagrams.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The channel name exceeds the protocol's length limit.
    #[error("channel name is {len} bytes, limit is {max}")]
    ChannelTooLong { len: usize, max: usize },

    /// The channel name contains a NUL byte, which terminates the field on
    /// the wire.
    #[error("channel name contains a NUL byte")]
    ChannelContainsNul,

    /// The encoded message exceeds the configured size limit.
    #[error("encoded message is {size} bytes, limit is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Fragmentation was requested for an empty payload.
    #[error("cannot fragment an empty payload")]
    PayloadEmpty,

    /// The payload is too short to split into the two fragments a
    /// fragmented message requires.
    #[error("a {size}-byte payload cannot be split into two fragments")]
    TooFewFragments { size: usize },

    /// The payload would need more fragments than the count field holds.
    #[error("payload needs {count} fragments, limit is {max}")]
    TooManyFragments { count: usize, max: usize },

    /// The fragment size limit is zero.
    #[error("maximum fragment payload must be at least one byte")]
    InvalidFragmentSize,

    /// The policy's short-datagram limit is too small to carry a minimal
    /// message on the longest channel.
    #[error("max_unfragmented_size is {size} bytes, must be at least {min}")]
    InvalidPolicy { size: usize, min: usize },
}

/// Errors raised while interpreting a received datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The leading marker is neither the short nor the fragment magic.
    #[error("unknown magic {0:#010x}")]
    UnknownMagic(u32),

    /// The datagram ends before a declared field does.
    #[error("datagram truncated: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The channel field is unterminated, too long, or not UTF-8.
    #[error("malformed channel: {0}")]
    MalformedChannel(&'static str),

    /// Fragment header fields contradict each other.
    #[error("invalid fragment: {0}")]
    InvalidFragment(String),
}
