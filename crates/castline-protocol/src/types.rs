//! Datagram shapes and protocol constants.
//!
//! The constants here are fixed by the external protocol. Changing any of
//! them breaks interoperability with every other peer on the group.

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Leading marker of a short (single-datagram) message: ASCII `"LC02"`.
pub const SHORT_MAGIC: u32 = 0x4C43_3032;

/// Leading marker of a fragment datagram: ASCII `"LC03"`.
pub const FRAGMENT_MAGIC: u32 = 0x4C43_3033;

/// Longest channel name in bytes. With its NUL terminator the channel field
/// occupies at most 255 bytes.
pub const MAX_CHANNEL_LEN: usize = 254;

/// Bytes preceding the channel in a short datagram (magic + sequence).
pub const SHORT_HEADER_LEN: usize = 8;

/// Bytes preceding the channel/chunk in a fragment datagram.
pub const FRAGMENT_HEADER_LEN: usize = 20;

/// Upper bound on fragments per message, set by the 16-bit count field.
pub const MAX_FRAGMENTS: usize = u16::MAX as usize;

// ---------------------------------------------------------------------------
// ShortMessage
// ---------------------------------------------------------------------------

/// A logical message carried whole in one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Sender's sequence number for this message.
    pub sequence: u32,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// Fixed header fields shared by every fragment of one logical message.
///
/// `fragment_offset` and `fragment_index` vary per fragment; the other
/// fields are identical across the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentHeader {
    /// Sequence number shared by all fragments of the message.
    pub sequence: u32,
    /// Length of the reassembled payload (channel excluded).
    pub total_payload_size: u32,
    /// Byte offset of this fragment's chunk within the reassembled payload.
    pub fragment_offset: u32,
    /// Position of this fragment, `0..fragment_count`.
    pub fragment_index: u16,
    /// Number of fragments making up the message.
    pub fragment_count: u16,
}

/// One piece of a message too large for a single datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: FragmentHeader,
    /// Channel name; present only on fragment index 0.
    pub channel: Option<String>,
    /// This fragment's slice of the payload.
    pub payload: Vec<u8>,
}

impl Fragment {
    /// Returns `true` if this is the first fragment (the one carrying the
    /// channel name).
    pub fn is_first(&self) -> bool {
        self.header.fragment_index == 0
    }
}

// ---------------------------------------------------------------------------
// Packet
// ---------------------------------------------------------------------------

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// A complete message, ready for delivery.
    Short(ShortMessage),
    /// A fragment that must go through reassembly.
    Fragment(Fragment),
}

impl Packet {
    /// Sequence number carried by the datagram.
    pub fn sequence(&self) -> u32 {
        match self {
            Self::Short(msg) => msg.sequence,
            Self::Fragment(frag) => frag.header.sequence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_values_spell_lc02_and_lc03() {
        assert_eq!(&SHORT_MAGIC.to_be_bytes(), b"LC02");
        assert_eq!(&FRAGMENT_MAGIC.to_be_bytes(), b"LC03");
    }

    #[test]
    fn test_packet_sequence_reads_either_shape() {
        let short = Packet::Short(ShortMessage {
            channel: "odom".into(),
            sequence: 7,
            payload: vec![],
        });
        let frag = Packet::Fragment(Fragment {
            header: FragmentHeader {
                sequence: 9,
                total_payload_size: 4,
                fragment_offset: 0,
                fragment_index: 0,
                fragment_count: 2,
            },
            channel: Some("big".into()),
            payload: vec![1, 2],
        });
        assert_eq!(short.sequence(), 7);
        assert_eq!(frag.sequence(), 9);
    }
}
