//! Encoder-side size policy.

use serde::{Deserialize, Serialize};

use crate::{EncodeError, MAX_CHANNEL_LEN, SHORT_HEADER_LEN};

/// Smallest usable `max_unfragmented_size`: a one-byte payload on a
/// maximum-length channel still fits the short form, so every fragmented
/// payload is at least two bytes long.
pub const MIN_UNFRAGMENTED_SIZE: usize = SHORT_HEADER_LEN + MAX_CHANNEL_LEN + 1 + 1;

/// Decides when a message is split and how large each piece may be.
///
/// These are sender-side choices, not protocol limits: a receiver accepts
/// any well-formed datagram regardless of the sender's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentationPolicy {
    /// Largest encoded short datagram (header + channel + NUL + payload).
    /// Messages that would exceed it are fragmented.
    pub max_unfragmented_size: usize,

    /// Largest payload chunk carried by one fragment. The channel name on
    /// fragment 0 is not counted against it.
    pub max_fragment_payload: usize,
}

impl Default for FragmentationPolicy {
    fn default() -> Self {
        Self {
            max_unfragmented_size: 64_000,
            max_fragment_payload: 64_000,
        }
    }
}

impl FragmentationPolicy {
    /// A policy using one threshold for both limits.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            max_unfragmented_size: threshold,
            max_fragment_payload: threshold,
        }
    }

    /// Size of the short datagram for this channel and payload.
    pub fn short_size(channel_len: usize, payload_len: usize) -> usize {
        SHORT_HEADER_LEN + channel_len + 1 + payload_len
    }

    /// Returns `true` when the message fits in a single short datagram.
    pub fn fits_short(&self, channel_len: usize, payload_len: usize) -> bool {
        Self::short_size(channel_len, payload_len) <= self.max_unfragmented_size
    }

    /// Checks that the limits can encode every message.
    ///
    /// # Errors
    /// - [`EncodeError::InvalidPolicy`] below [`MIN_UNFRAGMENTED_SIZE`].
    /// - [`EncodeError::InvalidFragmentSize`] for a zero chunk size.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.max_unfragmented_size < MIN_UNFRAGMENTED_SIZE {
            return Err(EncodeError::InvalidPolicy {
                size: self.max_unfragmented_size,
                min: MIN_UNFRAGMENTED_SIZE,
            });
        }
        if self.max_fragment_payload == 0 {
            return Err(EncodeError::InvalidFragmentSize);
        }
        Ok(())
    }

    /// Largest payload that is always sent unfragmented, whatever the
    /// channel name.
    pub fn guaranteed_short_payload(&self) -> usize {
        self.max_unfragmented_size
            .saturating_sub(SHORT_HEADER_LEN + MAX_CHANNEL_LEN + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fits_short_counts_header_channel_and_terminator() {
        let policy = FragmentationPolicy::with_threshold(20);
        // 8 header + 4 channel + 1 NUL + 7 payload = 20
        assert!(policy.fits_short(4, 7));
        assert!(!policy.fits_short(4, 8));
    }

    #[test]
    fn test_guaranteed_short_payload_saturates() {
        let policy = FragmentationPolicy::with_threshold(100);
        assert_eq!(policy.guaranteed_short_payload(), 0);
    }

    #[test]
    fn test_validate_default_is_ok() {
        assert_eq!(FragmentationPolicy::default().validate(), Ok(()));
        assert_eq!(
            FragmentationPolicy::with_threshold(MIN_UNFRAGMENTED_SIZE).validate(),
            Ok(())
        );
    }

    #[test]
    fn test_validate_threshold_below_minimum_is_invalid() {
        assert_eq!(
            FragmentationPolicy::with_threshold(64).validate(),
            Err(EncodeError::InvalidPolicy {
                size: 64,
                min: MIN_UNFRAGMENTED_SIZE
            })
        );
    }

    #[test]
    fn test_validate_zero_fragment_payload_is_invalid() {
        let policy = FragmentationPolicy {
            max_fragment_payload: 0,
            ..FragmentationPolicy::default()
        };
        assert_eq!(policy.validate(), Err(EncodeError::InvalidFragmentSize));
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let policy: FragmentationPolicy =
            serde_json::from_str(r#"{ "max_fragment_payload": 1400 }"#)
                .expect("should parse");
        assert_eq!(policy.max_fragment_payload, 1400);
        assert_eq!(policy.max_unfragmented_size, 64_000);
    }
}
