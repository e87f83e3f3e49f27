//! Error types for the assembly layer.
//!
//! All of these describe a misbehaving (or malicious) sender. The receive
//! path logs them and carries on; the offending assembly is discarded.

use crate::AssemblyKey;

/// Reasons a fragment was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssemblyError {
    /// A fragment disagrees with earlier fragments of the same message.
    #[error("inconsistent {field} for {key}: expected {expected}, got {got}")]
    InconsistentHeader {
        key: AssemblyKey,
        field: &'static str,
        expected: u32,
        got: u32,
    },

    /// The declared message size exceeds the configured limit.
    #[error("message {key} declares {size} bytes, limit is {max}")]
    MessageTooLarge {
        key: AssemblyKey,
        size: usize,
        max: usize,
    },

    /// The fragment's index or byte range lies outside the message.
    #[error("fragment {index} of {key} lies outside the message")]
    FragmentOutOfBounds { key: AssemblyKey, index: u16 },

    /// Every fragment arrived but none carried the channel name.
    #[error("message {0} completed without a channel name")]
    MissingChannel(AssemblyKey),
}
