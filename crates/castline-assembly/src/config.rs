//! Assembler limits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounds on the memory the assembler may hold for incomplete messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// How long an incomplete assembly may wait for its remaining
    /// fragments before it is dropped. Also how long a completed key is
    /// remembered so late duplicates are ignored.
    pub staleness: Duration,

    /// Largest `total_payload_size` accepted. Fragments declaring more are
    /// rejected before any buffer is allocated.
    pub max_message_size: usize,

    /// Most assemblies kept at once. When exceeded, the oldest is evicted.
    pub max_pending: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(5),
            max_message_size: 64 * 1024 * 1024,
            max_pending: 256,
        }
    }
}
