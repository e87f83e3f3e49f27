//! Fragment reassembly for Castline.
//!
//! Large messages arrive as independent fragment datagrams: unordered,
//! possibly duplicated, possibly lost, interleaved with fragments from other
//! senders. The [`FragmentAssembler`] demultiplexes them purely by
//! `(sender address, sequence)` and yields each completed payload exactly
//! once.
//!
//! # Lifecycle of one assembly
//!
//! ```text
//! first fragment ──→ [Pending] ──(all indices seen)──→ Complete (handed off)
//!                        │
//!                        ├──(header disagrees)──→ discarded
//!                        └──(staleness window)──→ evicted, nothing delivered
//! ```

mod assembler;
mod config;
mod error;
mod pending;

pub use assembler::{AssemblyKey, CompletedMessage, FragmentAssembler, Progress};
pub use config::AssemblerConfig;
pub use error::AssemblyError;
