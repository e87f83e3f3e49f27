//! Wire protocol for Castline.
//!
//! This crate defines the bytes that travel between peers:
//!
//! - **Types** ([`ShortMessage`], [`Fragment`], [`Packet`]) — the two
//!   datagram shapes and their decoded form.
//! - **Codec** ([`WireCodec`], [`encode_fragments`], [`decode`]) — pure
//!   conversion between those types and datagrams. No sockets, no state.
//! - **Policy** ([`FragmentationPolicy`]) — when to split a message and how
//!   large each piece may be.
//! - **Errors** ([`EncodeError`], [`DecodeError`]).
//!
//! # Wire format
//!
//! All multi-byte integers are big-endian.
//!
//! ```text
//! short:    "LC02" | sequence u32 | channel \0 | payload
//! fragment: "LC03" | sequence u32 | total u32 | offset u32 | index u16 | count u16
//!           | channel \0 (index 0 only) | chunk
//! ```
//!
//! # Architecture
//!
//! ```text
//! Transport (datagrams) → Protocol (Packet) → Assembly / Registry (messages)
//! ```

mod codec;
mod error;
mod policy;
mod types;

pub use codec::{decode, encode_fragments, WireCodec};
pub use error::{DecodeError, EncodeError};
pub use policy::{FragmentationPolicy, MIN_UNFRAGMENTED_SIZE};
pub use types::{
    Fragment, FragmentHeader, Packet, ShortMessage, FRAGMENT_HEADER_LEN,
    FRAGMENT_MAGIC, MAX_CHANNEL_LEN, MAX_FRAGMENTS, SHORT_HEADER_LEN,
    SHORT_MAGIC,
};
