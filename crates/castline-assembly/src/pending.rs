//! State for one message being reassembled.

use std::time::Instant;

use castline_protocol::{Fragment, FragmentHeader};

/// Why a fragment could not be applied to an assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mismatch {
    TotalSize { expected: u32, got: u32 },
    FragmentCount { expected: u16, got: u16 },
    OutOfBounds,
}

/// Partially received message. Owned exclusively by the assembler.
#[derive(Debug)]
pub(crate) struct PendingAssembly {
    channel: Option<String>,
    total_payload_size: u32,
    fragment_count: u16,
    received: Vec<bool>,
    received_count: usize,
    buffer: Vec<u8>,
    first_seen: Instant,
}

impl PendingAssembly {
    /// Allocates a zeroed buffer of the declared size.
    pub(crate) fn new(header: &FragmentHeader, now: Instant) -> Self {
        Self {
            channel: None,
            total_payload_size: header.total_payload_size,
            fragment_count: header.fragment_count,
            received: vec![false; usize::from(header.fragment_count)],
            received_count: 0,
            buffer: vec![0; header.total_payload_size as usize],
            first_seen: now,
        }
    }

    pub(crate) fn first_seen(&self) -> Instant {
        self.first_seen
    }

    /// Copies the fragment's chunk into place and marks its index.
    ///
    /// A repeated index overwrites the same region and is not counted twice.
    pub(crate) fn write(&mut self, fragment: Fragment) -> Result<(), Mismatch> {
        let header = fragment.header;
        if header.total_payload_size != self.total_payload_size {
            return Err(Mismatch::TotalSize {
                expected: self.total_payload_size,
                got: header.total_payload_size,
            });
        }
        if header.fragment_count != self.fragment_count {
            return Err(Mismatch::FragmentCount {
                expected: self.fragment_count,
                got: header.fragment_count,
            });
        }

        let index = usize::from(header.fragment_index);
        let start = header.fragment_offset as usize;
        let end = start + fragment.payload.len();
        if index >= self.received.len() || end > self.buffer.len() {
            return Err(Mismatch::OutOfBounds);
        }

        self.buffer[start..end].copy_from_slice(&fragment.payload);
        if let Some(channel) = fragment.channel {
            self.channel.get_or_insert(channel);
        }
        if !self.received[index] {
            self.received[index] = true;
            self.received_count += 1;
        }
        Ok(())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.received_count == self.received.len()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Vec<u8>) {
        (self.channel, self.buffer)
    }
}
