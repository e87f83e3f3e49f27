//! The [`FragmentAssembler`]: keyed reassembly with eviction.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use castline_protocol::Fragment;
use tracing::{debug, trace};

use crate::pending::{Mismatch, PendingAssembly};
use crate::{AssemblerConfig, AssemblyError};

/// Identity of one fragmented message: who sent it and under which sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssemblyKey {
    pub source: SocketAddr,
    pub sequence: u32,
}

impl fmt::Display for AssemblyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.sequence)
    }
}

/// A fully reassembled message, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub source: SocketAddr,
    pub sequence: u32,
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Outcome of feeding one fragment to the assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The fragment was the last one missing.
    Complete(CompletedMessage),
    /// More fragments are needed.
    Pending,
    /// The message was already delivered; the fragment is a late duplicate.
    AlreadyDelivered,
}

/// Collects fragments into complete messages.
///
/// Not thread-safe by itself. The connection's receive task owns one and is
/// the only caller.
#[derive(Debug)]
pub struct FragmentAssembler {
    config: AssemblerConfig,
    pending: HashMap<AssemblyKey, PendingAssembly>,
    delivered: HashMap<AssemblyKey, Instant>,
}

impl FragmentAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
            delivered: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// Number of incomplete assemblies currently held.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &AssemblyKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Feeds one fragment received from `source`, using the current time.
    pub fn accept(
        &mut self,
        source: SocketAddr,
        fragment: Fragment,
    ) -> Result<Progress, AssemblyError> {
        self.accept_at(source, fragment, Instant::now())
    }

    /// Feeds one fragment with an explicit clock reading.
    ///
    /// Only the fragment's own key is checked for staleness here: an
    /// assembly whose window has elapsed is never completed by a late
    /// fragment, which starts a fresh assembly instead. Other stale entries
    /// wait for [`purge_expired_at`](Self::purge_expired_at).
    pub fn accept_at(
        &mut self,
        source: SocketAddr,
        fragment: Fragment,
        now: Instant,
    ) -> Result<Progress, AssemblyError> {
        let key = AssemblyKey {
            source,
            sequence: fragment.header.sequence,
        };
        self.expire_key(key, now);

        if self.delivered.contains_key(&key) {
            trace!(%key, index = fragment.header.fragment_index, "duplicate of delivered message");
            return Ok(Progress::AlreadyDelivered);
        }

        let size = fragment.header.total_payload_size as usize;
        if size > self.config.max_message_size {
            self.pending.remove(&key);
            return Err(AssemblyError::MessageTooLarge {
                key,
                size,
                max: self.config.max_message_size,
            });
        }

        let index = fragment.header.fragment_index;
        match self.pending.entry(key) {
            Entry::Occupied(mut occupied) => {
                if let Err(mismatch) = occupied.get_mut().write(fragment) {
                    occupied.remove();
                    debug!(%key, "discarding assembly after bad fragment");
                    return Err(mismatch_error(key, index, mismatch));
                }
                if !occupied.get().is_complete() {
                    return Ok(Progress::Pending);
                }
                let assembly = occupied.remove();
                self.finish(key, assembly, now)
            }
            Entry::Vacant(vacant) => {
                let mut assembly = PendingAssembly::new(&fragment.header, now);
                assembly
                    .write(fragment)
                    .map_err(|mismatch| mismatch_error(key, index, mismatch))?;
                if assembly.is_complete() {
                    return self.finish(key, assembly, now);
                }
                vacant.insert(assembly);
                trace!(%key, "started assembly");
                self.enforce_capacity(key);
                Ok(Progress::Pending)
            }
        }
    }

    /// Drops every assembly older than the staleness window.
    pub fn purge_expired(&mut self) -> Vec<AssemblyKey> {
        self.purge_expired_at(Instant::now())
    }

    /// Drops every assembly older than the staleness window as of `now`.
    ///
    /// Returns the keys of the evicted incomplete assemblies. Memory of
    /// delivered keys ages out on the same window.
    pub fn purge_expired_at(&mut self, now: Instant) -> Vec<AssemblyKey> {
        let staleness = self.config.staleness;
        let expired: Vec<AssemblyKey> = self
            .pending
            .iter()
            .filter(|(_, assembly)| now.saturating_duration_since(assembly.first_seen()) >= staleness)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            self.pending.remove(key);
            debug!(%key, "evicted stale assembly");
        }

        self.delivered
            .retain(|_, delivered_at| now.saturating_duration_since(*delivered_at) < staleness);

        expired
    }

    fn expire_key(&mut self, key: AssemblyKey, now: Instant) {
        let staleness = self.config.staleness;
        let is_stale = |since: Instant| now.saturating_duration_since(since) >= staleness;

        if self.pending.get(&key).is_some_and(|a| is_stale(a.first_seen())) {
            self.pending.remove(&key);
            debug!(%key, "evicted stale assembly");
        }
        if self.delivered.get(&key).is_some_and(|at| is_stale(*at)) {
            self.delivered.remove(&key);
        }
    }

    fn finish(
        &mut self,
        key: AssemblyKey,
        assembly: PendingAssembly,
        now: Instant,
    ) -> Result<Progress, AssemblyError> {
        let (channel, payload) = assembly.into_parts();
        let channel = channel.ok_or(AssemblyError::MissingChannel(key))?;
        self.delivered.insert(key, now);
        trace!(%key, %channel, size = payload.len(), "assembly complete");
        Ok(Progress::Complete(CompletedMessage {
            source: key.source,
            sequence: key.sequence,
            channel,
            payload,
        }))
    }

    fn enforce_capacity(&mut self, newest: AssemblyKey) {
        while self.pending.len() > self.config.max_pending {
            let oldest = self
                .pending
                .iter()
                .filter(|(key, _)| **key != newest)
                .min_by_key(|(_, assembly)| assembly.first_seen())
                .map(|(key, _)| *key);
            let Some(oldest) = oldest else {
                break;
            };
            self.pending.remove(&oldest);
            debug!(key = %oldest, "evicted oldest assembly at capacity");
        }
    }
}

impl Default for FragmentAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}

fn mismatch_error(key: AssemblyKey, index: u16, mismatch: Mismatch) -> AssemblyError {
    match mismatch {
        Mismatch::TotalSize { expected, got } => AssemblyError::InconsistentHeader {
            key,
            field: "total_payload_size",
            expected,
            got,
        },
        Mismatch::FragmentCount { expected, got } => AssemblyError::InconsistentHeader {
            key,
            field: "fragment_count",
            expected: u32::from(expected),
            got: u32::from(got),
        },
        Mismatch::OutOfBounds => AssemblyError::FragmentOutOfBounds { key, index },
    }
}
