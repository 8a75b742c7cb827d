//! The abstract `StorageClient` interface (spec.md §6). This crate only
//! defines the contract; the concrete storage client library, routing-table
//! acquisition, and node construction are explicitly out of scope
//! (spec.md §1) and are supplied by whoever embeds this crate.

use std::time::Duration;

use async_trait::async_trait;
use recovery_errors::RecoveryResult;

use crate::address::NodeAddress;
use crate::key::{KeyId, Timestamp};

/// The result of a direct lookup (spec.md §6 "lookup(key) direct").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupInfo {
    /// The timestamp of the replica found at the queried address.
    pub timestamp: Timestamp,
    /// The size, in bytes, of the replica found at the queried address.
    pub size: u64,
}

/// What portion of an object to read (spec.md §4.3 "READ").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Byte offset to start reading from.
    pub offset: u64,
    /// Number of bytes to read, or `0` to mean "the whole object"
    /// (only valid when `offset == 0`, i.e. the object isn't chunked).
    pub size: u64,
    /// Set on every chunk after the first one: a whole-object checksum
    /// can't validate a partial read, so the session is told not to try
    /// (spec.md §4.3 step 2, "set the no-checksum flag on the session").
    pub no_checksum: bool,
}

/// The response to a [`StorageClient::read`] call.
#[derive(Debug, Clone)]
pub struct ReadChunk {
    /// The bytes read.
    pub data: Vec<u8>,
    /// Opaque per-object flags, captured from the first chunk only.
    pub user_flags: u64,
    /// The authoritative timestamp of the object, as reported by the read
    /// response (may differ from the timestamp the iterator reported).
    pub timestamp: Timestamp,
    /// The authoritative total size of the object, as reported by the
    /// read response's io attributes (the iterator's size may be stale,
    /// spec.md §4.3).
    pub total_size: u64,
}

/// A write, in one of the four forms named by spec.md §4.3 "WRITE". Every
/// variant carries `user_flags`, captured from the holder's first
/// successful read chunk (spec.md §4.3 step 3) and forwarded unchanged on
/// every write of the same key so the owner's copy keeps the original
/// object's opaque flags.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    /// A whole, unchunked object.
    Data {
        /// The object's bytes.
        data: Vec<u8>,
        /// Opaque per-object flags carried forward from the read.
        user_flags: u64,
    },
    /// The first chunk of a chunked write.
    Prepare {
        /// This chunk's bytes.
        data: Vec<u8>,
        /// Offset on the remote object this chunk starts at.
        remote_offset: u64,
        /// The total size the remote object will have once fully written.
        prepared_size: u64,
        /// Opaque per-object flags carried forward from the read.
        user_flags: u64,
    },
    /// A middle chunk of a chunked write.
    Plain {
        /// This chunk's bytes.
        data: Vec<u8>,
        /// Offset on the remote object this chunk starts at.
        remote_offset: u64,
        /// Opaque per-object flags carried forward from the read.
        user_flags: u64,
    },
    /// The final chunk of a chunked write.
    Commit {
        /// This chunk's bytes.
        data: Vec<u8>,
        /// Offset on the remote object this chunk starts at.
        remote_offset: u64,
        /// The total size of the now-complete remote object.
        committed_size: u64,
        /// Opaque per-object flags carried forward from the read.
        user_flags: u64,
    },
}

impl WriteRequest {
    /// The number of bytes in this write's payload.
    pub fn len(&self) -> u64 {
        match self {
            WriteRequest::Data { data, .. }
            | WriteRequest::Prepare { data, .. }
            | WriteRequest::Plain { data, .. }
            | WriteRequest::Commit { data, .. } => data.len() as u64,
        }
    }

    /// Whether this write carries no payload (never true for a valid
    /// recovery write, but spelled out to satisfy `clippy::len_without_is_empty`).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAck {
    /// Number of bytes the backend confirms it wrote.
    pub written: u64,
}

/// One record produced by the iterator for a key present on a node within
/// the requested ranges and timestamp window (spec.md §3 "IterRecord").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterRecord {
    /// The key.
    pub key: KeyId,
    /// The key's timestamp as seen by the iterator (may be stale; see
    /// [`ReadChunk::timestamp`]).
    pub timestamp: Timestamp,
    /// The key's size as seen by the iterator (may be stale; see
    /// [`ReadChunk::total_size`]).
    pub size: u64,
}

/// The minimum interface this crate requires from the underlying storage
/// client library (spec.md §6). A direct call bypasses routing and targets
/// `addr` specifically ("direct session").
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Direct lookup of `key` on `addr`. `Ok(None)` means the key doesn't
    /// exist there.
    async fn lookup(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        timeout: Duration,
    ) -> RecoveryResult<Option<LookupInfo>>;

    /// Direct, possibly-partial read of `key` from `addr`.
    async fn read(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: ReadRequest,
        timeout: Duration,
    ) -> RecoveryResult<ReadChunk>;

    /// Routed write of `key` to `addr` (the key's rightful owner).
    async fn write(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: &WriteRequest,
        timeout: Duration,
    ) -> RecoveryResult<WriteAck>;

    /// Direct remove of `key` from `addr`.
    async fn remove(&self, addr: &NodeAddress, key: &KeyId, timeout: Duration) -> RecoveryResult<()>;
}
