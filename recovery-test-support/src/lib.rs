//! Fakes and fixtures shared by `recovery-core`'s and `recovery-tools`'s
//! test suites: an in-memory [`StorageClient`], a couple of small
//! [`RouteTable`] builders, and a canned [`NodeIterator`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use recovery_core::address::{Eid, GroupId, NodeAddress};
use recovery_core::iterator::{IterSequence, NodeIterator};
use recovery_core::key::{KeyId, Timestamp, ID_MAX, ID_MIN};
use recovery_core::range::HashRange;
use recovery_core::route::{RouteTable, RouteTableBuilder};
use recovery_core::storage::{
    IterRecord, LookupInfo, ReadChunk, ReadRequest, StorageClient, WriteAck, WriteRequest,
};
use recovery_errors::{internal_err, RecoveryResult};

/// A single stored object, keyed by `(address, key)`.
#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    timestamp: Timestamp,
    user_flags: u64,
}

/// How many times a scripted operation should fail before it's allowed to
/// succeed (or always fail, if `usize::MAX`).
#[derive(Debug, Default, Clone, Copy)]
struct FailScript {
    remaining: usize,
}

/// An in-memory [`StorageClient`] backed by a `HashMap`, with per-address
/// failure scripting so tests can exercise the retry/timeout-doubling paths
/// without a real network.
#[derive(Default)]
pub struct FakeStorageClient {
    objects: Mutex<HashMap<(NodeAddress, KeyId), Object>>,
    write_failures: Mutex<HashMap<NodeAddress, FailScript>>,
    read_failures: Mutex<HashMap<NodeAddress, FailScript>>,
    remove_failures: Mutex<HashMap<NodeAddress, FailScript>>,
    writes_seen: AtomicUsize,
}

impl FakeStorageClient {
    /// An empty store with no scripted failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an object directly, bypassing `write`.
    pub fn seed(&self, addr: &NodeAddress, key: KeyId, data: Vec<u8>, timestamp: Timestamp) {
        self.objects
            .lock()
            .insert((addr.clone(), key), Object { data, timestamp, user_flags: 0 });
    }

    /// Read back whatever is currently stored at `(addr, key)`, if anything.
    pub fn get(&self, addr: &NodeAddress, key: &KeyId) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .get(&(addr.clone(), key.clone()))
            .map(|o| o.data.clone())
    }

    /// Make every `write` to `addr` fail `times` times before succeeding.
    pub fn fail_writes(&self, addr: &NodeAddress, times: usize) {
        self.write_failures
            .lock()
            .insert(addr.clone(), FailScript { remaining: times });
    }

    /// Make every `read` from `addr` fail `times` times before succeeding.
    pub fn fail_reads(&self, addr: &NodeAddress, times: usize) {
        self.read_failures
            .lock()
            .insert(addr.clone(), FailScript { remaining: times });
    }

    /// Total number of `write` calls observed (including failed attempts).
    pub fn writes_seen(&self) -> usize {
        self.writes_seen.load(Ordering::SeqCst)
    }

    fn consume_failure(scripts: &Mutex<HashMap<NodeAddress, FailScript>>, addr: &NodeAddress) -> bool {
        let mut scripts = scripts.lock();
        let Some(script) = scripts.get_mut(addr) else {
            return false;
        };
        if script.remaining == 0 {
            return false;
        }
        script.remaining -= 1;
        true
    }
}

#[async_trait]
impl StorageClient for FakeStorageClient {
    async fn lookup(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        _timeout: Duration,
    ) -> RecoveryResult<Option<LookupInfo>> {
        Ok(self
            .objects
            .lock()
            .get(&(addr.clone(), key.clone()))
            .map(|o| LookupInfo {
                timestamp: o.timestamp,
                size: o.data.len() as u64,
            }))
    }

    async fn read(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: ReadRequest,
        _timeout: Duration,
    ) -> RecoveryResult<ReadChunk> {
        if Self::consume_failure(&self.read_failures, addr) {
            return Err(internal_err!("scripted read failure for {addr}"));
        }
        let objects = self.objects.lock();
        let object = objects
            .get(&(addr.clone(), key.clone()))
            .ok_or_else(|| internal_err!("no such object {key} at {addr}"))?;
        let total_size = object.data.len() as u64;
        let (offset, size) = if req.size == 0 {
            (0, total_size)
        } else {
            (req.offset, req.size)
        };
        let end = (offset + size).min(total_size);
        let data = object.data[offset as usize..end as usize].to_vec();
        Ok(ReadChunk {
            data,
            user_flags: object.user_flags,
            timestamp: object.timestamp,
            total_size,
        })
    }

    async fn write(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: &WriteRequest,
        _timeout: Duration,
    ) -> RecoveryResult<WriteAck> {
        self.writes_seen.fetch_add(1, Ordering::SeqCst);
        if Self::consume_failure(&self.write_failures, addr) {
            return Err(internal_err!("scripted write failure for {addr}"));
        }
        let (data, offset, user_flags) = match req {
            WriteRequest::Data { data, user_flags } => (data.clone(), 0, *user_flags),
            WriteRequest::Prepare { data, remote_offset, user_flags, .. } => (data.clone(), *remote_offset, *user_flags),
            WriteRequest::Plain { data, remote_offset, user_flags } => (data.clone(), *remote_offset, *user_flags),
            WriteRequest::Commit { data, remote_offset, user_flags, .. } => (data.clone(), *remote_offset, *user_flags),
        };
        let written = data.len() as u64;
        let mut objects = self.objects.lock();
        let entry = objects
            .entry((addr.clone(), key.clone()))
            .or_insert_with(|| Object {
                data: Vec::new(),
                timestamp: Timestamp::MIN,
                user_flags: 0,
            });
        let end = (offset as usize) + data.len();
        if entry.data.len() < end {
            entry.data.resize(end, 0);
        }
        entry.data[offset as usize..end].copy_from_slice(&data);
        entry.user_flags = user_flags;
        Ok(WriteAck { written })
    }

    async fn remove(&self, addr: &NodeAddress, key: &KeyId, _timeout: Duration) -> RecoveryResult<()> {
        if Self::consume_failure(&self.remove_failures, addr) {
            return Err(internal_err!("scripted remove failure for {addr}"));
        }
        self.objects.lock().remove(&(addr.clone(), key.clone()));
        Ok(())
    }
}

/// A routing table with one group and a single owner covering the whole
/// keyspace.
pub fn fixed_single_owner_table(group: GroupId, owner: NodeAddress) -> RouteTable {
    RouteTableBuilder::new()
        .with_range(group, ID_MIN, ID_MAX, owner)
        .build()
}

/// A routing table with one group split at `mid` between two owners.
pub fn split_owner_table(group: GroupId, mid: KeyId, low: NodeAddress, high: NodeAddress) -> RouteTable {
    RouteTableBuilder::new()
        .with_range(group, ID_MIN, mid, low)
        .with_range(group, mid, ID_MAX, high)
        .build()
}

/// A [`NodeIterator`] that always yields the same canned records, recording
/// the ranges it was asked to iterate for assertions.
pub struct FixedIterator {
    records: Vec<IterRecord>,
}

impl FixedIterator {
    /// Build an iterator that yields exactly `records` regardless of the
    /// requested ranges.
    pub fn new(records: Vec<IterRecord>) -> Self {
        FixedIterator { records }
    }
}

#[async_trait]
impl NodeIterator for FixedIterator {
    async fn iterate(
        &self,
        _addr: &NodeAddress,
        _eid: &Eid,
        ranges: &[HashRange],
        _ts_floor: Timestamp,
        _batch_size: usize,
        _tmp_dir: &Path,
    ) -> RecoveryResult<Option<IterSequence>> {
        if ranges.is_empty() {
            return Ok(Some(IterSequence::new(futures::stream::empty(), None)));
        }
        let records = self.records.clone();
        Ok(Some(IterSequence::new(futures::stream::iter(records), None)))
    }
}
