//! A local-filesystem-backed [`StorageClient`] and [`NodeIterator`].
//!
//! spec.md §1 puts the concrete storage client library, the iterator
//! implementation, and the elliptics node construction out of scope for
//! `recovery-core`, treating them as external collaborators behind the
//! `StorageClient`/`NodeIterator` traits. `recovery-tools` is that
//! embedder, and this module is the one storage backend it ships: each
//! node address gets a subdirectory of `--storage-root`, each key a file
//! inside it plus a small JSON sidecar carrying the key's timestamp and
//! user flags. It exists so the CLI can actually move bytes around on a
//! single machine (tests, demos, small fixed-topology clusters) without
//! pulling in a real distributed storage client.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use recovery_errors::{internal_err, RecoveryError, RecoveryResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

use recovery_core::address::{Eid, NodeAddress};
use recovery_core::iterator::{IterSequence, NodeIterator};
use recovery_core::key::{KeyId, Timestamp};
use recovery_core::range::HashRange;
use recovery_core::storage::{IterRecord, LookupInfo, ReadChunk, ReadRequest, StorageClient, WriteAck, WriteRequest};

/// Root directory under which every node address gets its own
/// subdirectory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sidecar {
    timestamp: u64,
    user_flags: u64,
}

impl FsBackend {
    /// Use `root` as the storage root, creating it if necessary.
    pub fn new(root: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(FsBackend { root })
    }

    fn addr_dir(&self, addr: &NodeAddress) -> PathBuf {
        self.root.join(sanitize(&addr.to_string()))
    }

    fn data_path(&self, addr: &NodeAddress, key: &KeyId) -> PathBuf {
        self.addr_dir(addr).join(key.to_string())
    }

    fn meta_path(&self, addr: &NodeAddress, key: &KeyId) -> PathBuf {
        self.addr_dir(addr).join(format!("{key}.meta"))
    }

    fn read_sidecar(&self, addr: &NodeAddress, key: &KeyId) -> std::io::Result<Option<Sidecar>> {
        match std::fs::read(self.meta_path(addr, key)) {
            Ok(bytes) => Ok(Some(
                serde_json::from_slice(&bytes).expect("sidecar written by this backend is valid JSON"),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn sanitize(addr: &str) -> String {
    addr.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

#[async_trait]
impl StorageClient for FsBackend {
    async fn lookup(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        _timeout: Duration,
    ) -> RecoveryResult<Option<LookupInfo>> {
        let this = self.clone();
        let addr = addr.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            let Some(sidecar) = this
                .read_sidecar(&addr, &key)
                .map_err(|e| RecoveryError::storage(&addr, e))?
            else {
                return Ok(None);
            };
            let size = std::fs::metadata(this.data_path(&addr, &key))
                .map_err(|e| RecoveryError::storage(&addr, e))?
                .len();
            Ok(Some(LookupInfo {
                timestamp: Timestamp(sidecar.timestamp),
                size,
            }))
        })
        .await
        .map_err(|e| internal_err!("lookup task panicked: {e}"))?
    }

    async fn read(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: ReadRequest,
        _timeout: Duration,
    ) -> RecoveryResult<ReadChunk> {
        let this = self.clone();
        let addr = addr.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            let sidecar = this
                .read_sidecar(&addr, &key)
                .map_err(|e| RecoveryError::storage(&addr, e))?
                .ok_or_else(|| internal_err!("no such object {key} at {addr}"))?;
            let mut file =
                std::fs::File::open(this.data_path(&addr, &key)).map_err(|e| RecoveryError::storage(&addr, e))?;
            let total_size = file.metadata().map_err(|e| RecoveryError::storage(&addr, e))?.len();

            let (offset, size) = if req.size == 0 {
                (0, total_size)
            } else {
                (req.offset, req.size)
            };
            file.seek(SeekFrom::Start(offset)).map_err(|e| RecoveryError::storage(&addr, e))?;
            let mut data = vec![0u8; (size.min(total_size.saturating_sub(offset))) as usize];
            file.read_exact(&mut data).map_err(|e| RecoveryError::storage(&addr, e))?;

            Ok(ReadChunk {
                data,
                user_flags: sidecar.user_flags,
                timestamp: Timestamp(sidecar.timestamp),
                total_size,
            })
        })
        .await
        .map_err(|e| internal_err!("read task panicked: {e}"))?
    }

    async fn write(
        &self,
        addr: &NodeAddress,
        key: &KeyId,
        req: &WriteRequest,
        _timeout: Duration,
    ) -> RecoveryResult<WriteAck> {
        let this = self.clone();
        let addr = addr.clone();
        let key = key.clone();
        let req = req.clone();
        tokio::task::spawn_blocking(move || {
            let dir = this.addr_dir(&addr);
            std::fs::create_dir_all(&dir).map_err(|e| RecoveryError::storage(&addr, e))?;

            let (data, offset, committed, user_flags) = match &req {
                WriteRequest::Data { data, user_flags } => (data, 0, true, *user_flags),
                WriteRequest::Prepare { data, remote_offset, user_flags, .. } => (data, *remote_offset, false, *user_flags),
                WriteRequest::Plain { data, remote_offset, user_flags } => (data, *remote_offset, false, *user_flags),
                WriteRequest::Commit { data, remote_offset, user_flags, .. } => (data, *remote_offset, true, *user_flags),
            };

            let path = this.data_path(&addr, &key);
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(offset == 0)
                .open(&path)
                .map_err(|e| RecoveryError::storage(&addr, e))?;
            file.seek(SeekFrom::Start(offset)).map_err(|e| RecoveryError::storage(&addr, e))?;
            file.write_all(data).map_err(|e| RecoveryError::storage(&addr, e))?;

            if committed {
                let sidecar = Sidecar {
                    timestamp: current_timestamp_placeholder(),
                    user_flags,
                };
                std::fs::write(
                    this.meta_path(&addr, &key),
                    serde_json::to_vec(&sidecar).expect("sidecar serializes"),
                )
                .map_err(|e| RecoveryError::storage(&addr, e))?;
            }

            Ok(WriteAck {
                written: data.len() as u64,
            })
        })
        .await
        .map_err(|e| internal_err!("write task panicked: {e}"))?
    }

    async fn remove(&self, addr: &NodeAddress, key: &KeyId, _timeout: Duration) -> RecoveryResult<()> {
        let this = self.clone();
        let addr = addr.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            for path in [this.data_path(&addr, &key), this.meta_path(&addr, &key)] {
                if let Err(e) = std::fs::remove_file(&path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(RecoveryError::storage(&addr, e));
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| internal_err!("remove task panicked: {e}"))?
    }
}

/// The write path never learns the original object's timestamp (it isn't
/// part of any `WriteRequest` variant, matching the real write API this
/// mirrors), so a freshly-written object's sidecar timestamp is stamped as
/// "now" here. Recovery only cares that the owner's copy compares `>=` the
/// source it was moved from, which holds for any monotonic stamp assigned
/// at write time.
fn current_timestamp_placeholder() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl NodeIterator for FsBackend {
    async fn iterate(
        &self,
        addr: &NodeAddress,
        _eid: &Eid,
        ranges: &[HashRange],
        ts_floor: Timestamp,
        _batch_size: usize,
        tmp_dir: &Path,
    ) -> RecoveryResult<Option<IterSequence>> {
        let this = self.clone();
        let addr = addr.clone();
        let ranges = ranges.to_vec();
        let tmp_dir = tmp_dir.to_path_buf();

        let result = tokio::task::spawn_blocking(move || scan(&this, &addr, &ranges, ts_floor, &tmp_dir))
            .await
            .map_err(|e| internal_err!("iterate task panicked: {e}"))?;

        match result {
            Ok(records) => {
                debug!(%addr, count = records.len(), "scanned local storage backend");
                Ok(Some(IterSequence::new(futures::stream::iter(records), None)))
            }
            Err(e) => {
                tracing::warn!(%addr, error = %e, "local storage backend scan failed");
                Ok(None)
            }
        }
    }
}

fn scan(
    backend: &FsBackend,
    addr: &NodeAddress,
    ranges: &[HashRange],
    ts_floor: Timestamp,
    _tmp_dir: &Path,
) -> std::io::Result<Vec<IterRecord>> {
    let dir = backend.addr_dir(addr);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.ends_with(".meta") {
            continue;
        }
        let Ok(key) = name.parse::<KeyId>() else { continue };
        if !ranges.iter().any(|r| r.contains(&key)) {
            continue;
        }
        let Some(sidecar) = backend.read_sidecar(addr, &key)? else {
            continue;
        };
        if sidecar.timestamp < ts_floor.0 {
            continue;
        }
        let size = entry.metadata()?.len();
        records.push(IterRecord {
            key,
            timestamp: Timestamp(sidecar.timestamp),
            size,
        });
    }
    Ok(records)
}
