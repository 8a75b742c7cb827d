//! The read-only run configuration (spec.md §3 "Context (Ctx)").

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::address::{GroupId, NodeAddress};
use crate::key::Timestamp;
use crate::route::RouteTable;

/// Immutable configuration shared (by reference) across an entire run.
/// Never mutated by the core; every field here corresponds 1:1 to a field
/// named in spec.md §3.
pub struct Ctx {
    /// Byte threshold above which an object is read/written in chunks
    /// (spec.md §4.3 "chunked").
    pub chunk_size: u64,
    /// Number of iterator records per `BatchRunner` batch.
    pub batch_size: usize,
    /// Maximum attempts per storage operation before it's marked failed.
    pub attempts: u32,
    /// Initial per-call session timeout; doubles on each retry.
    pub wait_timeout: Duration,
    /// Suppress all remove operations.
    pub safe: bool,
    /// Suppress all mutating operations (read, write, remove); lookups
    /// still happen when `check` is set.
    pub dry_run: bool,
    /// Directory the iterator spills enumeration results to.
    pub tmp_dir: PathBuf,
    /// Lower bound of the iterator's timestamp window.
    pub timestamp_floor: Timestamp,
    /// Maximum number of concurrent worker-pool workers.
    pub nprocess: usize,
    /// If set, restrict a merge run to this single node (spec.md §4.1,
    /// §4.6).
    pub one_node: Option<NodeAddress>,
    /// This process's own contact address, used to bootstrap a storage
    /// node handle.
    pub address: NodeAddress,
    /// Bootstrap remotes for the storage client.
    pub remotes: Vec<NodeAddress>,
    /// Groups to process.
    pub groups: Vec<GroupId>,
    /// The routing table for every group in `groups`.
    pub routes: Arc<RouteTable>,
    /// Where to publish metrics, if anywhere.
    pub monitor: Option<SocketAddr>,
    /// Log file path, if logging to a file rather than stderr.
    pub log_file: Option<PathBuf>,
    /// `tracing`/`RUST_LOG`-style log level filter.
    pub log_level: String,
    /// The dump file, only used by dump recovery (spec.md §4.7).
    pub dump_file: Option<PathBuf>,
}

impl Ctx {
    /// Groups to process this run (spec.md §4.6). When `one_node` is set,
    /// the CLI layer is responsible for having already narrowed `groups`
    /// down to the one group that node belongs to.
    pub fn effective_groups(&self) -> &[GroupId] {
        &self.groups
    }
}
