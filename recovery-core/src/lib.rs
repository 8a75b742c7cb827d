//! Merge and dump recovery for a single consistent-hash replica group.
//!
//! This crate owns the pure range algebra, the per-key state machine, and
//! the concurrency orchestration described across spec.md §§2-5; it is
//! deliberately silent on how a routing table or storage session is
//! actually acquired (spec.md §1, §6) — those are supplied by an embedder
//! such as `recovery-tools` through the [`storage::StorageClient`] and
//! [`iterator::NodeIterator`] traits.

pub mod address;
pub mod batch;
pub mod ctx;
pub mod dump;
pub mod iterator;
pub mod key;
pub mod node;
pub mod range;
pub mod route;
pub mod stats;
pub mod storage;
pub mod task;
pub mod worker_pool;

/// Re-exports of the types most callers need, so an embedder can pull in
/// the whole public surface with one `use recovery_core::prelude::*`
/// instead of naming each submodule.
pub mod prelude {
    pub use crate::address::{AddressFamily, Eid, GroupId, NodeAddress};
    pub use crate::ctx::Ctx;
    pub use crate::dump::{process_dump_across_groups, process_dump_file, run_dump_task, DumpRecord};
    pub use crate::iterator::{IterSequence, NodeIterator};
    pub use crate::key::{KeyId, Timestamp};
    pub use crate::range::{foreign_ranges, ForeignRangesResult, HashRange};
    pub use crate::route::{RouteTable, RouteTableBuilder};
    pub use crate::stats::RecoverStat;
    pub use crate::storage::{
        IterRecord, LookupInfo, ReadChunk, ReadRequest, StorageClient, WriteAck, WriteRequest,
    };
    pub use crate::task::{RecoveryTask, TaskOutcome, TaskState};
    pub use crate::worker_pool::run as run_merge;
}
