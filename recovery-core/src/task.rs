//! The per-key recovery state machine (spec.md §4.3 "RecoveryTask").

use recovery_errors::{internal_err, RecoveryResult};
use recovery_util::backoff::RetryBudget;
use tracing::{debug, trace, warn};

use crate::address::{GroupId, NodeAddress};
use crate::ctx::Ctx;
use crate::key::{KeyId, Timestamp};
use crate::stats::RecoverStat;
use crate::storage::{ReadRequest, StorageClient, WriteRequest};

/// The terminal or in-progress state of a [`RecoveryTask`], tracked
/// explicitly so logging, tests, and the driver itself can all observe
/// exactly where a task is — the "explicit enumerated state" spec.md §9
/// calls for in place of the source's callback-chain state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not yet started.
    New,
    /// Resolving the key's rightful owner.
    ResolveOwner,
    /// Checking whether the owner already holds a copy.
    Lookup,
    /// Reading a chunk (or the whole object) from the holder.
    Read,
    /// Writing a chunk (or the whole object) to the owner.
    Write,
    /// Removing the key from the holder.
    Remove,
    /// The key was already at its rightful owner; no I/O was issued beyond
    /// the routing lookup.
    Skipped,
    /// Completed successfully (moved, or removed because the owner already
    /// had a newer copy, or safe mode suppressed the terminal remove).
    Done,
    /// `ctx.dry_run` suppressed all mutating operations past the lookup.
    DoneDryRun,
    /// A storage operation exhausted its retry budget.
    Failed,
}

/// The outcome of running a [`RecoveryTask`] to completion.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// The terminal state reached.
    pub state: TaskState,
    /// Whether the task's own work succeeded. `false` whenever any
    /// operation exhausted its retries; a failed task still reports
    /// accurate statistics (spec.md §7).
    pub result: bool,
    /// Statistics accumulated by this task alone.
    pub stats: RecoverStat,
}

/// Moves (or deletes) one key, per spec.md §4.3. Construct with
/// [`RecoveryTask::for_merge`] or [`RecoveryTask::for_dump`], then
/// [`run`](RecoveryTask::run) it to completion; a task is consumed by
/// running it and cannot be reused.
pub struct RecoveryTask<'a, S: StorageClient> {
    key: KeyId,
    key_timestamp: Timestamp,
    size: u64,
    src: NodeAddress,
    group: GroupId,
    check: bool,
    ctx: &'a Ctx,
    storage: &'a S,
}

impl<'a, S: StorageClient> RecoveryTask<'a, S> {
    /// Construct a task for merge recovery: the holder is checked against
    /// the owner first (`check = true`), per spec.md §4.3.
    pub fn for_merge(
        key: KeyId,
        key_timestamp: Timestamp,
        size: u64,
        src: NodeAddress,
        group: GroupId,
        ctx: &'a Ctx,
        storage: &'a S,
    ) -> Self {
        RecoveryTask {
            key,
            key_timestamp,
            size,
            src,
            group,
            check: false,
            ctx,
            storage,
        }
        .with_check(true)
    }

    /// Construct a task for dump recovery: the caller (`DumpTask`) has
    /// already established that `src` is authoritative, so the owner is
    /// never consulted first (`check = false`), per spec.md §9's resolution
    /// of the `check == false` overwrite question.
    pub fn for_dump(
        key: KeyId,
        key_timestamp: Timestamp,
        size: u64,
        src: NodeAddress,
        group: GroupId,
        ctx: &'a Ctx,
        storage: &'a S,
    ) -> Self {
        RecoveryTask {
            key,
            key_timestamp,
            size,
            src,
            group,
            check: false,
            ctx,
            storage,
        }
    }

    fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Run this task to completion.
    pub async fn run(self) -> RecoveryResult<TaskOutcome> {
        let mut stats = RecoverStat::default();

        trace!(key = %self.key, state = ?TaskState::ResolveOwner, "recovery task starting");
        let dst = self
            .ctx
            .routes
            .lookup_address(&self.key, self.group)
            .ok_or_else(|| internal_err!("no owner for key {} in group {}", self.key, self.group))?;

        if dst == self.src {
            stats.skipped += 1;
            debug!(key = %self.key, "key already at rightful owner, skipping");
            return Ok(TaskOutcome {
                state: TaskState::Skipped,
                result: true,
                stats,
            });
        }

        let mut just_remove = false;
        if self.check {
            debug!(key = %self.key, dst = %dst, state = ?TaskState::Lookup, "checking owner");
            match self.storage.lookup(&dst, &self.key, self.ctx.wait_timeout).await {
                Ok(Some(info)) if info.timestamp > self.key_timestamp => {
                    just_remove = true;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %self.key, error = %e, "owner lookup failed, proceeding as if absent");
                }
            }
        }

        if self.ctx.dry_run {
            debug!(key = %self.key, "dry run, stopping after lookup");
            return Ok(TaskOutcome {
                state: TaskState::DoneDryRun,
                result: true,
                stats,
            });
        }

        if !just_remove {
            match self.recover_data(&dst, &mut stats).await? {
                true => {}
                false => {
                    return Ok(TaskOutcome {
                        state: TaskState::Failed,
                        result: false,
                        stats,
                    });
                }
            }
        }

        if self.ctx.safe {
            debug!(key = %self.key, "safe mode, skipping remove");
            return Ok(TaskOutcome {
                state: TaskState::Done,
                result: true,
                stats,
            });
        }

        let result = self.remove_from_holder(&mut stats).await;
        if just_remove && !result {
            stats.merged_indexes_failed += 1;
        }
        Ok(TaskOutcome {
            state: TaskState::Done,
            result,
            stats,
        })
    }

    /// READ/WRITE loop until the whole object has moved to `dst`. Returns
    /// `Ok(false)` (without issuing a REMOVE) if a READ or WRITE exhausts
    /// its retries.
    async fn recover_data(&self, dst: &NodeAddress, stats: &mut RecoverStat) -> RecoveryResult<bool> {
        let chunked = self.size > self.ctx.chunk_size;
        let mut recovered_size = 0u64;
        let mut total_size = self.size;
        let mut issued_prepare = false;
        let mut user_flags = 0u64;
        let mut authoritative_timestamp = self.key_timestamp;

        loop {
            let read_size = if chunked {
                (total_size - recovered_size).min(self.ctx.chunk_size)
            } else {
                0
            };
            // Only the first chunk can be checked against a whole-object
            // checksum; every chunk after it sets the no-checksum flag
            // (spec.md §4.3 step 2).
            let no_checksum = recovered_size > 0;

            trace!(key = %self.key, offset = recovered_size, size = read_size, state = ?TaskState::Read, "reading chunk");
            let chunk = match self
                .read_with_retries(recovered_size, read_size, no_checksum, stats)
                .await?
            {
                Some(c) => c,
                None => return Ok(false),
            };

            if recovered_size == 0 {
                if chunk.total_size > 0 {
                    total_size = chunk.total_size;
                }
                user_flags = chunk.user_flags;
                authoritative_timestamp = chunk.timestamp;
                trace!(key = %self.key, user_flags, timestamp = %authoritative_timestamp, "captured authoritative flags from first chunk");
            }

            let write_size = chunk.data.len() as u64;
            let req = if !chunked {
                WriteRequest::Data { data: chunk.data, user_flags }
            } else if recovered_size == 0 {
                issued_prepare = true;
                WriteRequest::Prepare {
                    data: chunk.data,
                    remote_offset: 0,
                    prepared_size: total_size,
                    user_flags,
                }
            } else if recovered_size + write_size < total_size {
                WriteRequest::Plain {
                    data: chunk.data,
                    remote_offset: recovered_size,
                    user_flags,
                }
            } else {
                WriteRequest::Commit {
                    data: chunk.data,
                    remote_offset: recovered_size,
                    committed_size: total_size,
                    user_flags,
                }
            };

            trace!(key = %self.key, state = ?TaskState::Write, "writing chunk");
            if !self.write_with_retries(dst, req, stats).await? {
                return Ok(false);
            }

            recovered_size += write_size;
            if recovered_size >= total_size {
                debug_assert!(!chunked || issued_prepare, "chunked write never issued a prepare");
                return Ok(true);
            }
        }
    }

    async fn read_with_retries(
        &self,
        offset: u64,
        size: u64,
        no_checksum: bool,
        stats: &mut RecoverStat,
    ) -> RecoveryResult<Option<crate::storage::ReadChunk>> {
        let mut budget = RetryBudget::new(self.ctx.wait_timeout, self.ctx.attempts);
        loop {
            match self
                .storage
                .read(&self.src, &self.key, ReadRequest { offset, size, no_checksum }, budget.timeout())
                .await
            {
                Ok(chunk) => {
                    stats.read += 1;
                    stats.read_bytes += chunk.data.len() as u64;
                    return Ok(Some(chunk));
                }
                Err(e) => {
                    if budget.record_failure() {
                        stats.read_retries += 1;
                        warn!(key = %self.key, attempt = budget.attempt(), error = %e, "read failed, retrying");
                    } else {
                        stats.read_failed += 1;
                        warn!(key = %self.key, error = %e, "read exhausted retries");
                        return Ok(None);
                    }
                }
            }
        }
    }

    async fn write_with_retries(
        &self,
        dst: &NodeAddress,
        req: WriteRequest,
        stats: &mut RecoverStat,
    ) -> RecoveryResult<bool> {
        let mut budget = RetryBudget::new(self.ctx.wait_timeout, self.ctx.attempts);
        let len = req.len();
        loop {
            match self.storage.write(dst, &self.key, &req, budget.timeout()).await {
                Ok(_ack) => {
                    stats.write += 1;
                    stats.written_bytes += len;
                    return Ok(true);
                }
                Err(e) => {
                    if budget.record_failure() {
                        stats.write_retries += 1;
                        warn!(key = %self.key, attempt = budget.attempt(), error = %e, "write failed, retrying");
                    } else {
                        stats.write_failed += 1;
                        warn!(key = %self.key, error = %e, "write exhausted retries");
                        return Ok(false);
                    }
                }
            }
        }
    }

    async fn remove_from_holder(&self, stats: &mut RecoverStat) -> bool {
        let mut budget = RetryBudget::new(self.ctx.wait_timeout, self.ctx.attempts);
        loop {
            match self.storage.remove(&self.src, &self.key, budget.timeout()).await {
                Ok(()) => {
                    stats.removed += 1;
                    return true;
                }
                Err(e) => {
                    if budget.record_failure() {
                        stats.remove_retries += 1;
                        warn!(key = %self.key, attempt = budget.attempt(), error = %e, "remove failed, retrying");
                    } else {
                        stats.remove_failed += 1;
                        warn!(key = %self.key, error = %e, "remove exhausted retries");
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use recovery_test_support::{fixed_single_owner_table, FakeStorageClient};

    use super::*;
    use crate::address::AddressFamily;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::new(
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, n)),
            1025,
            AddressFamily::Inet,
        )
    }

    fn key(byte: u8) -> KeyId {
        let mut bytes = [0u8; 64];
        bytes[0] = byte;
        KeyId::from_bytes(bytes)
    }

    fn ctx(routes: Arc<crate::route::RouteTable>, chunk_size: u64, attempts: u32) -> Ctx {
        Ctx {
            chunk_size,
            batch_size: 100,
            attempts,
            wait_timeout: Duration::from_millis(10),
            safe: false,
            dry_run: false,
            tmp_dir: PathBuf::from("/tmp"),
            timestamp_floor: Timestamp::MIN,
            nprocess: 1,
            one_node: None,
            address: addr(1),
            remotes: vec![],
            groups: vec![GroupId(1)],
            routes,
            monitor: None,
            log_file: None,
            log_level: "info".to_string(),
            dump_file: None,
        }
    }

    /// spec.md §8 scenario 1: the key is already at its rightful owner.
    #[tokio::test]
    async fn already_in_place_skips_with_no_io() {
        let owner = addr(1);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 1 << 20, 3);
        let storage = FakeStorageClient::new();
        storage.seed(&owner, key(1), b"payload".to_vec(), Timestamp(1));

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(1), 7, owner.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Skipped);
        assert!(outcome.result);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.read, 0);
        assert_eq!(outcome.stats.write, 0);
        assert_eq!(outcome.stats.removed, 0);
        assert_eq!(storage.writes_seen(), 0);
    }

    /// spec.md §8 scenario 2: the owner already holds a strictly newer copy.
    #[tokio::test]
    async fn owner_has_newer_only_removes_from_holder() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 1 << 20, 3);
        let storage = FakeStorageClient::new();
        storage.seed(&holder, key(1), b"stale".to_vec(), Timestamp(100));
        storage.seed(&owner, key(1), b"fresher".to_vec(), Timestamp(200));

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(100), 5, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.removed, 1);
        assert_eq!(outcome.stats.read, 0);
        assert_eq!(outcome.stats.write, 0);
        assert!(storage.get(&holder, &key(1)).is_none());
        assert_eq!(storage.get(&owner, &key(1)), Some(b"fresher".to_vec()));
    }

    /// spec.md §8 scenario 2 (safe-mode variant): no REMOVE is ever issued.
    #[tokio::test]
    async fn owner_has_newer_safe_mode_issues_no_remove() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let mut ctx = ctx(routes, 1 << 20, 3);
        ctx.safe = true;
        let storage = FakeStorageClient::new();
        storage.seed(&holder, key(1), b"stale".to_vec(), Timestamp(100));
        storage.seed(&owner, key(1), b"fresher".to_vec(), Timestamp(200));

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(100), 5, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.removed, 0);
        assert!(storage.get(&holder, &key(1)).is_some());
    }

    /// spec.md §8 scenario 3: owner missing, object smaller than chunk_size.
    #[tokio::test]
    async fn small_object_moves_whole_in_one_shot() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 65536, 3);
        let storage = FakeStorageClient::new();
        let payload = vec![7u8; 1024];
        storage.seed(&holder, key(1), payload.clone(), Timestamp(1));

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(1), 1024, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.read, 1);
        assert_eq!(outcome.stats.write, 1);
        assert_eq!(outcome.stats.read_bytes, 1024);
        assert_eq!(outcome.stats.written_bytes, 1024);
        assert_eq!(outcome.stats.removed, 1);
        assert_eq!(storage.get(&owner, &key(1)), Some(payload));
        assert!(storage.get(&holder, &key(1)).is_none());
    }

    /// spec.md §8 scenario 4: owner missing, object spans three chunks
    /// (200KB total over an 80KB chunk size: 80K prepare + 80K plain + 40K
    /// commit), so every `WriteRequest` variant is exercised once.
    #[tokio::test]
    async fn chunked_object_moves_in_three_writes() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 80 * 1024, 3);
        let storage = FakeStorageClient::new();
        let payload = vec![9u8; 200 * 1024];
        storage.seed(&holder, key(1), payload.clone(), Timestamp(1));

        let outcome = RecoveryTask::for_merge(
            key(1),
            Timestamp(1),
            200 * 1024,
            holder.clone(),
            group,
            &ctx,
            &storage,
        )
        .run()
        .await
        .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.write, 3);
        assert!(outcome.stats.read >= 2);
        assert_eq!(outcome.stats.written_bytes, 200 * 1024);
        assert_eq!(storage.get(&owner, &key(1)), Some(payload));
        assert!(storage.get(&holder, &key(1)).is_none());
    }

    /// spec.md §8 "Chunking completeness": when a chunk boundary lands
    /// exactly on the chunk size (two equal-size chunks), the implementation
    /// may coalesce the would-be final zero-byte read/commit pair into the
    /// second write directly — the formal invariant is the total bytes
    /// written and at most one commit, not a fixed write count.
    #[tokio::test]
    async fn chunked_object_aligned_to_chunk_size_still_completes() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 100 * 1024, 3);
        let storage = FakeStorageClient::new();
        let payload = vec![3u8; 200 * 1024];
        storage.seed(&holder, key(1), payload.clone(), Timestamp(1));

        let outcome = RecoveryTask::for_merge(
            key(1),
            Timestamp(1),
            200 * 1024,
            holder.clone(),
            group,
            &ctx,
            &storage,
        )
        .run()
        .await
        .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.written_bytes, 200 * 1024);
        assert_eq!(storage.get(&owner, &key(1)), Some(payload));
    }

    /// spec.md §8 scenario 5: two transient read failures, then success.
    #[tokio::test]
    async fn read_retries_then_succeeds() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 1 << 20, 3);
        let storage = FakeStorageClient::new();
        storage.seed(&holder, key(1), b"payload".to_vec(), Timestamp(1));
        storage.fail_reads(&holder, 2);

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(1), 7, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert!(outcome.result);
        assert_eq!(outcome.stats.read_retries, 2);
        assert_eq!(outcome.stats.read, 1);
    }

    /// spec.md §8 "Dry run": no mutating operation is issued past the lookup.
    #[tokio::test]
    async fn dry_run_issues_no_mutating_operations() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let mut ctx = ctx(routes, 1 << 20, 3);
        ctx.dry_run = true;
        let storage = FakeStorageClient::new();
        storage.seed(&holder, key(1), b"payload".to_vec(), Timestamp(1));

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(1), 7, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::DoneDryRun);
        assert_eq!(outcome.stats.read, 0);
        assert_eq!(outcome.stats.write, 0);
        assert_eq!(outcome.stats.removed, 0);
        assert!(storage.get(&holder, &key(1)).is_some());
    }

    /// spec.md §8 "Retry bound": once attempts are exhausted the task fails
    /// without attempting a write, and the caller can tell how many retries
    /// were actually spent.
    #[tokio::test]
    async fn read_exhausting_retries_fails_without_writing() {
        let holder = addr(1);
        let owner = addr(2);
        let group = GroupId(1);
        let routes = Arc::new(fixed_single_owner_table(group, owner.clone()));
        let ctx = ctx(routes, 1 << 20, 3);
        let storage = FakeStorageClient::new();
        storage.seed(&holder, key(1), b"payload".to_vec(), Timestamp(1));
        storage.fail_reads(&holder, 10);

        let outcome = RecoveryTask::for_merge(key(1), Timestamp(1), 7, holder.clone(), group, &ctx, &storage)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.state, TaskState::Failed);
        assert!(!outcome.result);
        assert_eq!(outcome.stats.read_retries, 2);
        assert_eq!(outcome.stats.read_failed, 1);
        assert_eq!(outcome.stats.write, 0);
        assert!(storage.get(&holder, &key(1)).is_some());
    }
}
