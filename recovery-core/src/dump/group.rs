//! Reads a dump file in fixed-size chunks and drives [`run_dump_task`] over
//! each key, then fans the whole dump out across groups
//! (spec.md §4.7 "DumpGroupProcessor").

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use recovery_errors::RecoveryResult;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::address::GroupId;
use crate::ctx::Ctx;
use crate::key::KeyId;
use crate::stats::RecoverStat;
use crate::storage::StorageClient;

use super::task::run_dump_task;

/// One key read from a dump file, already parsed into a [`KeyId`].
#[derive(Debug, Clone, Copy)]
pub struct DumpRecord {
    /// The key.
    pub key: KeyId,
}

/// Process `records` against `group`, in batches of `ctx.batch_size`
/// dump tasks launched concurrently within each batch. `shutdown` is polled
/// cooperatively between batches: once signalled, the in-flight batch is
/// allowed to finish (tasks aren't individually cancellable, spec.md §5)
/// but no further batch is dispatched.
pub async fn process_dump_file<S: StorageClient>(
    records: &[DumpRecord],
    group: GroupId,
    ctx: &Ctx,
    storage: &S,
    shutdown: &recovery_util::shutdown::ShutdownReceiver,
) -> RecoveryResult<(bool, RecoverStat)> {
    let mut ok = true;
    let mut stats = RecoverStat::default();

    for chunk in records.chunks(ctx.batch_size.max(1)) {
        if shutdown.is_shutdown() {
            warn!(%group, "shutdown requested, not starting remaining batches");
            ok = false;
            break;
        }

        let mut tasks = FuturesUnordered::new();
        for record in chunk {
            let key = record.key;
            tasks.push(run_dump_task(key, group, ctx, storage));
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    warn!(%group, "shutdown requested mid-batch");
                    ok = false;
                    break;
                }
                next = tasks.next() => {
                    match next {
                        Some(result) => {
                            let (task_ok, task_stats) = result?;
                            ok &= task_ok;
                            stats += task_stats;
                        }
                        None => break,
                    }
                }
            }
        }
        if shutdown.is_shutdown() {
            break;
        }
    }

    stats.publish(&format!("{group}"));
    info!(%group, ok, "dump group finished");
    Ok((ok, stats))
}

/// Run the same dump file across every group in `groups`, using a worker
/// pool sized `min(ctx.nprocess, groups.len())` (spec.md §4.7).
pub async fn process_dump_across_groups<S: StorageClient>(
    records: Arc<Vec<DumpRecord>>,
    groups: &[GroupId],
    ctx: &Ctx,
    storage: &S,
    shutdown: recovery_util::shutdown::ShutdownReceiver,
) -> RecoveryResult<(bool, RecoverStat)> {
    if groups.is_empty() {
        return Ok((true, RecoverStat::default()));
    }

    let workers = ctx.nprocess.max(1).min(groups.len());
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = FuturesUnordered::new();

    for &group in groups {
        let permit = Arc::clone(&semaphore);
        let records = Arc::clone(&records);
        let shutdown = shutdown.clone();
        tasks.push(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            process_dump_file(&records, group, ctx, storage, &shutdown).await
        });
    }

    let mut ok = true;
    let mut stats = RecoverStat::default();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!("shutdown requested, waiting for in-flight groups to finish dispatching");
                ok = false;
                break;
            }
            next = tasks.next() => {
                match next {
                    Some(result) => {
                        let (group_ok, group_stats) = result?;
                        ok &= group_ok;
                        stats += group_stats;
                    }
                    None => break,
                }
            }
        }
    }
    Ok((ok, stats))
}
