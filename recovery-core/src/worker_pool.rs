//! The top-level merge orchestrator (spec.md §4.6 "WorkerPool & main").

use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use recovery_errors::RecoveryResult;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::address::GroupId;
use crate::ctx::Ctx;
use crate::iterator::NodeIterator;
use crate::node;
use crate::range::{foreign_ranges, ForeignRangesResult};
use crate::stats::RecoverStat;
use crate::storage::StorageClient;

/// Run merge recovery over every group in `ctx.effective_groups()` (or just
/// the one group `ctx.one_node` belongs to — the caller is responsible for
/// having narrowed `ctx.groups` to it). Returns the AND-reduction of every
/// group's result together with the summed statistics.
///
/// Dispatches one [`node::process_node`] task per foreign address in a
/// group to a pool bounded at `min(ctx.nprocess, |addresses|)` (spec.md
/// §4.6, §5 "Process-level fan-out"). `shutdown` is polled cooperatively:
/// once signalled, in-flight node tasks are allowed to finish (they are not
/// individually cancellable, per spec.md §5) but no new group or node work
/// is dispatched.
pub async fn run<S, I>(
    ctx: &Ctx,
    storage: &S,
    backend: &I,
    shutdown: recovery_util::shutdown::ShutdownReceiver,
) -> RecoveryResult<(bool, RecoverStat)>
where
    S: StorageClient,
    I: NodeIterator,
{
    let mut ok = true;
    let mut stats = RecoverStat::default();

    for &group in ctx.effective_groups() {
        if shutdown.is_shutdown() {
            warn!(%group, "shutdown requested, not starting remaining groups");
            ok = false;
            break;
        }

        match run_group(group, ctx, storage, backend, &shutdown).await? {
            Some((group_ok, group_stats)) => {
                ok &= group_ok;
                stats += group_stats;
            }
            None => {
                warn!(%group, "group skipped, one_node not present in routing table");
            }
        }
    }

    info!(ok, "recovery run finished");
    Ok((ok, stats))
}

async fn run_group<S, I>(
    group: GroupId,
    ctx: &Ctx,
    storage: &S,
    backend: &I,
    shutdown: &recovery_util::shutdown::ShutdownReceiver,
) -> RecoveryResult<Option<(bool, RecoverStat)>>
where
    S: StorageClient,
    I: NodeIterator,
{
    let ranges = match foreign_ranges(&ctx.routes, group, ctx.one_node.as_ref())? {
        ForeignRangesResult::SkipGroup => return Ok(None),
        ForeignRangesResult::Ranges(ranges) => ranges,
    };

    if ranges.is_empty() {
        return Ok(Some((true, RecoverStat::default())));
    }

    let workers = ctx.nprocess.max(1).min(ranges.len());
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = FuturesUnordered::new();

    for (addr, foreign) in ranges {
        let permit = Arc::clone(&semaphore);
        let eid = ctx
            .routes
            .get_address_eid(group, &addr)
            .cloned()
            .unwrap_or_else(|| crate::address::Eid(Vec::new()));

        tasks.push(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            node::process_node(addr, &eid, group, &foreign, ctx, storage, backend).await
        });
    }

    let mut ok = true;
    let mut stats = RecoverStat::default();
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!(%group, "shutdown requested mid-group");
                ok = false;
                break;
            }
            next = tasks.next() => {
                match next {
                    Some(result) => {
                        let (node_ok, node_stats) = result?;
                        ok &= node_ok;
                        stats += node_stats;
                    }
                    None => break,
                }
            }
        }
    }

    stats.publish(&format!("{group}"));
    Ok(Some((ok, stats)))
}
