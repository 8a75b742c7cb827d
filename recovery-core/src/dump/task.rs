//! One key of a dump file (spec.md §4.7 "DumpTask").

use futures_util::stream::{FuturesUnordered, StreamExt};
use recovery_errors::RecoveryResult;
use tracing::{debug, warn};

use crate::address::{GroupId, NodeAddress};
use crate::ctx::Ctx;
use crate::key::{KeyId, Timestamp};
use crate::stats::RecoverStat;
use crate::storage::StorageClient;
use crate::task::RecoveryTask;

struct Response {
    address: NodeAddress,
    timestamp: Timestamp,
    size: u64,
}

/// Recover (or clean up stale replicas of) a single dump-file key within
/// `group`. Returns whether the task succeeded and the stats it
/// accumulated.
pub async fn run_dump_task<S: StorageClient>(
    key: KeyId,
    group: GroupId,
    ctx: &Ctx,
    storage: &S,
) -> RecoveryResult<(bool, RecoverStat)> {
    let mut stats = RecoverStat::default();
    let addresses = ctx.routes.addresses_in_group(group);

    // Step 1: lookup every address in parallel, awaiting each outcome
    // individually so one address's failure can't strand the others
    // in-flight (spec.md §9's resolution of the dump-wait typo).
    let mut lookups = FuturesUnordered::new();
    for addr in addresses {
        lookups.push(async move {
            let result = storage.lookup(&addr, &key, ctx.wait_timeout).await;
            (addr, result)
        });
    }

    let mut responses = Vec::new();
    while let Some((addr, result)) = lookups.next().await {
        match result {
            Ok(Some(info)) => responses.push(Response {
                address: addr,
                timestamp: info.timestamp,
                size: info.size,
            }),
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, %addr, error = %e, "dump lookup failed, excluding from consideration");
            }
        }
    }

    if responses.is_empty() {
        debug!(key = %key, "no replica responded to dump lookup");
        return Ok((true, stats));
    }

    // Step 2: winners are every response tied for (max timestamp, max size),
    // ordered deterministically by address (spec.md §9).
    let max_ts = responses.iter().map(|r| r.timestamp).max().expect("non-empty");
    let max_size = responses
        .iter()
        .filter(|r| r.timestamp == max_ts)
        .map(|r| r.size)
        .max()
        .expect("non-empty");
    let mut winners: Vec<&NodeAddress> = responses
        .iter()
        .filter(|r| r.timestamp == max_ts && r.size == max_size)
        .map(|r| &r.address)
        .collect();
    winners.sort();

    let owner = ctx.routes.lookup_address(&key, group);
    let owner_is_winner = owner
        .as_ref()
        .is_some_and(|o| winners.iter().any(|w| *w == o));

    let recovery_src = if owner_is_winner {
        debug!(key = %key, "owner already holds a winning replica, no recovery needed");
        None
    } else {
        winners.first().copied().cloned()
    };

    if let Some(ref src) = recovery_src {
        let outcome = RecoveryTask::for_dump(key.clone(), max_ts, max_size, src.clone(), group, ctx, storage)
            .run()
            .await?;
        stats += outcome.stats;
        if !outcome.result {
            return Ok((false, stats));
        }
    }

    // Step 5: cleanup every other responder, excluding the owner and
    // whichever address the recovery task already removed.
    if !ctx.safe {
        for response in &responses {
            if owner.as_ref() == Some(&response.address) {
                continue;
            }
            if recovery_src.as_ref() == Some(&response.address) {
                continue;
            }
            match storage
                .remove(&response.address, &key, ctx.wait_timeout)
                .await
            {
                Ok(()) => stats.removed += 1,
                Err(e) => {
                    warn!(key = %key, address = %response.address, error = %e, "dump cleanup remove failed");
                    stats.remove_failed += 1;
                }
            }
        }
    }

    Ok((true, stats))
}
