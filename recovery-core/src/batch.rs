//! Batches iterator output into bounded concurrent waves of
//! [`RecoveryTask`]s (spec.md §4.4 "BatchRunner").

use futures_util::stream::{FuturesUnordered, StreamExt};
use recovery_errors::RecoveryResult;
use tracing::{debug, info_span};
use tracing::Instrument;

use crate::address::{GroupId, NodeAddress};
use crate::ctx::Ctx;
use crate::stats::RecoverStat;
use crate::storage::{IterRecord, StorageClient};
use crate::task::RecoveryTask;

/// Consume `records` in fixed-size contiguous batches of `ctx.batch_size`.
/// Within a batch, every `RecoveryTask` runs concurrently; the runner
/// awaits the whole batch before starting the next one, bounding in-flight
/// work and giving a natural point to publish statistics (spec.md §4.4).
pub async fn run<S, I>(
    mut records: I,
    src: NodeAddress,
    group: GroupId,
    ctx: &Ctx,
    storage: &S,
) -> RecoveryResult<(bool, RecoverStat)>
where
    S: StorageClient,
    I: futures::Stream<Item = IterRecord> + Unpin,
{
    let mut ok = true;
    let mut total = RecoverStat::default();
    let mut batch_no = 0usize;

    loop {
        let mut batch = Vec::with_capacity(ctx.batch_size);
        while batch.len() < ctx.batch_size {
            match records.next().await {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let span = info_span!("batch", src = %src, group = %group, batch_no, size = batch.len());
        let (batch_ok, batch_stats) = run_batch(batch, &src, group, ctx, storage)
            .instrument(span)
            .await?;

        ok &= batch_ok;
        total += batch_stats;
        batch_stats.publish(&format!("{src}"));
        batch_no += 1;
    }

    debug!(src = %src, group = %group, batches = batch_no, "batch runner finished");
    Ok((ok, total))
}

async fn run_batch<S: StorageClient>(
    batch: Vec<IterRecord>,
    src: &NodeAddress,
    group: GroupId,
    ctx: &Ctx,
    storage: &S,
) -> RecoveryResult<(bool, RecoverStat)> {
    let mut tasks = FuturesUnordered::new();
    for record in batch {
        let task = RecoveryTask::for_merge(
            record.key,
            record.timestamp,
            record.size,
            src.clone(),
            group,
            ctx,
            storage,
        );
        tasks.push(task.run());
    }

    let mut ok = true;
    let mut stats = RecoverStat::default();
    while let Some(outcome) = tasks.next().await {
        let outcome = outcome?;
        ok &= outcome.result;
        stats += outcome.stats;
    }
    Ok((ok, stats))
}

#[cfg(test)]
mod tests {
    use recovery_test_support::{fixed_single_owner_table, FakeStorageClient};

    use super::*;
    use crate::address::AddressFamily;
    use crate::key::{KeyId, Timestamp};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

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

    fn ctx(routes: Arc<crate::route::RouteTable>) -> Ctx {
        Ctx {
            chunk_size: 1 << 20,
            batch_size: 2,
            attempts: 2,
            wait_timeout: Duration::from_millis(10),
            safe: false,
            dry_run: false,
            tmp_dir: PathBuf::from("/tmp"),
            timestamp_floor: Timestamp::MIN,
            nprocess: 1,
            one_node: None,
            address: addr(1),
            remotes: vec![],
            groups: vec![crate::address::GroupId(1)],
            routes,
            monitor: None,
            log_file: None,
            log_level: "info".to_string(),
            dump_file: None,
        }
    }

    #[tokio::test]
    async fn moves_every_key_in_multiple_batches() {
        let owner = addr(2);
        let holder = addr(1);
        let routes = Arc::new(fixed_single_owner_table(crate::address::GroupId(1), owner.clone()));
        let ctx = ctx(routes);
        let storage = FakeStorageClient::new();
        for i in 0..5u8 {
            storage.seed(&holder, key(i), b"payload".to_vec(), Timestamp(1));
        }
        let records = futures::stream::iter((0..5u8).map(|i| IterRecord {
            key: key(i),
            timestamp: Timestamp(1),
            size: 7,
        }));

        let (ok, stats) = run(records, holder.clone(), crate::address::GroupId(1), &ctx, &storage)
            .await
            .unwrap();
        assert!(ok);
        assert_eq!(stats.write, 5);
        assert_eq!(stats.removed, 5);
        for i in 0..5u8 {
            assert!(storage.get(&owner, &key(i)).is_some());
            assert!(storage.get(&holder, &key(i)).is_none());
        }
    }
}
