//! Per-node merge recovery driver (spec.md §4.5 "NodeProcessor").

use recovery_errors::RecoveryResult;
use tracing::{debug, info_span, Instrument};

use crate::address::{Eid, GroupId, NodeAddress};
use crate::ctx::Ctx;
use crate::iterator::{self, NodeIterator};
use crate::range::HashRange;
use crate::stats::RecoverStat;
use crate::storage::StorageClient;

/// Recover every foreign key found on `src` into its rightful owner within
/// `group`. `ranges` is this node's slice of `ForeignRangesResult::Ranges`
/// (spec.md §4.1); an empty slice means `src` has nothing foreign and the
/// call is a cheap no-op.
///
/// Records a `process` span covering iterate-then-recover, matching
/// spec.md §4.5's named phases (`started`, `iterate`, `recover`,
/// `finished`).
pub async fn process_node<S, I>(
    src: NodeAddress,
    eid: &Eid,
    group: GroupId,
    ranges: &[HashRange],
    ctx: &Ctx,
    storage: &S,
    backend: &I,
) -> RecoveryResult<(bool, RecoverStat)>
where
    S: StorageClient,
    I: NodeIterator,
{
    let span = info_span!("process", %src, %group);
    async move {
        debug!("started");
        let mut stats = RecoverStat::default();

        let sequence = iterator::iterate(
            backend,
            &src,
            eid,
            ranges,
            ctx.timestamp_floor,
            ctx.batch_size,
            &ctx.tmp_dir,
            &mut stats,
        )
        .await?;

        let Some(sequence) = sequence else {
            debug!("iterate failed, treating node as skipped");
            return Ok((true, stats));
        };
        debug!("iterate");

        use futures_util::StreamExt;
        let mut sequence = Box::pin(sequence);
        let Some(first) = sequence.next().await else {
            debug!("finished, nothing to recover");
            return Ok((true, stats));
        };

        debug!("recover");
        let records = Box::pin(futures::stream::once(async move { first }).chain(sequence));
        let (ok, batch_stats) = crate::batch::run(records, src.clone(), group, ctx, storage).await?;
        stats += batch_stats;

        debug!("finished");
        Ok((ok, stats))
    }
    .instrument(span)
    .await
}
