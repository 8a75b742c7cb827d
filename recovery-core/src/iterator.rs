//! The node iterator driver (spec.md §4.2 "IteratorDriver").

use std::path::{Path, PathBuf};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use recovery_errors::RecoveryResult;
use tracing::{debug, warn};

use crate::address::{Eid, NodeAddress};
use crate::key::Timestamp;
use crate::range::HashRange;
use crate::stats::RecoverStat;
use crate::storage::IterRecord;

/// A finite, non-restartable sequence of [`IterRecord`]s, backed by a spill
/// file under `tmp_dir` that's deleted when the handle is dropped
/// (spec.md §4.2 "leave_file=false", §9 "Iterator as lazy sequence").
pub struct IterSequence {
    stream: Pin<Box<dyn Stream<Item = IterRecord> + Send>>,
    _spill: Option<tempfile::TempPath>,
}

impl IterSequence {
    /// Wrap a stream of records with an optional spill file to clean up on
    /// drop.
    pub fn new(
        stream: impl Stream<Item = IterRecord> + Send + 'static,
        spill: Option<tempfile::TempPath>,
    ) -> Self {
        IterSequence {
            stream: Box::pin(stream),
            _spill: spill,
        }
    }
}

impl Stream for IterSequence {
    type Item = IterRecord;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.stream.as_mut().poll_next(cx)
    }
}

/// The external iterator backend this crate drives (the "Node iterator
/// driver" collaborator of spec.md §1/§2). The concrete implementation is
/// out of scope for this crate.
#[async_trait]
pub trait NodeIterator: Send + Sync {
    /// Enumerate every key on `addr` whose hash falls in any of `ranges`
    /// and whose timestamp is `>= ts_floor`, buffering to `tmp_dir`.
    /// `Ok(None)` signals iterator failure (spec.md §4.2).
    async fn iterate(
        &self,
        addr: &NodeAddress,
        eid: &Eid,
        ranges: &[HashRange],
        ts_floor: Timestamp,
        batch_size: usize,
        tmp_dir: &Path,
    ) -> RecoveryResult<Option<IterSequence>>;
}

/// Drive the iterator against `addr`, updating `stats.iterations` per
/// spec.md §4.2: `+1` on success, `-1` on failure. Returns `None` (and
/// leaves the node otherwise untouched) on iterator failure, so the caller
/// can skip the node without failing the whole group (spec.md §7).
pub async fn iterate(
    backend: &dyn NodeIterator,
    addr: &NodeAddress,
    eid: &Eid,
    ranges: &[HashRange],
    ts_floor: Timestamp,
    batch_size: usize,
    tmp_dir: &Path,
    stats: &mut RecoverStat,
) -> RecoveryResult<Option<IterSequence>> {
    if ranges.is_empty() {
        debug!(%addr, "no foreign ranges to iterate");
        stats.iterations += 1;
        return Ok(Some(IterSequence::new(futures::stream::empty(), None)));
    }

    match backend
        .iterate(addr, eid, ranges, ts_floor, batch_size, tmp_dir)
        .await?
    {
        Some(seq) => {
            stats.iterations += 1;
            Ok(Some(seq))
        }
        None => {
            warn!(%addr, "iterator failed, skipping node");
            stats.iterations -= 1;
            Ok(None)
        }
    }
}

/// Allocate a spill-file path under `tmp_dir` for a single iterate call.
pub fn spill_path(tmp_dir: &Path, addr: &NodeAddress) -> PathBuf {
    tmp_dir.join(format!("recovery-iter-{}.tmp", addr).replace([':', '[', ']'], "_"))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures_util::StreamExt;

    use super::*;
    use crate::address::AddressFamily;

    struct AlwaysFails;

    #[async_trait]
    impl NodeIterator for AlwaysFails {
        async fn iterate(
            &self,
            _addr: &NodeAddress,
            _eid: &Eid,
            _ranges: &[HashRange],
            _ts_floor: Timestamp,
            _batch_size: usize,
            _tmp_dir: &Path,
        ) -> RecoveryResult<Option<IterSequence>> {
            Ok(None)
        }
    }

    struct YieldsOne(AtomicBool);

    #[async_trait]
    impl NodeIterator for YieldsOne {
        async fn iterate(
            &self,
            _addr: &NodeAddress,
            _eid: &Eid,
            _ranges: &[HashRange],
            _ts_floor: Timestamp,
            _batch_size: usize,
            _tmp_dir: &Path,
        ) -> RecoveryResult<Option<IterSequence>> {
            self.0.store(true, Ordering::SeqCst);
            let record = IterRecord {
                key: crate::key::ID_MIN,
                timestamp: Timestamp(1),
                size: 10,
            };
            Ok(Some(IterSequence::new(
                futures::stream::iter(vec![record]),
                None,
            )))
        }
    }

    fn addr() -> NodeAddress {
        NodeAddress::new(
            std::net::IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
            1025,
            AddressFamily::Inet,
        )
    }

    #[tokio::test]
    async fn failure_decrements_iterations_and_returns_none() {
        let mut stats = RecoverStat::default();
        let backend = AlwaysFails;
        let result = iterate(
            &backend,
            &addr(),
            &Eid(vec![]),
            &[HashRange::new(crate::key::ID_MIN, crate::key::ID_MAX)],
            Timestamp::MIN,
            10,
            Path::new("/tmp"),
            &mut stats,
        )
        .await
        .unwrap();
        assert!(result.is_none());
        assert_eq!(stats.iterations, -1);
    }

    #[tokio::test]
    async fn success_increments_iterations_and_yields_records() {
        let mut stats = RecoverStat::default();
        let backend = YieldsOne(AtomicBool::new(false));
        let mut result = iterate(
            &backend,
            &addr(),
            &Eid(vec![]),
            &[HashRange::new(crate::key::ID_MIN, crate::key::ID_MAX)],
            Timestamp::MIN,
            10,
            Path::new("/tmp"),
            &mut stats,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats.iterations, 1);
        assert!(result.next().await.is_some());
        assert!(result.next().await.is_none());
    }

    #[tokio::test]
    async fn empty_ranges_short_circuit_without_calling_backend() {
        let mut stats = RecoverStat::default();
        let backend = YieldsOne(AtomicBool::new(false));
        let mut result = iterate(
            &backend,
            &addr(),
            &Eid(vec![]),
            &[],
            Timestamp::MIN,
            10,
            Path::new("/tmp"),
            &mut stats,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(!backend.0.load(Ordering::SeqCst));
        assert!(result.next().await.is_none());
        assert_eq!(stats.iterations, 1);
    }
}
