//! The recovery statistics monoid (spec.md §3 "RecoverStat", §9
//! "Statistics monoid").

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Counters accumulated by a single [`RecoveryTask`](crate::task::RecoveryTask),
/// then folded into a batch total, then a node total, then a group total.
///
/// Forms a commutative monoid under componentwise addition with the
/// all-zero identity ([`RecoverStat::default`]) — folding is associative and
/// order-independent, which is what lets `BatchRunner`/`NodeProcessor`/
/// `WorkerPool` aggregate results from concurrent work without a shared
/// mutable counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverStat {
    /// Keys already at their rightful owner; no I/O beyond the routing
    /// lookup was needed.
    pub skipped: u64,
    /// Successful reads.
    pub read: u64,
    /// Bytes read across all successful reads.
    pub read_bytes: u64,
    /// Read attempts retried after a transient failure.
    pub read_retries: u64,
    /// Reads that exhausted their retry budget.
    pub read_failed: u64,
    /// Successful writes.
    pub write: u64,
    /// Bytes written across all successful writes.
    pub written_bytes: u64,
    /// Write attempts retried after a transient failure.
    pub write_retries: u64,
    /// Writes that exhausted their retry budget.
    pub write_failed: u64,
    /// Successful removes.
    pub removed: u64,
    /// Removes that exhausted their retry budget.
    pub remove_failed: u64,
    /// Remove attempts retried after a transient failure.
    pub remove_retries: u64,
    /// Keys whose owner already held a newer copy, so only a remove was
    /// issued (the `just_remove` path) but that remove itself failed.
    pub merged_indexes_failed: u64,
    /// Net count of iterator invocations: `+1` per node iterated
    /// successfully, `-1` per node whose iterator failed (spec.md §4.2).
    pub iterations: i64,
}

impl Add for RecoverStat {
    type Output = RecoverStat;

    fn add(self, rhs: RecoverStat) -> RecoverStat {
        RecoverStat {
            skipped: self.skipped + rhs.skipped,
            read: self.read + rhs.read,
            read_bytes: self.read_bytes + rhs.read_bytes,
            read_retries: self.read_retries + rhs.read_retries,
            read_failed: self.read_failed + rhs.read_failed,
            write: self.write + rhs.write,
            written_bytes: self.written_bytes + rhs.written_bytes,
            write_retries: self.write_retries + rhs.write_retries,
            write_failed: self.write_failed + rhs.write_failed,
            removed: self.removed + rhs.removed,
            remove_failed: self.remove_failed + rhs.remove_failed,
            remove_retries: self.remove_retries + rhs.remove_retries,
            merged_indexes_failed: self.merged_indexes_failed + rhs.merged_indexes_failed,
            iterations: self.iterations + rhs.iterations,
        }
    }
}

impl AddAssign for RecoverStat {
    fn add_assign(&mut self, rhs: RecoverStat) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for RecoverStat {
    fn sum<I: Iterator<Item = RecoverStat>>(iter: I) -> Self {
        iter.fold(RecoverStat::default(), Add::add)
    }
}

impl RecoverStat {
    /// Publish this stat block to the global `metrics` registry, tagged by
    /// `scope` (a node address or group id rendered as a string). Called
    /// only at batch/node/group boundaries, never per-operation, per
    /// spec.md §5's resource-locking rule.
    pub fn publish(&self, scope: &str) {
        metrics::counter!("recovery_skipped", "scope" => scope.to_string()).increment(self.skipped);
        metrics::counter!("recovery_read", "scope" => scope.to_string()).increment(self.read);
        metrics::counter!("recovery_read_bytes", "scope" => scope.to_string())
            .increment(self.read_bytes);
        metrics::counter!("recovery_read_retries", "scope" => scope.to_string())
            .increment(self.read_retries);
        metrics::counter!("recovery_read_failed", "scope" => scope.to_string())
            .increment(self.read_failed);
        metrics::counter!("recovery_write", "scope" => scope.to_string()).increment(self.write);
        metrics::counter!("recovery_written_bytes", "scope" => scope.to_string())
            .increment(self.written_bytes);
        metrics::counter!("recovery_write_retries", "scope" => scope.to_string())
            .increment(self.write_retries);
        metrics::counter!("recovery_write_failed", "scope" => scope.to_string())
            .increment(self.write_failed);
        metrics::counter!("recovery_removed", "scope" => scope.to_string())
            .increment(self.removed);
        metrics::counter!("recovery_remove_failed", "scope" => scope.to_string())
            .increment(self.remove_failed);
        metrics::counter!("recovery_remove_retries", "scope" => scope.to_string())
            .increment(self.remove_retries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_zero() {
        let a = RecoverStat {
            read: 3,
            ..Default::default()
        };
        assert_eq!(a + RecoverStat::default(), a);
    }

    #[test]
    fn sum_is_commutative_and_associative() {
        let a = RecoverStat {
            read: 1,
            ..Default::default()
        };
        let b = RecoverStat {
            write: 2,
            ..Default::default()
        };
        let c = RecoverStat {
            removed: 3,
            ..Default::default()
        };
        assert_eq!(a + (b + c), (a + b) + c);
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn sum_iterator() {
        let stats = vec![
            RecoverStat {
                read: 1,
                ..Default::default()
            },
            RecoverStat {
                read: 2,
                ..Default::default()
            },
        ];
        let total: RecoverStat = stats.into_iter().sum();
        assert_eq!(total.read, 3);
    }
}
