//! Error types and assertion macros shared by every `recovery-*` crate.
//!
//! The taxonomy follows spec.md §7: transient failures are retried by the
//! caller and never reach this type; everything here is either a terminal,
//! reportable failure (storage I/O exhausted its retries, the iterator
//! backend failed, the run was cancelled) or an `Internal` bug (a routing
//! table invariant was violated, a state machine reached an impossible
//! state).

use std::fmt;

use thiserror::Error;

/// The error type returned by every fallible operation in `recovery-core`.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// A routing table, range-set, or state machine invariant was violated.
    /// These indicate a bug in this crate or a malformed routing table, not
    /// a transient runtime condition.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// A storage operation (lookup, read, write, remove) failed after
    /// exhausting `ctx.attempts` retries.
    #[error("storage operation failed on {address}: {source}")]
    Storage {
        /// The address the failing operation targeted.
        address: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The iterator backend failed to enumerate keys on a node.
    #[error("iterator failed on {address}: {reason}")]
    Iterator {
        /// The address the iterator was driven against.
        address: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// An address referenced by one-node mode is absent from the group's
    /// routing table.
    #[error("address {0} is not present in the group's routing table")]
    AddressNotInGroup(String),

    /// The run was cancelled (interrupt signal observed by the worker pool).
    #[error("recovery run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout `recovery-core` and `recovery-tools`.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

impl RecoveryError {
    /// Construct a [`RecoveryError::Storage`] from any boxable error.
    pub fn storage(
        address: impl fmt::Display,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        RecoveryError::Storage {
            address: address.to_string(),
            source: source.into(),
        }
    }
}

/// Construct a [`RecoveryError::Internal`] carrying a formatted message and
/// the call site, mirroring the `internal!` macro used throughout the
/// `readyset` workspace to flag "this should be unreachable" conditions.
#[macro_export]
macro_rules! internal {
    ($($tt:tt)*) => {
        return Err($crate::RecoveryError::Internal(format!(
            "{} ({}:{})",
            format_args!($($tt)*),
            file!(),
            line!(),
        )))
    };
}

/// Like [`internal!`], but yields a [`RecoveryError`] value instead of
/// returning it, for use with `.ok_or_else` / `.map_err`.
#[macro_export]
macro_rules! internal_err {
    ($($tt:tt)*) => {
        $crate::RecoveryError::Internal(format!(
            "{} ({}:{})",
            format_args!($($tt)*),
            file!(),
            line!(),
        ))
    };
}

/// Assert an invariant, returning [`RecoveryError::Internal`] (rather than
/// panicking) when it doesn't hold.
#[macro_export]
macro_rules! invariant {
    ($cond:expr) => {
        if !($cond) {
            $crate::internal!("invariant violated: {}", stringify!($cond));
        }
    };
    ($cond:expr, $($tt:tt)*) => {
        if !($cond) {
            $crate::internal!($($tt)*);
        }
    };
}

/// Assert two values are equal, returning [`RecoveryError::Internal`] with
/// both sides rendered when they aren't.
#[macro_export]
macro_rules! invariant_eq {
    ($left:expr, $right:expr) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    $crate::internal!(
                        "invariant violated: {} == {} ({:?} != {:?})",
                        stringify!($left),
                        stringify!($right),
                        left_val,
                        right_val
                    );
                }
            }
        }
    };
}
