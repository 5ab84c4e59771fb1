//! Error types for registry operations.

use thiserror::Error;

use crate::handle::CellId;

/// Convenience alias for registry results.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Failure of a registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The handle is unknown, or its cell has already been removed.
    #[error("cell {0} is not registered")]
    NotFound(CellId),
    /// Storage for a registry-owned buffer could not be reserved.
    #[error("failed to allocate {requested} bytes for a registry-owned buffer")]
    AllocationFailure {
        /// Bytes requested.
        requested: usize,
    },
    /// The configured ceiling on live registry-owned bytes would be exceeded.
    #[error("allocating {requested} bytes would exceed the owned-byte limit ({in_use} of {limit} in use)")]
    OwnedLimitExceeded {
        /// Bytes requested.
        requested: usize,
        /// Registry-owned bytes currently live.
        in_use: usize,
        /// Configured ceiling.
        limit: usize,
    },
    /// Incrementing would overflow the reference count.
    #[error("reference count of cell {0} would overflow")]
    RefCountOverflow(CellId),
    /// Mutable access was requested for storage the caller owns.
    #[error("cell {0} wraps a caller-owned buffer")]
    CallerOwned(CellId),
    /// Every arena index is in use or retired.
    #[error("registry arena exhausted ({slots} slots)")]
    CapacityExhausted {
        /// Slots in the arena.
        slots: usize,
    },
}

/// Structural defect found by [`CellRegistry::verify`](crate::CellRegistry::verify).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Walking the chain visited a different number of cells than recorded.
    #[error("chain holds {walked} cells but the registry records {recorded}")]
    CountMismatch {
        /// Cells reached from the head.
        walked: usize,
        /// Recorded live count.
        recorded: usize,
    },
    /// Exactly one of head/tail is set, or they disagree with the count.
    #[error("head/tail out of step with the recorded count")]
    EndpointMismatch,
    /// The walk did not end at the recorded tail.
    #[error("chain ends at slot {found:?}, tail is slot {tail:?}")]
    TailMismatch {
        /// Last slot reached by the walk.
        found: Option<u32>,
        /// Recorded tail slot.
        tail: Option<u32>,
    },
    /// A `prev` link does not mirror the preceding `next` link.
    #[error("back link of slot {0} is broken")]
    BrokenBackLink(u32),
    /// A link points at a vacant slot or outside the arena.
    #[error("link to vacant slot {0}")]
    DanglingLink(u32),
    /// A linked cell has a zero reference count.
    #[error("linked cell {0} has a zero reference count")]
    DeadCellLinked(CellId),
    /// An occupied slot is not reachable from the head.
    #[error("{0} occupied slots are not reachable from the head")]
    Unreachable(usize),
}
