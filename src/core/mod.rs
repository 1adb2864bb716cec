//! Core domain types for weft
//!
//! Module hierarchy follows type dependency order:
//! - error: identity/path validation errors (Layer 0)
//! - identity: ReplicaId, CollabId, CallerTag (Layer 1)
//! - clock: vector-clock ledger, Lamport tracking (Layer 2)
//! - limits: decode/buffer safety caps (Layer 2)
//! - meta: per-op metadata requests and views, wall clock (Layer 3)

pub mod clock;
pub mod error;
pub mod identity;
pub mod limits;
pub mod meta;

pub use clock::{ClockError, Lamport, VectorClock};
pub use error::{CoreError, InvalidId, InvalidPath};
pub use identity::{CallerTag, CollabId, DocId, ReplicaId};
pub use limits::Limits;
pub use meta::{LoadMeta, MetadataRequest, UpdateMeta, WallClock, WallClockSource};

#[cfg(any(test, feature = "test-harness"))]
pub use meta::{set_wall_clock_source_for_tests, WallClockGuard};
