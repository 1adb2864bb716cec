//! Layer 3: Per-operation metadata.
//!
//! What a sub-CRDT may request on send, what it is shown on receive, and
//! the wall-clock source that backs `wall_ms` stamps.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock, RwLock};

use super::identity::ReplicaId;

/// Extra metadata a sub-CRDT asks the runtime to attach to the enclosing
/// transaction.
///
/// `sender` and `counter` are always present and cannot be declined.
/// Vector-clock entries the sub-CRDT reads during its own local echo are
/// included automatically; `vc_keys` is for entries it wants on the wire
/// without reading them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataRequest {
    pub vc_keys: BTreeSet<ReplicaId>,
    pub wall_clock: bool,
    pub lamport: bool,
}

impl MetadataRequest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_wall_clock(mut self) -> Self {
        self.wall_clock = true;
        self
    }

    pub fn with_lamport(mut self) -> Self {
        self.lamport = true;
        self
    }

    pub fn with_vc_key(mut self, key: ReplicaId) -> Self {
        self.vc_keys.insert(key);
        self
    }
}

/// Header metadata shown to a sub-CRDT when an operation is applied.
///
/// Vector-clock entries are read through
/// [`CrdtContext::clock`](crate::runtime::CrdtContext::clock), not here:
/// on the sending side those reads are what selects the entries that go on
/// the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateMeta {
    pub sender: ReplicaId,
    pub counter: u64,
    /// Present iff some op in the transaction requested it.
    pub wall_ms: Option<u64>,
    /// Present iff some op in the transaction requested it.
    pub lamport: Option<u64>,
    /// True when this apply is the sender's own synchronous echo.
    pub is_local_echo: bool,
}

/// Clock pair handed to every collab during `load`.
///
/// The runtime does not merge collab state itself; a collab compares the
/// two clocks to decide, per sender, whether the loaded bytes or its
/// in-memory state is ahead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadMeta {
    local_vc: BTreeMap<ReplicaId, u64>,
    loaded_vc: BTreeMap<ReplicaId, u64>,
}

impl LoadMeta {
    pub fn new(local_vc: BTreeMap<ReplicaId, u64>, loaded_vc: BTreeMap<ReplicaId, u64>) -> Self {
        Self {
            local_vc,
            loaded_vc,
        }
    }

    /// Local applied counter for `sender` before the load (0 when absent).
    pub fn local(&self, sender: &ReplicaId) -> u64 {
        self.local_vc.get(sender).copied().unwrap_or(0)
    }

    /// Counter for `sender` recorded in the loaded state (0 when absent).
    pub fn loaded(&self, sender: &ReplicaId) -> u64 {
        self.loaded_vc.get(sender).copied().unwrap_or(0)
    }

    pub fn loaded_senders(&self) -> impl Iterator<Item = &ReplicaId> {
        self.loaded_vc.keys()
    }
}

/// Wall clock for LWW stamps - NOT for causal ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WallClock(pub u64);

pub trait WallClockSource: Send + Sync {
    fn now_ms(&self) -> u64;
}

struct SystemWallClockSource;

impl WallClockSource for SystemWallClockSource {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

fn wall_clock_source() -> &'static RwLock<Arc<dyn WallClockSource>> {
    static SOURCE: OnceLock<RwLock<Arc<dyn WallClockSource>>> = OnceLock::new();
    SOURCE.get_or_init(|| RwLock::new(Arc::new(SystemWallClockSource)))
}

impl WallClock {
    pub fn now() -> Self {
        let source = wall_clock_source()
            .read()
            .unwrap_or_else(|err| err.into_inner());
        Self(source.now_ms())
    }
}

#[cfg(any(test, feature = "test-harness"))]
static WALL_CLOCK_LOCK: OnceLock<std::sync::Mutex<()>> = OnceLock::new();

#[cfg(any(test, feature = "test-harness"))]
pub struct WallClockGuard {
    prev: Arc<dyn WallClockSource>,
    _lock: std::sync::MutexGuard<'static, ()>,
}

#[cfg(any(test, feature = "test-harness"))]
impl Drop for WallClockGuard {
    fn drop(&mut self) {
        let mut guard = wall_clock_source()
            .write()
            .unwrap_or_else(|err| err.into_inner());
        *guard = self.prev.clone();
    }
}

#[cfg(any(test, feature = "test-harness"))]
pub fn set_wall_clock_source_for_tests(source: Arc<dyn WallClockSource>) -> WallClockGuard {
    let lock = WALL_CLOCK_LOCK
        .get_or_init(|| std::sync::Mutex::new(()))
        .lock()
        .unwrap_or_else(|err| err.into_inner());
    let mut guard = wall_clock_source()
        .write()
        .unwrap_or_else(|err| err.into_inner());
    let prev = guard.clone();
    *guard = source;
    WallClockGuard { prev, _lock: lock }
}
