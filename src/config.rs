//! Per-document construction options.

use serde::{Deserialize, Serialize};

use crate::core::{CallerTag, Limits, ReplicaId};

/// Options for [`Document::new`](crate::Document::new).
///
/// All fields have working defaults; `#[serde(default)]` keeps stored
/// configs forward-compatible when fields are added.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DocOptions {
    /// Explicit replica id. Generated fresh when absent; supplying one is
    /// for tests and debugging, and the supplied id must be as unique as a
    /// generated one.
    pub replica_id: Option<ReplicaId>,
    /// Default attribution attached to locally-produced Update events.
    pub caller: Option<CallerTag>,
    /// Allow one-shot transactions opened outside an explicit `transact`.
    pub auto_transact: bool,
    pub limits: Limits,
}

impl Default for DocOptions {
    fn default() -> Self {
        Self {
            replica_id: None,
            caller: None,
            auto_transact: true,
            limits: Limits::default(),
        }
    }
}

impl DocOptions {
    pub fn with_replica_id(mut self, id: ReplicaId) -> Self {
        self.replica_id = Some(id);
        self
    }

    pub fn with_caller(mut self, tag: CallerTag) -> Self {
        self.caller = Some(tag);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn without_auto_transact(mut self) -> Self {
        self.auto_transact = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_allow_auto_transactions() {
        let options = DocOptions::default();
        assert!(options.auto_transact);
        assert!(options.replica_id.is_none());
        assert_eq!(options.limits, Limits::default());
    }

    #[test]
    fn builders_compose() {
        let id = ReplicaId::parse("testreplica").unwrap();
        let options = DocOptions::default()
            .with_replica_id(id.clone())
            .without_auto_transact();
        assert_eq!(options.replica_id, Some(id));
        assert!(!options.auto_transact);
    }
}
