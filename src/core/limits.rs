//! Wire-safety limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Decode and buffering caps applied to everything that crosses a replica
/// boundary.
///
/// Values are intentionally explicit about their units to avoid confusion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_txn_bytes: usize,
    pub max_ops_per_txn: usize,
    pub max_path_depth: usize,

    pub max_pending_txns: usize,
    pub max_pending_bytes: usize,

    pub max_saved_state_bytes: usize,

    pub max_cbor_depth: usize,
    pub max_cbor_map_entries: usize,
    pub max_cbor_array_entries: usize,
    pub max_cbor_text_len: usize,
    pub max_cbor_bytes_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_txn_bytes: 16 * 1024 * 1024,
            max_ops_per_txn: 10_000,
            max_path_depth: 16,

            max_pending_txns: 50_000,
            max_pending_bytes: 32 * 1024 * 1024,

            max_saved_state_bytes: 512 * 1024 * 1024,

            // Must cover a saved tree at max_path_depth, which nests two
            // CBOR maps per tree level.
            max_cbor_depth: 64,
            max_cbor_map_entries: 100_000,
            max_cbor_array_entries: 100_000,
            max_cbor_text_len: 64 * 1024,
            max_cbor_bytes_len: 16 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Limits;

    #[test]
    fn limits_defaults_are_pinned() {
        let limits = Limits::default();
        assert_eq!(limits.max_txn_bytes, 16 * 1024 * 1024);
        assert_eq!(limits.max_ops_per_txn, 10_000);
        assert_eq!(limits.max_path_depth, 16);
        assert_eq!(limits.max_pending_txns, 50_000);
        assert_eq!(limits.max_pending_bytes, 32 * 1024 * 1024);
        assert_eq!(limits.max_saved_state_bytes, 512 * 1024 * 1024);
        assert_eq!(limits.max_cbor_depth, 64);
        assert!(limits.max_cbor_depth > 2 + 2 * limits.max_path_depth);
        assert_eq!(limits.max_cbor_map_entries, 100_000);
        assert_eq!(limits.max_cbor_array_entries, 100_000);
        assert_eq!(limits.max_cbor_text_len, 64 * 1024);
        assert_eq!(limits.max_cbor_bytes_len, 16 * 1024 * 1024);
    }
}
