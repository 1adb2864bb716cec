//! Layer 1: Identity atoms
//!
//! ReplicaId: per-session replica identification
//! CollabId: replica-stable address of a collab (root-to-node path)
//! CallerTag: opaque attribution for updates

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CoreError, InvalidId, InvalidPath};

/// Alphabet for generated replica ids (mixed-case alphanumeric).
///
/// 62 symbols over 10 positions is ~2^59.5 distinct ids; collisions among
/// the handful of concurrent sessions a document sees are negligible.
const REPLICA_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Generated replica id length.
const REPLICA_ID_LEN: usize = 10;

/// Replica identifier - short opaque string, unique per document session.
///
/// Immutable for the lifetime of the document instance. Ordering is
/// lexicographic and is what deterministic tie-breaks rely on.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReplicaId(String);

impl ReplicaId {
    /// Parse and validate a replica id string.
    ///
    /// Accepts 1..=64 ASCII alphanumeric characters. Supplied ids (tests,
    /// debugging) go through the same validation as generated ones.
    pub fn parse(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidId::Replica {
                raw: s,
                reason: "empty".into(),
            }
            .into());
        }
        if s.len() > 64 {
            return Err(InvalidId::Replica {
                raw: s,
                reason: "longer than 64 characters".into(),
            }
            .into());
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidId::Replica {
                raw: s,
                reason: "contains non-alphanumeric character".into(),
            }
            .into());
        }
        Ok(Self(s))
    }

    /// Generate a fresh random replica id.
    pub fn generate() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let id: String = (0..REPLICA_ID_LEN)
            .map(|_| {
                let idx = rng.random_range(0..REPLICA_ALPHABET.len());
                REPLICA_ALPHABET[idx] as char
            })
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({:?})", self.0)
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ReplicaId {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        ReplicaId::parse(s)
    }
}

impl From<ReplicaId> for String {
    fn from(id: ReplicaId) -> String {
        id.0
    }
}

/// Replica-stable address of a collab: the sequence of edge labels from
/// the document root.
///
/// Two replicas sharing a schema resolve the same `CollabId` to the same
/// collab. The root is the empty path.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollabId(Vec<String>);

impl CollabId {
    /// The document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build from validated labels.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for label in labels {
            let label = label.into();
            validate_label(&label)?;
            out.push(label);
        }
        Ok(Self(out))
    }

    pub(crate) fn from_labels_unchecked(labels: Vec<String>) -> Self {
        Self(labels)
    }

    pub fn labels(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Child address under this one.
    pub fn child(&self, label: impl Into<String>) -> Result<Self, CoreError> {
        let label = label.into();
        validate_label(&label)?;
        let mut labels = self.0.clone();
        labels.push(label);
        Ok(Self(labels))
    }
}

pub(crate) fn validate_label(label: &str) -> Result<(), CoreError> {
    if label.is_empty() {
        return Err(InvalidPath::Label {
            raw: label.to_string(),
            reason: "empty".into(),
        }
        .into());
    }
    if label.bytes().any(|b| b == 0 || b == b'/') {
        return Err(InvalidPath::Label {
            raw: label.to_string(),
            reason: "contains '/' or NUL".into(),
        }
        .into());
    }
    Ok(())
}

impl fmt::Debug for CollabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollabId({})", self)
    }
}

impl fmt::Display for CollabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for label in &self.0 {
            write!(f, "/{}", label)?;
        }
        Ok(())
    }
}

/// Attribution tag carried on Update events - non-empty string.
///
/// Providers name themselves. No validation beyond non-empty.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CallerTag(String);

impl CallerTag {
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        if s.is_empty() {
            Err(InvalidId::Caller {
                raw: s,
                reason: "empty".into(),
            }
            .into())
        } else {
            Ok(Self(s))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CallerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallerTag({:?})", self.0)
    }
}

impl fmt::Display for CallerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for CallerTag {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        CallerTag::new(s)
    }
}

impl From<CallerTag> for String {
    fn from(tag: CallerTag) -> String {
        tag.0
    }
}

/// Process-unique document instance id.
///
/// Handles carry it so that a handle from one document cannot be used on
/// another.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocId(u64);

impl DocId {
    pub(crate) fn generate() -> Self {
        use rand::Rng;
        Self(rand::rng().random())
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({:016x})", self.0)
    }
}
