//! The replication runtime: causal delivery, the collab tree, transactions,
//! events, and the document entry points.

pub(crate) mod buffer;
pub mod collab;
pub mod doc;
pub mod error;
pub mod events;
pub(crate) mod tree;
pub mod txn;

pub use collab::{CrdtContext, PayloadError, PrimitiveCollab};
pub use doc::{CollabHandle, Document, ReceiveOutcome};
pub use error::{ApplyError, UsageError};
pub use events::{DocEvent, SubscriptionId, UpdateKind};
pub use txn::TxnHandle;
