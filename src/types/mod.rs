//! Built-in reference collab types.
//!
//! Deliberately minimal: enough to exercise the full runtime contract
//! (metadata requests, local echo, load-time merge, typed reads). Richer
//! data types live outside the core.

pub mod counter;
pub mod register;

pub use counter::{Counter, CounterState};
pub use register::{LwwRegister, LwwState};
