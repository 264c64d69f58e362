//! launchpad-state — the app registry.
//!
//! Backed by [redb](https://docs.rs/redb). Each app is one JSON document in
//! the `apps` table keyed by app name. Every mutation runs in a single write
//! transaction and redb's default durability syncs the file before
//! `commit` returns, so a successful call survives a crash.
//!
//! `AppRegistry::transition` is the compare-and-set primitive the
//! orchestrator serializes on: it re-reads the record inside the write
//! transaction and refuses to apply a mutation when the stored lifecycle
//! state is not the one the caller observed.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::AppRegistry;
pub use types::*;
