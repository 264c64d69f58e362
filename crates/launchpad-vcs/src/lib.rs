//! launchpad-vcs — per-app append-only history of generated file sets.
//!
//! A revision is written into a staging directory, synced, and renamed into
//! place, so a revision either exists completely or not at all. Revisions are
//! never modified after the rename; builds read them through [`VersionStore::checkout`],
//! which copies the files into a fresh build-context directory.

pub mod error;
pub mod fileset;
pub mod store;

pub use error::{VcsError, VcsResult};
pub use fileset::FileSet;
pub use store::{FsVersionStore, Revision, VersionStore};
