//! Local store for mirrored customers, groups and sync bookkeeping.
//!
//! The sync engine talks to the [`EntityStore`] trait. [`DbStore`] implements
//! it on top of the sea-orm entities; the free functions in the submodules are
//! the single-table operations it is built from.

pub mod customer;
mod errors;
pub mod group;
mod store;
pub mod sync_state;

pub use errors::{RepositoryError, Result};
pub use store::{DbStore, EntityStore, UpsertOutcome};
