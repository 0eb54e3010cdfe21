//! crmsync - mirror a WeCom-style CRM into a local database.
//!
//! The library pulls customers and customer group chats from a remote
//! platform and upserts them into a sea-orm backed store. Syncs run as
//! background tasks owned by a [`sync::TaskRegistry`], which callers poll and
//! cancel by id.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `wecom` - The [`wecom::WeComClient`] fetcher.
//! - `sqlite` / `postgres` - Database drivers.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crmsync::{DbStore, connect_and_migrate, sync::{SyncKind, TaskRegistry}};
//!
//! let db = connect_and_migrate("sqlite://crmsync.db?mode=rwc").await?;
//! let registry = TaskRegistry::builder()
//!     .fetcher(Arc::new(client))
//!     .store(Arc::new(DbStore::new(db)))
//!     .build()?;
//!
//! let task_id = registry.create(SyncKind::Incremental)?;
//! let snapshot = registry.get(task_id);
//! ```

pub mod db;
pub mod entity;
pub mod platform;
pub mod repository;
pub mod retry;
pub mod sync;

#[cfg(feature = "wecom")]
pub mod http;

#[cfg(feature = "wecom")]
pub mod wecom;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use platform::{
    ApiRateLimiter, CustomerRecord, EntityFetcher, EntityId, EntityRecord, FetchError,
    GroupRecord, Owner, RateLimitedFetcher, rate_limits,
};
pub use repository::{DbStore, EntityStore, RepositoryError, UpsertOutcome};
pub use sync::{SyncError, SyncKind, SyncOptions, SyncStatus, TaskId, TaskRegistry, TaskSnapshot};
