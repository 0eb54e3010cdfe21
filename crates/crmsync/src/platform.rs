//! Vendor-neutral view of the remote CRM platform.
//!
//! The sync engine only sees the [`EntityFetcher`] trait defined here. Vendor
//! adapters (see the `wecom` feature) implement it and convert their payloads
//! into [`CustomerDetail`] / [`GroupDetail`], which [`CustomerRecord`] and
//! [`GroupRecord`] then normalize for the local store.
//!
//! ```ignore
//! use crmsync::platform::{EntityFetcher, RateLimitedFetcher, rate_limits};
//!
//! let fetcher = RateLimitedFetcher::new(client, rate_limits::WECOM_DEFAULT_RPS);
//! for owner in fetcher.list_owners().await? {
//!     let ids = fetcher.list_entity_ids_for_owner(&owner).await?;
//!     println!("{} follows {} customers", owner.name, ids.len());
//! }
//! ```

mod convert;
mod errors;
mod rate_limit;
mod types;

pub use errors::{FetchError, Result, short_error_message};
pub use rate_limit::{ApiRateLimiter, RateLimitedFetcher, rate_limits};
pub use types::{
    CustomerDetail, CustomerRecord, EntityFetcher, EntityId, EntityRecord, ExternalContact,
    FollowTag, FollowUser, GroupAdmin, GroupDetail, GroupMember, GroupRecord, Owner, TagKind,
    TagRef,
};
