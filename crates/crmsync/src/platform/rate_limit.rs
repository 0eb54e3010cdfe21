use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use super::errors::Result;
use super::types::{CustomerDetail, EntityFetcher, EntityId, GroupDetail, Owner};

type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default request rates (requests per second).
pub mod rate_limits {
    /// WeCom throttles external-contact reads per app at roughly this pace;
    /// staying under it keeps 45009 responses rare.
    pub const WECOM_DEFAULT_RPS: u32 = 20;
}

/// A shareable token-bucket limiter.
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(20);
/// limiter.wait().await;
/// fetcher.fetch_customer_detail(&id).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` (0 is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until the next request is allowed.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

/// An [`EntityFetcher`] decorator that waits on an [`ApiRateLimiter`] before
/// every call.
///
/// Clones share the limiter, so all workers of a pool draw from one budget.
pub struct RateLimitedFetcher<F> {
    inner: F,
    limiter: ApiRateLimiter,
}

impl<F> RateLimitedFetcher<F> {
    pub fn new(inner: F, requests_per_second: u32) -> Self {
        Self {
            inner,
            limiter: ApiRateLimiter::new(requests_per_second),
        }
    }

    /// Wrap `inner` with an existing limiter.
    pub fn with_limiter(inner: F, limiter: ApiRateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }
}

impl<F: Clone> Clone for RateLimitedFetcher<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: self.limiter.clone(),
        }
    }
}

#[async_trait]
impl<F: EntityFetcher> EntityFetcher for RateLimitedFetcher<F> {
    async fn list_owners(&self) -> Result<Vec<Owner>> {
        self.limiter.wait().await;
        self.inner.list_owners().await
    }

    async fn list_entity_ids_for_owner(&self, owner: &Owner) -> Result<Vec<EntityId>> {
        self.limiter.wait().await;
        self.inner.list_entity_ids_for_owner(owner).await
    }

    async fn fetch_customer_detail(&self, id: &EntityId) -> Result<CustomerDetail> {
        self.limiter.wait().await;
        self.inner.fetch_customer_detail(id).await
    }

    async fn list_group_ids(&self) -> Result<Vec<EntityId>> {
        self.limiter.wait().await;
        self.inner.list_group_ids().await
    }

    async fn fetch_group_detail(&self, id: &EntityId) -> Result<GroupDetail> {
        self.limiter.wait().await;
        self.inner.fetch_group_detail(id).await
    }
}
