use std::error::Error;
use std::sync::Arc;

use crmsync::sync::{ProgressCallback, TaskRegistry};
use crmsync::wecom::{WeComClient, WeComConfig};
use crmsync::{DbStore, EntityFetcher, EntityStore, RateLimitedFetcher};

use crate::SyncArgs;
use crate::config::Config;

/// Build the WeCom fetcher, rate limited unless `no_rate_limit` is set.
pub(crate) fn build_fetcher(
    config: &Config,
    no_rate_limit: bool,
) -> Result<Arc<dyn EntityFetcher>, Box<dyn Error>> {
    let section = &config.wecom;
    let corp_id = section
        .corp_id
        .clone()
        .ok_or("WeCom corp id is not configured. Set [wecom] corp_id or CRMSYNC_CORP_ID.")?;
    let contact_secret = section.contact_secret.clone().ok_or(
        "WeCom contact secret is not configured. Set [wecom] contact_secret or CRMSYNC_CONTACT_SECRET.",
    )?;
    let customer_secret = section.customer_secret.clone().ok_or(
        "WeCom customer secret is not configured. Set [wecom] customer_secret or CRMSYNC_CUSTOMER_SECRET.",
    )?;

    let mut wecom = WeComConfig::new(corp_id, contact_secret, customer_secret);
    if let Some(api_base) = &section.api_base {
        wecom = wecom.with_api_base(api_base.clone());
    }
    let client = WeComClient::new(wecom)?;

    if no_rate_limit {
        eprintln!("Warning: Rate limiting disabled - you may experience API throttling\n");
        Ok(Arc::new(client))
    } else {
        Ok(Arc::new(RateLimitedFetcher::new(
            client,
            config.sync.requests_per_second,
        )))
    }
}

/// Open the database (migrating it) and wire up a registry.
pub(crate) async fn build_registry(
    config: &Config,
    database_url: &str,
    args: &SyncArgs,
    on_progress: Option<ProgressCallback>,
) -> Result<TaskRegistry, Box<dyn Error>> {
    let fetcher = build_fetcher(config, args.no_rate_limit)?;
    let db = crmsync::connect_and_migrate(database_url).await?;
    let store: Arc<dyn EntityStore> = Arc::new(DbStore::new(db));
    let options = config
        .sync
        .to_options(args.workers, args.stale_after_hours);

    tracing::debug!(?options, "Sync options resolved");

    let mut builder = TaskRegistry::builder()
        .fetcher(fetcher)
        .store(store)
        .options(options);
    if let Some(callback) = on_progress {
        builder = builder.progress(callback);
    }
    Ok(builder.build()?)
}
