//! WeCom API client.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::Instant;

use super::error::WeComError;
use super::types::{
    Envelope, ExternalContactBody, ExternalContactListBody, GroupChatBody, GroupChatListBody,
    TokenBody, UserListBody,
};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpRequest, HttpTransport};
use crate::platform::{self, CustomerDetail, EntityFetcher, EntityId, GroupDetail, Owner};

pub const DEFAULT_API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Tokens are refreshed this long before WeCom says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(200);

/// `groupchat/list` page size (the API maximum).
const GROUP_PAGE_SIZE: usize = 1000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which secret a token was issued for. Each has its own token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// Address book: staff listing.
    Contact,
    /// Customer contact: external contacts and group chats.
    Customer,
}

#[derive(Clone)]
pub struct WeComConfig {
    pub corp_id: String,
    pub contact_secret: String,
    pub customer_secret: String,
    /// Base URL up to and including `/cgi-bin`.
    pub api_base: String,
}

impl WeComConfig {
    pub fn new(
        corp_id: impl Into<String>,
        contact_secret: impl Into<String>,
        customer_secret: impl Into<String>,
    ) -> Self {
        Self {
            corp_id: corp_id.into(),
            contact_secret: contact_secret.into(),
            customer_secret: customer_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn secret(&self, kind: SecretKind) -> &str {
        match kind {
            SecretKind::Contact => &self.contact_secret,
            SecretKind::Customer => &self.customer_secret,
        }
    }

    fn validate(&self) -> Result<(), WeComError> {
        if self.corp_id.is_empty() {
            return Err(WeComError::Config("corp_id is empty".to_string()));
        }
        if self.contact_secret.is_empty() && self.customer_secret.is_empty() {
            return Err(WeComError::Config("no secret configured".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WeComConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeComConfig")
            .field("corp_id", &self.corp_id)
            .field("contact_secret", &"<redacted>")
            .field("customer_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// [`EntityFetcher`] over the WeCom server API.
///
/// Cloning is cheap and clones share the token cache.
#[derive(Clone)]
pub struct WeComClient {
    transport: Arc<dyn HttpTransport>,
    config: Arc<WeComConfig>,
    tokens: Arc<Mutex<HashMap<SecretKind, CachedToken>>>,
}

impl WeComClient {
    /// Create a client using reqwest.
    ///
    /// ```ignore
    /// let client = WeComClient::new(WeComConfig::new("ww123", contact, customer))?;
    /// let owners = client.list_owners().await?;
    /// ```
    pub fn new(config: WeComConfig) -> Result<Self, WeComError> {
        let transport = ReqwestTransport::with_timeout(REQUEST_TIMEOUT)?;
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(
        config: WeComConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, WeComError> {
        config.validate()?;
        Ok(Self {
            transport,
            config: Arc::new(config),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &WeComConfig {
        &self.config
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<SecretKind, CachedToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the cached token so the next call fetches a new one.
    pub fn invalidate_token(&self, kind: SecretKind) {
        self.tokens().remove(&kind);
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<String, WeComError> {
        let base = format!("{}/{}", self.config.api_base, path);
        reqwest::Url::parse_with_params(&base, params)
            .map(String::from)
            .map_err(|e| WeComError::Config(format!("invalid URL {base}: {e}")))
    }

    async fn access_token(&self, kind: SecretKind) -> Result<String, WeComError> {
        if let Some(token) = self.tokens().get(&kind)
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let url = self.url(
            "gettoken",
            &[
                ("corpid", self.config.corp_id.as_str()),
                ("corpsecret", self.config.secret(kind)),
            ],
        )?;
        let body: TokenBody = self.send(HttpRequest::get(url)).await?;
        let lifetime = Duration::from_secs(body.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(?kind, expires_in = body.expires_in, "Fetched WeCom access token");

        self.tokens().insert(
            kind,
            CachedToken {
                value: body.access_token.clone(),
                refresh_at: Instant::now() + lifetime,
            },
        );
        Ok(body.access_token)
    }

    async fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, WeComError> {
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(WeComError::Status {
                status: response.status,
            });
        }
        let envelope: Envelope<T> = response.json()?;
        if envelope.errcode != 0 {
            return Err(WeComError::Api {
                errcode: envelope.errcode,
                errmsg: envelope.errmsg,
            });
        }
        Ok(envelope.body)
    }

    /// Authenticated call. A stale token is dropped and the call retried once
    /// with a fresh one.
    async fn call<T: DeserializeOwned>(
        &self,
        kind: SecretKind,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, WeComError> {
        let mut refreshed = false;
        loop {
            let token = self.access_token(kind).await?;
            let mut query = vec![("access_token", token.as_str())];
            query.extend_from_slice(params);
            let url = self.url(path, &query)?;
            let request = match body {
                Some(body) => HttpRequest::post_json(url, body),
                None => HttpRequest::get(url),
            };

            match self.send(request).await {
                Err(e) if e.is_stale_token() => {
                    self.invalidate_token(kind);
                    if refreshed {
                        return Err(e);
                    }
                    refreshed = true;
                    tracing::info!(path, "WeCom access token rejected, refreshing");
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl EntityFetcher for WeComClient {
    async fn list_owners(&self) -> platform::Result<Vec<Owner>> {
        let body: UserListBody = self
            .call(
                SecretKind::Contact,
                "user/list",
                &[("department_id", "1"), ("fetch_child", "1")],
                None,
            )
            .await?;
        Ok(body
            .userlist
            .into_iter()
            .filter(|u| !u.userid.is_empty())
            .map(|u| Owner::new(u.userid, u.name))
            .collect())
    }

    async fn list_entity_ids_for_owner(&self, owner: &Owner) -> platform::Result<Vec<EntityId>> {
        let body: ExternalContactListBody = self
            .call(
                SecretKind::Customer,
                "externalcontact/list",
                &[("userid", owner.userid.as_str())],
                None,
            )
            .await?;
        Ok(body.external_userid)
    }

    async fn fetch_customer_detail(&self, id: &EntityId) -> platform::Result<CustomerDetail> {
        let body: ExternalContactBody = self
            .call(
                SecretKind::Customer,
                "externalcontact/get",
                &[("external_userid", id.as_str())],
                None,
            )
            .await?;
        Ok(body)
    }

    async fn list_group_ids(&self) -> platform::Result<Vec<EntityId>> {
        let mut ids = Vec::new();
        let mut offset = 0;
        loop {
            let page: GroupChatListBody = self
                .call(
                    SecretKind::Customer,
                    "externalcontact/groupchat/list",
                    &[],
                    Some(&json!({
                        "status_filter": 0,
                        "offset": offset,
                        "limit": GROUP_PAGE_SIZE,
                    })),
                )
                .await?;
            let count = page.group_chat_list.len();
            ids.extend(
                page.group_chat_list
                    .into_iter()
                    .map(|g| g.chat_id)
                    .filter(|id| !id.is_empty()),
            );
            tracing::debug!(offset, count, total = ids.len(), "Listed group chats");
            if count < GROUP_PAGE_SIZE {
                break;
            }
            offset += GROUP_PAGE_SIZE;
        }
        Ok(ids)
    }

    async fn fetch_group_detail(&self, id: &EntityId) -> platform::Result<GroupDetail> {
        let body: GroupChatBody = self
            .call(
                SecretKind::Customer,
                "externalcontact/groupchat/get",
                &[],
                Some(&json!({ "chat_id": id, "need_name": 0 })),
            )
            .await?;
        Ok(body.group_chat)
    }
}
