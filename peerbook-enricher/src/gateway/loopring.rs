//! Loopring account directory client
//!
//! Three REST lookups against the Loopring API, all keyed by owner address
//! or account id. Requests carry the API key in `X-API-KEY` and are rate
//! limited client-side.

use super::{AccountDirectory, GatewayError, GatewayResult};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::time::Duration;

const USER_AGENT: &str = concat!("peerbook/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "X-API-KEY";

#[derive(Debug, Deserialize)]
struct ResolveNameResponse {
    #[serde(default)]
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    #[serde(default)]
    account_id: i64,
    #[serde(default)]
    owner: String,
}

/// Loopring REST client
pub struct LoopringClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: DefaultDirectRateLimiter,
}

impl LoopringClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        requests_per_second: u32,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(url = %url, ?query, "Loopring request");

        let mut request = self.http_client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status(status.as_u16(), body));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

#[async_trait]
impl AccountDirectory for LoopringClient {
    async fn platform_name(&self, owner: &str) -> GatewayResult<Option<String>> {
        let response: ResolveNameResponse = self
            .get_json("/api/wallet/v3/resolveName", &[("owner", owner.to_string())])
            .await?;
        Ok(Some(response.data).filter(|name| !name.is_empty()))
    }

    async fn account_id(&self, owner: &str) -> GatewayResult<Option<i64>> {
        let response: AccountResponse = self
            .get_json("/api/v3/account", &[("owner", owner.to_string())])
            .await?;
        Ok(Some(response.account_id).filter(|id| *id > 0))
    }

    async fn owner_of(&self, account_id: i64) -> GatewayResult<Option<String>> {
        let response: AccountResponse = self
            .get_json("/api/v3/account", &[("accountId", account_id.to_string())])
            .await?;
        Ok(Some(response.owner).filter(|owner| !owner.is_empty()))
    }
}
