//! Official osu! API v2 download endpoint

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::MirrorDownloader;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::{status_error, MirrorClient, RateLimitPolicy, DOWNLOAD_TIMEOUT};

const OSU_API: &str = "https://osu.ppy.sh/api/v2";
const API_VERSION: &str = "20250118";

/// Downloads through the official API with a user's bearer token.
///
/// The token is supplied by the host; refreshing it is not handled here.
pub struct OfficialDownloader {
    client: MirrorClient,
    access_token: String,
    base_url: String,
}

impl OfficialDownloader {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        access_token: impl Into<String>,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client: MirrorClient::new("official", http_client, cancel, policy),
            access_token: access_token.into(),
            base_url: OSU_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MirrorDownloader for OfficialDownloader {
    fn name(&self) -> &str {
        "official"
    }

    #[instrument(skip(self))]
    async fn download_set(&self, set_id: i64) -> Result<Bytes> {
        let url = format!("{}/beatmapsets/{}/download", self.base_url, set_id);
        let response = self
            .client
            .send(|| {
                HttpRequest::new(HttpMethod::Get, url.clone())
                    .header("x-api-version", API_VERSION)
                    .bearer_token(self.access_token.clone())
                    .timeout(DOWNLOAD_TIMEOUT)
            })
            .await?;

        if response.status != 200 {
            let detail = response.text().unwrap_or_default();
            return Err(status_error(self.name(), set_id, response.status, detail.trim()));
        }
        if response.body.is_empty() {
            return Err(BridgeError::OperationFailed(format!(
                "official: empty body for beatmapset {set_id}"
            )));
        }

        info!(set_id, bytes = response.body.len(), "Downloaded from official API");
        Ok(response.body)
    }
}
