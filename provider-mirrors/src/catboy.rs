//! catboy.best mirror

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::MirrorDownloader;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::{status_error, MirrorClient, RateLimitPolicy, DOWNLOAD_TIMEOUT};

const CATBOY_API: &str = "https://catboy.best";

#[derive(Debug, Deserialize)]
struct CatboyError {
    error: String,
}

pub struct CatboyDownloader {
    client: MirrorClient,
    base_url: String,
}

impl CatboyDownloader {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client: MirrorClient::new("catboy", http_client, cancel, policy),
            base_url: CATBOY_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MirrorDownloader for CatboyDownloader {
    fn name(&self) -> &str {
        "catboy"
    }

    #[instrument(skip(self))]
    async fn download_set(&self, set_id: i64) -> Result<Bytes> {
        let url = format!("{}/d/{}", self.base_url, set_id);
        let response = self
            .client
            .send(|| HttpRequest::new(HttpMethod::Get, url.clone()).timeout(DOWNLOAD_TIMEOUT))
            .await?;

        if response.status != 200 {
            // The mirror explains refusals in a small JSON document.
            let detail = response
                .json::<CatboyError>()
                .map(|body| body.error)
                .unwrap_or_default();
            return Err(status_error(self.name(), set_id, response.status, &detail));
        }

        info!(set_id, bytes = response.body.len(), "Downloaded from catboy");
        Ok(response.body)
    }
}
