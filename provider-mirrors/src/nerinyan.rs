//! nerinyan.moe mirror

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bridge_traits::MirrorDownloader;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::client::{status_error, MirrorClient, RateLimitPolicy, DOWNLOAD_TIMEOUT};

const NERINYAN_API: &str = "https://api.nerinyan.moe";

/// Nerinyan rate-limits aggressively and reports the wait in
/// `X-Retry-After`.
pub struct NerinyanDownloader {
    client: MirrorClient,
    base_url: String,
}

impl NerinyanDownloader {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client: MirrorClient::new("nerinyan", http_client, cancel, policy),
            base_url: NERINYAN_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl MirrorDownloader for NerinyanDownloader {
    fn name(&self) -> &str {
        "nerinyan"
    }

    #[instrument(skip(self))]
    async fn download_set(&self, set_id: i64) -> Result<Bytes> {
        let url = format!("{}/d/{}", self.base_url, set_id);
        let response = self
            .client
            .send(|| HttpRequest::new(HttpMethod::Get, url.clone()).timeout(DOWNLOAD_TIMEOUT))
            .await?;

        if response.status != 200 {
            return Err(status_error(self.name(), set_id, response.status, ""));
        }

        info!(set_id, bytes = response.body.len(), "Downloaded from nerinyan");
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::HttpResponse;
    use core_async::time::Duration;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn rate_limited(secs: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert("X-Retry-After".to_string(), secs.to_string());
        HttpResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(rate_limited("3")));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    headers: HashMap::new(),
                    body: Bytes::from_static(b"osz"),
                })
            });

        let downloader = NerinyanDownloader::new(
            Arc::new(mock_http),
            CancellationToken::new(),
            RateLimitPolicy::default(),
        );
        let started = tokio::time::Instant::now();
        let data = downloader.download_set(7).await.unwrap();

        assert_eq!(&data[..], b"osz");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhausted() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(3)
            .returning(|_| Ok(rate_limited("2")));

        let downloader = NerinyanDownloader::new(
            Arc::new(mock_http),
            CancellationToken::new(),
            RateLimitPolicy {
                max_retries: 2,
                fallback_delay: Duration::from_secs(60),
            },
        );

        let err = downloader.download_set(7).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::RateLimited { retry_after } if retry_after == Duration::from_secs(2)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_rate_limit_sleep() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .returning(|_| Ok(rate_limited("600")));

        let cancel = CancellationToken::new();
        let downloader =
            NerinyanDownloader::new(Arc::new(mock_http), cancel.clone(), RateLimitPolicy::default());

        let task = tokio::spawn(async move { downloader.download_set(7).await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
    }
}
