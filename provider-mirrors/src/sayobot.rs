//! Sayobot mirror
//!
//! The download endpoint answers with a redirect whose `filename` query
//! parameter is escaped twice. Following it blindly yields a 404, so the
//! redirect is read by hand and the URL rebuilt with a single escape.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::MirrorDownloader;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use reqwest::Url;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::client::{
    status_error, MirrorClient, RateLimitPolicy, BROWSER_USER_AGENT, DOWNLOAD_TIMEOUT,
};

const SAYOBOT_API: &str = "https://txy1.sayobot.cn/beatmaps/download";
const SAYOBOT_REFERER: &str = "https://osu.sayobot.cn/";

pub struct SayobotDownloader {
    client: MirrorClient,
    server: String,
    base_url: String,
}

impl SayobotDownloader {
    /// `server` selects the Sayobot node; `auto` lets it choose.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        server: impl Into<String>,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client: MirrorClient::new("sayobot", http_client, cancel, policy),
            server: server.into(),
            base_url: SAYOBOT_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn browser_request(url: &str) -> HttpRequest {
        HttpRequest::new(HttpMethod::Get, url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Referer", SAYOBOT_REFERER)
            .timeout(DOWNLOAD_TIMEOUT)
            .no_redirects()
    }

    fn finish(&self, set_id: i64, response: HttpResponse) -> Result<Bytes> {
        if response.status != 200 {
            return Err(status_error(self.name(), set_id, response.status, ""));
        }
        info!(set_id, bytes = response.body.len(), "Downloaded from sayobot");
        Ok(response.body)
    }
}

/// Rebuild a redirect target with its `filename` parameter escaped once.
pub(crate) fn rebuild_location(location: &str) -> Result<String> {
    let url = Url::parse(location)
        .map_err(|e| BridgeError::OperationFailed(format!("invalid redirect '{location}': {e}")))?;

    // `query_pairs` removes the first layer of escaping.
    let filename = url
        .query_pairs()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default();
    let filename = urlencoding::decode(&filename)
        .map_err(|e| BridgeError::OperationFailed(format!("invalid filename in redirect: {e}")))?;

    let host = url.host_str().unwrap_or_default();
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Ok(format!(
        "{}://{}{}?filename={}",
        url.scheme(),
        host,
        url.path(),
        urlencoding::encode(&filename)
    ))
}

#[async_trait]
impl MirrorDownloader for SayobotDownloader {
    fn name(&self) -> &str {
        "sayobot"
    }

    #[instrument(skip(self))]
    async fn download_set(&self, set_id: i64) -> Result<Bytes> {
        let url = format!(
            "{}/full/{}?server={}",
            self.base_url,
            set_id,
            urlencoding::encode(&self.server)
        );
        let response = self.client.send(|| Self::browser_request(&url)).await?;

        if !response.is_redirect() {
            return self.finish(set_id, response);
        }

        let location = response.header("Location").ok_or_else(|| {
            BridgeError::OperationFailed(format!(
                "sayobot: redirect for beatmapset {set_id} has no Location"
            ))
        })?;
        let target = rebuild_location(location)?;
        debug!(set_id, target = %target, "Following sayobot redirect");

        let response = self.client.send(|| Self::browser_request(&target)).await?;
        self.finish(set_id, response)
    }
}
