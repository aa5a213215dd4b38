//! # Mirror Downloaders
//!
//! [`MirrorDownloader`] implementations for the public beatmap mirrors and
//! the official osu! API.
//!
//! ## Overview
//!
//! - [`SayobotDownloader`] - rebuilds the double-escaped redirect by hand
//! - [`CatboyDownloader`] - reports the mirror's JSON error message
//! - [`NerinyanDownloader`] - honors `X-Retry-After`
//! - [`OfficialDownloader`] - bearer token plus a pinned API version
//!
//! All of them share the same rate-limit handling: a 429 is answered by a
//! cancellable sleep for the advertised delay, up to a configured number of
//! retries, after which the download fails with
//! [`BridgeError::RateLimited`](bridge_traits::BridgeError::RateLimited).

use bridge_traits::http::HttpClient;
use bridge_traits::MirrorDownloader;
use core_async::sync::CancellationToken;
use core_runtime::config::MirrorConfig;
use std::sync::Arc;
use tracing::{info, warn};

mod client;
pub mod catboy;
pub mod nerinyan;
pub mod official;
pub mod sayobot;

pub use catboy::CatboyDownloader;
pub use client::RateLimitPolicy;
pub use nerinyan::NerinyanDownloader;
pub use official::OfficialDownloader;
pub use sayobot::SayobotDownloader;

/// Build the enabled downloaders in round-robin order: sayobot, catboy,
/// nerinyan, official.
///
/// The official mirror needs a token. `token` takes precedence over
/// `config.official_token`; with neither, the mirror is left out.
pub fn build_downloaders(
    config: &MirrorConfig,
    http_client: Arc<dyn HttpClient>,
    token: Option<String>,
    cancel: CancellationToken,
) -> Vec<Arc<dyn MirrorDownloader>> {
    let policy = RateLimitPolicy::from(config);
    let mut downloaders: Vec<Arc<dyn MirrorDownloader>> = Vec::new();

    if config.enable_sayobot {
        downloaders.push(Arc::new(SayobotDownloader::new(
            http_client.clone(),
            config.sayobot_server.clone(),
            cancel.clone(),
            policy,
        )));
    }
    if config.enable_catboy {
        downloaders.push(Arc::new(CatboyDownloader::new(
            http_client.clone(),
            cancel.clone(),
            policy,
        )));
    }
    if config.enable_nerinyan {
        downloaders.push(Arc::new(NerinyanDownloader::new(
            http_client.clone(),
            cancel.clone(),
            policy,
        )));
    }
    if config.enable_official {
        match token.or_else(|| config.official_token.clone()) {
            Some(token) => downloaders.push(Arc::new(OfficialDownloader::new(
                http_client,
                token,
                cancel,
                policy,
            ))),
            None => warn!("Official mirror enabled without an access token, skipping"),
        }
    }

    info!(
        mirrors = ?downloaders.iter().map(|d| d.name().to_string()).collect::<Vec<_>>(),
        "Mirror downloaders ready"
    );
    downloaders
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    fn names(downloaders: &[Arc<dyn MirrorDownloader>]) -> Vec<String> {
        downloaders.iter().map(|d| d.name().to_string()).collect()
    }

    #[test]
    fn test_default_order() {
        let downloaders = build_downloaders(
            &MirrorConfig::default(),
            Arc::new(MockHttpClient::new()),
            None,
            CancellationToken::new(),
        );
        assert_eq!(names(&downloaders), vec!["sayobot", "catboy", "nerinyan"]);
    }

    #[test]
    fn test_official_requires_token() {
        let config = MirrorConfig {
            enable_sayobot: false,
            enable_official: true,
            ..MirrorConfig::default()
        };

        let without = build_downloaders(
            &config,
            Arc::new(MockHttpClient::new()),
            None,
            CancellationToken::new(),
        );
        assert_eq!(names(&without), vec!["catboy", "nerinyan"]);

        let with = build_downloaders(
            &config,
            Arc::new(MockHttpClient::new()),
            Some("token".to_string()),
            CancellationToken::new(),
        );
        assert_eq!(names(&with), vec!["catboy", "nerinyan", "official"]);
    }
}
