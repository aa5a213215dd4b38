//! Request plumbing shared by every mirror.

use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use core_async::sync::CancellationToken;
use core_async::time::{sleep_or_cancel, Duration};
use core_runtime::config::MirrorConfig;
use std::sync::Arc;
use tracing::{debug, warn};

/// Browser user agent; some mirrors reject library defaults.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0";

/// Archive downloads can be large and slow.
pub(crate) const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// How a mirror reacts to HTTP 429.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Inline retries before giving up with `RateLimited`.
    pub max_retries: u32,
    /// Used when the response carries no usable retry header.
    pub fallback_delay: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&MirrorConfig::default())
    }
}

impl From<&MirrorConfig> for RateLimitPolicy {
    fn from(config: &MirrorConfig) -> Self {
        Self {
            max_retries: config.rate_limit_retries,
            fallback_delay: Duration::from_secs(config.fallback_retry_after_secs),
        }
    }
}

/// HTTP client handle with the mirror's rate-limit and cancellation rules.
#[derive(Clone)]
pub(crate) struct MirrorClient {
    mirror: &'static str,
    http: Arc<dyn HttpClient>,
    cancel: CancellationToken,
    policy: RateLimitPolicy,
}

impl MirrorClient {
    pub(crate) fn new(
        mirror: &'static str,
        http: Arc<dyn HttpClient>,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            mirror,
            http,
            cancel,
            policy,
        }
    }

    /// Send a request built by `build`, sleeping through 429 responses.
    ///
    /// Any non-429 response is returned as is; status checks are left to the
    /// caller.
    pub(crate) async fn send<F>(&self, build: F) -> Result<HttpResponse>
    where
        F: Fn() -> HttpRequest + Send + Sync,
    {
        let mut retries = 0u32;

        loop {
            let request = build();
            debug!(mirror = self.mirror, url = %request.url, "Requesting");

            let response = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BridgeError::Cancelled),
                response = self.http.execute(request) => response?,
            };

            if response.status != 429 {
                return Ok(response);
            }

            let retry_after = retry_after(&response).unwrap_or(self.policy.fallback_delay);
            if retries >= self.policy.max_retries {
                warn!(
                    mirror = self.mirror,
                    retries,
                    "Rate limit retries exhausted"
                );
                return Err(BridgeError::RateLimited { retry_after });
            }
            retries += 1;

            warn!(
                mirror = self.mirror,
                retry_after_secs = retry_after.as_secs(),
                attempt = retries,
                "Rate limited, sleeping"
            );
            if !sleep_or_cancel(retry_after, &self.cancel).await {
                return Err(BridgeError::Cancelled);
            }
        }
    }
}

/// Seconds from `X-Retry-After`, falling back to `Retry-After`.
pub(crate) fn retry_after(response: &HttpResponse) -> Option<Duration> {
    ["X-Retry-After", "Retry-After"]
        .iter()
        .filter_map(|name| response.header(name))
        .find_map(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Map a non-success download response to the bridge error taxonomy.
pub(crate) fn status_error(mirror: &str, set_id: i64, status: u16, detail: &str) -> BridgeError {
    let message = if detail.is_empty() {
        format!("{mirror}: beatmapset {set_id} returned HTTP {status}")
    } else {
        format!("{mirror}: beatmapset {set_id} returned HTTP {status}: {detail}")
    };

    match status {
        404 | 410 => BridgeError::NotAvailable(message),
        _ => BridgeError::OperationFailed(message),
    }
}
