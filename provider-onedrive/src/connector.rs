//! OneDrive connector over Microsoft Graph
//!
//! Implements `RemoteStore` for a personal or business drive, addressed by
//! path from the drive root.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::storage::{RemoteItem, RemoteStore};
use bridge_traits::time::{Clock, SystemClock};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use core_async::sync::CancellationToken;
use core_async::time::{sleep_or_cancel, Duration};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{OneDriveError, Result};
use crate::quickxor;
use crate::types::{
    CreateLinkRequest, CreateLinkResponse, DriveItem, ErrorEnvelope, UploadSessionResponse,
};

/// Microsoft Graph API base URL
const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Upload chunk size. Graph requires a multiple of 320 KiB.
pub const CHUNK_SIZE: usize = 10_485_760;

const SERVER_ERROR_RETRIES: u32 = 5;
const CLIENT_ERROR_RETRIES: u32 = 3;
const CLIENT_ERROR_DELAY: Duration = Duration::from_secs(10);

/// SharePoint personal share link: tenant, user path, share token.
static SHARE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https://(\S+)\.sharepoint\.com/:\S:/g/personal/(\S+)/(\w+)")
        .expect("SHARE_LINK is a valid regex")
});

/// Microsoft Graph OneDrive connector
///
/// # Features
///
/// - Path lookups that treat 404 as "absent"
/// - Resumable chunked uploads through upload sessions
/// - Anonymous view links, rewritten to direct downloads where possible
/// - QuickXorHash content fingerprints
///
/// # Example
///
/// ```ignore
/// use provider_onedrive::OneDriveConnector;
/// use bridge_traits::storage::RemoteStore;
///
/// let connector = OneDriveConnector::new(http_client, access_token);
/// connector.upload_large("beatmaps/std/ranked/full", "1 A - B.osz", bytes).await?;
/// ```
pub struct OneDriveConnector {
    http_client: Arc<dyn HttpClient>,
    access_token: String,
    base_url: String,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl OneDriveConnector {
    /// Create a connector for `/me/drive`.
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - Graph access token with `Files.ReadWrite`
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: impl Into<String>) -> Self {
        Self {
            http_client,
            access_token: access_token.into(),
            base_url: GRAPH_API_BASE.to_string(),
            cancel: CancellationToken::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Abort upload retry waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Time source for upload session expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// `root:/{path}/{name}` with every segment escaped.
    fn item_path(path: &str, name: &str) -> String {
        path.split('/')
            .chain(std::iter::once(name))
            .filter(|segment| !segment.is_empty())
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn graph_request(&self, method: HttpMethod, endpoint: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}{}", self.base_url, endpoint))
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json")
            .timeout(Duration::from_secs(60))
    }

    fn api_error(response: &HttpResponse) -> OneDriveError {
        let message = response
            .json::<ErrorEnvelope>()
            .map(|envelope| format!("{}: {}", envelope.error.code, envelope.error.message))
            .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
        OneDriveError::ApiError {
            status_code: response.status,
            message,
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body)
            .map_err(|e| OneDriveError::ParseError(format!("Failed to parse {}: {}", what, e)))
    }

    /// Rewrite a SharePoint personal view link into its direct-download form.
    ///
    /// Links that do not look like SharePoint personal links are returned
    /// unchanged.
    pub fn direct_download_url(web_url: &str) -> String {
        match SHARE_LINK.captures(web_url) {
            Some(caps) => format!(
                "https://{}.sharepoint.com/personal/{}/_layouts/15/download.aspx?share={}",
                &caps[1], &caps[2], &caps[3]
            ),
            None => web_url.to_string(),
        }
    }

    async fn create_upload_session(&self, path: &str, name: &str) -> Result<UploadSession> {
        let endpoint = format!(
            "/me/drive/root:/{}:/createUploadSession",
            Self::item_path(path, name)
        );
        let request = self
            .graph_request(HttpMethod::Post, &endpoint)
            .header("Content-Type", "application/json")
            .body(Bytes::from_static(b"{}"));

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(OneDriveError::UploadSession(format!(
                "create session for {}/{} failed: {}",
                path,
                name,
                Self::api_error(&response)
            )));
        }

        let session: UploadSessionResponse = Self::parse(&response, "upload session")?;
        let expires_at = session
            .expiration_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| self.clock.now() + chrono::Duration::hours(1));

        debug!(%expires_at, "Upload session created");
        Ok(UploadSession {
            upload_url: session.upload_url,
            expires_at,
        })
    }

    /// PUT one chunk, retrying per the Graph resumable-upload guidance.
    ///
    /// Returns `true` once the service reports the upload complete.
    async fn put_chunk(
        &self,
        session: &UploadSession,
        chunk: Bytes,
        start: usize,
        total: usize,
    ) -> Result<bool> {
        let end = start + chunk.len() - 1;
        let range = format!("bytes {}-{}/{}", start, end, total);
        let mut server_failures = 0u32;
        let mut client_retries = CLIENT_ERROR_RETRIES;

        loop {
            if self.clock.now() >= session.expires_at {
                return Err(OneDriveError::UploadSession(
                    "upload session expired".to_string(),
                ));
            }

            // The upload URL is pre-authenticated; sending the bearer token
            // makes Graph reject the request.
            let request = HttpRequest::new(HttpMethod::Put, session.upload_url.as_str())
                .header("Content-Range", range.as_str())
                .header("Content-Length", chunk.len().to_string())
                .body(chunk.clone())
                .timeout(Duration::from_secs(300));

            let response = self.http_client.execute(request).await?;
            match response.status {
                202 => return Ok(false),
                200 | 201 => return Ok(true),
                416 => {
                    return Err(OneDriveError::UploadSession(format!(
                        "range {} already received",
                        range
                    )))
                }
                409 => {
                    return Err(OneDriveError::UploadSession(
                        "conflict while committing upload".to_string(),
                    ))
                }
                404 => {
                    return Err(OneDriveError::UploadSession(
                        "upload session not found".to_string(),
                    ))
                }
                status if status >= 500 => {
                    if server_failures >= SERVER_ERROR_RETRIES {
                        return Err(Self::api_error(&response));
                    }
                    let delay = Duration::from_secs(1 << server_failures);
                    server_failures += 1;
                    warn!(status, delay_secs = delay.as_secs(), "Server error during chunk upload, retrying");
                    self.wait(delay).await?;
                }
                status if status >= 400 => {
                    if client_retries == 0 {
                        return Err(Self::api_error(&response));
                    }
                    client_retries -= 1;
                    warn!(status, remaining = client_retries, "Client error during chunk upload, retrying");
                    self.wait(CLIENT_ERROR_DELAY).await?;
                }
                status => {
                    return Err(OneDriveError::UploadSession(format!(
                        "unexpected status {} for range {}",
                        status, range
                    )))
                }
            }
        }
    }

    async fn wait(&self, delay: Duration) -> Result<()> {
        if sleep_or_cancel(delay, &self.cancel).await {
            Ok(())
        } else {
            Err(OneDriveError::Bridge(BridgeError::Cancelled))
        }
    }
}

struct UploadSession {
    upload_url: String,
    expires_at: DateTime<Utc>,
}

#[async_trait]
impl RemoteStore for OneDriveConnector {
    #[instrument(skip(self))]
    async fn get_item(&self, path: &str, name: &str) -> BridgeResult<Option<RemoteItem>> {
        let endpoint = format!(
            "/me/drive/root:/{}?select=id,name,size,file",
            Self::item_path(path, name)
        );
        let response = self
            .http_client
            .execute(self.graph_request(HttpMethod::Get, &endpoint))
            .await?;

        if response.status == 404 {
            debug!("Item absent");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Self::api_error(&response).into());
        }

        let item: DriveItem = Self::parse(&response, "drive item")?;
        Ok(Some(RemoteItem {
            fingerprint: item.quick_xor_hash().map(str::to_string),
            id: item.id,
            name: item.name,
            size: item.size,
        }))
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn upload_large(&self, path: &str, name: &str, data: Bytes) -> BridgeResult<()> {
        if data.is_empty() {
            return Err(BridgeError::OperationFailed(format!(
                "refusing to upload empty file {}/{}",
                path, name
            )));
        }

        let session = self.create_upload_session(path, name).await?;
        let total = data.len();

        for start in (0..total).step_by(CHUNK_SIZE) {
            let end = (start + CHUNK_SIZE).min(total);
            let done = self
                .put_chunk(&session, data.slice(start..end), start, total)
                .await?;
            if done {
                break;
            }
        }

        info!(path, name, bytes = total, "Uploaded to OneDrive");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn make_share_link(&self, item_id: &str) -> BridgeResult<String> {
        let endpoint = format!("/me/drive/items/{}/createLink", urlencoding::encode(item_id));
        let request = self.graph_request(HttpMethod::Post, &endpoint).json(&CreateLinkRequest {
            link_type: "view",
            scope: "anonymous",
        })?;

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(Self::api_error(&response).into());
        }

        let link: CreateLinkResponse = Self::parse(&response, "share link")?;
        Ok(Self::direct_download_url(&link.link.web_url))
    }

    fn fingerprint_matches(&self, remote: &str, data: &[u8]) -> bool {
        quickxor::matches(remote, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn session_body() -> String {
        let expires = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
        format!(
            r#"{{"uploadUrl":"https://upload.example/session/1","expirationDateTime":"{}"}}"#,
            expires
        )
    }

    #[test]
    fn test_item_path_escapes_segments() {
        assert_eq!(
            OneDriveConnector::item_path("beatmaps/std/ranked/full", "1 A - B?.osz"),
            "beatmaps/std/ranked/full/1%20A%20-%20B%3F.osz"
        );
        assert_eq!(OneDriveConnector::item_path("", "x.osz"), "x.osz");
    }

    #[test]
    fn test_direct_download_url() {
        let web = "https://contoso-my.sharepoint.com/:u:/g/personal/user_contoso_com/EabcDEF123?e=xyz";
        assert_eq!(
            OneDriveConnector::direct_download_url(web),
            "https://contoso-my.sharepoint.com/personal/user_contoso_com/_layouts/15/download.aspx?share=EabcDEF123"
        );

        let other = "https://1drv.ms/u/s!AbCdEf";
        assert_eq!(OneDriveConnector::direct_download_url(other), other);
    }

    #[tokio::test]
    async fn test_get_item_absent() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                req.url
                    == "https://graph.microsoft.com/v1.0/me/drive/root:/beatmaps/std/1%20A%20-%20B.osz?select=id,name,size,file"
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer tok")
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    404,
                    r#"{"error":{"code":"itemNotFound","message":"missing"}}"#,
                ))
            });

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        assert!(connector
            .get_item("beatmaps/std", "1 A - B.osz")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_item_with_fingerprint() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|_| {
            Ok(response(
                200,
                r#"{"id":"01X","name":"1 A - B.osz","size":1,"file":{"hashes":{"quickXorHash":"YQAAAAAAAAAAAAAAAQAAAAAAAAA="}}}"#,
            ))
        });

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        let item = connector.get_item("p", "1 A - B.osz").await.unwrap().unwrap();

        assert_eq!(item.id, "01X");
        let fingerprint = item.fingerprint.unwrap();
        assert!(connector.fingerprint_matches(&fingerprint, b"a"));
        assert!(!connector.fingerprint_matches(&fingerprint, b"b"));
    }

    #[tokio::test]
    async fn test_get_item_server_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .returning(|_| Ok(response(503, "unavailable")));

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        let err = connector.get_item("p", "n").await.unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_upload_large_chunks_with_content_range() {
        let ranges = Arc::new(Mutex::new(Vec::new()));
        let seen = ranges.clone();
        let total = CHUNK_SIZE + 100;

        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(3).returning(move |req| {
            if req.url.ends_with(":/createUploadSession") {
                assert_eq!(req.method, HttpMethod::Post);
                return Ok(response(200, &session_body()));
            }

            assert_eq!(req.url, "https://upload.example/session/1");
            assert!(!req.headers.contains_key("Authorization"));
            let range = req.headers["Content-Range"].clone();
            let done = range.ends_with(&format!("-{}/{}", total - 1, total));
            seen.lock().unwrap().push(range);
            Ok(response(if done { 201 } else { 202 }, "{}"))
        });

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        connector
            .upload_large("beatmaps", "big.osz", Bytes::from(vec![0u8; total]))
            .await
            .unwrap();

        let ranges = ranges.lock().unwrap();
        assert_eq!(
            *ranges,
            vec![
                format!("bytes 0-{}/{}", CHUNK_SIZE - 1, total),
                format!("bytes {}-{}/{}", CHUNK_SIZE, total - 1, total),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_retries_server_errors() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, &session_body())));
        mock_http
            .expect_execute()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(502, "bad gateway")));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(201, "{}")));

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        let started = tokio::time::Instant::now();
        connector
            .upload_large("p", "n.osz", Bytes::from_static(b"PK"))
            .await
            .unwrap();

        // 1s then 2s of backoff
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[tokio::test]
    async fn test_expired_session_stops_upload() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .times(1)
            .withf(|req| req.url.ends_with(":/createUploadSession"))
            .returning(|_| Ok(response(200, &session_body())));

        let later = Utc::now() + chrono::Duration::hours(2);
        let connector =
            OneDriveConnector::new(Arc::new(mock_http), "tok").with_clock(Arc::new(FixedClock(later)));
        let err = connector
            .upload_large("p", "n.osz", Bytes::from_static(b"PK"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(msg) if msg.contains("expired")));
    }

    #[tokio::test]
    async fn test_upload_conflict_fails() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = mockall::Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(200, &session_body())));
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(response(409, "{}")));

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        let err = connector
            .upload_large("p", "n.osz", Bytes::from_static(b"PK"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::OperationFailed(_)));
    }

    #[tokio::test]
    async fn test_make_share_link() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_execute()
            .withf(|req| {
                let body: serde_json::Value =
                    serde_json::from_slice(req.body.as_ref().unwrap()).unwrap();
                req.url.ends_with("/me/drive/items/01X/createLink")
                    && body == serde_json::json!({"type": "view", "scope": "anonymous"})
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    201,
                    r#"{"link":{"type":"view","webUrl":"https://t-my.sharepoint.com/:u:/g/personal/me_t_com/Eshare1"}}"#,
                ))
            });

        let connector = OneDriveConnector::new(Arc::new(mock_http), "tok");
        let link = connector.make_share_link("01X").await.unwrap();
        assert_eq!(
            link,
            "https://t-my.sharepoint.com/personal/me_t_com/_layouts/15/download.aspx?share=Eshare1"
        );
    }
}
