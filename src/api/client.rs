//! Business-facing API client.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use super::transport::{ApiRequest, ApiResponse, ReqwestTransport, RetryingTransport, Transport};
use super::ApiError;
use crate::config::{ClientConfig, Credentials};

/// Client for the Rev.com API v1.
///
/// Holds the base URL and the rendered `Authorization` header. Cloning is
/// cheap: the underlying transport and its connection pool are shared.
#[derive(Clone)]
pub struct RevClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    auth_header: Option<String>,
}

impl fmt::Debug for RevClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.auth_header.is_some())
            .finish_non_exhaustive()
    }
}

impl RevClient {
    /// Builds a client over the production transport with retries.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(config: &ClientConfig, credentials: Option<&Credentials>) -> Result<Self, ApiError> {
        let inner = ReqwestTransport::with_timeouts(config.connect_timeout, config.read_timeout)?;
        let transport = RetryingTransport::new(inner, config.retry.clone());
        Ok(Self::with_transport(
            Arc::new(transport),
            &config.base_url,
            credentials,
        ))
    }

    /// Builds a client over an arbitrary transport.
    #[must_use]
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        credentials: Option<&Credentials>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: credentials.map(Credentials::auth_header),
        }
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins `path` (leading slash, already percent-encoded) and `query` onto the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] when the result is not a valid URL.
    pub fn endpoint_url(&self, path: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let raw = format!("{}{path}", self.base_url);
        let mut url = Url::parse(&raw).map_err(|_| ApiError::invalid_url(&raw))?;
        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url.into())
    }

    /// GETs `path` and parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status or a body
    /// that does not match `T`.
    #[instrument(skip(self, query), fields(path = %path))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(path, query)?;
        let response = self
            .execute(ApiRequest::get(&url).with_header("Accept", "application/json"))
            .await?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::invalid_json(url, e))
    }

    /// GETs `path` and returns the raw body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure or non-2xx status.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get_bytes(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint_url(path, &[])?;
        let response = self.execute(ApiRequest::get(url)).await?;
        Ok(response.body)
    }

    /// POSTs a JSON body to `path` and parses the JSON reply.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] on transport failure, non-2xx status or an
    /// unexpected reply body.
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(path, &[])?;
        let response = self
            .execute(
                ApiRequest::post_json(&url, body.clone()).with_header("Accept", "application/json"),
            )
            .await?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::invalid_json(url, e))
    }

    /// Issues a one-record listing call to confirm reachability and credentials.
    ///
    /// # Errors
    ///
    /// Returns the [`ApiError`] of the failed call.
    pub async fn test_connection(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .get_json(
                "/orders",
                &[("page", "0".to_string()), ("results_per_page", "1".to_string())],
            )
            .await?;
        info!(base_url = %self.base_url, "connection to Rev API succeeded");
        Ok(())
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if let Some(auth) = &self.auth_header {
            request = request.with_header("Authorization", auth.as_str());
        }
        let response = self.transport.send(&request).await?;
        if !response.is_success() {
            debug!(url = %request.url, status = response.status, "request failed");
            return Err(ApiError::http_status_with_retry_after(
                request.url,
                response.status,
                response.retry_after,
            ));
        }
        Ok(response)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::api::Method;

    /// Records requests and answers every one with the same response.
    struct FixedTransport {
        response: ApiResponse,
        seen: Mutex<Vec<ApiRequest>>,
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    fn client_with(
        response: ApiResponse,
        credentials: Option<&Credentials>,
    ) -> (RevClient, Arc<FixedTransport>) {
        let transport = Arc::new(FixedTransport {
            response,
            seen: Mutex::new(Vec::new()),
        });
        let client = RevClient::with_transport(
            Arc::clone(&transport) as Arc<dyn Transport>,
            "http://api.test/api/v1/",
            credentials,
        );
        (client, transport)
    }

    #[test]
    fn test_endpoint_url_joins_base_and_query() {
        let (client, _) = client_with(ApiResponse::new(200, "{}"), None);
        let url = client
            .endpoint_url("/orders", &[("page", "2".to_string()), ("results_per_page", "50".to_string())])
            .unwrap();
        assert_eq!(url, "http://api.test/api/v1/orders?page=2&results_per_page=50");
    }

    #[tokio::test]
    async fn test_authorization_header_attached() {
        let credentials = Credentials::key_pair("client", "user");
        let (client, transport) = client_with(ApiResponse::new(200, "{}"), Some(&credentials));

        client.test_connection().await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].header("Authorization"), Some("Rev client:user"));
        assert_eq!(
            seen[0].url,
            "http://api.test/api/v1/orders?page=0&results_per_page=1"
        );
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_http_status_error() {
        let (client, _) = client_with(
            ApiResponse {
                status: 429,
                retry_after: Some("7".to_string()),
                body: Vec::new(),
            },
            None,
        );

        let error = client.get_bytes("/attachments/a1/content").await.unwrap_err();

        match error {
            ApiError::HttpStatus {
                status,
                retry_after,
                url,
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after.as_deref(), Some("7"));
                assert!(url.ends_with("/attachments/a1/content"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_json_maps_to_invalid_json() {
        let (client, _) = client_with(ApiResponse::new(200, "<html>"), None);
        let result: Result<serde_json::Value, _> = client.get_json("/orders/1", &[]).await;
        assert!(matches!(result, Err(ApiError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_post_json_sends_body() {
        let (client, transport) = client_with(ApiResponse::new(200, r#"{"ok":true}"#), None);

        let reply: serde_json::Value = client
            .post_json("/orders", &serde_json::json!({"client_ref": "x"}))
            .await
            .unwrap();

        assert_eq!(reply["ok"], true);
        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].json_body, Some(serde_json::json!({"client_ref": "x"})));
    }

    #[test]
    fn test_debug_hides_auth_header() {
        let credentials = Credentials::api_key("top-secret");
        let (client, _) = client_with(ApiResponse::new(200, "{}"), Some(&credentials));
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("top-secret"));
        assert!(rendered.contains("authenticated: true"));
    }
}
