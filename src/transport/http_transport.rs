use std::time::Duration;

use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};

use crate::config::{BackendConfig, ServerConfig};
use crate::error::GatewayError;
use crate::protocol::openai_responses::ResponsesRequest;
use crate::util::truncate_on_char_boundary;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("api-key");
const MAX_UPSTREAM_ERROR_LEN: usize = 500;

fn build_reqwest_client(
    server: &ServerConfig,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, GatewayError> {
    let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
        None
    } else {
        Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
    };

    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(server.http_pool_max_idle_per_host.max(1))
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(Duration::from_secs(5))
        .redirect(reqwest::redirect::Policy::none())
        .read_timeout(Duration::from_secs(server.stream_idle_timeout));

    if let Some(proxy_url) = proxy_url.map(str::trim).filter(|p| !p.is_empty()) {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| GatewayError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.no_proxy().proxy(proxy);
    } else if !server.http_use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| GatewayError::Config(format!("Failed to build HTTP client: {err}")))
}

/// The backend endpoint: `{base_url}/responses`, plus `api-version` when
/// configured.
#[must_use]
pub fn build_responses_url(backend: &BackendConfig) -> String {
    let mut url = String::with_capacity(backend.base_url.len() + 48);
    url.push_str(backend.base_url.trim().trim_end_matches('/'));
    url.push_str("/responses");
    if let Some(version) = backend
        .api_version
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        url.push_str("?api-version=");
        url.push_str(version);
    }
    url
}

/// Pull `error.message` out of a backend error body, falling back to the
/// raw text. Either way the result is truncated.
#[must_use]
pub fn sanitize_upstream_error(body: &[u8]) -> String {
    let message = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string());

    if message.len() > MAX_UPSTREAM_ERROR_LEN {
        format!(
            "{}...",
            truncate_on_char_boundary(&message, MAX_UPSTREAM_ERROR_LEN)
        )
    } else {
        message
    }
}

/// HTTP client for the Responses backend.
///
/// Holds one pooled `reqwest` client; the URL and static headers are built
/// once at startup. Only the wait for response headers is bounded by
/// `server.timeout`; a streaming body is bounded by the idle read timeout.
pub struct HttpTransport {
    client: reqwest::Client,
    responses_url: url::Url,
    headers: HeaderMap,
    header_timeout: Duration,
}

impl HttpTransport {
    /// Create the transport from server pool settings and the backend section.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the URL, API key or proxy
    /// cannot be used to build a client.
    pub fn new(server: &ServerConfig, backend: &BackendConfig) -> Result<Self, GatewayError> {
        let client = build_reqwest_client(server, backend.proxy.as_deref())?;
        let responses_url = url::Url::parse(&build_responses_url(backend))
            .map_err(|err| GatewayError::Config(format!("Invalid backend URL: {err}")))?;

        let mut api_key = HeaderValue::from_str(backend.api_key.trim())
            .map_err(|_| GatewayError::Config("backend.api_key is not a valid header value".into()))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::with_capacity(3);
        headers.insert(API_KEY_HEADER, api_key);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

        Ok(Self {
            client,
            responses_url,
            headers,
            header_timeout: Duration::from_secs(server.timeout),
        })
    }

    #[must_use]
    pub fn responses_url(&self) -> &url::Url {
        &self.responses_url
    }

    /// POST `body` and return the response once a 2xx status arrives. The
    /// body is left unread for the caller to stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Transport`] when the request cannot be sent
    /// or no response headers arrive within `server.timeout`, or
    /// [`GatewayError::Upstream`] carrying the backend status and a
    /// truncated message for non-2xx responses.
    pub async fn open_responses_stream(
        &self,
        body: &ResponsesRequest,
    ) -> Result<reqwest::Response, GatewayError> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| GatewayError::Internal(format!("Failed to encode request: {err}")))?;

        let mut request = reqwest::Request::new(http::Method::POST, self.responses_url.clone());
        *request.headers_mut() = self.headers.clone();
        *request.body_mut() = Some(reqwest::Body::from(payload));

        let response = tokio::time::timeout(self.header_timeout, self.client.execute(request))
            .await
            .map_err(|_| {
                GatewayError::Transport(format!(
                    "Backend did not respond within {}s",
                    self.header_timeout.as_secs()
                ))
            })?
            .map_err(|err| {
                if err.is_timeout() {
                    GatewayError::Transport(format!("Backend request timed out: {err}"))
                } else {
                    GatewayError::Transport(format!("Backend request failed: {err}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_bytes = response
                .bytes()
                .await
                .map_err(|e| GatewayError::Transport(format!("Failed to read response body: {e}")))?;
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                message: sanitize_upstream_error(&body_bytes),
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(base_url: &str, api_version: Option<&str>) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            api_key: "k".to_string(),
            deployment: "d".to_string(),
            api_version: api_version.map(str::to_string),
            proxy: None,
        }
    }

    #[test]
    fn test_responses_url_trims_trailing_slash() {
        let url = build_responses_url(&backend("https://x.openai.azure.com/openai/v1/", None));
        assert_eq!(url, "https://x.openai.azure.com/openai/v1/responses");
    }

    #[test]
    fn test_responses_url_appends_api_version() {
        let url = build_responses_url(&backend(
            "https://x.openai.azure.com/openai",
            Some("2025-04-01-preview"),
        ));
        assert_eq!(
            url,
            "https://x.openai.azure.com/openai/responses?api-version=2025-04-01-preview"
        );
    }

    #[test]
    fn test_sanitize_extracts_error_message() {
        let body = br#"{"error":{"message":"deployment not found","code":"404"}}"#;
        assert_eq!(sanitize_upstream_error(body), "deployment not found");
    }

    #[test]
    fn test_sanitize_truncates_plain_text() {
        let body = "x".repeat(2000);
        let message = sanitize_upstream_error(body.as_bytes());
        assert_eq!(message.len(), MAX_UPSTREAM_ERROR_LEN + 3);
        assert!(message.ends_with("..."));
    }

    #[test]
    fn test_transport_builds_static_headers() {
        let transport =
            HttpTransport::new(&ServerConfig::default(), &backend("http://127.0.0.1:9", None))
                .unwrap();
        assert_eq!(
            transport.responses_url().as_str(),
            "http://127.0.0.1:9/responses"
        );
        assert_eq!(transport.headers.get("api-key").unwrap(), "k");
        assert_eq!(
            transport.headers.get(ACCEPT).unwrap(),
            "text/event-stream"
        );
        assert_eq!(transport.header_timeout, Duration::from_secs(180));
    }
}
