mod models_catalog;
mod request_id;

use bytes::Bytes;

use crate::auth::{authenticate, build_allowed_key_set, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::transport::HttpTransport;

use models_catalog::build_models_response_body;
use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
    models_response_body: Bytes,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, transport: HttpTransport) -> Self {
        let allowed_client_keys = build_allowed_key_set(&config.client_authentication);
        let models_response_body = build_models_response_body(&config.backend.deployment);
        Self {
            config,
            transport,
            allowed_client_keys,
            request_ids: RequestIdGenerator::new(),
            models_response_body,
        }
    }

    /// Build the transport from `config` and wrap both.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] when the HTTP client cannot be built.
    pub fn from_config(config: AppConfig) -> Result<Self, GatewayError> {
        let transport = HttpTransport::new(&config.server, &config.backend)?;
        Ok(Self::new(config, transport))
    }

    pub fn next_request_seq(&self) -> u64 {
        self.request_ids.next_seq()
    }

    /// Authenticate a request using the prebuilt key index.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Auth` when the API key is missing or invalid.
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    #[must_use]
    pub fn completion_id(&self, request_seq: u64) -> String {
        self.request_ids.completion_id(request_seq)
    }

    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}
