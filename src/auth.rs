use crate::config::ClientAuthConfig;
use crate::error::GatewayError;
use http::header::AUTHORIZATION;
use rustc_hash::FxHashSet;

const BEARER_PREFIX: &str = "Bearer ";

/// Compact key index used in hot-path authentication.
pub enum AllowedClientKeys {
    Empty,
    /// A single key, pre-rendered as the full `Authorization` header value so
    /// the check is one byte comparison.
    Single { bearer: Box<str> },
    Multiple(FxHashSet<String>),
}

/// Extract the client key from `Authorization: Bearer <key>`.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when the header is absent, not valid
/// text, or not a bearer credential.
pub fn extract_api_key(headers: &http::HeaderMap) -> Result<&str, GatewayError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| GatewayError::Auth("Missing API key".to_string()))
}

/// Authenticate an incoming request against the pre-indexed allowed keys.
///
/// # Errors
///
/// Returns `GatewayError::Auth` when the API key is missing or invalid.
pub fn authenticate(
    headers: &http::HeaderMap,
    allowed_keys: &AllowedClientKeys,
) -> Result<(), GatewayError> {
    match allowed_keys {
        AllowedClientKeys::Single { bearer } => match headers.get(AUTHORIZATION) {
            Some(value) if value.as_bytes() == bearer.as_bytes() => Ok(()),
            Some(_) => Err(GatewayError::Auth("Invalid API key".to_string())),
            None => Err(GatewayError::Auth("Missing API key".to_string())),
        },
        AllowedClientKeys::Multiple(allowed_set) => {
            let client_key = extract_api_key(headers)?;
            if allowed_set.contains(client_key) {
                Ok(())
            } else {
                Err(GatewayError::Auth("Invalid API key".to_string()))
            }
        }
        AllowedClientKeys::Empty => Err(GatewayError::Auth("Invalid API key".to_string())),
    }
}

/// Build a hash-set index for allowed client keys.
#[must_use]
pub fn build_allowed_key_set(config: &ClientAuthConfig) -> AllowedClientKeys {
    let mut allowed_set: FxHashSet<String> = config.allowed_keys.iter().cloned().collect();

    match allowed_set.len() {
        0 => AllowedClientKeys::Empty,
        1 => match allowed_set.drain().next() {
            Some(single_key) => AllowedClientKeys::Single {
                bearer: format!("{BEARER_PREFIX}{single_key}").into_boxed_str(),
            },
            None => AllowedClientKeys::Empty,
        },
        _ => AllowedClientKeys::Multiple(allowed_set),
    }
}
