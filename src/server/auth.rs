//! Webhook authentication for `POST /build`.
//!
//! The CMS webhook posts `{"apiUrl": .., "secret": ..}`; both must equal
//! the configured values. Comparison is constant time.

use crate::config::SiteConfig;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Body of a `POST /build` request. Missing fields are empty.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildRequest {
    pub api_url: String,
    pub secret: String,
}

/// Which credential did not match. Logged, never sent to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("webhook secret does not match")]
    Secret,

    #[error("api url does not match")]
    ApiUrl,
}

/// Accept `request` only if it carries the configured secret and API URL.
pub fn authenticate(request: &BuildRequest, config: &SiteConfig) -> Result<(), AuthError> {
    if !credential_matches(&request.secret, config.cms.secret.as_deref()) {
        return Err(AuthError::Secret);
    }
    if !credential_matches(&request.api_url, config.cms.api_url.as_deref()) {
        return Err(AuthError::ApiUrl);
    }
    Ok(())
}

/// An unset credential matches nothing.
fn credential_matches(claimed: &str, expected: Option<&str>) -> bool {
    expected.is_some_and(|expected| bool::from(claimed.as_bytes().ct_eq(expected.as_bytes())))
}
