//! `[cms]` section configuration.
//!
//! Contains the CMS repository endpoint and its credentials. The three
//! credentials are usually supplied through `PRISMIC_URL`, `PRISMIC_TOKEN`
//! and `PRISMIC_SECRET` rather than committed to the config file.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[cms]` section in builds.toml - CMS repository settings.
///
/// # Example
/// ```toml
/// [cms]
/// api_url = "https://my-repo.cdn.prismic.io/api/v2"
/// release = "master"
/// link_resolver = "/{type}/{uid}/"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CmsConfig {
    /// URL of the repository API entry point.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Repository access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Shared secret the webhook must present on `POST /build`.
    #[serde(default)]
    pub secret: Option<String>,

    /// Release (ref label) used for production builds.
    #[serde(default = "defaults::cms::release")]
    #[educe(Default = defaults::cms::release())]
    pub release: String,

    /// Path template mapping a document to its site path.
    /// Placeholders: `{type}`, `{uid}`, `{id}`, `{lang}`.
    #[serde(default = "defaults::cms::link_resolver")]
    #[educe(Default = defaults::cms::link_resolver())]
    pub link_resolver: String,

    /// Cookie name the CMS preview toolbar reads.
    #[serde(default = "defaults::cms::preview_cookie")]
    #[educe(Default = defaults::cms::preview_cookie())]
    pub preview_cookie: String,

    /// Timeout for a single CMS API request.
    #[serde(default = "defaults::cms::timeout")]
    #[educe(Default = defaults::cms::timeout())]
    pub timeout: String,
}
