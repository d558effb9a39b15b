//! Handing an editor over to their preview build.
//!
//! The response to `GET /preview` carries two things:
//!
//! - a cookie holding the raw token, scoped to the preview's mount path and
//!   readable by the CMS toolbar script (no `HttpOnly`);
//! - a redirect to the page the CMS says the editor was looking at.
//!
//! A failed redirect lookup still produces both, pointing at the root of
//! the preview build.

use super::{PreviewKey, mount_path};
use crate::{
    cms::{CmsClient, LinkResolver, PreviewToken},
    config::SiteConfig,
    log,
};
use std::{sync::Arc, time::Duration};

/// Redirect target when the CMS does not name a document.
const DEFAULT_URL: &str = "/";

/// Cookie and redirect for one preview request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewSession {
    /// Value of the `Set-Cookie` header.
    pub cookie: String,
    /// Value of the `Location` header.
    pub location: String,
}

/// `Set-Cookie` value carrying `token`.
pub fn preview_cookie(name: &str, token: &PreviewToken, path: &str, max_age: Duration) -> String {
    format!(
        "{name}={}; Max-Age={}; Path={path}",
        urlencoding::encode(token.as_str()),
        max_age.as_secs()
    )
}

/// Place a site-relative URL under `mount`. Absolute URLs are kept.
pub fn redirect_location(resolved: &str, mount: &str) -> String {
    if resolved.starts_with('/') && !resolved.starts_with("//") {
        format!("{mount}{resolved}")
    } else {
        resolved.to_owned()
    }
}

/// Resolve the CMS redirect for `token` and build the session response.
///
/// Never fails: lookup errors and timeouts are logged and fall back to the
/// preview root.
pub async fn handoff(
    cms: Arc<dyn CmsClient>,
    config: &SiteConfig,
    token: &PreviewToken,
    key: &PreviewKey,
) -> PreviewSession {
    let mount = mount_path(key);
    let resolver = LinkResolver::new(config.cms.link_resolver.as_str());
    let limit = config.cms_timeout();

    let lookup = {
        let token = token.clone();
        tokio::task::spawn_blocking(move || cms.preview_session(&token, &resolver, DEFAULT_URL))
    };

    let resolved = match tokio::time::timeout(limit, lookup).await {
        Ok(Ok(Ok(url))) => url,
        Ok(Ok(Err(err))) => {
            log!("error"; "preview session for {key}: {err}");
            DEFAULT_URL.to_owned()
        }
        Ok(Err(err)) => {
            log!("error"; "preview session for {key}: {err}");
            DEFAULT_URL.to_owned()
        }
        Err(_) => {
            log!("error"; "preview session for {key} timed out after {}s", limit.as_secs());
            DEFAULT_URL.to_owned()
        }
    };

    PreviewSession {
        cookie: preview_cookie(
            &config.cms.preview_cookie,
            token,
            &mount,
            config.preview_age(),
        ),
        location: redirect_location(&resolved, &mount),
    }
}
