//! Per-editor preview builds.
//!
//! # Flow
//!
//! ```text
//! GET /preview?token=T
//!     │
//!     ├── PreviewKey::derive(T)        blake3(T) as hex
//!     │
//!     ├── PreviewCache::ensure()       one build per key in flight
//!     │       └── preview_pipeline()   Documents(T) + replace rules + rewriters
//!     │                 ──► <output>/preview/<key>/
//!     │
//!     └── handoff()                    cookie + CMS redirect
//! ```
//!
//! Entries are reclaimed by the [`Sweeper`] once their directory is older
//! than the configured preview age.

mod cache;
mod rewrite;
mod session;
mod sweeper;

pub use cache::{BuildOutcome, PreviewCache};
pub use session::{PreviewSession, handoff};
pub use sweeper::{Sweeper, sweep};

use crate::{
    build,
    cms::{CmsClient, ContentRef, PreviewToken},
    config::SiteConfig,
    log,
    pipeline::{BuildError, Pipeline},
};
use std::{fmt, sync::Arc, time::Instant};

/// URL prefix under which the output root is served.
pub const BUILDS_MOUNT: &str = "/builds";

/// URL prefix of the preview cache.
const PREVIEW_MOUNT: &str = "/builds/preview";

// ============================================================================
// Preview Key
// ============================================================================

/// Cache directory name for a preview token.
///
/// A hex-encoded blake3 digest: fixed length, filesystem safe and stable
/// across processes, so entries written before a restart stay reachable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewKey(String);

impl PreviewKey {
    pub fn derive(token: &str) -> Self {
        Self(hex::encode(blake3::hash(token.as_bytes()).as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// URL path a preview build is served from, without trailing slash.
pub fn mount_path(key: &PreviewKey) -> String {
    format!("{PREVIEW_MOUNT}/{key}")
}

/// Production pipeline pointed at draft content, writing into the key's
/// cache entry and rewriting HTML for the nested mount path.
pub fn preview_pipeline(
    config: &SiteConfig,
    cms: Arc<dyn CmsClient>,
    token: &PreviewToken,
    key: &PreviewKey,
) -> Result<Pipeline, BuildError> {
    let mut pipeline = build::pipeline(
        config,
        cms,
        ContentRef::Preview(token.clone()),
        config.preview_root().join(key.as_str()),
    )?;

    let rewriters = rewrite::rewriters(key, &config.preview.script)
        .map_err(|err| BuildError::Failed(format!("invalid preview rewriter: {err}")))?;
    for rewriter in rewriters {
        pipeline = pipeline.plugin(rewriter);
    }

    Ok(pipeline)
}

// ============================================================================
// Preview Builder
// ============================================================================

/// Builds (or reuses) a token's preview and prepares the session handoff.
pub struct PreviewBuilder {
    config: Arc<SiteConfig>,
    cms: Arc<dyn CmsClient>,
    cache: PreviewCache,
}

impl PreviewBuilder {
    pub fn new(config: Arc<SiteConfig>, cms: Arc<dyn CmsClient>) -> Self {
        let cache = PreviewCache::new(
            config.preview_root(),
            config.preview_age(),
            config.preview.reuse_fresh,
        );
        Self { config, cms, cache }
    }

    /// Make sure `token`'s preview exists, then resolve where to send the
    /// editor.
    ///
    /// Build errors are returned as-is for the HTTP layer to classify.
    /// Session lookup errors never fail the call.
    pub async fn open(&self, token: &PreviewToken) -> Result<PreviewSession, BuildError> {
        let key = PreviewKey::derive(token.as_str());
        let start = Instant::now();

        let outcome = self
            .cache
            .ensure(&key, |slot| {
                let pipeline = preview_pipeline(&self.config, Arc::clone(&self.cms), token, &key);
                let limit = self.config.build_timeout();
                async move { build::run_blocking(pipeline?, limit, slot).await }
            })
            .await;

        match &outcome {
            Ok(BuildOutcome::Built(count)) => log!(
                "preview"; "built {key}: {count} files in {:.2}s",
                start.elapsed().as_secs_f64()
            ),
            Ok(BuildOutcome::Reused) => log!("preview"; "reusing {key}"),
            Err(err) if err.is_not_found() => log!("preview"; "no content for {key}: {err}"),
            Err(err) => log!("error"; "preview build {key} failed: {err:#}"),
        }
        outcome?;

        Ok(handoff(Arc::clone(&self.cms), &self.config, token, &key).await)
    }
}
