//! Headless CMS access.
//!
//! The server talks to the CMS through the [`CmsClient`] trait so the build
//! pipeline and the preview handoff can be exercised without a network.
//! [`prismic::PrismicClient`] is the production implementation.

pub mod prismic;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Types
// ============================================================================

/// Opaque preview token issued by the CMS.
///
/// Never validated locally. It is hashed into a cache key, passed to the
/// CMS as a content ref and echoed back in the preview cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PreviewToken(String);

impl PreviewToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens grant draft access; keep them out of logs.
impl fmt::Debug for PreviewToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreviewToken(..)")
    }
}

/// Which version of the repository content a build reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// Published content of a named release (`"master"` = live content).
    Release(String),
    /// Draft content scoped to an editor's preview session.
    Preview(PreviewToken),
}

/// A single CMS document.
///
/// Fields the server does not interpret are kept in `extra` so they survive
/// into the JSON files the pipeline writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    #[serde(default)]
    pub uid: Option<String>,

    #[serde(rename = "type")]
    pub doc_type: String,

    #[serde(default)]
    pub lang: Option<String>,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// The document's uid, falling back to its id.
    pub fn slug(&self) -> &str {
        self.uid.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// Link Resolver
// ============================================================================

/// Maps a document to its path on the built site.
///
/// The template understands `{type}`, `{uid}`, `{id}` and `{lang}`.
/// `{uid}` falls back to the id for documents without a uid.
///
/// # Examples
///
/// | Template | Document | Path |
/// |----------|----------|------|
/// | `/{type}/{uid}/` | `post` / `hello` | `/post/hello/` |
/// | `/{lang}/{uid}` | `en-us` / `about` | `/en-us/about` |
#[derive(Debug, Clone)]
pub struct LinkResolver {
    template: String,
}

impl LinkResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn resolve(&self, document: &Document) -> String {
        self.template
            .replace("{type}", &document.doc_type)
            .replace("{uid}", document.slug())
            .replace("{id}", &document.id)
            .replace("{lang}", document.lang.as_deref().unwrap_or_default())
    }
}

// ============================================================================
// Client
// ============================================================================

/// CMS-related errors
#[derive(Debug, Error)]
pub enum CmsError {
    /// The CMS has nothing at this location (unknown token, deleted document).
    #[error("no content found at `{0}`")]
    NotFound(String),

    #[error("unexpected status code [{status}] from `{url}`")]
    Status { status: u16, url: String },

    #[error("request to `{url}` failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("invalid response from `{url}`: {reason}")]
    Decode { url: String, reason: String },

    #[error("repository has no release named `{0}`")]
    UnknownRelease(String),
}

/// Read access to CMS content.
///
/// Implementations are blocking; callers on the async runtime go through
/// `spawn_blocking`.
pub trait CmsClient: Send + Sync {
    /// Every document visible at `content`.
    fn documents(&self, content: &ContentRef) -> Result<Vec<Document>, CmsError>;

    /// Where the CMS wants an editor sent after a preview build.
    ///
    /// Resolves the session's main document through `resolver`, or returns
    /// `default_url` when the session does not name one.
    fn preview_session(
        &self,
        token: &PreviewToken,
        resolver: &LinkResolver,
        default_url: &str,
    ) -> Result<String, CmsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(uid: Option<&str>) -> Document {
        Document {
            id: "XyZ123".into(),
            uid: uid.map(Into::into),
            doc_type: "post".into(),
            lang: Some("en-us".into()),
            data: serde_json::json!({ "title": "Hello" }),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_link_resolver_default_template() {
        let resolver = LinkResolver::new("/{type}/{uid}/");
        assert_eq!(resolver.resolve(&document(Some("hello"))), "/post/hello/");
    }

    #[test]
    fn test_link_resolver_uid_falls_back_to_id() {
        let resolver = LinkResolver::new("/{type}/{uid}/");
        assert_eq!(resolver.resolve(&document(None)), "/post/XyZ123/");
    }

    #[test]
    fn test_link_resolver_all_placeholders() {
        let resolver = LinkResolver::new("/{lang}/{type}/{id}/{uid}");
        assert_eq!(
            resolver.resolve(&document(Some("hello"))),
            "/en-us/post/XyZ123/hello"
        );
    }

    #[test]
    fn test_document_keeps_unknown_fields() {
        let json = r#"{
            "id": "A1",
            "uid": "home",
            "type": "page",
            "tags": ["featured"],
            "data": { "title": "Home" }
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();

        assert_eq!(doc.slug(), "home");
        assert_eq!(doc.doc_type, "page");
        assert!(doc.lang.is_none());
        assert_eq!(doc.extra.get("tags"), Some(&serde_json::json!(["featured"])));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["type"], "page");
        assert_eq!(back["tags"][0], "featured");
    }

    #[test]
    fn test_preview_token_debug_is_redacted() {
        let token = PreviewToken::new("https://repo.prismic.io/previews/secret");
        assert_eq!(format!("{token:?}"), "PreviewToken(..)");
        assert_eq!(token.as_str(), "https://repo.prismic.io/previews/secret");
    }

    #[test]
    fn test_cms_error_display() {
        let err = CmsError::Status {
            status: 500,
            url: "https://repo/api".into(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected status code [500] from `https://repo/api`"
        );
    }
}
