//! Shared fixtures for unit tests.

use crate::{
    cms::{CmsClient, CmsError, ContentRef, Document, LinkResolver, PreviewToken},
    config::SiteConfig,
};
use rustc_hash::FxHashMap;
use std::{
    fs,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
    time::Duration,
};
use tempfile::TempDir;

pub const API_URL: &str = "https://repo.cdn.prismic.io/api/v2";
pub const SECRET: &str = "s3cret";

/// Page written into every fixture source tree.
pub const INDEX_HTML: &str =
    "<html><head><link href=\"/css/a.css\"></head><body><a href=\"https://cms.io/x\">x</a></body></html>";

pub fn document(id: &str, uid: Option<&str>, doc_type: &str) -> Document {
    Document {
        id: id.into(),
        uid: uid.map(Into::into),
        doc_type: doc_type.into(),
        lang: Some("en-us".into()),
        data: serde_json::json!({ "title": id }),
        extra: serde_json::Map::new(),
    }
}

/// In-memory CMS.
///
/// Releases and preview tokens map to fixed document lists. Unknown
/// preview tokens report `NotFound`, like the real API does for an expired
/// or forged token.
#[derive(Default)]
pub struct FakeCms {
    releases: FxHashMap<String, Vec<Document>>,
    previews: FxHashMap<String, Vec<Document>>,
    main_documents: FxHashMap<String, String>,
    failing_documents: bool,
    failing_sessions: bool,
    delay: Duration,
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl FakeCms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_release(mut self, release: &str, documents: Vec<Document>) -> Self {
        self.releases.insert(release.into(), documents);
        self
    }

    pub fn with_preview(mut self, token: &str, documents: Vec<Document>) -> Self {
        self.previews.insert(token.into(), documents);
        self
    }

    /// Name the document a preview session opens on.
    pub fn with_main_document(mut self, token: &str, id: &str) -> Self {
        self.main_documents.insert(token.into(), id.into());
        self
    }

    /// Make every document query fail with a server error.
    pub fn failing_documents(mut self) -> Self {
        self.failing_documents = true;
        self
    }

    /// Make every session lookup fail with a transport error.
    pub fn failing_sessions(mut self) -> Self {
        self.failing_sessions = true;
        self
    }

    /// Block every document query for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of document queries served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most document queries ever running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl CmsClient for FakeCms {
    fn documents(&self, content: &ContentRef) -> Result<Vec<Document>, CmsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.failing_documents {
            return Err(CmsError::Status {
                status: 500,
                url: API_URL.into(),
            });
        }

        match content {
            ContentRef::Release(release) => self
                .releases
                .get(release)
                .cloned()
                .ok_or_else(|| CmsError::UnknownRelease(release.clone())),
            ContentRef::Preview(token) => self
                .previews
                .get(token.as_str())
                .cloned()
                .ok_or_else(|| CmsError::NotFound(API_URL.into())),
        }
    }

    fn preview_session(
        &self,
        token: &PreviewToken,
        resolver: &LinkResolver,
        default_url: &str,
    ) -> Result<String, CmsError> {
        if self.failing_sessions {
            return Err(CmsError::Transport {
                url: token.as_str().into(),
                reason: "connection reset".into(),
            });
        }

        let documents = self
            .previews
            .get(token.as_str())
            .ok_or_else(|| CmsError::NotFound(token.as_str().into()))?;

        let main = self
            .main_documents
            .get(token.as_str())
            .and_then(|id| documents.iter().find(|doc| &doc.id == id));

        Ok(main.map_or_else(|| default_url.to_owned(), |doc| resolver.resolve(doc)))
    }
}

/// A project directory with a small source tree and a config pointing at it.
pub fn site() -> (TempDir, SiteConfig) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    fs::create_dir_all(root.join("src/css")).unwrap();
    fs::write(root.join("src/index.html"), INDEX_HTML).unwrap();
    fs::write(root.join("src/css/a.css"), "body { color: red }").unwrap();

    let mut config = SiteConfig::default();
    config.set_root(root);
    config.build.source = root.join("src");
    config.build.output = root.join("builds");
    config.cms.api_url = Some(API_URL.into());
    config.cms.secret = Some(SECRET.into());

    (dir, config)
}
