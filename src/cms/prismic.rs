//! Prismic REST API (v2) client.
//!
//! # Requests
//!
//! | Operation | Request |
//! |-----------|---------|
//! | Resolve a release | `GET {api}` → `refs[]` |
//! | List documents | `GET {api}/documents/search?ref=..&page=..` |
//! | Preview session | `GET {token}` → `mainDocument` |
//!
//! A preview token is itself a URL and doubles as the content ref for
//! draft queries.

use super::{CmsClient, CmsError, ContentRef, Document, LinkResolver, PreviewToken};
use crate::log;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use ureq::Agent;

/// Documents requested per search page (API maximum).
const PAGE_SIZE: &str = "100";

/// Release name that selects the repository's live ref.
const MASTER_RELEASE: &str = "master";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiEntry {
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRef {
    id: String,
    #[serde(rename = "ref")]
    content_ref: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    is_master_ref: bool,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    results: Vec<Document>,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreviewSession {
    #[serde(default)]
    main_document: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Blocking Prismic client.
#[derive(Clone)]
pub struct PrismicClient {
    api_url: String,
    access_token: Option<String>,
    agent: Agent,
}

impl PrismicClient {
    pub fn new(api_url: &str, access_token: Option<String>, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();

        Self {
            api_url: api_url.trim_end_matches('/').to_owned(),
            access_token: access_token.filter(|t| !t.is_empty()),
            agent: Agent::new_with_config(config),
        }
    }

    /// Look up the content ref id for a release.
    fn resolve_release(&self, release: &str) -> Result<String, CmsError> {
        let entry: ApiEntry = self.get_json(&self.api_url, &[], true)?;
        select_ref(&entry.refs, release)
    }

    /// Fetch every page of a document search at `content_ref`.
    fn search_all(&self, content_ref: &str, query: Option<&str>) -> Result<Vec<Document>, CmsError> {
        let url = format!("{}/documents/search", self.api_url);
        let mut documents = Vec::new();
        let mut page = 1u32;

        loop {
            let page_str = page.to_string();
            let mut params = vec![
                ("ref", content_ref),
                ("pageSize", PAGE_SIZE),
                ("page", page_str.as_str()),
            ];
            if let Some(q) = query {
                params.push(("q", q));
            }

            let result: SearchPage = self.get_json(&url, &params, true)?;
            documents.extend(result.results);

            if page >= result.total_pages {
                break;
            }
            page += 1;
        }

        Ok(documents)
    }

    /// GET `url` and decode the JSON body.
    fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        authenticated: bool,
    ) -> Result<T, CmsError> {
        let mut request = self.agent.get(url);
        for (key, value) in params {
            request = request.query(*key, *value);
        }
        if authenticated && let Some(token) = &self.access_token {
            request = request.query("access_token", token);
        }

        let mut response = request.call().map_err(|err| classify(url, err))?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|err| classify(url, err))?;

        serde_json::from_str(&body).map_err(|err| CmsError::Decode {
            url: url.to_owned(),
            reason: err.to_string(),
        })
    }
}

impl CmsClient for PrismicClient {
    fn documents(&self, content: &ContentRef) -> Result<Vec<Document>, CmsError> {
        let content_ref = match content {
            ContentRef::Release(release) => self.resolve_release(release)?,
            ContentRef::Preview(token) => token.as_str().to_owned(),
        };
        let documents = self.search_all(&content_ref, None)?;
        log!("cms"; "fetched {} documents", documents.len());
        Ok(documents)
    }

    fn preview_session(
        &self,
        token: &PreviewToken,
        resolver: &LinkResolver,
        default_url: &str,
    ) -> Result<String, CmsError> {
        // The token URL carries its own credentials; never forward ours to it.
        let session: PreviewSession = self.get_json(token.as_str(), &[], false)?;

        let Some(id) = session.main_document else {
            return Ok(default_url.to_owned());
        };

        let query = format!("[[at(document.id,\"{id}\")]]");
        let documents = self.search_all(token.as_str(), Some(&query))?;
        Ok(documents
            .first()
            .map_or_else(|| default_url.to_owned(), |doc| resolver.resolve(doc)))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Pick the ref for `release` from the API entry's ref list.
///
/// `"master"` selects the ref flagged as master; any other name matches a
/// ref's label or id.
fn select_ref(refs: &[ApiRef], release: &str) -> Result<String, CmsError> {
    refs.iter()
        .find(|r| {
            if release == MASTER_RELEASE {
                r.is_master_ref
            } else {
                r.label == release || r.id == release
            }
        })
        .map(|r| r.content_ref.clone())
        .ok_or_else(|| CmsError::UnknownRelease(release.to_owned()))
}

/// Map a transport-level error onto the CMS taxonomy.
fn classify(url: &str, err: ureq::Error) -> CmsError {
    match err {
        ureq::Error::StatusCode(404) => CmsError::NotFound(url.to_owned()),
        ureq::Error::StatusCode(status) => CmsError::Status {
            status,
            url: url.to_owned(),
        },
        other => CmsError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
