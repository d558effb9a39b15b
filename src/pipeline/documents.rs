//! CMS content plugin.
//!
//! Fetches every document visible at a content ref and adds them to the
//! tree as JSON:
//!
//! ```text
//! <data>/documents.json          all documents
//! <data>/<type>/<uid>.json       one file per document
//! ```

use super::{Files, Plugin};
use crate::{
    cms::{CmsClient, ContentRef},
    log,
};
use anyhow::{Context, Result};
use std::{path::PathBuf, sync::Arc};

/// Adds CMS documents at `content` under `data_dir`.
pub struct Documents {
    cms: Arc<dyn CmsClient>,
    content: ContentRef,
    data_dir: PathBuf,
}

impl Documents {
    pub fn new(cms: Arc<dyn CmsClient>, content: ContentRef, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            cms,
            content,
            data_dir: data_dir.into(),
        }
    }
}

impl Plugin for Documents {
    fn name(&self) -> &str {
        "documents"
    }

    fn run(&self, files: &mut Files) -> Result<()> {
        let documents = self.cms.documents(&self.content)?;

        files.insert(
            self.data_dir.join("documents.json"),
            serde_json::to_vec_pretty(&documents).context("Failed to encode documents")?,
        );

        for document in &documents {
            let slug = document.slug();
            if !is_safe_segment(&document.doc_type) || !is_safe_segment(slug) {
                log!("cms"; "skipping document {} with unsafe path `{}/{}`", document.id, document.doc_type, slug);
                continue;
            }

            let path = self
                .data_dir
                .join(&document.doc_type)
                .join(format!("{slug}.json"));
            let content = serde_json::to_vec_pretty(document)
                .with_context(|| format!("Failed to encode document {}", document.id))?;
            files.insert(path, content);
        }

        Ok(())
    }
}

/// A single path segment that cannot climb out of the data directory.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cms::{CmsError, PreviewToken};
    use crate::test_support::{FakeCms, document};
    use std::path::Path;

    #[test]
    fn test_writes_index_and_per_document_files() {
        let cms = FakeCms::new().with_release(
            "master",
            vec![document("A", Some("hello"), "post"), document("B", None, "page")],
        );
        let plugin = Documents::new(
            Arc::new(cms),
            ContentRef::Release("master".into()),
            "_data",
        );

        let mut files = Files::new();
        plugin.run(&mut files).unwrap();

        let index: serde_json::Value =
            serde_json::from_slice(&files[Path::new("_data/documents.json")]).unwrap();
        assert_eq!(index.as_array().unwrap().len(), 2);

        let post: serde_json::Value =
            serde_json::from_slice(&files[Path::new("_data/post/hello.json")]).unwrap();
        assert_eq!(post["id"], "A");
        assert!(files.contains_key(Path::new("_data/page/B.json")));
    }

    #[test]
    fn test_preview_ref_reads_draft_content() {
        let token = PreviewToken::new("tok");
        let cms = FakeCms::new()
            .with_release("master", vec![document("A", Some("live"), "post")])
            .with_preview("tok", vec![document("A", Some("draft"), "post")]);
        let plugin = Documents::new(Arc::new(cms), ContentRef::Preview(token), "_data");

        let mut files = Files::new();
        plugin.run(&mut files).unwrap();

        assert!(files.contains_key(Path::new("_data/post/draft.json")));
        assert!(!files.contains_key(Path::new("_data/post/live.json")));
    }

    #[test]
    fn test_unknown_preview_is_not_found() {
        let plugin = Documents::new(
            Arc::new(FakeCms::new()),
            ContentRef::Preview(PreviewToken::new("missing")),
            "_data",
        );

        let err = plugin.run(&mut Files::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<CmsError>(), Some(CmsError::NotFound(_))));
    }

    #[test]
    fn test_skips_unsafe_paths() {
        let cms = FakeCms::new().with_release(
            "master",
            vec![document("A", Some("../../etc"), "post"), document("B", Some("ok"), "..")],
        );
        let plugin = Documents::new(Arc::new(cms), ContentRef::Release("master".into()), "_data");

        let mut files = Files::new();
        plugin.run(&mut files).unwrap();

        assert_eq!(files.len(), 1);
        assert!(files.contains_key(Path::new("_data/documents.json")));
    }

    #[test]
    fn test_is_safe_segment() {
        assert!(is_safe_segment("blog-post"));
        assert!(!is_safe_segment(""));
        assert!(!is_safe_segment(".."));
        assert!(!is_safe_segment("a/b"));
        assert!(!is_safe_segment("a\\b"));
    }
}
