//! File-tree build pipeline.
//!
//! # Architecture
//!
//! ```text
//! Pipeline::build()
//!     │
//!     ├── read()   ──► source tree → Files (path → bytes)
//!     │
//!     ├── plugins  ──► Documents, Replace, ... (in order, mutate Files)
//!     │
//!     └── write()  ──► clear destination, write Files in parallel
//! ```
//!
//! The destination is only touched after every plugin succeeded, so a
//! failed build leaves the previous output in place.

mod documents;
mod replace;

pub use documents::Documents;
pub use replace::Replace;

use crate::cms::CmsError;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use walkdir::WalkDir;

/// Files to ignore during directory traversal
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// In-memory file tree, keyed by path relative to the build root.
pub type Files = BTreeMap<PathBuf, Vec<u8>>;

// ============================================================================
// Errors
// ============================================================================

/// Outcome of a failed build, classified for the HTTP layer.
///
/// `Clone` so a single in-flight build result can be handed to every
/// request waiting on it.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The CMS has no content for the requested ref.
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("build failed: {0}")]
    Failed(String),

    #[error("build timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl BuildError {
    /// Classify a pipeline error, looking through its context chain for a
    /// CMS "not found".
    pub fn from_pipeline(err: &anyhow::Error) -> Self {
        let not_found = err
            .chain()
            .find_map(|cause| match cause.downcast_ref::<CmsError>() {
                Some(CmsError::NotFound(location)) => Some(location.clone()),
                _ => None,
            });

        match not_found {
            Some(location) => Self::NotFound(location),
            None => Self::Failed(format!("{err:#}")),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// Plugins
// ============================================================================

/// A transformation over the in-memory file tree.
pub trait Plugin: Send + Sync {
    /// Short name used in error context.
    fn name(&self) -> &str;

    fn run(&self, files: &mut Files) -> Result<()>;
}

// ============================================================================
// Pipeline
// ============================================================================

/// Reads a source tree, runs plugins over it and writes the result.
pub struct Pipeline {
    source: PathBuf,
    destination: PathBuf,
    plugins: Vec<Box<dyn Plugin>>,
}

impl Pipeline {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            plugins: Vec::new(),
        }
    }

    /// Append a plugin. Plugins run in insertion order.
    #[must_use]
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    /// Run the pipeline, returning the number of files written.
    pub fn build(&self) -> Result<usize, BuildError> {
        self.run().map_err(|err| BuildError::from_pipeline(&err))
    }

    fn run(&self) -> Result<usize> {
        let mut files = self.read()?;

        for plugin in &self.plugins {
            plugin
                .run(&mut files)
                .with_context(|| format!("plugin `{}` failed", plugin.name()))?;
        }

        self.write(&files)?;
        Ok(files.len())
    }

    /// Load every file under the source directory.
    fn read(&self) -> Result<Files> {
        if !self.source.is_dir() {
            anyhow::bail!("source directory not found: {}", self.source.display());
        }

        collect_all_files(&self.source)
            .into_iter()
            .map(|path| {
                let content = fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let relative = path
                    .strip_prefix(&self.source)
                    .with_context(|| format!("{} escapes the source tree", path.display()))?
                    .to_path_buf();
                Ok((relative, content))
            })
            .collect()
    }

    /// Replace the destination with `files`.
    fn write(&self, files: &Files) -> Result<()> {
        let destination = &self.destination;

        if destination.exists() {
            fs::remove_dir_all(destination).with_context(|| {
                format!("Failed to clear output directory: {}", destination.display())
            })?;
        }
        fs::create_dir_all(destination)
            .with_context(|| format!("Failed to create {}", destination.display()))?;

        files.par_iter().try_for_each(|(relative, content)| {
            let target = destination.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&target, content)
                .with_context(|| format!("Failed to write {}", target.display()))
        })
    }
}

/// Collect all files from a directory recursively
pub fn collect_all_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .map(|e| e.into_path())
        .collect()
}
