//! Regex substitution plugin.
//!
//! Operates on raw bytes, so files that are not valid UTF-8 never fail a
//! build. Only files whose extension matches are touched.

use super::{Files, Plugin};
use crate::config::ReplaceRule;
use anyhow::Result;
use regex::bytes::{NoExpand, Regex};
use std::{borrow::Cow, path::Path};

/// Replace every match of a pattern in files with a given extension.
#[derive(Debug, Clone)]
pub struct Replace {
    pattern: Regex,
    replacement: Vec<u8>,
    /// Insert `replacement` verbatim instead of expanding `$name` groups.
    literal: bool,
    extension: String,
}

impl Replace {
    /// Substitution with `$1`/`${name}` capture group expansion.
    pub fn new(pattern: &str, replacement: &str, extension: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.as_bytes().to_vec(),
            literal: false,
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
        })
    }

    /// Substitute an exact marker with fixed text.
    pub fn literal(marker: &str, replacement: &str, extension: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            literal: true,
            ..Self::new(&regex::escape(marker), replacement, extension)?
        })
    }

    pub fn from_rule(rule: &ReplaceRule) -> Result<Self, regex::Error> {
        Self::new(&rule.pattern, &rule.replacement, &rule.extension)
    }

    /// Whether `path` passes the extension filter.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension))
    }

    /// Apply the substitution to one file's content.
    pub fn apply<'a>(&self, content: &'a [u8]) -> Cow<'a, [u8]> {
        if self.literal {
            self.pattern
                .replace_all(content, NoExpand(&self.replacement))
        } else {
            self.pattern
                .replace_all(content, self.replacement.as_slice())
        }
    }
}

impl Plugin for Replace {
    fn name(&self) -> &str {
        "replace"
    }

    fn run(&self, files: &mut Files) -> Result<()> {
        for (path, content) in files.iter_mut() {
            if !self.matches(path) {
                continue;
            }
            let rewritten = match self.apply(content) {
                Cow::Owned(bytes) => bytes,
                Cow::Borrowed(_) => continue,
            };
            *content = rewritten;
        }
        Ok(())
    }
}
