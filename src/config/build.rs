//! `[build]` section configuration.
//!
//! Contains the build pipeline paths, timeout and configured replace plugins.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Main BuildConfig
// ============================================================================

/// `[build]` section in builds.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// source = "src"       # Input tree
/// output = "builds"    # Output root (master/ and preview/ live here)
/// timeout = "10m"
///
/// [[build.replace]]
/// pattern = "https://cdn.example.com/"
/// replacement = "/assets/"
/// extension = "html"
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Input tree read by the build pipeline.
    #[serde(default = "defaults::build::source")]
    #[educe(Default = defaults::build::source())]
    pub source: PathBuf,

    /// Output root. Production builds go to `master/`, previews to `preview/<key>/`.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Directory (inside each build) that receives CMS documents as JSON.
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: PathBuf,

    /// Upper bound on a single pipeline run.
    #[serde(default = "defaults::build::timeout")]
    #[educe(Default = defaults::build::timeout())]
    pub timeout: String,

    /// Regex substitutions applied to every build, in declaration order.
    #[serde(default)]
    pub replace: Vec<ReplaceRule>,
}

// ============================================================================
// Sub-configurations
// ============================================================================

/// `[[build.replace]]` entry - one text substitution plugin.
///
/// `pattern` uses the `regex` crate syntax, including Unicode-aware `\d`,
/// `\w`, `\s` and `(?i)`. Other Unicode classes such as `\p{Greek}` are
/// not available. `replacement` supports `$1`/`${name}` capture group
/// expansion.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ReplaceRule {
    /// Regular expression matched against raw file bytes.
    pub pattern: String,

    /// Replacement text.
    pub replacement: String,

    /// Only files with this extension are rewritten.
    #[serde(default = "defaults::build::replace::extension")]
    #[educe(Default = defaults::build::replace::extension())]
    pub extension: String,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use std::path::PathBuf;

    #[test]
    fn test_build_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.build.source, PathBuf::from("src"));
        assert_eq!(config.build.output, PathBuf::from("builds"));
        assert_eq!(config.build.data, PathBuf::from("_data"));
        assert_eq!(config.build.timeout, "10m");
        assert!(config.build.replace.is_empty());
    }

    #[test]
    fn test_build_config_replace_rules() {
        let config = r#"
            [build]
            source = "site"

            [[build.replace]]
            pattern = "__YEAR__"
            replacement = "2026"

            [[build.replace]]
            pattern = "url\\((/fonts/)"
            replacement = "url(/static$1"
            extension = "css"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.build.source, PathBuf::from("site"));
        assert_eq!(config.build.replace.len(), 2);
        assert_eq!(config.build.replace[0].pattern, "__YEAR__");
        assert_eq!(config.build.replace[0].extension, "html");
        assert_eq!(config.build.replace[1].extension, "css");
    }

    #[test]
    fn test_replace_rule_requires_pattern() {
        let config = r#"
            [[build.replace]]
            replacement = "x"
        "#;
        let result: Result<SiteConfig, _> = toml::from_str(config);
        assert!(result.is_err());
    }
}
