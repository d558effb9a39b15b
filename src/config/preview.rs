//! `[preview]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// `[preview]` section in builds.toml - preview build settings.
///
/// # Example
/// ```toml
/// [preview]
/// age = "1h"            # Lifetime of a preview build and its cookie
/// reuse_fresh = false   # Rebuild on every preview request
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    /// How long a preview build lives. The sweeper runs every `age / 2`.
    #[serde(default = "defaults::preview::age")]
    #[educe(Default = defaults::preview::age())]
    pub age: String,

    /// Serve an existing, unexpired preview build instead of rebuilding it.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub reuse_fresh: bool,

    /// Script tag injected before every `</body>` of preview HTML.
    #[serde(default = "defaults::preview::script")]
    #[educe(Default = defaults::preview::script())]
    pub script: String,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;

    #[test]
    fn test_preview_config_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();

        assert_eq!(config.preview.age, "1h");
        assert!(!config.preview.reuse_fresh);
        assert!(config.preview.script.contains("prismic.min.js"));
        assert!(config.preview.script.ends_with('\n'));
    }

    #[test]
    fn test_preview_config_override() {
        let config = r#"
            [preview]
            age = "30m"
            reuse_fresh = true
            script = "<script src=\"/toolbar.js\"></script>"
        "#;
        let config: SiteConfig = toml::from_str(config).unwrap();

        assert_eq!(config.preview.age, "30m");
        assert!(config.preview.reuse_fresh);
        assert_eq!(config.preview.script, "<script src=\"/toolbar.js\"></script>");
    }
}
