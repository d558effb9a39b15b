//! Server configuration management for `builds.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[cms]`     | CMS endpoint, credentials, link resolver          |
//! | `[build]`   | Pipeline source, output root, replace plugins     |
//! | `[serve]`   | HTTP server (interface, port, initial build)      |
//! | `[preview]` | Preview lifetime, reuse policy, injected script   |
//!
//! # Example
//!
//! ```toml
//! [cms]
//! api_url = "https://my-repo.cdn.prismic.io/api/v2"
//!
//! [build]
//! source = "src"
//! output = "builds"
//!
//! [serve]
//! port = 3000
//!
//! [preview]
//! age = "1h"
//! ```
//!
//! The resolved config is immutable: it is loaded once at startup and then
//! shared as `Arc<SiteConfig>` for the lifetime of the process.

mod build;
mod cms;
pub mod defaults;
mod error;
mod preview;
mod serve;

pub use build::ReplaceRule;
pub use error::ConfigError;

use build::BuildConfig;
use cms::CmsConfig;
use preview::PreviewConfig;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

/// Environment variable holding the CMS API URL.
pub const ENV_API_URL: &str = "PRISMIC_URL";
/// Environment variable holding the CMS access token.
pub const ENV_ACCESS_TOKEN: &str = "PRISMIC_TOKEN";
/// Environment variable holding the webhook secret.
pub const ENV_SECRET: &str = "PRISMIC_SECRET";

/// Output subdirectory holding the production build.
const MASTER_DIR: &str = "master";
/// Output subdirectory holding preview builds.
const PREVIEW_DIR: &str = "preview";

// ============================================================================
// Helper Functions
// ============================================================================

/// Parse a human-readable duration string.
///
/// Supports suffixes: s (seconds), m (minutes), h (hours), d (days).
/// A bare number is read as seconds. Case-insensitive for the suffix.
///
/// # Examples
/// ```ignore
/// parse_duration_string("90s") // → 90s
/// parse_duration_string("30m") // → 1800s
/// parse_duration_string("1h")  // → 3600s
/// parse_duration_string("45")  // → 45s
/// parse_duration_string("1w")  // → None
/// ```
pub fn parse_duration_string(s: &str) -> Option<Duration> {
    let s = s.trim().to_ascii_lowercase();
    let (multiplier, suffix_len) = match s.chars().last()? {
        's' => (1, 1),
        'm' => (60, 1),
        'h' => (60 * 60, 1),
        'd' => (24 * 60 * 60, 1),
        c if c.is_ascii_digit() => (1, 0),
        _ => return None,
    };
    let value: u64 = s[..s.len() - suffix_len].trim().parse().ok()?;
    Some(Duration::from_secs(value.checked_mul(multiplier)?))
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing builds.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// CMS repository settings
    #[serde(default)]
    pub cms: CmsConfig,

    /// Build pipeline settings
    #[serde(default)]
    pub build: BuildConfig,

    /// HTTP server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// Preview build settings
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Resolve the full configuration for a CLI invocation.
    ///
    /// Reads the config file when present (defaults otherwise), applies
    /// environment and CLI overrides, normalizes paths and validates the
    /// result for the requested command.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.update_with_cli(cli);
        config.validate(&cli.command)?;
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf())
    }

    /// Output directory of the production build.
    pub fn master_dir(&self) -> PathBuf {
        self.build.output.join(MASTER_DIR)
    }

    /// Directory holding one subdirectory per preview key.
    pub fn preview_root(&self) -> PathBuf {
        self.build.output.join(PREVIEW_DIR)
    }

    /// Lifetime of a preview build.
    pub fn preview_age(&self) -> Duration {
        parse_duration_string(&self.preview.age).unwrap_or(Duration::from_secs(60 * 60))
    }

    /// Upper bound on a single pipeline run.
    pub fn build_timeout(&self) -> Duration {
        parse_duration_string(&self.build.timeout).unwrap_or(Duration::from_secs(10 * 60))
    }

    /// Upper bound on a single CMS API request.
    pub fn cms_timeout(&self) -> Duration {
        parse_duration_string(&self.cms.timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Overlay CMS credentials from the environment.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a value from the config file.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(url) = read(ENV_API_URL) {
            self.cms.api_url = Some(url);
        }
        if let Some(token) = read(ENV_ACCESS_TOKEN) {
            self.cms.access_token = Some(token);
        }
        if let Some(secret) = read(ENV_SECRET) {
            self.cms.secret = Some(secret);
        }
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());

        Self::update_option(&mut self.build.output, cli.output.as_ref());
        self.update_path_with_root(&root, &cli.config);

        if let Commands::Serve {
            interface,
            port,
            initial_build,
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.initial_build, initial_build.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path, config_name: &Path) {
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.config_path = Self::normalize_path(&root.join(config_name));
        self.build.source = Self::normalize_path(&root.join(&self.build.source));

        // Output root may live outside the project (e.g. `~/srv/builds`)
        let output = self.build.output.to_string_lossy().into_owned();
        let output = PathBuf::from(shellexpand::tilde(&output).into_owned());
        self.build.output = if output.is_relative() {
            Self::normalize_path(&root.join(output))
        } else {
            Self::normalize_path(&output)
        };
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate configuration for the given command.
    ///
    /// A missing webhook secret would make every `POST /build` fail
    /// authentication, so it is rejected here instead.
    pub fn validate(&self, command: &Commands) -> Result<()> {
        for (field, value) in [
            ("[cms.timeout]", &self.cms.timeout),
            ("[build.timeout]", &self.build.timeout),
            ("[preview.age]", &self.preview.age),
        ] {
            if parse_duration_string(value).is_none() {
                bail!(ConfigError::Validation(format!(
                    "{field} must be a duration like \"90s\", \"30m\", \"1h\" or \"2d\""
                )));
            }
        }

        for (field, duration) in [
            ("[cms.timeout]", self.cms_timeout()),
            ("[build.timeout]", self.build_timeout()),
            ("[preview.age]", self.preview_age()),
        ] {
            if duration.is_zero() {
                bail!(ConfigError::Validation(format!(
                    "{field} must be greater than zero"
                )));
            }
        }

        let data = &self.build.data;
        if data.as_os_str().is_empty()
            || !data.components().all(|c| matches!(c, Component::Normal(_)))
        {
            bail!(ConfigError::Validation(format!(
                "[build.data] must be a relative path inside the build, got `{}`",
                data.display()
            )));
        }

        if self.cms.preview_cookie.trim().is_empty() {
            bail!(ConfigError::Validation(
                "[cms.preview_cookie] must not be empty".into()
            ));
        }

        for rule in &self.build.replace {
            if let Err(err) = regex::bytes::Regex::new(&rule.pattern) {
                bail!(ConfigError::Validation(format!(
                    "[build.replace] invalid pattern `{}`: {err}",
                    rule.pattern
                )));
            }
        }

        let needs_api_url = matches!(command, Commands::Serve { .. } | Commands::Build);
        if needs_api_url && Self::is_blank(&self.cms.api_url) {
            bail!(ConfigError::Validation(format!(
                "[cms.api_url] is required (or set {ENV_API_URL})"
            )));
        }

        if let Some(url) = &self.cms.api_url
            && !url.trim().is_empty()
            && !url.starts_with("http")
        {
            bail!(ConfigError::Validation(
                "[cms.api_url] must start with http:// or https://".into()
            ));
        }

        if matches!(command, Commands::Serve { .. }) && Self::is_blank(&self.cms.secret) {
            bail!(ConfigError::Validation(format!(
                "[cms.secret] is required to authenticate webhooks (or set {ENV_SECRET})"
            )));
        }

        Ok(())
    }

    fn is_blank(value: &Option<String>) -> bool {
        value.as_deref().is_none_or(|v| v.trim().is_empty())
    }
}

// ============================================================================
// Tests
// ============================================================================
