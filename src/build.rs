//! Production builds.
//!
//! # Architecture
//!
//! ```text
//! POST /build ──► ProductionTrigger::trigger()
//!                     │
//!                     ├── lock          one production build at a time
//!                     │
//!                     ├── pipeline()    Documents(release) + [[build.replace]]
//!                     │
//!                     └── run_blocking() ──► <output>/master/
//! ```
//!
//! The preview builder reuses [`pipeline`] and [`run_blocking`] with a
//! preview content ref and its own destination.

use crate::{
    cms::{CmsClient, ContentRef},
    config::SiteConfig,
    log,
    pipeline::{BuildError, Documents, Pipeline, Replace},
};
use anyhow::Result;
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

/// Pipeline reading CMS content at `content` and writing to `destination`.
///
/// Plugin order: CMS documents first, then every configured replace rule.
pub fn pipeline(
    config: &SiteConfig,
    cms: Arc<dyn CmsClient>,
    content: ContentRef,
    destination: impl Into<PathBuf>,
) -> Result<Pipeline, BuildError> {
    let mut pipeline = Pipeline::new(&config.build.source, destination)
        .plugin(Documents::new(cms, content, &config.build.data));

    for rule in &config.build.replace {
        let plugin = Replace::from_rule(rule).map_err(|err| {
            BuildError::Failed(format!("invalid replace pattern `{}`: {err}", rule.pattern))
        })?;
        pipeline = pipeline.plugin(plugin);
    }

    Ok(pipeline)
}

/// Pipeline for the configured release into `<output>/master`.
pub fn production_pipeline(
    config: &SiteConfig,
    cms: Arc<dyn CmsClient>,
) -> Result<Pipeline, BuildError> {
    pipeline(
        config,
        cms,
        ContentRef::Release(config.cms.release.clone()),
        config.master_dir(),
    )
}

/// Run `pipeline` on the blocking pool, giving up after `limit`.
///
/// `hold` is dropped on the blocking thread once the pipeline returns. A
/// timed-out build is not cancelled: the caller gets `Timeout` right away,
/// but whatever `hold` guards stays held until the build stops writing.
pub async fn run_blocking<G>(pipeline: Pipeline, limit: Duration, hold: G) -> Result<usize, BuildError>
where
    G: Send + 'static,
{
    let task = tokio::task::spawn_blocking(move || {
        let result = pipeline.build();
        drop(hold);
        result
    });

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(BuildError::Failed(format!("build task aborted: {err}"))),
        Err(_) => Err(BuildError::Timeout(limit)),
    }
}

/// Runs production builds, one at a time.
pub struct ProductionTrigger {
    config: Arc<SiteConfig>,
    cms: Arc<dyn CmsClient>,
    lock: Arc<Mutex<()>>,
}

impl ProductionTrigger {
    pub fn new(config: Arc<SiteConfig>, cms: Arc<dyn CmsClient>) -> Self {
        Self {
            config,
            cms,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Rebuild `<output>/master`, returning the number of files written.
    ///
    /// Calls made while a build is running wait for it and then build
    /// again, so the last webhook always sees its content published. The
    /// lock is released by the build itself, so a timed-out build still
    /// keeps the next one out of `master/` until it is done.
    pub async fn trigger(&self) -> Result<usize, BuildError> {
        let guard = Arc::clone(&self.lock).lock_owned().await;

        log!("build"; "building release `{}`...", self.config.cms.release);
        let start = Instant::now();

        let result = match production_pipeline(&self.config, Arc::clone(&self.cms)) {
            Ok(pipeline) => run_blocking(pipeline, self.config.build_timeout(), guard).await,
            Err(err) => Err(err),
        };

        match &result {
            Ok(count) => log!(
                "build"; "wrote {count} files to {} in {:.2}s",
                self.config.master_dir().display(),
                start.elapsed().as_secs_f64()
            ),
            Err(err) => log!("error"; "production build failed: {err:#}"),
        }

        result
    }
}

/// One-shot production build for the `build` command.
pub fn build_once(config: &SiteConfig, cms: Arc<dyn CmsClient>) -> Result<usize> {
    let start = Instant::now();
    let count = production_pipeline(config, cms)?.build()?;

    log!(
        "build"; "wrote {count} files to {} in {:.2}s",
        config.master_dir().display(),
        start.elapsed().as_secs_f64()
    );
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplaceRule;
    use crate::test_support::{FakeCms, document, site};
    use std::fs;

    fn cms() -> Arc<FakeCms> {
        Arc::new(FakeCms::new().with_release("master", vec![document("A", Some("home"), "page")]))
    }

    #[test]
    fn test_build_once_writes_master() {
        let (_dir, config) = site();

        let count = build_once(&config, cms()).unwrap();

        let master = config.master_dir();
        assert_eq!(count, 4);
        assert!(master.join("index.html").is_file());
        assert!(master.join("_data/documents.json").is_file());
        assert!(master.join("_data/page/home.json").is_file());
    }

    #[test]
    fn test_configured_replace_rules_run_after_documents() {
        let (_dir, mut config) = site();
        config.build.replace.push(ReplaceRule {
            pattern: "\"home\"".into(),
            replacement: "\"HOME\"".into(),
            extension: "json".into(),
        });

        build_once(&config, cms()).unwrap();

        let content = fs::read_to_string(config.master_dir().join("_data/page/home.json")).unwrap();
        assert!(content.contains("\"HOME\""));
    }

    #[test]
    fn test_invalid_replace_rule_is_a_build_failure() {
        let (_dir, mut config) = site();
        config.build.replace.push(ReplaceRule {
            pattern: "[".into(),
            replacement: String::new(),
            extension: "html".into(),
        });

        let err = production_pipeline(&config, cms()).err().unwrap();
        assert!(matches!(err, BuildError::Failed(_)));
    }

    #[tokio::test]
    async fn test_trigger_builds_release() {
        let (_dir, config) = site();
        let trigger = ProductionTrigger::new(Arc::new(config.clone()), cms());

        assert_eq!(trigger.trigger().await.unwrap(), 4);
        assert!(config.master_dir().join("css/a.css").is_file());
    }

    #[tokio::test]
    async fn test_trigger_failure_keeps_previous_master() {
        let (_dir, config) = site();
        let master = config.master_dir();
        fs::create_dir_all(&master).unwrap();
        fs::write(master.join("index.html"), "previous").unwrap();

        let cms = Arc::new(FakeCms::new().failing_documents());
        let trigger = ProductionTrigger::new(Arc::new(config), cms);

        assert!(matches!(trigger.trigger().await, Err(BuildError::Failed(_))));
        assert_eq!(fs::read_to_string(master.join("index.html")).unwrap(), "previous");
    }

    #[tokio::test]
    async fn test_concurrent_triggers_are_serialized() {
        let (_dir, config) = site();
        let cms = Arc::new(
            FakeCms::new()
                .with_release("master", vec![])
                .with_delay(Duration::from_millis(50)),
        );
        let trigger = Arc::new(ProductionTrigger::new(Arc::new(config), cms.clone()));

        let first = tokio::spawn({
            let trigger = Arc::clone(&trigger);
            async move { trigger.trigger().await }
        });
        let second = tokio::spawn({
            let trigger = Arc::clone(&trigger);
            async move { trigger.trigger().await }
        });

        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
        assert_eq!(cms.calls(), 2);
    }

    #[tokio::test]
    async fn test_run_blocking_times_out() {
        let (_dir, config) = site();
        let cms = Arc::new(
            FakeCms::new()
                .with_release("master", vec![])
                .with_delay(Duration::from_millis(500)),
        );
        let pipeline = production_pipeline(&config, cms).unwrap();

        let err = run_blocking(pipeline, Duration::from_millis(20), ()).await.unwrap_err();
        assert!(matches!(err, BuildError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_blocking_holds_guard_until_build_ends() {
        let (_dir, config) = site();
        let cms = Arc::new(
            FakeCms::new()
                .with_release("master", vec![])
                .with_delay(Duration::from_millis(200)),
        );
        let pipeline = production_pipeline(&config, cms).unwrap();
        let lock = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&lock).lock_owned().await;

        let err = run_blocking(pipeline, Duration::from_millis(20), guard).await.unwrap_err();

        assert!(matches!(err, BuildError::Timeout(_)));
        assert!(lock.try_lock().is_err());
        let _relocked = tokio::time::timeout(Duration::from_secs(5), lock.lock()).await.unwrap();
    }

    #[tokio::test]
    async fn test_timed_out_build_blocks_next_trigger() {
        let (_dir, mut config) = site();
        config.build.timeout = "1s".into();
        let cms = Arc::new(
            FakeCms::new()
                .with_release("master", vec![])
                .with_delay(Duration::from_millis(1500)),
        );
        let trigger = ProductionTrigger::new(Arc::new(config), cms.clone());

        assert!(matches!(trigger.trigger().await, Err(BuildError::Timeout(_))));
        // The first build is still writing; the second waits for it.
        let second = trigger.trigger().await;

        assert!(matches!(second, Err(BuildError::Timeout(_))));
        assert_eq!(cms.calls(), 2);
        assert_eq!(cms.max_concurrent(), 1);
    }
}
