//! cms-builds - rebuilds a static site from a headless CMS and serves
//! per-editor preview builds.

mod build;
mod cli;
mod cms;
mod config;
mod logger;
mod pipeline;
mod preview;
mod server;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use cms::{CmsClient, prismic::PrismicClient};
use config::SiteConfig;
use server::PreviewServer;
use std::{
    sync::{Arc, mpsc},
    time::{Duration, SystemTime},
};

/// Grace period for in-flight requests on shutdown
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(SiteConfig::load(&cli)?);

    match &cli.command {
        Commands::Serve { .. } => serve(config),
        Commands::Build => build::build_once(&config, cms_client(&config)?).map(|_| ()),
        Commands::Sweep => {
            let report = preview::sweep(
                &config.preview_root(),
                config.preview_age(),
                SystemTime::now(),
            );
            log!("sweep"; "removed {}, kept {}, failed {}", report.removed, report.retained, report.failed);
            Ok(())
        }
    }
}

/// CMS client for the configured repository.
fn cms_client(config: &SiteConfig) -> Result<Arc<dyn CmsClient>> {
    let api_url = config
        .cms
        .api_url
        .as_deref()
        .context("[cms.api_url] is not set")?;

    Ok(Arc::new(PrismicClient::new(
        api_url,
        config.cms.access_token.clone(),
        config.cms_timeout(),
    )))
}

/// Run the server until Ctrl+C.
fn serve(config: Arc<SiteConfig>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let cms = cms_client(&config)?;
    let mut server = PreviewServer::new(config, cms, runtime.handle().clone());

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        shutdown_tx.send(()).ok();
    })
    .context("Failed to set Ctrl+C handler")?;

    server.start()?;

    shutdown_rx.recv().ok();
    log!("serve"; "shutting down...");

    server.stop();
    drop(server);
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    Ok(())
}
