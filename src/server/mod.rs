//! Build and preview HTTP server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐        ┌──────────────────────────────┐
//! │  Accept Thread   │ spawn  │        Tokio Runtime         │
//! │   (tiny_http)    │ ─────► │  route() per request         │
//! └──────────────────┘        │  Sweeper (every age / 2)     │
//!                             └──────────────┬───────────────┘
//!                                            │ spawn_blocking
//!                                            ▼
//!                               pipeline runs, CMS calls, I/O
//! ```
//!
//! [`PreviewServer`] owns every moving part (listener, accept thread,
//! sweeper task) and tears them down in [`PreviewServer::stop`].

mod auth;
mod files;
mod routes;

pub use routes::{IncomingRequest, Reply, route};

use crate::{
    build::ProductionTrigger,
    cms::CmsClient,
    config::SiteConfig,
    log,
    preview::{PreviewBuilder, Sweeper},
};
use anyhow::{Context, Result, anyhow, bail};
use std::{
    io::Read,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};
use tiny_http::{Header, Request, Response, Server};
use tokio::runtime::Handle;

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Largest request body read; webhook payloads are tiny.
const MAX_BODY_LEN: u64 = 64 * 1024;

// ============================================================================
// Shared State
// ============================================================================

/// Everything a request handler needs.
pub struct ServerState {
    pub config: Arc<SiteConfig>,
    pub production: ProductionTrigger,
    pub previews: PreviewBuilder,
}

impl ServerState {
    pub fn new(config: Arc<SiteConfig>, cms: Arc<dyn CmsClient>) -> Self {
        Self {
            production: ProductionTrigger::new(Arc::clone(&config), Arc::clone(&cms)),
            previews: PreviewBuilder::new(Arc::clone(&config), cms),
            config,
        }
    }
}

// ============================================================================
// Server Lifecycle
// ============================================================================

pub struct PreviewServer {
    state: Arc<ServerState>,
    runtime: Handle,
    http: Option<Arc<Server>>,
    accept: Option<thread::JoinHandle<()>>,
    sweeper: Option<Sweeper>,
}

impl PreviewServer {
    pub fn new(config: Arc<SiteConfig>, cms: Arc<dyn CmsClient>, runtime: Handle) -> Self {
        Self {
            state: Arc::new(ServerState::new(config, cms)),
            runtime,
            http: None,
            accept: None,
            sweeper: None,
        }
    }

    /// Bind, start accepting requests and start the expiry sweeper.
    ///
    /// With `[serve] initial_build`, a production build is requested
    /// through the server's own `POST /build` once it is listening.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if self.http.is_some() {
            bail!("server already started");
        }

        let config = Arc::clone(&self.state.config);
        let interface: IpAddr = config
            .serve
            .interface
            .parse()
            .with_context(|| format!("invalid interface `{}`", config.serve.interface))?;

        let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
        let server = Arc::new(server);

        let accept = thread::Builder::new()
            .name("accept".into())
            .spawn({
                let server = Arc::clone(&server);
                let state = Arc::clone(&self.state);
                let runtime = self.runtime.clone();
                move || accept_loop(&server, &state, &runtime)
            })
            .context("Failed to spawn accept thread")?;

        self.http = Some(server);
        self.accept = Some(accept);
        self.sweeper = Some(Sweeper::spawn(
            &self.runtime,
            config.preview_root(),
            config.preview_age(),
        ));

        log!("serve"; "http://{}", addr);

        if config.serve.initial_build {
            self.request_initial_build(addr);
        }

        Ok(addr)
    }

    /// Stop the sweeper and the listener, then wait for the accept loop.
    ///
    /// Requests already dispatched to the runtime run to completion.
    pub fn stop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        if let Some(server) = self.http.take() {
            server.unblock();
        }
        if let Some(accept) = self.accept.take()
            && accept.join().is_err()
        {
            log!("error"; "accept thread panicked");
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.http.is_some()
    }

    /// POST our own `/build` so the first production build needs no
    /// operator action.
    fn request_initial_build(&self, addr: SocketAddr) {
        let url = format!("http://{}/build", loopback(addr));
        let body = serde_json::json!({
            "apiUrl": self.state.config.cms.api_url,
            "secret": self.state.config.cms.secret,
        });

        self.runtime.spawn_blocking(move || {
            if let Err(err) = ureq::post(url.as_str()).send_json(&body) {
                log!("error"; "initial build request failed: {err}");
            }
        });
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Address to reach a listener bound on `addr` from this host.
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port()),
        IpAddr::V6(ip) if ip.is_unspecified() => SocketAddr::new(Ipv6Addr::LOCALHOST.into(), addr.port()),
        _ => addr,
    }
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                // Port 0 asks the OS for a free port
                let bound = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, bound));
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|err| err.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Hand every accepted request to the runtime. Returns once the listener
/// is unblocked.
fn accept_loop(server: &Server, state: &Arc<ServerState>, runtime: &Handle) {
    for request in server.incoming_requests() {
        let state = Arc::clone(state);
        runtime.spawn(async move {
            if let Err(err) = handle(state, request).await {
                log!("serve"; "request error: {err:#}");
            }
        });
    }
}

async fn handle(state: Arc<ServerState>, request: Request) -> Result<()> {
    let (request, incoming) = tokio::task::spawn_blocking(move || read_request(request)).await??;
    let reply = route(&state, incoming).await;
    tokio::task::spawn_blocking(move || respond(request, reply)).await?
}

fn read_request(mut request: Request) -> Result<(Request, IncomingRequest)> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_LEN)
        .read_to_end(&mut body)
        .context("Failed to read request body")?;

    let incoming = IncomingRequest {
        method: request.method().clone(),
        url: request.url().to_owned(),
        body,
    };
    Ok((request, incoming))
}

fn respond(request: Request, reply: Reply) -> Result<()> {
    let mut response = Response::from_data(reply.body).with_status_code(reply.status);

    for (name, value) in &reply.headers {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => log!("error"; "dropping invalid header `{name}`"),
        }
    }

    request.respond(response).context("Failed to send response")
}
