//! Server
//!
//! Owns the hubs and runs the listeners: a hyper HTTP/1 accept loop on
//! `server.bind`, which also upgrades `{prefix}/ws` requests in place, and,
//! when configured, a dedicated WebSocket accept loop on `server.ws_bind`.
//! Each accepted WebSocket becomes a [`Session`] on the hub its upgrade path
//! resolves to.

mod http;
mod routes;

pub use routes::{parse_route, Endpoint, Route, Scope};

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::auth::{AuthError, AuthProvider};
use crate::config::Config;
use crate::hub::{FanoutPool, Hub, TenantHubMap};
use crate::metrics::Metrics;
use crate::session::Session;
use crate::transport::{self, FrameSink, FrameSource, Rejection};

/// Startup failures
#[derive(Debug)]
pub enum ServerError {
    /// Binding a listener failed
    Io(io::Error),
    /// Registering metrics failed
    Metrics(prometheus::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "IO error: {}", e),
            ServerError::Metrics(e) => write!(f, "Metrics error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(e) => Some(e),
            ServerError::Metrics(e) => Some(e),
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(e: io::Error) -> Self {
        ServerError::Io(e)
    }
}

impl From<prometheus::Error> for ServerError {
    fn from(e: prometheus::Error) -> Self {
        ServerError::Metrics(e)
    }
}

/// Everything request handlers need, shared across connections
pub(crate) struct State {
    config: Config,
    public: Arc<Hub>,
    share: Arc<Hub>,
    tenants: TenantHubMap,
    auth: AuthProvider,
    metrics: Option<Arc<Metrics>>,
}

impl State {
    /// Hub serving `scope`, checking credentials where the scope needs them
    fn resolve(&self, scope: Scope, authorization: Option<&str>) -> Result<Arc<Hub>, AuthError> {
        if !scope.requires_auth() {
            return Ok(self.public.clone());
        }
        let username = self
            .auth
            .authenticate_basic(authorization)
            .map_err(|e| {
                debug!("Rejected {} scope request: {}", scope.as_str(), e);
                e
            })?;
        match scope {
            Scope::Private => Ok(self.tenants.get_or_create_hub(&username)),
            _ => Ok(self.share.clone()),
        }
    }
}

/// The msghub server
pub struct Server {
    state: Arc<State>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let metrics = if config.metrics.enabled {
            Some(Arc::new(Metrics::new()?))
        } else {
            None
        };

        let options = config.hub_options();
        let fanout = FanoutPool::new(options.max_inflight_deliveries);
        let public = Arc::new(Hub::with_shared(
            options.clone(),
            fanout.clone(),
            metrics.clone(),
        ));
        let share = Arc::new(Hub::with_shared(
            options.clone(),
            fanout.clone(),
            metrics.clone(),
        ));
        let tenants = TenantHubMap::new(options, fanout, metrics.clone());
        let auth = AuthProvider::new(&config.auth);
        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            state: Arc::new(State {
                config,
                public,
                share,
                tenants,
                auth,
                metrics,
            }),
            shutdown,
        })
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    /// The hub behind `/` and `/api/public`
    pub fn public_hub(&self) -> &Arc<Hub> {
        &self.state.public
    }

    /// The hub behind `/api/share`
    pub fn share_hub(&self) -> &Arc<Hub> {
        &self.state.share
    }

    /// Per-user hubs behind `/api/private`
    pub fn tenants(&self) -> &TenantHubMap {
        &self.state.tenants
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.state.metrics.as_ref()
    }

    /// Run until [`shutdown`](Self::shutdown) is called
    pub async fn run(&self) -> Result<(), ServerError> {
        let http_addr = self.state.config.server.bind;
        let listener = TcpListener::bind(http_addr).await?;
        info!("HTTP listening on {}", http_addr);

        if let Some(ws_addr) = self.state.config.server.ws_bind {
            let ws_listener = TcpListener::bind(ws_addr).await?;
            info!("WebSocket listening on {}", ws_addr);

            let state = self.state.clone();
            let shutdown_rx = self.shutdown.subscribe();
            tokio::spawn(accept_ws(ws_listener, state, shutdown_rx));
        }

        accept_http(listener, self.state.clone(), self.shutdown.subscribe()).await;
        info!("Server stopped");
        Ok(())
    }

    /// Stop the accept loops. Open sessions run until their peers leave.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Handle for stopping the server from another task
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }
}

async fn accept_http(
    listener: TcpListener,
    state: Arc<State>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("Starting HTTP accept loop");
    loop {
        let accepted = tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                debug!("New HTTP connection from {}", addr);
                let state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| http::handle(req, state.clone(), addr));
                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving HTTP connection from {}: {}", addr, e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept HTTP connection: {}", e);
            }
        }
    }
}

async fn accept_ws(
    listener: TcpListener,
    state: Arc<State>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    debug!("Starting WebSocket accept loop");
    loop {
        let accepted = tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                debug!("New WebSocket connection from {}", addr);
                tokio::spawn(serve_ws(stream, addr, state.clone()));
            }
            Err(e) => {
                error!("Failed to accept WebSocket connection: {}", e);
            }
        }
    }
}

/// Upgrade one connection and attach it to the hub its path resolves to
async fn serve_ws(stream: TcpStream, addr: SocketAddr, state: Arc<State>) {
    let resolved = transport::accept_with(stream, |req| {
        let route = parse_route(req.path)
            .filter(|r| r.endpoint == Endpoint::Ws)
            .ok_or(Rejection::NotFound)?;
        state
            .resolve(route.scope, req.authorization)
            .map_err(|e| Rejection::Unauthorized(e.to_string()))
    })
    .await;

    let (hub, source, sink) = match resolved {
        Ok(parts) => parts,
        Err(e) => {
            debug!("WebSocket handshake failed for {}: {}", addr, e);
            return;
        }
    };

    start_session(hub, source, sink, addr).await;
}

/// Attach an upgraded connection to `hub` and start serving it
async fn start_session(
    hub: Arc<Hub>,
    source: impl FrameSource + 'static,
    sink: impl FrameSink + 'static,
    peer: SocketAddr,
) {
    let session = Session::open(hub, sink);
    info!("{} connected from {}", session.id(), peer);
    session.greet().await;
    session.run(source);
}
