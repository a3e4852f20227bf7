use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use thiserror::Error as ThisError;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::server::handler::ReplayHandler;
use crate::server::keys::{KeyError, KeyProviderRegistry};
use crate::server::persistence::load_trips_dir;
use crate::server::state::TripStore;

/// Delay between the store becoming empty and the listener closing. Late
/// requests racing this window are still answered (with 404).
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("invalid server configuration: {0}")]
    Config(String),
    #[error("cannot load recorded trips: {0}")]
    Load(String),
    #[error("no recorded trips were found in the corpus")]
    EmptyCorpus,
    #[error("key configuration error: {0}")]
    Key(#[from] KeyError),
    #[error("cannot bind replay server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// A configured but not yet started replay server. Built through
/// [`crate::server::ReplayServerBuilder`].
pub struct ReplayServer {
    pub(crate) port: u16,
    pub(crate) expose: bool,
    pub(crate) trips_dir: PathBuf,
    pub(crate) index_keys: Vec<String>,
    pub(crate) print_access_log: bool,
    pub(crate) registry: KeyProviderRegistry,
}

impl std::fmt::Debug for ReplayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayServer")
            .field("port", &self.port)
            .field("expose", &self.expose)
            .field("trips_dir", &self.trips_dir)
            .field("index_keys", &self.index_keys)
            .field("print_access_log", &self.print_access_log)
            .finish_non_exhaustive()
    }
}

impl ReplayServer {
    /// Loads and indexes the corpus, binds the listener, and spawns the
    /// accept loop.
    ///
    /// Startup is fully synchronous up to and including the bind, so the
    /// caller observes "address already in use" and similar immediate
    /// failures directly instead of racing a grace timer. A successful
    /// return means the server is accepting requests; it keeps running on
    /// its own task until the corpus is exhausted.
    pub async fn start(self) -> Result<ReplayServerHandle, Error> {
        let interactions = load_trips_dir(&self.trips_dir)?;
        let store = TripStore::index(interactions, &self.registry, &self.index_keys)?;
        if store.is_empty() {
            return Err(Error::EmptyCorpus);
        }
        tracing::info!(
            "indexed corpus from {}: {} identities, keys [{}]",
            self.trips_dir.display(),
            store.len(),
            self.index_keys.join(",")
        );

        let host = if self.expose { "0.0.0.0" } else { "127.0.0.1" };
        let addr: SocketAddr = format!("{}:{}", host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| Error::Bind { addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handler = Arc::new(ReplayHandler::new(
            self.registry,
            self.index_keys,
            store,
            shutdown_tx,
            self.print_access_log,
        ));

        tracing::info!("replay server listening on {}", local_addr);
        let join = tokio::spawn(accept_loop(listener, handler, shutdown_rx));

        Ok(ReplayServerHandle { local_addr, join })
    }
}

/// Handle to a running replay server.
pub struct ReplayServerHandle {
    local_addr: SocketAddr,
    join: JoinHandle<()>,
}

impl ReplayServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves once the listener has closed, which happens after all
    /// recorded trips have been consumed and the drain delay has elapsed.
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: Arc<ReplayHandler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let handler = handler.clone();
                                async move {
                                    Ok::<_, Infallible>(handler.handle(req).await)
                                }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service)
                                .await
                            {
                                tracing::debug!("connection error from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!("failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                tracing::info!("replay listener closing");
                break;
            }
        }
    }
}
