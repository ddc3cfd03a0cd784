//! HTTP listener lifecycle

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

/// Time in-flight requests get to finish on shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Cloneable reference to a running listener
#[derive(Clone, Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    tls: bool,
    handle: Handle,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Stop accepting connections and drain in-flight requests
    pub fn shutdown(&self) {
        self.handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    }
}

/// A started listener. Serving errors arrive on the channel returned by [`HttpServer::start`].
pub struct HttpServer {
    handle: ServerHandle,
    task: JoinHandle<()>,
}

impl HttpServer {
    /// Bind `addr` and serve `router` in the background, over TLS when a config is given
    pub fn start(
        addr: SocketAddr,
        router: Router,
        tls: Option<Arc<rustls::ServerConfig>>,
    ) -> io::Result<(Self, oneshot::Receiver<io::Error>)> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let handle = Handle::new();
        let server_handle = ServerHandle {
            local_addr,
            tls: tls.is_some(),
            handle: handle.clone(),
        };
        let (err_tx, err_rx) = oneshot::channel();

        let task = tokio::spawn(
            async move {
                let app = router.into_make_service();
                let served = match tls {
                    Some(config) => {
                        axum_server::from_tcp_rustls(listener, RustlsConfig::from_config(config))
                            .handle(handle)
                            .serve(app)
                            .await
                    }
                    None => axum_server::from_tcp(listener).handle(handle).serve(app).await,
                };
                match served {
                    Ok(()) => info!(addr = %local_addr, "listener stopped"),
                    Err(e) => {
                        error!(addr = %local_addr, error = %e, "listener failed");
                        let _ = err_tx.send(e);
                    }
                }
            }
            .in_current_span(),
        );

        info!(addr = %local_addr, tls = server_handle.tls, "listening");
        Ok((
            Self {
                handle: server_handle,
                task,
            },
            err_rx,
        ))
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.handle.local_addr
    }

    /// Shut down and wait for the serving task to end
    pub async fn stop(self) {
        self.handle.shutdown();
        if let Err(e) = self.task.await {
            error!(error = %e, "listener task panicked");
        }
    }
}
