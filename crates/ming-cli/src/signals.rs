//! OS signal handling

use tracing::info;

/// Resolve once SIGINT, SIGTERM or SIGQUIT arrives
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "unable to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let wait = |kind: SignalKind, name: &'static str| async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, signal = name, "unable to install signal handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = wait(SignalKind::terminate(), "SIGTERM") => info!("received SIGTERM, shutting down"),
            _ = wait(SignalKind::quit(), "SIGQUIT") => info!("received SIGQUIT, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received interrupt, shutting down");
    }
}
