//! Guestbook API server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::github::GithubClient;
use crate::secrets::SecretCache;
use crate::store;
use crate::{Error, Result};

/// Guestbook API server
pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    /// Wire up secrets, the identity provider, and the entry store
    pub async fn new(config: Config) -> Result<Self> {
        let secrets = Arc::new(SecretCache::from_config(&config.secrets)?);
        let identity = Arc::new(GithubClient::new(config.github.clone())?);
        let store = store::from_config(&config.store).await?;

        Ok(Self {
            state: Arc::new(AppState {
                config,
                secrets,
                identity,
                store,
            }),
        })
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<()> {
        let config = &self.state.config;
        let addr = SocketAddr::new(
            config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            config.server.port,
        );

        // Secrets are fetched lazily anyway; a failure here is only a warning
        if let Err(e) = self.state.secrets.warm().await {
            warn!(error = %e, "Secrets unavailable at startup");
        }

        let app = create_router(Arc::clone(&self.state))?;
        let listener = TcpListener::bind(addr).await?;

        info!(version = env!("CARGO_PKG_VERSION"), %addr, "Guestbook API listening");
        info!(
            frontend = %config.site.frontend_url,
            cookie_domain = %config.site.cookie_domain(),
            callback = %config.site.callback_url(),
            "Site configuration"
        );

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut drain_rx = shutdown_tx.subscribe();
        let drain_timeout = config.server.shutdown_timeout;

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .into_future();
        tokio::pin!(serve);

        // In-flight requests get `shutdown_timeout` to finish once the signal arrives
        tokio::select! {
            result = &mut serve => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                let _ = drain_rx.recv().await;
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!(
                    timeout_secs = drain_timeout.as_secs(),
                    "Graceful shutdown timed out; dropping open connections"
                );
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
