//! Gateway server: wiring, listener, graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use super::router::{ApiHandle, build_api, create_router};
use crate::config::Config;
use crate::storage::{InMemoryKeyStore, KeyStore, spawn_reaper};
use crate::{Error, Result};

/// The gateway: registered APIs sharing one key store and one listener.
pub struct Gateway {
    config: Config,
    store: Arc<dyn KeyStore>,
    apis: Vec<Arc<ApiHandle>>,
}

impl Gateway {
    /// Build the gateway from configuration, seeding OAuth client
    /// registrations into the key store.
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyStore> = Arc::new(InMemoryKeyStore::new());

        let mut apis = Vec::new();
        for spec in &config.apis {
            let api = build_api(
                spec.clone(),
                Arc::clone(&store),
                &config.secret,
                &config.server,
            );
            api.oauth().seed_clients().await;
            info!(
                api_id = %api.spec.api_id,
                listen_path = %api.spec.proxy.listen_path,
                oauth = api.spec.use_oauth2,
                hmac = api.spec.enable_signature_checking,
                "Registered API"
            );
            apis.push(api);
        }

        Ok(Self {
            config,
            store,
            apis,
        })
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
        spawn_reaper(
            Arc::clone(&self.store),
            Duration::from_secs(60),
            shutdown_tx.subscribe(),
        );

        let app = create_router(&self.apis);
        let listener = TcpListener::bind(addr).await?;

        info!(
            host = %self.config.server.host,
            port = self.config.server.port,
            apis = self.apis.len(),
            "Gateway listening"
        );
        for api in &self.apis {
            info!(
                listen_path = %api.spec.proxy.listen_path,
                target = %api.spec.proxy.target_url,
                "  route"
            );
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown_tx))
            .await?;

        info!("Gateway shutdown complete");
        Ok(())
    }
}

/// Resolve on SIGINT/SIGTERM and fan the shutdown out to background tasks.
async fn shutdown_signal(shutdown_tx: tokio::sync::broadcast::Sender<()>) {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
