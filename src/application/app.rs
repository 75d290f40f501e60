use crate::config::Settings;
use crate::proxy::{ProxyService, RelayTransport};
use crate::{Error, Result};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, instrument};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    router: Router,
}

impl Application {
    #[instrument]
    pub async fn new() -> Result<Self> {
        Self::with_settings(Settings::new()?)
    }

    /// Build the router over a [`RelayTransport`] from `settings`
    pub fn with_settings(settings: Settings) -> Result<Self> {
        let auth_config = settings.auth_config();
        if auth_config.principals.is_empty() {
            tracing::warn!("No bearer credentials configured; every proxied request will be rejected");
        }

        info!(relay_url = %settings.transport.relay_url, "Using relay transport");
        let transport = Arc::new(RelayTransport::new(settings.transport.relay_url.clone()));
        let service = ProxyService::new(
            transport,
            settings.proxy_config(),
            settings.dashboard_config(),
        );
        let router = service.into_router(auth_config);

        Ok(Self { settings, router })
    }

    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let address = format!(
            "{}:{}",
            self.settings.application.host, self.settings.application.port
        );
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| Error::Bind {
                address: address.clone(),
                source,
            })?;

        info!("Starting edge tunnel proxy on {address}");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
