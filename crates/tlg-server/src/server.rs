use std::sync::Arc;

use tokio::net::TcpListener;
use tlg_ledger::{ChainAuditor, LedgerService};

use crate::auth::{AllowAllAuth, AuthProvider};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::router::build_router;

/// Threat ledger HTTP server.
pub struct LedgerServer {
    config: ServerConfig,
    auth: Arc<dyn AuthProvider>,
}

impl LedgerServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            auth: Arc::new(AllowAllAuth),
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = auth;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router over an already-open ledger (useful for testing).
    pub fn router(&self, ledger: Arc<LedgerService>) -> axum::Router {
        build_router(
            AppState::new(ledger, Arc::clone(&self.auth)),
            &self.config.api_prefix,
        )
    }

    /// Open the ledger and serve until Ctrl-C, then checkpoint and exit.
    pub async fn serve(self) -> ServerResult<()> {
        self.config.validate()?;
        let ledger = Arc::new(LedgerService::open(self.config.ledger.clone()).await?);

        let auditor = self
            .config
            .ledger
            .audit_interval()
            .map(|period| ChainAuditor::new(Arc::clone(&ledger), period).spawn());

        let app = self.router(Arc::clone(&ledger));
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            "threat ledger listening on {}{}",
            self.config.bind_addr,
            self.config.api_prefix
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        if let Some(auditor) = auditor {
            auditor.stop().await;
        }
        ledger.shutdown().await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
