use std::path::PathBuf;

use axum::routing::get;
use axum::{Json, Router};
use clap::Args;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;

use super::services::Services;

#[derive(Args)]
pub struct ServeCommand {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "tops.json", env = "TOPS_CONFIG")]
    pub config: PathBuf,

    /// Address to bind the server to, overriding the configuration file
    #[arg(long)]
    pub address: Option<String>,
}

impl ServeCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run())
    }

    async fn run(self) -> anyhow::Result<()> {
        let services = Services::build(&self.config).await?;
        let address = self
            .address
            .clone()
            .unwrap_or_else(|| services.config.address.clone());

        let app = Router::new()
            .nest("/api/5.0", tops_acme::configure_routes())
            .route(
                "/api-docs/openapi.json",
                get(|| async { Json(tops_acme::AcmeApiDoc::openapi()) }),
            )
            .with_state(services.state.clone())
            .layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&address).await?;
        info!("Starting Tops server on {}", address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped, draining background jobs...");
        services.shutdown().await;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
