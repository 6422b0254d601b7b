use anyhow::{Context, Result};
use axum::{Router, extract::DefaultBodyLimit, routing::get, routing::post};
use common::config::GatewayConfig;
use lifecycle::TierStore;
use std::sync::Arc;
use tokio::sync::watch;

pub mod endpoints;

pub use endpoints::{ObjectEntry, timestamped_name};

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<dyn TierStore>,
    pub container: String,
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("store", &"TierStore")
            .field("container", &self.container)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl GatewayState {
    pub fn new(
        store: Arc<dyn TierStore>,
        container: impl Into<String>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            store,
            container: container.into(),
            public_base_url,
        }
    }

    /// Public link for an object, when a base URL is configured.
    pub fn object_url(&self, name: &str) -> Option<String> {
        self.public_base_url
            .as_deref()
            .map(|base| format!("{}/{}/{}", base.trim_end_matches('/'), self.container, name))
    }
}

/// Create the router with all gateway routes configured
pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(endpoints::health_check))
        .route("/upload", post(endpoints::upload))
        .route("/objects", get(endpoints::list_objects))
        .route("/objects/{name}", get(endpoints::download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Serve the gateway until `shutdown` turns true or its sender is dropped.
pub async fn serve(
    config: &GatewayConfig,
    state: GatewayState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind gateway to {}", config.bind))?;
    let local_addr = listener
        .local_addr()
        .context("Failed to read gateway address")?;
    tracing::info!(%local_addr, container = %state.container, "Upload gateway listening");

    let app = create_router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("Upload gateway shutting down gracefully");
        })
        .await
        .context("Upload gateway error")?;

    Ok(())
}
