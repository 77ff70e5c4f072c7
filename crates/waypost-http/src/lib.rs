pub mod acceptor;
pub mod api;
pub mod extract;
pub mod handlers;
pub mod state;
pub mod tls;

pub use state::AppState;

use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use waypost_core::error::Result;

pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
    tls_cert_path: std::path::PathBuf,
    tls_key_path: std::path::PathBuf,
}

impl HttpServer {
    pub fn new(
        state: AppState,
        listen_addr: SocketAddr,
        tls_cert_path: std::path::PathBuf,
        tls_key_path: std::path::PathBuf,
    ) -> Self {
        Self {
            state,
            listen_addr,
            tls_cert_path,
            tls_key_path,
        }
    }

    fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(handlers::root))
            .route("/submitTransfer", axum::routing::post(handlers::submit_transfer))
            .route("/transferStatus", get(handlers::transfer_status))
            .route(
                "/doneStaging",
                get(handlers::done_staging).post(handlers::done_staging),
            )
            .route(
                "/donePrepare",
                get(handlers::done_prepare).post(handlers::done_prepare),
            )
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.create_router();
        let rustls_config = tls::load_server_tls_config(&self.tls_cert_path, &self.tls_key_path)?;
        let acceptor = acceptor::MtlsAcceptor::new(Arc::new(rustls_config));

        tracing::info!(addr = %self.listen_addr, "waypost HTTPS listener starting");

        axum_server::bind(self.listen_addr)
            .acceptor(acceptor)
            .serve(app.into_make_service())
            .await
            .map_err(|e| waypost_core::WaypostError::Other(anyhow::anyhow!("HTTP server error: {e}")))?;

        Ok(())
    }
}
