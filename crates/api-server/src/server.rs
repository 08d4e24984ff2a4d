//! API server — builds the router and runs the HTTP listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use segmentator_core::config::AppConfig;
use segmentator_history::HistoryReporter;
use segmentator_segments::{AssignmentEngine, RolloutSampler, SegmentCatalog};
use segmentator_store::Db;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::rest::{self, AppState};

pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, db: Arc<Db>) -> Self {
        let state = AppState {
            catalog: SegmentCatalog::new(db.clone()),
            engine: AssignmentEngine::new(db.clone()),
            sampler: RolloutSampler::new(db.clone()),
            reporter: HistoryReporter::new(db, config.report.clone()),
            service_name: config.service_name.clone(),
            start_time: Instant::now(),
        };
        Self { config, state }
    }

    /// Build the application router. Split out so tests can drive it
    /// without binding a socket.
    pub fn router(state: AppState, reports_dir: &str) -> Router {
        Router::new()
            .route("/api/create_segment", post(rest::create_segment))
            .route("/api/delete_segment", delete(rest::delete_segment))
            .route("/api/update_user_segments", post(rest::update_user_segments))
            .route("/api/get_user_segments", get(rest::get_user_segments))
            .route("/api/get_user_history", get(rest::get_user_history))
            .route("/health", get(rest::health))
            .nest_service("/reports", ServeDir::new(reports_dir))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Start the HTTP server; resolves once `shutdown` fires and in-flight
    /// requests drain.
    pub async fn start_http(
        &self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let app = Self::router(self.state.clone(), &self.config.report.storage_dir);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }

    /// Start the Prometheus metrics exporter on its own port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
